//! Online/offline GBST survey: answer distributions, the Q2 optimality
//! score and phrase statistics for open questions.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::fraud::text::tokens;
use crate::filters::Filters;
use crate::logging::{log_missing_columns, ProfileScope};
use crate::metrics::{self, Bucket};
use crate::sheets::{SheetName, Table, Workbook};

pub const ID_COLUMNS: [&str; 9] = [
    "kode_sid",
    "perusahaan_area_kerja_tambang",
    "site_/_lokasi_kerja",
    "site___lokasi_kerja",
    "jabatan",
    "kategori_jabatan",
    "level_jabatan",
    "masa_kerja",
    "masa_kerja_(bulan)",
];

pub const CORP_COLUMN: &str = "perusahaan_area_kerja_tambang";
const SITE_COLUMNS: [&str; 2] = ["site_/_lokasi_kerja", "site___lokasi_kerja"];
pub const Q2_COLUMN: &str = "2._seberapa_optimal_program_gbst_berjalan_selama_ini_di_perusahaan_anda?";

pub const MULTI_ANSWER_COLUMNS: [&str; 2] = [
    "jika_pernah,_membuang_sampah_sembarangan,_alasannya?",
    "jika_pernah_tidak_memilah_sampah_,_alasannya?",
];

pub const OPEN_QUESTIONS: [&str; 4] = [
    "1._apa_hambatan_yang_dialami_dalam_melaksanakan_program_gbst?",
    "3._menurut_anda,_bagaimana_cara_membuat_pekerja_lebih_disiplin_dalam_menjalankan_gbst?",
    "4._bagaimana_fasilitas_pengelolaan_sampah_di_area_anda?",
    "5._menurut_anda,_apa_bentuk_dukungan_tambahan_yang_anda_perlukan_untuk_menjalankan_atau_mendukung_program_gbst?",
];

pub const STOPWORDS_ID: [&str; 28] = [
    "yang", "yg", "dan", "dengan", "untuk", "atau", "serta", "pada", "dari", "di", "ke",
    "agar", "karena", "juga", "adalah", "akan", "dalam", "itu", "sudah", "belum",
    "sebagai", "oleh", "tidak", "ada", "ya", "saya", "kami", "kita",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SurveyKind {
    Online,
    Offline,
    Gabungan,
}

impl SurveyKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "online" => SurveyKind::Online,
            "offline" => SurveyKind::Offline,
            _ => SurveyKind::Gabungan,
        }
    }

    pub fn table(&self, wb: &Workbook) -> Table {
        match self {
            SurveyKind::Online => wb.table(SheetName::SurveiOnline).clone(),
            SurveyKind::Offline => wb.table(SheetName::SurveiOffline).clone(),
            SurveyKind::Gabungan => wb.survey(),
        }
    }
}

pub fn site_column(table: &Table) -> Option<&'static str> {
    table.first_of(&SITE_COLUMNS)
}

/// The Q2 column, or the first column mentioning both "optimal" and "gbst".
pub fn q2_column(table: &Table) -> Option<String> {
    if table.has(Q2_COLUMN) {
        return Some(Q2_COLUMN.to_string());
    }
    table
        .find_column(|c| c.contains("optimal") && c.contains("gbst"))
        .map(|c| c.to_string())
}

pub fn q2_values(table: &Table) -> Vec<f64> {
    match q2_column(table) {
        Some(col) => table.iter().filter_map(|r| r.num(&col)).collect(),
        None => Vec::new(),
    }
}

pub fn filter_responses(table: &Table, f: &Filters) -> Table {
    let site_col = site_column(table);
    table.filter(|r| {
        let site_ok = site_col.map_or(true, |c| f.site_ok(&r.text(c)));
        let corp_ok = !table.has(CORP_COLUMN) || f.company_ok(&r.text(CORP_COLUMN));
        site_ok && corp_ok
    })
}

/// Non-identity columns, in sheet order.
pub fn question_columns(table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|c| !ID_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect()
}

/// The general (closed) questions: all but the trailing five open ones.
pub fn general_questions(questions: &[String]) -> &[String] {
    if questions.len() > 5 {
        &questions[..questions.len() - 5]
    } else {
        questions
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionDistribution {
    pub question: String,
    pub counts: Vec<Bucket>,
}

pub fn distribution(table: &Table, column: &str) -> QuestionDistribution {
    let values: Vec<&str> = table.iter().filter_map(|r| r.get(column)).collect();
    QuestionDistribution {
        question: column.to_string(),
        counts: metrics::value_counts(values.into_iter()),
    }
}

/// Comma-separated multi-choice answers, exploded and counted.
pub fn multi_answer(table: &Table, column: &str) -> QuestionDistribution {
    let answers: Vec<&str> = table
        .iter()
        .filter_map(|r| r.get(column))
        .flat_map(|v| v.split(','))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    QuestionDistribution {
        question: column.to_string(),
        counts: metrics::value_counts(answers.into_iter()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Q2Stats {
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    pub std: Option<f64>,
    pub n: usize,
}

pub fn q2_stats(values: &[f64]) -> Option<Q2Stats> {
    Some(Q2Stats {
        mean: metrics::mean(values)?,
        median: metrics::median(values)?,
        mode: metrics::mode(values)?,
        std: metrics::std_sample(values),
        n: values.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeStep {
    pub from: f64,
    pub to: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gauge {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub steps: Vec<GaugeStep>,
}

/// Overview gauge: axis `[0, max(max, 1)]`, bands at 50 % and 80 %.
pub fn overview_gauge(values: &[f64]) -> Option<Gauge> {
    let mean = metrics::mean(values)?;
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max).max(1.0);
    Some(Gauge {
        value: mean,
        min: 0.0,
        max,
        steps: vec![
            GaugeStep { from: 0.0, to: max * 0.5, color: "#F58C62" },
            GaugeStep { from: max * 0.5, to: max * 0.8, color: "#E1EF47" },
            GaugeStep { from: max * 0.8, to: max, color: "#4CB817" },
        ],
    })
}

/// Survey-tab gauge on the fixed 1–5 Likert axis.
pub fn likert_gauge(mean: f64) -> Gauge {
    let colors = ["#ff9999", "#ffcc99", "#99ff99", "#66ccff"];
    Gauge {
        value: mean,
        min: 1.0,
        max: 5.0,
        steps: colors
            .iter()
            .enumerate()
            .map(|(i, &color)| GaugeStep { from: 1.0 + i as f64, to: 2.0 + i as f64, color })
            .collect(),
    }
}

fn content_tokens(text: &str) -> Vec<String> {
    let stop: HashSet<&str> = STOPWORDS_ID.iter().copied().collect();
    tokens(&text.to_lowercase())
        .into_iter()
        .filter(|t| !stop.contains(t.as_str()))
        .collect()
}

fn ranked(counts: BTreeMap<String, usize>, top: usize) -> Vec<Bucket> {
    let mut out: Vec<Bucket> = counts
        .into_iter()
        .map(|(label, n)| Bucket { label, value: n as f64 })
        .collect();
    out.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    out.truncate(top);
    out
}

/// Most frequent `n`-grams after stopword removal, per answer.
pub fn top_phrases(texts: &[&str], n: usize, top: usize) -> Vec<Bucket> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for text in texts {
        let toks = content_tokens(text);
        for w in toks.windows(n.max(1)) {
            *counts.entry(w.join(" ")).or_insert(0) += 1;
        }
    }
    ranked(counts, top)
}

pub fn insight_sentence(bigrams: &[Bucket], trigrams: &[Bucket]) -> String {
    let mut parts = Vec::new();
    if let Some(b) = bigrams.first() {
        parts.push(format!("Responden banyak menyinggung '{}'.", b.label));
    }
    if let Some(t) = trigrams.first() {
        parts.push(format!("Selain itu, frasa '{}' juga cukup dominan.", t.label));
    }
    if parts.is_empty() {
        "Tidak ada pola dominan yang muncul.".to_string()
    } else {
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenQuestion {
    pub question: String,
    pub responses: usize,
    pub words: Vec<Bucket>,
    pub bigrams: Vec<Bucket>,
    pub trigrams: Vec<Bucket>,
    pub insight: String,
}

pub fn open_question(table: &Table, column: &str) -> Option<OpenQuestion> {
    let texts: Vec<&str> = table.iter().filter_map(|r| r.get(column)).collect();
    if texts.is_empty() {
        return None;
    }
    let bigrams = top_phrases(&texts, 2, 10);
    let trigrams = top_phrases(&texts, 3, 10);
    Some(OpenQuestion {
        question: column.to_string(),
        responses: texts.len(),
        words: top_phrases(&texts, 1, 50),
        insight: insight_sentence(&bigrams, &trigrams),
        bigrams,
        trigrams,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyReport {
    pub kind: SurveyKind,
    pub responses: usize,
    pub question_columns: Vec<String>,
    pub distributions: Vec<QuestionDistribution>,
    pub multi_answers: Vec<QuestionDistribution>,
    pub q2: Option<Q2Stats>,
    pub gauge: Option<Gauge>,
    pub open_questions: Vec<OpenQuestion>,
}

pub fn build_report(wb: &Workbook, kind: SurveyKind, f: &Filters) -> SurveyReport {
    let _scope = ProfileScope::new("survey_report");
    let raw = kind.table(wb);
    let table = filter_responses(&raw, f);
    let questions = question_columns(&table);
    if !table.columns.is_empty() && site_column(&table).is_none() {
        log_missing_columns("survey", &["site_/_lokasi_kerja"]);
    }

    let q2 = q2_stats(&q2_values(&table));
    SurveyReport {
        kind,
        responses: table.len(),
        distributions: general_questions(&questions).iter().map(|q| distribution(&table, q)).collect(),
        multi_answers: MULTI_ANSWER_COLUMNS
            .iter()
            .filter(|c| table.has(c))
            .map(|c| multi_answer(&table, c))
            .collect(),
        gauge: q2.as_ref().map(|s| likert_gauge(s.mean)),
        q2,
        open_questions: OPEN_QUESTIONS.iter().filter_map(|c| open_question(&table, c)).collect(),
        question_columns: questions,
    }
}
