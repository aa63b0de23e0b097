//! Fraud-likelihood labelling of non-conformance reports.
//!
//! Each report gets a set of independent signals and a single label:
//!
//! - exact duplicate: same (company, site, day, sub-category, description)
//!   tuple appears more than once
//! - near duplicate: TF-IDF cosine above the threshold against another
//!   report of the same (company, site, day)
//! - time spam: a neighbour from the same reporter/company/site within the
//!   spam window, and the report is a near duplicate
//! - status mismatch: status "Fraud" with no issue keyword in the text
//! - reporter repetition: highly repetitive wording, and a near duplicate
//! - photo reuse: the same photo URL on more than one report
//!
//! Any duplication signal wins over a status mismatch; otherwise the
//! presence of an issue keyword decides between a valid finding and review.

pub mod text;
pub mod tfidf;

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::filters::Filters;
use crate::ketidaksesuaian::{parse_reports, passes_filters, Report};
use crate::logging::{log, log_fraud_summary, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::sheets::Table;
use text::{has_issue_keyword, normalize, repetition_score, tokens};
use tfidf::{cosine, TfIdf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FraudLabel {
    Duplication,
    UnsupportedStatus,
    ValidFinding,
    NeedsReview,
}

impl FraudLabel {
    pub const ALL: [FraudLabel; 4] = [
        FraudLabel::Duplication,
        FraudLabel::UnsupportedStatus,
        FraudLabel::ValidFinding,
        FraudLabel::NeedsReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudLabel::Duplication => "Fraud: Duplikasi/Anomali",
            FraudLabel::UnsupportedStatus => "Fraud: Status Tidak Didukung Bukti",
            FraudLabel::ValidFinding => "Non-Fraud (Temuan Valid)",
            FraudLabel::NeedsReview => "Perlu Review",
        }
    }

    pub fn is_fraud(&self) -> bool {
        matches!(self, FraudLabel::Duplication | FraudLabel::UnsupportedStatus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FraudConfig {
    pub near_dup_threshold: f64,
    pub spam_window_secs: i64,
    pub repetition_threshold: f64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            near_dup_threshold: 0.90,
            spam_window_secs: 600,
            repetition_threshold: 0.5,
        }
    }
}

impl From<&Config> for FraudConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            near_dup_threshold: cfg.near_dup_threshold,
            spam_window_secs: cfg.spam_window_secs,
            repetition_threshold: cfg.repetition_threshold,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FraudSignals {
    pub exact_duplicate: bool,
    pub near_duplicate: bool,
    pub time_spam: bool,
    pub status_mismatch: bool,
    pub reporter_repetition: bool,
    pub photo_reuse: bool,
    pub max_similarity: f64,
    pub repetition_score: f64,
    pub has_issue_keyword: bool,
}

impl FraudSignals {
    pub fn duplication(&self) -> bool {
        self.exact_duplicate || self.near_duplicate || self.time_spam || self.reporter_repetition || self.photo_reuse
    }

    pub fn signal_count(&self) -> usize {
        [
            self.exact_duplicate,
            self.near_duplicate,
            self.time_spam,
            self.status_mismatch,
            self.reporter_repetition,
            self.photo_reuse,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    pub fn label(&self) -> FraudLabel {
        if self.duplication() {
            FraudLabel::Duplication
        } else if self.status_mismatch {
            FraudLabel::UnsupportedStatus
        } else if self.has_issue_keyword {
            FraudLabel::ValidFinding
        } else {
            FraudLabel::NeedsReview
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudAssessment {
    pub row: usize,
    pub perusahaan: String,
    pub site: String,
    pub tanggal: String,
    pub status: String,
    pub signals: FraudSignals,
    pub signal_count: usize,
    pub label: FraudLabel,
    pub label_text: &'static str,
}

struct Prepared {
    desc_norm: String,
    sub_norm: String,
    day: String,
}

fn mark_groups<K: std::hash::Hash + Eq>(keys: impl Iterator<Item = K>) -> HashMap<K, Vec<usize>> {
    let mut groups: HashMap<K, Vec<usize>> = HashMap::new();
    for (i, k) in keys.enumerate() {
        groups.entry(k).or_default().push(i);
    }
    groups
}

/// Scores every report. `has_photo_column` enables the photo-reuse signal.
pub fn assess(reports: &[Report], cfg: &FraudConfig, has_photo_column: bool) -> Vec<FraudAssessment> {
    let _scope = ProfileScope::with_context("fraud_assess", &[("reports", v_num(reports.len() as f64))]);
    let prepared: Vec<Prepared> = reports
        .iter()
        .map(|r| Prepared {
            desc_norm: normalize(&r.deskripsi),
            sub_norm: normalize(&r.sub_ketidaksesuaian),
            day: r.day(),
        })
        .collect();
    let mut signals: Vec<FraudSignals> = vec![FraudSignals::default(); reports.len()];

    // exact duplicates
    let exact = mark_groups(reports.iter().zip(&prepared).map(|(r, p)| {
        (r.perusahaan.clone(), r.site.clone(), p.day.clone(), p.sub_norm.clone(), p.desc_norm.clone())
    }));
    for members in exact.values().filter(|m| m.len() > 1) {
        for &i in members {
            signals[i].exact_duplicate = true;
        }
    }

    // near duplicates within (company, site, day)
    let docs: Vec<String> = prepared
        .iter()
        .map(|p| format!("{} {}", p.desc_norm, p.sub_norm).trim().to_string())
        .collect();
    let (_, vectors) = TfIdf::fit_transform(&docs);
    let day_groups = mark_groups(reports.iter().zip(&prepared).map(|(r, p)| (r.perusahaan.clone(), r.site.clone(), p.day.clone())));
    for members in day_groups.values().filter(|m| m.len() > 1) {
        for (a_pos, &a) in members.iter().enumerate() {
            for &b in &members[a_pos + 1..] {
                let sim = cosine(&vectors[a], &vectors[b]);
                for i in [a, b] {
                    if sim > signals[i].max_similarity {
                        signals[i].max_similarity = sim;
                    }
                }
                if sim > cfg.near_dup_threshold {
                    signals[a].near_duplicate = true;
                    signals[b].near_duplicate = true;
                }
            }
        }
    }

    // consecutive reports from the same reporter/company/site
    let mut close_in_time = vec![false; reports.len()];
    let reporter_groups = mark_groups(reports.iter().map(|r| (r.pelapor.clone(), r.perusahaan.clone(), r.site.clone())));
    for members in reporter_groups.values().filter(|m| m.len() > 1) {
        let mut timed: Vec<usize> = members.iter().copied().filter(|&i| reports[i].tanggal.is_some()).collect();
        timed.sort_by_key(|&i| reports[i].tanggal);
        for pair in timed.windows(2) {
            if let (Some(t0), Some(t1)) = (reports[pair[0]].tanggal, reports[pair[1]].tanggal) {
                if (t1 - t0).num_seconds() < cfg.spam_window_secs {
                    close_in_time[pair[0]] = true;
                    close_in_time[pair[1]] = true;
                }
            }
        }
    }

    if has_photo_column {
        let photos = mark_groups(
            reports
                .iter()
                .map(|r| r.foto.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(|s| s.to_string())),
        );
        for (url, members) in &photos {
            if url.is_some() && members.len() > 1 {
                for &i in members {
                    signals[i].photo_reuse = true;
                }
            }
        }
    }

    let out: Vec<FraudAssessment> = reports
        .iter()
        .zip(&prepared)
        .zip(signals)
        .enumerate()
        .map(|(i, ((r, p), mut s))| {
            s.has_issue_keyword = has_issue_keyword(&p.desc_norm);
            s.status_mismatch = r.status.eq_ignore_ascii_case("fraud") && !s.has_issue_keyword;
            s.repetition_score = repetition_score(&tokens(&docs[i]));
            s.time_spam = close_in_time[i] && s.near_duplicate;
            s.reporter_repetition = s.repetition_score >= cfg.repetition_threshold && s.near_duplicate;
            let label = s.label();
            FraudAssessment {
                row: r.row,
                perusahaan: r.perusahaan.clone(),
                site: r.site.clone(),
                tanggal: p.day.clone(),
                status: r.status.clone(),
                signal_count: s.signal_count(),
                signals: s,
                label,
                label_text: label.as_str(),
            }
        })
        .collect();

    let counts = label_counts(&out);
    let named: Vec<(&str, usize)> = counts.iter().map(|(l, n)| (l.as_str(), *n)).collect();
    log_fraud_summary(out.len(), &named);
    out
}

/// Count per label, in label order, zeros included.
pub fn label_counts(assessments: &[FraudAssessment]) -> Vec<(FraudLabel, usize)> {
    FraudLabel::ALL
        .iter()
        .map(|l| (*l, assessments.iter().filter(|a| a.label == *l).count()))
        .collect()
}

/// Fraud-labelled reports per (perusahaan, site).
pub fn fraud_counts_by_company_site(assessments: &[FraudAssessment]) -> BTreeMap<(String, String), usize> {
    let mut out = BTreeMap::new();
    for a in assessments.iter().filter(|a| a.label.is_fraud()) {
        *out.entry((a.perusahaan.clone(), a.site.clone())).or_insert(0) += 1;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudReport {
    pub total: usize,
    pub summary: Vec<LabelCount>,
    pub per_company_site: Vec<(String, String, usize)>,
    pub assessments: Vec<FraudAssessment>,
}

/// Labels every report of the sheet, then keeps the ones passing `f`.
/// Signals always see the whole sheet, so filtering never changes a label.
pub fn build_report(table: &Table, cfg: &FraudConfig, f: &Filters) -> FraudReport {
    let (reports, cols) = parse_reports(table);
    if cols.description.is_none() && !reports.is_empty() {
        log(
            Level::Warn,
            Domain::Fraud,
            "no_description_column",
            obj(&[("msg", v_str("text signals run on sub-category only"))]),
        );
    }
    let assessments: Vec<FraudAssessment> = assess(&reports, cfg, cols.photo.is_some())
        .into_iter()
        .zip(&reports)
        .filter(|(_, r)| passes_filters(r, f))
        .map(|(a, _)| a)
        .collect();
    FraudReport {
        total: assessments.len(),
        summary: label_counts(&assessments)
            .into_iter()
            .map(|(l, count)| LabelCount { label: l.as_str(), count })
            .collect(),
        per_company_site: fraud_counts_by_company_site(&assessments)
            .into_iter()
            .map(|((p, s), n)| (p, s, n))
            .collect(),
        assessments,
    }
}

/// Source rows with label and signal columns appended.
pub fn labelled_table(table: &Table, assessments: &[FraudAssessment]) -> Table {
    let extra = [
        "fraud_label",
        "signal_count",
        "exact_duplicate",
        "near_duplicate",
        "time_spam",
        "status_mismatch",
        "reporter_repetition",
        "photo_reuse",
        "max_similarity",
    ];
    let mut columns = table.columns.clone();
    columns.extend(extra.iter().map(|c| c.to_string()));
    let mut out = Table::new(columns);
    let by_row: HashMap<usize, &FraudAssessment> = assessments.iter().map(|a| (a.row, a)).collect();
    for (i, values) in table.rows.iter().enumerate() {
        let mut row = values.clone();
        row.resize(table.columns.len(), String::new());
        if let Some(a) = by_row.get(&i) {
            let s = &a.signals;
            row.push(a.label_text.to_string());
            row.push(a.signal_count.to_string());
            for flag in [s.exact_duplicate, s.near_duplicate, s.time_spam, s.status_mismatch, s.reporter_repetition, s.photo_reuse] {
                row.push(flag.to_string());
            }
            row.push(format!("{:.4}", s.max_similarity));
        }
        out.push_row(row);
    }
    out
}

pub fn labelled_csv(table: &Table, cfg: &FraudConfig) -> Result<String> {
    let report = build_report(table, cfg, &Filters::default());
    labelled_table(table, &report.assessments).to_csv_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reports(body: &str) -> Vec<Report> {
        parse_reports(&Table::from_csv_str(body).unwrap()).0
    }

    const HEADER: &str = "TanggalLapor,Site,Perusahaan,Sub_Ketidaksesuaian,Deskripsi,status_temuan,Pelapor\n";

    #[test]
    fn identical_reports_are_both_exact_duplicates() {
        let body = format!(
            "{}01/03/2025 08:00:00,A,PT X,Tong Penuh,tong sampah penuh,Valid,u1\n\
             01/03/2025 15:00:00,A,PT X,Tong Penuh,Tong sampah PENUH!,Valid,u2\n",
            HEADER
        );
        let out = assess(&reports(&body), &FraudConfig::default(), false);
        assert!(out.iter().all(|a| a.signals.exact_duplicate));
        assert!(out.iter().all(|a| a.signals.near_duplicate));
        assert!(out.iter().all(|a| a.label == FraudLabel::Duplication));
        assert_eq!(out[0].label_text, "Fraud: Duplikasi/Anomali");
    }

    #[test]
    fn fraud_status_without_keyword_is_unsupported() {
        let body = format!("{}02/03/2025 08:00:00,A,PT X,Lainnya,area terlihat rapi,fraud,u1\n", HEADER);
        let out = assess(&reports(&body), &FraudConfig::default(), false);
        assert!(out[0].signals.status_mismatch);
        assert_eq!(out[0].label, FraudLabel::UnsupportedStatus);
        assert_eq!(out[0].label_text, "Fraud: Status Tidak Didukung Bukti");
    }

    #[test]
    fn unique_reports_are_never_duplication() {
        let body = format!(
            "{}03/03/2025 08:00:00,A,PT X,Tong Penuh,tong organik penuh meluap,Valid,u1\n\
             04/03/2025 08:00:00,B,PT Y,Kebersihan,area workshop perlu dicek,Valid,u2\n",
            HEADER
        );
        let out = assess(&reports(&body), &FraudConfig::default(), false);
        assert_eq!(out[0].label, FraudLabel::ValidFinding);
        assert_eq!(out[1].label, FraudLabel::NeedsReview);
        assert!(out.iter().all(|a| a.signal_count == 0));
    }

    #[test]
    fn time_spam_requires_near_duplicate() {
        let body = format!(
            "{h}05/03/2025 08:00:00,A,PT X,Tong Penuh,{d},Valid,u1\n\
             05/03/2025 08:05:00,A,PT X,Tong Penuh,{d} lagi,Valid,u1\n\
             05/03/2025 08:07:00,A,PT X,Kebersihan,oli tumpah dekat genset,Valid,u1\n",
            h = HEADER,
            d = "tong sampah organik di pos satu dekat kantin utama penuh dan sampah plastik \
                 tercampur dengan sisa makanan"
        );
        let out = assess(&reports(&body), &FraudConfig::default(), false);
        assert!(!out[0].signals.exact_duplicate);
        assert!(out[0].signals.near_duplicate && out[0].signals.time_spam);
        assert!(out[1].signals.time_spam);
        assert!(!out[2].signals.near_duplicate);
        assert!(!out[2].signals.time_spam);
        assert_eq!(out[2].label, FraudLabel::ValidFinding);
    }

    #[test]
    fn photo_reuse_only_with_photo_column() {
        let body = "TanggalLapor,Site,Perusahaan,Deskripsi,status_temuan,Foto\n\
                    01/04/2025,A,PT X,tong penuh,Valid,http://img/1.jpg\n\
                    02/04/2025,B,PT Y,sampah berserakan,Valid,http://img/1.jpg\n\
                    03/04/2025,C,PT Z,bau menyengat,Valid,\n";
        let table = Table::from_csv_str(body).unwrap();
        let report = build_report(&table, &FraudConfig::default(), &Filters::default());
        let flags: Vec<bool> = report.assessments.iter().map(|a| a.signals.photo_reuse).collect();
        assert_eq!(flags, vec![true, true, false]);
        assert_eq!(report.summary[0].count, 2);
        assert_eq!(report.per_company_site.len(), 2);
    }

    #[test]
    fn labelled_table_appends_columns() {
        let body = format!("{}02/03/2025 08:00:00,A,PT X,Lainnya,rapi,fraud,u1\n", HEADER);
        let table = Table::from_csv_str(&body).unwrap();
        let report = build_report(&table, &FraudConfig::default(), &Filters::default());
        let labelled = labelled_table(&table, &report.assessments);
        assert_eq!(labelled.columns.len(), table.columns.len() + 9);
        let row = labelled.iter().next().unwrap();
        assert_eq!(row.get("fraud_label"), Some("Fraud: Status Tidak Didukung Bukti"));
        assert_eq!(row.get("status_mismatch"), Some("true"));
    }

    #[test]
    fn suffixed_keyword_supports_fraud_status() {
        let body = format!("{}02/03/2025 08:00:00,A,PT X,Lainnya,ditemukan kotoran dan tong penuhnya,fraud,u1\n", HEADER);
        let out = assess(&reports(&body), &FraudConfig::default(), false);
        assert!(out[0].signals.has_issue_keyword);
        assert!(!out[0].signals.status_mismatch);
        assert_eq!(out[0].label, FraudLabel::ValidFinding);
    }

    #[test]
    fn filters_select_rows_without_relabelling() {
        let body = "TanggalLapor,Site,Perusahaan,Deskripsi,status_temuan,Foto\n\
                    01/04/2025 08:00:00,A,PT X,area rapi,Valid,http://img/1.jpg\n\
                    02/04/2025 08:00:00,B,PT Y,area bersih,Valid,http://img/1.jpg\n\
                    03/05/2025 08:00:00,A,PT X,tong penuh,Valid,\n";
        let table = Table::from_csv_str(body).unwrap();
        let cfg = FraudConfig::default();
        let all = build_report(&table, &cfg, &Filters::default());
        let site_a = build_report(&table, &cfg, &Filters::from_query("site=A"));
        assert_eq!(site_a.total, 2);
        for a in &site_a.assessments {
            let same = all.assessments.iter().find(|b| b.row == a.row).unwrap();
            assert_eq!(a, same);
        }
        assert_eq!(site_a.assessments[0].label, FraudLabel::Duplication);
        assert!(site_a.assessments[0].signals.photo_reuse);
        assert_eq!(site_a.per_company_site, vec![("PT X".to_string(), "A".to_string(), 1)]);

        let april = build_report(&table, &cfg, &Filters::from_query("tahun=2025&bulan=4"));
        assert_eq!(april.total, 2);
        assert!(april.assessments.iter().all(|a| a.label == FraudLabel::Duplication));
        assert!(build_report(&table, &cfg, &Filters::from_query("tahun=2024")).assessments.is_empty());
    }

    #[test]
    fn repetition_scores_sub_category_without_description() {
        let body = "TanggalLapor,Site,Perusahaan,Sub_Ketidaksesuaian,status_temuan\n\
                    01/03/2025 08:00:00,A,PT X,Tong Tong Tong Tong,Valid\n";
        let table = Table::from_csv_str(body).unwrap();
        let report = build_report(&table, &FraudConfig::default(), &Filters::default());
        assert_eq!(report.assessments[0].signals.repetition_score, 0.75);
        assert!(!report.assessments[0].signals.reporter_repetition);
    }

    #[test]
    fn label_precedence() {
        let mut s = FraudSignals { status_mismatch: true, ..FraudSignals::default() };
        assert_eq!(s.label(), FraudLabel::UnsupportedStatus);
        s.photo_reuse = true;
        assert_eq!(s.label(), FraudLabel::Duplication);
        assert_eq!(s.signal_count(), 2);
    }
}
