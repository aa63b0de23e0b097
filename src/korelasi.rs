//! Survey feedback (Q2) against non-conformance counts per company-site.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::filters::Filters;
use crate::fraud::{self, FraudConfig};
use crate::ketidaksesuaian::{parse_reports, valid_counts_by_company_site};
use crate::logging::{log_missing_columns, ProfileScope};
use crate::metrics::{self, min_max_scale};
use crate::sheets::Table;
use crate::stats::{self, Heatmap, PairAnalysis, PlotPoint};
use crate::survey::{q2_column, site_column, CORP_COLUMN};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRow {
    pub perusahaan: String,
    pub site: String,
    pub company_site: String,
    pub feedback_q2: f64,
    pub jumlah_ketidaksesuaian: usize,
    pub jumlah_perilaku: usize,
    pub jumlah_nonperilaku: usize,
    pub jumlah_fraud: usize,
    pub ketidaksesuaian_scaled: f64,
    pub perilaku_scaled: f64,
    pub nonperilaku_scaled: f64,
}

/// Mean Q2 score per (perusahaan, site); rows without a numeric score are
/// skipped, groups with none at all are dropped.
pub fn feedback_means(survey: &Table) -> Option<BTreeMap<(String, String), f64>> {
    let site_col = site_column(survey);
    let q2 = q2_column(survey);
    let (Some(site_col), Some(q2), true) = (site_col, q2, survey.has(CORP_COLUMN)) else {
        let mut missing = Vec::new();
        if site_col.is_none() {
            missing.push("site_/_lokasi_kerja");
        }
        if !survey.has(CORP_COLUMN) {
            missing.push(CORP_COLUMN);
        }
        if q2_column(survey).is_none() {
            missing.push("q2");
        }
        log_missing_columns("korelasi", &missing);
        return None;
    };

    let mut groups: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for row in survey.iter() {
        let key = (row.text(CORP_COLUMN), row.text(site_col));
        let entry = groups.entry(key).or_default();
        if let Some(v) = row.num(&q2) {
            entry.push(v);
        }
    }
    Some(
        groups
            .into_iter()
            .filter_map(|(k, vals)| metrics::mean(&vals).map(|m| (k, m)))
            .collect(),
    )
}

/// Left join of feedback with valid, Perilaku, Non Perilaku and fraud counts
/// (absent counts are zero), then min-max scaling of the counts to 0-5.
pub fn feedback_table(survey: &Table, ketidaksesuaian: &Table, cfg: &FraudConfig) -> Option<Vec<FeedbackRow>> {
    let feedback = feedback_means(survey)?;
    let (reports, cols) = parse_reports(ketidaksesuaian);
    let counts = valid_counts_by_company_site(&reports);
    let fraud_counts = fraud::fraud_counts_by_company_site(&fraud::assess(&reports, cfg, cols.photo.is_some()));

    let mut rows: Vec<FeedbackRow> = feedback
        .into_iter()
        .map(|((perusahaan, site), q2)| {
            let key = (perusahaan.clone(), site.clone());
            let (valid, perilaku, non) = counts.get(&key).copied().unwrap_or((0, 0, 0));
            FeedbackRow {
                company_site: format!("{} - {}", perusahaan, site),
                perusahaan,
                site,
                feedback_q2: q2,
                jumlah_ketidaksesuaian: valid,
                jumlah_perilaku: perilaku,
                jumlah_nonperilaku: non,
                jumlah_fraud: fraud_counts.get(&key).copied().unwrap_or(0),
                ketidaksesuaian_scaled: 0.0,
                perilaku_scaled: 0.0,
                nonperilaku_scaled: 0.0,
            }
        })
        .collect();

    let scale = |get: fn(&FeedbackRow) -> usize, rows: &[FeedbackRow]| {
        let vals: Vec<f64> = rows.iter().map(|r| get(r) as f64).collect();
        min_max_scale(&vals, 0.0, 5.0)
    };
    let k = scale(|r| r.jumlah_ketidaksesuaian, &rows);
    let p = scale(|r| r.jumlah_perilaku, &rows);
    let n = scale(|r| r.jumlah_nonperilaku, &rows);
    for (i, row) in rows.iter_mut().enumerate() {
        row.ketidaksesuaian_scaled = k[i];
        row.perilaku_scaled = p[i];
        row.nonperilaku_scaled = n[i];
    }
    Some(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KorelasiReport {
    pub rows: Vec<FeedbackRow>,
    pub baseline_feedback: Option<f64>,
    /// Plain Pearson r used in the chart title.
    pub r_feedback_valid: Option<f64>,
    pub analysis: PairAnalysis,
    pub scatter: Vec<PlotPoint>,
    pub qq_feedback: Vec<PlotPoint>,
    pub qq_valid: Vec<PlotPoint>,
    pub pp_feedback: Vec<PlotPoint>,
    pub pp_valid: Vec<PlotPoint>,
    pub heatmap: Heatmap,
}

pub fn build_report(
    survey: &Table,
    ketidaksesuaian: &Table,
    f: &Filters,
    cfg: &FraudConfig,
    alpha: f64,
) -> Option<KorelasiReport> {
    let _scope = ProfileScope::new("korelasi_report");
    if survey.is_empty() || ketidaksesuaian.is_empty() {
        return None;
    }
    let rows: Vec<FeedbackRow> = feedback_table(survey, ketidaksesuaian, cfg)?
        .into_iter()
        .filter(|r| f.site_company_ok(&r.site, &r.perusahaan))
        .collect();

    let feedback: Vec<f64> = rows.iter().map(|r| r.feedback_q2).collect();
    let valid: Vec<f64> = rows.iter().map(|r| r.jumlah_ketidaksesuaian as f64).collect();
    let analysis = stats::analyze_pair(&feedback, &valid, alpha);
    let column = |get: fn(&FeedbackRow) -> f64| rows.iter().map(get).collect::<Vec<f64>>();
    let heatmap = stats::heatmap(
        &[
            ("feedback_q2", feedback.clone()),
            ("jumlah_ketidaksesuaian", valid.clone()),
            ("jumlah_perilaku", column(|r| r.jumlah_perilaku as f64)),
            ("jumlah_nonperilaku", column(|r| r.jumlah_nonperilaku as f64)),
            ("jumlah_fraud", column(|r| r.jumlah_fraud as f64)),
        ],
        analysis.method,
    );

    Some(KorelasiReport {
        baseline_feedback: metrics::mean(&feedback),
        r_feedback_valid: stats::correlation::pearson_r(&feedback, &valid),
        scatter: feedback.iter().zip(&valid).map(|(x, y)| PlotPoint { x: *x, y: *y }).collect(),
        qq_feedback: stats::qq_points(&feedback),
        qq_valid: stats::qq_points(&valid),
        pp_feedback: stats::pp_points(&feedback),
        pp_valid: stats::pp_points(&valid),
        analysis,
        heatmap,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn survey() -> Table {
        Table::from_csv_str(
            "Perusahaan Area Kerja Tambang,Site / Lokasi Kerja,\
             \"2. Seberapa optimal program GBST berjalan selama ini di perusahaan Anda?\"\n\
             PT X,A,4\nPT X,A,5\nPT Y,B,2\nPT Z,C,3\nPT Z,C,n/a\n",
        )
        .unwrap()
    }

    fn reports() -> Table {
        Table::from_csv_str(
            "TanggalLapor,Site,Perusahaan,Kategori_SubKetidaksesuaian,Sub_Ketidaksesuaian,status_temuan\n\
             01/01/2025 08:00:00,A,PT X,Perilaku,Sampah Tercampur,Valid\n\
             02/01/2025 08:00:00,A,PT X,Non Perilaku,Tong Rusak,Valid\n\
             03/01/2025 08:00:00,A,PT X,Perilaku,Tong Penuh,Valid\n\
             04/01/2025 08:00:00,B,PT Y,Perilaku,Tong Penuh,Valid\n\
             05/01/2025 08:00:00,B,PT Y,Perilaku,Tong Penuh,Invalid\n",
        )
        .unwrap()
    }

    #[test]
    fn feedback_is_averaged_per_company_site() {
        let m = feedback_means(&survey()).unwrap();
        assert_eq!(m[&("PT X".to_string(), "A".to_string())], 4.5);
        assert_eq!(m[&("PT Z".to_string(), "C".to_string())], 3.0);
    }

    #[test]
    fn missing_counts_become_zero_and_scale_to_five() {
        let rows = feedback_table(&survey(), &reports(), &FraudConfig::default()).unwrap();
        assert_eq!(rows.len(), 3);
        let x = &rows[0];
        assert_eq!((x.jumlah_ketidaksesuaian, x.jumlah_perilaku, x.jumlah_nonperilaku), (3, 2, 1));
        assert_eq!(x.ketidaksesuaian_scaled, 5.0);
        let z = rows.iter().find(|r| r.perusahaan == "PT Z").unwrap();
        assert_eq!(z.jumlah_ketidaksesuaian, 0);
        assert_eq!(z.ketidaksesuaian_scaled, 0.0);
        assert_eq!(z.company_site, "PT Z - C");
    }

    #[test]
    fn report_has_baseline_and_heatmap() {
        let r = build_report(&survey(), &reports(), &Filters::default(), &FraudConfig::default(), 0.05).unwrap();
        assert!((r.baseline_feedback.unwrap() - (4.5 + 2.0 + 3.0) / 3.0).abs() < 1e-12);
        assert_eq!(r.heatmap.labels.len(), 5);
        assert_eq!(r.scatter.len(), 3);
        assert!(r.r_feedback_valid.unwrap() > 0.0);
    }

    #[test]
    fn missing_q2_disables_section() {
        let s = Table::from_csv_str("Perusahaan Area Kerja Tambang,Site / Lokasi Kerja\nPT X,A\n").unwrap();
        assert!(build_report(&s, &reports(), &Filters::default(), &FraudConfig::default(), 0.05).is_none());
    }
}
