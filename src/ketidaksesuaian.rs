//! Non-conformance reports: parsing, validity metrics, trends and the
//! valid-report export.

use anyhow::Result;
use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::dates::{self, month_key};
use crate::filters::Filters;
use crate::logging::ProfileScope;
use crate::metrics::{self, Bucket, SeriesPoint};
use crate::sheets::{title_case, Row, Table};

pub const STATUS_VALID: &str = "Valid";
pub const KATEGORI_PERILAKU: &str = "Perilaku";
pub const KATEGORI_NON_PERILAKU: &str = "Non Perilaku";

const DESCRIPTION_COLUMNS: [&str; 6] =
    ["deskripsi", "deskripsi_temuan", "deskripsi_ketidaksesuaian", "keterangan", "uraian", "temuan"];
const REPORTER_COLUMNS: [&str; 4] = ["pelapor", "nama_pelapor", "reporter", "kode_sid_pelapor"];
const PHOTO_COLUMNS: [&str; 5] = ["foto", "url_foto", "link_foto", "bukti_foto", "photo_url"];
const TIMESTAMP_COLUMNS: [&str; 4] = ["tanggallapor", "timestamp", "waktu_lapor", "tanggal"];

/// Which optional columns a Ketidaksesuaian sheet provides.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportColumns {
    pub description: Option<String>,
    pub reporter: Option<String>,
    pub photo: Option<String>,
    pub timestamp: Option<String>,
    pub kategori: bool,
}

impl ReportColumns {
    pub fn detect(table: &Table) -> Self {
        let pick = |cands: &[&str]| table.first_of(cands).map(|c| c.to_string());
        Self {
            description: pick(&DESCRIPTION_COLUMNS),
            reporter: pick(&REPORTER_COLUMNS),
            photo: pick(&PHOTO_COLUMNS),
            timestamp: pick(&TIMESTAMP_COLUMNS),
            kategori: table.has("kategori_subketidaksesuaian"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Row position in the source sheet.
    pub row: usize,
    pub site: String,
    pub perusahaan: String,
    pub status: String,
    pub kategori: String,
    pub sub_ketidaksesuaian: String,
    pub deskripsi: String,
    pub pelapor: String,
    pub foto: Option<String>,
    pub tanggal: Option<NaiveDateTime>,
    /// Raw date cell, used as the grouping day when it does not parse.
    pub tanggal_raw: String,
}

impl Report {
    fn from_row(idx: usize, row: &Row<'_>, cols: &ReportColumns) -> Self {
        let opt = |c: &Option<String>| c.as_deref().and_then(|c| row.get(c));
        let tanggal_raw = opt(&cols.timestamp).unwrap_or("").to_string();
        Self {
            row: idx,
            site: row.text("site"),
            perusahaan: row.text("perusahaan"),
            status: title_case(&row.text("status_temuan")),
            kategori: row
                .get("kategori_subketidaksesuaian")
                .map(title_case)
                .unwrap_or_else(|| "Unknown".to_string()),
            sub_ketidaksesuaian: row.text("sub_ketidaksesuaian"),
            deskripsi: opt(&cols.description).unwrap_or("").to_string(),
            pelapor: opt(&cols.reporter).unwrap_or("").to_string(),
            foto: opt(&cols.photo).map(|s| s.to_string()),
            tanggal: dates::parse_datetime(&tanggal_raw),
            tanggal_raw,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == STATUS_VALID
    }

    /// Calendar day of the report, or the raw cell when unparsable.
    pub fn day(&self) -> String {
        match self.tanggal {
            Some(dt) => dt.format("%Y-%m-%d").to_string(),
            None => self.tanggal_raw.clone(),
        }
    }

    pub fn company_site(&self) -> String {
        format!("{} - {}", self.perusahaan, self.site)
    }
}

pub fn parse_reports(table: &Table) -> (Vec<Report>, ReportColumns) {
    let cols = ReportColumns::detect(table);
    let reports = table
        .iter()
        .enumerate()
        .map(|(i, r)| Report::from_row(i, &r, &cols))
        .collect();
    (reports, cols)
}

/// Site/company, report-year and report-month selection.
pub fn passes_filters(r: &Report, f: &Filters) -> bool {
    f.site_company_ok(&r.site, &r.perusahaan)
        && f.year_ok(r.tanggal.map(|t| t.year()))
        && (f.months.is_empty() || r.tanggal.map_or(false, |t| f.month_ok(t.month())))
}

pub fn apply_filters(reports: &[Report], f: &Filters) -> Vec<Report> {
    reports.iter().filter(|r| passes_filters(r, f)).cloned().collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KetidaksesuaianMetrics {
    pub total: usize,
    pub valid: usize,
    pub pct_valid: f64,
    pub perilaku: usize,
    pub non_perilaku: usize,
    pub pct_perilaku: f64,
    pub pct_non_perilaku: f64,
    /// Reports carrying any status value.
    pub temuan_masuk: usize,
}

pub fn compute_metrics(reports: &[Report]) -> KetidaksesuaianMetrics {
    let valid: Vec<&Report> = reports.iter().filter(|r| r.is_valid()).collect();
    let perilaku = valid.iter().filter(|r| r.kategori == KATEGORI_PERILAKU).count();
    let non_perilaku = valid.iter().filter(|r| r.kategori == KATEGORI_NON_PERILAKU).count();
    KetidaksesuaianMetrics {
        total: reports.len(),
        valid: valid.len(),
        pct_valid: metrics::pct(valid.len() as f64, reports.len() as f64),
        perilaku,
        non_perilaku,
        pct_perilaku: metrics::pct(perilaku as f64, valid.len() as f64),
        pct_non_perilaku: metrics::pct(non_perilaku as f64, valid.len() as f64),
        temuan_masuk: reports.iter().filter(|r| !r.status.is_empty()).count(),
    }
}

/// Monthly valid counts per kategori, zero-filled across all months seen.
pub fn monthly_trend(valid: &[&Report]) -> Vec<SeriesPoint> {
    let months: BTreeSet<String> = valid.iter().filter_map(|r| r.tanggal.as_ref().map(month_key)).collect();
    let kategori: BTreeSet<&str> = valid
        .iter()
        .filter(|r| r.tanggal.is_some())
        .map(|r| r.kategori.as_str())
        .collect();
    let counts = metrics::count_by(valid, |r| (r.tanggal.as_ref().map(month_key), r.kategori.clone()));
    let mut out = Vec::new();
    for m in &months {
        for k in &kategori {
            let n = counts.get(&(Some(m.clone()), k.to_string())).copied().unwrap_or(0);
            out.push(SeriesPoint { x: m.clone(), series: k.to_string(), value: n as f64 });
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanySiteCount {
    pub perusahaan: String,
    pub site: String,
    pub count: usize,
}

/// Company-sites with the most valid reports, count descending.
pub fn top_company_sites(valid: &[&Report], n: usize) -> Vec<CompanySiteCount> {
    let mut rows: Vec<CompanySiteCount> = metrics::count_by(valid, |r| (r.perusahaan.clone(), r.site.clone()))
        .into_iter()
        .map(|((perusahaan, site), count)| CompanySiteCount { perusahaan, site, count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows.truncate(n);
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KetidaksesuaianReport {
    pub metrics: KetidaksesuaianMetrics,
    pub trend: Vec<SeriesPoint>,
    pub sub_counts: Vec<Bucket>,
    pub company_site_sub: Vec<SeriesPoint>,
    pub top3: Vec<CompanySiteCount>,
    pub kategori_valid: Vec<Bucket>,
    pub columns: ReportColumns,
}

pub fn build_report(table: &Table, f: &Filters) -> KetidaksesuaianReport {
    let _scope = ProfileScope::new("ketidaksesuaian_report");
    let (all, columns) = parse_reports(table);
    let reports = apply_filters(&all, f);
    let valid: Vec<&Report> = reports.iter().filter(|r| r.is_valid()).collect();

    let with_sub: Vec<&Report> = valid.iter().copied().filter(|r| !r.sub_ketidaksesuaian.is_empty()).collect();
    let company_site_sub = metrics::count_by(&with_sub, |r| (r.company_site(), r.sub_ketidaksesuaian.clone()))
        .into_iter()
        .map(|((x, series), n)| SeriesPoint { x, series, value: n as f64 })
        .collect();

    KetidaksesuaianReport {
        metrics: compute_metrics(&reports),
        trend: monthly_trend(&valid),
        sub_counts: metrics::value_counts(with_sub.iter().map(|r| r.sub_ketidaksesuaian.as_str())),
        company_site_sub,
        top3: top_company_sites(&valid, 3),
        kategori_valid: metrics::value_counts(valid.iter().map(|r| r.kategori.as_str())),
        columns,
    }
}

/// Valid rows of the sheet with their source columns.
pub fn valid_table(table: &Table) -> Table {
    table.filter(|r| title_case(&r.text("status_temuan")) == STATUS_VALID)
}

pub fn export_valid_csv(table: &Table) -> Result<String> {
    valid_table(table).to_csv_string()
}

/// Per (perusahaan, site) counts of valid, Perilaku and Non Perilaku reports.
pub fn valid_counts_by_company_site(reports: &[Report]) -> BTreeMap<(String, String), (usize, usize, usize)> {
    let mut out: BTreeMap<(String, String), (usize, usize, usize)> = BTreeMap::new();
    for r in reports.iter().filter(|r| r.is_valid()) {
        let e = out.entry((r.perusahaan.clone(), r.site.clone())).or_default();
        e.0 += 1;
        if r.kategori == KATEGORI_PERILAKU {
            e.1 += 1;
        } else if r.kategori == KATEGORI_NON_PERILAKU {
            e.2 += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
TanggalLapor,Site,Perusahaan,Kategori_SubKetidaksesuaian,Sub_Ketidaksesuaian,Deskripsi,status_temuan
03/01/2025 08:00:00,A,PT X,perilaku,Sampah Tercampur,sampah tercampur di tong,valid
15/01/2025 09:00:00,A,PT X,non perilaku,Tong Rusak,tong rusak,VALID
02/02/2025 10:00:00,B,PT Y,,Tong Penuh,tong penuh meluap,Valid
02/02/2025 11:00:00,B,PT Y,perilaku,Sampah Tercampur,tidak ada,invalid
";

    fn table() -> Table {
        Table::from_csv_str(SAMPLE).unwrap()
    }

    #[test]
    fn normalizes_status_and_kategori() {
        let (reports, cols) = parse_reports(&table());
        assert_eq!(cols.description.as_deref(), Some("deskripsi"));
        assert_eq!(cols.timestamp.as_deref(), Some("tanggallapor"));
        assert_eq!(cols.photo, None);
        assert_eq!(reports[1].status, "Valid");
        assert_eq!(reports[1].kategori, "Non Perilaku");
        assert_eq!(reports[2].kategori, "Unknown");
        assert_eq!(reports[0].day(), "2025-01-03");
    }

    #[test]
    fn metrics_count_valid_and_kategori() {
        let (reports, _) = parse_reports(&table());
        let m = compute_metrics(&reports);
        assert_eq!(m.total, 4);
        assert_eq!(m.valid, 3);
        assert_eq!(m.pct_valid, 75.0);
        assert_eq!(m.perilaku, 1);
        assert_eq!(m.non_perilaku, 1);
        assert!((m.pct_perilaku - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn trend_is_zero_filled() {
        let (reports, _) = parse_reports(&table());
        let valid: Vec<&Report> = reports.iter().filter(|r| r.is_valid()).collect();
        let trend = monthly_trend(&valid);
        // 2 months x 3 kategori
        assert_eq!(trend.len(), 6);
        let feb_perilaku = trend.iter().find(|p| p.x == "2025-02" && p.series == "Perilaku").unwrap();
        assert_eq!(feb_perilaku.value, 0.0);
    }

    #[test]
    fn export_keeps_only_valid_rows() {
        let csv = export_valid_csv(&table()).unwrap();
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.starts_with("tanggallapor,site,perusahaan"));
        assert!(!csv.contains("invalid"));
    }

    #[test]
    fn filters_by_report_year_and_site() {
        let (reports, _) = parse_reports(&table());
        let f = Filters { sites: vec!["B".into()], ..Filters::default() };
        assert_eq!(apply_filters(&reports, &f).len(), 2);
        let f = Filters { years: vec![2024], ..Filters::default() };
        assert!(apply_filters(&reports, &f).is_empty());
    }

    #[test]
    fn reporter_column_ignores_generic_names() {
        let t = Table::from_csv_str("Site,Nama,Nama Pelapor,status_temuan\nA,TPS Barat,Budi,Valid\n").unwrap();
        let (reports, cols) = parse_reports(&t);
        assert_eq!(cols.reporter.as_deref(), Some("nama_pelapor"));
        assert_eq!(reports[0].pelapor, "Budi");

        let only_nama = Table::from_csv_str("Site,Nama,status_temuan\nA,TPS Barat,Valid\n").unwrap();
        let (reports, cols) = parse_reports(&only_nama);
        assert_eq!(cols.reporter, None);
        assert_eq!(reports[0].pelapor, "");
    }

    #[test]
    fn report_dates_serialize() {
        let (reports, _) = parse_reports(&table());
        let v = serde_json::to_value(&reports[0]).unwrap();
        assert_eq!(v["tanggal"], "2025-01-03T08:00:00");
        assert_eq!(v["tanggal_raw"], "03/01/2025 08:00:00");
    }

    #[test]
    fn top3_orders_by_count() {
        let (reports, _) = parse_reports(&table());
        let valid: Vec<&Report> = reports.iter().filter(|r| r.is_valid()).collect();
        let top = top_company_sites(&valid, 3);
        assert_eq!(top[0].perusahaan, "PT X");
        assert_eq!(top[0].count, 2);
        let counts = valid_counts_by_company_site(&reports);
        assert_eq!(counts[&("PT Y".to_string(), "B".to_string())], (1, 0, 0));
    }
}
