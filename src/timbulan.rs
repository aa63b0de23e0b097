//! Waste-generation (timbulan) tab: per-capita rates, per site and company
//! totals, ratio outliers, bin capacity and CCTV coverage.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::filters::Filters;
use crate::logging::{log_missing_columns, ProfileScope};
use crate::metrics::{self, Bucket, SeriesPoint};
use crate::sheets::{Row, Table};

pub const ORGANIK_TYPES: [&str; 3] = ["Organik", "Organik Lainnya", "Sisa Makanan & Sayur"];
pub const ANORGANIK_TYPES: [&str; 5] = ["Kardus", "Botol Plastik", "Plastik", "Kertas", "Lainnya"];

/// Bulk density (kg per litre) by waste type.
pub fn density(jenis_timbulan: &str) -> Option<f64> {
    match jenis_timbulan {
        "Kardus" | "Kertas" => Some(0.02),
        "Botol Plastik" | "Plastik" | "Lainnya" => Some(0.01),
        "Organik" | "Organik Lainnya" | "Sisa Makanan & Sayur" => Some(0.12),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimbulanRecord {
    pub site: String,
    pub perusahaan: String,
    pub jenis_timbulan: String,
    pub jenis_sampah: String,
    pub timbulan: f64,
    pub man_power: Option<f64>,
    pub tahun: Option<i32>,
    pub data_input_total: Option<f64>,
    pub kapasitas_organik: Option<f64>,
    pub kapasitas_anorganik: Option<f64>,
}

impl TimbulanRecord {
    pub fn from_row(row: &Row<'_>) -> Self {
        Self {
            site: row.text("site"),
            perusahaan: row.text("perusahaan"),
            jenis_timbulan: row.text("jenis_timbulan"),
            jenis_sampah: row.text("jenis_sampah"),
            timbulan: row.num("timbulan").unwrap_or(0.0),
            man_power: row.num("man_power"),
            tahun: row.num("tahun").map(|y| y as i32),
            data_input_total: row.num("data_input_total"),
            kapasitas_organik: row.num("kapasitas"),
            kapasitas_anorganik: row.num("kapasitas.1"),
        }
    }

    pub fn company_site(&self) -> String {
        format!("{} - {}", self.perusahaan, self.site)
    }
}

/// Parsed records plus whether the sheet carries a year column.
#[derive(Debug, Clone, Default)]
pub struct TimbulanData {
    pub records: Vec<TimbulanRecord>,
    pub has_year: bool,
    pub has_input_total: bool,
}

impl TimbulanData {
    pub fn from_table(table: &Table) -> Self {
        Self {
            records: table.iter().map(|r| TimbulanRecord::from_row(&r)).collect(),
            has_year: table.has("tahun"),
            has_input_total: table.has("data_input_total"),
        }
    }

    /// Site / company / year selection. Year filtering only applies when
    /// the sheet has a year column.
    pub fn filtered(&self, f: &Filters) -> Self {
        let records = self
            .records
            .iter()
            .filter(|r| f.site_company_ok(&r.site, &r.perusahaan))
            .filter(|r| !self.has_year || f.year_ok(r.tahun))
            .cloned()
            .collect();
        Self { records, ..*self }
    }

    pub fn years(&self) -> BTreeSet<i32> {
        self.records.iter().filter_map(|r| r.tahun).collect()
    }
}

/// One headcount per (site, company[, year]), last row wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManpowerUnit {
    pub site: String,
    pub perusahaan: String,
    pub tahun: Option<i32>,
    pub man_power: f64,
}

pub fn unique_manpower(data: &TimbulanData) -> Vec<ManpowerUnit> {
    let mut order: Vec<(String, String, Option<i32>)> = Vec::new();
    let mut last: BTreeMap<(String, String, Option<i32>), f64> = BTreeMap::new();
    for r in &data.records {
        let year = if data.has_year { r.tahun } else { None };
        let key = (r.site.clone(), r.perusahaan.clone(), year);
        if !last.contains_key(&key) {
            order.push(key.clone());
        }
        last.insert(key, r.man_power.unwrap_or(0.0));
    }
    order
        .into_iter()
        .map(|key| {
            let man_power = last.get(&key).copied().unwrap_or(0.0);
            let (site, perusahaan, tahun) = key;
            ManpowerUnit { site, perusahaan, tahun, man_power }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeadlineMetrics {
    pub total_timbulan: f64,
    pub total_timbulan_all: f64,
    pub total_manpower: f64,
    pub jumlah_unit: usize,
    pub rasio_manpower: f64,
}

pub fn headline(data: &TimbulanData) -> HeadlineMetrics {
    let total_timbulan: f64 = data.records.iter().map(|r| r.timbulan).sum();
    let total_timbulan_all = if data.has_input_total {
        data.records.iter().filter_map(|r| r.data_input_total).sum()
    } else {
        total_timbulan
    };
    let units = unique_manpower(data);
    let total_manpower: f64 = units.iter().map(|u| u.man_power).sum();
    let jumlah_unit = units
        .iter()
        .map(|u| (u.site.as_str(), u.perusahaan.as_str()))
        .collect::<BTreeSet<_>>()
        .len();
    HeadlineMetrics {
        total_timbulan,
        total_timbulan_all,
        total_manpower,
        jumlah_unit,
        rasio_manpower: if total_manpower > 0.0 { total_timbulan / total_manpower } else { 0.0 },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSni {
    pub site: String,
    pub total_timbulan: f64,
    pub man_power: f64,
    pub kg_per_orang: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SniSummary {
    pub rata_sni: f64,
    pub total_timbulan: f64,
    pub total_manpower_unik: f64,
    pub per_site: Vec<SiteSni>,
}

/// Per-capita generation (kg/day/person) over unique headcounts.
pub fn sni(data: &TimbulanData) -> SniSummary {
    let units = unique_manpower(data);
    let total_timbulan: f64 = data.records.iter().map(|r| r.timbulan).sum();
    let total_mp: f64 = units.iter().map(|u| u.man_power).sum();
    let by_site = metrics::sum_by(&data.records, |r| r.site.clone(), |r| Some(r.timbulan));
    let mp_by_site = metrics::sum_by(&units, |u| u.site.clone(), |u| Some(u.man_power));
    let mut per_site: Vec<SiteSni> = by_site
        .into_iter()
        .map(|(site, total)| {
            let mp = mp_by_site.get(&site).copied().unwrap_or(0.0);
            SiteSni {
                kg_per_orang: (mp > 0.0).then(|| (total / mp * 1000.0).round() / 1000.0),
                site,
                total_timbulan: total,
                man_power: mp,
            }
        })
        .collect();
    per_site.sort_by(|a, b| {
        b.kg_per_orang
            .unwrap_or(f64::NEG_INFINITY)
            .partial_cmp(&a.kg_per_orang.unwrap_or(f64::NEG_INFINITY))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    SniSummary {
        rata_sni: if total_mp > 0.0 { total_timbulan / total_mp } else { 0.0 },
        total_timbulan,
        total_manpower_unik: total_mp,
        per_site,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub site: String,
    pub perusahaan: Option<String>,
    pub label: String,
    pub timbulan: f64,
    pub man_power: f64,
}

/// Timbulan per site with the site's unique headcount.
pub fn per_site(data: &TimbulanData) -> Vec<GroupTotal> {
    let units = unique_manpower(data);
    let mp = metrics::sum_by(&units, |u| u.site.clone(), |u| Some(u.man_power));
    metrics::sum_by(&data.records, |r| r.site.clone(), |r| Some(r.timbulan))
        .into_iter()
        .map(|(site, timbulan)| GroupTotal {
            man_power: mp.get(&site).copied().unwrap_or(0.0),
            label: site.clone(),
            site,
            perusahaan: None,
            timbulan,
        })
        .collect()
}

pub fn per_company_site(data: &TimbulanData) -> Vec<GroupTotal> {
    let units = unique_manpower(data);
    let mp = metrics::sum_by(
        &units,
        |u| (u.perusahaan.clone(), u.site.clone()),
        |u| Some(u.man_power),
    );
    metrics::sum_by(
        &data.records,
        |r| (r.perusahaan.clone(), r.site.clone()),
        |r| Some(r.timbulan),
    )
    .into_iter()
    .map(|(key, timbulan)| GroupTotal {
        man_power: mp.get(&key).copied().unwrap_or(0.0),
        label: format!("{} - {}", key.0, key.1),
        site: key.1,
        perusahaan: Some(key.0),
        timbulan,
    })
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RatioCategory {
    Normal,
    Siaga,
    TidakNormal,
}

impl RatioCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatioCategory::Normal => "Normal",
            RatioCategory::Siaga => "Siaga",
            RatioCategory::TidakNormal => "Tidak Normal",
        }
    }

    /// Values at or below Q3 are normal; up to 1.5·IQR outside the box is
    /// an alert; beyond that is abnormal.
    pub fn classify(r: f64, q1: f64, q3: f64) -> Self {
        let iqr = q3 - q1;
        if r <= q3 {
            RatioCategory::Normal
        } else if (q1 - 1.5 * iqr <= r && r < q1) || (q3 < r && r <= q3 + 1.5 * iqr) {
            RatioCategory::Siaga
        } else {
            RatioCategory::TidakNormal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioRow {
    pub perusahaan_site: String,
    pub timbulan: f64,
    pub man_power: f64,
    pub rasio: Option<f64>,
    pub zscore: Option<f64>,
    pub kategori: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioAnalysis {
    pub rows: Vec<RatioRow>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub batas_siaga: Option<f64>,
}

/// kg per person per company-site, z-scored and IQR-categorised. Units
/// without headcount have no ratio and are left out of the statistics.
pub fn ratio_analysis(data: &TimbulanData) -> RatioAnalysis {
    let groups = per_company_site(data);
    let ratios: Vec<Option<f64>> = groups
        .iter()
        .map(|g| (g.man_power > 0.0).then(|| g.timbulan / g.man_power))
        .collect();
    let defined: Vec<f64> = ratios.iter().flatten().copied().collect();
    let mut sorted = defined.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q1 = metrics::quantile_sorted(&sorted, 0.25);
    let q3 = metrics::quantile_sorted(&sorted, 0.75);
    let mean = metrics::mean(&defined);
    let std = metrics::std_sample(&defined).filter(|s| *s > 0.0);

    let rows = groups
        .iter()
        .zip(ratios)
        .map(|(g, rasio)| RatioRow {
            perusahaan_site: g.label.clone(),
            timbulan: g.timbulan,
            man_power: g.man_power,
            rasio,
            zscore: match (rasio, mean, std) {
                (Some(r), Some(m), Some(s)) => Some((r - m) / s),
                _ => None,
            },
            kategori: match (rasio, q1, q3) {
                (Some(r), Some(a), Some(b)) => Some(RatioCategory::classify(r, a, b).as_str()),
                _ => None,
            },
        })
        .collect();
    RatioAnalysis {
        rows,
        q1,
        q3,
        batas_siaga: match (q1, q3) {
            (Some(a), Some(b)) => Some(b + 1.5 * (b - a)),
            _ => None,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinStatus {
    Aman,
    Waspada,
    Melebihi,
    TidakDiketahui,
}

impl BinStatus {
    pub fn classify(volume: f64, capacity: Option<f64>) -> Self {
        match capacity {
            None => BinStatus::TidakDiketahui,
            Some(c) if c == 0.0 => BinStatus::TidakDiketahui,
            Some(c) if volume < 0.7 * c => BinStatus::Aman,
            Some(c) if volume <= c => BinStatus::Waspada,
            Some(_) => BinStatus::Melebihi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinCapacity {
    pub perusahaan_site: String,
    pub volume_organik_l: f64,
    pub volume_anorganik_l: f64,
    pub kapasitas_organik_l: Option<f64>,
    pub kapasitas_anorganik_l: Option<f64>,
    pub status_organik: BinStatus,
    pub status_anorganik: BinStatus,
}

fn max_opt(acc: Option<f64>, v: Option<f64>) -> Option<f64> {
    match (acc, v) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Daily litres per bin class against the largest declared bin capacity.
pub fn volume_vs_capacity(records: &[TimbulanRecord]) -> Vec<BinCapacity> {
    #[derive(Default)]
    struct Acc {
        org: f64,
        anorg: f64,
        cap_org: Option<f64>,
        cap_anorg: Option<f64>,
    }
    let mut groups: BTreeMap<(String, String), Acc> = BTreeMap::new();
    for r in records {
        let acc = groups.entry((r.perusahaan.clone(), r.site.clone())).or_default();
        if let Some(rho) = density(&r.jenis_timbulan) {
            let litres = r.timbulan / rho;
            if ORGANIK_TYPES.contains(&r.jenis_timbulan.as_str()) {
                acc.org += litres;
            } else if ANORGANIK_TYPES.contains(&r.jenis_timbulan.as_str()) {
                acc.anorg += litres;
            }
        }
        acc.cap_org = max_opt(acc.cap_org, r.kapasitas_organik);
        acc.cap_anorg = max_opt(acc.cap_anorg, r.kapasitas_anorganik);
    }
    groups
        .into_iter()
        .map(|((perusahaan, site), acc)| BinCapacity {
            perusahaan_site: format!("{}-{}", perusahaan, site),
            volume_organik_l: acc.org,
            volume_anorganik_l: acc.anorg,
            kapasitas_organik_l: acc.cap_org,
            kapasitas_anorganik_l: acc.cap_anorg,
            status_organik: BinStatus::classify(acc.org, acc.cap_org),
            status_anorganik: BinStatus::classify(acc.anorg, acc.cap_anorg),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CctvCoverage {
    pub perusahaan_site: String,
    pub coverage_24jam: f64,
    pub coverage_non_24jam: f64,
    pub tidak_tercover: f64,
    pub total_cctv: f64,
}

pub const CCTV_COLUMNS: [&str; 6] = [
    "site",
    "perusahaan",
    "coverage_24jam",
    "coverage_non_24jam",
    "tidak_tercover",
    "total_cctv",
];

/// Camera counts per company-site; `None` when the sheet lacks a column.
pub fn cctv_coverage(jml_cctv: &Table, f: &Filters) -> Option<Vec<CctvCoverage>> {
    if jml_cctv.is_empty() || !jml_cctv.has_all(&CCTV_COLUMNS) {
        return None;
    }
    Some(
        jml_cctv
            .iter()
            .filter(|r| f.site_company_ok(&r.text("site"), &r.text("perusahaan")))
            .map(|r| CctvCoverage {
                perusahaan_site: format!("{}-{}", r.text("perusahaan"), r.text("site")),
                coverage_24jam: r.num("coverage_24jam").unwrap_or(0.0),
                coverage_non_24jam: r.num("coverage_non_24jam").unwrap_or(0.0),
                tidak_tercover: r.num("tidak_tercover").unwrap_or(0.0),
                total_cctv: r.num("total_cctv").unwrap_or(0.0),
            })
            .collect(),
    )
}

/// Average daily managed quantity as a share of daily generation.
pub fn percent_managed(total_timbulan: f64, total_program: f64, days_period: f64) -> f64 {
    if total_timbulan > 0.0 && total_program > 0.0 && days_period > 0.0 {
        total_program / days_period / total_timbulan * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimbulanReport {
    pub headline: HeadlineMetrics,
    pub jumlah_program: usize,
    pub total_program: f64,
    pub ketidaksesuaian_valid: usize,
    pub temuan_masuk: usize,
    pub days_period: f64,
    pub persentase_terkelola: f64,
    pub sni: Option<SniSummary>,
    pub per_site: Vec<GroupTotal>,
    pub per_company_site: Vec<GroupTotal>,
    pub proporsi_jenis_sampah: Vec<Bucket>,
    pub per_company_site_jenis_sampah: Vec<SeriesPoint>,
    pub proporsi_jenis_timbulan: Vec<Bucket>,
    pub per_company_site_jenis_timbulan: Vec<SeriesPoint>,
    pub rasio: RatioAnalysis,
    pub kapasitas: Vec<BinCapacity>,
    pub cctv: Option<Vec<CctvCoverage>>,
    pub available_sites: Vec<String>,
    pub available_companies: Vec<String>,
    pub available_years: Vec<i32>,
}

fn stacked(records: &[TimbulanRecord], series: impl Fn(&TimbulanRecord) -> String) -> Vec<SeriesPoint> {
    metrics::sum_by(records, |r| (r.company_site(), series(r)), |r| Some(r.timbulan))
        .into_iter()
        .map(|((x, series), value)| SeriesPoint { x, series, value })
        .collect()
}

/// Inputs from the other sheets used by the tab's headline cards.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossSheetTotals {
    pub jumlah_program: usize,
    pub total_program: f64,
    pub ketidaksesuaian_valid: usize,
    pub temuan_masuk: usize,
    /// Years present across timbulan and program sheets.
    pub available_year_count: usize,
}

pub fn build_report(timbulan: &Table, jml_cctv: &Table, cross: CrossSheetTotals, f: &Filters) -> TimbulanReport {
    let _scope = ProfileScope::new("timbulan_report");
    let all = TimbulanData::from_table(timbulan);
    let data = all.filtered(f);

    let sni_cols = ["site", "perusahaan", "timbulan", "man_power"];
    let sni_summary = if !data.records.is_empty() && timbulan.has_all(&sni_cols) {
        Some(sni(&data))
    } else {
        let missing = timbulan.missing(&sni_cols);
        if !missing.is_empty() {
            log_missing_columns("timbulan.sni", &missing);
        }
        None
    };

    let year_count = if f.years.is_empty() { cross.available_year_count } else { f.years.len() };
    let days_period = 365.0 * year_count.max(1) as f64;
    let headline = headline(&data);
    let persentase_terkelola = percent_managed(headline.total_timbulan, cross.total_program, days_period);

    let waste: Vec<TimbulanRecord> = data
        .records
        .iter()
        .filter(|r| f.waste_class_ok(&r.jenis_sampah))
        .cloned()
        .collect();

    let proporsi_jenis_sampah = metrics::buckets(metrics::sum_by(&waste, |r| r.jenis_sampah.clone(), |r| Some(r.timbulan)));
    let proporsi_jenis_timbulan =
        metrics::buckets(metrics::sum_by(&waste, |r| r.jenis_timbulan.clone(), |r| Some(r.timbulan)));

    TimbulanReport {
        per_site: per_site(&data),
        per_company_site: per_company_site(&data),
        per_company_site_jenis_sampah: stacked(&waste, |r| r.jenis_sampah.clone()),
        per_company_site_jenis_timbulan: stacked(&waste, |r| r.jenis_timbulan.clone()),
        proporsi_jenis_sampah,
        proporsi_jenis_timbulan,
        rasio: ratio_analysis(&data),
        kapasitas: volume_vs_capacity(&waste),
        cctv: cctv_coverage(jml_cctv, f),
        headline,
        jumlah_program: cross.jumlah_program,
        total_program: cross.total_program,
        ketidaksesuaian_valid: cross.ketidaksesuaian_valid,
        temuan_masuk: cross.temuan_masuk,
        days_period,
        persentase_terkelola,
        sni: sni_summary,
        available_sites: all
            .records
            .iter()
            .map(|r| r.site.clone())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        available_companies: all
            .records
            .iter()
            .map(|r| r.perusahaan.clone())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        available_years: all.years().into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(body: &str) -> Table {
        Table::from_csv_str(body).unwrap()
    }

    const SAMPLE: &str = "\
Site,Perusahaan,Tahun,Man Power,Timbulan,jenis_timbulan,jenis_sampah,Kapasitas,Kapasitas
A,PT X,2024,100,12,Organik,Organik,200,50
A,PT X,2024,100,3,Plastik,Anorganik,200,50
A,PT X,2025,120,10,Organik,Organik,200,50
B,PT Y,2024,50,5,Kardus,Anorganik,,
";

    #[test]
    fn repeated_site_company_year_rows_count_headcount_once() {
        let data = TimbulanData::from_table(&table(SAMPLE));
        let units = unique_manpower(&data);
        assert_eq!(units.len(), 3);
        let h = headline(&data);
        assert_eq!(h.total_manpower, 270.0);
        assert_eq!(h.jumlah_unit, 2);
        assert_eq!(h.total_timbulan, 30.0);
        let s = sni(&data);
        assert!((s.rata_sni - 30.0 / 270.0).abs() < 1e-12);
        assert_eq!(s.per_site[0].site, "A");
    }

    #[test]
    fn last_row_wins_for_manpower() {
        let t = table("Site,Perusahaan,Man Power,Timbulan\nA,X,10,1\nA,X,40,1\n");
        let data = TimbulanData::from_table(&t);
        assert_eq!(unique_manpower(&data)[0].man_power, 40.0);
    }

    #[test]
    fn filters_apply_year_and_site() {
        let data = TimbulanData::from_table(&table(SAMPLE));
        let f = Filters { years: vec![2025], ..Filters::default() };
        assert_eq!(data.filtered(&f).records.len(), 1);
        let f = Filters { sites: vec!["B".into()], ..Filters::default() };
        assert_eq!(headline(&data.filtered(&f)).total_timbulan, 5.0);
    }

    #[test]
    fn iqr_categories() {
        assert_eq!(RatioCategory::classify(1.0, 1.0, 2.0), RatioCategory::Normal);
        assert_eq!(RatioCategory::classify(3.0, 1.0, 2.0), RatioCategory::Siaga);
        assert_eq!(RatioCategory::classify(3.6, 1.0, 2.0), RatioCategory::TidakNormal);
    }

    #[test]
    fn bin_status_thresholds() {
        assert_eq!(BinStatus::classify(69.0, Some(100.0)), BinStatus::Aman);
        assert_eq!(BinStatus::classify(100.0, Some(100.0)), BinStatus::Waspada);
        assert_eq!(BinStatus::classify(101.0, Some(100.0)), BinStatus::Melebihi);
        assert_eq!(BinStatus::classify(1.0, None), BinStatus::TidakDiketahui);
        assert_eq!(BinStatus::classify(1.0, Some(0.0)), BinStatus::TidakDiketahui);
    }

    #[test]
    fn volume_uses_density_and_duplicate_capacity_columns() {
        let data = TimbulanData::from_table(&table(SAMPLE));
        let bins = volume_vs_capacity(&data.records);
        let x = bins.iter().find(|b| b.perusahaan_site == "PT X-A").unwrap();
        assert!((x.volume_organik_l - 22.0 / 0.12).abs() < 1e-9);
        assert!((x.volume_anorganik_l - 300.0).abs() < 1e-9);
        assert_eq!(x.kapasitas_anorganik_l, Some(50.0));
        assert_eq!(x.status_organik, BinStatus::Waspada);
        assert_eq!(x.status_anorganik, BinStatus::Melebihi);
        let y = bins.iter().find(|b| b.perusahaan_site == "PT Y-B").unwrap();
        assert_eq!(y.status_anorganik, BinStatus::TidakDiketahui);
    }

    #[test]
    fn ratio_analysis_skips_units_without_headcount() {
        let t = table("Site,Perusahaan,Man Power,Timbulan\nA,X,10,10\nB,Y,10,20\nC,Z,,5\n");
        let r = ratio_analysis(&TimbulanData::from_table(&t));
        assert_eq!(r.rows.len(), 3);
        let c = r.rows.iter().find(|r| r.perusahaan_site == "Z - C").unwrap();
        assert_eq!(c.rasio, None);
        assert_eq!(c.kategori, None);
        assert_eq!(r.q1, Some(1.25));
    }

    #[test]
    fn percent_managed_guards_zero() {
        assert_eq!(percent_managed(0.0, 10.0, 365.0), 0.0);
        assert!((percent_managed(10.0, 365.0, 365.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn cctv_requires_all_columns() {
        let t = table("Site,Perusahaan,Coverage 24jam\nA,X,1\n");
        assert_eq!(cctv_coverage(&t, &Filters::default()), None);
        let t = table(
            "Site,Perusahaan,Coverage 24jam,Coverage non 24jam,Tidak tercover,Total CCTV\nA,X,3,1,2,6\n",
        );
        let c = cctv_coverage(&t, &Filters::default()).unwrap();
        assert_eq!(c[0].perusahaan_site, "X-A");
        assert_eq!(c[0].total_cctv, 6.0);
    }
}
