//! Reduction and treatment programs: name cleanup, clustering, the
//! month-column melt and the program tab's chart data.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::dates::{self, days_in_month};
use crate::filters::Filters;
use crate::logging::{log, obj, v_num, Domain, Level, ProfileScope};
use crate::metrics::{self, Bucket, SeriesPoint};
use crate::sheets::{title_case, Row, Table};

pub const KATEGORI_PENGURANGAN: &str = "Program Pengurangan";
pub const KATEGORI_PENGELOLAAN: &str = "Program Pengelolaan";

pub const MONTHS: [&str; 12] = [
    "januari", "februari", "maret", "april", "mei", "juni",
    "juli", "agustus", "september", "oktober", "november", "desember",
];

/// 1-based month number of an Indonesian month name.
pub fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim().to_lowercase();
    MONTHS.iter().position(|m| *m == lower).map(|i| i as u32 + 1)
}

fn month_column_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(januari|februari|maret|april|mei|juni|juli|agustus|september|oktober|november|desember)_(\d{4})$")
            .expect("static regex")
    })
}

/// `"januari_2025"` -> `(2025, 1)`.
pub fn parse_month_column(column: &str) -> Option<(i32, u32)> {
    let caps = month_column_re().captures(column)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let year = caps.get(2)?.as_str().parse().ok()?;
    Some((year, month))
}

/// Spelling fixes, then title case.
pub fn normalize_name(raw: &str) -> String {
    let txt = raw
        .to_lowercase()
        .replace("magot", "maggot")
        .replace("vermikomposting", "komposting")
        .replace("meal box", "mealbox")
        .replace("pack meal", "packmeal");
    title_case(&txt)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Cluster {
    MaggotBsf,
    Komposting,
    BankSampah,
    ReducePlastik,
    Lainnya,
}

impl Cluster {
    pub const ALL: [Cluster; 5] = [
        Cluster::MaggotBsf,
        Cluster::Komposting,
        Cluster::BankSampah,
        Cluster::ReducePlastik,
        Cluster::Lainnya,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::MaggotBsf => "Maggot/BSF",
            Cluster::Komposting => "Komposting",
            Cluster::BankSampah => "Bank Sampah",
            Cluster::ReducePlastik => "Reduce Plastik",
            Cluster::Lainnya => "Lainnya",
        }
    }

    pub fn classify(name: &str) -> Self {
        static RULES: OnceLock<Vec<(Regex, Cluster)>> = OnceLock::new();
        let rules = RULES.get_or_init(|| {
            [
                (r"maggot|hermetia|larva|budidaya", Cluster::MaggotBsf),
                (r"kompos|komposting|vermi", Cluster::Komposting),
                (r"bank sampah", Cluster::BankSampah),
                (r"reduce|tumbler|mealbox|packmeal|diet plastik|prasmanan", Cluster::ReducePlastik),
            ]
            .into_iter()
            .map(|(pat, c)| (Regex::new(pat).expect("static regex"), c))
            .collect()
        });
        let txt = name.to_lowercase();
        rules
            .iter()
            .find(|(re, _)| re.is_match(&txt))
            .map(|(_, c)| *c)
            .unwrap_or(Cluster::Lainnya)
    }

    pub fn waste_class(&self) -> WasteClass {
        match self {
            Cluster::MaggotBsf | Cluster::Komposting => WasteClass::Organik,
            Cluster::BankSampah => WasteClass::Anorganik,
            Cluster::ReducePlastik => WasteClass::Plastik,
            Cluster::Lainnya => WasteClass::Campuran,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WasteClass {
    Organik,
    Anorganik,
    Plastik,
    Campuran,
}

impl WasteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            WasteClass::Organik => "Organik",
            WasteClass::Anorganik => "Anorganik",
            WasteClass::Plastik => "Plastik",
            WasteClass::Campuran => "Campuran",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramRecord {
    pub site: String,
    pub perusahaan: String,
    pub nama_program: String,
    pub kategori: String,
    pub total_calc: Option<f64>,
    pub tahun: Option<i32>,
    pub tanggal: Option<NaiveDate>,
    pub cluster: Cluster,
    pub jenis_sampah: WasteClass,
}

impl ProgramRecord {
    pub fn from_row(row: &Row<'_>) -> Self {
        let nama_program = row.get("nama_program").map(normalize_name).unwrap_or_default();
        let cluster = Cluster::classify(&nama_program);
        Self {
            site: row.text("site"),
            perusahaan: row.text("perusahaan"),
            kategori: row.text("kategori"),
            total_calc: row.num("total_calc"),
            tahun: row.num("tahun").map(|y| y as i32),
            tanggal: row.get("tanggal").and_then(dates::parse_datetime).map(|dt| dt.date()),
            jenis_sampah: cluster.waste_class(),
            cluster,
            nama_program,
        }
    }

    pub fn has_name(&self) -> bool {
        !self.nama_program.is_empty()
    }
}

/// One program row for one month column (or the whole row when the sheet
/// has no month columns).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramEntry {
    pub source_row: usize,
    pub periode: Option<NaiveDate>,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramData {
    pub records: Vec<ProgramRecord>,
    pub month_columns: Vec<(String, i32, u32)>,
    pub entries: Vec<ProgramEntry>,
    pub has_year: bool,
}

impl ProgramData {
    /// Parses records and melts `<bulan>_<yyyy>` columns to long format.
    pub fn from_table(table: &Table) -> Self {
        let records: Vec<ProgramRecord> = table.iter().map(|r| ProgramRecord::from_row(&r)).collect();
        let month_columns: Vec<(String, i32, u32)> = table
            .columns
            .iter()
            .filter_map(|c| parse_month_column(c).map(|(y, m)| (c.clone(), y, m)))
            .collect();
        let mut entries = Vec::new();
        if month_columns.is_empty() {
            for (i, r) in records.iter().enumerate() {
                entries.push(ProgramEntry { source_row: i, periode: None, value: r.total_calc.unwrap_or(0.0) });
            }
        } else {
            for (i, row) in table.iter().enumerate() {
                for (col, year, month) in &month_columns {
                    entries.push(ProgramEntry {
                        source_row: i,
                        periode: NaiveDate::from_ymd_opt(*year, *month, 1),
                        value: row.num(col).unwrap_or(0.0),
                    });
                }
            }
        }
        Self { records, month_columns, entries, has_year: table.has("tahun") }
    }

    pub fn is_melted(&self) -> bool {
        !self.month_columns.is_empty()
    }

    pub fn years(&self) -> BTreeSet<i32> {
        self.month_columns.iter().map(|(_, y, _)| *y).collect()
    }

    pub fn record(&self, entry: &ProgramEntry) -> &ProgramRecord {
        &self.records[entry.source_row]
    }

    /// Entries passing site/company and, when melted, year/month filters.
    pub fn select(&self, f: &Filters) -> Vec<&ProgramEntry> {
        self.entries
            .iter()
            .filter(|e| {
                let r = self.record(e);
                if !f.site_company_ok(&r.site, &r.perusahaan) {
                    return false;
                }
                match e.periode {
                    Some(p) => f.year_ok(Some(p.year())) && f.month_ok(p.month()),
                    None => !self.has_year || f.year_ok(r.tahun),
                }
            })
            .collect()
    }

    /// Calendar days covered by the selected (year, month) pairs, or
    /// `default_days` when the sheet has no month columns.
    pub fn days_period(&self, f: &Filters, default_days: u32) -> u32 {
        if !self.is_melted() {
            return default_days;
        }
        let years: Vec<i32> = if f.years.is_empty() { self.years().into_iter().collect() } else { f.years.clone() };
        let months: Vec<u32> = if f.months.is_empty() { (1..=12).collect() } else { f.months.clone() };
        years
            .iter()
            .flat_map(|y| months.iter().filter_map(move |m| days_in_month(*y, *m)))
            .sum()
    }

    /// Days between the earliest and latest `tanggal`, when present.
    pub fn tanggal_span_days(&self) -> Option<i64> {
        let dates: Vec<NaiveDate> = self.records.iter().filter_map(|r| r.tanggal).collect();
        let min = dates.iter().min()?;
        let max = dates.iter().max()?;
        Some((*max - *min).num_days())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgramCounts {
    pub total: usize,
    pub pengurangan_unik: usize,
    pub pengelolaan_unik: usize,
    pub per_cluster_unik: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SankeyLink {
    pub source: usize,
    pub target: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sankey {
    pub nodes: Vec<String>,
    pub links: Vec<SankeyLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SunburstNode {
    pub cluster: String,
    pub jenis_sampah: String,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionRow {
    pub perusahaan: String,
    pub site: String,
    pub cluster: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedVsGenerated {
    pub perusahaan_site: String,
    pub timbulan: f64,
    pub terkelola: f64,
    pub tidak_terkelola: f64,
    pub reduce: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramInsight {
    pub top_cluster: String,
    pub top_company: String,
    pub top_site: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramReport {
    pub days_period: u32,
    pub counts: ProgramCounts,
    pub sunburst: Vec<SunburstNode>,
    pub kategori_jenis: Vec<SeriesPoint>,
    pub trend_cluster: Vec<SeriesPoint>,
    pub trend_kategori: Vec<SeriesPoint>,
    pub sankey: Sankey,
    pub distribusi: Vec<DistributionRow>,
    pub timbulan_vs_terkelola: Vec<ManagedVsGenerated>,
    pub insight: Option<ProgramInsight>,
    pub available_years: Vec<i32>,
}

/// Distinct named source rows behind `entries`.
fn distinct_rows<'a>(data: &'a ProgramData, entries: &[&ProgramEntry]) -> Vec<&'a ProgramRecord> {
    let rows: BTreeSet<usize> = entries.iter().map(|e| e.source_row).collect();
    rows.into_iter()
        .map(|i| &data.records[i])
        .filter(|r| r.has_name())
        .collect()
}

pub fn counts(rows: &[&ProgramRecord]) -> ProgramCounts {
    let unique = |pred: &dyn Fn(&ProgramRecord) -> bool| {
        rows.iter()
            .filter(|r| pred(r))
            .map(|r| r.nama_program.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    };
    ProgramCounts {
        total: rows.len(),
        pengurangan_unik: unique(&|r: &ProgramRecord| r.kategori == KATEGORI_PENGURANGAN),
        pengelolaan_unik: unique(&|r: &ProgramRecord| r.kategori == KATEGORI_PENGELOLAAN),
        per_cluster_unik: Cluster::ALL
            .iter()
            .map(|c| Bucket {
                label: c.as_str().to_string(),
                value: unique(&|r: &ProgramRecord| r.cluster == *c) as f64,
            })
            .collect(),
    }
}

pub fn sankey(rows: &[&ProgramRecord]) -> Sankey {
    let pairs = metrics::count_by(rows, |r| (r.jenis_sampah.as_str(), r.cluster.as_str()));
    let mut nodes: Vec<String> = Vec::new();
    for (src, _) in pairs.keys() {
        if !nodes.iter().any(|n| n == src) {
            nodes.push(src.to_string());
        }
    }
    let first_target = nodes.len();
    for (_, dst) in pairs.keys() {
        if !nodes[first_target..].iter().any(|n| n == dst) {
            nodes.push(dst.to_string());
        }
    }
    let index = |name: &str, from: usize| nodes[from..].iter().position(|n| n == name).map(|i| i + from);
    let links = pairs
        .iter()
        .filter_map(|((src, dst), count)| {
            Some(SankeyLink {
                source: index(src, 0)?,
                target: index(dst, first_target)?,
                value: *count as f64,
            })
        })
        .collect();
    Sankey { nodes, links }
}

fn argmax(map: &BTreeMap<String, usize>) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for (k, v) in map {
        if best.map_or(true, |(_, b)| *v > b) {
            best = Some((k, *v));
        }
    }
    best.map(|(k, _)| k.clone())
}

pub fn insight(rows: &[&ProgramRecord]) -> Option<ProgramInsight> {
    if rows.is_empty() {
        return None;
    }
    Some(ProgramInsight {
        top_cluster: argmax(&metrics::count_by(rows, |r| r.cluster.as_str().to_string()))?,
        top_company: argmax(&metrics::count_by(rows, |r| r.perusahaan.clone()))?,
        top_site: argmax(&metrics::count_by(rows, |r| r.site.clone()))?,
    })
}

fn trend(
    data: &ProgramData,
    entries: &[&ProgramEntry],
    series: impl Fn(&ProgramRecord) -> String,
) -> Vec<SeriesPoint> {
    let mut sums: BTreeMap<(NaiveDate, String), f64> = BTreeMap::new();
    for e in entries {
        if let Some(p) = e.periode {
            *sums.entry((p, series(data.record(e)))).or_insert(0.0) += e.value;
        }
    }
    sums.into_iter()
        .map(|((p, s), value)| SeriesPoint { x: p.format("%Y-%m-%d").to_string(), series: s, value })
        .collect()
}

/// Generated vs managed vs reduced per company-site. Treatment and
/// reduction come from the selected entries' values.
pub fn managed_vs_generated(
    timbulan: &[crate::timbulan::TimbulanRecord],
    data: &ProgramData,
    entries: &[&ProgramEntry],
) -> Vec<ManagedVsGenerated> {
    let generated = metrics::sum_by(timbulan, |r| (r.perusahaan.clone(), r.site.clone()), |r| Some(r.timbulan));
    let mut managed: BTreeMap<(String, String), f64> = BTreeMap::new();
    let mut reduced: BTreeMap<(String, String), f64> = BTreeMap::new();
    for e in entries {
        let r = data.record(e);
        let key = (r.perusahaan.clone(), r.site.clone());
        if r.kategori == KATEGORI_PENGELOLAAN {
            *managed.entry(key).or_insert(0.0) += e.value;
        } else if r.kategori == KATEGORI_PENGURANGAN {
            *reduced.entry(key).or_insert(0.0) += e.value;
        }
    }
    generated
        .into_iter()
        .map(|(key, timbulan)| {
            let terkelola = managed.get(&key).copied().unwrap_or(0.0);
            ManagedVsGenerated {
                perusahaan_site: format!("{} - {}", key.0, key.1),
                timbulan,
                terkelola,
                tidak_terkelola: timbulan - terkelola,
                reduce: reduced.get(&key).copied().unwrap_or(0.0),
            }
        })
        .collect()
}

pub fn build_report(
    program: &Table,
    timbulan: &crate::timbulan::TimbulanData,
    f: &Filters,
    default_days: u32,
) -> ProgramReport {
    let _scope = ProfileScope::new("program_report");
    let data = ProgramData::from_table(program);
    let entries = data.select(f);
    let rows = distinct_rows(&data, &entries);
    let days_period = data.days_period(f, default_days);
    log(
        Level::Debug,
        Domain::Metrics,
        "program_selection",
        obj(&[
            ("entries", v_num(entries.len() as f64)),
            ("programs", v_num(rows.len() as f64)),
            ("days_period", v_num(days_period as f64)),
        ]),
    );

    let sunburst = metrics::count_by(&rows, |r| (r.cluster.as_str(), r.jenis_sampah.as_str()))
        .into_iter()
        .map(|((c, j), n)| SunburstNode { cluster: c.to_string(), jenis_sampah: j.to_string(), count: n as f64 })
        .collect();
    let kategori_jenis = metrics::count_by(&rows, |r| (r.kategori.clone(), r.jenis_sampah.as_str()))
        .into_iter()
        .map(|((k, j), n)| SeriesPoint { x: k, series: j.to_string(), value: n as f64 })
        .collect();
    let distribusi = metrics::count_by(&rows, |r| (r.perusahaan.clone(), r.site.clone(), r.cluster.as_str()))
        .into_iter()
        .map(|((perusahaan, site, cluster), count)| DistributionRow {
            perusahaan,
            site,
            cluster: cluster.to_string(),
            count,
        })
        .collect();
    let timbulan_f = timbulan.filtered(&Filters { years: Vec::new(), ..f.clone() });

    ProgramReport {
        days_period,
        counts: counts(&rows),
        sunburst,
        kategori_jenis,
        trend_cluster: trend(&data, &entries, |r| r.cluster.as_str().to_string()),
        trend_kategori: trend(&data, &entries, |r| r.kategori.clone()),
        sankey: sankey(&rows),
        distribusi,
        timbulan_vs_terkelola: managed_vs_generated(&timbulan_f.records, &data, &entries),
        insight: insight(&rows),
        available_years: data.years().into_iter().collect(),
    }
}

/// Daily treatment/reduction against daily generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TreatmentOverview {
    pub days_period: f64,
    pub total_program: f64,
    pub pengolahan_per_hari: f64,
    pub persen_pengolahan: f64,
    pub pengurangan_per_hari: f64,
    pub persen_pengurangan: f64,
    pub sisa_per_hari: f64,
    pub persen_sisa: f64,
}

/// Treatment and reduction percentages are reported as computed; only the
/// unmanaged share is clamped to `[0, 100]`.
pub fn treatment_overview(records: &[ProgramRecord], total_timbulan: f64, days_period: f64) -> TreatmentOverview {
    let per_day = |kategori: &str| {
        let sum: f64 = records
            .iter()
            .filter(|r| r.kategori == kategori)
            .filter_map(|r| r.total_calc)
            .sum();
        if days_period > 0.0 {
            sum / days_period
        } else {
            0.0
        }
    };
    let pengolahan = per_day(KATEGORI_PENGELOLAAN);
    let pengurangan = per_day(KATEGORI_PENGURANGAN);
    let sisa = total_timbulan - pengolahan;
    TreatmentOverview {
        days_period,
        total_program: records.iter().filter_map(|r| r.total_calc).sum(),
        pengolahan_per_hari: pengolahan,
        persen_pengolahan: metrics::pct(pengolahan, total_timbulan),
        pengurangan_per_hari: pengurangan,
        persen_pengurangan: metrics::pct(pengurangan, total_timbulan),
        sisa_per_hari: sisa,
        persen_sisa: metrics::clamp_pct(metrics::pct(sisa, total_timbulan)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_program_names() {
        assert_eq!(normalize_name("budidaya MAGOT bsf"), "Budidaya Maggot Bsf");
        assert_eq!(normalize_name("vermikomposting"), "Komposting");
        assert_eq!(normalize_name("diet meal box"), "Diet Mealbox");
        assert_eq!(normalize_name("pack meal"), "Packmeal");
    }

    #[test]
    fn clusters_and_waste_classes() {
        assert_eq!(Cluster::classify("Budidaya Maggot"), Cluster::MaggotBsf);
        assert_eq!(Cluster::classify("Komposting"), Cluster::Komposting);
        assert_eq!(Cluster::classify("Bank Sampah Unit"), Cluster::BankSampah);
        assert_eq!(Cluster::classify("Tumbler Day"), Cluster::ReducePlastik);
        assert_eq!(Cluster::classify("Senam"), Cluster::Lainnya);
        assert_eq!(Cluster::ReducePlastik.waste_class(), WasteClass::Plastik);
        assert_eq!(Cluster::Lainnya.waste_class(), WasteClass::Campuran);
    }

    #[test]
    fn month_columns_melt_to_long() {
        let t = Table::from_csv_str(
            "Site,Perusahaan,Nama Program,Kategori,Januari 2025,Februari 2025\n\
             A,PT X,Kompos,Program Pengelolaan,10,20\n\
             A,PT X,Tumbler,Program Pengurangan,1,\n",
        )
        .unwrap();
        let data = ProgramData::from_table(&t);
        assert!(data.is_melted());
        assert_eq!(data.entries.len(), 4);
        let f = Filters { months: vec![2], ..Filters::default() };
        let sel = data.select(&f);
        assert_eq!(sel.len(), 2);
        assert_eq!(data.days_period(&f, 609), 28);
        assert_eq!(data.days_period(&Filters::default(), 609), 365);
        let trend = trend(&data, &sel, |r| r.cluster.as_str().to_string());
        assert_eq!(trend[0].value, 20.0);
    }

    #[test]
    fn wide_sheet_uses_default_days() {
        let t = Table::from_csv_str("Site,Nama Program,Total_calc\nA,Kompos,5\n").unwrap();
        let data = ProgramData::from_table(&t);
        assert!(!data.is_melted());
        assert_eq!(data.days_period(&Filters::default(), 609), 609);
        assert_eq!(data.entries[0].value, 5.0);
    }

    #[test]
    fn overview_clamps_only_unmanaged_share() {
        let t = Table::from_csv_str(
            "Nama Program,Kategori,Total_calc\nKompos,Program Pengelolaan,2000\nTumbler,Program Pengurangan,100\n",
        )
        .unwrap();
        let data = ProgramData::from_table(&t);
        let o = treatment_overview(&data.records, 10.0, 100.0);
        assert_eq!(o.pengolahan_per_hari, 20.0);
        assert_eq!(o.persen_pengolahan, 200.0);
        assert_eq!(o.persen_pengurangan, 10.0);
        assert_eq!(o.persen_sisa, 0.0);
        let none = treatment_overview(&data.records, 0.0, 100.0);
        assert_eq!(none.persen_pengolahan, 0.0);
        assert_eq!(none.persen_sisa, 0.0);
    }

    #[test]
    fn sankey_links_class_to_cluster() {
        let t = Table::from_csv_str("Nama Program\nKompos\nMaggot\nBank Sampah\n").unwrap();
        let data = ProgramData::from_table(&t);
        let rows: Vec<&ProgramRecord> = data.records.iter().collect();
        let s = sankey(&rows);
        assert_eq!(s.nodes, vec!["Anorganik", "Organik", "Bank Sampah", "Komposting", "Maggot/BSF"]);
        assert_eq!(s.links.len(), 3);
        let organik = s.nodes.iter().position(|n| n == "Organik").unwrap();
        assert_eq!(s.links.iter().filter(|l| l.source == organik).count(), 2);
        let i = insight(&rows).unwrap();
        assert_eq!(i.top_cluster, "Bank Sampah");
    }

    #[test]
    fn counts_unique_names_per_category() {
        let t = Table::from_csv_str(
            "Nama Program,Kategori\nKompos,Program Pengelolaan\nkompos,Program Pengelolaan\nTumbler,Program Pengurangan\n,Program Pengurangan\n",
        )
        .unwrap();
        let data = ProgramData::from_table(&t);
        let rows: Vec<&ProgramRecord> = data.records.iter().filter(|r| r.has_name()).collect();
        let c = counts(&rows);
        assert_eq!(c.total, 3);
        assert_eq!(c.pengelolaan_unik, 1);
        assert_eq!(c.pengurangan_unik, 1);
    }
}
