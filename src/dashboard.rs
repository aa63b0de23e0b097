//! Overview tab, data-quality tab and the full per-tab report.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::filters::Filters;
use crate::fraud::{self, FraudConfig, FraudReport};
use crate::geo::{self, GeoPoint};
use crate::ketidaksesuaian::{self, KetidaksesuaianReport};
use crate::korelasi::{self, KorelasiReport};
use crate::logging::{log, obj, run_id, ts_now, v_num, v_str, Domain, Level, ProfileScope};
use crate::metrics::{self, Bucket, SeriesPoint};
use crate::program::{self, ProgramData, ProgramReport, TreatmentOverview, KATEGORI_PENGELOLAAN};
use crate::sheets::{SheetManifest, SheetName, Table, Workbook};
use crate::survey::{self, Gauge, SurveyKind, SurveyReport};
use crate::timbulan::{self, CrossSheetTotals, TimbulanData, TimbulanReport};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverviewMetrics {
    pub total_timbulan: f64,
    pub total_timbulan_all: f64,
    pub jumlah_program: usize,
    pub ketidaksesuaian_valid: usize,
    pub temuan_masuk: usize,
}

/// Unfiltered headline numbers. Only `valid`/`Valid` status counts.
pub fn overview_metrics(wb: &Workbook) -> OverviewMetrics {
    let timbulan = wb.table(SheetName::Timbulan);
    let program = wb.table(SheetName::Program);
    let ket = wb.table(SheetName::Ketidaksesuaian);
    let sum = |t: &Table, col: &str| t.iter().filter_map(|r| r.num(col)).sum::<f64>();
    OverviewMetrics {
        total_timbulan: sum(timbulan, "timbulan"),
        total_timbulan_all: sum(timbulan, "data_input_total"),
        jumlah_program: program.iter().filter(|r| r.get("nama_program").is_some()).count(),
        ketidaksesuaian_valid: ket
            .iter()
            .filter(|r| matches!(r.get("status_temuan"), Some("valid") | Some("Valid")))
            .count(),
        temuan_masuk: ket.iter().filter(|r| r.get("status_temuan").is_some()).count(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MapLayer {
    Site,
    Cctv,
    Keduanya,
}

impl MapLayer {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "site" | "timbulan" => MapLayer::Site,
            "cctv" => MapLayer::Cctv,
            _ => MapLayer::Keduanya,
        }
    }

    fn sites(&self) -> bool {
        matches!(self, MapLayer::Site | MapLayer::Keduanya)
    }

    fn cctv(&self) -> bool {
        matches!(self, MapLayer::Cctv | MapLayer::Keduanya)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteMarker {
    pub site: String,
    pub company_code: String,
    pub point: GeoPoint,
    /// `None` when no timbulan rows join to the coordinate.
    pub total_timbulan: Option<f64>,
    pub sampah_terkelola: Option<f64>,
    pub sampah_tidak_terkelola: Option<f64>,
}

/// Koordinat_UTM points joined on (site, company code) to timbulan totals
/// and daily Pengelolaan output.
pub fn site_markers(wb: &Workbook, days_period: f64) -> Vec<SiteMarker> {
    let koordinat = wb.table(SheetName::KoordinatUtm);
    let timbulan = TimbulanData::from_table(wb.table(SheetName::Timbulan));
    if koordinat.is_empty() || timbulan.records.is_empty() || !koordinat.has_all(&["x", "y"]) {
        return Vec::new();
    }

    let generated = metrics::sum_by(
        &timbulan.records,
        |r| (r.site.clone(), geo::company_to_code(&r.perusahaan)),
        |r| Some(r.timbulan),
    );
    let program = ProgramData::from_table(wb.table(SheetName::Program));
    let managed: BTreeMap<(String, String), f64> = metrics::sum_by(
        &program.records.iter().filter(|r| r.kategori == KATEGORI_PENGELOLAAN).collect::<Vec<_>>(),
        |r| (r.site.clone(), geo::company_to_code(&r.perusahaan)),
        |r| Some(r.total_calc.unwrap_or(0.0)),
    );

    koordinat
        .iter()
        .filter_map(|row| {
            let x = row.num("x")?;
            let y = row.num("y")?;
            let site = row.text("site");
            let company_code = geo::company_to_code(&row.text("company"));
            let key = (site.clone(), company_code.clone());
            let total = generated.get(&key).copied();
            let terkelola = total.map(|_| {
                let sum = managed.get(&key).copied().unwrap_or(0.0);
                if days_period > 0.0 {
                    sum / days_period
                } else {
                    0.0
                }
            });
            Some(SiteMarker {
                point: geo::utm_to_wgs84(x, y, geo::UTM_ZONE),
                sampah_tidak_terkelola: total.zip(terkelola).map(|(t, k)| t - k),
                total_timbulan: total,
                sampah_terkelola: terkelola,
                site,
                company_code,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CctvMarker {
    pub nama_titik: String,
    pub perusahaan: String,
    pub site: String,
    pub coverage: String,
    pub point: GeoPoint,
    pub color: &'static str,
}

/// CCTV points with a classifiable coordinate, coloured per company.
pub fn cctv_markers(cctv: &Table) -> Vec<CctvMarker> {
    if !cctv.has_all(&["easting", "northing"]) {
        return Vec::new();
    }
    let located: Vec<(crate::sheets::Row<'_>, GeoPoint)> = cctv
        .iter()
        .filter_map(|r| geo::parse_coord(&r.text("easting"), &r.text("northing")).map(|p| (r, p)))
        .collect();
    let companies: Vec<String> = located
        .iter()
        .filter_map(|(r, _)| r.get("perusahaan").map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    located
        .into_iter()
        .map(|(r, point)| {
            let perusahaan = r.text("perusahaan");
            CctvMarker {
                nama_titik: r.text("nama_titik_penaatan_ts"),
                color: geo::assign_color(&perusahaan, &companies),
                site: r.text("site"),
                coverage: r.text("coverage_cctv"),
                perusahaan,
                point,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub metrics: OverviewMetrics,
    pub treatment: TreatmentOverview,
    /// Span of the Program `tanggal` column in days, when present.
    pub tanggal_span_days: Option<i64>,
    pub site_markers: Vec<SiteMarker>,
    pub cctv_markers: Vec<CctvMarker>,
    pub proporsi_jenis_timbulan: Vec<Bucket>,
    pub per_site_jenis_timbulan: Vec<SeriesPoint>,
    pub proporsi_ketidaksesuaian: Vec<Bucket>,
    pub gauge_optimalitas: Option<Gauge>,
}

pub fn overview(wb: &Workbook, cfg: &Config, layer: MapLayer) -> Overview {
    let _scope = ProfileScope::new("overview");
    let headline = overview_metrics(wb);
    let programs = ProgramData::from_table(wb.table(SheetName::Program));
    let days = cfg.days_period as f64;
    let treatment = program::treatment_overview(&programs.records, headline.total_timbulan, days);

    let timbulan = TimbulanData::from_table(wb.table(SheetName::Timbulan));
    let (proporsi_jenis_timbulan, per_site_jenis_timbulan) = if wb.table(SheetName::Timbulan).has("jenis_timbulan") {
        let pie = metrics::buckets(metrics::sum_by(&timbulan.records, |r| r.jenis_timbulan.clone(), |r| Some(r.timbulan)));
        let mut bars: Vec<SeriesPoint> =
            metrics::sum_by(&timbulan.records, |r| (r.site.clone(), r.jenis_timbulan.clone()), |r| Some(r.timbulan))
                .into_iter()
                .map(|((x, series), value)| SeriesPoint { x, series, value })
                .collect();
        bars.sort_by(|a, b| {
            a.x.cmp(&b.x)
                .then(b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal))
        });
        (pie, bars)
    } else {
        (Vec::new(), Vec::new())
    };

    let ket = wb.table(SheetName::Ketidaksesuaian);
    let proporsi_ketidaksesuaian = if ket.has("kategori_subketidaksesuaian") {
        let kategori: Vec<&str> = ket
            .iter()
            .filter(|r| r.text("status_temuan").to_lowercase() == "valid")
            .filter_map(|r| r.get("kategori_subketidaksesuaian"))
            .collect();
        metrics::value_counts(kategori.into_iter())
    } else {
        Vec::new()
    };

    Overview {
        tanggal_span_days: programs.tanggal_span_days(),
        site_markers: if layer.sites() { site_markers(wb, days) } else { Vec::new() },
        cctv_markers: if layer.cctv() { cctv_markers(wb.table(SheetName::Cctv)) } else { Vec::new() },
        gauge_optimalitas: survey::overview_gauge(&survey::q2_values(&wb.survey())),
        metrics: headline,
        treatment,
        proporsi_jenis_timbulan,
        per_site_jenis_timbulan,
        proporsi_ketidaksesuaian,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetPreview {
    pub sheet: &'static str,
    pub rows: usize,
    pub columns: usize,
    pub preview: Table,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataQuality {
    pub previews: Vec<SheetPreview>,
    pub manifests: Vec<SheetManifest>,
    pub errors: Vec<String>,
}

pub fn data_quality(wb: &Workbook) -> DataQuality {
    let previews = SheetName::ALL
        .iter()
        .map(|&sheet| {
            let table = wb.table(sheet);
            let n = match sheet {
                SheetName::KoordinatUtm | SheetName::Cctv => 50,
                _ => 100,
            };
            SheetPreview { sheet: sheet.as_str(), rows: table.len(), columns: table.columns.len(), preview: table.head(n) }
        })
        .collect();
    DataQuality { previews, manifests: wb.manifests.clone(), errors: wb.errors.clone() }
}

/// Program, non-conformance and year totals for the timbulan tab cards.
pub fn cross_sheet_totals(wb: &Workbook, f: &Filters) -> CrossSheetTotals {
    let programs = ProgramData::from_table(wb.table(SheetName::Program));
    let selected: Vec<&program::ProgramRecord> = programs
        .records
        .iter()
        .filter(|r| f.site_company_ok(&r.site, &r.perusahaan))
        .filter(|r| !programs.has_year || f.year_ok(r.tahun))
        .collect();
    let (reports, _) = ketidaksesuaian::parse_reports(wb.table(SheetName::Ketidaksesuaian));
    let ket = ketidaksesuaian::compute_metrics(&ketidaksesuaian::apply_filters(&reports, f));

    let mut years: BTreeSet<i32> = TimbulanData::from_table(wb.table(SheetName::Timbulan)).years();
    years.extend(programs.years());
    years.extend(programs.records.iter().filter_map(|r| r.tahun));

    CrossSheetTotals {
        jumlah_program: selected.iter().filter(|r| r.has_name()).count(),
        total_program: selected.iter().filter_map(|r| r.total_calc).sum(),
        ketidaksesuaian_valid: ket.valid,
        temuan_masuk: ket.temuan_masuk,
        available_year_count: years.len(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub run_id: String,
    pub generated_at: String,
    pub params_fingerprint: String,
    pub filters: Filters,
    pub overview: Overview,
    pub timbulan: TimbulanReport,
    pub program: ProgramReport,
    pub survei: SurveyReport,
    pub ketidaksesuaian: KetidaksesuaianReport,
    pub fraud: FraudReport,
    pub korelasi: Option<KorelasiReport>,
    pub data_quality: DataQuality,
}

pub fn timbulan_tab(wb: &Workbook, f: &Filters) -> TimbulanReport {
    timbulan::build_report(
        wb.table(SheetName::Timbulan),
        wb.table(SheetName::JmlCctv),
        cross_sheet_totals(wb, f),
        f,
    )
}

pub fn program_tab(wb: &Workbook, cfg: &Config, f: &Filters) -> ProgramReport {
    let timbulan = TimbulanData::from_table(wb.table(SheetName::Timbulan));
    program::build_report(wb.table(SheetName::Program), &timbulan, f, cfg.days_period)
}

/// Fraud labels computed over the whole sheet, shown for the reports that
/// pass the sidebar filters.
pub fn fraud_tab(wb: &Workbook, cfg: &Config, f: &Filters) -> FraudReport {
    fraud::build_report(wb.table(SheetName::Ketidaksesuaian), &FraudConfig::from(cfg), f)
}

pub fn korelasi_tab(wb: &Workbook, cfg: &Config, f: &Filters) -> Option<KorelasiReport> {
    korelasi::build_report(
        &wb.survey(),
        wb.table(SheetName::Ketidaksesuaian),
        f,
        &FraudConfig::from(cfg),
        cfg.alpha,
    )
}

pub fn build(wb: &Workbook, cfg: &Config, f: &Filters, kind: SurveyKind) -> DashboardReport {
    let _scope = ProfileScope::new("dashboard_report");
    let report = DashboardReport {
        run_id: run_id(),
        generated_at: ts_now(),
        params_fingerprint: cfg.params_fingerprint(),
        filters: f.clone(),
        overview: overview(wb, cfg, MapLayer::Keduanya),
        timbulan: timbulan_tab(wb, f),
        program: program_tab(wb, cfg, f),
        survei: survey::build_report(wb, kind, f),
        ketidaksesuaian: ketidaksesuaian::build_report(wb.table(SheetName::Ketidaksesuaian), f),
        fraud: fraud_tab(wb, cfg, f),
        korelasi: korelasi_tab(wb, cfg, f),
        data_quality: data_quality(wb),
    };
    log(
        Level::Info,
        Domain::Report,
        "report_built",
        obj(&[
            ("params", v_str(&report.params_fingerprint)),
            ("sheet_errors", v_num(report.data_quality.errors.len() as f64)),
            ("fraud_total", v_num(report.fraud.total as f64)),
        ]),
    );
    report
}
