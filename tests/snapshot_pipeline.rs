use gbst_dashboard::config::Config;
use gbst_dashboard::dashboard::{self, MapLayer};
use gbst_dashboard::filters::Filters;
use gbst_dashboard::fraud::{FraudConfig, FraudLabel};
use gbst_dashboard::geo::parse_coord;
use gbst_dashboard::ketidaksesuaian;
use gbst_dashboard::sheets::{load_workbook, DirSource, SheetName, Workbook};
use gbst_dashboard::survey::SurveyKind;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_sheet(dir: &Path, sheet: SheetName, header: &str, rows: &[&str]) {
    let mut out = String::new();
    out.push_str(header);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    fs::write(dir.join(format!("{}.csv", sheet.as_str())), out).unwrap();
}

fn snapshot() -> TempDir {
    let dir = TempDir::new().unwrap();
    let p = dir.path();
    write_sheet(
        p,
        SheetName::Timbulan,
        "Site,Perusahaan,Tahun,Timbulan,Man Power,Jenis Timbulan,Jenis Sampah",
        &[
            "S1,PT A,2024,100,50,Organik,Organik",
            "S1,PT A,2024,50,50,Plastik,Anorganik",
            "S1,PT A,2025,60,40,Organik,Organik",
            "S2,PT B,2025,30,10,Kertas,Anorganik",
        ],
    );
    write_sheet(
        p,
        SheetName::Program,
        "Site,Perusahaan,Nama Program,Kategori,Total_Calc",
        &[
            "S1,PT A,Kompos,Program Pengelolaan,609000",
            "S1,PT A,Tumbler,Program Pengurangan,0",
        ],
    );
    write_sheet(
        p,
        SheetName::Ketidaksesuaian,
        "TanggalLapor,Site,Perusahaan,Pelapor,Kategori_SubKetidaksesuaian,Sub_Ketidaksesuaian,Deskripsi,status_temuan",
        &[
            "01/03/2025 08:00:00,S1,PT A,Budi,Perilaku,Sampah Tercampur,sampah organik tercampur plastik di tps,Valid",
            "01/03/2025 09:30:00,S1,PT A,Budi,Perilaku,Sampah Tercampur,sampah organik tercampur plastik di tps,Valid",
            "02/03/2025 10:00:00,S2,PT B,Ani,Non Perilaku,Tong Sampah,area sekitar tong terlihat rapi,Fraud",
            "05/03/2025 11:00:00,S2,PT B,Citra,Non Perilaku,Tong Sampah,tong sampahnya penuhnya dan banyak kotoran,Valid",
        ],
    );
    let survey_header = "Kode SID,Perusahaan Area Kerja Tambang,Site / Lokasi Kerja,\
                         \"2. Seberapa optimal program GBST berjalan selama ini di perusahaan Anda?\"";
    write_sheet(p, SheetName::SurveiOnline, survey_header, &["1,PT A,S1,4", "2,PT A,S1,2", "3,PT B,S2,5"]);
    write_sheet(p, SheetName::SurveiOffline, survey_header, &["4,PT B,S2,3"]);
    write_sheet(p, SheetName::KoordinatUtm, "Site,Company,X,Y", &["S1,PT A,500000,110000"]);
    write_sheet(
        p,
        SheetName::Cctv,
        "Perusahaan,Site,Easting,Northing,Nama Titik Penaatan TS,Coverage CCTV",
        &[
            "PT A,S1,116.85°E,-1.25,TPS A,24 Jam",
            "PT B,S2,500000,110000,TPS B,24 Jam",
            "PT B,S2,5000,-3,TPS C,",
        ],
    );
    dir
}

async fn load(dir: &TempDir) -> Workbook {
    load_workbook(&DirSource::new(dir.path()), &SheetName::ALL).await
}

#[test]
fn coordinates_are_identity_reprojected_or_rejected() {
    let deg = parse_coord("116.85°E", "-1.25").unwrap();
    assert_eq!((deg.lon, deg.lat), (116.85, -1.25));
    let utm = parse_coord("500000", "110000").unwrap();
    assert!((utm.lon - 117.0).abs() < 1e-6);
    assert!(utm.lat > 0.9 && utm.lat < 1.1, "lat={}", utm.lat);
    assert!(parse_coord("5000", "-3").is_none());
    assert!(parse_coord("", "1").is_none());
}

#[tokio::test]
async fn missing_sheet_is_reported_not_fatal() {
    let dir = snapshot();
    let wb = load(&dir).await;
    // Jml_CCTV has no snapshot file
    assert_eq!(wb.errors.len(), 1);
    assert!(wb.errors[0].contains("Jml_CCTV"));
    assert_eq!(wb.manifests.len(), SheetName::ALL.len() - 1);
    assert!(wb.manifests.iter().all(|m| m.hash_sha256.len() == 64));
}

#[tokio::test]
async fn per_capita_counts_each_unit_once() {
    let dir = snapshot();
    let wb = load(&dir).await;
    let all = dashboard::timbulan_tab(&wb, &Filters::default());
    // (S1, PT A, 2024) appears twice but contributes 50 people once
    assert_eq!(all.headline.total_manpower, 100.0);
    assert_eq!(all.headline.total_timbulan, 240.0);
    assert!((all.headline.rasio_manpower - 2.4).abs() < 1e-12);
    let sni = all.sni.unwrap();
    assert_eq!(sni.total_manpower_unik, 100.0);
    assert_eq!(sni.per_site[0].site, "S2");
    assert_eq!(sni.per_site[0].kg_per_orang, Some(3.0));

    let only_2025 = dashboard::timbulan_tab(&wb, &Filters::from_query("tahun=2025"));
    assert_eq!(only_2025.headline.total_manpower, 50.0);
    assert_eq!(only_2025.headline.total_timbulan, 90.0);
    assert_eq!(only_2025.days_period, 365.0);
    assert!(all.cctv.is_none());
}

#[tokio::test]
async fn fraud_labels_cover_the_three_cases() {
    let dir = snapshot();
    let wb = load(&dir).await;
    let report = dashboard::fraud_tab(&wb, &Config::default(), &Filters::default());
    let labels: Vec<FraudLabel> = report.assessments.iter().map(|a| a.label).collect();
    assert_eq!(labels[0], FraudLabel::Duplication);
    assert_eq!(labels[1], FraudLabel::Duplication);
    assert!(report.assessments[0].signals.exact_duplicate);
    assert_eq!(labels[2], FraudLabel::UnsupportedStatus);
    assert_eq!(report.assessments[2].label_text, "Fraud: Status Tidak Didukung Bukti");
    assert_eq!(labels[3], FraudLabel::ValidFinding);
    assert_eq!(report.per_company_site, vec![
        ("PT A".to_string(), "S1".to_string(), 2),
        ("PT B".to_string(), "S2".to_string(), 1),
    ]);
}

#[tokio::test]
async fn fraud_filters_never_change_labels() {
    let dir = snapshot();
    let wb = load(&dir).await;
    let cfg = Config::default();
    let all = dashboard::fraud_tab(&wb, &cfg, &Filters::default());
    for query in ["site=S1", "perusahaan=PT B", "tahun=2025&bulan=3", "site=S2&bulan=3"] {
        let part = dashboard::fraud_tab(&wb, &cfg, &Filters::from_query(query));
        assert!(!part.assessments.is_empty(), "{}", query);
        for a in &part.assessments {
            let full = all.assessments.iter().find(|b| b.row == a.row).unwrap();
            assert_eq!(a, full, "{}", query);
        }
    }
    let s2 = dashboard::fraud_tab(&wb, &cfg, &Filters::from_query("site=S2"));
    assert_eq!(s2.total, 2);
    assert_eq!(s2.per_company_site, vec![("PT B".to_string(), "S2".to_string(), 1)]);
    assert!(dashboard::fraud_tab(&wb, &cfg, &Filters::from_query("bulan=4")).assessments.is_empty());
}

#[tokio::test]
async fn unmanaged_share_is_clamped() {
    let dir = snapshot();
    let wb = load(&dir).await;
    let o = dashboard::overview(&wb, &Config::default(), MapLayer::Keduanya);
    // 609000 kg over 609 days is far above 240 kg/day generated
    assert_eq!(o.treatment.pengolahan_per_hari, 1000.0);
    assert!(o.treatment.persen_pengolahan > 100.0);
    assert_eq!(o.treatment.persen_sisa, 0.0);
    assert_eq!(o.site_markers.len(), 1);
    assert_eq!(o.site_markers[0].total_timbulan, Some(210.0));
    assert_eq!(o.cctv_markers.len(), 2);
    let gauge = o.gauge_optimalitas.unwrap();
    assert_eq!(gauge.value, 3.5);
    assert_eq!(gauge.max, 5.0);
}

#[tokio::test]
async fn korelasi_joins_survey_and_valid_counts() {
    let dir = snapshot();
    let wb = load(&dir).await;
    let k = dashboard::korelasi_tab(&wb, &Config::default(), &Filters::default()).unwrap();
    assert_eq!(k.rows.len(), 2);
    let a = &k.rows[0];
    assert_eq!((a.perusahaan.as_str(), a.feedback_q2, a.jumlah_ketidaksesuaian), ("PT A", 3.0, 2));
    assert_eq!(a.jumlah_fraud, 2);
    assert_eq!(a.ketidaksesuaian_scaled, 5.0);
    assert_eq!(k.rows[1].ketidaksesuaian_scaled, 0.0);
    assert_eq!(k.baseline_feedback, Some(3.5));
}

#[tokio::test]
async fn full_report_and_exports() {
    let dir = snapshot();
    let wb = load(&dir).await;
    let report = dashboard::build(&wb, &Config::default(), &Filters::default(), SurveyKind::Gabungan);
    let json = serde_json::to_value(&report).unwrap();
    for key in ["overview", "timbulan", "program", "survei", "ketidaksesuaian", "fraud", "korelasi", "data_quality"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(report.survei.responses, 4);
    assert_eq!(report.ketidaksesuaian.metrics.valid, 3);

    let csv = ketidaksesuaian::export_valid_csv(wb.table(SheetName::Ketidaksesuaian)).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.lines().next().unwrap().contains("status_temuan"));

    let labelled = gbst_dashboard::fraud::labelled_csv(wb.table(SheetName::Ketidaksesuaian), &FraudConfig::default()).unwrap();
    assert!(labelled.lines().next().unwrap().ends_with("max_similarity"));
    assert_eq!(labelled.lines().count(), 5);
}
