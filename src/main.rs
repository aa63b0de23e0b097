use anyhow::{bail, Context, Result};
use gbst_dashboard::config::Config;
use gbst_dashboard::dashboard;
use gbst_dashboard::filters::Filters;
use gbst_dashboard::fraud::{self, FraudConfig};
use gbst_dashboard::ketidaksesuaian;
use gbst_dashboard::logging::{log, obj, run_id, v_num, v_str, Domain, Level};
use gbst_dashboard::sheets::{load_workbook, source::source_from_config, SheetName};
use gbst_dashboard::survey::SurveyKind;
use std::fs;
use std::path::PathBuf;

const USAGE: &str = "usage: gbst [report [QUERY] | fraud | export-valid [PATH]]

  report        build every tab and write <OUT_DIR>/report.json (default)
                QUERY filters like the HTTP API, e.g. 'site=A&tahun=2025'
  fraud         labelled Ketidaksesuaian rows as CSV on stdout
  export-valid  valid Ketidaksesuaian rows as CSV
                (default <OUT_DIR>/ketidaksesuaian_valid.csv)";

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("report");
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("command", v_str(command)),
            ("run_id", v_str(&run_id())),
            ("params", v_str(&cfg.params_fingerprint())),
        ]),
    );

    match command {
        "report" => run_report(&cfg, args.get(1).map(String::as_str).unwrap_or("")).await,
        "fraud" => run_fraud(&cfg).await,
        "export-valid" => run_export_valid(&cfg, args.get(1)).await,
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }
}

async fn run_report(cfg: &Config, query: &str) -> Result<()> {
    let source = source_from_config(cfg)?;
    let wb = load_workbook(source.as_ref(), &SheetName::ALL).await;
    let filters = Filters::from_query(query);
    let kind = url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "survei")
        .map(|(_, v)| SurveyKind::parse(&v))
        .unwrap_or(SurveyKind::Gabungan);
    let report = dashboard::build(&wb, cfg, &filters, kind);

    let out_dir = PathBuf::from(&cfg.out_dir);
    fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let report_path = out_dir.join("report.json");
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("write {}", report_path.display()))?;
    let csv_path = out_dir.join("ketidaksesuaian_valid.csv");
    fs::write(&csv_path, ketidaksesuaian::export_valid_csv(wb.table(SheetName::Ketidaksesuaian))?)
        .with_context(|| format!("write {}", csv_path.display()))?;

    log(
        Level::Info,
        Domain::Report,
        "report_written",
        obj(&[
            ("path", v_str(&report_path.to_string_lossy())),
            ("sheet_errors", v_num(wb.errors.len() as f64)),
        ]),
    );
    for err in &wb.errors {
        eprintln!("{}", err);
    }
    println!("wrote {}", report_path.display());
    println!("wrote {}", csv_path.display());
    Ok(())
}

async fn run_fraud(cfg: &Config) -> Result<()> {
    let source = source_from_config(cfg)?;
    let wb = load_workbook(source.as_ref(), &[SheetName::Ketidaksesuaian]).await;
    let table = wb.table(SheetName::Ketidaksesuaian);
    if table.is_empty() {
        bail!("Ketidaksesuaian sheet is empty or failed to load");
    }
    print!("{}", fraud::labelled_csv(table, &FraudConfig::from(cfg))?);
    Ok(())
}

async fn run_export_valid(cfg: &Config, path: Option<&String>) -> Result<()> {
    let source = source_from_config(cfg)?;
    let wb = load_workbook(source.as_ref(), &[SheetName::Ketidaksesuaian]).await;
    let out = path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.out_dir).join("ketidaksesuaian_valid.csv"));
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&out, ketidaksesuaian::export_valid_csv(wb.table(SheetName::Ketidaksesuaian))?)
        .with_context(|| format!("write {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}
