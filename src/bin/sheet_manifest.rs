use gbst_dashboard::config::Config;
use gbst_dashboard::sheets::{load_workbook, source::source_from_config, SheetName};
use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Fetches the named sheets (all by default) and writes their manifests
/// to `<OUT_DIR>/sheet_manifest.json`. Exits 2 when a sheet failed to
/// load or lacks expected columns.
#[tokio::main]
async fn main() {
    let cfg = Config::from_env();
    let requested: Vec<String> = env::args().skip(1).collect();
    let sheets: Vec<SheetName> = if requested.is_empty() {
        SheetName::ALL.to_vec()
    } else {
        let mut out = Vec::new();
        for name in &requested {
            match SheetName::parse(name) {
                Some(s) => out.push(s),
                None => {
                    eprintln!("unknown sheet {:?}", name);
                    eprintln!("known sheets: {:?}", SheetName::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>());
                    std::process::exit(1);
                }
            }
        }
        out
    };

    let source = match source_from_config(&cfg) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("source setup failed: {:#}", err);
            std::process::exit(3);
        }
    };
    let wb = load_workbook(source.as_ref(), &sheets).await;

    let incomplete: Vec<&str> = wb
        .manifests
        .iter()
        .filter(|m| !m.missing_columns.is_empty() || m.row_count == 0)
        .map(|m| m.sheet.as_str())
        .collect();
    for m in &wb.manifests {
        println!(
            "{:<16} rows={:<6} cols={:<3} sha256={} {}",
            m.sheet,
            m.row_count,
            m.columns.len(),
            &m.hash_sha256[..12.min(m.hash_sha256.len())],
            m.warnings.join("; ")
        );
    }
    for err in &wb.errors {
        eprintln!("{}", err);
    }

    let out_dir = PathBuf::from(&cfg.out_dir);
    let out_path = out_dir.join("sheet_manifest.json");
    let payload = json!({
        "source": source.describe(),
        "params": cfg.params_fingerprint(),
        "manifests": &wb.manifests,
        "errors": &wb.errors,
    });
    let written = fs::create_dir_all(&out_dir)
        .and_then(|_| serde_json::to_string_pretty(&payload).map_err(std::io::Error::from))
        .and_then(|body| fs::write(&out_path, body));
    if let Err(err) = written {
        eprintln!("failed to write {}: {}", out_path.display(), err);
        std::process::exit(4);
    }
    println!("wrote manifest {}", out_path.display());

    if !wb.errors.is_empty() || !incomplete.is_empty() {
        std::process::exit(2);
    }
}
