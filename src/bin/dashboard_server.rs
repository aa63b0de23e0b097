//! Dashboard API Server
//!
//! Serves each dashboard tab as JSON. Sheets are reloaded per request.
//! Run with: cargo run --bin dashboard_server

use anyhow::Result;
use gbst_dashboard::config::Config;
use gbst_dashboard::dashboard::{self, MapLayer};
use gbst_dashboard::filters::Filters;
use gbst_dashboard::fraud::{self, FraudConfig};
use gbst_dashboard::ketidaksesuaian;
use gbst_dashboard::logging::{log, obj, v_num, v_str, Domain, Level};
use gbst_dashboard::sheets::{load_workbook, source::source_from_config, SheetName, Workbook};
use gbst_dashboard::survey::{self, SurveyKind};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;

struct Response {
    status: &'static str,
    content_type: &'static str,
    body: String,
}

impl Response {
    fn json(body: String) -> Self {
        Self { status: "200 OK", content_type: "application/json", body }
    }
}

fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Sheets a route reads; `None` for unknown routes.
fn sheets_for(path: &str) -> Option<Vec<SheetName>> {
    let sheets = match path {
        "/api/ketidaksesuaian"
        | "/api/fraud"
        | "/api/export/ketidaksesuaian_valid.csv"
        | "/api/export/fraud.csv" => {
            vec![SheetName::Ketidaksesuaian]
        }
        "/api/survei" => vec![SheetName::SurveiOnline, SheetName::SurveiOffline],
        "/api/korelasi" => vec![SheetName::SurveiOnline, SheetName::SurveiOffline, SheetName::Ketidaksesuaian],
        "/api/overview" | "/api/timbulan" | "/api/program" | "/api/data_quality" => SheetName::ALL.to_vec(),
        _ => return None,
    };
    Some(sheets)
}

fn not_found() -> Response {
    Response { status: "404 NOT FOUND", content_type: "text/plain", body: "Not Found".to_string() }
}

fn route(path: &str, query: &str, wb: &Workbook, cfg: &Config) -> Result<Option<Response>> {
    let f = Filters::from_query(query);
    let body = match path {
        "/api/overview" => {
            let layer = MapLayer::parse(&query_param(query, "peta").unwrap_or_default());
            serde_json::to_string(&dashboard::overview(wb, cfg, layer))?
        }
        "/api/timbulan" => serde_json::to_string(&dashboard::timbulan_tab(wb, &f))?,
        "/api/program" => serde_json::to_string(&dashboard::program_tab(wb, cfg, &f))?,
        "/api/survei" => {
            let kind = SurveyKind::parse(&query_param(query, "survei").unwrap_or_default());
            serde_json::to_string(&survey::build_report(wb, kind, &f))?
        }
        "/api/ketidaksesuaian" => {
            serde_json::to_string(&ketidaksesuaian::build_report(wb.table(SheetName::Ketidaksesuaian), &f))?
        }
        "/api/fraud" => serde_json::to_string(&dashboard::fraud_tab(wb, cfg, &f))?,
        "/api/korelasi" => serde_json::to_string(&dashboard::korelasi_tab(wb, cfg, &f))?,
        "/api/data_quality" => serde_json::to_string(&dashboard::data_quality(wb))?,
        "/api/export/ketidaksesuaian_valid.csv" => {
            return Ok(Some(Response {
                status: "200 OK",
                content_type: "text/csv; charset=utf-8",
                body: ketidaksesuaian::export_valid_csv(wb.table(SheetName::Ketidaksesuaian))?,
            }))
        }
        "/api/export/fraud.csv" => {
            return Ok(Some(Response {
                status: "200 OK",
                content_type: "text/csv; charset=utf-8",
                body: fraud::labelled_csv(wb.table(SheetName::Ketidaksesuaian), &FraudConfig::from(cfg))?,
            }))
        }
        _ => return Ok(None),
    };
    Ok(Some(Response::json(body)))
}

fn handle(stream: &mut TcpStream, rt: &Runtime, cfg: &Config) -> Option<Response> {
    let request = BufReader::new(&*stream).lines().next()?.ok()?;
    let target = request.strip_prefix("GET ")?.split_whitespace().next()?.to_string();
    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));

    if path == "/api/health" {
        return Some(Response::json(r#"{"status":"ok"}"#.to_string()));
    }

    let Some(sheets) = sheets_for(path) else {
        return Some(not_found());
    };

    let result = source_from_config(cfg).and_then(|source| {
        let wb = rt.block_on(load_workbook(source.as_ref(), &sheets));
        route(path, query, &wb, cfg)
    });
    let response = match result {
        Ok(Some(r)) => r,
        Ok(None) => not_found(),
        Err(err) => {
            log(
                Level::Error,
                Domain::Report,
                "handler_failed",
                obj(&[("endpoint", v_str(path)), ("error", v_str(&format!("{:#}", err)))]),
            );
            Response {
                status: "500 INTERNAL SERVER ERROR",
                content_type: "application/json",
                body: serde_json::json!({ "error": format!("{:#}", err) }).to_string(),
            }
        }
    };
    log(
        Level::Debug,
        Domain::Report,
        "request",
        obj(&[
            ("endpoint", v_str(path)),
            ("status", v_str(response.status)),
            ("bytes", v_num(response.body.len() as f64)),
        ]),
    );
    Some(response)
}

fn main() -> Result<()> {
    let cfg = Config::from_env();
    let rt = Runtime::new()?;
    let listener = TcpListener::bind(format!("127.0.0.1:{}", cfg.server_port))?;

    println!("GBST Dashboard Server running at http://localhost:{}", cfg.server_port);
    println!();
    println!("Endpoints:");
    println!("  GET /api/health");
    println!("  GET /api/overview?peta=site|cctv|keduanya");
    println!("  GET /api/timbulan  /api/program  /api/ketidaksesuaian  /api/fraud");
    println!("  GET /api/survei?survei=online|offline");
    println!("  GET /api/korelasi  /api/data_quality");
    println!("  GET /api/export/ketidaksesuaian_valid.csv  /api/export/fraud.csv");
    println!("Filters: site, perusahaan, tahun, bulan (repeatable), organik, anorganik");
    println!();

    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(s) => s,
            Err(_) => continue,
        };
        let Some(resp) = handle(&mut stream, &rt, &cfg) else {
            continue;
        };

        let response = format!(
            "HTTP/1.1 {}\r\n\
             Content-Type: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Content-Length: {}\r\n\r\n{}",
            resp.status,
            resp.content_type,
            resp.body.len(),
            resp.body
        );
        let _ = stream.write_all(response.as_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_routes_load_nothing() {
        assert_eq!(sheets_for("/api/nope"), None);
        assert_eq!(sheets_for("/"), None);
        assert_eq!(sheets_for("/api/fraud"), Some(vec![SheetName::Ketidaksesuaian]));
        assert_eq!(sheets_for("/api/overview").map(|s| s.len()), Some(SheetName::ALL.len()));
    }

    #[test]
    fn every_known_route_is_served() {
        let wb = Workbook::new();
        let cfg = Config::default();
        for path in [
            "/api/overview",
            "/api/timbulan",
            "/api/program",
            "/api/survei",
            "/api/ketidaksesuaian",
            "/api/fraud",
            "/api/korelasi",
            "/api/data_quality",
            "/api/export/ketidaksesuaian_valid.csv",
            "/api/export/fraud.csv",
        ] {
            assert!(sheets_for(path).is_some(), "{}", path);
            assert!(route(path, "", &wb, &cfg).unwrap().is_some(), "{}", path);
        }
    }
}
