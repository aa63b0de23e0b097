//! Structured JSON-lines logging for dashboard runs.
//!
//! One process is one run: `RUN_ID` (or a generated id) names a directory
//! under `LOG_DIR` holding `events.jsonl` (info and above) and `trace.jsonl`
//! (debug, trace, profiling). Every line is also mirrored to stderr.
//! `LOG_LEVEL` sets the floor, `LOG_DOMAINS` a comma list of domains.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Sheet fetches and parsing.
    Ingest,
    Metrics,
    Fraud,
    /// Normality tests and correlation.
    Stats,
    /// Report assembly, exports, HTTP.
    Report,
    System,
    Profile,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::Ingest,
        Domain::Metrics,
        Domain::Fraud,
        Domain::Stats,
        Domain::Report,
        Domain::System,
        Domain::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Ingest => "ingest",
            Domain::Metrics => "metrics",
            Domain::Fraud => "fraud",
            Domain::Stats => "stats",
            Domain::Report => "report",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }
}

/// Which records get written.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub min_level: Level,
    /// `None` lets every domain through.
    pub domains: Option<Vec<Domain>>,
}

impl LogFilter {
    /// `level` as in `LOG_LEVEL` (default info), `domains` as in
    /// `LOG_DOMAINS` (`all`, empty or a comma list).
    pub fn parse(level: Option<&str>, domains: Option<&str>) -> Self {
        let min_level = level.and_then(Level::parse).unwrap_or(Level::Info);
        let domains = match domains.map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(list) => Some(
                list.split(',')
                    .filter_map(|d| Domain::ALL.iter().copied().find(|x| x.as_str() == d.trim()))
                    .collect(),
            ),
        };
        Self { min_level, domains }
    }

    pub fn allows(&self, level: Level, domain: Domain) -> bool {
        level >= self.min_level && self.domains.as_ref().map_or(true, |ds| ds.contains(&domain))
    }
}

type Sink = Mutex<BufWriter<File>>;

struct RunLog {
    run_id: String,
    filter: LogFilter,
    events: Option<Sink>,
    trace: Option<Sink>,
}

static RUN: OnceLock<RunLog> = OnceLock::new();
static SEQ: AtomicU64 = AtomicU64::new(0);

fn open_sink(path: &Path) -> Option<Sink> {
    File::create(path)
        .map(|f| Mutex::new(BufWriter::new(f)))
        .map_err(|err| eprintln!("[log] cannot create {}: {}", path.display(), err))
        .ok()
}

/// Creates `<base>/<run_id>/` with a small manifest; `None` when logging
/// stays on stderr (`LOG_DIR=-` or an unwritable directory).
fn prepare_run_dir(base: &str, run_id: &str) -> Option<PathBuf> {
    if base == "-" {
        return None;
    }
    let dir = Path::new(base).join(run_id);
    if let Err(err) = std::fs::create_dir_all(&dir) {
        eprintln!("[log] cannot create {}: {}", dir.display(), err);
        return None;
    }
    let manifest = json!({
        "run_id": run_id,
        "started_at": ts_now(),
        "pid": std::process::id(),
    });
    let _ = std::fs::write(dir.join("manifest.json"), manifest.to_string());
    Some(dir)
}

fn run_log() -> &'static RunLog {
    RUN.get_or_init(|| {
        let env = |k: &str| std::env::var(k).ok();
        let run_id = env("RUN_ID").unwrap_or_else(|| format!("r-{}-{}", ts_epoch_ms(), std::process::id()));
        let filter = LogFilter::parse(env("LOG_LEVEL").as_deref(), env("LOG_DOMAINS").as_deref());
        let dir = prepare_run_dir(&env("LOG_DIR").unwrap_or_else(|| "out/runs".to_string()), &run_id);
        RunLog {
            events: dir.as_deref().and_then(|d| open_sink(&d.join("events.jsonl"))),
            trace: dir.as_deref().and_then(|d| open_sink(&d.join("trace.jsonl"))),
            run_id,
            filter,
        }
    })
}

pub fn run_id() -> String {
    run_log().run_id.clone()
}

/// RFC3339 UTC with milliseconds.
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Keys lifted out of `data` to the top level of a record.
const PROMOTED: [&str; 5] = ["msg", "sheet", "site", "perusahaan", "endpoint"];

/// One log line as JSON.
fn record(run_id: &str, seq: u64, level: Level, domain: Domain, event: &str, mut data: Map<String, Value>) -> Value {
    let mut line = Map::new();
    line.insert("ts".into(), json!(ts_now()));
    line.insert("run_id".into(), json!(run_id));
    line.insert("seq".into(), json!(seq));
    line.insert("lvl".into(), json!(level.as_str()));
    line.insert("domain".into(), json!(domain.as_str()));
    line.insert("event".into(), json!(event));
    for key in PROMOTED {
        if let Some(v) = data.remove(key) {
            line.insert(key.into(), v);
        }
    }
    line.insert("data".into(), Value::Object(data));
    Value::Object(line)
}

fn append(sink: Option<&Sink>, line: &str) {
    let Some(sink) = sink else { return };
    if let Ok(mut w) = sink.lock() {
        let _ = writeln!(w, "{}", line).and_then(|_| w.flush());
    }
}

/// Emits one structured record if the run filter allows it.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let run = run_log();
    if !run.filter.allows(level, domain) {
        return;
    }
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let line = record(&run.run_id, seq, level, domain, event, fields).to_string();
    let sink = if level <= Level::Debug { run.trace.as_ref() } else { run.events.as_ref() };
    append(sink, &line);
    eprintln!("{}", line);
}

pub fn log_sheet_loaded(sheet: &str, rows: usize, columns: usize, source: &str) {
    log(
        Level::Info,
        Domain::Ingest,
        "sheet_loaded",
        obj(&[
            ("sheet", v_str(sheet)),
            ("rows", json!(rows)),
            ("columns", json!(columns)),
            ("source", v_str(source)),
        ]),
    );
}

pub fn log_sheet_failed(sheet: &str, err: &str) {
    log(
        Level::Error,
        Domain::Ingest,
        "sheet_failed",
        obj(&[
            ("sheet", v_str(sheet)),
            ("msg", v_str(&format!("Gagal load sheet {}", sheet))),
            ("error", v_str(err)),
        ]),
    );
}

/// A dashboard section was skipped because its columns are absent.
pub fn log_missing_columns(section: &str, columns: &[&str]) {
    let cols: Vec<Value> = columns.iter().map(|c| v_str(c)).collect();
    log(
        Level::Warn,
        Domain::Metrics,
        "missing_columns",
        obj(&[("section", v_str(section)), ("columns", Value::Array(cols))]),
    );
}

pub fn log_fraud_summary(total: usize, counts: &[(&str, usize)]) {
    let by_label: Map<String, Value> = counts.iter().map(|(k, v)| (k.to_string(), json!(v))).collect();
    log(
        Level::Info,
        Domain::Fraud,
        "fraud_summary",
        obj(&[("total", json!(total)), ("by_label", Value::Object(by_label))]),
    );
}

pub fn log_correlation(method: &str, r: f64, p_value: f64, n: usize) {
    log(
        Level::Info,
        Domain::Stats,
        "correlation",
        obj(&[("method", v_str(method)), ("r", v_num(r)), ("p_value", v_num(p_value)), ("n", json!(n))]),
    );
}

/// First 8 bytes of sha256, hex; tags a config/filter combination.
pub fn params_hash(input: &str) -> String {
    hex::encode(&Sha256::digest(input.as_bytes())[..8])
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

/// NaN and infinities become `null`.
pub fn v_num(n: f64) -> Value {
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// Logs `elapsed_ms` for `label` at trace level when dropped.
pub struct ProfileScope {
    label: &'static str,
    fields: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self { label, fields: obj(fields), started: Instant::now() }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let mut fields = std::mem::take(&mut self.fields);
        fields.insert("label".into(), v_str(self.label));
        fields.insert("elapsed_ms".into(), v_num(self.started.elapsed().as_secs_f64() * 1000.0));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_to_info_and_all_domains() {
        let f = LogFilter::parse(None, None);
        assert_eq!(f.min_level, Level::Info);
        assert!(f.allows(Level::Warn, Domain::Fraud));
        assert!(!f.allows(Level::Debug, Domain::Fraud));
        assert_eq!(LogFilter::parse(Some("bogus"), Some("all")), f);
    }

    #[test]
    fn filter_restricts_domains() {
        let f = LogFilter::parse(Some("DEBUG"), Some("ingest, stats,nope"));
        assert_eq!(f.domains, Some(vec![Domain::Ingest, Domain::Stats]));
        assert!(f.allows(Level::Debug, Domain::Stats));
        assert!(!f.allows(Level::Error, Domain::Report));
    }

    #[test]
    fn record_promotes_context_keys() {
        let line = record("r-1", 7, Level::Warn, Domain::Ingest, "sheet_failed", obj(&[
            ("sheet", v_str("Program")),
            ("msg", v_str("Gagal load sheet Program")),
            ("rows", json!(3)),
        ]));
        assert_eq!(line["lvl"], "WARN");
        assert_eq!(line["domain"], "ingest");
        assert_eq!(line["seq"], 7);
        assert_eq!(line["sheet"], "Program");
        assert_eq!(line["data"]["rows"], 3);
        assert!(line["data"].get("sheet").is_none());
    }

    #[test]
    fn params_hash_is_short_and_stable() {
        assert_eq!(params_hash("site=A"), params_hash("site=A"));
        assert_ne!(params_hash("site=A"), params_hash("site=B"));
        assert_eq!(params_hash("x").len(), 16);
    }

    #[test]
    fn non_finite_numbers_become_null() {
        assert_eq!(v_num(f64::NAN), Value::Null);
        assert_eq!(v_num(f64::NEG_INFINITY), Value::Null);
        assert_eq!(v_num(2.5), json!(2.5));
    }
}
