use serde::Serialize;

/// Spreadsheet that backs the published dashboard.
pub const DEFAULT_SHEET_ID: &str = "1cw3xMomuMOaprs8mkmj_qnib-Zp_9n68rYMgiRZZqBE";

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub sheet_id: String,
    pub sheet_base: String,
    /// When set, sheets are read from `<dir>/<Sheet>.csv` instead of HTTP.
    pub sheets_dir: Option<String>,
    pub fetch_retries: u32,
    pub fetch_timeout_secs: u64,
    pub retry_base_delay_ms: u64,
    /// Divisor for converting program totals to kg/day on the overview.
    pub days_period: u32,
    pub near_dup_threshold: f64,
    pub spam_window_secs: i64,
    pub repetition_threshold: f64,
    pub alpha: f64,
    pub out_dir: String,
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sheet_id: DEFAULT_SHEET_ID.to_string(),
            sheet_base: "https://docs.google.com/spreadsheets/d".to_string(),
            sheets_dir: None,
            fetch_retries: 2,
            fetch_timeout_secs: 20,
            retry_base_delay_ms: 250,
            days_period: 609,
            near_dup_threshold: 0.90,
            spam_window_secs: 600,
            repetition_threshold: 0.5,
            alpha: 0.05,
            out_dir: "out".to_string(),
            server_port: 8766,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            sheet_id: std::env::var("SHEET_ID").unwrap_or(d.sheet_id),
            sheet_base: std::env::var("SHEET_BASE").unwrap_or(d.sheet_base),
            sheets_dir: std::env::var("SHEETS_DIR").ok().filter(|v| !v.trim().is_empty()),
            fetch_retries: std::env::var("FETCH_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.fetch_retries),
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.fetch_timeout_secs),
            retry_base_delay_ms: std::env::var("RETRY_BASE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.retry_base_delay_ms),
            days_period: std::env::var("DAYS_PERIOD").ok().and_then(|v| v.parse().ok()).unwrap_or(d.days_period),
            near_dup_threshold: std::env::var("NEAR_DUP_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(d.near_dup_threshold),
            spam_window_secs: std::env::var("SPAM_WINDOW_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.spam_window_secs),
            repetition_threshold: std::env::var("REPETITION_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(d.repetition_threshold),
            alpha: std::env::var("ALPHA").ok().and_then(|v| v.parse().ok()).unwrap_or(d.alpha),
            out_dir: std::env::var("OUT_DIR").unwrap_or(d.out_dir),
            server_port: std::env::var("SERVER_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.server_port),
        }
    }

    /// Stable tag for the knobs that change computed output.
    pub fn params_fingerprint(&self) -> String {
        crate::logging::params_hash(&format!(
            "{}|{}|{}|{}|{}|{}",
            self.sheet_id,
            self.days_period,
            self.near_dup_threshold,
            self.spam_window_secs,
            self.repetition_threshold,
            self.alpha
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dashboard_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.days_period, 609);
        assert!((cfg.near_dup_threshold - 0.90).abs() < 1e-12);
        assert_eq!(cfg.spam_window_secs, 600);
        assert!((cfg.repetition_threshold - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fingerprint_tracks_thresholds() {
        let a = Config::default();
        let mut b = Config::default();
        b.near_dup_threshold = 0.8;
        assert_ne!(a.params_fingerprint(), b.params_fingerprint());
        assert_eq!(a.params_fingerprint(), Config::default().params_fingerprint());
    }
}
