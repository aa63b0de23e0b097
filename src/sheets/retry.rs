//! Backoff for sheet fetches. Transient failures (timeouts, 429, 5xx) are
//! retried; errors wrapped in [`Permanent`] come back on the first attempt.

use anyhow::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};

#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    /// Retries after the first attempt.
    pub retries: u32,
    pub base: Duration,
    pub cap: Duration,
    /// Fraction of the delay added or removed at random.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            retries: 2,
            base: Duration::from_millis(250),
            cap: Duration::from_secs(4),
            jitter: 0.3,
        }
    }
}

impl Backoff {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            retries: cfg.fetch_retries,
            base: Duration::from_millis(cfg.retry_base_delay_ms),
            ..Self::default()
        }
    }

    /// Delay before retry `attempt` (0-based). `spread` in `[-1, 1]` picks
    /// where in the jitter band the delay lands.
    pub fn delay(&self, attempt: u32, spread: f64) -> Duration {
        let doubled = self.base.saturating_mul(1u32 << attempt.min(16)).min(self.cap);
        let ms = doubled.as_millis() as f64;
        let jittered = ms + ms * self.jitter * spread.clamp(-1.0, 1.0);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    fn sample_delay(&self, attempt: u32) -> Duration {
        let spread = if self.jitter > 0.0 { rand::thread_rng().gen_range(-1.0..=1.0) } else { 0.0 };
        self.delay(attempt, spread)
    }
}

/// Marks an error as not worth retrying (404, bad URL, ...).
#[derive(Debug)]
pub struct Permanent(pub String);

impl std::fmt::Display for Permanent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Permanent {}

/// Runs `op` until it succeeds, fails permanently, or retries run out.
/// The last error is returned as-is.
pub async fn with_backoff<T, F, Fut>(policy: &Backoff, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if err.is::<Permanent>() || attempt >= policy.retries {
            return Err(err);
        }
        let wait = policy.sample_delay(attempt);
        log(
            Level::Warn,
            Domain::Ingest,
            "fetch_retry",
            obj(&[
                ("op", v_str(label)),
                ("attempt", v_num((attempt + 1) as f64)),
                ("of", v_num((policy.retries + 1) as f64)),
                ("wait_ms", v_num(wait.as_millis() as f64)),
                ("error", v_str(&format!("{:#}", err))),
            ]),
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

/// HTTP statuses a later attempt may fix.
pub fn transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

pub fn transient_network(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
