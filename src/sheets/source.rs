use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use super::retry::{transient_network, transient_status, with_backoff, Backoff, Permanent};
use super::SheetName;
use crate::config::Config;

/// Where sheet CSV bodies come from.
#[async_trait]
pub trait SheetSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch_csv(&self, sheet: SheetName) -> Result<String>;
}

/// Public gviz CSV export of a Google spreadsheet.
pub struct GvizSource {
    client: Client,
    base: String,
    sheet_id: String,
    backoff: Backoff,
}

impl GvizSource {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base: cfg.sheet_base.trim_end_matches('/').to_string(),
            sheet_id: cfg.sheet_id.clone(),
            backoff: Backoff::from_config(cfg),
        })
    }

    pub fn sheet_url(&self, sheet: SheetName) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}/gviz/tq", self.base, self.sheet_id))
            .with_context(|| format!("invalid sheet base {}", self.base))?;
        url.query_pairs_mut()
            .append_pair("tqx", "out:csv")
            .append_pair("sheet", sheet.as_str());
        Ok(url)
    }
}

/// Extracts the spreadsheet id from a share link
/// (`.../spreadsheets/d/<id>/edit?...`).
pub fn sheet_id_from_url(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "d")?;
    segments.next().filter(|s| !s.is_empty()).map(|s| s.to_string())
}

#[async_trait]
impl SheetSource for GvizSource {
    fn describe(&self) -> String {
        format!("gviz:{}", self.sheet_id)
    }

    async fn fetch_csv(&self, sheet: SheetName) -> Result<String> {
        let url = self.sheet_url(sheet)?;
        let op_name = format!("fetch_sheet:{}", sheet.as_str());
        let client = &self.client;
        with_backoff(&self.backoff, &op_name, || {
            let client = client.clone();
            let url = url.clone();
            async move {
                let resp = client.get(url).send().await.map_err(|e| {
                    if transient_network(&e) {
                        anyhow!(e)
                    } else {
                        anyhow::Error::new(Permanent(e.to_string()))
                    }
                })?;
                let status = resp.status();
                if !status.is_success() {
                    let msg = format!("http status {}", status.as_u16());
                    if transient_status(status.as_u16()) {
                        bail!(msg);
                    }
                    return Err(anyhow::Error::new(Permanent(msg)));
                }
                Ok::<String, anyhow::Error>(resp.text().await?)
            }
        })
        .await
    }
}

/// Snapshot directory holding `<Sheet>.csv` files.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path_for(&self, sheet: SheetName) -> PathBuf {
        self.dir.join(format!("{}.csv", sheet.as_str()))
    }
}

#[async_trait]
impl SheetSource for DirSource {
    fn describe(&self) -> String {
        format!("dir:{}", self.dir.display())
    }

    async fn fetch_csv(&self, sheet: SheetName) -> Result<String> {
        let path = self.path_for(sheet);
        std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

/// Picks the snapshot directory when configured, HTTP otherwise.
pub fn source_from_config(cfg: &Config) -> Result<Box<dyn SheetSource>> {
    match &cfg.sheets_dir {
        Some(dir) => Ok(Box::new(DirSource::new(dir))),
        None => Ok(Box::new(GvizSource::new(cfg)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_gviz_url() {
        let src = GvizSource::new(&Config::default()).unwrap();
        let url = src.sheet_url(SheetName::SurveiOnline).unwrap();
        assert_eq!(
            url.as_str(),
            "https://docs.google.com/spreadsheets/d/1cw3xMomuMOaprs8mkmj_qnib-Zp_9n68rYMgiRZZqBE/gviz/tq?tqx=out%3Acsv&sheet=Survei_Online"
        );
    }

    #[test]
    fn extracts_sheet_id_from_share_link() {
        let link = "https://docs.google.com/spreadsheets/d/abc123/edit?usp=sharing";
        assert_eq!(sheet_id_from_url(link).as_deref(), Some("abc123"));
        assert_eq!(sheet_id_from_url("not a url"), None);
    }

    #[tokio::test]
    async fn dir_source_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("Program.csv"), "a\n1\n").unwrap();
        let src = DirSource::new(dir.path());
        assert_eq!(src.fetch_csv(SheetName::Program).await.unwrap(), "a\n1\n");
        assert!(src.fetch_csv(SheetName::Timbulan).await.is_err());
    }
}
