//! Source site backed by a JSON export of the account.
//!
//! The export holds the folder tree and both submission listings:
//!
//! ```json
//! { "folders": [...], "gallery": [...], "scraps": [...] }
//! ```
//!
//! It is read from disk or fetched over HTTP. HTTP listing fetches count
//! against the source page rate limit; media downloads do not.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gallery_sync_core::contract::{Folder, SourceSite, Submission, SubmissionScope};
use gallery_sync_core::ratelimit::RateLimiter;
use gallery_sync_core::{Result, SyncError};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, error, info};

#[derive(Debug, Default, Deserialize)]
pub struct SiteExport {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub gallery: Vec<Submission>,
    #[serde(default)]
    pub scraps: Vec<Submission>,
}

impl SiteExport {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            error!(error = ?e, "Export is not valid JSON in the expected shape");
            SyncError::Scrape(format!("export: {e}"))
        })
    }
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Url(Url),
}

pub struct ExportSource {
    location: Location,
    http: reqwest::Client,
    limiter: RateLimiter,
}

impl ExportSource {
    pub fn new(export: &str, requests_per_minute: u32) -> Result<Self> {
        let location = if export.starts_with("http://") || export.starts_with("https://") {
            Location::Url(
                Url::parse(export)
                    .map_err(|e| SyncError::Adapter(format!("invalid export URL {export}: {e}")))?,
            )
        } else {
            Location::File(PathBuf::from(export))
        };
        info!(?location, requests_per_minute, "Using site export as source");
        Ok(Self {
            location,
            http: reqwest::Client::new(),
            limiter: RateLimiter::per_minute(requests_per_minute),
        })
    }

    async fn read_export(&self) -> Result<SiteExport> {
        let bytes = match &self.location {
            Location::File(path) => read_file(path).await?,
            Location::Url(url) => {
                self.limiter
                    .limited(|| get_bytes(&self.http, url.clone()))
                    .await?
            }
        };
        SiteExport::parse(&bytes)
    }

    fn resolve(&self, locator: &str) -> Result<Location> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return Url::parse(locator)
                .map(Location::Url)
                .map_err(|e| SyncError::Adapter(format!("invalid locator {locator}: {e}")));
        }
        match &self.location {
            Location::File(export) => {
                let dir = export.parent().unwrap_or_else(|| Path::new("."));
                Ok(Location::File(dir.join(locator)))
            }
            Location::Url(export) => export
                .join(locator)
                .map(Location::Url)
                .map_err(|e| SyncError::Adapter(format!("invalid locator {locator}: {e}"))),
        }
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        error!(error = ?e, path = %path.display(), "Failed to read file");
        SyncError::Adapter(format!("{}: {e}", path.display()))
    })
}

async fn get_bytes(http: &reqwest::Client, url: Url) -> Result<Vec<u8>> {
    debug!(%url, "Fetching");
    let response = http.get(url.clone()).send().await.map_err(|e| {
        error!(error = ?e, %url, "Request failed");
        SyncError::Adapter(e.to_string())
    })?;
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(SyncError::Authentication(format!("{url}: {}", response.status())))
        }
        status if !status.is_success() => {
            error!(%url, %status, "Unexpected status");
            return Err(SyncError::Adapter(format!("{url}: {status}")));
        }
        _ => {}
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| SyncError::Adapter(e.to_string()))?;
    Ok(body.to_vec())
}

#[async_trait]
impl SourceSite for ExportSource {
    async fn list_folders(&self) -> Result<Vec<Folder>> {
        Ok(self.read_export().await?.folders)
    }

    async fn list_submissions(&self, scope: SubmissionScope) -> Result<Vec<Submission>> {
        let export = self.read_export().await?;
        Ok(match scope {
            SubmissionScope::Gallery => export.gallery,
            SubmissionScope::Scraps => export.scraps,
        })
    }

    async fn fetch_blob(&self, locator: &str) -> Result<Vec<u8>> {
        match self.resolve(locator)? {
            Location::File(path) => read_file(&path).await,
            Location::Url(url) => get_bytes(&self.http, url).await,
        }
    }
}
