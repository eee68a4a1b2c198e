//! Destination adapter for Weasyl.
//!
//! Listings use the public JSON API. Folder creation and uploads go through
//! the site's form endpoints, authenticated with the `X-Weasyl-API-Key`
//! header like every other request. Neither form endpoint returns the new
//! id directly: folder ids are found by listing again, submission ids are
//! read from the URL the upload redirects to.

use async_trait::async_trait;
use gallery_sync_core::contract::{
    DestinationSite, Folder, FolderId, NewSubmission, Rating, Submission, SubmissionRef,
};
use gallery_sync_core::tables::ContentType;
use gallery_sync_core::{Result, SyncError};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

pub const WEASYL_ROOT: &str = "https://www.weasyl.com";

/// Page size requested from the gallery endpoint.
const GALLERY_PAGE_SIZE: u32 = 100;

pub struct WeasylClient {
    http: reqwest::Client,
    base_url: String,
    login: String,
    submission_link: Regex,
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    folders: Vec<FolderEntry>,
}

#[derive(Debug, Deserialize)]
struct FolderEntry {
    folder_id: FolderId,
    title: String,
    #[serde(default)]
    subfolders: Vec<FolderEntry>,
}

impl From<FolderEntry> for Folder {
    fn from(entry: FolderEntry) -> Self {
        Folder::new(entry.folder_id, entry.title)
            .with_children(entry.subfolders.into_iter().map(Folder::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct GalleryPage {
    submissions: Vec<GalleryEntry>,
    #[serde(default)]
    nextid: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GalleryEntry {
    submitid: i64,
    title: String,
    subtype: String,
    rating: Rating,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    link: String,
}

impl From<GalleryEntry> for Submission {
    fn from(entry: GalleryEntry) -> Self {
        Submission {
            id: entry.submitid,
            title: entry.title,
            kind: entry.subtype,
            rating: entry.rating,
            category: None,
            description: String::new(),
            tags: entry.tags,
            thumbnail_locator: None,
            media_locator: entry.link,
        }
    }
}

fn transport(e: reqwest::Error) -> SyncError {
    error!(error = ?e, "Weasyl request failed");
    SyncError::Adapter(e.to_string())
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    let url = response.url().clone();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            error!(%url, %status, "Weasyl rejected the API key");
            Err(SyncError::Authentication(format!("{url}: {status}")))
        }
        s if s.is_success() => Ok(response),
        _ => {
            let body = response.text().await.unwrap_or_default();
            error!(%url, %status, body = %body, "Weasyl returned an error");
            Err(SyncError::Adapter(format!("{url}: {status}")))
        }
    }
}

async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let url = response.url().clone();
    response.json::<T>().await.map_err(|e| {
        error!(error = ?e, %url, "Unexpected response structure");
        SyncError::Scrape(format!("{url}: {e}"))
    })
}

impl WeasylClient {
    /// Build a client and resolve the account the key belongs to.
    pub async fn connect(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| SyncError::Authentication("API key is not a valid header value".into()))?;
        headers.insert("X-Weasyl-API-Key", key);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("gallery-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport)?;
        let submission_link =
            Regex::new(r"/(?:submission|character)/(\d+)").map_err(|e| SyncError::Adapter(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let response = http
            .get(format!("{base_url}/api/whoami"))
            .send()
            .await
            .map_err(transport)?;
        let whoami: WhoAmI = json(check(response).await?).await?;
        info!(login = %whoami.login, "Authenticated with Weasyl");

        Ok(Self {
            http,
            base_url,
            login: whoami.login,
            submission_link,
        })
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Newest folder with `title` directly under `parent_id` (or at the root).
    fn find_created(folders: &[Folder], title: &str, parent_id: Option<FolderId>) -> Option<Folder> {
        let siblings: &[Folder] = match parent_id {
            None => folders,
            Some(id) => folders
                .iter()
                .find(|f| f.id == id)
                .map(|f| f.children.as_slice())
                .unwrap_or(&[]),
        };
        siblings
            .iter()
            .filter(|f| f.title == title)
            .max_by_key(|f| f.id)
            .cloned()
    }

    fn submission_form(&self, submission: NewSubmission) -> Result<Form> {
        let mime = match submission.content_type {
            ContentType::Visual => "image/*",
            ContentType::Literary => "application/octet-stream",
            ContentType::Multimedia => "audio/*",
        };
        let media = Part::bytes(submission.media)
            .file_name(submission.file_name.clone())
            .mime_str(mime)
            .map_err(transport)?;

        let mut form = Form::new()
            .part("submitfile", media)
            .text("title", submission.title)
            .text(
                "subtype",
                submission.category.map(|c| c.to_string()).unwrap_or_default(),
            )
            .text("folderid", submission.folder_id.to_string())
            .text("rating", submission.rating.to_string())
            .text("content", submission.description)
            .text("tags", weasyl_tags(&submission.tags));

        if submission.content_type != ContentType::Visual {
            if let Some(thumbnail) = submission.thumbnail {
                form = form
                    .part("coverfile", Part::bytes(thumbnail.clone()).file_name("cover.png"))
                    .part("thumbfile", Part::bytes(thumbnail).file_name("thumb.png"));
            }
            form = form.text("embedlink", "");
        }
        Ok(form)
    }
}

/// Weasyl tags are whitespace separated, so spaces inside a tag become `_`.
fn weasyl_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join("_"))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl DestinationSite for WeasylClient {
    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let response = self
            .http
            .get(self.url(&format!("/api/users/{}/view", self.login)))
            .send()
            .await
            .map_err(transport)?;
        let view: ViewResponse = json(check(response).await?).await?;
        let folders: Vec<Folder> = view.folders.into_iter().map(Folder::from).collect();
        debug!(count = folders.len(), "Listed Weasyl folders");
        Ok(folders)
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>> {
        let mut submissions = Vec::new();
        let mut next: Option<i64> = None;
        loop {
            let mut request = self
                .http
                .get(self.url(&format!("/api/users/{}/gallery", self.login)))
                .query(&[("count", GALLERY_PAGE_SIZE.to_string())]);
            if let Some(id) = next {
                request = request.query(&[("nextid", id.to_string())]);
            }
            let response = request.send().await.map_err(transport)?;
            let page: GalleryPage = json(check(response).await?).await?;
            debug!(count = page.submissions.len(), nextid = ?page.nextid, "Fetched gallery page");
            submissions.extend(page.submissions.into_iter().map(Submission::from));
            match page.nextid {
                Some(id) if Some(id) != next => next = Some(id),
                _ => break,
            }
        }
        info!(count = submissions.len(), "Listed Weasyl submissions");
        Ok(submissions)
    }

    async fn create_folder(&self, title: &str, parent_id: Option<FolderId>) -> Result<Folder> {
        let parent = parent_id.unwrap_or(0).to_string();
        let response = self
            .http
            .post(self.url("/manage/folders/create"))
            .form(&[("title", title), ("parentid", parent.as_str())])
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;

        let folders = self.list_folders().await?;
        match Self::find_created(&folders, title, parent_id) {
            Some(folder) => Ok(folder),
            None => {
                warn!(title, ?parent_id, "Created folder does not show up in listing");
                Err(SyncError::Scrape(format!(
                    "folder {title:?} missing from listing after creation"
                )))
            }
        }
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<SubmissionRef> {
        let endpoint = self.url(&format!("/submit/{}", submission.content_type));
        let title = submission.title.clone();
        let form = self.submission_form(submission)?;

        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let response = check(response).await?;

        let landed = response.url().to_string();
        let id = self
            .submission_link
            .captures(&landed)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok());
        if id.is_none() {
            warn!(title = %title, url = %landed, "Upload accepted but no submission id in redirect");
        }
        Ok(SubmissionRef {
            id,
            url: Some(landed),
        })
    }
}
