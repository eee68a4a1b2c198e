//! # contract: site data model and adapter interfaces
//!
//! Plain value types describing what a content-hosting site holds (folders and
//! submissions), and the two traits a site integration must implement to take
//! part in a migration:
//!
//! - [`SourceSite`]: read-only access to the site submissions are migrated from.
//! - [`DestinationSite`]: listing plus the write operations used to recreate
//!   folders and upload submissions on the site they are migrated to.
//!
//! Every listing method returns a fully-populated snapshot. Reading a field of
//! a [`Folder`] or [`Submission`] never performs I/O.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; with the `test-export-mocks`
//!   feature (on by default) `MockSourceSite` and `MockDestinationSite` are
//!   exported for integration tests of downstream crates.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tables::ContentType;

pub type FolderId = i64;
pub type SubmissionId = i64;

/// A folder on either site. Only one level of nesting is modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub title: String,
    #[serde(default)]
    pub children: Vec<Folder>,
    /// Ids of the submissions filed in this folder (not in its children).
    #[serde(default)]
    pub submission_ids: Vec<SubmissionId>,
}

impl Folder {
    pub fn new(id: FolderId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            children: Vec::new(),
            submission_ids: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Folder>) -> Self {
        self.children = children;
        self
    }

    pub fn with_submissions(mut self, ids: Vec<SubmissionId>) -> Self {
        self.submission_ids = ids;
        self
    }

    pub fn contains(&self, submission_id: SubmissionId) -> bool {
        self.submission_ids.contains(&submission_id)
    }
}

/// Content rating, normalised across sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    #[serde(alias = "General")]
    General,
    #[serde(alias = "Mature", alias = "moderate")]
    Mature,
    #[serde(alias = "Adult", alias = "explicit", alias = "Explicit")]
    Adult,
}

/// A submission as listed by a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub title: String,
    /// The site's own type name ("image", "text", "visual", ...).
    pub kind: String,
    pub rating: Rating,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnail_locator: Option<String>,
    #[serde(default)]
    pub media_locator: String,
}

impl Submission {
    /// Normalised content type, or `UnknownContentType` for an unrecognised kind.
    pub fn content_type(&self) -> Result<ContentType> {
        ContentType::from_kind(&self.kind)
    }

    /// File name for upload: the last path segment of the media locator.
    pub fn file_name(&self) -> &str {
        let trimmed = self.media_locator.trim_end_matches('/');
        let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
        last.split(['?', '#']).next().unwrap_or(last)
    }
}

/// Which listing of the source site to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionScope {
    Gallery,
    Scraps,
}

/// Everything needed to create one submission on the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub file_name: String,
    pub media: Vec<u8>,
    pub title: String,
    pub content_type: ContentType,
    /// Destination category code; `None` uploads without one.
    pub category: Option<u32>,
    pub rating: u32,
    pub description: String,
    pub tags: Vec<String>,
    /// Destination folder id, `0` for the account root.
    pub folder_id: FolderId,
    pub thumbnail: Option<Vec<u8>>,
}

/// What the destination hands back after an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRef {
    pub id: Option<SubmissionId>,
    pub url: Option<String>,
}

/// Read-only access to the site submissions are migrated from.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceSite: Send + Sync {
    /// The folder tree, roots in site order, each with its direct children.
    async fn list_folders(&self) -> Result<Vec<Folder>>;

    /// Submissions of the given listing, in site order.
    async fn list_submissions(&self, scope: SubmissionScope) -> Result<Vec<Submission>>;

    /// Download the bytes behind a media or thumbnail locator.
    async fn fetch_blob(&self, locator: &str) -> Result<Vec<u8>>;
}

/// Listing and write access to the site submissions are migrated to.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DestinationSite: Send + Sync {
    async fn list_folders(&self) -> Result<Vec<Folder>>;

    async fn list_submissions(&self) -> Result<Vec<Submission>>;

    /// Create a folder, under `parent_id` when given.
    ///
    /// The returned folder carries its assigned id and must be visible to the
    /// next `list_folders` call.
    async fn create_folder(&self, title: &str, parent_id: Option<FolderId>) -> Result<Folder>;

    async fn create_submission(&self, submission: NewSubmission) -> Result<SubmissionRef>;
}
