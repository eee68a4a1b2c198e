//! Shared, mutex-guarded state of one migration session.
//!
//! The worker and any front end hold clones of [`SharedSession`]. The worker
//! takes the lock only between adapter calls, so readers never wait on I/O.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::contract::{Folder, FolderId, Submission, SubmissionId};
use crate::folders::{unmapped_folders, FolderMatch};
use crate::progress::MigrationState;
use crate::submissions::{associate_submissions_with_folders, FolderAssociation, SubmissionMatch};
use crate::tables::ROOT_FOLDER_ID;

/// Everything one site listed, taken in a single pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteSnapshot {
    pub folders: Vec<Folder>,
    pub submissions: Vec<Submission>,
}

impl SiteSnapshot {
    /// Look up a root or child folder by id.
    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.folders
            .iter()
            .flat_map(|root| std::iter::once(root).chain(root.children.iter()))
            .find(|f| f.id == id)
    }
}

/// The outcome of reconciliation: what maps where and what is missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub folder_mapping: Vec<FolderMatch>,
    pub unmapped_folders: Vec<Folder>,
    pub submission_mapping: Vec<SubmissionMatch>,
    /// Sorted by source id.
    pub unmapped_submissions: Vec<Submission>,
    pub associations: Vec<FolderAssociation>,
}

impl Plan {
    /// Destination folder a submission is uploaded into; the account root
    /// when it has no association.
    pub fn folder_for(&self, submission_id: SubmissionId) -> FolderId {
        self.associations
            .iter()
            .find(|a| a.submission.id == submission_id)
            .map(|a| a.folder.id)
            .unwrap_or(ROOT_FOLDER_ID)
    }

    /// Point `source` at `destination`, replacing whatever it mapped to.
    pub fn assign_folder(&mut self, source: Folder, destination: Folder, source_folders: &[Folder]) {
        self.folder_mapping.retain(|m| m.source.id != source.id);
        self.folder_mapping.push(FolderMatch::exact(source, destination));
        self.refresh_folders(source_folders);
    }

    /// Record folders created on the destination during a run.
    pub fn extend_folders(&mut self, created: Vec<FolderMatch>, source_folders: &[Folder]) {
        self.folder_mapping.extend(created);
        self.refresh_folders(source_folders);
    }

    /// Drop an uploaded submission from the missing set, so a later run
    /// does not upload it again.
    pub fn mark_uploaded(&mut self, submission_id: SubmissionId) {
        self.unmapped_submissions.retain(|s| s.id != submission_id);
        self.associations.retain(|a| a.submission.id != submission_id);
    }

    fn refresh_folders(&mut self, source_folders: &[Folder]) {
        self.unmapped_folders = unmapped_folders(source_folders, &self.folder_mapping);
        self.associations = associate_submissions_with_folders(
            source_folders,
            &self.unmapped_submissions,
            &self.folder_mapping,
        );
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub source: Option<SiteSnapshot>,
    pub destination: Option<SiteSnapshot>,
    pub plan: Option<Plan>,
    /// Manual folder assignments, source id to destination folder.
    pub folder_overrides: BTreeMap<FolderId, Folder>,
    pub excluded_folders: HashSet<FolderId>,
    pub excluded_submissions: HashSet<SubmissionId>,
    pub state: MigrationState,
    /// Source ids uploaded by the current or last run.
    pub uploaded: Vec<SubmissionId>,
    /// Source ids uploaded since the destination was last loaded; the
    /// destination snapshot does not list them yet.
    pub migrated: HashSet<SubmissionId>,
}

#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().await
    }

    pub async fn state(&self) -> MigrationState {
        self.inner.lock().await.state
    }

    pub async fn plan(&self) -> Option<Plan> {
        self.inner.lock().await.plan.clone()
    }

    pub async fn uploaded(&self) -> Vec<SubmissionId> {
        self.inner.lock().await.uploaded.clone()
    }

    pub async fn exclude_folder(&self, id: FolderId) {
        self.inner.lock().await.excluded_folders.insert(id);
    }

    pub async fn include_folder(&self, id: FolderId) {
        self.inner.lock().await.excluded_folders.remove(&id);
    }

    pub async fn exclude_submission(&self, id: SubmissionId) {
        self.inner.lock().await.excluded_submissions.insert(id);
    }

    pub async fn include_submission(&self, id: SubmissionId) {
        self.inner.lock().await.excluded_submissions.remove(&id);
    }

    pub async fn is_submission_excluded(&self, id: SubmissionId) -> bool {
        self.inner.lock().await.excluded_submissions.contains(&id)
    }
}
