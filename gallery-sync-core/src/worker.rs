//! High-level pipeline: load both sites → reconcile → create folders → upload submissions.
//!
//! [`Worker`] ties the reconcilers to a pair of site adapters and drives one
//! migration session:
//!   - [`Worker::load`] snapshots both sites into the shared session
//!   - [`Worker::reconcile`] computes the [`Plan`] (mappings, missing sets, folder associations)
//!   - [`Worker::override_folder`] / [`Worker::reset_overrides`] let a front end correct the plan
//!   - [`Worker::run`] creates the missing folders, then uploads the missing submissions
//!
//! # Responsibilities
//! - Sequential, fail-fast orchestration: the first adapter error ends the run, nothing is rolled back
//! - Paces uploads by the configured interval, in one-second ticks so cancellation stays responsive
//! - Cancellation is cooperative: the run stops before the next upload, never during one
//! - Reports every step through the injected [`ProgressReporter`]
//!
//! # Navigation
//! - Main entrypoint: [`Worker::run`]
//! - Supporting types: [`MigrationReport`], [`MigrationOutcome`], [`UploadedSubmission`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::MigrationConfig;
use crate::contract::{
    DestinationSite, FolderId, NewSubmission, SourceSite, Submission, SubmissionId,
    SubmissionRef, SubmissionScope,
};
use crate::error::{Result, SyncError};
use crate::folders::{create_missing_folders, map_folders, unmapped_folders, FolderMatch};
use crate::progress::{MigrationEvent, MigrationState, Progress, ProgressReporter};
use crate::session::{Plan, SharedSession, SiteSnapshot};
use crate::submissions::{
    associate_submissions_with_folders, map_submissions, unmapped_submissions,
};
use crate::tables::{category_code_or_none, rating_code, ContentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedSubmission {
    pub source_id: SubmissionId,
    pub title: String,
    pub folder_id: FolderId,
    pub reference: SubmissionRef,
}

#[derive(Debug)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub outcome: MigrationOutcome,
    pub created_folders: Vec<FolderMatch>,
    pub uploaded: Vec<UploadedSubmission>,
    pub skipped: Vec<SubmissionId>,
}

pub struct Worker<S: ?Sized, D: ?Sized> {
    source: Arc<S>,
    destination: Arc<D>,
    config: MigrationConfig,
    session: SharedSession,
    reporter: Arc<dyn ProgressReporter>,
}

impl<S, D> Worker<S, D>
where
    S: SourceSite + ?Sized,
    D: DestinationSite + ?Sized,
{
    pub fn new(
        source: Arc<S>,
        destination: Arc<D>,
        config: MigrationConfig,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        config.trace_loaded();
        Self {
            source,
            destination,
            config,
            session: SharedSession::new(),
            reporter,
        }
    }

    /// Handle on the session state, for front ends.
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Take fresh snapshots of both sites.
    pub async fn load(&self) -> Result<()> {
        info!("[MIGRATE] Loading source site");
        let folders = self.source.list_folders().await?;
        let mut submissions = self.source.list_submissions(SubmissionScope::Gallery).await?;
        let scraps = self.source.list_submissions(SubmissionScope::Scraps).await?;
        submissions.extend(scraps);
        info!(
            folders = folders.len(),
            submissions = submissions.len(),
            "[MIGRATE] Source site loaded"
        );
        let source = SiteSnapshot {
            folders,
            submissions,
        };

        let destination = self.snapshot_destination().await?;

        let mut session = self.session.lock().await;
        session.source = Some(source);
        session.destination = Some(destination);
        session.plan = None;
        session.migrated.clear();
        Ok(())
    }

    async fn snapshot_destination(&self) -> Result<SiteSnapshot> {
        info!("[MIGRATE] Loading destination site");
        let folders = self.destination.list_folders().await?;
        let submissions = self.destination.list_submissions().await?;
        info!(
            folders = folders.len(),
            submissions = submissions.len(),
            "[MIGRATE] Destination site loaded"
        );
        Ok(SiteSnapshot {
            folders,
            submissions,
        })
    }

    async fn refresh_destination_folders(&self) -> Result<()> {
        let folders = self.destination.list_folders().await?;
        debug!(folders = folders.len(), "[MIGRATE] Refreshed destination folders");
        let mut session = self.session.lock().await;
        match session.destination.as_mut() {
            Some(snapshot) => snapshot.folders = folders,
            None => {
                session.destination = Some(SiteSnapshot {
                    folders,
                    submissions: Vec::new(),
                })
            }
        }
        Ok(())
    }

    /// Compute the plan from the loaded snapshots and re-apply manual
    /// folder overrides.
    pub async fn reconcile(&self) -> Result<Plan> {
        let mut session = self.session.lock().await;
        if session.state.is_running() {
            return Err(SyncError::InvalidState {
                from: session.state,
                to: MigrationState::Idle,
            });
        }
        let (source, destination) = match (&session.source, &session.destination) {
            (Some(s), Some(d)) => (s, d),
            _ => return Err(SyncError::NotLoaded),
        };

        let folder_mapping = map_folders(
            &source.folders,
            &destination.folders,
            self.config.folder_policy,
        );
        let submission_mapping = map_submissions(
            &source.submissions,
            &destination.submissions,
            self.config.submission_policy,
        )?;
        let mut missing = unmapped_submissions(&source.submissions, &submission_mapping);
        missing.retain(|s| !session.migrated.contains(&s.id));
        missing.sort_by_key(|s| s.id);

        let mut plan = Plan {
            unmapped_folders: unmapped_folders(&source.folders, &folder_mapping),
            associations: associate_submissions_with_folders(
                &source.folders,
                &missing,
                &folder_mapping,
            ),
            folder_mapping,
            submission_mapping,
            unmapped_submissions: missing,
        };

        for (source_id, target) in &session.folder_overrides {
            match source.folder(*source_id) {
                Some(folder) => plan.assign_folder(folder.clone(), target.clone(), &source.folders),
                None => warn!(
                    source_id,
                    "[MIGRATE] Override refers to a folder no longer on the source"
                ),
            }
        }

        info!(
            mapped_folders = plan.folder_mapping.len(),
            missing_folders = plan.unmapped_folders.len(),
            mapped_submissions = plan.submission_mapping.len(),
            missing_submissions = plan.unmapped_submissions.len(),
            associated = plan.associations.len(),
            "[MIGRATE] Reconciled sites"
        );

        session.state = MigrationState::Idle;
        session.plan = Some(plan.clone());
        Ok(plan)
    }

    /// File a source folder under an existing destination folder by hand.
    pub async fn override_folder(
        &self,
        source_id: FolderId,
        destination_id: FolderId,
    ) -> Result<()> {
        let mut session = self.session.lock().await;
        let (source, destination) = match (&session.source, &session.destination) {
            (Some(s), Some(d)) => (s.clone(), d),
            _ => return Err(SyncError::NotLoaded),
        };
        let source_folder = source.folder(source_id).cloned().ok_or(SyncError::NotFound {
            kind: "source folder",
            id: source_id,
        })?;
        let target = destination
            .folder(destination_id)
            .cloned()
            .ok_or(SyncError::NotFound {
                kind: "destination folder",
                id: destination_id,
            })?;

        info!(
            source_id,
            destination_id,
            title = %source_folder.title,
            "[MIGRATE] Folder mapping overridden"
        );
        session.folder_overrides.insert(source_id, target.clone());
        if let Some(plan) = session.plan.as_mut() {
            plan.assign_folder(source_folder, target, &source.folders);
        }
        Ok(())
    }

    /// Forget every manual override and reconcile from scratch.
    pub async fn reset_overrides(&self) -> Result<Plan> {
        self.session.lock().await.folder_overrides.clear();
        self.reconcile().await
    }

    async fn transition(&self, next: MigrationState) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            if !session.state.can_become(next) {
                return Err(SyncError::InvalidState {
                    from: session.state,
                    to: next,
                });
            }
            session.state = next;
        }
        self.reporter.report(MigrationEvent::StateChanged(next));
        Ok(())
    }

    /// Create the missing folders, then upload the missing submissions.
    ///
    /// Requires a plan from [`Worker::reconcile`]. Returns a report with
    /// outcome `Cancelled` if `cancel` fires; everything uploaded up to that
    /// point stays uploaded.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("migration", %run_id);
        async {
            let (source, plan, excluded_folders) = self.prepare_run().await?;
            self.transition(MigrationState::RunningFolders).await?;
            match self
                .run_phases(run_id, &cancel, source, plan, excluded_folders)
                .await
            {
                Ok(report) => Ok(report),
                Err(e) => {
                    error!(error = ?e, "[MIGRATE][ERROR] Migration failed");
                    self.session.lock().await.state = MigrationState::Failed;
                    self.reporter
                        .report(MigrationEvent::StateChanged(MigrationState::Failed));
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn prepare_run(&self) -> Result<(SiteSnapshot, Plan, HashSet<FolderId>)> {
        let mut session = self.session.lock().await;
        if session.state.is_running() {
            return Err(SyncError::InvalidState {
                from: session.state,
                to: MigrationState::RunningFolders,
            });
        }
        let source = session.source.clone().ok_or(SyncError::NotLoaded)?;
        let plan = session.plan.clone().ok_or(SyncError::NotLoaded)?;
        if matches!(
            session.state,
            MigrationState::Completed | MigrationState::Cancelled | MigrationState::Failed
        ) {
            session.state = MigrationState::Idle;
        }
        session.uploaded.clear();
        Ok((source, plan, session.excluded_folders.clone()))
    }

    async fn run_phases(
        &self,
        run_id: Uuid,
        cancel: &CancellationToken,
        source: SiteSnapshot,
        plan: Plan,
        excluded_folders: HashSet<FolderId>,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            run_id,
            outcome: MigrationOutcome::Completed,
            created_folders: Vec::new(),
            uploaded: Vec::new(),
            skipped: Vec::new(),
        };

        // --- Phase 1: folders ---
        if cancel.is_cancelled() {
            return self.cancelled(report).await;
        }
        info!(
            missing = plan.unmapped_folders.len(),
            "[MIGRATE] Creating missing folders"
        );
        let created = create_missing_folders(
            self.destination.as_ref(),
            &source.folders,
            &plan.folder_mapping,
            &plan.unmapped_folders,
            &excluded_folders,
        )
        .await?;
        for made in &created {
            self.reporter.report(MigrationEvent::FolderCreated {
                source_id: made.source.id,
                destination_id: made.destination.id,
                title: made.source.title.clone(),
            });
        }
        report.created_folders = created.clone();

        self.refresh_destination_folders().await?;
        let plan = {
            let mut session = self.session.lock().await;
            let plan = session.plan.get_or_insert(plan);
            plan.extend_folders(created, &source.folders);
            plan.clone()
        };

        // --- Phase 2: submissions ---
        self.transition(MigrationState::RunningSubmissions).await?;
        let mut queue: Vec<&Submission> = plan.unmapped_submissions.iter().collect();
        queue.sort_by_key(|s| s.id);
        let total = queue.len();
        info!(total, "[MIGRATE] Uploading missing submissions");

        for submission in queue {
            if cancel.is_cancelled() {
                return self.cancelled(report).await;
            }
            if self.session.is_submission_excluded(submission.id).await {
                self.skip(&mut report, submission.id);
                continue;
            }
            if !report.uploaded.is_empty() {
                let waited = self.pace(cancel, report.uploaded.len(), total).await;
                if waited.is_err() {
                    return self.cancelled(report).await;
                }
                // The exclusion list may have changed while waiting.
                if self.session.is_submission_excluded(submission.id).await {
                    self.skip(&mut report, submission.id);
                    continue;
                }
                if cancel.is_cancelled() {
                    return self.cancelled(report).await;
                }
            }

            let folder_id = plan.folder_for(submission.id);
            let reference = self.upload_one(submission, folder_id).await?;
            {
                let mut session = self.session.lock().await;
                session.uploaded.push(submission.id);
                session.migrated.insert(submission.id);
                if let Some(plan) = session.plan.as_mut() {
                    plan.mark_uploaded(submission.id);
                }
            }
            report.uploaded.push(UploadedSubmission {
                source_id: submission.id,
                title: submission.title.clone(),
                folder_id,
                reference,
            });
            self.reporter.report(MigrationEvent::SubmissionUploaded {
                id: submission.id,
                title: submission.title.clone(),
                folder_id,
            });
            self.reporter.report(MigrationEvent::Progress(Progress {
                uploaded: report.uploaded.len(),
                total,
                waited_secs: 0,
                wait_total_secs: self.config.wait_secs(),
            }));
        }

        self.transition(MigrationState::Completed).await?;
        info!(
            created_folders = report.created_folders.len(),
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            "[MIGRATE] Migration complete"
        );
        Ok(report)
    }

    fn skip(&self, report: &mut MigrationReport, id: SubmissionId) {
        info!(id, "[MIGRATE] Submission excluded, skipping");
        report.skipped.push(id);
        self.reporter.report(MigrationEvent::SubmissionSkipped { id });
    }

    async fn cancelled(&self, mut report: MigrationReport) -> Result<MigrationReport> {
        warn!(
            uploaded = report.uploaded.len(),
            "[MIGRATE] Cancellation requested, stopping"
        );
        self.transition(MigrationState::Cancelling).await?;
        self.transition(MigrationState::Cancelled).await?;
        report.outcome = MigrationOutcome::Cancelled;
        Ok(report)
    }

    /// Sleep the pacing interval in one-second ticks.
    async fn pace(&self, cancel: &CancellationToken, uploaded: usize, total: usize) -> Result<()> {
        let wait_total_secs = self.config.wait_secs();
        for waited_secs in 1..=wait_total_secs {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.reporter.report(MigrationEvent::Progress(Progress {
                uploaded,
                total,
                waited_secs,
                wait_total_secs,
            }));
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    async fn upload_one(
        &self,
        submission: &Submission,
        folder_id: FolderId,
    ) -> Result<SubmissionRef> {
        let content_type = submission.content_type()?;
        info!(
            id = submission.id,
            title = %submission.title,
            content_type = %content_type,
            folder_id,
            "[MIGRATE][UPLOAD] Preparing upload"
        );

        let media = self.source.fetch_blob(&submission.media_locator).await?;
        let thumbnail = match (&submission.thumbnail_locator, content_type) {
            (Some(locator), ContentType::Literary | ContentType::Multimedia) => {
                Some(self.source.fetch_blob(locator).await?)
            }
            _ => None,
        };

        let request = NewSubmission {
            file_name: submission.file_name().to_string(),
            media,
            title: submission.title.clone(),
            content_type,
            category: category_code_or_none(submission.category.as_deref(), content_type),
            rating: rating_code(submission.rating),
            description: submission.description.clone(),
            tags: submission.tags.clone(),
            folder_id,
            thumbnail,
        };

        match self.destination.create_submission(request).await {
            Ok(reference) => {
                info!(
                    id = submission.id,
                    destination_id = ?reference.id,
                    "[MIGRATE][UPLOAD] create_submission succeeded"
                );
                Ok(reference)
            }
            Err(e) => {
                error!(
                    error = ?e,
                    id = submission.id,
                    "[MIGRATE][ERROR][UPLOAD] create_submission failed"
                );
                Err(e)
            }
        }
    }
}

/// Ids in the order they would be uploaded.
pub fn upload_order(submissions: &[Submission], excluded: &HashSet<SubmissionId>) -> Vec<SubmissionId> {
    let mut ids: Vec<SubmissionId> = submissions
        .iter()
        .map(|s| s.id)
        .filter(|id| !excluded.contains(id))
        .collect();
    ids.sort_unstable();
    ids
}
