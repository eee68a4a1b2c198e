//! # progress: observability collaborator for a migration run
//!
//! The worker never logs progress through a global; it is handed a
//! [`ProgressReporter`] by whoever starts it and reports every state change,
//! created folder, wait tick and upload through it.
//!
//! Two implementations ship with the crate:
//! - [`TracingReporter`] turns events into `tracing` events.
//! - [`ChannelReporter`] forwards events over a tokio channel to a front end.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::contract::{FolderId, SubmissionId};

/// Lifecycle of a migration run.
///
/// ```text
/// Idle → RunningFolders → RunningSubmissions → Completed
///            ↓                  ↓
///            └──→ Cancelling ←──┘ → Cancelled
///            └──→ Failed ←──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MigrationState {
    #[default]
    Idle,
    RunningFolders,
    RunningSubmissions,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl MigrationState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            MigrationState::RunningFolders
                | MigrationState::RunningSubmissions
                | MigrationState::Cancelling
        )
    }

    pub fn can_become(&self, next: MigrationState) -> bool {
        use MigrationState::*;
        matches!(
            (self, next),
            (Idle, RunningFolders)
                | (RunningFolders, RunningSubmissions)
                | (RunningSubmissions, Completed)
                | (RunningFolders | RunningSubmissions, Cancelling)
                | (RunningFolders | RunningSubmissions, Failed)
                | (Cancelling, Cancelled)
                | (Completed | Cancelled | Failed, Idle)
        )
    }
}

/// Upload counters, plus the pacing wait when one is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub uploaded: usize,
    pub total: usize,
    pub waited_secs: u64,
    pub wait_total_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MigrationEvent {
    StateChanged(MigrationState),
    FolderCreated {
        source_id: FolderId,
        destination_id: FolderId,
        title: String,
    },
    SubmissionSkipped {
        id: SubmissionId,
    },
    SubmissionUploaded {
        id: SubmissionId,
        title: String,
        folder_id: FolderId,
    },
    Progress(Progress),
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: MigrationEvent);
}

/// Logs every event at info level, except wait ticks which go to debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: MigrationEvent) {
        match event {
            MigrationEvent::StateChanged(state) => info!(?state, "Migration state changed"),
            MigrationEvent::FolderCreated {
                source_id,
                destination_id,
                title,
            } => info!(source_id, destination_id, title = %title, "Folder created"),
            MigrationEvent::SubmissionSkipped { id } => info!(id, "Submission skipped"),
            MigrationEvent::SubmissionUploaded {
                id,
                title,
                folder_id,
            } => info!(id, folder_id, title = %title, "Submission uploaded"),
            MigrationEvent::Progress(p) if p.waited_secs > 0 => debug!(
                uploaded = p.uploaded,
                total = p.total,
                waited_secs = p.waited_secs,
                wait_total_secs = p.wait_total_secs,
                "Waiting before next upload"
            ),
            MigrationEvent::Progress(p) => {
                info!(uploaded = p.uploaded, total = p.total, "Upload progress")
            }
        }
    }
}

/// Forwards events to a receiver, typically a front end's render loop.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<MigrationEvent>,
}

impl ChannelReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MigrationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: MigrationEvent) {
        // A closed receiver only means nobody is watching any more.
        let _ = self.tx.send(event);
    }
}
