use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::matcher::MatchPolicy;
use crate::tables::SOURCE_PAGE_REQUESTS_PER_MINUTE;

/// Tunables of one migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Pause between two uploads, in whole minutes.
    pub interval_minutes: u64,
    /// Acceptance rule for folder titles.
    pub folder_policy: MatchPolicy,
    /// Acceptance rule for submission titles.
    pub submission_policy: MatchPolicy,
    pub source_requests_per_minute: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 0,
            folder_policy: MatchPolicy::default(),
            submission_policy: MatchPolicy::BestAvailable,
            source_requests_per_minute: SOURCE_PAGE_REQUESTS_PER_MINUTE,
        }
    }
}

impl MigrationConfig {
    pub fn wait_secs(&self) -> u64 {
        self.interval_minutes * 60
    }

    pub fn trace_loaded(&self) {
        info!(
            interval_minutes = self.interval_minutes,
            folder_policy = ?self.folder_policy,
            submission_policy = ?self.submission_policy,
            "Loaded MigrationConfig"
        );
        debug!(?self, "MigrationConfig loaded (full debug)");
    }
}
