//! `load_config` module: turns the static YAML config, plus secrets from the
//! environment, into the typed settings the CLI runs with.
//!
//! # Responsibilities
//! - Parse the user-supplied YAML (`source`, `destination`, `migration`, `overrides`)
//! - Map the loosely-typed `migration` keys onto the core [`MigrationConfig`]
//! - Inject `WEASYL_API_KEY` from the environment; it never lives in the file
//! - Resolve a relative export path against the config file's directory
//!
//! # Errors
//! Every failure is logged and returned as an `anyhow::Error` carrying the
//! offending path or variable name.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use gallery_sync_core::config::MigrationConfig;
use gallery_sync_core::contract::{FolderId, SubmissionId};
use gallery_sync_core::matcher::MatchPolicy;
use gallery_sync_core::tables::{DEFAULT_MATCH_THRESHOLD, SOURCE_PAGE_REQUESTS_PER_MINUTE};
use serde::Deserialize;
use tracing::{error, info};

use crate::weasyl::WEASYL_ROOT;

pub const API_KEY_VAR: &str = "WEASYL_API_KEY";

#[derive(Debug)]
pub struct CliConfig {
    pub source: SourceSection,
    pub destination: DestinationConfig,
    pub migration: MigrationConfig,
    pub overrides: OverridesSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    /// Path or `http(s)` URL of the site export.
    pub export: String,
}

#[derive(Debug, Clone)]
pub struct DestinationConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
struct DestinationSection {
    #[serde(default = "default_base_url")]
    base_url: String,
}

fn default_base_url() -> String {
    WEASYL_ROOT.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MigrationSection {
    pub interval_minutes: u64,
    pub folder_threshold: f64,
    /// Unset means the best title match is always taken.
    pub submission_threshold: Option<f64>,
    pub source_requests_per_minute: u32,
}

impl Default for MigrationSection {
    fn default() -> Self {
        Self {
            interval_minutes: 0,
            folder_threshold: DEFAULT_MATCH_THRESHOLD,
            submission_threshold: None,
            source_requests_per_minute: SOURCE_PAGE_REQUESTS_PER_MINUTE,
        }
    }
}

impl From<MigrationSection> for MigrationConfig {
    fn from(section: MigrationSection) -> Self {
        MigrationConfig {
            interval_minutes: section.interval_minutes,
            folder_policy: MatchPolicy::Threshold(section.folder_threshold),
            submission_policy: section
                .submission_threshold
                .map_or(MatchPolicy::BestAvailable, MatchPolicy::Threshold),
            source_requests_per_minute: section.source_requests_per_minute,
        }
    }
}

/// Manual corrections applied after reconciliation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverridesSection {
    /// Source folder id to destination folder id.
    pub folders: BTreeMap<FolderId, FolderId>,
    pub exclude_folders: Vec<FolderId>,
    pub exclude_submissions: Vec<SubmissionId>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    source: SourceSection,
    #[serde(default)]
    destination: Option<DestinationSection>,
    #[serde(default)]
    migration: MigrationSection,
    #[serde(default)]
    overrides: OverridesSection,
}

/// Load the YAML config at `path` and inject the destination API key.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let raw: RawConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    check_threshold("folder_threshold", raw.migration.folder_threshold)?;
    if let Some(threshold) = raw.migration.submission_threshold {
        check_threshold("submission_threshold", threshold)?;
    }

    let api_key = std::env::var(API_KEY_VAR).map_err(|e| {
        error!(error = ?e, "{API_KEY_VAR} missing in environment");
        anyhow!("{API_KEY_VAR} must be set in the environment or .env")
    })?;

    let mut source = raw.source;
    source.export = resolve_export(&source.export, path_ref);

    let destination = DestinationConfig {
        base_url: raw
            .destination
            .map_or_else(default_base_url, |d| d.base_url)
            .trim_end_matches('/')
            .to_string(),
        api_key,
    };

    let config = CliConfig {
        source,
        destination,
        migration: raw.migration.into(),
        overrides: raw.overrides,
    };
    info!(
        export = %config.source.export,
        destination = %config.destination.base_url,
        folder_overrides = config.overrides.folders.len(),
        "Configuration loaded"
    );
    Ok(config)
}

fn check_threshold(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        error!(field = name, value, "Match threshold out of range");
        return Err(anyhow!("migration.{name} must be within 0..=1, got {value}"));
    }
    Ok(())
}

fn resolve_export(export: &str, config_path: &Path) -> String {
    if export.starts_with("http://") || export.starts_with("https://") {
        return export.to_string();
    }
    let export_path = Path::new(export);
    if export_path.is_absolute() {
        return export.to_string();
    }
    match config_path.parent() {
        Some(dir) => dir.join(export_path).to_string_lossy().into_owned(),
        None => export.to_string(),
    }
}
