//! # gallery-sync CLI interface
//!
//! Command parsing and the two entrypoints, `plan` and `migrate`. All
//! reconciliation and upload logic lives in `gallery-sync-core`; this module
//! wires the configured adapters into a core [`Worker`] and renders what it
//! reports.
//!
//! - `plan` loads both sites, reconciles them and prints the resulting plan.
//! - `migrate` does the same, then runs the migration on a background task,
//!   printing progress as it arrives. Ctrl-C asks the run to stop before its
//!   next upload.
//!
//! For programmatic and integration use, call [`run`] with a constructed [`Cli`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use gallery_sync_core::contract::{DestinationSite, SourceSite};
use gallery_sync_core::progress::{
    ChannelReporter, MigrationEvent, ProgressReporter, TracingReporter,
};
use gallery_sync_core::session::Plan;
use gallery_sync_core::worker::{upload_order, MigrationOutcome, MigrationReport, Worker};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::export_source::ExportSource;
use crate::load_config::{load_config, CliConfig};
use crate::weasyl::WeasylClient;

/// CLI for gallery-sync: move a gallery and its folders to Weasyl.
#[derive(Parser)]
#[clap(
    name = "gallery-sync",
    version,
    about = "Reconcile a site export against a Weasyl account and upload what is missing"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show what would be created and uploaded, without changing anything
    Plan {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Create missing folders and upload missing submissions
    Migrate {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Minutes to wait between uploads; overrides the config file
        #[clap(long)]
        interval_minutes: Option<u64>,
    },
}

type CliWorker = Worker<ExportSource, WeasylClient>;

/// Async CLI entrypoint, shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Plan { config } => {
            let config = load_config(config)?;
            info!(command = "plan", "Reconciling sites");
            let worker = prepare(config, Arc::new(TracingReporter)).await?;
            let plan = worker
                .session()
                .plan()
                .await
                .ok_or_else(|| anyhow!("No plan after reconciliation"))?;
            let excluded = worker.session().lock().await.excluded_submissions.clone();
            print_plan(&plan, &upload_order(&plan.unmapped_submissions, &excluded));
            Ok(())
        }
        Commands::Migrate {
            config,
            interval_minutes,
        } => {
            let mut config = load_config(config)?;
            if let Some(minutes) = interval_minutes {
                config.migration.interval_minutes = minutes;
            }
            info!(command = "migrate", "Starting migration");
            let (reporter, events) = ChannelReporter::channel();
            let worker = prepare(config, Arc::new(reporter)).await?;
            println!(
                "Uploading with {} minute(s) between submissions; Ctrl-C stops after the current one",
                worker.config().interval_minutes
            );
            match migrate(Arc::new(worker), events, tokio::signal::ctrl_c()).await {
                Ok(report) => {
                    print_report(&report);
                    info!(command = "migrate", outcome = ?report.outcome, "Migration finished");
                    Ok(())
                }
                Err(e) => {
                    error!(command = "migrate", error = %e, "Migration failed");
                    Err(e)
                }
            }
        }
    }
}

/// Connect both sites, load and reconcile them, then apply the overrides
/// and exclusions from the config.
async fn prepare(config: CliConfig, reporter: Arc<dyn ProgressReporter>) -> Result<CliWorker> {
    let source = ExportSource::new(
        &config.source.export,
        config.migration.source_requests_per_minute,
    )?;
    let destination =
        WeasylClient::connect(&config.destination.base_url, &config.destination.api_key).await?;

    let worker = Worker::new(
        Arc::new(source),
        Arc::new(destination),
        config.migration,
        reporter,
    );

    worker.load().await?;
    worker.reconcile().await?;

    for (source_id, destination_id) in &config.overrides.folders {
        worker
            .override_folder(*source_id, *destination_id)
            .await
            .map_err(|e| anyhow!("Folder override {source_id} -> {destination_id} failed: {e}"))?;
    }
    let session = worker.session();
    for id in &config.overrides.exclude_folders {
        session.exclude_folder(*id).await;
    }
    for id in &config.overrides.exclude_submissions {
        session.exclude_submission(*id).await;
    }
    Ok(worker)
}

/// Run `worker` on a background task, rendering its events until it
/// finishes. When `interrupt` resolves the run is cancelled and stops before
/// its next upload.
pub async fn migrate<S, D, F>(
    worker: Arc<Worker<S, D>>,
    mut events: UnboundedReceiver<MigrationEvent>,
    interrupt: F,
) -> Result<MigrationReport>
where
    S: SourceSite + 'static,
    D: DestinationSite + 'static,
    F: Future<Output = std::io::Result<()>>,
{
    let cancel = CancellationToken::new();
    let mut task = tokio::spawn({
        let worker = worker.clone();
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    // One listener for the whole run, so a signal between polls is kept.
    tokio::pin!(interrupt);
    let joined = loop {
        tokio::select! {
            Some(event) = events.recv() => render(&event),
            signal = &mut interrupt, if !cancel.is_cancelled() => {
                if let Err(e) = signal {
                    warn!(error = ?e, "Could not listen for Ctrl-C");
                }
                warn!("Interrupted; stopping before the next upload");
                cancel.cancel();
            }
            joined = &mut task => break joined,
        }
    };
    while let Ok(event) = events.try_recv() {
        render(&event);
    }

    let report = joined.map_err(|e| anyhow!("Migration task panicked: {e}"))??;
    Ok(report)
}

fn render(event: &MigrationEvent) {
    match event {
        MigrationEvent::StateChanged(state) => println!("== {state:?}"),
        MigrationEvent::FolderCreated {
            source_id,
            destination_id,
            title,
        } => println!("+ folder {title:?} (#{source_id} -> #{destination_id})"),
        MigrationEvent::SubmissionSkipped { id } => println!("- skipped #{id}"),
        MigrationEvent::SubmissionUploaded {
            id,
            title,
            folder_id,
        } => println!("+ uploaded #{id} {title:?} into folder {folder_id}"),
        // Wait ticks arrive every second; one line a minute is enough.
        MigrationEvent::Progress(p) if p.waited_secs > 0 && p.waited_secs % 60 == 0 => println!(
            "  waited {}/{}s ({}/{} uploaded)",
            p.waited_secs, p.wait_total_secs, p.uploaded, p.total
        ),
        MigrationEvent::Progress(p) => {
            tracing::debug!(uploaded = p.uploaded, total = p.total, waited_secs = p.waited_secs, "Progress")
        }
    }
}

fn print_plan(plan: &Plan, order: &[i64]) {
    println!("Folders matched: {}", plan.folder_mapping.len());
    for m in &plan.folder_mapping {
        println!(
            "  {:?} (#{}) -> {:?} (#{}) [{:.2}]",
            m.source.title, m.source.id, m.destination.title, m.destination.id, m.score
        );
    }
    println!("Folders to create: {}", plan.unmapped_folders.len());
    for f in &plan.unmapped_folders {
        println!("  {:?} (#{})", f.title, f.id);
    }
    println!("Submissions matched: {}", plan.submission_mapping.len());
    println!("Submissions to upload: {}", order.len());
    for id in order {
        let title = plan
            .unmapped_submissions
            .iter()
            .find(|s| s.id == *id)
            .map(|s| s.title.as_str())
            .unwrap_or_default();
        println!("  #{id} {title:?} -> folder {}", plan.folder_for(*id));
    }
}

fn print_report(report: &MigrationReport) {
    let outcome = match report.outcome {
        MigrationOutcome::Completed => "completed",
        MigrationOutcome::Cancelled => "cancelled",
    };
    println!(
        "Migration {outcome} (run {}): {} folders created, {} submissions uploaded, {} skipped",
        report.run_id,
        report.created_folders.len(),
        report.uploaded.len(),
        report.skipped.len()
    );
    for u in &report.uploaded {
        match &u.reference.url {
            Some(url) => println!("  #{} {:?} -> {url}", u.source_id, u.title),
            None => println!("  #{} {:?}", u.source_id, u.title),
        }
    }
}
