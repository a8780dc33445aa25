//!
//! This module implements the CLI for media-upload: command parsing, reading
//! the selected files, driving the upload manager and rendering its state.
//!
//! The task model and upload lifecycle live in [`media_upload_core`]; this
//! module is glue between the terminal, the config file and the HTTP transport.
//!
//! ## How To Use
//! - From the command line: `media-upload upload --config upload.yaml clip.mp4`.
//! - Programmatically / in tests: call [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, UploadConfig};
use crate::transport::HttpTransport;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use media_upload_core::config::AdmissionPolicy;
use media_upload_core::manager::{NoticeKind, UploadManager, UploadSnapshot};
use media_upload_core::source::FileSource;
use media_upload_core::task::{TaskId, TaskStatus, TaskView};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Characters of the file name shown per line.
const DISPLAY_NAME_CHARS: usize = 25;

/// CLI for media-upload: send media files to an upload endpoint.
#[derive(Parser)]
#[clap(
    name = "media-upload",
    version,
    about = "Upload video, image and audio files to a multipart HTTP endpoint with live progress"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload one or more files using the given config file
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,

        /// Override the admission mode from the config file
        #[clap(long, value_enum)]
        mode: Option<Mode>,

        /// Print the final state as JSON
        #[clap(long)]
        json: bool,

        /// Files to upload
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    Single,
    Multiple,
}

impl From<Mode> for AdmissionPolicy {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Single => AdmissionPolicy::Single,
            Mode::Multiple => AdmissionPolicy::Multiple,
        }
    }
}

/// Outcome counts of one run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub rejected: usize,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Upload {
            config,
            mode,
            json,
            files,
        } => {
            let mut config = load_config(config)?;
            if let Some(mode) = mode {
                config = config.with_admission(mode.into());
            }
            let summary = upload(config, files, json).await?;
            println!(
                "Upload complete: {} succeeded, {} cancelled, {} failed, {} rejected",
                summary.succeeded, summary.cancelled, summary.failed, summary.rejected
            );
            if summary.failed > 0 {
                anyhow::bail!("{} upload(s) failed", summary.failed);
            }
            Ok(())
        }
    }
}

/// Reads, selects and uploads `paths`, returning once no upload is active.
pub async fn upload(config: UploadConfig, paths: Vec<PathBuf>, json: bool) -> Result<RunSummary> {
    let mut candidates = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = FileSource::read_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        candidates.push(file);
    }

    let source = FileSource::new(config.source.clone());
    let selection = source.select(candidates);
    for rejection in &selection.rejected {
        eprintln!("[SKIPPED] {}: {:?}", rejection.name, rejection.reason);
    }
    if selection.admitted.is_empty() {
        anyhow::bail!("No file passed the selection policy; nothing to upload");
    }

    let transport = HttpTransport::new(config.transport.clone())
        .map_err(|e| anyhow::anyhow!("Failed to construct transport: {e}"))?;
    let manager = UploadManager::new(Arc::new(transport), config.policy);
    let mut updates = manager.subscribe();

    println!("Uploading {} file(s) to {}", selection.admitted.len(), config.transport.endpoint);
    manager.admit(selection.admitted);

    let mut last_seen: HashMap<TaskId, (TaskStatus, u8)> = HashMap::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        let snapshot = updates.borrow_and_update().clone();
        render(&snapshot, &mut last_seen);
        if snapshot.active == 0 {
            break;
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                let cancelled = manager.cancel_all();
                eprintln!("Interrupted: cancelling {cancelled} upload(s)");
            }
        }
    }

    let final_state = manager.snapshot();
    let summary = RunSummary {
        succeeded: final_state.outcomes.succeeded,
        cancelled: final_state.outcomes.cancelled,
        failed: final_state.outcomes.failed,
        rejected: selection.rejected.len(),
    };
    if let Some(notice) = &final_state.notice {
        let tag = match notice.kind {
            NoticeKind::Success => "OK",
            NoticeKind::Cancelled => "CANCELLED",
            NoticeKind::Error => "ERROR",
        };
        println!("[{tag}] {}", notice.message);
    }
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&final_state).context("Failed to serialise final state")?
        );
    }
    tracing::debug!(?summary, "Upload run finished");
    Ok(summary)
}

/// Prints one line per task whose status or percentage changed.
fn render(snapshot: &UploadSnapshot, last_seen: &mut HashMap<TaskId, (TaskStatus, u8)>) {
    for task in snapshot.in_flight.iter().chain(snapshot.completed.iter()) {
        let current = (task.status, task.progress);
        if last_seen.get(&task.id) == Some(&current) {
            continue;
        }
        last_seen.insert(task.id, current);
        println!("{}", format_line(task));
    }
}

pub fn format_line(task: &TaskView) -> String {
    let name: String = task.name.chars().take(DISPLAY_NAME_CHARS).collect();
    let mut line = format!(
        "{:<width$}  {:<5}  {:<9}  {:>3}%",
        name,
        task.kind.as_str(),
        task.status.as_str(),
        task.progress,
        width = DISPLAY_NAME_CHARS
    );
    if let Some(detail) = &task.error_detail {
        line.push_str("  ");
        line.push_str(detail);
    }
    line
}
