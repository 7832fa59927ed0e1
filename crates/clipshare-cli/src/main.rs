//! Clipshare CLI
//!
//! Command-line front end standing in for the upload, analytics and trim
//! request handlers. Every command prints JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use clipshare_lib::core::library::LoadOrigin;
use clipshare_lib::core::settings::EngineSettings;
use clipshare_lib::{init_logging, AnalyticsEvent, LibraryStore, TrimPipeline};

#[derive(Debug, Parser)]
#[command(name = "clipshare-cli", version, about = "Manage recorded clips and their analytics")]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true, default_value = "clipshare.json")]
    settings: PathBuf,

    /// Override the data directory holding db.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Also write a rolling log file into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a media file in the uploads directory and register it
    Upload {
        /// Recorded media file
        file: PathBuf,
    },
    /// Show one clip record
    Get { id: String },
    /// List all clip records, newest first
    List,
    /// Record a playback event (view or complete)
    Event {
        id: String,
        #[arg(value_parser = parse_event)]
        event: AnalyticsEvent,
    },
    /// Cut [start, end) seconds out of a media file
    Trim {
        input: PathBuf,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
        /// Where to write the trimmed clip
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Report store health and transcoder availability
    Status,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Video not found: {0}")]
    VideoNotFound(String),
}

fn parse_event(value: &str) -> Result<AnalyticsEvent, String> {
    value.parse()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    id: String,
    url: String,
    share_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    database: PathBuf,
    origin: String,
    videos: usize,
    ffmpeg: Option<String>,
    ffmpeg_error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_dir.as_deref());

    let settings = load_settings(&cli)?;
    let store = Arc::new(LibraryStore::from_settings(&settings));

    match cli.command {
        Command::Upload { file } => {
            let response = upload(&settings, &store, &file).await?;
            print_json(&response)
        }
        Command::Get { id } => {
            let record = store
                .get(&id)?
                .ok_or_else(|| CliError::VideoNotFound(id.clone()))?;
            print_json(&record)
        }
        Command::List => print_json(&store.list()?),
        Command::Event { id, event } => {
            // Unknown ids are accepted and ignored, like the analytics endpoint.
            store.record_event(&id, event)?;
            print_json(&serde_json::json!({ "success": true }))
        }
        Command::Trim {
            input,
            start,
            end,
            output,
        } => {
            let pipeline = TrimPipeline::from_settings(&settings)
                .context("Trim service unavailable")?;
            let bytes = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let trimmed = pipeline.trim_seconds(&bytes, start, end).await?;
            tokio::fs::write(&output, &trimmed)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            print_json(&serde_json::json!({
                "output": output,
                "bytes": trimmed.len(),
            }))
        }
        Command::Status => {
            let loaded = store.load()?;
            let (ffmpeg, ffmpeg_error) = match TrimPipeline::from_settings(&settings) {
                Ok(pipeline) => {
                    let info = pipeline.ffmpeg();
                    let described = format!("{} at {}", info.version, info.ffmpeg_path.display());
                    (Some(described), None)
                }
                Err(e) => (None, Some(e.to_string())),
            };
            print_json(&StatusResponse {
                database: store.db_path().to_path_buf(),
                origin: describe_origin(&loaded.origin),
                videos: loaded.document.len(),
                ffmpeg,
                ffmpeg_error,
            })
        }
    }
}

fn load_settings(cli: &Cli) -> Result<EngineSettings> {
    let mut settings = EngineSettings::load_from_file(&cli.settings)
        .with_context(|| format!("Failed to load settings from {}", cli.settings.display()))?;
    settings.apply_env_overrides();
    if let Some(dir) = &cli.data_dir {
        settings.data_dir = dir.clone();
    }
    Ok(settings)
}

/// Copy the media into the uploads directory and create its record.
///
/// The stored file is removed again if the record cannot be created. The
/// store call blocks on a file lock, so it runs on the blocking pool.
async fn upload(
    settings: &EngineSettings,
    store: &Arc<LibraryStore>,
    file: &Path,
) -> Result<UploadResponse> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    anyhow::ensure!(!bytes.is_empty(), "No file provided: {} is empty", file.display());

    let id = uuid::Uuid::new_v4().to_string();
    let filename = format!("{id}.{}", settings.media_extension);

    tokio::fs::create_dir_all(&settings.uploads_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.uploads_dir.display()))?;
    let stored = settings.uploads_dir.join(&filename);
    tokio::fs::write(&stored, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", stored.display()))?;

    let created = {
        let store = Arc::clone(store);
        let (id, filename) = (id.clone(), filename.clone());
        tokio::task::spawn_blocking(move || store.create(&id, &filename))
            .await
            .context("Store task failed")?
    };
    if let Err(e) = created {
        if let Err(rm) = tokio::fs::remove_file(&stored).await {
            warn!("Failed to remove {} after failed upload: {}", stored.display(), rm);
        }
        return Err(e).context("Failed to register upload");
    }

    info!("Uploaded {} ({} bytes)", id, bytes.len());
    Ok(UploadResponse {
        url: format!("/uploads/{filename}"),
        share_url: format!("/v/{id}"),
        id,
    })
}

fn describe_origin(origin: &LoadOrigin) -> String {
    match origin {
        LoadOrigin::Initialized => "initialized".to_string(),
        LoadOrigin::Existing => "existing".to_string(),
        LoadOrigin::Migrated => "migrated".to_string(),
        LoadOrigin::Recovered { quarantined, reason } => match quarantined {
            Some(path) => format!("recovered ({reason}); original moved to {}", path.display()),
            None => format!("recovered ({reason})"),
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
