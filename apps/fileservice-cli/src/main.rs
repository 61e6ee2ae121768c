//! `fileservice` entry point.
//!
//! Uploads a file to, or downloads a file from, the Metadata File Service.
//! Settings not given on the command line come from the last run.

mod config;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fileservice_client::{FileServiceClient, StaticTokenProvider};
use fileservice_uploader::{UploadOrchestrator, UploadOutcome};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Metadata File Service uploader")]
struct Cli {
    /// Service base URL, e.g. https://host/MetadataService/v2/
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token for the service
    #[arg(long, env = "FILESERVICE_ACCESS_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Retries for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Settings file (defaults to the per-user location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file as a resource's content
    Upload {
        /// Resource id (defaults to the last one used)
        #[arg(long)]
        resource_id: Option<u32>,

        /// File to upload (defaults to the last one uploaded)
        file: Option<PathBuf>,
    },
    /// Download a resource's content into a folder
    Download {
        /// Resource id (defaults to the last one used)
        #[arg(long)]
        resource_id: Option<u32>,

        /// Destination folder (defaults to the last one used)
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut settings = match CliConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to load config, using defaults");
            CliConfig::default()
        }
    };
    if let Some(base_url) = &cli.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(max_retries) = cli.max_retries {
        settings.max_retries = max_retries;
    }

    let tokens = Arc::new(StaticTokenProvider::new(cli.token.clone().unwrap_or_default()));
    let client = FileServiceClient::new(&settings.client_config(), tokens)
        .context("failed to create service client")?;
    let mut orchestrator = UploadOrchestrator::new(&client, settings.uploader_config());

    let mut events = orchestrator
        .take_events()
        .context("event receiver already taken")?;
    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            report::log_event(&event);
        }
    });

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling transfer");
            cancel.cancel();
        }
    });

    let result = match cli.command {
        Command::Upload { resource_id, file } => {
            let resource_id = resource_id
                .or(settings.resource_id)
                .context("no resource id given")?;
            let file = file
                .or_else(|| settings.file_path.clone())
                .context("no file given")?;
            settings.resource_id = Some(resource_id);
            settings.file_path = Some(file.clone());
            save_settings(&settings, &config_path);

            info!(resource_id, file = %file.display(), base_url = %client.base_url(), "starting upload");
            orchestrator
                .upload_file(resource_id, &file)
                .await
                .map(|outcome| match outcome {
                    UploadOutcome::Uploaded { part_count, .. } => {
                        info!(parts = part_count, "upload committed");
                    }
                    UploadOutcome::AlreadyUploaded { .. } => {
                        info!("service already had this file");
                    }
                })
        }
        Command::Download { resource_id, dir } => {
            let resource_id = resource_id
                .or(settings.resource_id)
                .context("no resource id given")?;
            let dir = dir
                .or_else(|| settings.download_dir.clone())
                .context("no destination folder given")?;
            settings.resource_id = Some(resource_id);
            settings.download_dir = Some(dir.clone());
            save_settings(&settings, &config_path);

            info!(resource_id, dir = %dir.display(), base_url = %client.base_url(), "starting download");
            orchestrator
                .download_file(resource_id, &dir)
                .await
                .map(|outcome| info!(path = %outcome.path.display(), "saved"))
        }
    };

    // Dropping the orchestrator closes the event channel.
    drop(orchestrator);
    if let Err(e) = logger.await {
        warn!(error = %e, "event logger stopped");
    }

    result.context("transfer failed")
}

fn save_settings(settings: &CliConfig, path: &Path) {
    if let Err(e) = settings.save(path) {
        warn!(error = %e, "failed to save config");
    }
}
