//! scoreshare-upload - command-line client for scoreshare-ingest

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scoreshare_cli::plan::DEFAULT_CHUNK_SIZE;
use scoreshare_cli::{UploadClient, UploadOptions};

/// Command-line arguments for scoreshare-upload
#[derive(Parser, Debug)]
#[command(name = "scoreshare-upload")]
#[command(about = "Upload sheet music to a ScoreShare ingest server")]
#[command(version)]
struct Args {
    /// Base URL of the ingest server
    #[arg(short, long, default_value = "http://127.0.0.1:5780", env = "SCORESHARE_SERVER")]
    server: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "60")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file in chunks
    Upload {
        /// File to upload
        file: PathBuf,

        /// Chunk size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Number of chunks sent concurrently
        #[arg(long, default_value = "1")]
        parallel: usize,

        /// Extra attempts per chunk after a retryable failure
        #[arg(long, default_value = "2")]
        retries: u32,

        /// Display name (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,

        /// Session id (generated when omitted)
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Cancel an upload session
    Cancel {
        /// Session id to cancel
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scoreshare_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let client = UploadClient::new(&args.server, Duration::from_secs(args.timeout))
        .context("Failed to create HTTP client")?;

    match args.command {
        Command::Upload {
            file,
            chunk_size,
            parallel,
            retries,
            name,
            session_id,
        } => {
            let options = UploadOptions {
                chunk_size,
                parallel,
                retries,
                session_id,
                file_name: name,
            };
            let published = client
                .upload_file(&file, &options)
                .await
                .with_context(|| format!("Failed to upload {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&published)?);
        }
        Command::Cancel { session_id } => {
            client
                .cancel(&session_id)
                .await
                .with_context(|| format!("Failed to cancel session {}", session_id))?;
            println!("Cancelled {}", session_id);
        }
    }

    Ok(())
}
