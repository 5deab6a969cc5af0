// Image scan CLI
//
// Scans one page for image assets, purges the asset store, reports health
// and exports images as a zip archive. Configuration comes from IMGSCAN_*
// environment variables.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kodegen_tools_imgscan::{
    DurableStore, ImageScanService, JobState, ScanConfig, ScanOptions, Submission,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "kodegen-imgscan")]
#[command(about = "Discover, download and store the images of a web page", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one page and print the result as JSON
    Scan {
        /// Target URL; https:// is assumed when no scheme is given
        url: String,

        /// Downloads in flight at once (1-20)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Queue priority, higher runs first
        #[arg(long, default_value = "0")]
        priority: i32,
    },

    /// Remove expired stored files
    Purge {
        /// Remove every stored file regardless of expiry
        #[arg(long)]
        force: bool,
    },

    /// Print a health report as JSON
    Health,

    /// Download images into a zip archive
    Export {
        /// Image URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output archive path
        #[arg(short, long, default_value = "images.zip")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ScanConfig::from_env().context("Invalid IMGSCAN_* configuration")?;

    // A full service would race its own startup sweep against this one
    if let Commands::Purge { force } = cli.command {
        return purge(&config, force).await;
    }

    let service = ImageScanService::start(config)
        .await
        .context("Failed to start image scan service")?;

    let outcome = match cli.command {
        Commands::Scan {
            url,
            concurrency,
            priority,
        } => {
            scan(
                &service,
                &url,
                ScanOptions {
                    concurrency,
                    priority,
                },
            )
            .await
        }
        Commands::Purge { .. } => Ok(()),
        Commands::Health => {
            let report = service.health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Export { urls, out } => export(&service, urls, out).await,
    };

    service.shutdown().await;
    outcome
}

async fn scan(service: &ImageScanService, url: &str, options: ScanOptions) -> Result<()> {
    let submission = service
        .submit(url, options)
        .map_err(|e| anyhow::anyhow!(e.public_message()))?;

    let job_id = match submission {
        Submission::Cached(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
        Submission::Queued(job_id) => job_id,
    };

    tracing::info!("Queued scan job {job_id}");
    let mut last_progress = 0;
    loop {
        let status = service.poll(&job_id);
        if status.progress != last_progress {
            tracing::info!("Job {job_id}: {}%", status.progress);
            last_progress = status.progress;
        }

        match status.state {
            JobState::Completed => {
                let result = status.result.context("Completed job carried no result")?;
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            JobState::Failed => {
                anyhow::bail!(
                    "Scan failed after {} attempts: {}",
                    status.attempts,
                    status.error.unwrap_or_default()
                );
            }
            JobState::NotFound => anyhow::bail!("Job {job_id} disappeared"),
            JobState::Queued | JobState::Active => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

async fn purge(config: &ScanConfig, force: bool) -> Result<()> {
    let store = DurableStore::open(config.storage_dir(), config.file_ttl())
        .await
        .map_err(|e| anyhow::anyhow!(e.public_message()))?;

    match store.sweep(force).await.map_err(|e| anyhow::anyhow!(e.public_message()))? {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => tracing::warn!("A sweep is already running; nothing done"),
    }
    Ok(())
}

async fn export(service: &ImageScanService, urls: Vec<String>, out: PathBuf) -> Result<()> {
    let mut file = tokio::fs::File::create(&out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let mut stream = service.export_archive(urls);
    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| anyhow::anyhow!(e.public_message()))?;
        total += chunk.len();
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    tracing::info!("Wrote {total} bytes to {}", out.display());
    Ok(())
}
