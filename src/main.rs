//! docsync CLI - Export changed Google Docs to Markdown and PDF.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docsync::{Authenticator, Config, DriveClient, JsonStateStore, SyncReport, Syncer};

/// Export changed Google Docs to Markdown and PDF in the same Drive folder.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Report what would be converted, uploaded or written, without doing it.
    #[arg(long)]
    dry_run: bool,

    /// YAML file listing the Drive folders to sync.
    #[arg(long, env = "DOCSYNC_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// JSON file recording the last synced modified time of each document.
    #[arg(long, env = "DOCSYNC_STATE", default_value = "state.json")]
    state: PathBuf,

    /// OAuth client secrets or service account key.
    #[arg(long, env = "DOCSYNC_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    /// Cached user token, refreshed in place.
    #[arg(long, env = "DOCSYNC_TOKEN", default_value = "token.json")]
    token: PathBuf,

    /// Use this access token instead of the credential files.
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Shared Drive ID; folder paths are then resolved from its root.
    #[arg(long, env = "SHARED_DRIVE_ID")]
    drive_id: Option<String>,

    /// Repeat the sync every N seconds instead of running once.
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    let base_dir = std::env::current_dir().context("Failed to read working directory")?;
    let mappings = config
        .mappings(&base_dir)
        .with_context(|| format!("Invalid directories in {:?}", cli.config))?;

    let mut store = JsonStateStore::load(&cli.state)
        .with_context(|| format!("Failed to load sync state from {:?}", cli.state))?;

    let auth = match &cli.access_token {
        Some(token) => Authenticator::static_token(token.clone()),
        None => Authenticator::from_files(&cli.credentials, &cli.token).with_context(|| {
            format!(
                "Failed to load credentials from {:?} / {:?}",
                cli.credentials, cli.token
            )
        })?,
    };

    // Authentication problems abort before any folder is scanned.
    auth.get_access_token()
        .await
        .context("Failed to authenticate with Google")?;

    let client = DriveClient::new(auth, cli.drive_id.clone());
    let mut total = SyncReport::default();
    let mut passes = 0usize;

    loop {
        let report = Syncer::new(&client, &mut store, cli.dry_run)
            .run(&mappings)
            .await
            .with_context(|| format!("Failed to save sync state to {:?}", cli.state))?;

        for plan in &report.planned {
            println!("{}", plan);
        }
        for failure in &report.failures {
            eprintln!("Error: {}", failure);
        }
        println!("{}", report);

        passes += 1;
        total.merge(report);

        match cli.interval {
            Some(secs) => {
                info!(passes, total = %total, "next sync in {}s", secs);
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            None => break,
        }
    }

    Ok(())
}
