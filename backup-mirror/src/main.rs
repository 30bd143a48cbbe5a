//! Backup Mirror - Main entry point
//!
//! Copies new and changed files from a source directory into a backup
//! directory.

use anyhow::Result;
use backup_mirror::{config::Config, utils, BackupJob};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to back up (overrides config)
    source: Option<PathBuf>,

    /// Directory to back up into (overrides config)
    destination: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Delete files in the destination that no longer exist in the source
    #[arg(long)]
    mirror: bool,

    /// Copy what symlinks point at instead of recreating the links
    #[arg(long)]
    follow_symlinks: bool,

    /// Assume same-size files are unchanged without comparing their content
    #[arg(long)]
    skip_content_check: bool,

    /// Print the backup plan as JSON without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not draw progress bars
    #[arg(short, long)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    fn apply_to(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.backup.source = Some(source.clone());
        }
        if let Some(destination) = &self.destination {
            config.backup.destination = Some(destination.clone());
        }
        config.backup.mirror |= self.mirror;
        config.backup.follow_symlinks |= self.follow_symlinks;
        config.backup.skip_content_check |= self.skip_content_check;
        if self.quiet {
            config.log.progress = false;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    args.apply_to(&mut config);

    // Initialize logging
    let log_level = utils::logger::level_for(args.verbose, &config.log.level);
    let dispatch = utils::logger::init(&log_level)?;

    tracing::info!("Starting backup-mirror v{}", env!("CARGO_PKG_VERSION"));

    let job = BackupJob::new(config)?.with_dispatch(dispatch);
    tracing::info!(
        "Backing up {} to {}",
        job.roots().source.display(),
        job.roots().destination.display()
    );

    if args.dry_run {
        let planned = job.plan().await?;
        println!("{}", serde_json::to_string_pretty(&planned)?);
        return Ok(());
    }

    // Cancel the apply phase on Ctrl+C
    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received SIGINT (Ctrl+C), stopping after in-flight copies");
            signal_token.cancel();
        }
    });

    let report = job.run(cancel_token).await?;

    if report.cancelled {
        anyhow::bail!("Backup cancelled: {}", report.summary());
    }
    if !report.failed_paths.is_empty() {
        anyhow::bail!(
            "Backup finished with {} failed paths",
            report.failed_paths.len()
        );
    }

    Ok(())
}
