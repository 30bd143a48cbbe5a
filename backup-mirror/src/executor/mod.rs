//! Backup plan executor - applies a [`BackupPlan`] to the destination tree.
//!
//! Phases run in order: create directories, copy files, materialize symlinks
//! and, in mirror mode, delete stale destination paths. A failure on one path
//! is logged and counted; the rest of the plan still runs.

use crate::planner::BackupPlan;
use crate::transfer::progress::{
    format_bytes, format_duration, format_speed, PhaseProgress, PhaseUnit, ProgressReporter,
};
use crate::utils::BackupError;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default number of permits shared by concurrent copies
pub const CONCURRENCY_BUDGET: usize = 64;

const MIB: u64 = 1024 * 1024;

/// Permits a copy of `file_size` bytes takes out of `budget`.
///
/// Small files take a single permit. Larger files take a growing share of the
/// budget, and files over 1 GiB take all of it and copy alone.
fn copy_weight(file_size: u64, budget: u32) -> u32 {
    let share = match file_size {
        size if size < 10 * MIB => return 1,
        size if size < 100 * MIB => budget / 32,
        size if size < 500 * MIB => budget / 4,
        size if size < 1024 * MIB => budget / 2,
        _ => budget,
    };
    share.clamp(1, budget.max(1))
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Delete destination paths that no longer exist in the source
    pub mirror: bool,

    /// Total permits shared by concurrent copies
    pub copy_budget: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            mirror: false,
            copy_budget: CONCURRENCY_BUDGET,
        }
    }
}

/// Outcome of applying a plan
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub directories_created: usize,
    pub files_copied: usize,
    pub bytes_copied: u64,
    pub symlinks_created: usize,
    pub paths_deleted: usize,
    /// Destination paths whose action failed
    pub failed_paths: Vec<PathBuf>,
    pub cancelled: bool,
    pub duration: Duration,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed_paths.is_empty() && !self.cancelled
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} directories created, {} files copied ({}, {}), {} symlinks created, {} deleted, {} failed in {}{}",
            self.directories_created,
            self.files_copied,
            format_bytes(self.bytes_copied),
            format_speed(self.bytes_copied, self.duration),
            self.symlinks_created,
            self.paths_deleted,
            self.failed_paths.len(),
            format_duration(self.duration),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }

    fn record_failure(&mut self, err: BackupError) {
        error!("{}", err);
        if let BackupError::Apply { path, .. } = err {
            self.failed_paths.push(path);
        }
    }
}

enum CopyOutcome {
    Copied(u64),
    Failed(BackupError),
    Cancelled,
}

/// Applies plans from one source root to one destination root
pub struct BackupExecutor {
    source_root: PathBuf,
    destination_root: PathBuf,
    options: ApplyOptions,
    cancel_token: CancellationToken,
    progress: ProgressReporter,
}

impl BackupExecutor {
    /// Create a new executor (no cancellation support)
    pub fn new(
        source_root: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
        options: ApplyOptions,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            options,
            cancel_token: CancellationToken::new(),
            progress: ProgressReporter::hidden(),
        }
    }

    /// Stop scheduling new work once `cancel_token` is cancelled
    pub fn with_cancel(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Apply `plan`, then delete `stale` destination paths if mirroring
    pub async fn apply(&self, plan: &BackupPlan, stale: &[PathBuf]) -> ApplyReport {
        let start_time = Instant::now();
        let mut report = ApplyReport::default();

        info!(
            "Applying backup plan to {}: {} actions{}",
            self.destination_root.display(),
            plan.action_count(),
            if self.options.mirror {
                format!(", {} stale paths", stale.len())
            } else {
                String::new()
            }
        );

        self.create_directories(&plan.directories_to_create, &mut report)
            .await;

        if !report.cancelled {
            let total = plan.files_to_copy.len() as u64;
            let progress = self.progress.phase("Copying", total, PhaseUnit::Files);
            self.copy_files(&plan.files_to_copy, &mut report, &progress).await;
            progress.finish();
        }

        if !report.cancelled {
            for (relative_path, target) in &plan.symlinks_to_materialize {
                if self.cancel_token.is_cancelled() {
                    report.cancelled = true;
                    break;
                }

                let link = self.destination_root.join(relative_path);
                match materialize_symlink(target, &link).await {
                    Ok(()) => {
                        debug!("Linked {} -> {}", link.display(), target.display());
                        report.symlinks_created += 1;
                    }
                    Err(e) => report.record_failure(apply_error("symlink", link, e)),
                }
            }
        }

        if !report.cancelled && self.options.mirror {
            self.delete_stale(stale, &mut report).await;
        }

        report.duration = start_time.elapsed();
        info!("Backup applied: {}", report.summary());

        report
    }

    async fn create_directories(&self, directories: &[PathBuf], report: &mut ApplyReport) {
        // Parents before children
        let mut ordered: Vec<&PathBuf> = directories.iter().collect();
        ordered.sort_by_key(|path| (path.components().count(), path.as_path()));

        for relative_path in ordered {
            if self.cancel_token.is_cancelled() {
                report.cancelled = true;
                return;
            }

            let path = self.destination_root.join(relative_path);
            match fs::create_dir_all(&path).await {
                Ok(()) => {
                    debug!("Created directory {}", path.display());
                    report.directories_created += 1;
                }
                Err(e) => report.record_failure(apply_error("create directory", path, e)),
            }
        }
    }

    async fn copy_files(
        &self,
        files: &[PathBuf],
        report: &mut ApplyReport,
        progress: &PhaseProgress,
    ) {
        let budget = u32::try_from(self.options.copy_budget.clamp(1, Semaphore::MAX_PERMITS))
            .unwrap_or(u32::MAX);
        let semaphore = Arc::new(Semaphore::new(budget as usize));

        info!(
            "Copying {} files with adaptive concurrency (budget: {})",
            files.len(),
            budget
        );

        let mut handles = Vec::with_capacity(files.len());

        for relative_path in files {
            let sem = Arc::clone(&semaphore);
            let cancel = self.cancel_token.clone();
            let source = self.source_root.join(relative_path);
            let destination = self.destination_root.join(relative_path);
            let progress = progress.clone();

            let handle = tokio::spawn(async move {
                if cancel.is_cancelled() {
                    return CopyOutcome::Cancelled;
                }

                let size = fs::metadata(&source).await.map(|m| m.len()).unwrap_or(0);
                let weight = copy_weight(size, budget);

                let permit = tokio::select! {
                    result = sem.acquire_many(weight) => match result {
                        Ok(permit) => permit,
                        Err(e) => {
                            return CopyOutcome::Failed(apply_error("copy", destination, io::Error::other(e)));
                        }
                    },
                    _ = cancel.cancelled() => return CopyOutcome::Cancelled,
                };

                let result = copy_file(&source, &destination).await;
                drop(permit);

                match result {
                    Ok(bytes) => {
                        debug!("Copied {} bytes: {}", bytes, destination.display());
                        progress.record_copy(bytes);
                        CopyOutcome::Copied(bytes)
                    }
                    Err(e) => {
                        progress.inc(1);
                        CopyOutcome::Failed(apply_error("copy", destination, e))
                    }
                }
            });

            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok(CopyOutcome::Copied(bytes)) => {
                    report.files_copied += 1;
                    report.bytes_copied += bytes;
                }
                Ok(CopyOutcome::Failed(e)) => report.record_failure(e),
                Ok(CopyOutcome::Cancelled) => report.cancelled = true,
                Err(e) => warn!("File copy task panicked: {}", e),
            }
        }
    }

    async fn delete_stale(&self, stale: &[PathBuf], report: &mut ApplyReport) {
        let mut ordered: Vec<&PathBuf> = stale.iter().collect();
        ordered.sort();

        let mut removed_dir: Option<&Path> = None;

        for relative_path in ordered {
            if self.cancel_token.is_cancelled() {
                report.cancelled = true;
                return;
            }

            // Already gone with its parent
            if removed_dir.is_some_and(|dir| relative_path.starts_with(dir)) {
                continue;
            }

            let path = self.destination_root.join(relative_path);
            let (is_dir, result) = match fs::symlink_metadata(&path).await {
                Ok(meta) if meta.is_dir() => (true, fs::remove_dir_all(&path).await),
                Ok(_) => (false, fs::remove_file(&path).await),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Stale path already removed: {}", path.display());
                    continue;
                }
                Err(e) => (false, Err(e)),
            };

            match result {
                Ok(()) => {
                    debug!("Deleted {}", path.display());
                    report.paths_deleted += 1;
                    if is_dir {
                        removed_dir = Some(relative_path.as_path());
                    }
                }
                // Children of a directory that could not be removed are still tried
                Err(e) => report.record_failure(apply_error("delete", path, e)),
            }
        }
    }
}

fn apply_error(action: &'static str, path: PathBuf, source: io::Error) -> BackupError {
    BackupError::Apply {
        action,
        path,
        source,
    }
}

/// Copy `source` over `destination` and flush it to disk
async fn copy_file(source: &Path, destination: &Path) -> io::Result<u64> {
    // Replace a link at the destination instead of writing through it
    if let Ok(meta) = fs::symlink_metadata(destination).await {
        if meta.file_type().is_symlink() {
            fs::remove_file(destination).await?;
        }
    }

    let mut reader = fs::File::open(source).await?;
    let mut writer = fs::File::create(destination).await?;
    let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.sync_all().await?;

    Ok(bytes)
}

/// Create `link` pointing at `target`, replacing any non-directory already there
async fn materialize_symlink(target: &Path, link: &Path) -> io::Result<()> {
    match fs::symlink_metadata(link).await {
        Ok(meta) if meta.is_dir() => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a directory exists at the link path",
            ));
        }
        Ok(_) => fs::remove_file(link).await?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    create_symlink(target, link).await
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    if fs::metadata(target).await.map(|m| m.is_dir()).unwrap_or(false) {
        fs::symlink_dir(target, link).await
    } else {
        fs::symlink_file(target, link).await
    }
}
