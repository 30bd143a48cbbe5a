//! Backup planning - decides what to create, copy and link.
//!
//! The source inventory is split into contiguous shares, one per worker. Each
//! worker classifies its share against the destination inventory into a
//! private partial plan and sends it back over a bounded channel; partial
//! plans are merged in the order workers finish. Inventories are read-only
//! and every worker owns its input range and its output, so no locking is
//! needed.
//!
//! Per-entry failures (unreadable files or links) never fail the plan: an
//! unreadable file is scheduled for copy, an unreadable source link is skipped.

pub mod symlink;

use crate::fs::walker::read_link_target;
use crate::inventory::{EntryKind, Inventory, InventoryEntry};
use crate::sync::fingerprint::ContentComparator;
use crate::transfer::progress::{PhaseProgress, PhaseUnit, ProgressReporter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Dispatch};

pub use symlink::{normalize_link_target, rewrite_link_target, same_link_target, LinkTarget};

/// Number of source entries handled by one worker
pub const DEFAULT_ENTRIES_PER_WORKER: usize = 100;

/// Planner configuration
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Treat same-size files as unchanged without hashing them
    pub skip_content_check: bool,

    /// Share size used to derive the worker count
    pub entries_per_worker: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            skip_content_check: false,
            entries_per_worker: DEFAULT_ENTRIES_PER_WORKER,
        }
    }
}

/// Work derived from comparing a source and a destination inventory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPlan {
    /// Directories present in the source but not in the destination
    pub directories_to_create: Vec<PathBuf>,

    /// Regular files that are new or changed
    pub files_to_copy: Vec<PathBuf>,

    /// Symlinks to (re)create, mapped to the target they should point at
    pub symlinks_to_materialize: BTreeMap<PathBuf, PathBuf>,
}

impl BackupPlan {
    pub fn is_empty(&self) -> bool {
        self.directories_to_create.is_empty()
            && self.files_to_copy.is_empty()
            && self.symlinks_to_materialize.is_empty()
    }

    /// Total number of actions in the plan
    pub fn action_count(&self) -> usize {
        self.directories_to_create.len()
            + self.files_to_copy.len()
            + self.symlinks_to_materialize.len()
    }

    /// Append another (partial) plan, preserving its internal order
    pub fn merge(&mut self, other: BackupPlan) {
        self.directories_to_create.extend(other.directories_to_create);
        self.files_to_copy.extend(other.files_to_copy);
        self.symlinks_to_materialize.extend(other.symlinks_to_materialize);
    }
}

/// One worker per `entries_per_worker` entries, never fewer than one
pub fn worker_count(entries: usize, entries_per_worker: usize) -> usize {
    entries.div_ceil(entries_per_worker.max(1)).max(1)
}

/// Split `0..len` into `workers` disjoint contiguous ranges of near-equal size
pub fn share_ranges(len: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let base = len / workers;
    let extra = len % workers;

    let mut start = 0;
    (0..workers)
        .map(|worker| {
            let size = base + usize::from(worker < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// Destination paths with no source counterpart, parents before children
pub fn stale_paths(source: &Inventory, destination: &Inventory) -> Vec<PathBuf> {
    destination
        .iter()
        .filter(|entry| !source.contains(&entry.relative_path))
        .map(|entry| entry.relative_path.clone())
        .collect()
}

/// Computes backup plans using a pool of blocking workers
#[derive(Debug, Clone)]
pub struct BackupPlanner {
    options: PlanOptions,
    dispatch: Dispatch,
    progress: ProgressReporter,
}

impl BackupPlanner {
    /// Create a planner logging through the dispatcher current at construction
    pub fn new(options: PlanOptions) -> Self {
        Self {
            options,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
            progress: ProgressReporter::hidden(),
        }
    }

    /// Log through an explicit dispatcher, including from worker threads
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    /// Compare `source` against `destination` and produce the plan.
    ///
    /// Element order across workers follows worker completion and is not
    /// deterministic; membership is.
    pub async fn plan(&self, source: Arc<Inventory>, destination: Arc<Inventory>) -> BackupPlan {
        let progress = self
            .progress
            .phase("Planning", source.len() as u64, PhaseUnit::Entries);
        let plan = self.plan_with_progress(source, destination, &progress).await;
        progress.finish();
        plan
    }

    /// Like [`plan`](Self::plan), advancing `progress` once per source entry
    pub async fn plan_with_progress(
        &self,
        source: Arc<Inventory>,
        destination: Arc<Inventory>,
        progress: &PhaseProgress,
    ) -> BackupPlan {
        let workers = worker_count(source.len(), self.options.entries_per_worker);

        tracing::dispatcher::with_default(&self.dispatch, || {
            info!(
                "Planning backup of {} entries against {} existing entries with {} workers",
                source.len(),
                destination.len(),
                workers
            );
        });

        // Each worker sends exactly one partial plan, so sends never block
        let (tx, mut rx) = mpsc::channel::<BackupPlan>(workers);
        let mut handles = Vec::with_capacity(workers);

        for (worker, range) in share_ranges(source.len(), workers).into_iter().enumerate() {
            let tx = tx.clone();
            let share = Share {
                source: Arc::clone(&source),
                destination: Arc::clone(&destination),
                range,
                skip_content_check: self.options.skip_content_check,
                comparator: ContentComparator::new(),
                progress: progress.clone(),
            };
            let dispatch = self.dispatch.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let partial = tracing::dispatcher::with_default(&dispatch, || share.classify());
                if tx.blocking_send(partial).is_err() {
                    tracing::dispatcher::with_default(&dispatch, || {
                        warn!("Planner worker {} finished after collection closed", worker);
                    });
                }
            }));
        }
        drop(tx);

        let mut plan = BackupPlan::default();
        while let Some(partial) = rx.recv().await {
            plan.merge(partial);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::dispatcher::with_default(&self.dispatch, || {
                    error!("Planner worker failed, its share was not planned: {}", e);
                });
            }
        }

        tracing::dispatcher::with_default(&self.dispatch, || {
            info!(
                "Backup plan: {} directories to create, {} files to copy, {} symlinks to materialize",
                plan.directories_to_create.len(),
                plan.files_to_copy.len(),
                plan.symlinks_to_materialize.len()
            );
        });

        plan
    }
}

/// A worker's slice of the source inventory
struct Share {
    source: Arc<Inventory>,
    destination: Arc<Inventory>,
    range: Range<usize>,
    skip_content_check: bool,
    comparator: ContentComparator,
    progress: PhaseProgress,
}

impl Share {
    fn classify(&self) -> BackupPlan {
        let mut plan = BackupPlan::default();

        for entry in &self.source.entries()[self.range.clone()] {
            match self.destination.get(&entry.relative_path) {
                None => self.classify_missing(entry, &mut plan),
                Some(existing) => self.classify_existing(entry, existing, &mut plan),
            }
            self.progress.inc(1);
        }

        plan
    }

    fn classify_missing(&self, entry: &InventoryEntry, plan: &mut BackupPlan) {
        let path = &entry.relative_path;

        match entry.kind {
            EntryKind::Directory => {
                debug!(
                    "Marking {} for creation as directory does not exist at backup location",
                    path.display()
                );
                plan.directories_to_create.push(path.clone());
            }
            EntryKind::File => {
                debug!(
                    "Marking {} for backup as file does not exist at backup location",
                    path.display()
                );
                plan.files_to_copy.push(path.clone());
            }
            EntryKind::Symlink => {
                if let Some(target) = self.source_link_target(path) {
                    debug!("Marking symlink at {} for backup", path.display());
                    plan.symlinks_to_materialize
                        .insert(path.clone(), self.rewrite(&target));
                }
            }
        }
    }

    // Branches on the source kind only; a kind change at the destination is
    // handled by whichever branch the source entry selects.
    fn classify_existing(
        &self,
        entry: &InventoryEntry,
        existing: &InventoryEntry,
        plan: &mut BackupPlan,
    ) {
        let path = &entry.relative_path;

        match entry.kind {
            EntryKind::Directory => {
                debug!(
                    "Skipping {} as directory already exists at backup location",
                    path.display()
                );
            }
            EntryKind::Symlink => {
                let Some(source_target) = self.source_link_target(path) else {
                    return;
                };

                let unchanged = read_link_target(&self.destination.root().join(path))
                    .map(|destination_target| {
                        same_link_target(
                            &source_target,
                            self.source.root(),
                            &destination_target,
                            self.destination.root(),
                        )
                    })
                    .unwrap_or(false);

                if unchanged {
                    debug!(
                        "Skipping symlink {} as its target has not changed",
                        path.display()
                    );
                } else {
                    debug!("Marking symlink at {} for backup", path.display());
                    plan.symlinks_to_materialize
                        .insert(path.clone(), self.rewrite(&source_target));
                }
            }
            EntryKind::File => {
                if entry.size != existing.size {
                    debug!(
                        "Marking {} for backup as file size is different to file at backup location",
                        path.display()
                    );
                    plan.files_to_copy.push(path.clone());
                } else if self.skip_content_check {
                    debug!(
                        "Skipping {} as the file size has not changed and content check is disabled",
                        path.display()
                    );
                } else {
                    let result = self.comparator.same_content(
                        &self.source.root().join(path),
                        &self.destination.root().join(path),
                    );

                    if result.needs_copy() {
                        debug!(
                            "Marking {} for backup as file content is different to file at backup location",
                            path.display()
                        );
                        plan.files_to_copy.push(path.clone());
                    } else {
                        debug!("Skipping {} as the file has not changed", path.display());
                    }
                }
            }
        }
    }

    fn source_link_target(&self, path: &Path) -> Option<PathBuf> {
        match read_link_target(&self.source.root().join(path)) {
            Ok(target) => Some(target),
            Err(e) => {
                warn!("Skipping symlink: {}", e);
                None
            }
        }
    }

    fn rewrite(&self, target: &Path) -> PathBuf {
        rewrite_link_target(target, self.source.root(), self.destination.root())
    }
}
