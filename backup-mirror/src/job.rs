//! A backup run: scan both trees, plan, then apply.

use crate::config::{Config, Roots};
use crate::executor::{ApplyReport, BackupExecutor};
use crate::fs::walker::{scan_both, spawn_scan};
use crate::inventory::Inventory;
use crate::planner::{stale_paths, BackupPlan, BackupPlanner};
use crate::transfer::progress::ProgressReporter;
use crate::utils::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Dispatch};

/// Plan computed for a run, before anything is written
#[derive(Debug, Clone, Serialize)]
pub struct PlannedBackup {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub plan: BackupPlan,
    /// Destination paths deleted in mirror mode (empty otherwise)
    pub stale: Vec<PathBuf>,
}

/// Backup job configuration
#[derive(Debug, Clone)]
pub struct BackupJob {
    config: Config,
    roots: Roots,
    dispatch: Dispatch,
}

impl BackupJob {
    /// Validate `config` and prepare a job logging through the current dispatcher
    pub fn new(config: Config) -> Result<Self> {
        let roots = config.validate()?;
        Ok(Self {
            config,
            roots,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        })
    }

    /// Hand an explicit dispatcher to the planner and its workers
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    fn progress(&self) -> ProgressReporter {
        ProgressReporter::new(self.config.log.progress)
    }

    /// Scan both trees and compute the plan without touching the destination.
    ///
    /// A destination that does not exist yet is treated as empty.
    pub async fn plan(&self) -> Result<PlannedBackup> {
        let Roots {
            source,
            destination,
        } = &self.roots;

        let (source_inventory, destination_inventory) = if destination.exists() {
            scan_both(
                source,
                destination,
                &self.config.source_scan_options(),
                &self.config.destination_scan_options(),
            )
            .await?
        } else {
            info!(
                "Destination {} does not exist yet, treating it as empty",
                destination.display()
            );
            let source_inventory =
                spawn_scan(source.clone(), self.config.source_scan_options()).await?;
            (source_inventory, Inventory::new(destination, Vec::new()))
        };

        let source_inventory = Arc::new(source_inventory);
        let destination_inventory = Arc::new(destination_inventory);

        let stale = if self.config.backup.mirror {
            stale_paths(&source_inventory, &destination_inventory)
        } else {
            Vec::new()
        };

        let planner = BackupPlanner::new(self.config.plan_options())
            .with_dispatch(self.dispatch.clone())
            .with_progress(self.progress());
        let plan = planner
            .plan(source_inventory, destination_inventory)
            .await;

        Ok(PlannedBackup {
            source: source.clone(),
            destination: destination.clone(),
            plan,
            stale,
        })
    }

    /// Plan and apply, creating the destination root if needed
    pub async fn run(&self, cancel_token: CancellationToken) -> Result<ApplyReport> {
        tokio::fs::create_dir_all(&self.roots.destination).await?;

        let planned = self.plan().await?;

        let executor = BackupExecutor::new(
            &self.roots.source,
            &self.roots.destination,
            self.config.apply_options(),
        )
        .with_cancel(cancel_token)
        .with_progress(self.progress());

        Ok(executor.apply(&planned.plan, &planned.stale).await)
    }
}
