//! Backup Mirror Library
//!
//! Backs up a source directory into a destination directory, copying only
//! new or changed files, optionally preserving symlinks as links and
//! optionally mirroring deletions.

pub mod config;
pub mod executor;
pub mod fs;
pub mod inventory;
pub mod job;
pub mod planner;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{ApplyOptions, ApplyReport, BackupExecutor};
pub use inventory::{EntryKind, Inventory, InventoryEntry};
pub use job::{BackupJob, PlannedBackup};
pub use planner::{BackupPlan, BackupPlanner, PlanOptions};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
