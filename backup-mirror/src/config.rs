//! Configuration management for the backup tool.
//!
//! Loads configuration from a TOML file; command-line flags override it.

use crate::executor::{ApplyOptions, CONCURRENCY_BUDGET};
use crate::fs::walker::ScanOptions;
use crate::planner::{PlanOptions, DEFAULT_ENTRIES_PER_WORKER};
use crate::utils::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory to back up
    pub source: Option<PathBuf>,

    /// Directory the source is backed up into
    pub destination: Option<PathBuf>,

    /// Delete destination entries that no longer exist in the source
    #[serde(default)]
    pub mirror: bool,

    /// Copy what symlinks point at instead of recreating the links
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Treat same-size files as unchanged without hashing them
    #[serde(default)]
    pub skip_content_check: bool,

    /// File name patterns skipped in both trees
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Draw progress bars on stderr while planning and copying
    #[serde(default = "default_progress")]
    pub progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Source entries handled by each planner worker
    #[serde(default = "default_entries_per_worker")]
    pub entries_per_worker: usize,

    /// Permits shared by concurrent file copies
    #[serde(default = "default_copy_budget")]
    pub copy_budget: usize,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress() -> bool {
    true
}

fn default_entries_per_worker() -> usize {
    DEFAULT_ENTRIES_PER_WORKER
}

fn default_copy_budget() -> usize {
    CONCURRENCY_BUDGET
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            progress: default_progress(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            entries_per_worker: default_entries_per_worker(),
            copy_budget: default_copy_budget(),
        }
    }
}

/// Validated source and destination roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roots {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Check the roots and make them absolute
    ///
    /// Symlink targets are compared against the roots by path prefix, so
    /// relative roots are resolved against the current directory first.
    pub fn validate(&self) -> Result<Roots> {
        let source = self
            .backup
            .source
            .as_deref()
            .ok_or_else(|| BackupError::Config("a source directory is required".to_string()))?;
        let destination = self.backup.destination.as_deref().ok_or_else(|| {
            BackupError::Config("a destination directory is required".to_string())
        })?;

        let source = absolutize(source)?;
        let destination = absolutize(destination)?;

        // Overlap is judged on resolved paths so `..` or a linked root cannot hide it
        let source_real = resolve(&source);
        let destination_real = resolve(&destination);

        if source_real == destination_real {
            return Err(BackupError::Config(
                "source and destination must be different directories".to_string(),
            ));
        }

        if destination_real.starts_with(&source_real) {
            return Err(BackupError::Config(format!(
                "destination {} is inside source {}",
                destination.display(),
                source.display()
            )));
        }

        // Mirror mode would see the source as stale and delete it
        if source_real.starts_with(&destination_real) {
            return Err(BackupError::Config(format!(
                "source {} is inside destination {}",
                source.display(),
                destination.display()
            )));
        }

        Ok(Roots {
            source,
            destination,
        })
    }

    pub fn source_scan_options(&self) -> ScanOptions {
        ScanOptions {
            follow_links: self.backup.follow_symlinks,
            exclude_patterns: self.backup.exclude.clone(),
        }
    }

    /// The destination is always scanned without following links
    pub fn destination_scan_options(&self) -> ScanOptions {
        ScanOptions {
            follow_links: false,
            exclude_patterns: self.backup.exclude.clone(),
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            skip_content_check: self.backup.skip_content_check,
            entries_per_worker: self.performance.entries_per_worker,
        }
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            mirror: self.backup.mirror,
            copy_budget: self.performance.copy_budget,
        }
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Resolve links and `..` in the longest existing prefix of an absolute path.
///
/// Components past that prefix do not exist yet, so they are applied lexically.
fn resolve(path: &Path) -> PathBuf {
    let components: Vec<Component<'_>> = path.components().collect();

    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        if let Ok(mut resolved) = std::fs::canonicalize(&prefix) {
            for component in &components[split..] {
                match component {
                    Component::ParentDir => {
                        resolved.pop();
                    }
                    Component::Normal(name) => resolved.push(name),
                    _ => {}
                }
            }
            return resolved;
        }
    }

    path.to_path_buf()
}
