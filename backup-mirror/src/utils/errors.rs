//! Error types for the backup pipeline.
//!
//! Only [`BackupError::Scan`] and [`BackupError::Config`] abort a run. The
//! remaining variants describe per-path problems that the planner and the
//! executor log and recover from.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to scan {}: {source}", root.display())]
    Scan {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read content of {}: {source}", path.display())]
    ContentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read symlink {}: {source}", path.display())]
    LinkResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to apply {action} for {}: {source}", path.display())]
    Apply {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl BackupError {
    /// Whether this error ends the whole run rather than a single path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackupError::Scan { .. } | BackupError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_recovered_errors_are_not_fatal() {
        let err = BackupError::ContentRead {
            path: PathBuf::from("a.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_fatal());

        let err = BackupError::LinkResolution {
            path: PathBuf::from("link"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_config_error_is_fatal() {
        let err = BackupError::Config("source is required".to_string());
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Configuration error: source is required");
    }

    #[test]
    fn test_apply_error_message() {
        let err = BackupError::Apply {
            action: "copy",
            path: PathBuf::from("/dst/file.txt"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert_eq!(err.to_string(), "Failed to apply copy for /dst/file.txt: disk full");
    }
}
