//! Content fingerprints used to tell same-size files apart.
//!
//! Files are streamed through a BLAKE3 hasher, so memory use does not depend
//! on file size.

use crate::utils::{BackupError, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Digest of a file's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; blake3::OUT_LEN]);

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Compute the fingerprint of the file at `path`
///
/// # Returns
/// * `Ok(Fingerprint)` - Digest of the full file content
/// * `Err(BackupError::ContentRead)` - If the file cannot be opened or read
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let content_error = |source| BackupError::ContentRead {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::open(path).map_err(content_error)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(&mut file).map_err(content_error)?;

    Ok(hasher.finalize().into())
}

/// Outcome of comparing two files by content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMatch {
    Same,
    Different,
    /// At least one side could not be read
    Unknown,
}

impl ContentMatch {
    /// Unknown comparisons are copied so real changes are never skipped.
    pub fn needs_copy(self) -> bool {
        !matches!(self, ContentMatch::Same)
    }
}

/// Compares files by fingerprint
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentComparator;

impl ContentComparator {
    pub fn new() -> Self {
        Self
    }

    pub fn same_content(&self, source: &Path, destination: &Path) -> ContentMatch {
        let source_digest = fingerprint(source);
        let destination_digest = fingerprint(destination);

        match (source_digest, destination_digest) {
            (Ok(a), Ok(b)) if a == b => ContentMatch::Same,
            (Ok(a), Ok(b)) => {
                debug!(
                    "Fingerprint mismatch for {}: {} != {}",
                    source.display(),
                    a,
                    b
                );
                ContentMatch::Different
            }
            (source_digest, destination_digest) => {
                for err in [source_digest.err(), destination_digest.err()]
                    .into_iter()
                    .flatten()
                {
                    warn!("Could not fingerprint file, assuming it changed: {}", err);
                }
                ContentMatch::Unknown
            }
        }
    }
}
