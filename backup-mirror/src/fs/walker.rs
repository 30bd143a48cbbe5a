//! Directory traversal producing an [`Inventory`].
//!
//! Symlinks are recorded as links and not followed unless
//! [`ScanOptions::follow_links`] is set. Any error while walking is fatal for
//! the run: a partial inventory would make mirror mode delete real data.

use crate::inventory::{EntryKind, Inventory, InventoryEntry};
use crate::transfer::progress::format_bytes;
use crate::utils::{BackupError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Follow symbolic links instead of recording them as links
    pub follow_links: bool,

    /// Skip entries whose file name contains any of these patterns
    pub exclude_patterns: Vec<String>,
}

impl InventoryEntry {
    fn from_entry(entry: &DirEntry, root: &Path) -> walkdir::Result<Self> {
        let relative_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();

        let file_type = entry.file_type();
        let (kind, size) = if file_type.is_symlink() {
            (EntryKind::Symlink, 0)
        } else if file_type.is_dir() {
            (EntryKind::Directory, 0)
        } else {
            (EntryKind::File, entry.metadata()?.len())
        };

        Ok(Self {
            relative_path,
            kind,
            size,
        })
    }
}

/// Walk a directory tree and collect every node below `root`
///
/// # Arguments
/// * `root` - Root directory to start walking from
/// * `options` - Walking options
///
/// # Returns
/// * `Ok(Inventory)` - One entry per file, directory and symlink
/// * `Err(BackupError::Scan)` - If any part of the tree cannot be read
pub fn scan_tree(root: &Path, options: &ScanOptions) -> Result<Inventory> {
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(options.follow_links)
        .into_iter()
        .filter_entry(|entry| !should_exclude(entry, &options.exclude_patterns));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if options.follow_links && is_dangling_link(&e) => {
                warn!("Skipping dangling symlink: {}", e);
                continue;
            }
            Err(e) => {
                return Err(BackupError::Scan {
                    root: root.to_path_buf(),
                    source: e,
                })
            }
        };

        let inventory_entry =
            InventoryEntry::from_entry(&entry, root).map_err(|e| BackupError::Scan {
                root: root.to_path_buf(),
                source: e,
            })?;

        debug!(
            "Scanned {:?} {}",
            inventory_entry.kind,
            inventory_entry.relative_path.display()
        );
        entries.push(inventory_entry);
    }

    let inventory = Inventory::new(root, entries);
    info!(
        "Scanned {}: {} entries, {}",
        root.display(),
        inventory.len(),
        format_bytes(inventory.total_size())
    );

    Ok(inventory)
}

/// Scan source and destination concurrently
///
/// Both walks run on blocking tasks; planning can only start once both
/// complete, so it never observes a partially built inventory.
pub async fn scan_both(
    source: &Path,
    destination: &Path,
    source_options: &ScanOptions,
    destination_options: &ScanOptions,
) -> Result<(Inventory, Inventory)> {
    let source_task = spawn_scan(source.to_path_buf(), source_options.clone());
    let destination_task = spawn_scan(destination.to_path_buf(), destination_options.clone());

    let (source_inventory, destination_inventory) = tokio::join!(source_task, destination_task);

    Ok((source_inventory?, destination_inventory?))
}

/// Run [`scan_tree`] on a blocking task
pub(crate) async fn spawn_scan(root: PathBuf, options: ScanOptions) -> Result<Inventory> {
    tokio::task::spawn_blocking(move || scan_tree(&root, &options))
        .await
        .map_err(|e| BackupError::Io(std::io::Error::other(e)))?
}

/// Read the raw target of a symbolic link
pub fn read_link_target(path: &Path) -> Result<PathBuf> {
    std::fs::read_link(path).map_err(|e| BackupError::LinkResolution {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();

    patterns
        .iter()
        .any(|pattern| !pattern.is_empty() && file_name.contains(pattern.as_str()))
}

/// A followed link whose target no longer exists
fn is_dangling_link(error: &walkdir::Error) -> bool {
    let not_found = error
        .io_error()
        .map(|e| e.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false);

    not_found
        && error
            .path()
            .and_then(|path| std::fs::symlink_metadata(path).ok())
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_empty_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let inventory = scan_tree(temp_dir.path(), &ScanOptions::default())?;
        assert!(inventory.is_empty());
        assert_eq!(inventory.root(), temp_dir.path());
        Ok(())
    }

    #[test]
    fn test_scan_records_files_and_directories() -> Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content22")?;

        let inventory = scan_tree(temp_dir.path(), &ScanOptions::default())?;
        assert_eq!(inventory.len(), 3);

        let dir = inventory.get(Path::new("subdir")).expect("subdir scanned");
        assert_eq!(dir.kind, EntryKind::Directory);

        let nested = inventory
            .get(Path::new("subdir/file2.txt"))
            .expect("nested file scanned");
        assert_eq!(nested.kind, EntryKind::File);
        assert_eq!(nested.size, 9);

        Ok(())
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let err = scan_tree(&missing, &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, BackupError::Scan { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_exclude_patterns_skip_subtree() -> Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("file.txt"), b"keep")?;
        fs::create_dir(temp_dir.path().join(".git"))?;
        fs::write(temp_dir.path().join(".git/HEAD"), b"ref")?;

        let options = ScanOptions {
            exclude_patterns: vec![".git".to_string()],
            ..ScanOptions::default()
        };
        let inventory = scan_tree(temp_dir.path(), &options)?;
        assert_eq!(inventory.len(), 1);
        assert!(inventory.contains(Path::new("file.txt")));

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed_by_default() -> Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("target.txt"), b"12345")?;
        std::os::unix::fs::symlink(
            temp_dir.path().join("target.txt"),
            temp_dir.path().join("link"),
        )?;

        let inventory = scan_tree(temp_dir.path(), &ScanOptions::default())?;
        let link = inventory.get(Path::new("link")).expect("link scanned");
        assert_eq!(link.kind, EntryKind::Symlink);

        let target = read_link_target(&temp_dir.path().join("link"))?;
        assert_eq!(target, temp_dir.path().join("target.txt"));

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_follow_links_records_target_kind() -> Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("target.txt"), b"12345")?;
        std::os::unix::fs::symlink(
            temp_dir.path().join("target.txt"),
            temp_dir.path().join("link"),
        )?;
        std::os::unix::fs::symlink(
            temp_dir.path().join("nowhere"),
            temp_dir.path().join("dangling"),
        )?;

        let options = ScanOptions {
            follow_links: true,
            ..ScanOptions::default()
        };
        let inventory = scan_tree(temp_dir.path(), &options)?;

        let link = inventory.get(Path::new("link")).expect("link scanned");
        assert_eq!(link.kind, EntryKind::File);
        assert_eq!(link.size, 5);
        assert!(!inventory.contains(Path::new("dangling")));

        Ok(())
    }

    #[test]
    fn test_read_link_target_on_regular_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.txt");
        fs::write(&path, b"x").unwrap();

        let err = read_link_target(&path).unwrap_err();
        assert!(matches!(err, BackupError::LinkResolution { .. }));
    }

    #[tokio::test]
    async fn test_scan_both() -> Result<()> {
        let source = TempDir::new()?;
        let destination = TempDir::new()?;
        fs::write(source.path().join("a.txt"), b"a")?;

        let options = ScanOptions::default();
        let (src, dst) = scan_both(source.path(), destination.path(), &options, &options).await?;
        assert_eq!(src.len(), 1);
        assert!(dst.is_empty());

        Ok(())
    }
}
