//! Filesystem scanning.

pub mod walker;

pub use walker::{read_link_target, scan_both, scan_tree, ScanOptions};
