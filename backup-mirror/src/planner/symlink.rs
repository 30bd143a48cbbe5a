//! Symlink target handling across the source and destination trees.

use std::path::{Path, PathBuf};

/// Re-root a link target that points inside `source_root` onto `destination_root`.
///
/// The backed-up link then points at the backed-up copy. Relative targets and
/// absolute targets outside the source tree are returned unchanged. The prefix
/// test is component-wise, so `/src-old/x` is not considered inside `/src`.
pub fn rewrite_link_target(target: &Path, source_root: &Path, destination_root: &Path) -> PathBuf {
    if !target.is_absolute() {
        return target.to_path_buf();
    }

    match target.strip_prefix(source_root) {
        Ok(rest) if rest.as_os_str().is_empty() => destination_root.to_path_buf(),
        Ok(rest) => destination_root.join(rest),
        Err(_) => target.to_path_buf(),
    }
}

/// A link target as seen from the tree the link lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Absolute target under the tree root, kept relative to that root
    WithinTree(PathBuf),
    /// Relative target, or absolute target outside the tree, as written
    Verbatim(PathBuf),
}

/// Classify `target` against the root of the tree its link lives in.
///
/// Only absolute targets can be anchored to the root. A relative target that
/// happens to spell the same path stays distinct.
pub fn normalize_link_target(target: &Path, root: &Path) -> LinkTarget {
    if target.is_absolute() {
        if let Ok(rest) = target.strip_prefix(root) {
            return LinkTarget::WithinTree(rest.to_path_buf());
        }
    }
    LinkTarget::Verbatim(target.to_path_buf())
}

/// Whether a source link and a destination link resolve to the same place within their trees
pub fn same_link_target(
    source_target: &Path,
    source_root: &Path,
    destination_target: &Path,
    destination_root: &Path,
) -> bool {
    normalize_link_target(source_target, source_root)
        == normalize_link_target(destination_target, destination_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_inside_source_root() {
        let rewritten = rewrite_link_target(
            Path::new("/src/target"),
            Path::new("/src"),
            Path::new("/dst"),
        );
        assert_eq!(rewritten, PathBuf::from("/dst/target"));
    }

    #[test]
    fn test_rewrite_keeps_external_target() {
        let rewritten = rewrite_link_target(
            Path::new("/external/target"),
            Path::new("/src"),
            Path::new("/dst"),
        );
        assert_eq!(rewritten, PathBuf::from("/external/target"));
    }

    #[test]
    fn test_rewrite_is_component_wise() {
        let rewritten = rewrite_link_target(
            Path::new("/src-old/target"),
            Path::new("/src"),
            Path::new("/dst"),
        );
        assert_eq!(rewritten, PathBuf::from("/src-old/target"));
    }

    #[test]
    fn test_rewrite_root_itself() {
        let rewritten = rewrite_link_target(Path::new("/src"), Path::new("/src"), Path::new("/dst"));
        assert_eq!(rewritten, PathBuf::from("/dst"));
    }

    #[test]
    fn test_relative_target_unchanged() {
        let rewritten = rewrite_link_target(
            Path::new("../sibling"),
            Path::new("/src"),
            Path::new("/dst"),
        );
        assert_eq!(rewritten, PathBuf::from("../sibling"));
    }

    #[test]
    fn test_same_link_target_after_normalization() {
        assert!(same_link_target(
            Path::new("/src/a/b"),
            Path::new("/src"),
            Path::new("/dst/a/b"),
            Path::new("/dst"),
        ));
        assert!(same_link_target(
            Path::new("/etc/hosts"),
            Path::new("/src"),
            Path::new("/etc/hosts"),
            Path::new("/dst"),
        ));
        assert!(!same_link_target(
            Path::new("/src/a"),
            Path::new("/src"),
            Path::new("/dst/b"),
            Path::new("/dst"),
        ));
    }

    #[test]
    fn test_normalize_anchors_only_absolute_targets() {
        assert_eq!(
            normalize_link_target(Path::new("/src/a"), Path::new("/src")),
            LinkTarget::WithinTree(PathBuf::from("a"))
        );
        assert_eq!(
            normalize_link_target(Path::new("a"), Path::new("/src")),
            LinkTarget::Verbatim(PathBuf::from("a"))
        );
        assert_eq!(
            normalize_link_target(Path::new("/elsewhere/a"), Path::new("/src")),
            LinkTarget::Verbatim(PathBuf::from("/elsewhere/a"))
        );
    }

    #[test]
    fn test_absolute_and_relative_targets_differ() {
        // /src/a and a (which resolves next to the destination link) are different places
        assert!(!same_link_target(
            Path::new("/src/a"),
            Path::new("/src"),
            Path::new("a"),
            Path::new("/dst"),
        ));
        assert!(!same_link_target(
            Path::new("a"),
            Path::new("/src"),
            Path::new("/dst/a"),
            Path::new("/dst"),
        ));
        assert!(same_link_target(
            Path::new("../a"),
            Path::new("/src"),
            Path::new("../a"),
            Path::new("/dst"),
        ));
    }
}
