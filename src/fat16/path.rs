//! Slash-separated path helpers.

/// Splits a path into its non-empty components. Leading, trailing and
/// repeated slashes contribute nothing.
pub(crate) fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// A path with zero components denotes the root directory.
pub(crate) fn is_root(path: &str) -> bool {
    path.split('/').all(|s| s.is_empty())
}
