//! Path joining for upstream URLs.

/// Join a base path and a request path with exactly one separating slash.
///
/// One trailing slash is stripped from `base`, and `path` gets a leading
/// slash if it lacks one. Nothing else is normalized: repeated inner
/// slashes and dot segments are kept as they are.
pub fn join_paths(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
