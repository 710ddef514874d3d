//! Slash-separated path helpers
//!
//! Paths handled here are URL-style: `/`-separated regardless of host
//! convention.

/// Lexically clean a path, always returning a rooted result
///
/// Collapses repeated slashes, drops `.` segments and resolves `..`
/// against the preceding segment. `..` never climbs above the root.
/// A trailing slash is dropped except for the root itself.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Whether any `/`- or `\`-separated segment of `path` is exactly `..`
pub fn contains_dot_dot(path: &str) -> bool {
    if !path.contains("..") {
        return false;
    }
    path.split(['/', '\\']).any(|seg| seg == "..")
}

/// Last segment of a cleaned path, `/` for the root
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Join a child name onto a slash-separated directory path
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
