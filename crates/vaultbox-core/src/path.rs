//! Canonical forms of slash-delimited Vault paths.
//!
//! Two flavors exist, one per family of call sites: request paths sent to
//! the HTTP API keep their case and are percent-encoded segment by segment
//! when the URL is built, while paths derived from imported records (CSV) are
//! slugged to lowercase with underscores. The normalizers are pure and
//! idempotent; [`encode_request_path`] is applied exactly once per URL.

/// Collapse runs of `/` into a single separator.
pub fn collapse_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Normalize a path used to build an API request URL.
///
/// Trims surrounding whitespace and collapses doubled separators. Case and
/// inner spaces are preserved; see [`encode_request_path`].
pub fn normalize_request_path(path: &str) -> String {
    collapse_separators(path.trim())
}

fn percent_encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Normalize `path` and percent-encode each segment for use in a URL.
///
/// Separators are kept; spaces become `%20`, and `#`, `?` and `%` are
/// escaped so a secret name can never turn into a fragment or query.
pub fn encode_request_path(path: &str) -> String {
    normalize_request_path(path)
        .split('/')
        .map(percent_encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a path derived from an imported record.
///
/// Trims surrounding whitespace, replaces inner spaces with `_`, lowercases
/// and collapses doubled separators.
pub fn normalize_import_path(path: &str) -> String {
    collapse_separators(&path.trim().replace(' ', "_").to_lowercase())
}

/// Join a child name returned by a LIST call onto its parent path.
///
/// Leading separators on the parent are dropped so that listing the engine
/// root yields bare child names.
pub fn join(parent: &str, child: &str) -> String {
    let parent = parent.trim_start_matches('/');
    if parent.is_empty() {
        collapse_separators(child.trim_start_matches('/'))
    } else {
        collapse_separators(&format!("{parent}/{child}"))
    }
}

/// Returns `true` when the path names a listable directory node.
pub fn is_directory(path: &str) -> bool {
    path.ends_with('/')
}

/// Nesting depth of a tree entry: its separator count, plus one for leaves.
pub fn depth(path: &str) -> usize {
    let slashes = path.matches('/').count();
    if is_directory(path) {
        slashes
    } else {
        slashes + 1
    }
}
