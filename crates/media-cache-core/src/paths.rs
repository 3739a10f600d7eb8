//! Whole-segment path prefix matching.
//!
//! `/DCIM/100` covers `/DCIM/100/a.jpg` but not `/DCIM/1000/a.jpg`. The SQL
//! form is a range scan over the indexed path column: every key strictly
//! under `dir` sorts in `[dir + "/", dir + "0")` because `'0'` is the byte
//! after `'/'`.

/// Strip trailing separators; the filesystem root becomes the empty string.
pub fn normalize_dir(dir: &str) -> String {
    dir.trim_end_matches('/').to_string()
}

/// True when `path` is `dir` itself or lies anywhere beneath it.
pub fn is_under(path: &str, dir: &str) -> bool {
    let dir = normalize_dir(dir);
    if path == dir {
        return true;
    }
    path.len() > dir.len() && path.starts_with(dir.as_str()) && path.as_bytes()[dir.len()] == b'/'
}

/// SQL condition matching `column` against the normalized directory bound at `?{param}`.
pub(crate) fn prefix_match(column: &str, param: usize) -> String {
    format!(
        "({c} = ?{p} OR ({c} >= ?{p} || '/' AND {c} < ?{p} || '0'))",
        c = column,
        p = param
    )
}

/// Rewrite `path` from under `from` to under `to`. Returns `None` when `path`
/// is not under `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_under(path, from) {
        return None;
    }
    let from = normalize_dir(from);
    Some(format!("{}{}", normalize_dir(to), &path[from.len()..]))
}

pub fn parent_of(path: &str) -> Option<String> {
    path.rsplit_once('/').map(|(parent, _)| {
        if parent.is_empty() {
            "/".to_string()
        } else {
            parent.to_string()
        }
    })
}
