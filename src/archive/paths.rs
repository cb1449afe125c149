use crate::error::{PackError, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize an archive member name to a safe forward-slash relative path.
///
/// Backslashes are treated as separators, `.` and empty segments are
/// dropped, and `..` is resolved in place. Absolute paths, drive-letter
/// prefixes, and any `..` that would climb out of the root are rejected.
pub fn safe_member_relpath(name: &str) -> Result<String> {
    let invalid = || PackError::InvalidPath {
        path: name.to_string(),
    };

    let normalized = name.replace('\\', "/");
    let trimmed = normalized.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') {
        return Err(invalid());
    }

    // reject "C:..." style prefixes regardless of host platform
    let mut chars = trimmed.chars();
    if let (Some(first), Some(':')) = (chars.next(), chars.next()) {
        if first.is_ascii_alphabetic() {
            return Err(invalid());
        }
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(invalid());
                }
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(invalid());
    }

    Ok(segments.join("/"))
}

/// Final path component of a member name, with separators of either kind
/// stripped. Empty when the name has no usable basename.
pub fn safe_basename(name: &str) -> String {
    name.replace('\\', "/")
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Join `subfolder`/`filename` under `base` and verify the result stays
/// inside `base`. Returns the relative member path and the absolute path,
/// or `None` for anything that escapes.
pub fn resolve_under_base(
    base: &Path,
    subfolder: &str,
    filename: &str,
) -> Option<(String, PathBuf)> {
    let mut relative = String::new();
    let subfolder = subfolder.trim().trim_matches('/');
    if !subfolder.is_empty() {
        relative.push_str(subfolder);
        relative.push('/');
    }
    relative.push_str(filename.trim());

    let relative = safe_member_relpath(&relative).ok()?;

    let full = base.join(&relative);
    // the sanitized relative path contains only normal components, but keep
    // the containment check as a second line of defense
    if full
        .components()
        .any(|c| matches!(c, Component::ParentDir))
        || !full.starts_with(base)
    {
        return None;
    }

    Some((relative, full))
}
