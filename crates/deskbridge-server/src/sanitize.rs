//! Filename sanitization shared by the upload and download paths.
//!
//! Only the final component of a client-supplied name is kept, so a name like
//! `../../etc/passwd` lands as `passwd` inside the target directory instead of
//! being rejected. Names that cannot produce a direct child of the directory
//! fail with a [`SanitizeError`].

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("base directory must be absolute: {}", .0.display())]
    RelativeBase(PathBuf),
    #[error("invalid filename")]
    InvalidName,
    #[error("path escapes base directory")]
    PathEscape,
}

/// Resolve `raw_name` to a file directly inside `base_dir`.
///
/// Pure path computation; the filesystem is never consulted.
pub fn sanitize(base_dir: &Path, raw_name: &str) -> Result<PathBuf, SanitizeError> {
    if !base_dir.is_absolute() {
        return Err(SanitizeError::RelativeBase(base_dir.to_path_buf()));
    }

    let name = final_component(raw_name);
    if name.is_empty() || name == "." || name.contains('\0') {
        return Err(SanitizeError::InvalidName);
    }

    let base = normalize(base_dir);
    let resolved = normalize(&base.join(name));
    match resolved.strip_prefix(&base) {
        Ok(rest) if is_single_component(rest) => Ok(resolved),
        _ => Err(SanitizeError::PathEscape),
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Last path component of `raw`, ignoring trailing separators.
fn final_component(raw: &str) -> &str {
    let trimmed = raw.trim_end_matches(is_separator);
    match trimmed.rfind(is_separator) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Lexically resolve `.` and `..` segments.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn is_single_component(rest: &Path) -> bool {
    let mut components = rest.components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
