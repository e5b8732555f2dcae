//! Workspace containment checks for client file access.
//!
//! Paths arriving in `fs/*` requests may be absolute or relative to the
//! workspace root. They are normalised lexically, then the deepest existing
//! ancestor is canonicalised so a symlink cannot lead outside the root.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

fn outside(path: &Path) -> AppError {
    AppError::PathViolation(format!("{} is outside the workspace", path.display()))
}

/// Resolve `candidate` against `root` and reject anything that escapes it.
///
/// Returns the absolute path to operate on. For an existing file this is
/// its canonical path; for a file about to be created it is the canonical
/// parent joined with the remaining components.
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] if the root cannot be canonicalised,
/// `..` climbs above the root, an absolute candidate lies elsewhere, or a
/// symlink resolves outside the root.
pub fn resolve_in_root(root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("workspace root invalid: {err}")))?;
    let candidate = candidate.as_ref();

    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(outside(candidate));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    if !normalized.starts_with(&root) {
        return Err(outside(candidate));
    }

    // Canonicalise the deepest part that exists and re-attach the rest.
    let mut existing = normalized.as_path();
    let mut pending = Vec::new();
    while !existing.exists() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            return Err(outside(candidate));
        };
        pending.push(name.to_os_string());
        existing = parent;
    }
    let mut resolved = existing
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;
    if !resolved.starts_with(&root) {
        return Err(AppError::PathViolation(format!(
            "{} resolves outside the workspace",
            candidate.display()
        )));
    }
    resolved.extend(pending.into_iter().rev());
    Ok(resolved)
}
