//! Module boundary resolution.
//!
//! Every path the pipeline dereferences is validated against the resolved
//! module root first. Paths that escape the boundary are rejected and logged;
//! they must never be used for inference, even as a fallback.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// The resolved root of the module being planned. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRoot {
    path: PathBuf,
}

impl ModuleRoot {
    /// Resolve a module selector (exact path or relative hint) to a module root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleRootNotFound`] if the selector does not resolve
    /// to an existing directory.
    pub fn resolve(selector: &Path) -> Result<Self> {
        let path = fs::canonicalize(selector).map_err(|_| Error::ModuleRootNotFound {
            path: selector.to_path_buf(),
        })?;
        if !path.is_dir() {
            return Err(Error::ModuleRootNotFound { path });
        }
        Ok(ModuleRoot { path })
    }

    /// The absolute module root path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `candidate` stays inside the module boundary.
    pub fn is_inside(&self, candidate: &Path) -> bool {
        self.contain_quiet(candidate).is_ok()
    }

    /// Resolve `candidate` against the module root and reject it if it
    /// escapes the boundary. Relative paths are joined to the root; `..`
    /// segments are normalized before checking, and existing paths are
    /// canonicalized so symlinks cannot smuggle reads outside the module.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Boundary`] for any path that does not remain a
    /// descendant of the module root. The rejection is also logged.
    pub fn contain(&self, candidate: &Path) -> Result<PathBuf> {
        self.contain_quiet(candidate).map_err(|err| {
            warn!(path = %candidate.display(), root = %self.path.display(), "rejected path outside module boundary");
            err
        })
    }

    /// Same check as [`ModuleRoot::contain`] without the rejection log, for
    /// probes where an out-of-boundary path is an expected outcome.
    pub fn contain_quiet(&self, candidate: &Path) -> Result<PathBuf> {
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.path.join(candidate)
        };
        let normalized = normalize(&joined);
        let effective = if normalized.exists() {
            fs::canonicalize(&normalized)?
        } else {
            normalized.clone()
        };
        if effective.starts_with(&self.path) {
            Ok(normalized)
        } else {
            Err(Error::Boundary {
                path: candidate.to_path_buf(),
                root: self.path.clone(),
            })
        }
    }
}

/// Lexically normalize a path: fold `.` and resolve `..` against parents.
/// Does not touch the filesystem, so missing paths (expected for not-yet-
/// generated outputs) can still be boundary-checked.
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                } else if !matches!(parts.last(), Some(Component::RootDir)) {
                    parts.push(component);
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}
