//! Path helpers shared by the location adapters.
//!
//! Archive entries and downloaded script names come from untrusted input, so
//! every relative path is joined through [`safe_join`], which rejects absolute
//! paths and `..` traversal before touching the filesystem.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors raised when a relative path would escape its root directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path contains ".." traversal components
    #[error("Path contains parent directory traversal: {path}")]
    ParentTraversal { path: String },

    /// Path is absolute (or carries a drive/UNC prefix)
    #[error("Absolute path not allowed: {path}")]
    AbsolutePath { path: String },

    /// Path is empty after normalization
    #[error("Empty path not allowed")]
    Empty,
}

/// Join `rel` under `root`, refusing anything that could leave `root`.
///
/// # Errors
///
/// Returns an error if `rel` is absolute, has a prefix/root component, contains
/// `..`, or normalizes to nothing.
pub fn safe_join(root: &Path, rel: impl AsRef<Path>) -> Result<PathBuf, PathError> {
    let rel_path = rel.as_ref();
    let display = rel_path.display().to_string();

    let mut joined = root.to_path_buf();
    let mut pushed = false;
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(PathError::ParentTraversal { path: display }),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::AbsolutePath { path: display });
            }
        }
    }

    if pushed {
        Ok(joined)
    } else {
        Err(PathError::Empty)
    }
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// Canonicalize without the `\\?\` verbatim prefix on Windows.
pub fn canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    #[cfg(windows)]
    {
        dunce::canonicalize(path)
    }
    #[cfg(not(windows))]
    {
        path.canonicalize()
    }
}

/// File name without its last extension (`foo.tar.gz` -> `foo.tar`).
///
/// Works on `/` and `\` separated names alike, since archive entry names use
/// `/` regardless of platform.
#[must_use]
pub fn base_name(name: &str) -> &str {
    let trimmed = name.trim_end_matches(['/', '\\']);
    let file = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    match file.rfind('.') {
        Some(0) | None => file,
        Some(idx) => &file[..idx],
    }
}

/// Last extension of a file name, without the dot, or `""`.
#[must_use]
pub fn extension(name: &str) -> &str {
    let trimmed = name.trim_end_matches(['/', '\\']);
    let file = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    match file.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &file[idx + 1..],
    }
}
