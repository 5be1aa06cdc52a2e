//! Bundle path and image search path service.
//!
//! The bundle path is the directory scripts resolve relative image references
//! against. It is process-wide state: a local-file run pushes the script's
//! folder, and the push must be undone on every exit path. [`BundleScope`]
//! is the only way runners touch the stack, so a panic or early return still
//! restores the previous bundle.
//!
//! Besides the bundle itself the service keeps the auxiliary image search
//! path (local folders added with [`BundlePaths::add`]) and the HTTP image
//! roots registered while a downloaded script runs.

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::paths::canonicalize;

static GLOBAL: Lazy<Arc<BundlePaths>> = Lazy::new(|| Arc::new(BundlePaths::new()));

/// The process-wide bundle path service.
#[must_use]
pub fn global() -> Arc<BundlePaths> {
    Arc::clone(&GLOBAL)
}

#[derive(Debug, Default)]
struct State {
    current: Option<PathBuf>,
    saved: Vec<Option<PathBuf>>,
    search: Vec<PathBuf>,
    http: Vec<String>,
}

/// Bundle path stack plus image search paths.
#[derive(Debug, Default)]
pub struct BundlePaths {
    state: Mutex<State>,
}

impl BundlePaths {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Current bundle folder, if any.
    #[must_use]
    pub fn bundle_path(&self) -> Option<PathBuf> {
        self.lock().current.clone()
    }

    /// Replace the current bundle folder without touching the stack.
    ///
    /// Returns false (and leaves the bundle unchanged) when `path` is not an
    /// existing directory.
    pub fn set_bundle_path(&self, path: &Path) -> bool {
        if !path.is_dir() {
            warn!(path = %path.display(), "Bundle path is not a directory");
            return false;
        }
        let resolved = canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.lock().current = Some(resolved);
        true
    }

    /// Set the bundle folder to the directory containing `script`.
    pub fn set_bundle_folder(&self, script: &Path) -> bool {
        match script.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.set_bundle_path(parent),
            _ => self.set_bundle_path(Path::new(".")),
        }
    }

    /// Number of saved bundle paths (nesting depth of active scopes).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.lock().saved.len()
    }

    /// Push `folder` as the new bundle, remembering the previous one.
    ///
    /// Returns false without pushing when `folder` already is the current
    /// bundle.
    fn push(&self, folder: PathBuf) -> bool {
        let mut state = self.lock();
        if state.current.as_deref() == Some(folder.as_path()) {
            return false;
        }
        let previous = state.current.replace(folder);
        state.saved.push(previous);
        true
    }

    fn pop(&self) {
        let mut state = self.lock();
        match state.saved.pop() {
            Some(previous) => state.current = previous,
            None => warn!("Bundle path stack underflow"),
        }
    }

    /// Add a local folder to the image search path (no duplicates).
    pub fn add(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        let mut state = self.lock();
        if !state.search.iter().any(|p| p == path) {
            state.search.push(path.to_path_buf());
        }
        true
    }

    /// Remove a local folder from the image search path.
    pub fn remove(&self, path: &Path) -> bool {
        let mut state = self.lock();
        let before = state.search.len();
        state.search.retain(|p| p != path);
        before != state.search.len()
    }

    /// Local image search folders in insertion order.
    #[must_use]
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.lock().search.clone()
    }

    /// Register an HTTP image root.
    pub fn add_http(&self, url: &str) -> bool {
        let url = url.trim_end_matches('/').to_string();
        if url.is_empty() {
            return false;
        }
        let mut state = self.lock();
        if !state.http.contains(&url) {
            debug!(url = %url, "Adding HTTP image root");
            state.http.push(url);
        }
        true
    }

    /// Unregister an HTTP image root.
    pub fn remove_http(&self, url: &str) -> bool {
        let url = url.trim_end_matches('/');
        let mut state = self.lock();
        let before = state.http.len();
        state.http.retain(|u| u != url);
        before != state.http.len()
    }

    #[must_use]
    pub fn http_paths(&self) -> Vec<String> {
        self.lock().http.clone()
    }
}

/// Scoped bundle-path acquisition.
///
/// Entering pushes the script's folder when it differs from the current
/// bundle; dropping pops it again. A scope that did not push does not pop.
#[must_use = "the bundle path is restored when the scope is dropped"]
pub struct BundleScope {
    paths: Arc<BundlePaths>,
    pushed: bool,
}

impl BundleScope {
    /// Enter the folder containing `script`.
    pub fn for_script(paths: Arc<BundlePaths>, script: &Path) -> Self {
        let folder = match script.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::enter(paths, &folder)
    }

    /// Enter `folder` as the bundle.
    pub fn enter(paths: Arc<BundlePaths>, folder: &Path) -> Self {
        let resolved = canonicalize(folder).unwrap_or_else(|_| folder.to_path_buf());
        let pushed = paths.push(resolved);
        Self { paths, pushed }
    }

    /// Whether this scope changed the bundle path.
    #[must_use]
    pub fn pushed(&self) -> bool {
        self.pushed
    }
}

impl Drop for BundleScope {
    fn drop(&mut self) {
        if self.pushed {
            self.paths.pop();
        }
    }
}
