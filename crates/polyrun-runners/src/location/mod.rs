//! Location adapters: runners that turn an identifier into a runnable local
//! script and hand it to another runner.
//!
//! - [`network`]: HTTP(S) URLs, probed against every active runner's endings
//! - [`archive`]: zip/jar/skl archives holding a script named after the archive
//! - [`bundle_dir`]: directories holding a script named after the directory

pub mod archive;
pub mod bundle_dir;
pub mod fetcher;
pub mod network;

use tempfile::TempDir;
use tracing::warn;

/// `scheme://` within the first six characters.
///
/// Local-file runners refuse such identifiers so they fall through to the
/// network runner.
#[must_use]
pub fn looks_like_url(identifier: &str) -> bool {
    identifier.find("://").is_some_and(|idx| idx < 6)
}

/// Delete a dispatcher's temporary workspace. A failed delete is logged
/// and never changes the run's exit code.
pub(crate) fn remove_workspace(workspace: TempDir, runner: &str) {
    let path = workspace.path().to_path_buf();
    if let Err(e) = workspace.close() {
        warn!(runner = %runner, path = %path.display(), error = %e, "Could not remove temporary workspace");
    }
}
