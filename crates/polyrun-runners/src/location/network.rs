//! Runner for scripts addressed by HTTP(S) URL.
//!
//! The URL names a script *folder* or the script itself. Candidates are built
//! from every active runner's file endings and probed in registration order;
//! the first reachable one is downloaded into a temporary workspace and run
//! by whichever runner claims the downloaded file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use polyrun_utils::bundle::BundlePaths;
use polyrun_utils::exit_codes::codes;
use polyrun_utils::paths::safe_join;
use reqwest::Url;
use tracing::{debug, error, info, warn};

use super::fetcher::UrlFetcher;
use super::{looks_like_url, remove_workspace};
use crate::contract::RunnerDescriptor;
use crate::delegation::AbortForwarder;
use crate::lifecycle::Backend;
use crate::options::RunOptions;
use crate::registry::{RegistryContext, RegistryHandle};

pub const DESCRIPTOR: RunnerDescriptor = RunnerDescriptor::new("Network", "text/url", &[]);

const GITHUB_HOST: &str = "github.com";
const GITHUB_RAW_HOST: &str = "raw.githubusercontent.com";

/// Rewrite a GitHub `tree` URL to the raw content host.
///
/// `https://github.com/user/repo/tree/main/demo` becomes
/// `https://raw.githubusercontent.com/user/repo/main/demo`. Anything else is
/// returned unchanged.
#[must_use]
pub fn rewrite_github_tree(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.host_str() != Some(GITHUB_HOST) {
        return url.to_string();
    }
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    if segments.len() < 4 || segments[2] != "tree" {
        return url.to_string();
    }
    let mut path = vec![segments[0], segments[1]];
    path.extend_from_slice(&segments[3..]);
    format!("{}://{GITHUB_RAW_HOST}/{}", parsed.scheme(), path.join("/"))
}

/// Registers the script's remote folder as an image root for the run.
struct HttpRoot<'a> {
    bundle: &'a BundlePaths,
    url: String,
}

impl<'a> HttpRoot<'a> {
    fn register(bundle: &'a BundlePaths, url: &str) -> Self {
        bundle.add_http(url);
        Self {
            bundle,
            url: url.to_string(),
        }
    }
}

impl Drop for HttpRoot<'_> {
    fn drop(&mut self) {
        self.bundle.remove_http(&self.url);
    }
}

pub struct NetworkBackend {
    registry: RegistryHandle,
    fetcher: Arc<dyn UrlFetcher>,
    bundle: Arc<BundlePaths>,
    rewrite_github: bool,
    /// Identifier -> resolved script URL. Only hits are cached, so a script
    /// published later is found on the next attempt.
    resolved: Mutex<HashMap<String, String>>,
    forwarder: AbortForwarder,
}

impl NetworkBackend {
    #[must_use]
    pub fn new(context: &RegistryContext) -> Self {
        Self {
            registry: context.registry.clone(),
            fetcher: Arc::clone(&context.fetcher),
            bundle: Arc::clone(&context.bundle),
            rewrite_github: context.config.network.rewrite_github(),
            resolved: Mutex::new(HashMap::new()),
            forwarder: AbortForwarder::new(),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.resolved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Candidate script URLs for `url`, in probe order.
    fn candidates(&self, url: &str) -> Vec<String> {
        let base = url.trim_end_matches('/');
        let basename = base.rsplit('/').next().unwrap_or(base);
        let lower = base.to_lowercase();

        let mut candidates: Vec<String> = Vec::new();
        for runner in self.registry.active_runners() {
            if runner.name() == DESCRIPTOR.name {
                continue;
            }
            for ending in runner.file_endings() {
                let candidate = if lower.ends_with(&ending.to_lowercase()) {
                    base.to_string()
                } else {
                    format!("{base}/{basename}{ending}")
                };
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }

    /// The first reachable candidate for `identifier`.
    fn resolve(&self, identifier: &str) -> Option<String> {
        if let Some(hit) = self.cache().get(identifier) {
            return Some(hit.clone());
        }
        let url = if self.rewrite_github {
            rewrite_github_tree(identifier)
        } else {
            identifier.to_string()
        };
        let found = self
            .candidates(&url)
            .into_iter()
            .find(|candidate| self.fetcher.is_reachable(candidate))?;
        debug!(runner = DESCRIPTOR.name, identifier = %identifier, script = %found, "Resolved remote script");
        self.cache().insert(identifier.to_string(), found.clone());
        Some(found)
    }

    /// Download `url` into `workspace` and run it with the runner claiming
    /// the local copy.
    fn run_downloaded(
        &self,
        url: &str,
        workspace: &Path,
        args: &[String],
        options: &mut RunOptions,
    ) -> i32 {
        let (folder, file_name) = url.rsplit_once('/').unwrap_or(("", url));
        let local = match safe_join(workspace, file_name) {
            Ok(local) => local,
            Err(e) => {
                error!(runner = DESCRIPTOR.name, url = %url, error = %e, "Remote script has an unusable file name");
                return codes::FAILURE;
            }
        };
        if let Err(e) = self.fetcher.download(url, &local) {
            error!(runner = DESCRIPTOR.name, url = %url, error = %e, "Download failed");
            return codes::UNAVAILABLE;
        }

        let _root = HttpRoot::register(&self.bundle, folder);
        let local = local.to_string_lossy().into_owned();
        let Some(runner) = self.registry.find_runner(&local) else {
            error!(runner = DESCRIPTOR.name, url = %url, "No runner for downloaded script");
            return codes::FAILURE;
        };
        info!(runner = DESCRIPTOR.name, url = %url, delegate = runner.name(), "Running remote script");
        self.forwarder
            .delegate(&runner, |inner| inner.run_script(&local, args, options))
    }
}

impl Backend for NetworkBackend {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn can_handle(&self, identifier: &str) -> bool {
        if !looks_like_url(identifier) {
            return false;
        }
        match Url::parse(identifier) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                self.resolve(identifier).is_some()
            }
            Ok(_) => false,
            Err(e) => {
                warn!(runner = DESCRIPTOR.name, identifier = %identifier, error = %e, "Malformed URL");
                false
            }
        }
    }

    fn do_run_script(&self, script: &str, args: &[String], options: &mut RunOptions) -> i32 {
        let Some(url) = self.resolve(script) else {
            error!(runner = DESCRIPTOR.name, identifier = %script, "No reachable script found");
            return codes::FILE_NOT_FOUND;
        };
        let workspace = match tempfile::Builder::new().prefix("polyrun-net-").tempdir() {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(runner = DESCRIPTOR.name, error = %e, "Cannot create download directory");
                return codes::FAILURE;
            }
        };
        let code = self.run_downloaded(&url, workspace.path(), args, options);
        remove_workspace(workspace, DESCRIPTOR.name);
        code
    }

    fn is_abort_supported(&self) -> bool {
        self.forwarder.is_abort_supported()
    }

    fn do_abort(&self) {
        self.forwarder.abort();
    }

    fn command_line_help(&self) -> Option<String> {
        Some(
            "http(s)://host/folder runs folder/folder.<ext> for the first extension \
             that answers; a URL ending in a known extension is run as is."
                .to_string(),
        )
    }
}
