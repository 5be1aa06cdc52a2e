//! Runner for script bundles: a folder `demo` (or `demo.sikuli`) holding
//! `demo.<ext>` together with the images the script uses.

use std::path::{Path, PathBuf};

use polyrun_utils::exit_codes::codes;
use polyrun_utils::paths::base_name;
use tracing::{debug, error};

use super::looks_like_url;
use crate::contract::RunnerDescriptor;
use crate::delegation::AbortForwarder;
use crate::lifecycle::Backend;
use crate::options::RunOptions;
use crate::registry::{RegistryContext, RegistryHandle};

pub const DESCRIPTOR: RunnerDescriptor = RunnerDescriptor::new("Bundle", "text/bundle", &[]);

const BUNDLE_SUFFIX: &str = ".sikuli";

pub struct BundleDirBackend {
    registry: RegistryHandle,
    forwarder: AbortForwarder,
}

impl BundleDirBackend {
    #[must_use]
    pub fn new(context: &RegistryContext) -> Self {
        Self {
            registry: context.registry.clone(),
            forwarder: AbortForwarder::new(),
        }
    }

    /// The script file inside `dir` that another runner accepts.
    pub fn inner_script(&self, dir: &Path) -> Option<PathBuf> {
        let folder = dir.file_name()?.to_string_lossy().into_owned();
        let wanted = match folder.len().checked_sub(BUNDLE_SUFFIX.len()) {
            Some(cut)
                if folder
                    .get(cut..)
                    .is_some_and(|tail| tail.eq_ignore_ascii_case(BUNDLE_SUFFIX)) =>
            {
                &folder[..cut]
            }
            _ => folder.as_str(),
        };

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        let runners = self.registry.active_runners();
        files.into_iter().find(|path| {
            let name = path.to_string_lossy();
            base_name(&name) == wanted
                && runners
                    .iter()
                    .any(|runner| runner.name() != DESCRIPTOR.name && runner.can_handle(&name))
        })
    }
}

impl Backend for BundleDirBackend {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn is_local_file(&self) -> bool {
        true
    }

    fn can_handle(&self, identifier: &str) -> bool {
        if looks_like_url(identifier) {
            return false;
        }
        let dir = Path::new(identifier);
        dir.is_dir() && self.inner_script(dir).is_some()
    }

    fn do_run_script(&self, script: &str, args: &[String], options: &mut RunOptions) -> i32 {
        let Some(inner) = self.inner_script(Path::new(script)) else {
            error!(runner = DESCRIPTOR.name, bundle = %script, "Bundle holds no runnable script");
            return codes::FILE_NOT_FOUND;
        };
        let inner = inner.to_string_lossy().into_owned();
        let Some(runner) = self.registry.find_runner(&inner) else {
            error!(runner = DESCRIPTOR.name, script = %inner, "No runner for bundle script");
            return codes::FAILURE;
        };
        debug!(runner = DESCRIPTOR.name, bundle = %script, delegate = runner.name(), "Running bundle");
        self.forwarder
            .delegate(&runner, |delegate| delegate.run_script(&inner, args, options))
    }

    fn is_abort_supported(&self) -> bool {
        self.forwarder.is_abort_supported()
    }

    fn do_abort(&self) {
        self.forwarder.abort();
    }
}
