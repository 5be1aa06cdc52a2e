//! Runner registry and identifier resolution.
//!
//! The registry owns every runner constructed at startup, in registration
//! order, and answers "who runs this?" by asking each active runner in turn.
//! Order is a precedence contract: dispatchers for specially named
//! containers come before generic ones, so a runnable jar is never claimed
//! by the plain zip runner.
//!
//! Runners are created from an explicit table of factory functions
//! ([`factory`]). Location adapters need to resolve inner scripts through the
//! registry that owns them, so factories receive a [`RegistryContext`] with a
//! weak [`RegistryHandle`] back to it.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use polyrun_config::Config;
use polyrun_utils::bundle::{self, BundlePaths};
use polyrun_utils::exit_codes::codes;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::backends::lua::LuaInterpreter;
use crate::contract::ScriptRunner;
use crate::invalid::InvalidRunner;
use crate::location::fetcher::{HttpFetcher, UrlFetcher};
use crate::location::looks_like_url;
use crate::options::RunOptions;

/// Weak reference from a runner back to the registry that owns it.
///
/// Once the registry is gone every query answers "nothing".
#[derive(Clone, Default)]
pub struct RegistryHandle(Weak<RunnerRegistry>);

impl RegistryHandle {
    #[must_use]
    pub fn upgrade(&self) -> Option<Arc<RunnerRegistry>> {
        self.0.upgrade()
    }

    #[must_use]
    pub fn active_runners(&self) -> Vec<Arc<dyn ScriptRunner>> {
        self.upgrade()
            .map(|registry| registry.active_runners())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn find_runner(&self, identifier: &str) -> Option<Arc<dyn ScriptRunner>> {
        self.upgrade()?.find_runner(identifier)
    }
}

/// Shared services handed to runner factories.
pub struct RegistryContext {
    pub registry: RegistryHandle,
    pub config: Arc<Config>,
    pub bundle: Arc<BundlePaths>,
    pub fetcher: Arc<dyn UrlFetcher>,
    pub lua: Arc<LuaInterpreter>,
}

pub type Factory = fn(&RegistryContext) -> Arc<dyn ScriptRunner>;

/// Factories for the shipped runners.
pub mod factory {
    use std::sync::Arc;

    use super::RegistryContext;
    use crate::backends::applescript::AppleScript;
    use crate::backends::javascript::JavaScript;
    use crate::backends::lua::LuaBackend;
    use crate::backends::powershell::PowerShell;
    use crate::backends::process::ProcessBackend;
    use crate::backends::python::Python;
    use crate::backends::text::TextBackend;
    use crate::contract::ScriptRunner;
    use crate::lifecycle::Lifecycle;
    use crate::location::archive::{ArchiveBackend, ArchiveFlavor};
    use crate::location::bundle_dir::BundleDirBackend;
    use crate::location::network::NetworkBackend;

    fn bundle(cx: &RegistryContext) -> Arc<polyrun_utils::bundle::BundlePaths> {
        Arc::clone(&cx.bundle)
    }

    pub fn network(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(NetworkBackend::new(cx), bundle(cx))
    }

    pub fn packed_script(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(ArchiveBackend::new(ArchiveFlavor::PackedScript, cx), bundle(cx))
    }

    pub fn jar(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(ArchiveBackend::new(ArchiveFlavor::Jar, cx), bundle(cx))
    }

    pub fn zip(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(ArchiveBackend::new(ArchiveFlavor::Zip, cx), bundle(cx))
    }

    pub fn bundle_dir(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(BundleDirBackend::new(cx), bundle(cx))
    }

    pub fn lua(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(LuaBackend::new(Arc::clone(&cx.lua)), bundle(cx))
    }

    pub fn python(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(ProcessBackend::new(Python, &cx.config, bundle(cx)), bundle(cx))
    }

    pub fn javascript(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(ProcessBackend::new(JavaScript, &cx.config, bundle(cx)), bundle(cx))
    }

    pub fn powershell(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(ProcessBackend::new(PowerShell, &cx.config, bundle(cx)), bundle(cx))
    }

    pub fn applescript(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(ProcessBackend::new(AppleScript, &cx.config, bundle(cx)), bundle(cx))
    }

    pub fn text(cx: &RegistryContext) -> Arc<dyn ScriptRunner> {
        Lifecycle::shared(TextBackend, bundle(cx))
    }
}

/// Shipped runners in precedence order.
pub const DEFAULT_RUNNERS: &[(&str, Factory)] = &[
    ("Network", factory::network),
    ("PackedScript", factory::packed_script),
    ("Jar", factory::jar),
    ("PackedSikulix", factory::zip),
    ("Bundle", factory::bundle_dir),
    ("Lua", factory::lua),
    ("Python", factory::python),
    ("JavaScript", factory::javascript),
    ("PowerShell", factory::powershell),
    ("AppleScript", factory::applescript),
    ("Text", factory::text),
];

type Registration = Box<dyn FnOnce(&RegistryContext) -> Arc<dyn ScriptRunner>>;

/// Builds a [`RunnerRegistry`].
///
/// ```rust,no_run
/// use polyrun_runners::registry::RegistryBuilder;
///
/// let registry = RegistryBuilder::new().with_defaults().build();
/// let runner = registry.resolve_runner("demo.lua");
/// assert_eq!(runner.name(), "Lua");
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    config: Config,
    fetcher: Option<Arc<dyn UrlFetcher>>,
    isolated: bool,
    registrations: Vec<Registration>,
}

impl RegistryBuilder {
    /// An empty builder with the built-in configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Register every shipped runner, in [`DEFAULT_RUNNERS`] order.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        for (_, factory) in DEFAULT_RUNNERS {
            self.registrations.push(Box::new(*factory));
        }
        self
    }

    /// Append a runner; it is consulted after everything registered so far.
    #[must_use]
    pub fn register_with(
        mut self,
        factory: impl FnOnce(&RegistryContext) -> Arc<dyn ScriptRunner> + 'static,
    ) -> Self {
        self.registrations.push(Box::new(factory));
        self
    }

    /// Replace the HTTP fetcher used by the network runner.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn UrlFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use a private bundle path service and Lua VM instead of the
    /// process-wide ones.
    #[must_use]
    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }

    pub fn build(self) -> Arc<RunnerRegistry> {
        let Self {
            config,
            fetcher,
            isolated,
            registrations,
        } = self;
        let config = Arc::new(config);
        let (bundle, lua) = if isolated {
            (Arc::new(BundlePaths::new()), Arc::new(LuaInterpreter::new()))
        } else {
            (bundle::global(), LuaInterpreter::shared())
        };
        lua.set_check_interval(config.lua.abort_check_instructions());
        let fetcher =
            fetcher.unwrap_or_else(|| Arc::new(HttpFetcher::new(&config.network)) as Arc<dyn UrlFetcher>);

        Arc::new_cyclic(|weak| {
            let context = RegistryContext {
                registry: RegistryHandle(weak.clone()),
                config: Arc::clone(&config),
                bundle: Arc::clone(&bundle),
                fetcher,
                lua,
            };
            let entries: Vec<Entry> = registrations
                .into_iter()
                .map(|register| {
                    let runner = register(&context);
                    let supported = runner.is_supported();
                    let disabled = config.is_runner_disabled(runner.name());
                    debug!(
                        runner = runner.name(),
                        supported = supported,
                        disabled = disabled,
                        "Registered runner"
                    );
                    Entry {
                        runner,
                        supported,
                        disabled,
                    }
                })
                .collect();
            RunnerRegistry {
                entries,
                config,
                bundle,
            }
        })
    }
}

struct Entry {
    runner: Arc<dyn ScriptRunner>,
    /// Probed once at registration.
    supported: bool,
    disabled: bool,
}

impl Entry {
    fn is_active(&self) -> bool {
        self.supported && !self.disabled
    }
}

/// One row of `polyrun list`.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub type_tag: &'static str,
    pub extensions: Vec<&'static str>,
    pub supported: bool,
    pub disabled: bool,
}

pub struct RunnerRegistry {
    entries: Vec<Entry>,
    config: Arc<Config>,
    bundle: Arc<BundlePaths>,
}

impl RunnerRegistry {
    /// Registry with every shipped runner.
    #[must_use]
    pub fn with_defaults(config: Config) -> Arc<Self> {
        RegistryBuilder::new().with_config(config).with_defaults().build()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn bundle(&self) -> &Arc<BundlePaths> {
        &self.bundle
    }

    /// Every registered runner, supported or not.
    #[must_use]
    pub fn runners(&self) -> Vec<Arc<dyn ScriptRunner>> {
        self.entries.iter().map(|e| Arc::clone(&e.runner)).collect()
    }

    /// Runners that take part in resolution: supported and not disabled.
    #[must_use]
    pub fn active_runners(&self) -> Vec<Arc<dyn ScriptRunner>> {
        self.entries
            .iter()
            .filter(|e| e.is_active())
            .map(|e| Arc::clone(&e.runner))
            .collect()
    }

    /// First active runner claiming `identifier`.
    #[must_use]
    pub fn find_runner(&self, identifier: &str) -> Option<Arc<dyn ScriptRunner>> {
        self.entries
            .iter()
            .filter(|e| e.is_active())
            .find(|e| e.runner.can_handle(identifier))
            .map(|e| Arc::clone(&e.runner))
    }

    /// Like [`find_runner`](Self::find_runner), but never empty-handed: an
    /// unclaimed identifier yields an [`InvalidRunner`].
    #[must_use]
    pub fn resolve_runner(&self, identifier: &str) -> Arc<dyn ScriptRunner> {
        match self.find_runner(identifier) {
            Some(runner) => {
                debug!(identifier = %identifier, runner = runner.name(), "Resolved runner");
                runner
            }
            None => {
                error!(identifier = %identifier, "No runner can handle identifier");
                Arc::new(InvalidRunner::new(identifier))
            }
        }
    }

    /// Runner registered under `name` (case-insensitive), active or not.
    #[must_use]
    pub fn runner_by_name(&self, name: &str) -> Arc<dyn ScriptRunner> {
        match self
            .entries
            .iter()
            .find(|e| e.runner.name().eq_ignore_ascii_case(name))
        {
            Some(entry) => Arc::clone(&entry.runner),
            None => {
                error!(name = %name, "No runner with this name");
                Arc::new(InvalidRunner::new(name))
            }
        }
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.runner.name()).collect()
    }

    #[must_use]
    pub fn types(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.runner.type_tag()).collect()
    }

    /// Extensions of the active runners, without duplicates.
    #[must_use]
    pub fn extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.is_active()) {
            for ext in entry.runner.extensions() {
                if !extensions.contains(ext) {
                    extensions.push(ext);
                }
            }
        }
        extensions
    }

    #[must_use]
    pub fn describe(&self) -> Vec<RunnerInfo> {
        self.entries
            .iter()
            .map(|e| RunnerInfo {
                name: e.runner.name(),
                type_tag: e.runner.type_tag(),
                extensions: e.runner.extensions().to_vec(),
                supported: e.supported,
                disabled: e.disabled,
            })
            .collect()
    }

    /// Abort whatever is running, on every runner that supports it.
    pub fn abort_all(&self) {
        for entry in &self.entries {
            if entry.runner.is_running() && entry.runner.is_abort_supported() {
                info!(runner = entry.runner.name(), "Aborting");
                entry.runner.abort();
            }
        }
    }

    /// Close every runner that was initialized.
    pub fn close_all(&self) {
        for entry in self.entries.iter().filter(|e| e.runner.is_ready()) {
            entry.runner.close();
        }
    }

    /// Resolve `identifier` and run it.
    pub fn run(&self, identifier: &str, args: &[String], options: &mut RunOptions) -> i32 {
        self.resolve_runner(identifier)
            .run_script(identifier, args, options)
    }

    /// Evaluate `text` whose first line selects the runner (name, `name*`,
    /// type tag or extension).
    pub fn run_inline(&self, text: &str, options: &mut RunOptions) -> i32 {
        let Some((selector, source)) = text.split_once('\n') else {
            error!("Inline script needs a runner selector on its first line");
            return codes::FAILURE;
        };
        let selector = selector.trim();
        let runner = self
            .entries
            .iter()
            .filter(|e| e.is_active())
            .find(|e| e.runner.descriptor().matches(selector))
            .map(|e| Arc::clone(&e.runner));
        match runner {
            Some(runner) => runner.eval_script(source, options),
            None => InvalidRunner::new(selector).eval_script(source, options),
        }
    }

    /// `candidate` itself, or `candidate` plus one of the active file
    /// endings when it has no extension.
    fn existing_with_endings(&self, candidate: &Path) -> Option<PathBuf> {
        if candidate.exists() {
            return Some(candidate.to_path_buf());
        }
        if candidate.extension().is_some() {
            return None;
        }
        self.active_runners()
            .iter()
            .flat_map(|runner| runner.file_endings())
            .map(|ending| {
                let mut name = OsString::from(candidate.as_os_str());
                name.push(ending);
                PathBuf::from(name)
            })
            .find(|path| path.exists())
    }

    /// Locate a script given by a possibly relative name.
    ///
    /// Relative names are tried against `base_dir`, then the working
    /// directory, then the user's home directory.
    #[must_use]
    pub fn resolve_relative_file(&self, name: &str, base_dir: Option<&Path>) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return self.existing_with_endings(path);
        }
        let roots = base_dir
            .map(Path::to_path_buf)
            .into_iter()
            .chain(env::current_dir().ok())
            .chain(dirs::home_dir());
        for root in roots {
            if let Some(found) = self.existing_with_endings(&root.join(path)) {
                return Some(found);
            }
        }
        None
    }

    /// Run `scripts` in order, stopping at the first non-zero exit code.
    ///
    /// Relative names resolve against the previous script's folder first.
    pub fn run_scripts(&self, scripts: &[String], args: &[String], options: &mut RunOptions) -> i32 {
        let mut code = codes::SUCCESS;
        let mut base_dir: Option<PathBuf> = None;
        for script in scripts {
            let identifier = if looks_like_url(script) {
                script.clone()
            } else {
                match self.resolve_relative_file(script, base_dir.as_deref()) {
                    Some(path) => {
                        base_dir = path.parent().map(Path::to_path_buf);
                        path.to_string_lossy().into_owned()
                    }
                    None => {
                        error!(script = %script, "Script not found");
                        return codes::FILE_NOT_FOUND;
                    }
                }
            };
            code = self.run(&identifier, args, options);
            if code != codes::SUCCESS {
                info!(script = %script, exit_code = code, "Stopping script sequence");
                break;
            }
        }
        code
    }
}
