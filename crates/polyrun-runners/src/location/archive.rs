//! Runners for scripts packed into zip-format archives.
//!
//! An archive is runnable when it holds an entry named after the archive
//! (see [`ArchiveFlavor::wanted_name`]) that some other active runner
//! accepts. Running extracts the whole archive into a temporary workspace,
//! so the script finds its images and modules next to it, delegates to that
//! runner and deletes the workspace again.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polyrun_utils::exit_codes::codes;
use polyrun_utils::paths::{base_name, ensure_dir_all, safe_join};
use strum::{Display, EnumIter};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};
use zip::ZipArchive;

use super::{looks_like_url, remove_workspace};
use crate::contract::{RunnerDescriptor, ScriptRunner};
use crate::delegation::AbortForwarder;
use crate::error::RunnerError;
use crate::lifecycle::Backend;
use crate::options::RunOptions;
use crate::registry::{RegistryContext, RegistryHandle};

const PACKED_SCRIPT: RunnerDescriptor =
    RunnerDescriptor::new("PackedScript", "application/x-skl", &["skl"]);
const JAR: RunnerDescriptor = RunnerDescriptor::new("Jar", "application/java-archive", &["jar"]);
const ZIP: RunnerDescriptor = RunnerDescriptor::new("PackedSikulix", "application/zip", &["zip"]);

/// Suffixes a runnable jar carries on top of the script name.
const JAR_SUFFIXES: [&str; 2] = ["-runnable", "_sikuli"];

/// The archive kinds, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum ArchiveFlavor {
    PackedScript,
    Jar,
    Zip,
}

impl ArchiveFlavor {
    #[must_use]
    pub const fn descriptor(self) -> &'static RunnerDescriptor {
        match self {
            Self::PackedScript => &PACKED_SCRIPT,
            Self::Jar => &JAR,
            Self::Zip => &ZIP,
        }
    }

    /// Base name of the entry to run from `archive`.
    #[must_use]
    pub fn wanted_name(self, archive: &Path) -> String {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base = base_name(&name);
        match self {
            Self::Jar => JAR_SUFFIXES
                .iter()
                .find_map(|suffix| base.strip_suffix(suffix))
                .unwrap_or(base)
                .to_string(),
            Self::PackedScript | Self::Zip => base.to_string(),
        }
    }
}

/// The runner and extracted script an archive resolves to.
///
/// Dropping it deletes the extraction workspace.
pub struct EffectiveRunner {
    pub runner: Arc<dyn ScriptRunner>,
    pub script: PathBuf,
    pub workspace: TempDir,
}

fn archive_error(path: &Path, reason: impl ToString) -> RunnerError {
    RunnerError::Archive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn open(path: &Path) -> Result<ZipArchive<File>, RunnerError> {
    let file = File::open(path).map_err(|e| RunnerError::io(path, e))?;
    ZipArchive::new(file).map_err(|e| archive_error(path, e))
}

/// Unpack every entry of `archive` under `dest`, keeping relative paths.
fn extract(runner: &str, archive: &Path, dest: &Path) -> Result<(), RunnerError> {
    let mut zip = open(archive)?;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| archive_error(archive, e))?;
        let target = safe_join(dest, entry.name()).map_err(|e| archive_error(archive, e))?;
        if entry.is_dir() {
            ensure_dir_all(&target).map_err(|e| RunnerError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            ensure_dir_all(parent).map_err(|e| RunnerError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| RunnerError::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| RunnerError::io(&target, e))?;
    }
    debug!(runner = %runner, archive = %archive.display(), entries = zip.len(), "Archive extracted");
    Ok(())
}

pub struct ArchiveBackend {
    flavor: ArchiveFlavor,
    registry: RegistryHandle,
    forwarder: AbortForwarder,
}

impl ArchiveBackend {
    #[must_use]
    pub fn new(flavor: ArchiveFlavor, context: &RegistryContext) -> Self {
        Self {
            flavor,
            registry: context.registry.clone(),
            forwarder: AbortForwarder::new(),
        }
    }

    #[must_use]
    pub fn flavor(&self) -> ArchiveFlavor {
        self.flavor
    }

    fn name(&self) -> &'static str {
        self.flavor.descriptor().name
    }

    /// Whether another active runner claims the entry name.
    fn accepts(&self, entry: &str) -> bool {
        let own = self.flavor.descriptor().name;
        self.registry
            .active_runners()
            .iter()
            .any(|runner| runner.name() != own && runner.can_handle(entry))
    }

    /// Name of the first file entry that should be run, if any.
    pub fn script_entry(&self, archive: &Path) -> Result<Option<String>, RunnerError> {
        let zip = open(archive)?;
        let wanted = self.flavor.wanted_name(archive);
        let entry = (0..zip.len())
            .filter_map(|index| zip.name_for_index(index))
            .filter(|name| !name.ends_with('/'))
            .find(|name| base_name(name) == wanted && self.accepts(name))
            .map(str::to_string);
        Ok(entry)
    }

    /// Extract `archive` and resolve the runner for its script entry.
    pub fn effective_runner(&self, archive: &Path) -> Result<EffectiveRunner, RunnerError> {
        let not_found = || RunnerError::Resolution {
            identifier: archive.display().to_string(),
        };
        let entry = self.script_entry(archive)?.ok_or_else(not_found)?;

        let workspace = tempfile::Builder::new()
            .prefix("polyrun-archive-")
            .tempdir()
            .map_err(|e| RunnerError::io(std::env::temp_dir(), e))?;
        extract(self.name(), archive, workspace.path())?;
        let script = safe_join(workspace.path(), &entry).map_err(|e| archive_error(archive, e))?;
        let runner = self
            .registry
            .find_runner(&script.to_string_lossy())
            .ok_or_else(not_found)?;
        Ok(EffectiveRunner {
            runner,
            script,
            workspace,
        })
    }
}

impl Backend for ArchiveBackend {
    fn descriptor(&self) -> &RunnerDescriptor {
        self.flavor.descriptor()
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn is_local_file(&self) -> bool {
        true
    }

    fn can_handle(&self, identifier: &str) -> bool {
        if looks_like_url(identifier) || !self.descriptor().matches(identifier) {
            return false;
        }
        let path = Path::new(identifier);
        if !path.is_file() {
            return false;
        }
        match self.script_entry(path) {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(runner = self.name(), flavor = %self.flavor, archive = %identifier, "No runnable entry in archive");
                false
            }
            Err(e) => {
                warn!(runner = self.name(), flavor = %self.flavor, error = %e, "Cannot read archive");
                false
            }
        }
    }

    fn do_run_script(&self, script: &str, args: &[String], options: &mut RunOptions) -> i32 {
        let effective = match self.effective_runner(Path::new(script)) {
            Ok(effective) => effective,
            Err(e @ RunnerError::Resolution { .. }) => {
                error!(runner = self.name(), flavor = %self.flavor, error = %e, "Nothing to run in archive");
                return codes::FILE_NOT_FOUND;
            }
            Err(e) => {
                error!(runner = self.name(), flavor = %self.flavor, error = %e, "Cannot prepare archive");
                return codes::FAILURE;
            }
        };
        let EffectiveRunner {
            runner,
            script: inner,
            workspace,
        } = effective;
        let inner = inner.to_string_lossy().into_owned();
        info!(
            runner = self.name(),
            flavor = %self.flavor,
            delegate = runner.name(),
            script = %inner,
            "Running packed script"
        );
        let code = self
            .forwarder
            .delegate(&runner, |delegate| delegate.run_script(&inner, args, options));
        remove_workspace(workspace, self.name());
        code
    }

    fn is_abort_supported(&self) -> bool {
        self.forwarder.is_abort_supported()
    }

    fn do_abort(&self) {
        self.forwarder.abort();
    }

    fn command_line_help(&self) -> Option<String> {
        Some(format!(
            "{} archives (.{}) run the entry named after the archive.",
            self.flavor.descriptor().name,
            self.flavor.descriptor().extensions.join(", .")
        ))
    }
}
