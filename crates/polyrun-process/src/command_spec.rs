use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

/// One interpreter launch: program, argv, working folder and environment
/// overlay.
///
/// Arguments stay discrete `OsString`s and never pass through a shell, so a
/// script path or inline snippet full of quotes reaches the interpreter as
/// one argument.
///
/// ```rust
/// use polyrun_process::CommandSpec;
///
/// let launch = CommandSpec::new("python3")
///     .arg("-u")
///     .arg("login.py")
///     .cwd("/scripts/login.sikuli")
///     .env("POLYRUN_BUNDLE_PATH", "/scripts/login.sikuli");
///
/// assert_eq!(launch.argv().count(), 2);
/// assert_eq!(launch.program_name(), "python3");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    /// Variables set on top of the inherited environment, last write wins.
    pub env: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        let key = key.into();
        self.env.retain(|(existing, _)| *existing != key);
        self.env.push((key, value.into()));
        self
    }

    #[must_use]
    pub fn envs<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        vars.into_iter()
            .fold(self, |spec, (key, value)| spec.env(key, value))
    }

    pub fn argv(&self) -> impl Iterator<Item = &OsStr> {
        self.args.iter().map(OsString::as_os_str)
    }

    /// Overlay value for `key`, if any.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&OsStr> {
        self.env
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_os_str())
    }

    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// The `std::process::Command` for this launch. Stdio is left to the
    /// caller.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.env.iter().map(|(k, v)| (k, v)));
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

/// Log form: `program "arg" "arg"`.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {:?}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
