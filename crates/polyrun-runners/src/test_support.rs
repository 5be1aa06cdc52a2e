//! Test doubles for the runner subsystem.
//!
//! [`RecordingBackend`] stands in for an interpreter and records every hook
//! call into a shared [`Recorder`]; [`MemoryFetcher`] serves "remote" scripts
//! from memory. Both are exposed under the `test-utils` feature so the root
//! integration tests can drive the lifecycle and location adapters without
//! python, node or a network.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use polyrun_utils::OutputSink;
use polyrun_utils::bundle::BundlePaths;
use polyrun_utils::exit_codes::codes;
use zip::write::SimpleFileOptions;

use crate::contract::RunnerDescriptor;
use crate::error::{BoxError, RunnerError};
use crate::lifecycle::Backend;
use crate::location::fetcher::UrlFetcher;
use crate::options::RunOptions;

/// One observed `run_script` call.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub script: String,
    pub args: Vec<String>,
    /// File content at the time of the call, if it was readable.
    pub content: Option<String>,
}

/// Shared log of hook calls, plus knobs to make the backend misbehave.
#[derive(Debug, Default)]
pub struct Recorder {
    init_calls: AtomicUsize,
    failing_inits: AtomicUsize,
    redirect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    abort_calls: AtomicUsize,
    begun_runs: AtomicUsize,
    ended_runs: AtomicUsize,
    panic_on_run: AtomicBool,
    exit_code: AtomicI32,
    evals: Mutex<Vec<String>>,
    runs: Mutex<Vec<RecordedRun>>,
    redirected_out: Mutex<Option<OutputSink>>,
    bundle: Mutex<Option<Arc<BundlePaths>>>,
    bundle_seen: Mutex<Vec<Option<usize>>>,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `count` inits fail.
    pub fn fail_inits(&self, count: usize) {
        self.failing_inits.store(count, Ordering::SeqCst);
    }

    pub fn panic_on_run(&self, panic: bool) {
        self.panic_on_run.store(panic, Ordering::SeqCst);
    }

    /// Exit code returned by subsequent runs and evals.
    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
    }

    /// Record the bundle depth seen during each run.
    pub fn observe_bundle(&self, bundle: Arc<BundlePaths>) {
        *self.bundle.lock().unwrap() = Some(bundle);
    }

    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn redirect_calls(&self) -> usize {
        self.redirect_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    /// `(begun, ended)` counts of the backend's run hooks.
    #[must_use]
    pub fn run_brackets(&self) -> (usize, usize) {
        (
            self.begun_runs.load(Ordering::SeqCst),
            self.ended_runs.load(Ordering::SeqCst),
        )
    }

    #[must_use]
    pub fn evals(&self) -> Vec<String> {
        self.evals.lock().unwrap().clone()
    }

    /// Script paths of every run, in call order.
    #[must_use]
    pub fn runs(&self) -> Vec<String> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .map(|run| run.script.clone())
            .collect()
    }

    #[must_use]
    pub fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }

    #[must_use]
    pub fn redirected_out(&self) -> Option<OutputSink> {
        self.redirected_out.lock().unwrap().clone()
    }

    #[must_use]
    pub fn bundle_seen(&self) -> Vec<Option<usize>> {
        self.bundle_seen.lock().unwrap().clone()
    }
}

/// A local-file [`Backend`] that executes nothing and records everything.
pub struct RecordingBackend {
    descriptor: RunnerDescriptor,
    recorder: Arc<Recorder>,
}

impl RecordingBackend {
    pub const ALPHA: RunnerDescriptor = RunnerDescriptor::new("Alpha", "text/alpha", &["alp"]);
    pub const JAVASCRIPT: RunnerDescriptor =
        RunnerDescriptor::new("JavaScript", "text/javascript", &["js"]);
    pub const PYTHON: RunnerDescriptor =
        RunnerDescriptor::new("Python", "text/python", &["py"]).with_alt_endings(&[".pyc"]);
    pub const TEXT: RunnerDescriptor = RunnerDescriptor::new("Text", "text/plain", &["txt"]);

    #[must_use]
    pub fn new(descriptor: RunnerDescriptor, recorder: Arc<Recorder>) -> Self {
        Self {
            descriptor,
            recorder,
        }
    }

    fn record_bundle(&self) {
        let bundle = self.recorder.bundle.lock().unwrap().clone();
        self.recorder
            .bundle_seen
            .lock()
            .unwrap()
            .push(bundle.map(|b| b.depth()));
    }
}

impl Backend for RecordingBackend {
    fn descriptor(&self) -> &RunnerDescriptor {
        &self.descriptor
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn is_local_file(&self) -> bool {
        true
    }

    fn do_init(&self, _args: &[String]) -> Result<(), BoxError> {
        self.recorder.init_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.recorder.failing_inits.load(Ordering::SeqCst);
        if failing > 0 {
            if failing != usize::MAX {
                self.recorder.failing_inits.store(failing - 1, Ordering::SeqCst);
            }
            return Err("recording backend refused to start".into());
        }
        Ok(())
    }

    fn do_redirect(&self, out: OutputSink, _err: OutputSink) -> bool {
        self.recorder.redirect_calls.fetch_add(1, Ordering::SeqCst);
        *self.recorder.redirected_out.lock().unwrap() = Some(out);
        true
    }

    fn do_run_script(&self, script: &str, args: &[String], options: &mut RunOptions) -> i32 {
        self.record_bundle();
        self.recorder.runs.lock().unwrap().push(RecordedRun {
            script: script.to_string(),
            args: args.to_vec(),
            content: std::fs::read_to_string(script).ok(),
        });
        if self.recorder.panic_on_run.load(Ordering::SeqCst) {
            panic!("recording backend panicked on {script}");
        }
        let code = self.recorder.exit_code.load(Ordering::SeqCst);
        if code != codes::SUCCESS {
            options.error_line = 1;
        }
        code
    }

    fn do_eval_script(&self, source: &str, _options: &mut RunOptions) -> i32 {
        self.recorder.evals.lock().unwrap().push(source.to_string());
        self.recorder.exit_code.load(Ordering::SeqCst)
    }

    fn is_abort_supported(&self) -> bool {
        true
    }

    fn do_abort(&self) {
        self.recorder.abort_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn begin_run(&self) {
        self.recorder.begun_runs.fetch_add(1, Ordering::SeqCst);
    }

    fn end_run(&self) {
        self.recorder.ended_runs.fetch_add(1, Ordering::SeqCst);
    }

    fn do_close(&self) {
        self.recorder.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Run `f` with a subscriber that records every event as plain text.
#[cfg(test)]
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = polyrun_utils::CaptureBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}

/// Value of `field` on the first event logged with `message`.
#[cfg(test)]
pub(crate) fn event_field(logs: &str, message: &str, field: &str) -> Option<String> {
    let line = logs.lines().find(|line| line.contains(message))?;
    let (_, fields) = line.split_once(message)?;
    let key = format!("{field}=");
    fields
        .split_whitespace()
        .find_map(|pair| pair.strip_prefix(key.as_str()))
        .map(|value| value.trim_matches('"').to_string())
}

/// [`UrlFetcher`] serving a fixed set of URLs from memory.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    probes: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, url: &str, content: &str) -> Self {
        self.files.insert(url.to_string(), content.as_bytes().to_vec());
        self
    }

    /// Every URL probed so far, in order.
    #[must_use]
    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }
}

impl UrlFetcher for MemoryFetcher {
    fn is_reachable(&self, url: &str) -> bool {
        self.probes.lock().unwrap().push(url.to_string());
        self.files.contains_key(url)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, RunnerError> {
        let content = self.files.get(url).ok_or_else(|| RunnerError::Network {
            url: url.to_string(),
            reason: "404 Not Found".to_string(),
        })?;
        std::fs::write(dest, content).map_err(|e| RunnerError::io(dest, e))?;
        Ok(content.len() as u64)
    }
}

/// Write a zip archive at `path` holding `entries` (name, content).
///
/// Names ending in `/` become directory entries.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) -> PathBuf {
    let file = File::create(path).expect("create archive");
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).expect("add directory");
        } else {
            zip.start_file(*name, options).expect("start entry");
            zip.write_all(content.as_bytes()).expect("write entry");
        }
    }
    zip.finish().expect("finish archive");
    path.to_path_buf()
}
