//! End-to-end runs through the location adapters: remote scripts, packed
//! archives and bundle folders, delegating to both recording and real
//! (embedded Lua) runners.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use polyrun::{
    Lifecycle, OutputSink, RegistryBuilder, RunOptions, RunnerRegistry, ScriptRunner, codes,
};
use polyrun_runners::registry::factory;
use polyrun_runners::test_support::{MemoryFetcher, Recorder, RecordingBackend, write_zip};
use polyrun_utils::test_support::write_script;
use tempfile::TempDir;

fn recording_python(builder: RegistryBuilder, recorder: &Arc<Recorder>) -> RegistryBuilder {
    let recorder = Arc::clone(recorder);
    builder.register_with(move |cx| {
        Lifecycle::shared(
            RecordingBackend::new(RecordingBackend::PYTHON, recorder),
            Arc::clone(&cx.bundle),
        )
    })
}

fn lua_archives() -> Arc<RunnerRegistry> {
    RegistryBuilder::new()
        .isolated()
        .register_with(factory::packed_script)
        .register_with(factory::jar)
        .register_with(factory::zip)
        .register_with(factory::lua)
        .build()
}

fn workspace_of(script: &str) -> &Path {
    Path::new(script).parent().unwrap()
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[test]
fn test_remote_folder_downloads_runs_and_cleans_up() {
    let fetcher = Arc::new(
        MemoryFetcher::new().with("http://example.com/demo/demo.js", "console.log('remote')"),
    );
    let recorder = Recorder::new();
    let js = Arc::clone(&recorder);
    let registry = RegistryBuilder::new()
        .isolated()
        .with_fetcher(fetcher.clone())
        .register_with(factory::network)
        .register_with(move |cx| {
            Lifecycle::shared(
                RecordingBackend::new(RecordingBackend::JAVASCRIPT, js),
                Arc::clone(&cx.bundle),
            )
        })
        .build();

    let runner = registry.resolve_runner("http://example.com/demo");
    assert_eq!(runner.name(), "Network");
    assert!(fetcher.probes().contains(&"http://example.com/demo/demo.js".to_string()));

    let mut options = RunOptions::default();
    let args = vec!["--fast".to_string()];
    assert_eq!(runner.run_script("http://example.com/demo", &args, &mut options), codes::SUCCESS);

    let runs = recorder.recorded_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].args, args);
    assert_eq!(runs[0].content.as_deref(), Some("console.log('remote')"));
    assert!(!workspace_of(&runs[0].script).exists());
    assert!(registry.bundle().http_paths().is_empty());
    assert_eq!(registry.bundle().depth(), 0);
}

#[test]
fn test_remote_lua_script_runs_and_aborts() {
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with("https://example.com/hello/hello.lua", "os.exit(7)")
            .with("https://example.com/spin/spin.lua", "while true do end"),
    );
    let registry = RegistryBuilder::new()
        .isolated()
        .with_fetcher(fetcher)
        .register_with(factory::network)
        .register_with(factory::lua)
        .build();

    let mut options = RunOptions::default();
    assert_eq!(registry.run("https://example.com/hello", &[], &mut options), 7);

    let network = registry.runner_by_name("Network");
    let worker = {
        let network = Arc::clone(&network);
        thread::spawn(move || {
            let mut options = RunOptions::default().silent();
            network.run_script("https://example.com/spin", &[], &mut options)
        })
    };
    let lua = registry.runner_by_name("Lua");
    while !lua.is_running() {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(network.is_abort_supported());
    network.abort();
    assert_eq!(worker.join().unwrap(), codes::ABORTED);
    assert!(!network.is_abort_supported());
}

// ---------------------------------------------------------------------------
// Archives
// ---------------------------------------------------------------------------

#[test]
fn test_packed_script_runs_registered_entry_even_when_it_fails() {
    let dir = TempDir::new().unwrap();
    let archive = write_zip(
        &dir.path().join("foo.skl"),
        &[("foo.py", "raise RuntimeError('boom')"), ("foo.js", "throw 1")],
    );
    let recorder = Recorder::new();
    recorder.set_exit_code(codes::SCRIPT_ERROR);
    let registry = recording_python(
        RegistryBuilder::new().isolated().register_with(factory::packed_script),
        &recorder,
    )
    .build();

    let identifier = archive.to_str().unwrap();
    let runner = registry.resolve_runner(identifier);
    assert_eq!(runner.name(), "PackedScript");
    assert!(runner.can_handle(identifier));

    let mut options = RunOptions::default();
    let code = runner.run_script(identifier, &[], &mut options);
    assert_ne!(code, codes::SUCCESS);

    let runs = recorder.recorded_runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].script.ends_with("foo.py"));
    assert!(!workspace_of(&runs[0].script).exists());
}

#[test]
fn test_packed_lua_error_reports_line_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let archive = write_zip(
        &dir.path().join("foo.skl"),
        &[("foo.lua", "print(arg[0])\nerror('boom')\n"), ("foo.js", "")],
    );
    let registry = lua_archives();
    let (out, buffer) = OutputSink::capture();
    let mut options = RunOptions::default().with_out(out);
    let code = registry.run(archive.to_str().unwrap(), &[], &mut options);
    assert_eq!(code, codes::SCRIPT_ERROR);
    assert_eq!(options.error_line, 2);

    let extracted = buffer.contents();
    let extracted = Path::new(extracted.trim_end());
    assert!(extracted.ends_with("foo.lua"));
    assert!(!extracted.exists());
    assert!(!extracted.parent().unwrap().exists());
}

#[test]
fn test_archive_round_trip_matches_direct_run() {
    let scripts = [
        "print('ok')",
        "os.exit(3)",
        "local t = nil\nreturn t.field",
        "error('explicit')",
    ];
    let registry = lua_archives();
    for (index, source) in scripts.iter().enumerate() {
        let dir = TempDir::new().unwrap();
        let direct = write_script(dir.path(), "job.lua", source);
        let packed = write_zip(
            &dir.path().join(format!("job{index}.zip")),
            &[(&format!("job{index}.lua"), source)],
        );

        let mut direct_options = RunOptions::default().silent();
        let direct_code = registry.run(direct.to_str().unwrap(), &[], &mut direct_options);
        let mut packed_options = RunOptions::default().silent();
        let packed_code = registry.run(packed.to_str().unwrap(), &[], &mut packed_options);

        assert_eq!(direct_code, packed_code, "script {source:?}");
        assert_eq!(direct_options.error_line, packed_options.error_line, "script {source:?}");
    }
}

#[test]
fn test_archive_keeps_relative_layout() {
    let dir = TempDir::new().unwrap();
    let archive = write_zip(
        &dir.path().join("app.zip"),
        &[
            ("lib/", ""),
            ("lib/helper.lua", "return { answer = 42 }"),
            ("app.lua", "os.exit(require('lib.helper').answer)"),
        ],
    );
    let registry = lua_archives();
    let mut options = RunOptions::default().silent();
    assert_eq!(registry.run(archive.to_str().unwrap(), &[], &mut options), 42);
}

// ---------------------------------------------------------------------------
// Bundle folders
// ---------------------------------------------------------------------------

#[test]
fn test_bundle_folder_runs_lua_script() {
    let dir = TempDir::new().unwrap();
    let bundle = dir.path().join("report.sikuli");
    write_script(&bundle, "report.lua", "os.exit(#arg)");
    write_script(&bundle, "notes.txt", "");

    let registry = RegistryBuilder::new()
        .isolated()
        .register_with(factory::bundle_dir)
        .register_with(factory::lua)
        .build();
    let identifier = bundle.to_str().unwrap();
    assert_eq!(registry.resolve_runner(identifier).name(), "Bundle");

    let args = vec!["a".to_string(), "b".to_string()];
    let mut options = RunOptions::default();
    assert_eq!(registry.run(identifier, &args, &mut options), 2);
    assert_eq!(registry.bundle().depth(), 0);
}
