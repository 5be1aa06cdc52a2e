//! Test helpers shared by the workspace's integration tests.

use std::path::{Path, PathBuf};

/// Check whether tests that launch external interpreters should run.
///
/// `POLYRUN_SKIP_PROCESS_TESTS=1` disables them, e.g. on CI images without
/// python/node.
#[must_use]
pub fn process_tests_enabled() -> bool {
    !std::env::var("POLYRUN_SKIP_PROCESS_TESTS")
        .ok()
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Write `content` to `dir/name`, creating parent folders.
pub fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create script parent");
    }
    std::fs::write(&path, content).expect("write script");
    path
}
