//! Mapping interpreter error text back to a source line.
//!
//! Each interpreter formats locations differently, so every backend has its
//! own small parser here. All of them return [`UNKNOWN_LINE`] when the text
//! carries no usable location.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::options::UNKNOWN_LINE;

static SYSTEM_EXIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SystemExit: (-?\d+)").expect("valid regex"));

static PYTHON_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"File "([^"]+)", line (\d+)"#).expect("valid regex"));

static POWERSHELL_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"At (?:line:(\d+)|.*?:(\d+)) char:\d+").expect("valid regex")
});

static APPLESCRIPT_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\d+):(\d+): ").expect("valid regex"));

fn file_name(script: &Path) -> Option<&str> {
    script.file_name().and_then(|name| name.to_str())
}

fn parse_line(text: &str) -> i32 {
    text.parse().unwrap_or(UNKNOWN_LINE)
}

/// Exit code carried by a `SystemExit: N` marker.
#[must_use]
pub fn system_exit_code(text: &str) -> Option<i32> {
    SYSTEM_EXIT
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// `name:LINE:` where `name` is the chunk name Lua reports.
///
/// Lua shortens long chunk names from the left (`...dir/foo.lua:3:`), so only
/// the file name is matched.
#[must_use]
pub fn lua(message: &str, chunk: &str) -> i32 {
    let pattern = format!(r"{}:(\d+):", regex::escape(chunk));
    Regex::new(&pattern)
        .ok()
        .and_then(|re| re.captures(message).map(|caps| parse_line(&caps[1])))
        .unwrap_or(UNKNOWN_LINE)
}

/// Innermost traceback frame in `script`, or in `<string>` for `-c` code.
#[must_use]
pub fn python(stderr: &str, script: Option<&Path>) -> i32 {
    let wanted = script.and_then(file_name);
    PYTHON_FRAME
        .captures_iter(stderr)
        .filter(|caps| match wanted {
            Some(name) => Path::new(&caps[1]).file_name().and_then(|n| n.to_str()) == Some(name),
            None => &caps[1] == "<string>",
        })
        .last()
        .map_or(UNKNOWN_LINE, |caps| parse_line(&caps[2]))
}

/// First `file.js:LINE` (or `[eval]:LINE` for `-e` code) in node's output.
#[must_use]
pub fn javascript(stderr: &str, script: Option<&Path>) -> i32 {
    let marker = match script.and_then(file_name) {
        Some(name) => regex::escape(name),
        None => regex::escape("[eval]"),
    };
    Regex::new(&format!(r"{marker}:(\d+)"))
        .ok()
        .and_then(|re| re.captures(stderr).map(|caps| parse_line(&caps[1])))
        .unwrap_or(UNKNOWN_LINE)
}

/// `At C:\x.ps1:LINE char:N` or `At line:LINE char:N`.
#[must_use]
pub fn powershell(stderr: &str) -> i32 {
    POWERSHELL_LOCATION
        .captures(stderr)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map_or(UNKNOWN_LINE, |m| parse_line(m.as_str()))
}

/// osascript reports `file:START:END: error`; START is a character offset
/// into the source, mapped to a 1-based line.
#[must_use]
pub fn applescript(stderr: &str, source: Option<&str>) -> i32 {
    let Some(source) = source else {
        return UNKNOWN_LINE;
    };
    let Some(offset) = APPLESCRIPT_RANGE
        .captures(stderr)
        .and_then(|caps| caps[1].parse::<usize>().ok())
    else {
        return UNKNOWN_LINE;
    };
    let line = source
        .chars()
        .take(offset)
        .filter(|c| *c == '\n' || *c == '\r')
        .count();
    i32::try_from(line + 1).unwrap_or(UNKNOWN_LINE)
}
