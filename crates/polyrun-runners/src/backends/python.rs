//! Python through an external `python3`/`python` process.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::process::{Interpreter, ProcessBackend};
use crate::contract::RunnerDescriptor;
use crate::error_line;

pub const DESCRIPTOR: RunnerDescriptor =
    RunnerDescriptor::new("Python", "text/python", &["py"]).with_alt_endings(&[".pyc"]);

pub type PythonBackend = ProcessBackend<Python>;

#[derive(Debug, Default, Clone, Copy)]
pub struct Python;

impl Interpreter for Python {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn programs(&self) -> &'static [&'static str] {
        &["python3", "python"]
    }

    fn script_args(&self, script: &Path, args: &[String]) -> Vec<String> {
        let mut argv = vec!["-u".to_string(), script.display().to_string()];
        argv.extend_from_slice(args);
        argv
    }

    fn eval_args(&self, source: &str) -> Vec<String> {
        vec!["-u".to_string(), "-c".to_string(), source.to_string()]
    }

    fn env(&self) -> Vec<(&'static str, &'static str)> {
        vec![("PYTHONIOENCODING", "utf-8"), ("PYTHONUNBUFFERED", "1")]
    }

    fn error_line(&self, stderr: &str, script: Option<&Path>, _source: Option<&str>) -> i32 {
        error_line::python(stderr, script)
    }

    fn prepare_lines(&self, source: &str) -> String {
        normalize_partial_script(source)
    }

    fn command_line_help(&self) -> Option<String> {
        Some(
            "Python scripts (.py) run with python3 -u; arguments are in sys.argv[1:].\n\
             Override the interpreter with [interpreters.Python] program = \"...\"."
                .to_string(),
        )
    }

    fn interactive_help(&self) -> Option<String> {
        Some("Python REPL: exit with exit() or Ctrl-D.".to_string())
    }
}

const FALLBACK_INDENT: &str = "    ";

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#").expect("valid regex"));
static IF_START: Lazy<Vec<Regex>> = Lazy::new(|| patterns(&[r"^\s*if.*:\s*$"]));
static IF_END: Lazy<Vec<Regex>> =
    Lazy::new(|| patterns(&[r"^\s*elif.*:\s*$", r"^\s*else\s*:\s*$"]));
static TRY_START: Lazy<Vec<Regex>> = Lazy::new(|| patterns(&[r"^\s*try\s*:\s*$"]));
static TRY_END: Lazy<Vec<Regex>> =
    Lazy::new(|| patterns(&[r"^\s*except.*:\s*$", r"^\s*finally\s*:\s*$"]));

fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
}

fn matches_any(line: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|p| p.is_match(line))
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Indentation is spaces and tabs only; other whitespace counts as content.
fn leading_ws(line: &str) -> &str {
    let content = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - content.len()]
}

/// Shortest non-empty indentation used in `script`.
fn detect_indentation(script: &str) -> Option<&str> {
    script
        .lines()
        .filter(|line| !is_blank(line))
        .map(leading_ws)
        .filter(|ws| !ws.is_empty())
        .min_by_key(|ws| ws.len())
}

/// Remove the indentation every non-blank line shares.
fn dedent(lines: Vec<String>) -> Vec<String> {
    let common = lines
        .iter()
        .filter(|line| !is_blank(line))
        .map(|line| leading_ws(line).len())
        .min()
        .unwrap_or(0);
    lines
        .into_iter()
        .map(|line| {
            if is_blank(&line) {
                String::new()
            } else {
                line[common..].to_string()
            }
        })
        .collect()
}

/// A trailing block header gets a body.
fn fix_last_line(mut lines: Vec<String>, indent: &str) -> Vec<String> {
    let Some(last) = lines.last() else {
        return lines;
    };
    let prefix = leading_ws(last).to_string();
    if matches_any(last, &TRY_END) {
        lines.push(format!("{prefix}{indent}raise"));
    } else if matches_any(last, &IF_START)
        || matches_any(last, &IF_END)
        || matches_any(last, &TRY_START)
    {
        lines.push(format!("{prefix}{indent}pass"));
    }
    lines
}

/// Close every `try:` that has no `except`/`finally` at its indentation.
fn fix_unclosed_try(mut lines: Vec<String>, indent: &str) -> Vec<String> {
    let mut open: Vec<String> = Vec::new();
    for line in &lines {
        if matches_any(line, &TRY_START) {
            open.push(leading_ws(line).to_string());
        } else if matches_any(line, &TRY_END)
            && open.last().map(String::as_str) == Some(leading_ws(line))
        {
            open.pop();
        }
    }
    for prefix in open.into_iter().rev() {
        lines.push(format!("{prefix}except:"));
        lines.push(format!("{prefix}{indent}raise"));
    }
    lines
}

/// Insert the missing opener (`try:` or `if True:`) for continuation clauses
/// whose block started before the fragment.
fn fix_unopened_block(
    mut lines: Vec<String>,
    start: &[Regex],
    end: &[Regex],
    opener: &str,
    indent: &str,
) -> Vec<String> {
    // Continuation clauses without an opener, innermost last.
    let mut pending: Vec<(usize, String)> = Vec::new();
    for (number, line) in lines.iter().enumerate().rev() {
        if matches_any(line, end) {
            let prefix = leading_ws(line).to_string();
            match pending.first_mut() {
                Some(first) if first.1 == prefix => *first = (number, prefix),
                _ => pending.push((number, prefix)),
            }
        } else if matches_any(line, start) {
            pending.pop();
        }
    }

    for (inserted, (number, prefix)) in pending.into_iter().rev().enumerate() {
        let number = number + inserted;
        let index = (0..number)
            .rev()
            .find(|&n| !is_blank(&lines[n]) && leading_ws(&lines[n]).len() < prefix.len())
            .map_or(0, |n| n + 1);
        let mut header = format!("{prefix}{opener}");
        if index == number {
            header.push_str(&format!("\n{prefix}{indent}pass"));
        }
        lines.insert(index, header);
    }
    lines
}

/// Make a fragment cut out of a larger script runnable on its own.
///
/// Comment lines are dropped, the shared indentation is removed, dangling
/// block headers get a `pass`/`raise` body, unclosed `try:` blocks get an
/// `except: raise`, and `else:`/`except:` clauses whose opener lies outside
/// the fragment get an `if True:`/`try:` in front.
#[must_use]
pub fn normalize_partial_script(script: &str) -> String {
    let lines: Vec<String> = script
        .split('\n')
        .filter(|line| !COMMENT.is_match(line))
        .map(str::to_string)
        .collect();
    let lines = dedent(lines);
    let indent = detect_indentation(script).unwrap_or(FALLBACK_INDENT);

    let lines = fix_last_line(lines, indent);
    let lines = fix_unclosed_try(lines, indent);
    let lines = fix_unopened_block(lines, &TRY_START, &TRY_END, "try:", indent);
    let lines = fix_unopened_block(lines, &IF_START, &IF_END, "if True:", indent);

    let mut normalized = lines.join("\n");
    normalized.push('\n');
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedents_selection() {
        assert_eq!(
            normalize_partial_script("  if True:\n    hello('world')"),
            "if True:\n  hello('world')\n"
        );
    }

    #[test]
    fn test_strips_comment_lines() {
        assert_eq!(normalize_partial_script("# setup\nx = 1"), "x = 1\n");
    }

    #[test]
    fn test_dangling_header_gets_body() {
        assert_eq!(normalize_partial_script("if x:"), "if x:\n    pass\n");
        assert_eq!(
            normalize_partial_script("try:\n  a()\nexcept:"),
            "try:\n  a()\nexcept:\n  raise\n"
        );
    }

    #[test]
    fn test_unclosed_try_is_closed() {
        assert_eq!(
            normalize_partial_script("try:\n  print('hello')"),
            "try:\n  print('hello')\nexcept:\n  raise\n"
        );
    }

    #[test]
    fn test_nested_unclosed_try() {
        assert_eq!(
            normalize_partial_script("try:\n  try:\n    a()"),
            "try:\n  try:\n    a()\n  except:\n    raise\nexcept:\n  raise\n"
        );
    }

    #[test]
    fn test_unopened_else_gets_if() {
        assert_eq!(
            normalize_partial_script("    print('foo')\nelse:\n    print('bar')"),
            "if True:\n    print('foo')\nelse:\n    print('bar')\n"
        );
    }

    #[test]
    fn test_unopened_except_gets_try() {
        assert_eq!(
            normalize_partial_script("    risky()\nexcept:\n    recover()"),
            "try:\n    risky()\nexcept:\n    recover()\n"
        );
    }

    #[test]
    fn test_non_ascii_whitespace_is_content() {
        assert_eq!(
            normalize_partial_script("\u{a0}x = 1\n y = 2"),
            "\u{a0}x = 1\n y = 2\n"
        );
    }

    #[test]
    fn test_complete_script_unchanged() {
        let script = "x = 1\nif x:\n    print(x)\nelse:\n    print(0)\n";
        assert_eq!(normalize_partial_script(script), format!("{script}\n"));
    }

    #[test]
    fn test_script_and_eval_args() {
        let argv = Python.script_args(Path::new("/tmp/t.py"), &["a".to_string()]);
        assert_eq!(argv, vec!["-u", "/tmp/t.py", "a"]);
        assert_eq!(Python.eval_args("pass"), vec!["-u", "-c", "pass"]);
    }
}
