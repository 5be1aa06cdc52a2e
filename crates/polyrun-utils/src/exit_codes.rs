//! Exit code constants for script runs.
//!
//! Every `run_script`/`eval_script` call returns a plain `i32`. This module gives
//! the reserved values names so callers can tell a script-reported code apart
//! from a resolution or service failure.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Script completed successfully |
//! | 1 | `SCRIPT_ERROR` | Script raised an error without an explicit exit code |
//! | -1 | `FAILURE` | Unsupported operation, invalid runner or generic failure |
//! | -2 | `FILE_NOT_FOUND` | Script, archive entry or remote script not found |
//! | -3 | `UNAVAILABLE` | Interpreter or network service unavailable |
//! | -4 | `ABORTED` | Run was aborted on request |
//! | -5 | `TIMEOUT` | Run exceeded its configured timeout |
//!
//! Any other positive value is an exit code reported by the script itself.

/// Exit codes matching the documented exit code table.
///
/// # Example
///
/// ```rust
/// use polyrun_utils::exit_codes::ExitCode;
///
/// let code = ExitCode::from_i32(-2);
/// assert_eq!(code, ExitCode::FILE_NOT_FOUND);
/// assert!(code.is_reserved());
/// assert!(!ExitCode::from_i32(3).is_reserved());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Script completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Script raised an error and did not report its own exit code
    pub const SCRIPT_ERROR: ExitCode = ExitCode(1);

    /// Unsupported operation, invalid runner or generic failure
    pub const FAILURE: ExitCode = ExitCode(-1);

    /// Script, archive entry or remote script could not be found
    pub const FILE_NOT_FOUND: ExitCode = ExitCode(-2);

    /// Interpreter or network service is unavailable
    pub const UNAVAILABLE: ExitCode = ExitCode(-3);

    /// Run was aborted on request
    pub const ABORTED: ExitCode = ExitCode(-4);

    /// Run exceeded its configured timeout
    pub const TIMEOUT: ExitCode = ExitCode(-5);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        Self(code)
    }

    /// True for the negative values reserved for runner-side failures.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 < 0
    }

    /// Short machine-readable label, used in logs and JSON output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self.0 {
            0 => "success",
            1 => "script_error",
            -1 => "failure",
            -2 => "file_not_found",
            -3 => "unavailable",
            -4 => "aborted",
            -5 => "timeout",
            c if c < 0 => "failure",
            _ => "script_exit",
        }
    }

    /// Map to a process exit status for the CLI.
    ///
    /// Operating systems only carry 0..=255, so reserved negative codes are
    /// folded into the 240..=255 band.
    #[must_use]
    pub const fn as_process_status(self) -> i32 {
        if self.0 < 0 {
            255 - ((-(self.0 as i64) - 1) % 16) as i32
        } else if self.0 > 255 {
            255
        } else {
            self.0
        }
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

/// Raw i32 constants for match arms and FFI-like call sites.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const SCRIPT_ERROR: i32 = 1;
    pub const FAILURE: i32 = -1;
    pub const FILE_NOT_FOUND: i32 = -2;
    pub const UNAVAILABLE: i32 = -3;
    pub const ABORTED: i32 = -4;
    pub const TIMEOUT: i32 = -5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_match_raw_codes() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), codes::SUCCESS);
        assert_eq!(ExitCode::SCRIPT_ERROR.as_i32(), codes::SCRIPT_ERROR);
        assert_eq!(ExitCode::FAILURE.as_i32(), codes::FAILURE);
        assert_eq!(ExitCode::FILE_NOT_FOUND.as_i32(), codes::FILE_NOT_FOUND);
        assert_eq!(ExitCode::UNAVAILABLE.as_i32(), codes::UNAVAILABLE);
        assert_eq!(ExitCode::ABORTED.as_i32(), codes::ABORTED);
        assert_eq!(ExitCode::TIMEOUT.as_i32(), codes::TIMEOUT);
    }

    #[test]
    fn test_reserved_codes_are_negative() {
        for code in [
            ExitCode::FAILURE,
            ExitCode::FILE_NOT_FOUND,
            ExitCode::UNAVAILABLE,
            ExitCode::ABORTED,
            ExitCode::TIMEOUT,
        ] {
            assert!(code.is_reserved(), "{code} should be reserved");
        }
        assert!(!ExitCode::SUCCESS.is_reserved());
        assert!(!ExitCode::from_i32(42).is_reserved());
    }

    #[test]
    fn test_labels() {
        assert_eq!(ExitCode::SUCCESS.label(), "success");
        assert_eq!(ExitCode::FILE_NOT_FOUND.label(), "file_not_found");
        assert_eq!(ExitCode::from_i32(7).label(), "script_exit");
        assert_eq!(ExitCode::from_i32(-99).label(), "failure");
    }

    #[test]
    fn test_process_status_folding() {
        assert_eq!(ExitCode::SUCCESS.as_process_status(), 0);
        assert_eq!(ExitCode::from_i32(3).as_process_status(), 3);
        assert_eq!(ExitCode::FAILURE.as_process_status(), 255);
        assert_eq!(ExitCode::FILE_NOT_FOUND.as_process_status(), 254);
        assert_eq!(ExitCode::TIMEOUT.as_process_status(), 251);
        assert_eq!(ExitCode::from_i32(1000).as_process_status(), 255);
    }

    #[test]
    fn test_round_trip_through_i32() {
        let code: ExitCode = 5.into();
        let raw: i32 = code.into();
        assert_eq!(raw, 5);
    }
}
