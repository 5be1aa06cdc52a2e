//! Logging setup for polyrun
//!
//! All crates log through `tracing`. Runner events carry a `runner` field so a
//! single run can be followed through delegation (network -> archive -> backend).

use std::time::Instant;
use tracing::{Level, debug, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the filter is `polyrun=info,warn`,
/// or `polyrun=debug,info` when `verbose` is set.
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("polyrun=debug,info")
            } else {
                EnvFilter::try_new("polyrun=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one script execution.
pub fn run_span(runner: &str, script: &str) -> tracing::Span {
    span!(Level::INFO, "script_run", runner = %runner, script = %script)
}

/// Measures a script run and logs its outcome once.
pub struct RunTimer {
    runner: String,
    started: Instant,
}

impl RunTimer {
    #[must_use]
    pub fn start(runner: &str) -> Self {
        Self {
            runner: runner.to_string(),
            started: Instant::now(),
        }
    }

    /// Log completion with exit code and duration, returning the exit code.
    pub fn finish(self, exit_code: i32) -> i32 {
        let duration_ms = self.started.elapsed().as_millis();
        if exit_code == 0 {
            debug!(runner = %self.runner, duration_ms = %duration_ms, "Script finished");
        } else {
            info!(
                runner = %self.runner,
                exit_code = exit_code,
                duration_ms = %duration_ms,
                "Script finished with non-zero exit code"
            );
        }
        exit_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_timer_returns_exit_code() {
        assert_eq!(RunTimer::start("Lua").finish(0), 0);
        assert_eq!(RunTimer::start("Lua").finish(3), 3);
    }

    #[test]
    fn test_run_span_is_constructible() {
        let span = run_span("Lua", "demo.lua");
        let _entered = span.enter();
    }
}
