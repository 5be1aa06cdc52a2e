pub mod bundle;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod sink;
pub mod tail;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use exit_codes::ExitCode;
pub use sink::{CaptureBuffer, OutputSink};
pub use tail::TailBuffer;
