//! Script runners: the capability contract, the shared lifecycle, the
//! interpreter backends, the location adapters that unwrap URLs, archives and
//! bundle folders, and the registry that picks a runner for an identifier.
//!
//! ```rust,no_run
//! use polyrun_runners::{RegistryBuilder, RunOptions};
//!
//! let registry = RegistryBuilder::new().with_defaults().build();
//! let mut options = RunOptions::default();
//! let code = registry.run("scripts/login.py", &[], &mut options);
//! if code != 0 {
//!     eprintln!("failed at line {}", options.error_line);
//! }
//! ```

pub mod backends;
pub mod contract;
pub mod delegation;
pub mod error;
pub mod error_line;
pub mod invalid;
pub mod lifecycle;
pub mod location;
pub mod options;
pub mod registry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use contract::{RunnerDescriptor, ScriptRunner};
pub use delegation::AbortForwarder;
pub use error::RunnerError;
pub use invalid::InvalidRunner;
pub use lifecycle::{Backend, Lifecycle};
pub use location::fetcher::{HttpFetcher, UrlFetcher};
pub use options::{RunOptions, UNKNOWN_LINE};
pub use registry::{RegistryBuilder, RegistryContext, RunnerInfo, RunnerRegistry};
