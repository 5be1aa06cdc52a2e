mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use cli_args::CliArgs;
pub use model::*;

#[cfg(test)]
mod tests;
