//! polyrun CLI binary
//!
//! All logic is in the library; main.rs only maps the result to the process
//! exit status.

fn main() {
    // cli::run() prints everything, including errors
    if let Err(code) = polyrun::cli::run() {
        std::process::exit(code.as_process_status());
    }
}
