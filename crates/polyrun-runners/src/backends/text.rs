//! Plain text: a type the registry knows so editors can open `.txt` files,
//! with nothing to execute. Every operation logs "not supported".

use crate::contract::RunnerDescriptor;
use crate::lifecycle::Backend;

pub const DESCRIPTOR: RunnerDescriptor = RunnerDescriptor::new("Text", "text/plain", &["txt"]);

#[derive(Debug, Default)]
pub struct TextBackend;

impl Backend for TextBackend {
    fn descriptor(&self) -> &RunnerDescriptor {
        &DESCRIPTOR
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn is_local_file(&self) -> bool {
        true
    }
}
