//! Bounded capture of a child's stderr.
//!
//! Interpreters report the failing line near the end of their error output,
//! so only the last few KiB are kept. Older bytes are evicted as new ones
//! arrive.

use std::collections::VecDeque;

/// Bytes of stderr kept per child process.
pub const DEFAULT_CAPTURE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct TailBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
    dropped: usize,
}

impl TailBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(8192)),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.capacity {
            self.dropped += self.bytes.len() + chunk.len() - self.capacity;
            self.bytes.clear();
            self.bytes.extend(&chunk[chunk.len() - self.capacity..]);
            return;
        }
        let excess = (self.bytes.len() + chunk.len()).saturating_sub(self.capacity);
        self.bytes.drain(..excess);
        self.dropped += excess;
        self.bytes.extend(chunk);
    }

    /// Number of bytes evicted so far.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The kept bytes as text.
    ///
    /// After an eviction the first, partial line is skipped so callers never
    /// parse half a message.
    #[must_use]
    pub fn text(&self) -> String {
        let bytes: Vec<u8> = self.bytes.iter().copied().collect();
        let start = if self.dropped > 0 {
            bytes
                .iter()
                .position(|b| *b == b'\n')
                .map_or(0, |newline| newline + 1)
        } else {
            0
        };
        String::from_utf8_lossy(&bytes[start..]).into_owned()
    }
}

impl Default for TailBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_output_kept_whole() {
        let mut tail = TailBuffer::new(64);
        tail.push(b"Traceback\n");
        tail.push(b"  line 3\n");
        assert_eq!(tail.text(), "Traceback\n  line 3\n");
        assert_eq!(tail.dropped(), 0);
    }

    #[test]
    fn test_eviction_skips_partial_first_line() {
        let mut tail = TailBuffer::new(16);
        tail.push(b"first line\nsecond\nthird\n");
        assert_eq!(tail.dropped(), 8);
        assert_eq!(tail.text(), "second\nthird\n");
    }

    #[test]
    fn test_many_small_writes_keep_last_error() {
        let mut tail = TailBuffer::new(32);
        for _ in 0..100 {
            tail.push(b"noise noise noise\n");
        }
        tail.push(b"  File \"x.py\", line 7\n");
        assert!(tail.text().ends_with("line 7\n"));
        assert!(tail.dropped() > 0);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut tail = TailBuffer::new(8);
        tail.push(&[0xFF, b'o', b'k']);
        assert!(tail.text().ends_with("ok"));
        assert!(!tail.is_empty());
    }
}
