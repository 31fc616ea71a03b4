//! The answer stream.
//!
//! Only the engine writes here. Forwarded protocol lines and the runner's own
//! `c ` comment lines share the stream, so every write is whole and flushed.

use std::fmt::Display;
use std::io::Write;

use tracing::warn;

/// Single-writer sink for the run's answer stream.
#[derive(Debug)]
pub struct AnswerSink<W: Write> {
    out: W,
}

impl<W: Write> AnswerSink<W> {
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Relay solver bytes verbatim.
    ///
    /// Write errors are logged and the run goes on: losing the answer stream
    /// must not stop the race from producing an exit status.
    pub fn forward(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Err(e) = self.out.write_all(bytes).and_then(|()| self.out.flush()) {
            warn!(error = %e, len = bytes.len(), "Failed to write answer stream");
        }
    }

    /// Write a `c ` comment line; multi-line text gets one prefix per line.
    pub fn comment(&mut self, text: impl Display) {
        let text = text.to_string();
        let mut buf = String::with_capacity(text.len() + 4);
        for line in text.lines() {
            buf.push_str("c ");
            buf.push_str(line);
            buf.push('\n');
        }
        if buf.is_empty() {
            buf.push_str("c \n");
        }
        self.forward(buf.as_bytes());
    }

    pub const fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
