//! Event and verdict types for the solver line protocol.

use serde::{Deserialize, Serialize};

/// Exit status when no solver produced a verdict.
pub const EXIT_NO_VERDICT: u8 = 0;
/// Exit status for a satisfiable instance.
pub const EXIT_SATISFIABLE: u8 = 10;
/// Exit status for an unsatisfiable instance.
pub const EXIT_UNSATISFIABLE: u8 = 20;

/// Decisive answer carried by a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Satisfiable,
    Unsatisfiable,
}

impl Verdict {
    /// Classify the three bytes that follow the `s ` marker.
    ///
    /// Only the prefix is inspected, so `s SATISFIABLE` and `s SAT` both
    /// count, while `s UNKNOWN` yields `None`.
    pub fn from_marker(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"SAT" => Some(Self::Satisfiable),
            b"UNS" => Some(Self::Unsatisfiable),
            _ => None,
        }
    }

    /// Process exit status reported for this verdict.
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Satisfiable => EXIT_SATISFIABLE,
            Self::Unsatisfiable => EXIT_UNSATISFIABLE,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Satisfiable => f.write_str("SATISFIABLE"),
            Self::Unsatisfiable => f.write_str("UNSATISFIABLE"),
        }
    }
}

/// Kind of protocol line the scanner is inside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `s ` line, carries the verdict.
    Status,
    /// `v ` line, carries solution values.
    Value,
}

impl LineKind {
    pub(crate) const fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            b's' => Some(Self::Status),
            b'v' => Some(Self::Value),
            _ => None,
        }
    }
}

/// Output of one [`LineScanner::scan`](super::LineScanner::scan) call, in
/// stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A status line reached its verdict bytes. Emitted once per status line,
    /// possibly before the line's newline has been read.
    Verdict(Verdict),
    /// Bytes to relay verbatim to the answer stream.
    Forward(Vec<u8>),
}
