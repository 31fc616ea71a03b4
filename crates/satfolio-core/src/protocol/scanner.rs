//! Incremental line scanner.
//!
//! The scanner never does I/O. It is fed raw chunks exactly as they were
//! read from a solver's pipe and returns the events found in them. State
//! carried between chunks is the current line kind, the one byte of
//! look-behind needed to confirm a `s `/`v ` marker, and the partial protocol
//! line. Protocol lines are only ever forwarded whole, newline included, so
//! lines from different solvers can never mix on the answer stream.

use super::types::{LineKind, ScanEvent, Verdict};

/// Offset of the verdict bytes inside a status line (`s SAT...`).
const VERDICT_START: usize = 2;
/// Number of status line bytes needed before the verdict can be decided.
const VERDICT_END: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// At the first byte of a line.
    LineStart,
    /// Saw `s` or `v` at line start; the next byte decides.
    Marker(LineKind),
    /// Inside a line that is not part of the protocol.
    Skip,
    /// Inside a status line.
    InStatus,
    /// Inside a value line.
    InValue,
}

/// Per-solver protocol scanner.
#[derive(Debug, Clone)]
pub struct LineScanner {
    state: State,
    /// Accumulated bytes of the current protocol line, marker included.
    line: Vec<u8>,
    /// Verdict of the current status line, once its verdict bytes are known.
    status_verdict: Option<Verdict>,
}

impl Default for LineScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LineScanner {
    /// Create a scanner positioned at the start of a line, so the very first
    /// line of the stream can already be a protocol line.
    pub const fn new() -> Self {
        Self {
            state: State::LineStart,
            line: Vec::new(),
            status_verdict: None,
        }
    }

    /// Kind of protocol line currently open, if any.
    pub const fn open_line(&self) -> Option<LineKind> {
        match self.state {
            State::InStatus => Some(LineKind::Status),
            State::InValue => Some(LineKind::Value),
            State::LineStart | State::Marker(_) | State::Skip => None,
        }
    }

    /// Feed one chunk and collect the events it completes.
    pub fn scan(&mut self, chunk: &[u8]) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        let mut pos = 0;

        while pos < chunk.len() {
            match self.state {
                State::LineStart => {
                    self.state = match chunk[pos] {
                        b'\n' => State::LineStart,
                        byte => LineKind::from_marker(byte).map_or(State::Skip, State::Marker),
                    };
                    pos += 1;
                }
                State::Marker(kind) => {
                    self.state = match chunk[pos] {
                        b' ' => self.open(kind),
                        b'\n' => State::LineStart,
                        _ => State::Skip,
                    };
                    pos += 1;
                }
                State::Skip => {
                    let (end, complete) = line_end(chunk, pos);
                    if complete {
                        self.state = State::LineStart;
                    }
                    pos = end;
                }
                State::InValue => {
                    let (end, complete) = line_end(chunk, pos);
                    self.line.extend_from_slice(&chunk[pos..end]);
                    if complete {
                        push_forward(&mut events, &self.line);
                        self.line.clear();
                        self.state = State::LineStart;
                    }
                    pos = end;
                }
                State::InStatus => {
                    let (end, complete) = line_end(chunk, pos);
                    self.extend_status(&chunk[pos..end], &mut events);
                    if complete {
                        self.close_status(&mut events);
                    }
                    pos = end;
                }
            }
        }

        events
    }

    fn open(&mut self, kind: LineKind) -> State {
        self.line.clear();
        self.status_verdict = None;
        match kind {
            LineKind::Status => {
                self.line.extend_from_slice(b"s ");
                State::InStatus
            }
            LineKind::Value => {
                self.line.extend_from_slice(b"v ");
                State::InValue
            }
        }
    }

    fn extend_status(&mut self, bytes: &[u8], events: &mut Vec<ScanEvent>) {
        let before = self.line.len();
        self.line.extend_from_slice(bytes);

        // Decide exactly once, the first time the verdict bytes are present.
        if before < VERDICT_END && self.line.len() >= VERDICT_END {
            self.status_verdict = Verdict::from_marker(&self.line[VERDICT_START..VERDICT_END]);
            if let Some(verdict) = self.status_verdict {
                events.push(ScanEvent::Verdict(verdict));
            }
        }
    }

    fn close_status(&mut self, events: &mut Vec<ScanEvent>) {
        // Undecided status lines (`s UNKNOWN`) are absorbed.
        if self.status_verdict.is_some() {
            push_forward(events, &self.line);
        }
        self.line.clear();
        self.status_verdict = None;
        self.state = State::LineStart;
    }
}

/// Find the end of the current line within `chunk[from..]`.
///
/// Returns the index one past the newline and `true`, or the chunk length
/// and `false` when the line continues in the next chunk.
fn line_end(chunk: &[u8], from: usize) -> (usize, bool) {
    chunk[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or((chunk.len(), false), |offset| (from + offset + 1, true))
}

fn push_forward(events: &mut Vec<ScanEvent>, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    if let Some(ScanEvent::Forward(last)) = events.last_mut() {
        last.extend_from_slice(bytes);
    } else {
        events.push(ScanEvent::Forward(bytes.to_vec()));
    }
}
