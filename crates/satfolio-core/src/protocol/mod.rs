//! Scanner for the solver output protocol.
//!
//! Solvers write newline-terminated text on a merged stdout/stderr channel.
//! Only two line kinds matter: status lines (`s SATISFIABLE`,
//! `s UNSATISFIABLE`, `s UNKNOWN`) and value lines (`v 1 -2 3 0`). Everything
//! else is dropped. Lines arrive split at arbitrary read boundaries, so the
//! scanner is an incremental state machine fed one chunk at a time.

mod scanner;
mod types;

pub use scanner::LineScanner;
pub use types::*;
