//! `satfolio` Core Library
//!
//! Shared functionality for the portfolio runner:
//! - Incremental scanner for the solver `s `/`v ` line protocol
//! - Single-winner race state
//! - Placement table (core budget to solver plan)
//! - Command template substitution
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod error;
pub mod placement;
pub mod protocol;
pub mod race;
pub mod template;
pub mod tracing_init;

pub use config::Settings;
pub use error::{Error, Result};
pub use placement::{PlacementPolicy, Portfolio, WorkerSpec};
pub use protocol::{LineScanner, ScanEvent, Verdict};
pub use race::{LockOutcome, Race, WorkerId};
