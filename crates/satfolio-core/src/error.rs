//! Error types for the `satfolio` core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `satfolio` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Core budget has no plan in the portfolio
    #[error("Input error: only {allowed} are allowed (got {budget})")]
    UnsupportedBudget { budget: usize, allowed: String },

    /// Portfolio table references something that does not exist
    #[error("Portfolio error: {0}")]
    Portfolio(String),

    /// Command template produced nothing to execute
    #[error("Empty command line for solver {0}")]
    EmptyCommand(String),
}
