//! Solver subprocesses: spawning, output pumping, reaping and kill.

pub mod instance;
pub mod manager;

pub use instance::{START_FAILURE_STATUS, Termination, WorkerInstance};
pub use manager::{SubprocessError, SubprocessManager, WorkerEvent};
