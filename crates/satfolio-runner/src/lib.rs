//! satfolio runner library
//!
//! Races a portfolio of SAT solver subprocesses on one input:
//! - Core discovery and per-solver pinning
//! - Solver spawning, output pumping and process-group kill
//! - The single-task event loop that parses output and locks the winner
//! - The answer stream shared by forwarded lines and `c ` comments

pub mod affinity;
pub mod engine;
pub mod output;
pub mod predicates;
pub mod runner;
pub mod subprocess;
