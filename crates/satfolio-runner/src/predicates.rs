//! Instance predicates evaluated by external programs.
//!
//! A predicate runs as `program <input>` and holds when the program exits
//! with a non-zero status, the way a shell `system()` test reads it.

use std::path::Path;
use std::process::Stdio;

use satfolio_core::placement::Predicate;
use satfolio_core::Settings;
use tokio::process::Command;
use tracing::{debug, warn};

/// Run `program input` and report whether it exited non-zero.
///
/// A program that cannot be launched counts as holding, like the shell's
/// 127 status would. Its stdout is discarded.
pub async fn holds(program: &Path, input: &Path) -> bool {
    let status = Command::new(program)
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) => {
            debug!(program = %program.display(), ?status, "Predicate finished");
            !status.success()
        }
        Err(e) => {
            warn!(program = %program.display(), error = %e, "Predicate could not be launched, treating as true");
            true
        }
    }
}

/// Values of the two instance predicates for one input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceTraits {
    pub uniform: bool,
    pub too_large: bool,
}

impl InstanceTraits {
    /// Evaluate only the predicates listed in `needed`; the others stay false.
    pub async fn evaluate(
        settings: &Settings,
        needed: impl IntoIterator<Item = Predicate>,
        input: &Path,
    ) -> Self {
        let mut traits = Self::default();
        for predicate in needed {
            match predicate {
                Predicate::Uniform => {
                    traits.uniform = holds(&settings.uniform_predicate, input).await;
                }
                Predicate::TooLarge => {
                    traits.too_large = holds(&settings.too_large_predicate, input).await;
                }
            }
        }
        traits
    }
}
