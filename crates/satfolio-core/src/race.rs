//! Single-winner race state.
//!
//! The first solver to report a verdict locks the race: from then on only
//! its bytes may reach the answer stream, its verdict is the run's result,
//! and every other solver is cancelled exactly once.

use tracing::{debug, info};

use crate::protocol::{EXIT_NO_VERDICT, Verdict};

/// Index of a solver within the run's portfolio.
pub type WorkerId = usize;

/// Result of reporting a verdict to the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// This solver locked the race; its verdict is the result.
    Acquired,
    /// This solver already owned the race; the recorded result is unchanged.
    AlreadyOwner,
    /// Another solver owns the race.
    Lost { owner: WorkerId },
}

impl LockOutcome {
    /// Whether the reporting solver is (still) the one answering.
    pub const fn is_owner(self) -> bool {
        matches!(self, Self::Acquired | Self::AlreadyOwner)
    }
}

/// Process-wide race state for one run.
#[derive(Debug, Default)]
pub struct Race {
    owner: Option<WorkerId>,
    result: Option<Verdict>,
    cancelled_others: bool,
}

impl Race {
    /// Create an unlocked race.
    pub const fn new() -> Self {
        Self {
            owner: None,
            result: None,
            cancelled_others: false,
        }
    }

    /// Record a verdict reported by `id`.
    pub fn on_verdict(&mut self, id: WorkerId, verdict: Verdict) -> LockOutcome {
        match self.owner {
            None => {
                self.owner = Some(id);
                self.result = Some(verdict);
                info!(worker = id, %verdict, "Race locked");
                LockOutcome::Acquired
            }
            Some(owner) if owner == id => LockOutcome::AlreadyOwner,
            Some(owner) => {
                debug!(worker = id, owner, %verdict, "Verdict after lock ignored");
                LockOutcome::Lost { owner }
            }
        }
    }

    /// Whether bytes from `id` may still be relayed.
    pub fn may_forward(&self, id: WorkerId) -> bool {
        self.owner.is_none_or(|owner| owner == id)
    }

    /// Whether some solver has locked the race.
    pub const fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    /// The solver that locked the race.
    pub const fn owner(&self) -> Option<WorkerId> {
        self.owner
    }

    /// The recorded verdict.
    pub const fn result(&self) -> Option<Verdict> {
        self.result
    }

    /// Returns `true` exactly once: on the first call after the race locked.
    ///
    /// The caller must then cancel every solver that is neither terminated
    /// nor answering.
    pub fn take_sweep(&mut self) -> bool {
        if self.owner.is_none() || self.cancelled_others {
            return false;
        }
        self.cancelled_others = true;
        true
    }

    /// Whether the sweep has fired.
    pub const fn swept(&self) -> bool {
        self.cancelled_others
    }

    /// Process exit status for the run.
    pub fn exit_code(&self) -> u8 {
        self.result.map_or(EXIT_NO_VERDICT, Verdict::exit_code)
    }
}
