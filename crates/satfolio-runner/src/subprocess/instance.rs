//! Runtime state of one solver in the race.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use satfolio_core::{LineScanner, WorkerId, WorkerSpec};
use tokio::sync::oneshot;
use tracing::debug;

use crate::affinity::CoreSet;

/// Exit status a solver reports when its program could not be started.
pub const START_FAILURE_STATUS: i32 = 99;

/// How a reaped solver ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited with the start-failure sentinel.
    StartFailure,
    /// Exited normally with a status code.
    Exited(i32),
    /// Killed by a signal.
    Signaled(i32),
    /// The wait itself failed; the process is gone from our point of view.
    Unknown,
}

impl Termination {
    pub fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(START_FAILURE_STATUS), _) => Self::StartFailure,
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartFailure => write!(f, "failed to start (status {START_FAILURE_STATUS})"),
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "killed by signal {signal}"),
            Self::Unknown => f.write_str("unknown termination"),
        }
    }
}

/// One solver of the run: spec, cores, process, parser and race flags.
///
/// `hung_up`, `terminated` and `answering` only ever go from false to true.
#[derive(Debug)]
pub struct WorkerInstance {
    pub id: WorkerId,
    pub spec: WorkerSpec,
    pub cores: CoreSet,
    pid: Option<u32>,
    scanner: LineScanner,
    answering: bool,
    hung_up: bool,
    terminated: bool,
    cancelled: bool,
    termination: Option<Termination>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl WorkerInstance {
    /// A solver that has not been spawned yet.
    pub const fn new(id: WorkerId, spec: WorkerSpec, cores: CoreSet) -> Self {
        Self {
            id,
            spec,
            cores,
            pid: None,
            scanner: LineScanner::new(),
            answering: false,
            hung_up: false,
            terminated: false,
            cancelled: false,
            termination: None,
            kill_tx: None,
        }
    }

    /// Record the running process and return the receiving end of its kill
    /// switch, to be held by the task that waits on the process.
    pub fn attach(&mut self, pid: Option<u32>) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pid = pid;
        self.kill_tx = Some(tx);
        rx
    }

    /// The solver never started: it has no output and no process to reap.
    pub fn mark_start_failed(&mut self) {
        self.hung_up = true;
        self.terminated = true;
        self.termination = Some(Termination::StartFailure);
    }

    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub const fn scanner_mut(&mut self) -> &mut LineScanner {
        &mut self.scanner
    }

    pub const fn is_answering(&self) -> bool {
        self.answering
    }

    pub const fn mark_answering(&mut self) {
        self.answering = true;
    }

    pub const fn is_hung_up(&self) -> bool {
        self.hung_up
    }

    pub fn mark_hung_up(&mut self) {
        if !self.hung_up {
            debug!(worker = self.id, pid = ?self.pid, "Output closed");
        }
        self.hung_up = true;
    }

    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether a kill was requested for this solver.
    pub const fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub const fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Both the output channel and the process are gone.
    pub const fn is_retired(&self) -> bool {
        self.hung_up && self.terminated
    }

    /// Mark the process reaped. Only flags are touched.
    pub fn reap(&mut self, termination: Termination) -> Termination {
        self.terminated = true;
        self.kill_tx = None;
        *self.termination.get_or_insert(termination)
    }

    /// Ask the waiter task to kill this solver.
    ///
    /// Returns `false` when there is nothing left to kill.
    pub fn cancel(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        let Some(tx) = self.kill_tx.take() else {
            return false;
        };
        self.cancelled = true;
        tx.send(()).is_ok()
    }
}
