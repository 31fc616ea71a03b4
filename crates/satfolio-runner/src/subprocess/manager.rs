//! Solver subprocess spawning and monitoring.
//!
//! Each solver gets one pipe carrying both stdout and stderr. Two small tasks
//! per solver move everything the engine needs onto one queue: a reader that
//! forwards raw output chunks, and a waiter that reports the exit status and
//! carries out kill requests. The engine is the only consumer.

use std::io;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use satfolio_core::template::{self, Substitutions};
use satfolio_core::{Settings, WorkerId};
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::instance::WorkerInstance;

/// Something that happened to a solver, as seen by the engine.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Raw bytes read from the solver's merged output.
    Output { id: WorkerId, bytes: Vec<u8> },
    /// The output channel reached EOF (`error` is `None`) or failed.
    Closed {
        id: WorkerId,
        error: Option<io::Error>,
    },
    /// The process was reaped.
    Exited {
        id: WorkerId,
        status: io::Result<ExitStatus>,
    },
}

/// Spawns solver processes and wires them to the engine's event queue.
pub struct SubprocessManager {
    events: mpsc::Sender<WorkerEvent>,
    scratch_dir: PathBuf,
    scratch_env_var: String,
    benchmark_placeholder: String,
    scratch_placeholder: String,
    read_buffer_size: usize,
}

impl SubprocessManager {
    /// Create a manager that reports to `events`.
    pub fn new(settings: &Settings, events: mpsc::Sender<WorkerEvent>) -> Self {
        Self {
            events,
            scratch_dir: settings.scratch_dir.clone(),
            scratch_env_var: settings.scratch_env_var.clone(),
            benchmark_placeholder: settings.benchmark_placeholder.clone(),
            scratch_placeholder: settings.scratch_placeholder.clone(),
            read_buffer_size: settings.read_buffer_size,
        }
    }

    /// Start `instance`'s solver on `benchmark`.
    ///
    /// On error nothing is left running and no event will ever be reported
    /// for the instance.
    pub fn spawn(
        &self,
        instance: &mut WorkerInstance,
        benchmark: &str,
    ) -> Result<(), SubprocessError> {
        let scratch_dir = self.scratch_dir.to_string_lossy();
        let command = template::expand(
            &instance.spec.name,
            &instance.spec.command,
            &Substitutions {
                benchmark_placeholder: &self.benchmark_placeholder,
                benchmark,
                scratch_placeholder: &self.scratch_placeholder,
                scratch_dir: &scratch_dir,
            },
        )?;

        let (reader, writer) = io::pipe().map_err(SubprocessError::Pipe)?;

        // The command holds the write ends; it must be dropped before the
        // reader can ever see EOF.
        let child = {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .env(&self.scratch_env_var, &self.scratch_dir)
                .stdin(Stdio::null())
                .stdout(writer.try_clone().map_err(SubprocessError::Pipe)?)
                .stderr(writer)
                .process_group(0);
            pin_child(&mut cmd, instance);

            info!(
                worker = instance.id,
                solver = %instance.spec.name,
                program = %command.program,
                args = ?command.args,
                cores = %instance.cores,
                "Spawning solver subprocess"
            );
            cmd.spawn().map_err(|e| SubprocessError::SpawnFailed {
                solver: instance.spec.name.clone(),
                source: e,
            })?
        };

        let receiver =
            pipe::Receiver::from_owned_fd(OwnedFd::from(reader)).map_err(SubprocessError::Pipe)?;

        let kill_rx = instance.attach(child.id());
        tokio::spawn(pump_output(
            instance.id,
            receiver,
            self.read_buffer_size,
            self.events.clone(),
        ));
        tokio::spawn(watch_exit(instance.id, child, kill_rx, self.events.clone()));

        debug!(worker = instance.id, pid = ?instance.pid(), "Solver started");
        Ok(())
    }
}

/// Apply the solver's core set in the child, between fork and exec.
#[cfg(target_os = "linux")]
fn pin_child(cmd: &mut Command, instance: &WorkerInstance) {
    use nix::sched::sched_setaffinity;
    use nix::unistd::Pid;

    if instance.cores.is_empty() {
        return;
    }
    // Build the mask here: the child may only make async-signal-safe calls.
    let mask = match instance.cores.to_cpu_set() {
        Ok(mask) => mask,
        Err(e) => {
            warn!(worker = instance.id, cores = %instance.cores, error = %e, "Invalid core set, running unpinned");
            return;
        }
    };

    // SAFETY: the closure runs in the forked child before exec. It only
    // performs the sched_setaffinity syscall on a mask built in the parent,
    // which allocates nothing and takes no locks. Failure is ignored, the
    // solver then simply runs unpinned.
    #[allow(unsafe_code)]
    unsafe {
        cmd.pre_exec(move || {
            let _ = sched_setaffinity(Pid::from_raw(0), &mask);
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_child(_cmd: &mut Command, _instance: &WorkerInstance) {}

/// Read the solver's output until EOF, forwarding every chunk.
async fn pump_output(
    id: WorkerId,
    mut receiver: pipe::Receiver,
    buffer_size: usize,
    events: mpsc::Sender<WorkerEvent>,
) {
    let mut buf = vec![0u8; buffer_size];
    let error = loop {
        match receiver.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => {
                let bytes = buf[..n].to_vec();
                if events.send(WorkerEvent::Output { id, bytes }).await.is_err() {
                    debug!(worker = id, "Event queue closed, stopping reader");
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => break Some(e),
        }
    };
    if let Some(ref e) = error {
        warn!(worker = id, error = %e, "Solver output failed, closing");
    }
    let _ = events.send(WorkerEvent::Closed { id, error }).await;
}

/// Wait for the solver to exit, killing its process group on request.
async fn watch_exit(
    id: WorkerId,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    events: mpsc::Sender<WorkerEvent>,
) {
    let pid = child.id();
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => {
            kill_group(id, pid, &mut child);
            child.wait().await
        }
    };
    debug!(worker = id, ?pid, ?status, "Solver reaped");
    let _ = events.send(WorkerEvent::Exited { id, status }).await;
}

/// SIGKILL the solver's whole process group, so wrapper scripts do not leave
/// a grandchild holding the output pipe open.
fn kill_group(id: WorkerId, pid: Option<u32>, child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let group = pid.and_then(|p| i32::try_from(p).ok()).map(Pid::from_raw);
    match group.map(|g| killpg(g, Signal::SIGKILL)) {
        Some(Ok(())) => debug!(worker = id, ?pid, "Killed solver process group"),
        Some(Err(e)) => {
            warn!(worker = id, ?pid, error = %e, "killpg failed, killing leader only");
            if let Err(e) = child.start_kill() {
                warn!(worker = id, ?pid, error = %e, "Failed to kill solver");
            }
        }
        None => {
            if let Err(e) = child.start_kill() {
                warn!(worker = id, error = %e, "Failed to kill solver");
            }
        }
    }
}

/// Errors from subprocess operations.
#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("Failed to spawn solver {solver}: {source}")]
    SpawnFailed {
        solver: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create output pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error(transparent)]
    Template(#[from] satfolio_core::Error),
}
