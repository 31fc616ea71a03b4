//! The supervising event loop.
//!
//! All parsing and every race mutation happen here, on one task. Reader and
//! waiter tasks only feed [`WorkerEvent`]s into the queue. Each wake handles
//! one event, drains whatever else is already queued, then runs the loser
//! sweep if the race locked during that wake.

use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;

use satfolio_core::{Race, ScanEvent, Verdict, WorkerId};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::output::AnswerSink;
use crate::subprocess::{Termination, WorkerEvent, WorkerInstance};

/// Outcome of a finished race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub verdict: Option<Verdict>,
    pub winner: Option<WorkerId>,
    pub exit_code: u8,
    /// Solvers a kill was requested for, by sweep or interrupt.
    pub cancelled: Vec<WorkerId>,
    pub sweeps: usize,
}

/// Event loop over a fixed set of solver instances.
///
/// Instance ids are their indices in `instances`.
pub struct Engine<W: Write> {
    instances: Vec<WorkerInstance>,
    race: Race,
    sink: AnswerSink<W>,
    events: mpsc::Receiver<WorkerEvent>,
    reap_grace: Duration,
    interrupted: bool,
    sweeps: usize,
}

impl<W: Write> Engine<W> {
    pub fn new(
        instances: Vec<WorkerInstance>,
        sink: AnswerSink<W>,
        events: mpsc::Receiver<WorkerEvent>,
        reap_grace: Duration,
    ) -> Self {
        Self {
            instances,
            race: Race::new(),
            sink,
            events,
            reap_grace,
            interrupted: false,
            sweeps: 0,
        }
    }

    pub fn instances(&self) -> &[WorkerInstance] {
        &self.instances
    }

    pub const fn race(&self) -> &Race {
        &self.race
    }

    pub const fn sink_mut(&mut self) -> &mut AnswerSink<W> {
        &mut self.sink
    }

    pub fn into_sink(self) -> AnswerSink<W> {
        self.sink
    }

    /// Run until every solver's output is closed.
    ///
    /// When `shutdown` completes every live solver is killed, and the loop
    /// keeps draining until their outputs close.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> RunReport {
        tokio::pin!(shutdown);

        while self.open_outputs() > 0 {
            let event = tokio::select! {
                biased;
                event = self.events.recv() => event,
                () = &mut shutdown, if !self.interrupted => {
                    self.interrupt();
                    continue;
                }
            };
            let Some(event) = event else {
                warn!(open = self.open_outputs(), "Event queue closed with outputs still open");
                break;
            };
            self.handle_event(event);
            while let Ok(event) = self.events.try_recv() {
                self.handle_event(event);
            }
            self.finish_wake();
        }

        self.collect_exits().await;
        let report = self.report();
        info!(
            exit_code = report.exit_code,
            winner = ?report.winner,
            cancelled = report.cancelled.len(),
            "Race finished"
        );
        report
    }

    fn open_outputs(&self) -> usize {
        self.instances.iter().filter(|i| !i.is_hung_up()).count()
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Output { id, bytes } => self.on_output(id, &bytes),
            WorkerEvent::Closed { id, error } => {
                if let Some(instance) = self.instances.get_mut(id) {
                    if let Some(e) = error {
                        debug!(worker = id, error = %e, "Output closed on error");
                    }
                    instance.mark_hung_up();
                }
            }
            WorkerEvent::Exited { id, status } => self.on_exit(id, status),
        }
    }

    fn on_output(&mut self, id: WorkerId, bytes: &[u8]) {
        let Some(instance) = self.instances.get_mut(id) else {
            warn!(worker = id, "Output from unknown solver");
            return;
        };
        if !self.race.may_forward(id) {
            debug!(worker = id, len = bytes.len(), "Discarding output after lock");
            return;
        }

        for event in instance.scanner_mut().scan(bytes) {
            match event {
                ScanEvent::Verdict(verdict) => {
                    if !self.race.on_verdict(id, verdict).is_owner() {
                        break;
                    }
                    instance.mark_answering();
                }
                ScanEvent::Forward(data) => {
                    if !self.race.may_forward(id) {
                        break;
                    }
                    self.sink.forward(&data);
                }
            }
        }
    }

    fn on_exit(&mut self, id: WorkerId, status: io::Result<std::process::ExitStatus>) {
        let Some(instance) = self.instances.get_mut(id) else {
            warn!(worker = id, "Exit of unknown solver");
            return;
        };
        let termination = match status {
            Ok(status) => Termination::from_status(status),
            Err(e) => {
                warn!(worker = id, error = %e, "Waiting for solver failed");
                Termination::Unknown
            }
        };
        let termination = instance.reap(termination);
        debug!(worker = id, solver = %instance.spec.name, %termination, "Solver terminated");
        if termination == Termination::StartFailure {
            let name = instance.spec.name.clone();
            self.sink.comment(format_args!("failed to start solver: {name}"));
        }
    }

    /// End of a wake: cancel the losers once the race has locked.
    fn finish_wake(&mut self) {
        if !self.race.take_sweep() {
            return;
        }
        self.sweeps += 1;
        for instance in &mut self.instances {
            if instance.is_terminated() || instance.is_answering() {
                continue;
            }
            if instance.cancel() {
                debug!(worker = instance.id, solver = %instance.spec.name, "Cancelled losing solver");
            }
        }
    }

    fn interrupt(&mut self) {
        self.interrupted = true;
        warn!("Interrupted, killing all solvers");
        for instance in &mut self.instances {
            instance.cancel();
        }
    }

    /// Pick up exit notifications already in flight, for at most the grace
    /// period, so late start failures are still reported.
    async fn collect_exits(&mut self) {
        let deadline = Instant::now() + self.reap_grace;
        while self.instances.iter().any(|i| !i.is_terminated()) {
            match timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) => break,
                Err(_) => {
                    let pending: Vec<_> = self
                        .instances
                        .iter()
                        .filter(|i| !i.is_terminated())
                        .map(|i| i.id)
                        .collect();
                    debug!(?pending, "Reap grace elapsed");
                    break;
                }
            }
        }
    }

    fn report(&self) -> RunReport {
        RunReport {
            verdict: self.race.result(),
            winner: self.race.owner(),
            exit_code: self.race.exit_code(),
            cancelled: self
                .instances
                .iter()
                .filter(|i| i.was_cancelled())
                .map(|i| i.id)
                .collect(),
            sweeps: self.sweeps,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    use satfolio_core::WorkerSpec;
    use tokio::sync::oneshot;

    use crate::affinity::CoreSet;

    const A: WorkerId = 0;
    const B: WorkerId = 1;

    struct Harness {
        engine: Engine<Vec<u8>>,
        tx: mpsc::Sender<WorkerEvent>,
        kills: Vec<oneshot::Receiver<()>>,
    }

    fn harness(names: &[&str]) -> Harness {
        let (tx, rx) = mpsc::channel(64);
        let mut kills = Vec::new();
        let instances = names
            .iter()
            .enumerate()
            .map(|(id, name)| {
                let spec = WorkerSpec::new(name, "tester", "bin/solver BENCHNAME");
                let mut instance = WorkerInstance::new(id, spec, CoreSet::default());
                kills.push(instance.attach(None));
                instance
            })
            .collect();
        let engine = Engine::new(
            instances,
            AnswerSink::new(Vec::new()),
            rx,
            Duration::from_millis(20),
        );
        Harness { engine, tx, kills }
    }

    fn output(id: WorkerId, bytes: &[u8]) -> WorkerEvent {
        WorkerEvent::Output {
            id,
            bytes: bytes.to_vec(),
        }
    }

    fn closed(id: WorkerId) -> WorkerEvent {
        WorkerEvent::Closed { id, error: None }
    }

    fn exited(id: WorkerId, code: i32) -> WorkerEvent {
        WorkerEvent::Exited {
            id,
            status: Ok(ExitStatus::from_raw(code << 8)),
        }
    }

    fn written(engine: &Engine<Vec<u8>>) -> String {
        String::from_utf8(engine.sink.get_ref().clone()).unwrap()
    }

    async fn run_queued(h: &mut Harness, events: Vec<WorkerEvent>) -> RunReport {
        for event in events {
            h.tx.send(event).await.unwrap();
        }
        let (tx, _) = mpsc::channel(1);
        drop(std::mem::replace(&mut h.tx, tx));
        h.engine.run(std::future::pending()).await
    }

    #[tokio::test]
    async fn value_line_forwarded_then_first_verdict_wins() {
        let mut h = harness(&["A", "B"]);
        let report = run_queued(
            &mut h,
            vec![
                output(B, b"v 1 2 0\n"),
                output(A, b"c junk\n"),
                output(A, b"s SATISFIABLE\n"),
                closed(A),
                closed(B),
            ],
        )
        .await;

        assert_eq!(written(&h.engine), "v 1 2 0\ns SATISFIABLE\n");
        assert_eq!(report.exit_code, 10);
        assert_eq!(report.verdict, Some(Verdict::Satisfiable));
        assert_eq!(report.winner, Some(A));
        assert_eq!(report.cancelled, vec![B]);
        assert_eq!(report.sweeps, 1);
        assert!(h.kills[B].try_recv().is_ok());
        assert!(h.kills[A].try_recv().is_err());
    }

    #[tokio::test]
    async fn loser_bytes_never_reach_the_stream() {
        let mut h = harness(&["A", "B"]);
        let report = run_queued(
            &mut h,
            vec![
                output(A, b"s UNSATISFIABLE\n"),
                output(B, b"v 3 0\ns SATISFIABLE\nv 4 0\n"),
                output(A, b"c done\n"),
                closed(B),
                closed(A),
            ],
        )
        .await;

        assert_eq!(written(&h.engine), "s UNSATISFIABLE\n");
        assert_eq!(report.exit_code, 20);
        assert_eq!(h.engine.race().result(), Some(Verdict::Unsatisfiable));
    }

    #[tokio::test]
    async fn same_wake_tie_goes_to_first_dequeued() {
        let mut h = harness(&["A", "B"]);
        let report = run_queued(
            &mut h,
            vec![
                output(B, b"s UNSAT"),
                output(A, b"s SATISFIABLE\n"),
                output(B, b"ISFIABLE\n"),
                closed(A),
                closed(B),
            ],
        )
        .await;

        assert_eq!(report.winner, Some(B));
        assert_eq!(report.exit_code, 20);
        assert_eq!(written(&h.engine), "s UNSATISFIABLE\n");
        assert_eq!(report.cancelled, vec![A]);
    }

    #[tokio::test]
    async fn split_verdict_fires_once_bytes_arrive() {
        let mut h = harness(&["A"]);
        h.engine.handle_event(output(A, b"c thinking\ns S"));
        assert!(!h.engine.race().is_locked());
        h.engine.handle_event(output(A, b"ATISFIABLE\n"));
        assert_eq!(h.engine.race().result(), Some(Verdict::Satisfiable));
        assert_eq!(written(&h.engine), "s SATISFIABLE\n");
    }

    #[tokio::test]
    async fn sweep_fires_once_across_wakes() {
        let mut h = harness(&["A", "B", "C"]);
        h.engine.handle_event(output(A, b"s SATISFIABLE\n"));
        h.engine.finish_wake();
        h.engine.handle_event(output(B, b"s UNSATISFIABLE\n"));
        h.engine.finish_wake();
        h.engine.handle_event(output(C, b"s SATISFIABLE\n"));
        h.engine.finish_wake();

        assert_eq!(h.engine.sweeps, 1);
        assert_eq!(h.engine.race().owner(), Some(A));
        assert_eq!(written(&h.engine), "s SATISFIABLE\n");
    }

    const C: WorkerId = 2;

    #[tokio::test]
    async fn ignored_lines_contribute_nothing() {
        let mut h = harness(&["A"]);
        let report = run_queued(
            &mut h,
            vec![
                output(A, b"c comment\nsolving...\ns"),
                output(A, b"\nvalue 1\n"),
                closed(A),
                exited(A, 0),
            ],
        )
        .await;

        assert_eq!(written(&h.engine), "");
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.sweeps, 0);
        assert!(report.cancelled.is_empty());
    }

    #[tokio::test]
    async fn start_failure_sentinel_is_reported() {
        let mut h = harness(&["A", "broken"]);
        let report = run_queued(
            &mut h,
            vec![closed(B), exited(B, 99), closed(A), exited(A, 0)],
        )
        .await;

        assert_eq!(written(&h.engine), "c failed to start solver: broken\n");
        assert_eq!(report.exit_code, 0);
        assert_eq!(
            h.engine.instances()[B].termination(),
            Some(Termination::StartFailure)
        );
    }

    #[tokio::test]
    async fn exits_after_close_are_collected_in_grace() {
        let mut h = harness(&["A"]);
        h.tx.send(closed(A)).await.unwrap();
        let tx = h.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tx.send(exited(A, 99)).await.unwrap();
        });
        h.engine.reap_grace = Duration::from_secs(5);
        h.engine.run(std::future::pending()).await;

        assert!(h.engine.instances()[A].is_terminated());
        assert_eq!(written(&h.engine), "c failed to start solver: A\n");
    }

    #[tokio::test]
    async fn terminated_solvers_are_not_swept() {
        let mut h = harness(&["A", "B"]);
        let report = run_queued(
            &mut h,
            vec![
                output(B, b"c nothing\n"),
                closed(B),
                exited(B, 0),
                output(A, b"s SAT\n"),
                closed(A),
            ],
        )
        .await;

        assert_eq!(report.sweeps, 1);
        assert!(report.cancelled.is_empty());
    }

    #[tokio::test]
    async fn interrupt_cancels_every_live_solver() {
        let mut h = harness(&["A", "B"]);
        let tx = h.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(closed(A)).await.unwrap();
            tx.send(closed(B)).await.unwrap();
        });
        let report = h.engine.run(std::future::ready(())).await;

        assert_eq!(report.cancelled, vec![A, B]);
        assert_eq!(report.exit_code, 0);
        assert!(h.kills[A].try_recv().is_ok());
        assert!(h.kills[B].try_recv().is_ok());
    }

    #[test]
    fn partial_value_line_is_dropped_at_lock() {
        let mut h = harness(&["A", "B"]);
        h.engine.handle_event(output(B, b"v 1 2"));
        h.engine.handle_event(output(A, b"s SATISFIABLE\n"));
        h.engine.handle_event(output(B, b" 0\n"));
        h.engine.finish_wake();

        assert_eq!(written(&h.engine), "s SATISFIABLE\n");
        assert_eq!(h.engine.race().exit_code(), 10);
    }

    #[test]
    fn interleaved_value_lines_stay_whole() {
        let mut h = harness(&["A", "B"]);
        h.engine.handle_event(output(A, b"v 1"));
        h.engine.handle_event(output(B, b"v 2 0\n"));
        h.engine.handle_event(output(A, b" 0\n"));

        assert_eq!(written(&h.engine), "v 2 0\nv 1 0\n");
    }

    const A_STREAM: &[u8] = b"c a\nv 1 0\ns SATISFIABLE\nv 2 0\n";
    const B_STREAM: &[u8] = b"v 3 0\ns UNSATISFIABLE\nv 4 0\n";
    const A_LINES: [&str; 3] = ["v 1 0", "s SATISFIABLE", "v 2 0"];
    const B_LINES: [&str; 3] = ["v 3 0", "s UNSATISFIABLE", "v 4 0"];

    /// Check the answer stream of a finished two-solver race.
    fn assert_clean_stream(engine: &Engine<Vec<u8>>, case: &str) {
        let text = written(engine);
        assert!(text.ends_with('\n'), "{case}: torn line in {text:?}");

        let owner = engine.race().owner().expect("a solver locked");
        let (own, other, code) = if owner == A {
            (A_LINES, B_LINES, 10)
        } else {
            (B_LINES, A_LINES, 20)
        };

        let mut locked = false;
        let mut own_seen = Vec::new();
        for line in text.lines() {
            if own.contains(&line) {
                locked |= line.starts_with("s ");
                own_seen.push(line);
            } else {
                assert!(other.contains(&line), "{case}: mixed line {line:?} in {text:?}");
                assert!(!line.starts_with("s "), "{case}: loser status in {text:?}");
                assert!(!locked, "{case}: loser line {line:?} after lock in {text:?}");
            }
        }
        assert_eq!(own_seen, own, "{case}");
        assert_eq!(engine.race().exit_code(), code, "{case}");
    }

    #[test]
    fn every_split_and_order_keeps_lines_whole() {
        for split_a in 0..=A_STREAM.len() {
            for split_b in 0..=B_STREAM.len() {
                let chunks = [A_STREAM.split_at(split_a), B_STREAM.split_at(split_b)];
                // Each order dequeues two chunks per solver, in stream order.
                for order in (0u32..16).filter(|m| m.count_ones() == 2) {
                    let mut h = harness(&["A", "B"]);
                    let mut next = [0usize; 2];
                    for slot in 0..4 {
                        let id = if (order >> slot) & 1 == 1 { A } else { B };
                        let (first, second) = chunks[id];
                        let chunk = if next[id] == 0 { first } else { second };
                        next[id] += 1;
                        h.engine.handle_event(output(id, chunk));
                        h.engine.finish_wake();
                    }
                    let case = format!("A split {split_a}, B split {split_b}, order {order:04b}");
                    assert_clean_stream(&h.engine, &case);
                    assert_eq!(h.engine.sweeps, 1, "{case}");
                }
            }
        }
    }
}
