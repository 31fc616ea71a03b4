//! One portfolio run, from core budget to exit status.

use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use satfolio_core::{PlacementPolicy, Settings};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::affinity;
use crate::engine::{Engine, RunReport};
use crate::output::AnswerSink;
use crate::predicates::InstanceTraits;
use crate::subprocess::{SubprocessManager, WorkerInstance};

/// Capacity of the queue between solver tasks and the engine.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// What to run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// The benchmark handed to every solver.
    pub input: PathBuf,
    /// Requested number of cores; 0 means all available.
    pub core_budget: usize,
}

/// Errors that abort a run as a whole.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Placement(#[from] satfolio_core::Error),

    #[error("Failed to create scratch directory {}: {source}", path.display())]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Race the portfolio for `options` and write the answer stream to `out`.
///
/// Returns the report together with `out`. Configuration problems fail
/// before any solver is started; a solver that cannot be started is only
/// reported and left out of the race.
pub async fn run_portfolio<W: Write>(
    settings: &Settings,
    options: &RunOptions,
    out: W,
    shutdown: impl Future<Output = ()>,
) -> Result<(RunReport, W), RunError> {
    let started = Instant::now();

    let cores = affinity::restrict(options.core_budget, affinity::discover());
    let budget = cores.len();
    let portfolio = settings.portfolio();
    let needed = portfolio.required_predicates(budget)?;
    let traits = InstanceTraits::evaluate(settings, needed, &options.input).await;
    let placements = portfolio.select(budget, traits.uniform, traits.too_large)?;

    info!(
        input = %options.input.display(),
        budget,
        cores = %cores,
        uniform = traits.uniform,
        too_large = traits.too_large,
        solvers = placements.len(),
        "Starting portfolio"
    );

    let mut sink = AnswerSink::new(out);
    sink.comment("This is satfolio, a parallel portfolio runner");
    sink.comment(format_args!("Using {budget} processing units"));
    for (i, placement) in placements.iter().enumerate() {
        let spec = &placement.spec;
        sink.comment(format_args!("[{}] {} ({})", i + 1, spec.name, spec.authors));
        if let Some(banner) = &spec.banner {
            sink.comment(banner);
        }
    }
    if traits.uniform {
        sink.comment("I guess it is a uniform cnf formula");
    }

    std::fs::create_dir_all(&settings.scratch_dir).map_err(|e| RunError::ScratchDir {
        path: settings.scratch_dir.clone(),
        source: e,
    })?;

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let manager = SubprocessManager::new(settings, tx);
    let benchmark = options.input.to_string_lossy();
    let mut instances = Vec::with_capacity(placements.len());
    for (id, placement) in placements.into_iter().enumerate() {
        let slice = cores.slice(placement.core_offset, placement.core_count);
        let mut instance = WorkerInstance::new(id, placement.spec, slice);
        sink.comment(format_args!(
            "Starting {} on core(s) {}",
            instance.spec.name, instance.cores
        ));
        if let Some(banner) = &instance.spec.banner {
            sink.comment(banner);
        }
        if let Err(e) = manager.spawn(&mut instance, &benchmark) {
            warn!(worker = id, solver = %instance.spec.name, error = %e, "Solver left out of the race");
            sink.comment(format_args!("failed to start solver: {}", instance.spec.name));
            instance.mark_start_failed();
        }
        instances.push(instance);
    }
    // Only the solver tasks may keep the queue open.
    drop(manager);

    let mut engine = Engine::new(
        instances,
        sink,
        rx,
        Duration::from_millis(settings.reap_grace_ms),
    );
    let report = engine.run(shutdown).await;

    if let Some(winner) = report.winner.and_then(|id| engine.instances().get(id)) {
        let line = format!("solver [{}] {} answered", winner.id + 1, winner.spec.name);
        engine.sink_mut().comment(line);
    }
    let elapsed = started.elapsed().as_secs_f64();
    engine
        .sink_mut()
        .comment(format_args!("wall time: {elapsed:.3}s"));

    Ok((report, engine.into_sink().into_inner()))
}
