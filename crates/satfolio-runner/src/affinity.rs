//! CPU core discovery and allocation.
//!
//! Pinning is an optimisation only: every affinity failure is logged and the
//! run continues unpinned.

use std::fmt;

use tracing::{debug, warn};

/// Ordered set of distinct core ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreSet(Vec<usize>);

impl CoreSet {
    /// Build a set from core ids, dropping duplicates but keeping order.
    pub fn new(cores: impl IntoIterator<Item = usize>) -> Self {
        let mut out: Vec<usize> = Vec::new();
        for core in cores {
            if !out.contains(&core) {
                out.push(core);
            }
        }
        Self(out)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub const fn len(&self) -> usize {
        self.0.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `n` cores.
    pub fn first(&self, n: usize) -> Self {
        Self(self.0.iter().copied().take(n).collect())
    }

    /// `count` cores starting at `offset`, clipped to the set.
    pub fn slice(&self, offset: usize, count: usize) -> Self {
        Self(self.0.iter().copied().skip(offset).take(count).collect())
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn to_cpu_set(&self) -> nix::Result<nix::sched::CpuSet> {
        let mut set = nix::sched::CpuSet::new();
        for &core in &self.0 {
            set.set(core)?;
        }
        Ok(set)
    }
}

impl fmt::Display for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for core in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{core}")?;
            first = false;
        }
        Ok(())
    }
}

/// Cores this process may currently run on.
#[cfg(target_os = "linux")]
pub fn discover() -> CoreSet {
    use nix::sched::{CpuSet, sched_getaffinity};
    use nix::unistd::Pid;

    match sched_getaffinity(Pid::from_raw(0)) {
        Ok(mask) => CoreSet::new((0..CpuSet::count()).filter(|&i| mask.is_set(i).unwrap_or(false))),
        Err(e) => {
            warn!(error = %e, "sched_getaffinity failed, falling back to available parallelism");
            fallback_cores()
        }
    }
}

/// Cores this process may currently run on.
#[cfg(not(target_os = "linux"))]
pub fn discover() -> CoreSet {
    fallback_cores()
}

fn fallback_cores() -> CoreSet {
    let n = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    CoreSet::new(0..n)
}

/// Restrict the run to `requested` cores.
///
/// `0`, or a request at least as large as `available`, keeps everything.
/// Otherwise the first `requested` cores are kept and this process's own
/// affinity is narrowed to them.
pub fn restrict(requested: usize, available: CoreSet) -> CoreSet {
    if requested == 0 || requested >= available.len() {
        return available;
    }
    let chosen = available.first(requested);
    pin_current_process(&chosen);
    chosen
}

/// Narrow this process's affinity to `cores`. Empty sets are ignored.
#[cfg(target_os = "linux")]
pub fn pin_current_process(cores: &CoreSet) {
    use nix::sched::sched_setaffinity;
    use nix::unistd::Pid;

    if cores.is_empty() {
        return;
    }
    let result = cores
        .to_cpu_set()
        .and_then(|mask| sched_setaffinity(Pid::from_raw(0), &mask));
    match result {
        Ok(()) => debug!(cores = %cores, "Pinned supervisor"),
        Err(e) => warn!(cores = %cores, error = %e, "sched_setaffinity failed, running unpinned"),
    }
}

/// Narrow this process's affinity to `cores`. No-op on this platform.
#[cfg(not(target_os = "linux"))]
pub fn pin_current_process(cores: &CoreSet) {
    debug!(cores = %cores, "CPU pinning not supported on this platform");
}
