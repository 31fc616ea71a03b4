//! Placement table: which solvers run, and on which cores, for a core budget.
//!
//! The table is data. A plan applies to one core budget and optionally to one
//! value of an input predicate; plans are matched in table order, first match
//! wins. The built-in table is the classic SAT competition portfolio; a
//! settings file can replace it entirely.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::error::{Error, Result};

/// Static description of one solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Display name.
    pub name: String,
    /// Attribution.
    pub authors: String,
    /// Extra text printed as a comment when the solver is listed or started.
    #[serde(default)]
    pub banner: Option<String>,
    /// Command template with `BENCHNAME`/`TMPDIR` style placeholders.
    pub command: String,
}

impl WorkerSpec {
    pub fn new(name: &str, authors: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            authors: authors.to_string(),
            banner: None,
            command: command.to_string(),
        }
    }
}

/// Input predicate a plan can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Predicate {
    /// "The input looks like a uniform random formula."
    Uniform,
    /// "The input is too large for preprocessing-heavy solvers."
    TooLarge,
}

/// Guard of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Always,
    Uniform,
    NotUniform,
    TooLarge,
    NotTooLarge,
}

impl Condition {
    /// The predicate this condition reads, if any.
    pub const fn predicate(self) -> Option<Predicate> {
        match self {
            Self::Always => None,
            Self::Uniform | Self::NotUniform => Some(Predicate::Uniform),
            Self::TooLarge | Self::NotTooLarge => Some(Predicate::TooLarge),
        }
    }

    const fn holds(self, uniform: bool, too_large: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Uniform => uniform,
            Self::NotUniform => !uniform,
            Self::TooLarge => too_large,
            Self::NotTooLarge => !too_large,
        }
    }
}

/// One solver of a plan and its core slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Name of a solver in [`Portfolio::solvers`].
    pub solver: String,
    /// First core (index into the run's core list).
    pub core_offset: usize,
    /// Number of cores.
    #[serde(default = "default_core_count")]
    pub core_count: usize,
}

const fn default_core_count() -> usize {
    1
}

/// Solvers to run for one core budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub budget: usize,
    #[serde(default)]
    pub when: Condition,
    pub slots: Vec<Slot>,
}

/// A solver selected for the run with its core slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub spec: WorkerSpec,
    pub core_offset: usize,
    pub core_count: usize,
}

/// Selection of solvers for a core budget.
pub trait PlacementPolicy {
    /// Predicates that must be evaluated before `select` for this budget.
    ///
    /// Fails when the budget is not supported, before anything is spawned.
    fn required_predicates(&self, budget: usize) -> Result<BTreeSet<Predicate>>;

    /// Solvers and core slices for the budget and predicate values.
    fn select(&self, budget: usize, uniform: bool, too_large: bool) -> Result<Vec<Placement>>;
}

/// Solver definitions plus plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub solvers: Vec<WorkerSpec>,
    pub plans: Vec<Plan>,
}

impl Portfolio {
    /// Budgets that have at least one plan, ascending.
    pub fn budgets(&self) -> BTreeSet<usize> {
        self.plans.iter().map(|p| p.budget).collect()
    }

    fn unsupported(&self, budget: usize) -> Error {
        let budgets: Vec<String> = self.budgets().iter().map(ToString::to_string).collect();
        let allowed = match budgets.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{}, or {last}", rest.join(", ")),
            Some((last, _)) => last.clone(),
            None => "none".to_string(),
        };
        Error::UnsupportedBudget { budget, allowed }
    }

    fn solver(&self, name: &str) -> Option<&WorkerSpec> {
        self.solvers.iter().find(|s| s.name == name)
    }

    /// Check that the table is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.plans.is_empty() {
            return Err(Error::Portfolio("no plans defined".into()));
        }

        let mut names = HashSet::new();
        for spec in &self.solvers {
            if !names.insert(spec.name.as_str()) {
                return Err(Error::Portfolio(format!("duplicate solver {}", spec.name)));
            }
            if spec.command.trim().is_empty() {
                return Err(Error::EmptyCommand(spec.name.clone()));
            }
        }

        for plan in &self.plans {
            if plan.slots.is_empty() {
                return Err(Error::Portfolio(format!(
                    "plan for budget {} has no solvers",
                    plan.budget
                )));
            }
            for slot in &plan.slots {
                if !names.contains(slot.solver.as_str()) {
                    return Err(Error::Portfolio(format!(
                        "plan for budget {} uses unknown solver {}",
                        plan.budget, slot.solver
                    )));
                }
                if slot.core_count == 0 {
                    return Err(Error::Portfolio(format!(
                        "solver {} has a zero core count",
                        slot.solver
                    )));
                }
            }
        }
        Ok(())
    }

    /// The classic portfolio of the 2011 SAT competition.
    #[allow(clippy::too_many_lines)]
    pub fn builtin() -> Self {
        const UZK: &str = "Alexander van der Grinten and Andreas Wotzlaw";
        const BIERE: &str = "Armin Biere";

        let solvers = vec![
            WorkerSpec::new(
                "satUZK 34p",
                UZK,
                "bin/satUZK -preproc-adaptive -budget 900 -show-model BENCHNAME",
            ),
            WorkerSpec::new(
                "satUZK 34sp",
                UZK,
                "bin/satUZK_wrapper satUZK -preproc-adaptive -budget 900 BENCHNAME",
            ),
            WorkerSpec::new(
                "glucose 2.0",
                "Gilles Audemard and Laurent Simon",
                "bin/glucose_wrapper BENCHNAME",
            ),
            WorkerSpec::new(
                "minisat hack: contrasat",
                "Allen van Gelder",
                "bin/contrasat BENCHNAME",
            ),
            WorkerSpec::new(
                "lingeling 587f-4882048-110513",
                BIERE,
                "bin/lingeling BENCHNAME",
            ),
            WorkerSpec::new(
                "plingeling 587f-4882048-110513",
                BIERE,
                "bin/plingeling -t 4 BENCHNAME",
            ),
            WorkerSpec::new("TNM 2009", "Wanxia Wei and Chu Min Li", "bin/TNM BENCHNAME"),
            WorkerSpec::new("sparrow2011", "Dave Tompkins", "bin/sparrow2011 BENCHNAME 27"),
            WorkerSpec::new("MPhaseSAT_M", "Jingchao Chen", "bin/MPhaseSAT_M BENCHNAME"),
            WorkerSpec::new(
                "march_hi 2009",
                "Marijn Heule and Hans Van Maaren",
                "bin/march_hi BENCHNAME",
            ),
        ];

        let slot = |solver: &str, core_offset: usize, core_count: usize| Slot {
            solver: solver.to_string(),
            core_offset,
            core_count,
        };
        let plan = |budget: usize, when: Condition, slots: Vec<Slot>| Plan {
            budget,
            when,
            slots,
        };

        let plans = vec![
            plan(
                1,
                Condition::Uniform,
                vec![
                    slot("sparrow2011", 0, 1),
                    slot("MPhaseSAT_M", 0, 1),
                    slot("march_hi 2009", 0, 1),
                    slot("TNM 2009", 0, 1),
                ],
            ),
            plan(
                1,
                Condition::NotUniform,
                vec![
                    slot("satUZK 34p", 0, 1),
                    slot("lingeling 587f-4882048-110513", 0, 1),
                    slot("TNM 2009", 0, 1),
                    slot("MPhaseSAT_M", 0, 1),
                ],
            ),
            plan(
                2,
                Condition::Always,
                vec![
                    slot("glucose 2.0", 1, 1),
                    slot("satUZK 34p", 0, 1),
                    slot("MPhaseSAT_M", 1, 1),
                    slot("TNM 2009", 0, 1),
                ],
            ),
            plan(
                4,
                Condition::Always,
                vec![
                    slot("glucose 2.0", 3, 1),
                    slot("satUZK 34p", 0, 1),
                    slot("lingeling 587f-4882048-110513", 2, 1),
                    slot("minisat hack: contrasat", 1, 1),
                ],
            ),
            plan(
                8,
                Condition::TooLarge,
                vec![
                    slot("glucose 2.0", 0, 1),
                    slot("plingeling 587f-4882048-110513", 4, 4),
                    slot("minisat hack: contrasat", 1, 1),
                    slot("satUZK 34sp", 2, 1),
                ],
            ),
            plan(
                8,
                Condition::NotTooLarge,
                vec![
                    slot("glucose 2.0", 0, 1),
                    slot("plingeling 587f-4882048-110513", 4, 4),
                    slot("minisat hack: contrasat", 2, 1),
                ],
            ),
        ];

        Self { solvers, plans }
    }
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlacementPolicy for Portfolio {
    fn required_predicates(&self, budget: usize) -> Result<BTreeSet<Predicate>> {
        let mut plans = self.plans.iter().filter(|p| p.budget == budget).peekable();
        if plans.peek().is_none() {
            return Err(self.unsupported(budget));
        }
        Ok(plans.filter_map(|p| p.when.predicate()).collect())
    }

    fn select(&self, budget: usize, uniform: bool, too_large: bool) -> Result<Vec<Placement>> {
        let plan = self
            .plans
            .iter()
            .filter(|p| p.budget == budget)
            .find(|p| p.when.holds(uniform, too_large))
            .ok_or_else(|| self.unsupported(budget))?;

        plan.slots
            .iter()
            .map(|slot| {
                let spec = self.solver(&slot.solver).ok_or_else(|| {
                    Error::Portfolio(format!("unknown solver {}", slot.solver))
                })?;
                Ok(Placement {
                    spec: spec.clone(),
                    core_offset: slot.core_offset,
                    core_count: slot.core_count,
                })
            })
            .collect()
    }
}
