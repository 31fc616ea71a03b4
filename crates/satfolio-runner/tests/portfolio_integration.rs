#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end races with real `/bin/sh` solvers.
//!
//! Every test runs on all cores of the host (budget 0, so the test binary is
//! never pinned) with a portfolio override whose plans are keyed to the host's
//! core count and whose solvers are shell scripts in a temp directory.

use std::path::Path;

use satfolio_core::placement::{Condition, Plan, Slot};
use satfolio_core::{Error, Portfolio, Settings, WorkerSpec};
use satfolio_runner::affinity;
use satfolio_runner::runner::{RunError, RunOptions, run_portfolio};
use tempfile::TempDir;

fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(format!("{name}.sh"));
    std::fs::write(&path, body).unwrap();
    format!("/bin/sh {} BENCHNAME TMPDIR", path.display())
}

/// The effective budget of a run that asks for all cores.
fn host_budget() -> usize {
    affinity::discover().len()
}

fn plan(budget: usize, when: Condition, solvers: &[&str]) -> Plan {
    Plan {
        budget,
        when,
        slots: solvers
            .iter()
            .map(|s| Slot {
                solver: (*s).to_string(),
                core_offset: 0,
                core_count: 1,
            })
            .collect(),
    }
}

fn settings(dir: &TempDir, solvers: Vec<WorkerSpec>, plans: Vec<Plan>) -> Settings {
    Settings {
        scratch_dir: dir.path().join("scratch"),
        reap_grace_ms: 2000,
        portfolio: Some(Portfolio { solvers, plans }),
        ..Settings::default()
    }
}

fn options(dir: &TempDir) -> RunOptions {
    RunOptions {
        input: dir.path().join("input.cnf"),
        core_budget: 0,
    }
}

/// Lines that did not come from the runner itself.
fn forwarded(out: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(out)
        .lines()
        .filter(|l| !l.starts_with("c "))
        .map(str::to_string)
        .collect()
}

fn comments(out: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(out)
        .lines()
        .filter_map(|l| l.strip_prefix("c ").map(str::to_string))
        .collect()
}

#[tokio::test]
async fn first_verdict_wins_and_loser_is_killed() {
    let dir = TempDir::new().unwrap();
    let a = script(
        dir.path(),
        "a",
        "sleep 0.5\necho 'c junk'\necho 's SATISFIABLE'\n",
    );
    let b = script(dir.path(), "b", "echo 'v 1 2 0'\nexec sleep 30\n");
    let settings = settings(
        &dir,
        vec![WorkerSpec::new("A", "alice", &a), WorkerSpec::new("B", "bob", &b)],
        vec![plan(host_budget(), Condition::Always, &["A", "B"])],
    );

    let started = std::time::Instant::now();
    let (report, out) = run_portfolio(&settings, &options(&dir), Vec::new(), std::future::pending())
        .await
        .unwrap();

    assert!(started.elapsed() < std::time::Duration::from_secs(20));
    assert_eq!(report.exit_code, 10);
    assert_eq!(report.winner, Some(0));
    assert_eq!(report.cancelled, vec![1]);
    assert_eq!(forwarded(&out), vec!["v 1 2 0", "s SATISFIABLE"]);
    let comments = comments(&out);
    assert!(comments.contains(&"solver [1] A answered".to_string()));
    assert!(!comments.iter().any(|c| c == "junk"));
}

#[tokio::test]
async fn winner_values_follow_its_status_line() {
    let dir = TempDir::new().unwrap();
    let a = script(
        dir.path(),
        "a",
        "echo 's SATISFIABLE'\necho \"v $1 $2 $TMPDIR\"\necho 'v 0'\n",
    );
    let settings = settings(
        &dir,
        vec![WorkerSpec::new("A", "alice", &a)],
        vec![plan(host_budget(), Condition::Always, &["A"])],
    );
    let options = options(&dir);
    let cores_before = affinity::discover();

    let (report, out) = run_portfolio(&settings, &options, Vec::new(), std::future::pending())
        .await
        .unwrap();

    // Asking for every core leaves the caller's own affinity alone.
    assert_eq!(affinity::discover(), cores_before);

    let scratch = settings.scratch_dir.display().to_string();
    assert_eq!(report.exit_code, 10);
    assert!(settings.scratch_dir.is_dir());
    assert_eq!(
        forwarded(&out),
        vec![
            "s SATISFIABLE".to_string(),
            format!("v {} {scratch} {scratch}", options.input.display()),
            "v 0".to_string(),
        ]
    );
}

#[tokio::test]
async fn unlaunchable_solver_is_left_out() {
    let dir = TempDir::new().unwrap();
    let a = script(dir.path(), "a", "sleep 0.1\necho 's UNSATISFIABLE'\n");
    let settings = settings(
        &dir,
        vec![
            WorkerSpec::new("ghost", "nobody", "/nonexistent/ghost BENCHNAME"),
            WorkerSpec::new("A", "alice", &a),
        ],
        vec![plan(host_budget(), Condition::Always, &["ghost", "A"])],
    );

    let (report, out) = run_portfolio(&settings, &options(&dir), Vec::new(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(report.exit_code, 20);
    assert_eq!(report.winner, Some(1));
    assert!(comments(&out).contains(&"failed to start solver: ghost".to_string()));
    assert_eq!(forwarded(&out), vec!["s UNSATISFIABLE"]);
}

#[tokio::test]
async fn sentinel_exit_is_reported_as_start_failure() {
    let dir = TempDir::new().unwrap();
    let q = script(dir.path(), "q", "exit 99\n");
    let settings = settings(
        &dir,
        vec![WorkerSpec::new("quitter", "nobody", &q)],
        vec![plan(host_budget(), Condition::Always, &["quitter"])],
    );

    let (report, out) = run_portfolio(&settings, &options(&dir), Vec::new(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(report.exit_code, 0);
    assert!(forwarded(&out).is_empty());
    assert!(comments(&out).contains(&"failed to start solver: quitter".to_string()));
}

#[tokio::test]
async fn silent_portfolio_exits_zero() {
    let dir = TempDir::new().unwrap();
    let a = script(dir.path(), "a", "echo 'c nothing to say'\necho 's UNKNOWN'\n");
    let settings = settings(
        &dir,
        vec![WorkerSpec::new("A", "alice", &a)],
        vec![plan(host_budget(), Condition::Always, &["A"])],
    );

    let (report, out) = run_portfolio(&settings, &options(&dir), Vec::new(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.winner, None);
    assert!(forwarded(&out).is_empty());
}

#[tokio::test]
async fn uniform_predicate_selects_plan() {
    let dir = TempDir::new().unwrap();
    let u = script(dir.path(), "u", "echo 's SATISFIABLE'\n");
    let s = script(dir.path(), "s", "echo 's UNSATISFIABLE'\n");
    let mut settings = settings(
        &dir,
        vec![WorkerSpec::new("U", "u", &u), WorkerSpec::new("S", "s", &s)],
        vec![
            plan(host_budget(), Condition::Uniform, &["U"]),
            plan(host_budget(), Condition::NotUniform, &["S"]),
        ],
    );
    // Non-zero exit means the predicate holds.
    settings.uniform_predicate = "/bin/false".into();

    let (report, out) = run_portfolio(&settings, &options(&dir), Vec::new(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(report.exit_code, 10);
    assert!(comments(&out).contains(&"I guess it is a uniform cnf formula".to_string()));
    assert!(comments(&out).contains(&"[1] U (u)".to_string()));
}

#[tokio::test]
async fn unsupported_budget_starts_nothing() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("ran");
    let a = script(
        dir.path(),
        "a",
        &format!("touch {}\n", marker.display()),
    );
    let settings = settings(
        &dir,
        vec![WorkerSpec::new("A", "alice", &a)],
        vec![plan(host_budget() + 1, Condition::Always, &["A"])],
    );

    let err = run_portfolio(&settings, &options(&dir), Vec::new(), std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Placement(Error::UnsupportedBudget { budget, .. }) if budget == host_budget()
    ));
    assert!(!marker.exists());
    assert!(!settings.scratch_dir.exists());
}
