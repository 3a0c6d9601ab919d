//! Domain types for objectives, verdicts, and ramp state.
//!
//! A `Verdict` is a pure function of one tick's `MetricSample`s:
//! re-evaluating the same samples always yields the same verdict.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// ── Objectives ─────────────────────────────────────────────────────

/// Which side of the threshold counts as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// The metric must stay at or below the threshold (e.g. latency).
    Below,
    /// The metric must stay at or above the threshold (e.g. success rate).
    Above,
}

/// A service-level objective checked on every tick.
///
/// Immutable once the run starts; the set of objectives is fixed for
/// the whole run. The `query` is a backend-specific expression passed
/// through opaquely — the controller never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub name: String,
    pub query: String,
    pub comparison: Comparison,
    pub threshold: f64,
    /// Display unit for logs and reports ("s", "%", ...).
    #[serde(default)]
    pub unit: String,
}

impl Objective {
    /// Judge one sample against this objective.
    ///
    /// An indeterminate sample (no data collected yet) passes with the
    /// benefit of the doubt, but is flagged so the report shows data
    /// was missing.
    pub fn check(&self, sample: MetricSample) -> ObjectiveCheck {
        match sample.value {
            Some(value) => {
                let passed = match self.comparison {
                    Comparison::Below => value <= self.threshold,
                    Comparison::Above => value >= self.threshold,
                };
                ObjectiveCheck {
                    sample,
                    passed,
                    indeterminate: false,
                }
            }
            None => ObjectiveCheck {
                sample,
                passed: true,
                indeterminate: true,
            },
        }
    }
}

// ── Samples and verdicts ───────────────────────────────────────────

/// One metric read, produced fresh each tick.
///
/// Never cached across ticks and never retried within a tick. A `None`
/// value is the explicit "backend has no data yet" sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub objective: String,
    pub value: Option<f64>,
    pub at: SystemTime,
}

/// The judged result for a single objective.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveCheck {
    pub sample: MetricSample,
    pub passed: bool,
    /// The backend had no data for this objective this tick.
    pub indeterminate: bool,
}

/// The pass/fail outcome of one tick's evaluation.
///
/// Every objective is represented, in configuration order, even when
/// the overall verdict fails — the full report supports post-mortem
/// diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub pass: bool,
    pub checks: Vec<ObjectiveCheck>,
}

impl Verdict {
    /// Aggregate per-objective checks into an overall verdict.
    ///
    /// Fails if and only if at least one objective strictly failed.
    pub fn from_checks(checks: Vec<ObjectiveCheck>) -> Self {
        let pass = checks.iter().all(|c| c.passed);
        Self { pass, checks }
    }

    /// Names of the objectives that failed, in configuration order.
    pub fn failed_objectives(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.sample.objective.as_str())
            .collect()
    }
}

// ── Ramp state ─────────────────────────────────────────────────────

/// Lifecycle phase of the ramp state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    StoppingOnFailure,
    StoppingOnCeiling,
    Stopped,
}

/// Why a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The configured ceiling was reached with all objectives intact.
    CeilingReached,
    /// An objective was breached and the ramp was stopped.
    SloBreached,
    /// An external stop signal forced the ramp down mid-run.
    Interrupted,
}

/// Mutable state of a ramp run.
///
/// Owned exclusively by the controller and mutated only from its tick
/// handler. The user count is monotonically non-decreasing while the
/// state is non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampState {
    /// Current commanded user count.
    pub users: u32,
    /// Users added per passing tick.
    pub step: u32,
    /// Ticks processed so far.
    pub ticks: u64,
    /// Set once the run has ended; no further ticks are processed.
    pub terminal: bool,
}

impl RampState {
    /// Fresh state at the start of a run: zero users, non-terminal.
    pub fn new(step: u32) -> Self {
        Self {
            users: 0,
            step,
            ticks: 0,
            terminal: false,
        }
    }

    /// Whether the next step would meet or exceed the ceiling.
    pub fn at_ceiling_after_step(&self, ceiling: u32) -> bool {
        self.users.saturating_add(self.step) >= ceiling
    }
}
