//! The ramp state machine: tick, evaluate, decide, command.
//!
//! One decision in flight at a time: the tick body runs to completion
//! before the next tick is taken, and ticks that elapse while a cycle
//! is still busy are coalesced rather than queued. `RampState` is owned
//! exclusively by the controller and mutated only here, so no locking
//! is needed.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use surge_core::{EvalError, Objective, Phase, RampConfig, RampState, RunOutcome};
use surge_loadgen::LoadCommand;
use surge_metrics::{Evaluator, MetricSource};

/// Errors that end a run without a clean outcome.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Objective evaluation failed; the metrics path is suspect.
    #[error("objective evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    /// The initial zeroing command failed; the run never started.
    #[error("initial ramp command failed: {0}")]
    Start(#[from] surge_core::CommandError),
}

/// Timing and sizing parameters for one run.
#[derive(Debug, Clone)]
pub struct RampPlan {
    /// Users added per passing tick.
    pub step: u32,
    /// User count that ends the run.
    pub ceiling: u32,
    /// Users per second during a step transition.
    pub spawn_rate: u32,
    /// Conservative spawn rate for the final ramp-down to zero.
    pub stop_spawn_rate: u32,
    /// Interval between ramp decisions.
    pub tick_interval: Duration,
}

impl From<&RampConfig> for RampPlan {
    fn from(config: &RampConfig) -> Self {
        Self {
            step: config.step,
            ceiling: config.ceiling,
            spawn_rate: config.spawn_rate(),
            stop_spawn_rate: config.stop_spawn_rate,
            tick_interval: config.tick_interval,
        }
    }
}

/// What a single tick decided.
enum TickOutcome {
    /// Keep ramping.
    Continue,
    /// An objective was breached; take the failure stopping path.
    Breach,
    /// The ceiling was commanded; take the clean stopping path.
    Ceiling,
}

/// Drives the ramp: periodically evaluates the objectives and steps the
/// generator's target concurrency until an objective breaks, the
/// ceiling is reached, or a stop signal arrives.
pub struct RampController<M, L> {
    plan: RampPlan,
    objectives: Vec<Objective>,
    evaluator: Evaluator<M>,
    commander: L,
    state: RampState,
    phase: Phase,
    /// Objectives that have already had their one no-data grace tick.
    seen_indeterminate: HashSet<String>,
}

impl<M: MetricSource, L: LoadCommand> RampController<M, L> {
    pub fn new(plan: RampPlan, objectives: Vec<Objective>, source: M, commander: L) -> Self {
        let state = RampState::new(plan.step);
        Self {
            plan,
            objectives,
            evaluator: Evaluator::new(source),
            commander,
            state,
            phase: Phase::Starting,
            seen_indeterminate: HashSet::new(),
        }
    }

    /// Current ramp state (for inspection; the controller is the only
    /// writer).
    pub fn state(&self) -> &RampState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the ramp to completion.
    ///
    /// A message on `shutdown` (or the sender going away) forces the
    /// ramp-down path: leaving the generator running after controller
    /// exit would leak load into the target environment.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunOutcome, ControllerError> {
        // Zero the generator before the first tick; failure here is
        // fatal because the run never reached a known-safe baseline.
        self.commander.set_target(0, self.plan.spawn_rate).await?;
        self.phase = Phase::Running;
        info!(
            ceiling = self.plan.ceiling,
            step = self.plan.step,
            interval_secs = self.plan.tick_interval.as_secs(),
            "ramp started, users set to 0"
        );

        let mut ticker = tokio::time::interval(self.plan.tick_interval);
        // Coalesce ticks that elapse while a cycle is in flight.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; consume it so the first
        // evaluation happens one full interval after start.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await? {
                        TickOutcome::Continue => {}
                        TickOutcome::Breach => {
                            self.phase = Phase::StoppingOnFailure;
                            self.ramp_down().await;
                            return Ok(RunOutcome::SloBreached);
                        }
                        TickOutcome::Ceiling => {
                            self.phase = Phase::StoppingOnCeiling;
                            self.ramp_down().await;
                            return Ok(RunOutcome::CeilingReached);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    warn!(users = self.state.users, "stop signal received, ramping down");
                    self.phase = Phase::StoppingOnFailure;
                    self.ramp_down().await;
                    return Ok(RunOutcome::Interrupted);
                }
            }
        }
    }

    /// One evaluate-decide-command cycle.
    async fn tick(&mut self) -> Result<TickOutcome, ControllerError> {
        self.state.ticks += 1;

        let verdict = match self.evaluator.evaluate(&self.objectives).await {
            Ok(verdict) => verdict,
            Err(e) => {
                // The metrics path is suspect; a ramp-down through the
                // same infrastructure may be equally unreliable, so the
                // run stops without one.
                error!(error = %e, "objective evaluation failed, aborting run");
                self.state.terminal = true;
                self.phase = Phase::Stopped;
                return Err(ControllerError::Evaluation(e));
            }
        };

        if !verdict.pass {
            warn!(
                failed = ?verdict.failed_objectives(),
                users = self.state.users,
                tick = self.state.ticks,
                "objective breached, stopping ramp"
            );
            return Ok(TickOutcome::Breach);
        }

        // Give each objective one grace tick the first time the backend
        // has no data for it: don't fail the ramp, but don't advance it
        // on missing evidence either.
        let mut hold = false;
        for check in verdict.checks.iter().filter(|c| c.indeterminate) {
            if self.seen_indeterminate.insert(check.sample.objective.clone()) {
                hold = true;
            }
        }
        if hold {
            info!(
                users = self.state.users,
                "metric not available yet, holding ramp this tick"
            );
            return Ok(TickOutcome::Continue);
        }

        if self.state.at_ceiling_after_step(self.plan.ceiling) {
            self.state.users = self.plan.ceiling;
            info!(users = self.state.users, "ceiling reached, commanding final step");
            if let Err(e) = self.commander
                .set_target(self.state.users, self.plan.spawn_rate)
                .await
            {
                warn!(error = %e, "final ramp-up command failed");
            }
            return Ok(TickOutcome::Ceiling);
        }

        self.state.users += self.plan.step;
        info!(users = self.state.users, tick = self.state.ticks, "objectives held, increasing users");
        if let Err(e) = self.commander
            .set_target(self.state.users, self.plan.spawn_rate)
            .await
        {
            // A missed ramp-up step only delays the test; the next
            // passing tick commands a fresh, higher target.
            warn!(error = %e, users = self.state.users, "ramp-up command failed");
        }

        Ok(TickOutcome::Continue)
    }

    /// Command the generator back to zero, retrying exactly once.
    ///
    /// Leaving load running unattended after a detected breach is the
    /// worst outcome, so the stop command gets one immediate retry. The
    /// retry is bounded: after a second failure the controller still
    /// stops and the failure is reported loudly.
    async fn ramp_down(&mut self) {
        let rate = self.plan.stop_spawn_rate;
        if let Err(first) = self.commander.set_target(0, rate).await {
            warn!(error = %first, "ramp-down command failed, retrying once");
            match self.commander.set_target(0, rate).await {
                Ok(()) => info!("ramp-down succeeded on retry"),
                Err(second) => error!(
                    error = %second,
                    "ramp-down retry failed, the load generator may still be running"
                ),
            }
        }
        self.state.terminal = true;
        self.phase = Phase::Stopped;
        info!(
            ticks = self.state.ticks,
            peak_users = self.state.users,
            "ramp stopped"
        );
    }
}
