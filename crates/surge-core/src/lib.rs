//! surge-core — domain types for the adaptive ramp controller.
//!
//! Holds everything the other crates agree on: the objective and verdict
//! types, the ramp state machine vocabulary, the error taxonomy, and the
//! environment-sourced configuration.
//!
//! # Architecture
//!
//! ```text
//! Objective ── check(sample) ──▶ ObjectiveCheck ──▶ Verdict
//! RampState ── advanced tick by tick by the controller
//! RampConfig ── resolved once at startup from the environment
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::RampConfig;
pub use error::{CommandError, ConfigError, EvalError, QueryError};
pub use types::{
    Comparison, MetricSample, Objective, ObjectiveCheck, Phase, RampState, RunOutcome, Verdict,
};
