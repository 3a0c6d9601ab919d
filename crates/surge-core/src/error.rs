//! Error taxonomy for the ramp controller.
//!
//! Transport-level failures and schema violations are kept distinct:
//! a transport failure during evaluation aborts the tick, while a
//! schema violation aborts the whole run — no retry fixes a query that
//! no longer matches the backend. An objective breach is not an error
//! at all; it is a first-class verdict outcome.

use thiserror::Error;

/// Errors from a single metrics-backend query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Network-level failure or timeout talking to the backend.
    #[error("metrics backend unreachable: {0}")]
    BackendUnreachable(String),

    /// The response does not fit the query/response contract.
    ///
    /// Fatal to the run: it indicates configuration drift between the
    /// query and the backend schema.
    #[error("malformed metrics response: {0}")]
    MalformedResponse(String),
}

/// A query error while evaluating one named objective.
///
/// Any single objective erroring aborts the whole tick's evaluation —
/// acting on a partial verdict over a broken metrics path is unsafe.
#[derive(Debug, Error)]
#[error("evaluating objective {objective:?}: {source}")]
pub struct EvalError {
    pub objective: String,
    #[source]
    pub source: QueryError,
}

/// Errors from a load-generator command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Network-level failure or timeout talking to the generator.
    #[error("load generator unreachable: {0}")]
    Transport(String),

    /// The generator answered with a non-success status.
    #[error("load generator returned status {0}")]
    Status(u16),
}

/// Errors resolving or validating the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },

    #[error("objectives file {path}: {reason}")]
    ObjectivesFile { path: String, reason: String },

    #[error("invalid objective {name:?}: {reason}")]
    InvalidObjective { name: String, reason: String },

    #[error("no objectives configured")]
    NoObjectives,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
