//! surge-metrics — the SLO side of the ramp loop.
//!
//! Wraps the metrics backend behind a one-expression-in, one-scalar-out
//! contract and evaluates the configured objectives against a fresh
//! snapshot on every tick.
//!
//! # Architecture
//!
//! ```text
//! Evaluator
//!   └── evaluate(objectives) → Verdict
//!         └── MetricSource::query(expr) → QueryOutcome   (one per objective)
//!               └── PrometheusClient → GET /api/v1/query
//! ```

pub mod client;
pub mod evaluator;

pub use client::{MetricSource, PrometheusClient, QueryOutcome};
pub use evaluator::Evaluator;
