//! surge-controller — the ramp state machine.
//!
//! Owns all timing and cancellation policy for a run: the periodic
//! tick, objective evaluation, the ramp decision, load commands, and
//! the stopping paths.
//!
//! # Architecture
//!
//! ```text
//! Starting ──▶ Running ──▶ StoppingOnFailure ──▶ Stopped
//!                   │
//!                   └─────▶ StoppingOnCeiling ──▶ Stopped
//! ```

pub mod controller;

pub use controller::{ControllerError, RampController, RampPlan};
