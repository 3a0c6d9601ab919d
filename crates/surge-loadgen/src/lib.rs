//! surge-loadgen — the traffic side of the ramp loop.
//!
//! Issues "set target concurrency" commands to the load generator's
//! swarm endpoint. Fire-and-forget: the generator runs its own internal
//! ramp scheduler, so a command is done as soon as it is accepted.

pub mod commander;

pub use commander::{LoadCommand, SwarmCommander};
