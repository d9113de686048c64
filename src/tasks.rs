//! Relay Tasks
//!
//! Task bodies as explicit state machines. Each exposes a single `cycle`
//! and a `run` that repeats it for a [`Budget`](crate::types::Budget);
//! firmware runs them unbounded, tests run a few cycles.

pub mod echo;
pub mod heartbeat;
pub mod ingress;
pub mod pump;
