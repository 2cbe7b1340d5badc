//! # Traffic Management Module
//!
//! Backpressure for the origin. Every origin call holds a permit of the
//! [`ConcurrencyGate`] for its whole duration; cache hits never touch it.

pub mod gate;

pub use gate::{ConcurrencyGate, Permit};
