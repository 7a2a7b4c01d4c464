//! QNet Bus - Event classification and ordering
//!
//! Converts heterogeneous transport messages into typed [`qnet_core::RuleEvent`]s
//! and releases them in deterministic `(time, sequence)` order.

pub mod classifier;
pub mod bus;

pub use classifier::*;
pub use bus::*;
