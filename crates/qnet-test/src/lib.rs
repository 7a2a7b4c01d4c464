//! QNet Test Harness - Deterministic multi-node simulation
//!
//! This crate provides:
//! - A discrete-event scheduler
//! - Recording and lossy physical backends
//! - A test network routing messages and timers between rule engines
//! - End-to-end link generation and purification scenarios

pub mod backend;
pub mod error;
pub mod logging;
pub mod network;
pub mod scenarios;
pub mod scheduler;

pub use backend::*;
pub use error::*;
pub use logging::*;
pub use network::*;
pub use scenarios::*;
pub use scheduler::*;
