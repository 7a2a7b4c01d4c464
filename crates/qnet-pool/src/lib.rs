//! QNet Pool - Entangled resource ownership
//!
//! Tracks every stationary qubit on a node, which of them currently share
//! entanglement with which partner, and which runtime holds each one.

pub mod pool;

pub use pool::*;
