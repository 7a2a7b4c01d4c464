//! QNet Engine - Rule engine of a simulated quantum node
//!
//! - `registry`: three-tier handler dispatch with diagnostics
//! - `handlers`: protocol handler modules
//! - `context`: state shared by handlers within a cycle
//! - `timers`: re-armable emission timers
//! - `engine`: the per-message allocation cycle

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod handlers;
pub mod registry;
pub mod timers;

pub use config::*;
pub use context::*;
pub use diagnostics::*;
pub use engine::*;
pub use handlers::{default_protocol_handlers, ProtocolHandler};
pub use registry::*;
pub use timers::*;
