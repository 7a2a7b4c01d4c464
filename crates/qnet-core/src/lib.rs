//! QNet Core - Fundamental types for the rule engine
//!
//! This crate defines the types shared by every engine component:
//! - Identifiers (NodeAddr, RuleSetId, SharedTag) and simulated time
//! - Channel slots and qubit keys
//! - Transport messages and classified rule events
//! - Rule programs (RuleSet, Rule, Program, Instruction)
//! - The physical backend contract
//! - Ordered multi-relations

pub mod id;
pub mod time;
pub mod channel;
pub mod backend;
pub mod message;
pub mod event;
pub mod program;
pub mod relation;
pub mod error;

pub use id::*;
pub use time::*;
pub use channel::*;
pub use backend::*;
pub use message::*;
pub use event::*;
pub use program::*;
pub use relation::*;
pub use error::*;
