//! QNet Runtime - Rule program execution
//!
//! - `interpreter`: runs a single program against a runtime's registers
//! - `runtime`: one live instance of a submitted rule set
//! - `manager`: the runtime collection and the allocation pass
//! - `snapshot`: read-only introspection

pub mod interpreter;
pub mod runtime;
pub mod manager;
pub mod snapshot;

pub use interpreter::{ExecEnv, Frame, DEFAULT_STEP_BUDGET};
pub use runtime::*;
pub use manager::*;
pub use snapshot::*;
