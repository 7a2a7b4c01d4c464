//! Error types for the rule engine

use thiserror::Error;

use crate::QubitKey;

/// Core rule engine errors
///
/// Expected misses (unbound resources, unhandled events) are not errors and
/// never surface here; they are reported as diagnostics.
#[derive(Error, Debug)]
pub enum QnetError {
    // Input errors
    #[error("Malformed rule set: {0}")]
    MalformedRuleSet(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Resource errors
    #[error("Unknown qubit: {0:?}")]
    UnknownQubit(QubitKey),

    // Runtime errors
    #[error("Program fault in {program}: {reason}")]
    ProgramFault { program: String, reason: String },
}

impl From<serde_json::Error> for QnetError {
    fn from(err: serde_json::Error) -> Self {
        QnetError::MalformedRuleSet(err.to_string())
    }
}

/// Result type for rule engine operations
pub type QnetResult<T> = Result<T, QnetError>;
