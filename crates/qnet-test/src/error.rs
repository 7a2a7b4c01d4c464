//! Harness error types

use qnet_core::{NodeAddr, QnetError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("engine error at node {node}: {source}")]
    Engine {
        node: i32,
        #[source]
        source: QnetError,
    },

    #[error("unknown node {0:?}")]
    UnknownNode(NodeAddr),

    #[error("duplicate node {0:?}")]
    DuplicateNode(NodeAddr),

    #[error("delivery limit of {0} reached")]
    DeliveryLimit(usize),

    #[error(transparent)]
    Setup(#[from] QnetError),
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
