//! Read-only runtime introspection

use serde::Serialize;

/// Point-in-time view of a runtime, for monitoring and tests only
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeSnapshot {
    pub terminated: bool,
    /// Distinct partners with at least one bound resource
    pub active_partners: usize,
    pub qubit_resources: usize,
    pub message_queues: usize,
    pub named_qubits: usize,
}
