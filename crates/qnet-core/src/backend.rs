//! Physical operation contract
//!
//! Noise models and state simulation live behind [`PhysicalBackend`]. The rule
//! engine only submits operations and reads back success and outcome.

use serde::{Deserialize, Serialize};

use crate::QubitKey;

/// Single-qubit Pauli operator, used for corrections and measurement bases
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PauliOperator {
    #[default]
    I,
    X,
    Y,
    Z,
}

/// Gate applied by a rule action or a correction step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    X,
    Y,
    Z,
    H,
    Cnot,
}

impl GateKind {
    /// Number of qubit operands the gate takes
    pub fn arity(self) -> usize {
        match self {
            GateKind::Cnot => 2,
            _ => 1,
        }
    }

    /// Correction gate for a Pauli frame, `None` for identity
    pub fn correction(op: PauliOperator) -> Option<GateKind> {
        match op {
            PauliOperator::I => None,
            PauliOperator::X => Some(GateKind::X),
            PauliOperator::Y => Some(GateKind::Y),
            PauliOperator::Z => Some(GateKind::Z),
        }
    }
}

/// Photon pulse markers sent with an emission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Pulse {
    pub begin: bool,
    pub end: bool,
}

/// Operation requested from the physical layer
#[derive(Clone, Debug, PartialEq)]
pub enum PhysicalOperation {
    Gate { gate: GateKind, targets: Vec<QubitKey> },
    Measure { target: QubitKey, basis: PauliOperator },
    Reinitialize { target: QubitKey },
    EmitPhoton { target: QubitKey, pulse: Pulse },
}

impl PhysicalOperation {
    /// Qubit the operation acts on first
    pub fn primary_target(&self) -> Option<QubitKey> {
        match self {
            PhysicalOperation::Gate { targets, .. } => targets.first().copied(),
            PhysicalOperation::Measure { target, .. }
            | PhysicalOperation::Reinitialize { target }
            | PhysicalOperation::EmitPhoton { target, .. } => Some(*target),
        }
    }
}

/// Result of a physical operation
#[derive(Clone, Debug, PartialEq)]
pub struct OperationResult {
    pub success: bool,
    pub fidelity_estimate: f64,
    pub qubit_lost: bool,
    /// Measurement outcome, set for measurements only
    pub outcome: Option<u8>,
}

impl OperationResult {
    pub fn ok() -> Self {
        OperationResult {
            success: true,
            fidelity_estimate: 1.0,
            qubit_lost: false,
            outcome: None,
        }
    }

    pub fn measured(outcome: u8) -> Self {
        OperationResult {
            outcome: Some(outcome),
            ..OperationResult::ok()
        }
    }

    pub fn failed() -> Self {
        OperationResult {
            success: false,
            fidelity_estimate: 0.0,
            qubit_lost: false,
            outcome: None,
        }
    }
}

/// Capability to apply operations to simulated hardware
pub trait PhysicalBackend {
    fn apply(&mut self, op: &PhysicalOperation) -> OperationResult;
}

/// Noiseless backend: every operation succeeds, measurements read 0
#[derive(Debug, Default)]
pub struct IdealBackend;

impl PhysicalBackend for IdealBackend {
    fn apply(&mut self, op: &PhysicalOperation) -> OperationResult {
        match op {
            PhysicalOperation::Measure { .. } => OperationResult::measured(0),
            _ => OperationResult::ok(),
        }
    }
}
