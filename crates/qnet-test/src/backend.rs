//! Simulated physical backends

use std::cell::RefCell;
use std::rc::Rc;

use qnet_core::{OperationResult, PhysicalBackend, PhysicalOperation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shared log of operations applied to a backend
pub type OperationLog = Rc<RefCell<Vec<PhysicalOperation>>>;

/// Noiseless backend that records every operation
#[derive(Debug, Default)]
pub struct RecordingBackend {
    log: OperationLog,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting the log after the backend is boxed
    pub fn log(&self) -> OperationLog {
        Rc::clone(&self.log)
    }
}

impl PhysicalBackend for RecordingBackend {
    fn apply(&mut self, op: &PhysicalOperation) -> OperationResult {
        self.log.borrow_mut().push(op.clone());
        match op {
            PhysicalOperation::Measure { .. } => OperationResult::measured(0),
            _ => OperationResult::ok(),
        }
    }
}

/// Lossy backend configuration
#[derive(Clone, Debug)]
pub struct LossConfig {
    /// Probability that an emitted photon is lost
    pub photon_loss: f64,
    /// Probability that a gate or measurement fails
    pub operation_error: f64,
    /// Fidelity reported for successful operations
    pub fidelity: f64,
}

impl LossConfig {
    pub fn ideal() -> Self {
        Self {
            photon_loss: 0.0,
            operation_error: 0.0,
            fidelity: 1.0,
        }
    }

    pub fn noisy() -> Self {
        Self {
            photon_loss: 0.3,
            operation_error: 0.05,
            fidelity: 0.9,
        }
    }
}

/// Seeded backend with random loss, errors and measurement outcomes
pub struct LossyBackend {
    config: LossConfig,
    rng: StdRng,
    stats: LossStats,
}

#[derive(Clone, Debug, Default)]
pub struct LossStats {
    pub operations: u64,
    pub photons_lost: u64,
    pub operation_errors: u64,
}

impl LossyBackend {
    pub fn new(config: LossConfig, seed: u64) -> Self {
        LossyBackend {
            config,
            rng: StdRng::seed_from_u64(seed),
            stats: LossStats::default(),
        }
    }

    pub fn stats(&self) -> &LossStats {
        &self.stats
    }
}

impl PhysicalBackend for LossyBackend {
    fn apply(&mut self, op: &PhysicalOperation) -> OperationResult {
        self.stats.operations += 1;
        match op {
            PhysicalOperation::EmitPhoton { .. } => {
                if self.rng.gen::<f64>() < self.config.photon_loss {
                    self.stats.photons_lost += 1;
                    return OperationResult {
                        qubit_lost: true,
                        ..OperationResult::failed()
                    };
                }
            }
            PhysicalOperation::Gate { .. } | PhysicalOperation::Measure { .. } => {
                if self.rng.gen::<f64>() < self.config.operation_error {
                    self.stats.operation_errors += 1;
                    return OperationResult::failed();
                }
            }
            PhysicalOperation::Reinitialize { .. } => {}
        }
        let outcome = match op {
            PhysicalOperation::Measure { .. } => Some(u8::from(self.rng.gen::<bool>())),
            _ => None,
        };
        OperationResult {
            success: true,
            fidelity_estimate: self.config.fidelity,
            qubit_lost: false,
            outcome,
        }
    }
}
