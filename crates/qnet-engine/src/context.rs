//! Engine context
//!
//! Everything a protocol handler may mutate during one cycle: the resource
//! pool, the runtime collection, emission timers, link-generation
//! bookkeeping and the outbound message queue.

use std::collections::BTreeMap;

use qnet_core::{
    ChannelSlot, ChannelType, GateKind, NodeAddr, OutboundMessage, PauliOperator, PhysicalBackend,
    PhysicalOperation, Pulse, QubitKey, RuleSetId, SimTime,
};
use qnet_pool::ResourcePool;
use qnet_runtime::RuntimeManager;
use tracing::debug;

use crate::{EmitTimers, EngineConfig};

/// Local qubit waiting for the partner's midpoint result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingPair {
    pub qubit: QubitKey,
    pub correction: PauliOperator,
}

/// Midpoint-source link state for one passive receiver channel
#[derive(Clone, Debug, Default)]
pub struct MsmInfo {
    pub partner: NodeAddr,
    pub epps_addr: NodeAddr,
    pub partner_qnic_index: u16,
    pub total_travel_time: SimTime,
    pub photon_index_counter: u64,
    pub iteration_index: u64,
    /// Qubit emitted for each click iteration
    pub qubit_info: BTreeMap<u64, QubitKey>,
    /// Successful local clicks, keyed by photon index
    pub pending: BTreeMap<u64, PendingPair>,
}

/// Mutable state shared by all protocol handlers of a node
pub struct EngineContext {
    pub node_addr: NodeAddr,
    pub now: SimTime,
    pub pool: ResourcePool,
    pub runtimes: RuntimeManager,
    pub timers: EmitTimers,
    /// Qubits in emission order, per slot, awaiting a link result
    pub emitted: BTreeMap<ChannelSlot, Vec<QubitKey>>,
    /// Keyed by passive receiver channel index
    pub msm: BTreeMap<u16, MsmInfo>,
    pub backend: Box<dyn PhysicalBackend>,
    pub outbox: Vec<OutboundMessage>,
}

impl EngineContext {
    pub fn new(config: &EngineConfig, backend: Box<dyn PhysicalBackend>) -> Self {
        let mut pool = ResourcePool::new();
        let slots = config.slots();
        for (slot, qubits) in &slots {
            pool.add_slot(*slot, *qubits);
        }
        EngineContext {
            node_addr: config.node_addr,
            now: SimTime::ZERO,
            pool,
            runtimes: RuntimeManager::new(config.max_program_steps),
            timers: EmitTimers::new(slots.iter().map(|(slot, _)| *slot)),
            emitted: BTreeMap::new(),
            msm: BTreeMap::new(),
            backend,
            outbox: Vec::new(),
        }
    }

    /// Run every runtime once and collect what their actions sent
    pub fn execute_all(&mut self) -> usize {
        let fired = self.runtimes.execute_all(&mut self.pool, &mut *self.backend);
        self.outbox
            .extend(self.runtimes.take_outbox().into_iter().map(OutboundMessage::Rule));
        fired
    }

    /// Allocation pass over every slot in allocation order
    pub fn allocate_all(&mut self) -> usize {
        let slots: Vec<ChannelSlot> = self.pool.slots().collect();
        slots
            .into_iter()
            .map(|slot| self.runtimes.allocate_resources(&mut self.pool, slot))
            .sum()
    }

    /// Fire one photon from `key`. Emitted order is tracked except on
    /// passive receivers, which are matched by iteration instead.
    pub fn emit_photon(&mut self, key: QubitKey, first: bool, last: bool) {
        self.backend.apply(&PhysicalOperation::EmitPhoton {
            target: key,
            pulse: Pulse { begin: first, end: last },
        });
        if key.slot.channel_type != ChannelType::ReceiverPassive {
            self.emitted.entry(key.slot).or_default().push(key);
        }
    }

    /// Cancel the emission timer of `slot`; idle timers are left alone
    pub fn stop_emission(&mut self, slot: ChannelSlot) -> bool {
        self.timers.cancel(slot)
    }

    /// Failure path for an emission round: reinitialise every emitted qubit
    /// that never became entangled and make it free again
    pub fn free_failed_attempts(&mut self, slot: ChannelSlot) -> usize {
        let emitted = self.emitted.remove(&slot).unwrap_or_default();
        for key in &emitted {
            self.backend.apply(&PhysicalOperation::Reinitialize { target: *key });
        }
        let count = emitted.len();
        self.pool.free_pending(emitted);
        if count > 0 {
            debug!(?slot, count, "freed failed emission attempts");
        }
        count
    }

    /// Reinitialise one reserved qubit and clear its busy flag
    pub fn reset_qubit(&mut self, key: QubitKey) {
        self.backend.apply(&PhysicalOperation::Reinitialize { target: key });
        self.pool.free_pending([key]);
    }

    /// Apply the Pauli correction for a heralded pair
    pub fn apply_correction(&mut self, key: QubitKey, correction: PauliOperator) {
        if let Some(gate) = GateKind::correction(correction) {
            self.backend.apply(&PhysicalOperation::Gate {
                gate,
                targets: vec![key],
            });
        }
    }

    /// Consumption path for a resource held by runtime `id`
    pub fn free_consumed(&mut self, id: RuleSetId, key: QubitKey) -> bool {
        self.runtimes.release(id, key, &mut self.pool, &mut *self.backend)
    }

    pub fn send(&mut self, message: OutboundMessage) {
        self.outbox.push(message);
    }
}
