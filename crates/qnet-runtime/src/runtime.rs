//! Runtime: one live instance of a submitted rule set

use std::collections::{BTreeMap, BTreeSet};

use qnet_core::{
    MultiMap, NodeAddr, PhysicalOperation, QubitId, QubitKey, ReturnCode, RuleSet, RuleSetId, SharedTag,
    REGISTER_COUNT,
};
use qnet_pool::{QubitHandle, ResourcePool};
use tracing::debug;

use crate::interpreter::{self, ExecEnv, Frame};
use crate::RuntimeSnapshot;

/// Message content delivered to a runtime, e.g. `[sequence, outcome, protocol]`
pub type MessageRecord = Vec<i64>;

/// Mutable state a runtime's programs operate on
#[derive(Debug, Default)]
pub struct RuntimeState {
    /// Partners this runtime expects resources from
    pub(crate) partners: BTreeSet<NodeAddr>,
    /// Resources handed over by the pool, keyed by partner
    pub(crate) qubits: MultiMap<NodeAddr, QubitHandle>,
    /// Persistent program names for bound qubits
    pub(crate) named: BTreeMap<QubitId, QubitKey>,
    pub(crate) messages: MultiMap<SharedTag, MessageRecord>,
    pub(crate) registers: [i64; REGISTER_COUNT],
    pub(crate) memory: BTreeMap<String, i64>,
}

/// Live instance of a rule set
#[derive(Debug)]
pub struct Runtime {
    ruleset: RuleSet,
    state: RuntimeState,
    terminated: bool,
}

impl Runtime {
    pub fn new(ruleset: RuleSet) -> Self {
        let state = RuntimeState {
            partners: ruleset.partners().into_iter().collect(),
            ..RuntimeState::default()
        };
        Runtime {
            ruleset,
            state,
            terminated: false,
        }
    }

    #[inline]
    pub fn id(&self) -> RuleSetId {
        self.ruleset.id
    }

    pub fn ruleset(&self) -> &RuleSet {
        &self.ruleset
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn partners(&self) -> impl Iterator<Item = NodeAddr> + '_ {
        self.state.partners.iter().copied()
    }

    /// Whether another resource shared with `partner` may be bound
    pub fn wants_resource(&self, partner: NodeAddr) -> bool {
        if self.terminated || !self.state.partners.contains(&partner) {
            return false;
        }
        match self.ruleset.resource_limit {
            Some(limit) => self.state.qubits.count(&partner) < limit,
            None => true,
        }
    }

    /// Bind an allocated resource, oldest first per partner
    pub fn assign_qubit(&mut self, partner: NodeAddr, handle: QubitHandle) {
        self.state.partners.insert(partner);
        self.state.qubits.insert(partner, handle);
    }

    /// Queue a message record for rules sharing `tag`
    pub fn assign_message(&mut self, tag: SharedTag, record: MessageRecord) {
        self.state.messages.insert(tag, record);
    }

    pub fn qubit_count(&self, partner: NodeAddr) -> usize {
        self.state.qubits.count(&partner)
    }

    pub fn holds(&self, key: QubitKey) -> bool {
        self.state.qubits.find_key(|h| h.key() == key).is_some()
    }

    pub fn bound_qubits(&self) -> impl Iterator<Item = (NodeAddr, QubitKey)> + '_ {
        self.state.qubits.iter().map(|(partner, handle)| (*partner, handle.key()))
    }

    pub fn message_count(&self, tag: SharedTag) -> usize {
        self.state.messages.count(&tag)
    }

    pub fn register(&self, index: usize) -> Option<i64> {
        self.state.registers.get(index).copied()
    }

    pub fn memory(&self, key: &str) -> Option<i64> {
        self.state.memory.get(key).copied()
    }

    /// One pass over the rules in list order, then the termination check.
    /// Returns the number of rules whose action ran.
    pub fn exec(&mut self, env: &mut ExecEnv<'_>) -> usize {
        if self.terminated {
            return 0;
        }

        let mut fired = 0;
        for rule in &self.ruleset.rules {
            let frame = Frame {
                ruleset_id: self.ruleset.id,
                owner: self.ruleset.owner,
                shared_tag: rule.shared_tag,
            };
            if interpreter::run(&rule.condition, &mut self.state, &frame, env) != ReturnCode::CondPassed {
                continue;
            }
            let code = interpreter::run(&rule.action, &mut self.state, &frame, env);
            debug!(ruleset = %self.ruleset.id, rule = %rule.name, ?code, "rule fired");
            fired += 1;
        }

        let frame = Frame {
            ruleset_id: self.ruleset.id,
            owner: self.ruleset.owner,
            shared_tag: SharedTag::NONE,
        };
        if interpreter::run(&self.ruleset.termination, &mut self.state, &frame, env) == ReturnCode::Terminated {
            self.terminate(env);
        }
        fired
    }

    /// Consumption path for one bound resource.
    /// Returns false when the runtime does not hold `key`.
    pub fn release(&mut self, key: QubitKey, env: &mut ExecEnv<'_>) -> bool {
        let Some((_, handle)) = self.state.qubits.remove_any(|h| h.key() == key) else {
            return false;
        };
        self.state.named.retain(|_, k| *k != key);
        env.backend.apply(&PhysicalOperation::Reinitialize { target: key });
        env.pool.release(handle);
        true
    }

    /// Mark terminated and return every bound resource to the pool
    pub fn terminate(&mut self, env: &mut ExecEnv<'_>) {
        self.terminated = true;
        self.state.named.clear();
        let released = release_all(&mut self.state.qubits, env.pool, env.backend);
        debug!(ruleset = %self.ruleset.id, released, "runtime terminated");
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            terminated: self.terminated,
            active_partners: self.state.qubits.key_count(),
            qubit_resources: self.state.qubits.len(),
            message_queues: self.state.messages.key_count(),
            named_qubits: self.state.named.len(),
        }
    }
}

fn release_all(
    qubits: &mut MultiMap<NodeAddr, QubitHandle>,
    pool: &mut ResourcePool,
    backend: &mut dyn qnet_core::PhysicalBackend,
) -> usize {
    let handles = qubits.drain_all();
    let count = handles.len();
    for (_, handle) in handles {
        backend.apply(&PhysicalOperation::Reinitialize { target: handle.key() });
        pool.release(handle);
    }
    count
}
