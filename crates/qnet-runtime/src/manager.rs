//! Runtime collection
//!
//! Owns every live [`Runtime`], keyed by rule set id in submission order.
//! Also runs the allocation pass that matches pooled resources to runtimes.

use std::collections::BTreeSet;

use qnet_core::{ChannelSlot, NodeAddr, PhysicalBackend, QubitKey, RuleMessage, RuleSet, RuleSetId, SharedTag};
use qnet_pool::{QubitHandle, ResourcePool};
use tracing::{debug, warn};

use crate::interpreter::{ExecEnv, DEFAULT_STEP_BUDGET};
use crate::{MessageRecord, Runtime, RuntimeSnapshot};

/// Collection of live runtimes
#[derive(Debug)]
pub struct RuntimeManager {
    runtimes: Vec<Runtime>,
    /// Every id ever accepted, including purged ones
    seen: BTreeSet<RuleSetId>,
    outbox: Vec<RuleMessage>,
    step_budget: usize,
}

impl Default for RuntimeManager {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_BUDGET)
    }
}

impl RuntimeManager {
    pub fn new(step_budget: usize) -> Self {
        RuntimeManager {
            runtimes: Vec::new(),
            seen: BTreeSet::new(),
            outbox: Vec::new(),
            step_budget,
        }
    }

    /// Create a runtime for `ruleset`. Known ids are ignored.
    pub fn submit(&mut self, ruleset: RuleSet) -> bool {
        if !self.seen.insert(ruleset.id) {
            warn!(ruleset = %ruleset.id, "duplicate rule set submission ignored");
            return false;
        }
        debug!(ruleset = %ruleset.id, rules = ruleset.rules.len(), "rule set submitted");
        self.runtimes.push(Runtime::new(ruleset));
        true
    }

    pub fn find(&self, id: RuleSetId) -> Option<&Runtime> {
        self.runtimes.iter().find(|r| r.id() == id)
    }

    pub fn find_mut(&mut self, id: RuleSetId) -> Option<&mut Runtime> {
        self.runtimes.iter_mut().find(|r| r.id() == id)
    }

    pub fn at(&self, index: usize) -> Option<&Runtime> {
        self.runtimes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Runtime> + '_ {
        self.runtimes.iter()
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    /// Run one pass over every live runtime in submission order
    pub fn execute_all(&mut self, pool: &mut ResourcePool, backend: &mut dyn PhysicalBackend) -> usize {
        let mut env = ExecEnv {
            pool,
            backend,
            outbox: &mut self.outbox,
            step_budget: self.step_budget,
        };
        self.runtimes.iter_mut().map(|runtime| runtime.exec(&mut env)).sum()
    }

    /// Bind a resource to runtime `id`. An unknown id hands the resource back.
    pub fn assign_qubit(&mut self, id: RuleSetId, partner: NodeAddr, handle: QubitHandle) -> Result<(), QubitHandle> {
        match self.find_mut(id) {
            Some(runtime) if !runtime.is_terminated() => {
                runtime.assign_qubit(partner, handle);
                Ok(())
            }
            _ => Err(handle),
        }
    }

    /// Queue a message for runtime `id`; unknown ids are ignored
    pub fn assign_message(&mut self, id: RuleSetId, tag: SharedTag, record: MessageRecord) -> bool {
        match self.find_mut(id) {
            Some(runtime) => {
                runtime.assign_message(tag, record);
                true
            }
            None => {
                debug!(ruleset = %id, tag = tag.0, "message for unknown rule set dropped");
                false
            }
        }
    }

    /// Allocation pass for one slot.
    ///
    /// Runtimes are visited in submission order and partners in address
    /// order; each unallocated record in the pool's range is handed to the
    /// first runtime that still wants it.
    pub fn allocate_resources(&mut self, pool: &mut ResourcePool, slot: ChannelSlot) -> usize {
        let mut assigned = 0;
        for runtime in self.runtimes.iter_mut().filter(|r| !r.is_terminated()) {
            let partners: Vec<NodeAddr> = runtime.partners().collect();
            for partner in partners {
                let candidates: Vec<QubitKey> = pool
                    .range(slot, partner)
                    .filter(|record| !record.is_allocated())
                    .map(|record| record.key())
                    .collect();
                for key in candidates {
                    if !runtime.wants_resource(partner) {
                        break;
                    }
                    if let Some(handle) = pool.allocate(key) {
                        debug!(ruleset = %runtime.id(), qubit = ?key, partner = partner.0, "resource allocated");
                        runtime.assign_qubit(partner, handle);
                        assigned += 1;
                    }
                }
            }
        }
        assigned
    }

    /// Consumption path for a resource held by runtime `id`
    pub fn release(
        &mut self,
        id: RuleSetId,
        key: QubitKey,
        pool: &mut ResourcePool,
        backend: &mut dyn PhysicalBackend,
    ) -> bool {
        let Some(runtime) = self.runtimes.iter_mut().find(|r| r.id() == id) else {
            return false;
        };
        let mut env = ExecEnv {
            pool,
            backend,
            outbox: &mut self.outbox,
            step_budget: self.step_budget,
        };
        runtime.release(key, &mut env)
    }

    pub fn snapshot(&self, id: RuleSetId) -> Option<RuntimeSnapshot> {
        self.find(id).map(Runtime::snapshot)
    }

    pub fn snapshot_at(&self, index: usize) -> Option<RuntimeSnapshot> {
        self.at(index).map(Runtime::snapshot)
    }

    /// Drop terminated runtimes. Their ids stay reserved.
    pub fn purge_terminated(&mut self) -> usize {
        let before = self.runtimes.len();
        self.runtimes.retain(|r| !r.is_terminated());
        before - self.runtimes.len()
    }

    /// Messages queued by rule actions since the last call
    pub fn take_outbox(&mut self) -> Vec<RuleMessage> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use qnet_core::{IdealBackend, Instruction, Program, QubitId, ReturnCode, Rule};

    fn waiting_ruleset(id: u64, partner: NodeAddr) -> RuleSet {
        RuleSet::new(RuleSetId(id), NodeAddr(1)).with_rule(
            Rule::new(
                "wait",
                Program::new(
                    "cond",
                    vec![
                        Instruction::GetQubit {
                            dst: QubitId(0),
                            partner,
                            index: 0,
                        },
                        Instruction::Ret {
                            code: ReturnCode::CondFailed,
                        },
                    ],
                ),
                Program::default(),
            )
            .with_partner(partner),
        )
    }

    fn pool_with_pairs(partner: NodeAddr, pairs: u16, size: u16) -> ResourcePool {
        let mut pool = ResourcePool::new();
        let slot = ChannelSlot::emitter(0);
        pool.add_slot(slot, size);
        for index in 0..pairs {
            pool.insert(partner, slot.qubit(index)).unwrap();
        }
        pool
    }

    #[test]
    fn test_submit_is_idempotent() {
        let mut manager = RuntimeManager::default();
        assert!(manager.submit(waiting_ruleset(7, NodeAddr(2))));
        assert!(!manager.submit(waiting_ruleset(7, NodeAddr(3))));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.find(RuleSetId(7)).unwrap().partners().collect::<Vec<_>>(), vec![NodeAddr(2)]);
    }

    #[test]
    fn test_purged_ids_stay_reserved() {
        let mut manager = RuntimeManager::default();
        let mut pool = ResourcePool::new();
        let mut backend = IdealBackend;
        let ruleset = RuleSet::new(RuleSetId(1), NodeAddr(1))
            .with_termination(Program::returning("done", ReturnCode::Terminated));
        manager.submit(ruleset.clone());
        manager.execute_all(&mut pool, &mut backend);
        assert!(manager.snapshot(RuleSetId(1)).unwrap().terminated);

        assert_eq!(manager.purge_terminated(), 1);
        assert!(manager.find(RuleSetId(1)).is_none());
        assert!(!manager.submit(ruleset));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_assign_message_unknown_id_is_noop() {
        let mut manager = RuntimeManager::default();
        manager.submit(waiting_ruleset(1, NodeAddr(2)));
        assert!(!manager.assign_message(RuleSetId(99), SharedTag(0), vec![1]));
        assert!(manager.assign_message(RuleSetId(1), SharedTag(0), vec![1]));
        assert_eq!(manager.snapshot(RuleSetId(1)).unwrap().message_queues, 1);
    }

    #[test]
    fn test_assign_qubit_unknown_id_returns_handle() {
        let mut manager = RuntimeManager::default();
        let mut pool = pool_with_pairs(NodeAddr(2), 1, 2);
        let key = ChannelSlot::emitter(0).qubit(0);
        let handle = pool.allocate(key).unwrap();
        let handle = manager.assign_qubit(RuleSetId(5), NodeAddr(2), handle).unwrap_err();
        pool.release(handle);
        assert!(pool.record(key).unwrap().is_free());
    }

    #[test]
    fn test_unlimited_runtime_takes_all_in_submission_order() {
        let mut manager = RuntimeManager::default();
        manager.submit(waiting_ruleset(1, NodeAddr(2)));
        manager.submit(waiting_ruleset(2, NodeAddr(2)));
        let mut pool = pool_with_pairs(NodeAddr(2), 3, 4);

        assert_eq!(manager.allocate_resources(&mut pool, ChannelSlot::emitter(0)), 3);
        assert_eq!(manager.snapshot(RuleSetId(1)).unwrap().qubit_resources, 3);
        assert_eq!(manager.snapshot(RuleSetId(2)).unwrap().qubit_resources, 0);

        // A second pass finds nothing new
        assert_eq!(manager.allocate_resources(&mut pool, ChannelSlot::emitter(0)), 0);
    }

    #[test]
    fn test_allocation_skips_other_slots_and_partners() {
        let mut manager = RuntimeManager::default();
        manager.submit(waiting_ruleset(1, NodeAddr(3)));
        let mut pool = pool_with_pairs(NodeAddr(2), 2, 2);
        assert_eq!(manager.allocate_resources(&mut pool, ChannelSlot::emitter(0)), 0);
        assert_eq!(manager.allocate_resources(&mut pool, ChannelSlot::receiver(0)), 0);
    }

    #[test]
    fn test_release_through_manager() {
        let mut manager = RuntimeManager::default();
        manager.submit(waiting_ruleset(1, NodeAddr(2)));
        let mut pool = pool_with_pairs(NodeAddr(2), 1, 1);
        let mut backend = IdealBackend;
        manager.allocate_resources(&mut pool, ChannelSlot::emitter(0));
        let key = ChannelSlot::emitter(0).qubit(0);

        assert!(manager.release(RuleSetId(1), key, &mut pool, &mut backend));
        assert!(!manager.find(RuleSetId(1)).unwrap().holds(key));
        let record = pool.record(key).unwrap();
        assert!(!record.is_busy() && !record.is_allocated());
        assert!(!manager.release(RuleSetId(9), key, &mut pool, &mut backend));
    }

    #[test]
    fn test_outbox_collects_sends() {
        let mut manager = RuntimeManager::default();
        let ruleset = RuleSet::new(RuleSetId(4), NodeAddr(1)).with_rule(
            Rule::new(
                "announce",
                Program::returning("always", ReturnCode::CondPassed),
                Program::new(
                    "send",
                    vec![Instruction::Send {
                        partner: qnet_core::Operand::Imm(2),
                        kind: "hello".to_string(),
                        content: vec![],
                    }],
                ),
            )
            .with_shared_tag(SharedTag(8)),
        );
        manager.submit(ruleset);
        let mut pool = ResourcePool::new();
        let mut backend = IdealBackend;
        assert_eq!(manager.execute_all(&mut pool, &mut backend), 1);
        let outbox = manager.take_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].shared_tag, SharedTag(8));
        assert!(manager.take_outbox().is_empty());
    }

    proptest! {
        #[test]
        fn prop_at_most_once_allocation(pairs in 1u16..8, extra in 1usize..6) {
            let runtimes = pairs as usize + extra;
            let mut manager = RuntimeManager::default();
            for id in 0..runtimes {
                manager.submit(waiting_ruleset(id as u64, NodeAddr(2)).with_resource_limit(1));
            }
            let mut pool = pool_with_pairs(NodeAddr(2), pairs, pairs);

            let assigned = manager.allocate_resources(&mut pool, ChannelSlot::emitter(0));
            prop_assert_eq!(assigned, pairs as usize);

            let holders = manager.iter().filter(|r| r.snapshot().qubit_resources == 1).count();
            prop_assert_eq!(holders, pairs as usize);
            prop_assert!(manager.iter().all(|r| r.snapshot().qubit_resources <= 1));

            let mut keys: Vec<QubitKey> = manager.iter().flat_map(|r| r.bound_qubits().map(|(_, k)| k).collect::<Vec<_>>()).collect();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), pairs as usize);

            prop_assert_eq!(manager.allocate_resources(&mut pool, ChannelSlot::emitter(0)), 0);
        }
    }
}
