//! Resource pool
//!
//! The pool owns one [`QubitRecord`] per stationary qubit of every configured
//! channel slot, plus the index of entangled resources keyed by
//! `(slot, partner)`. A runtime can only use a resource through a
//! [`QubitHandle`], and [`ResourcePool::allocate`] is the only place one is
//! created: a record is either in the pool's hands or in exactly one
//! runtime's hands.

use std::collections::BTreeMap;

use qnet_core::{ChannelSlot, MultiMap, NodeAddr, QnetError, QnetResult, QubitKey};
use tracing::debug;

/// Allocation state of one stationary qubit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QubitRecord {
    key: QubitKey,
    busy: bool,
    allocated: bool,
}

impl QubitRecord {
    fn new(key: QubitKey) -> Self {
        QubitRecord {
            key,
            busy: false,
            allocated: false,
        }
    }

    #[inline]
    pub fn key(&self) -> QubitKey {
        self.key
    }

    #[inline]
    pub fn slot(&self) -> ChannelSlot {
        self.key.slot
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Neither reserved by the hardware nor held by a runtime
    #[inline]
    pub fn is_free(&self) -> bool {
        !self.busy && !self.allocated
    }
}

/// Exclusive claim on an allocated resource.
///
/// Not `Clone`: the only way back into the pool is [`ResourcePool::release`].
#[must_use = "an allocated resource must be bound or released"]
#[derive(Debug, PartialEq, Eq)]
pub struct QubitHandle {
    key: QubitKey,
}

impl QubitHandle {
    #[inline]
    pub fn key(&self) -> QubitKey {
        self.key
    }
}

/// Pool counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub busy: usize,
    pub allocated: usize,
    pub entangled: usize,
}

/// Owner of every qubit record on a node
#[derive(Debug, Default)]
pub struct ResourcePool {
    slots: BTreeMap<ChannelSlot, u16>,
    records: BTreeMap<QubitKey, QubitRecord>,
    entangled: MultiMap<(ChannelSlot, NodeAddr), QubitKey>,
    partners: BTreeMap<QubitKey, NodeAddr>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot with `qubits` stationary qubits
    pub fn add_slot(&mut self, slot: ChannelSlot, qubits: u16) {
        if self.slots.insert(slot, qubits).is_some() {
            return;
        }
        for index in 0..qubits {
            let key = slot.qubit(index);
            self.records.insert(key, QubitRecord::new(key));
        }
    }

    /// Configured slots in allocation order
    pub fn slots(&self) -> impl Iterator<Item = ChannelSlot> + '_ {
        self.slots.keys().copied()
    }

    pub fn has_slot(&self, slot: ChannelSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn record(&self, key: QubitKey) -> Option<&QubitRecord> {
        self.records.get(&key)
    }

    // Emission bookkeeping

    /// Qubits in `slot` available for a new emission attempt
    pub fn count_free(&self, slot: ChannelSlot) -> usize {
        self.slot_records(slot).filter(|r| r.is_free()).count()
    }

    /// Reserve the lowest-indexed free qubit in `slot`
    pub fn take_free(&mut self, slot: ChannelSlot) -> Option<QubitKey> {
        let key = self.slot_records(slot).find(|r| r.is_free())?.key;
        if let Some(record) = self.records.get_mut(&key) {
            record.busy = true;
        }
        Some(key)
    }

    pub fn set_busy(&mut self, key: QubitKey, busy: bool) -> QnetResult<()> {
        let record = self.records.get_mut(&key).ok_or(QnetError::UnknownQubit(key))?;
        record.busy = busy;
        Ok(())
    }

    /// Failure path: return reserved qubits that never became entangled
    pub fn free_pending<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = QubitKey>,
    {
        for key in keys {
            if self.partners.contains_key(&key) {
                continue;
            }
            if let Some(record) = self.records.get_mut(&key) {
                if !record.allocated {
                    record.busy = false;
                }
            }
        }
    }

    // Entangled resources

    /// Record `key` as entangled with `partner`
    pub fn insert(&mut self, partner: NodeAddr, key: QubitKey) -> QnetResult<()> {
        let record = self.records.get_mut(&key).ok_or(QnetError::UnknownQubit(key))?;
        record.busy = true;
        self.link(key, partner);
        debug!(qubit = ?key, partner = partner.0, "entangled resource inserted");
        Ok(())
    }

    /// Move an allocated resource's entanglement to `partner`, e.g. after a swap
    pub fn rebind(&mut self, handle: &QubitHandle, partner: NodeAddr) {
        self.link(handle.key, partner);
        debug!(qubit = ?handle.key, partner = partner.0, "resource rebound");
    }

    /// Entangled records for `(slot, partner)` in insertion order
    pub fn range(&self, slot: ChannelSlot, partner: NodeAddr) -> impl Iterator<Item = &QubitRecord> + '_ {
        self.entangled
            .get(&(slot, partner))
            .filter_map(move |key| self.records.get(key))
    }

    /// Drop `key` from the entangled index
    pub fn erase(&mut self, key: QubitKey) -> bool {
        match self.partners.remove(&key) {
            Some(partner) => self.entangled.remove_first(&(key.slot, partner), |k| *k == key).is_some(),
            None => false,
        }
    }

    pub fn partner_of(&self, key: QubitKey) -> Option<NodeAddr> {
        self.partners.get(&key).copied()
    }

    pub fn is_entangled(&self, key: QubitKey) -> bool {
        self.partners.contains_key(&key)
    }

    // Ownership transfer

    /// Hand an unallocated entangled record to a runtime
    pub fn allocate(&mut self, key: QubitKey) -> Option<QubitHandle> {
        if !self.partners.contains_key(&key) {
            return None;
        }
        let record = self.records.get_mut(&key)?;
        if record.allocated {
            return None;
        }
        record.allocated = true;
        Some(QubitHandle { key })
    }

    /// Consumption path: clear both flags and drop the entangled entry
    pub fn release(&mut self, handle: QubitHandle) -> QubitKey {
        let key = handle.key;
        if let Some(record) = self.records.get_mut(&key) {
            record.busy = false;
            record.allocated = false;
        }
        self.erase(key);
        debug!(qubit = ?key, "resource released");
        key
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.records.len(),
            busy: self.records.values().filter(|r| r.busy).count(),
            allocated: self.records.values().filter(|r| r.allocated).count(),
            entangled: self.entangled.len(),
        }
    }

    fn link(&mut self, key: QubitKey, partner: NodeAddr) {
        if let Some(previous) = self.partners.insert(key, partner) {
            self.entangled.remove_first(&(key.slot, previous), |k| *k == key);
        }
        self.entangled.insert((key.slot, partner), key);
    }

    fn slot_records(&self, slot: ChannelSlot) -> impl Iterator<Item = &QubitRecord> + '_ {
        self.records
            .range(slot.qubit(0)..=slot.qubit(u16::MAX))
            .map(|(_, record)| record)
    }
}
