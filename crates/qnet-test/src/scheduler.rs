//! Deterministic discrete-event scheduler
//!
//! A `BinaryHeap` with reversed ordering acts as a min-heap keyed by
//! `(at, id)`. Ids are strictly increasing, so deliveries scheduled for the
//! same instant leave in scheduling order and two runs with the same inputs
//! dispatch identically.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use qnet_core::{ChannelSlot, Envelope, MessageBody, NodeAddr, SimTime};

/// A message waiting for delivery
#[derive(Clone, Debug)]
pub struct Delivery {
    pub id: u64,
    pub at: SimTime,
    pub dest: NodeAddr,
    /// `None` wakes the node without a message
    pub envelope: Option<Envelope>,
}

impl Delivery {
    /// Slot of the emission timer this delivery carries, if any
    pub fn timer_slot(&self) -> Option<ChannelSlot> {
        match &self.envelope {
            Some(env) if env.self_timer => match &env.body {
                MessageBody::EmitPhotonRequest(request) => Some(request.slot),
                _ => None,
            },
            _ => None,
        }
    }
}

impl PartialEq for Delivery {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl Eq for Delivery {}

impl Ord for Delivery {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behaviour
        other.at.cmp(&self.at).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Delivery {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Delivery>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a delivery. Returns its id, which doubles as the event number.
    pub fn schedule(&mut self, at: SimTime, dest: NodeAddr, envelope: Option<Envelope>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Delivery { id, at, dest, envelope });
        id
    }

    /// Drop every pending emission timer for `slot` at `dest`
    pub fn cancel_timer(&mut self, dest: NodeAddr, slot: ChannelSlot) -> usize {
        let before = self.queue.len();
        self.queue
            .retain(|d| !(d.dest == dest && d.timer_slot() == Some(slot)));
        before - self.queue.len()
    }

    pub fn pop_next(&mut self) -> Option<Delivery> {
        self.queue.pop()
    }

    pub fn peek_next(&self) -> Option<&Delivery> {
        self.queue.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
