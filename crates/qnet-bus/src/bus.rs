//! Rule event bus
//!
//! Buffers classified events and releases them in `(time, sequence)` order.
//! The sequence is the scheduler's event number when it has one; otherwise a
//! local counter supplies a strictly increasing fallback.

use qnet_core::{Envelope, OpaqueMessage, RuleEvent, SimTime};
use tracing::trace;

use crate::{Classifier, Translation};

/// Ordered event buffer
pub struct RuleEventBus {
    classifier: Classifier,
    queue: Vec<RuleEvent>,
    next_fallback: u64,
}

impl RuleEventBus {
    pub fn new() -> Self {
        Self::with_fallback_start(0)
    }

    /// Bus whose fallback sequence counter starts at `start`
    pub fn with_fallback_start(start: u64) -> Self {
        RuleEventBus {
            classifier: Classifier::new(),
            queue: Vec::new(),
            next_fallback: start,
        }
    }

    /// Classify and enqueue a transport message
    pub fn publish_message(&mut self, msg: Option<&Envelope>, now: SimTime, event_number: Option<u64>) -> u64 {
        let sequence = match event_number {
            Some(n) => n,
            None => self.fallback_sequence(),
        };
        let event = self.classifier.classify(msg, now, sequence);
        trace!(
            kind = event.kind.as_str(),
            protocol = event.protocol.as_str(),
            sequence,
            "published message"
        );
        self.publish(event);
        sequence
    }

    /// Enqueue an already classified event
    pub fn publish(&mut self, event: RuleEvent) {
        self.queue.push(event);
    }

    /// Remove every event with `time <= now`, ordered by `(time, sequence)`
    pub fn drain(&mut self, now: SimTime) -> Vec<RuleEvent> {
        // Stable sort: equal keys keep publication order.
        self.queue.sort_by_key(RuleEvent::order_key);
        let split = self.queue.partition_point(|event| event.time <= now);
        let later = self.queue.split_off(split);
        std::mem::replace(&mut self.queue, later)
    }

    pub fn register_translator<F>(&mut self, type_name: impl Into<String>, translator: F) -> bool
    where
        F: Fn(&OpaqueMessage) -> Option<Translation> + 'static,
    {
        self.classifier.register_translator(type_name, translator)
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut Classifier {
        &mut self.classifier
    }

    /// Events still queued
    pub fn pending(&self) -> &[RuleEvent] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn fallback_sequence(&mut self) -> u64 {
        let sequence = self.next_fallback;
        self.next_fallback = self.next_fallback.saturating_add(1);
        sequence
    }
}

impl Default for RuleEventBus {
    fn default() -> Self {
        Self::new()
    }
}
