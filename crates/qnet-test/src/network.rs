//! Multi-node test network
//!
//! Owns one [`RuleEngine`] per node and a shared [`Scheduler`]. After every
//! delivery the node's outbound messages are routed to their destinations
//! with a fixed latency and its timer commands are applied to the schedule.

use std::collections::BTreeMap;

use qnet_core::{
    Envelope, MessageBody, NodeAddr, OpaqueMessage, OutboundMessage, PhysicalBackend, PurificationResult,
    RuleMessage, SimTime, StopEppsEmission, SwappingResult,
};
use qnet_engine::{EngineConfig, RuleEngine, TimerCommand};
use tracing::{debug, trace};

use crate::{HarnessError, HarnessResult, Scheduler};

/// Rule message kinds the network turns into typed results
pub const PURIFICATION_RESULT_KIND: &str = "purification_result";
pub const SWAPPING_RESULT_KIND: &str = "swapping_result";

/// One delivered message, for determinism checks
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub at: SimTime,
    pub id: u64,
    pub dest: NodeAddr,
    pub type_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct NetworkStats {
    pub delivered: u64,
    pub routed: u64,
    pub timers_scheduled: u64,
    pub timers_cancelled: u64,
    pub messages_kept: u64,
}

pub struct QuantumNetwork {
    nodes: BTreeMap<NodeAddr, RuleEngine>,
    scheduler: Scheduler,
    latency: SimTime,
    now: SimTime,
    max_deliveries: usize,
    trace: Vec<TraceEntry>,
    epps_stops: Vec<StopEppsEmission>,
    stats: NetworkStats,
}

impl QuantumNetwork {
    pub fn new(latency: SimTime) -> Self {
        QuantumNetwork {
            nodes: BTreeMap::new(),
            scheduler: Scheduler::new(),
            latency,
            now: SimTime::ZERO,
            max_deliveries: 100_000,
            trace: Vec::new(),
            epps_stops: Vec::new(),
            stats: NetworkStats::default(),
        }
    }

    /// Cap on deliveries per `run_until` call
    pub fn with_max_deliveries(mut self, max: usize) -> Self {
        self.max_deliveries = max;
        self
    }

    /// Add a node running every default protocol handler
    pub fn add_node(&mut self, config: EngineConfig, backend: Box<dyn PhysicalBackend>) -> HarnessResult<()> {
        let addr = config.node_addr;
        if self.nodes.contains_key(&addr) {
            return Err(HarnessError::DuplicateNode(addr));
        }
        let engine = RuleEngine::with_default_handlers(config, backend)?;
        self.nodes.insert(addr, engine);
        Ok(())
    }

    pub fn node(&self, addr: NodeAddr) -> HarnessResult<&RuleEngine> {
        self.nodes.get(&addr).ok_or(HarnessError::UnknownNode(addr))
    }

    pub fn node_mut(&mut self, addr: NodeAddr) -> HarnessResult<&mut RuleEngine> {
        self.nodes.get_mut(&addr).ok_or(HarnessError::UnknownNode(addr))
    }

    /// Schedule `body` for delivery to `dest` at `at`
    pub fn send(&mut self, at: SimTime, dest: NodeAddr, body: MessageBody) -> u64 {
        self.scheduler.schedule(at, dest, Some(Envelope::of(body)))
    }

    /// Run a cycle at `dest` without a message
    pub fn wake(&mut self, at: SimTime, dest: NodeAddr) -> u64 {
        self.scheduler.schedule(at, dest, None)
    }

    /// Deliver the next scheduled message. False when nothing is pending.
    pub fn step(&mut self) -> HarnessResult<bool> {
        let Some(delivery) = self.scheduler.pop_next() else {
            return Ok(false);
        };
        self.now = delivery.at;
        let type_name = delivery
            .envelope
            .as_ref()
            .map_or_else(|| "None".to_string(), |env| env.type_name().to_string());
        trace!(at = ?delivery.at, node = delivery.dest.0, msg = %type_name, "delivering");
        self.trace.push(TraceEntry {
            at: delivery.at,
            id: delivery.id,
            dest: delivery.dest,
            type_name,
        });

        let engine = self
            .nodes
            .get_mut(&delivery.dest)
            .ok_or(HarnessError::UnknownNode(delivery.dest))?;
        let report = engine
            .handle_message(delivery.envelope, delivery.at, Some(delivery.id))
            .map_err(|source| HarnessError::Engine {
                node: delivery.dest.0,
                source,
            })?;
        self.stats.delivered += 1;
        if report.keep_message {
            self.stats.messages_kept += 1;
        }
        self.route(delivery.dest, delivery.at)?;
        Ok(true)
    }

    /// Deliver everything scheduled at or before `until`
    pub fn run_until(&mut self, until: SimTime) -> HarnessResult<usize> {
        let mut delivered = 0;
        while self.scheduler.peek_next().is_some_and(|d| d.at <= until) {
            if delivered == self.max_deliveries {
                return Err(HarnessError::DeliveryLimit(self.max_deliveries));
            }
            self.step()?;
            delivered += 1;
        }
        self.now = self.now.max(until);
        Ok(delivered)
    }

    fn route(&mut self, from: NodeAddr, now: SimTime) -> HarnessResult<()> {
        let engine = self.nodes.get_mut(&from).ok_or(HarnessError::UnknownNode(from))?;
        let outbox = engine.take_outbox();
        let commands = engine.take_timer_commands();

        for message in outbox {
            let dest = message.dest();
            match message {
                OutboundMessage::MsmResult(result) => {
                    self.scheduler.schedule(
                        now + self.latency,
                        dest,
                        Some(Envelope::of(MessageBody::MsmResult(result))),
                    );
                }
                OutboundMessage::StopEppsEmission(stop) => {
                    debug!(src = stop.src.0, epps = stop.dest.0, "pair source stop requested");
                    self.epps_stops.push(stop);
                    continue;
                }
                OutboundMessage::Rule(message) => {
                    self.scheduler
                        .schedule(now + self.latency, dest, Some(rule_message_envelope(&message)));
                }
            }
            self.stats.routed += 1;
        }

        for command in commands {
            match command {
                TimerCommand::ScheduleAt { at, envelope } => {
                    self.scheduler.schedule(at, from, Some(envelope));
                    self.stats.timers_scheduled += 1;
                }
                TimerCommand::Cancel { slot } => {
                    self.stats.timers_cancelled += self.scheduler.cancel_timer(from, slot) as u64;
                }
            }
        }
        Ok(())
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn pending(&self) -> usize {
        self.scheduler.len()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Stop requests addressed to pair sources, which are not simulated
    pub fn epps_stops(&self) -> &[StopEppsEmission] {
        &self.epps_stops
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}

/// Transport form of a message sent by a rule action
pub fn rule_message_envelope(message: &RuleMessage) -> Envelope {
    let body = match (message.kind.as_str(), message.content.as_slice()) {
        (PURIFICATION_RESULT_KIND, &[sequence, measurement, protocol]) => {
            MessageBody::PurificationResult(PurificationResult {
                ruleset_id: message.ruleset_id,
                shared_tag: message.shared_tag,
                sequence,
                measurement,
                protocol,
            })
        }
        (SWAPPING_RESULT_KIND, &[sequence, correction_frame, new_partner]) => {
            MessageBody::SwappingResult(SwappingResult {
                ruleset_id: message.ruleset_id,
                shared_tag: message.shared_tag,
                sequence,
                correction_frame,
                new_partner: NodeAddr(new_partner as i32),
            })
        }
        _ => MessageBody::Opaque(OpaqueMessage::new(message.kind.clone()).with_fields(serde_json::json!({
            "ruleset_id": message.ruleset_id.0,
            "shared_tag": message.shared_tag.0,
            "src": message.src.0,
            "content": message.content,
        }))),
    };
    Envelope::of(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{IdealBackend, RuleSetId, SharedTag};

    fn rule_message(kind: &str, content: Vec<i64>) -> RuleMessage {
        RuleMessage {
            ruleset_id: RuleSetId(3),
            shared_tag: SharedTag(1),
            src: NodeAddr(1),
            dest: NodeAddr(2),
            kind: kind.to_string(),
            content,
        }
    }

    #[test]
    fn test_rule_message_translation() {
        let env = rule_message_envelope(&rule_message(PURIFICATION_RESULT_KIND, vec![1, 0, 2]));
        assert!(matches!(
            env.body,
            MessageBody::PurificationResult(PurificationResult { measurement: 0, protocol: 2, .. })
        ));

        let env = rule_message_envelope(&rule_message(SWAPPING_RESULT_KIND, vec![1, 3, 7]));
        assert!(matches!(
            env.body,
            MessageBody::SwappingResult(SwappingResult {
                new_partner: NodeAddr(7),
                ..
            })
        ));

        // Wrong arity stays opaque
        let env = rule_message_envelope(&rule_message(PURIFICATION_RESULT_KIND, vec![1]));
        assert_eq!(env.type_name(), PURIFICATION_RESULT_KIND);
    }

    #[test]
    fn test_unknown_destination_fails_step() {
        let mut network = QuantumNetwork::new(SimTime::from_micros(1));
        network.wake(SimTime::from_micros(1), NodeAddr(9));
        assert!(matches!(network.step(), Err(HarnessError::UnknownNode(NodeAddr(9)))));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut network = QuantumNetwork::new(SimTime::from_micros(1));
        let config = EngineConfig::emitter_node(NodeAddr(1), 1, 2);
        network.add_node(config.clone(), Box::new(IdealBackend)).unwrap();
        assert!(matches!(
            network.add_node(config, Box::new(IdealBackend)),
            Err(HarnessError::DuplicateNode(_))
        ));
    }
}
