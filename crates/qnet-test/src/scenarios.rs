//! End-to-end scenarios over a [`QuantumNetwork`]
//!
//! Builders for the rule sets and link messages the scenarios share, plus
//! the scenarios themselves as tests.

use qnet_core::{
    BsmResult, BsmSuccess, BsmTimingNotification, ChannelSlot, EppsTimingNotification, GateKind, Instruction,
    MessageBody, NodeAddr, Operand, PauliOperator, Program, QubitId, RegId, ReturnCode, Rule, RuleSet, RuleSetId,
    SharedTag, SimTime,
};

use crate::{HarnessResult, QuantumNetwork, PURIFICATION_RESULT_KIND};

/// Memory key the purification acceptor stores the remote outcome under
pub const REMOTE_OUTCOME_KEY: &str = "remote_outcome";

/// Two-pair purification between `owner` and `partner`.
///
/// Rule `purify` measures the second pair and reports the outcome to the
/// partner; rule `accept` stores the partner's reported outcome.
pub fn purification_ruleset(id: RuleSetId, owner: NodeAddr, partner: NodeAddr, tag: SharedTag) -> RuleSet {
    let condition = Program::new(
        "two_pairs",
        vec![
            Instruction::GetQubit {
                dst: QubitId(0),
                partner,
                index: 0,
            },
            Instruction::GetQubit {
                dst: QubitId(1),
                partner,
                index: 1,
            },
            Instruction::Ret {
                code: ReturnCode::CondPassed,
            },
        ],
    );
    let action = Program::new(
        "measure_and_report",
        vec![
            Instruction::Gate {
                gate: GateKind::Cnot,
                qubits: vec![QubitId(0), QubitId(1)],
            },
            Instruction::Measure {
                dst: RegId(0),
                qubit: QubitId(1),
                basis: PauliOperator::Z,
            },
            Instruction::FreeQubit { qubit: QubitId(1) },
            Instruction::Send {
                partner: Operand::Imm(i64::from(partner.0)),
                kind: PURIFICATION_RESULT_KIND.to_string(),
                content: vec![Operand::Imm(1), Operand::Reg(RegId(0)), Operand::Imm(0)],
            },
        ],
    );
    let accept_condition = Program::new(
        "has_result",
        vec![
            Instruction::GetMessage {
                dst: vec![RegId(1), RegId(2), RegId(3)],
            },
            Instruction::Ret {
                code: ReturnCode::CondPassed,
            },
        ],
    );
    let accept_action = Program::new(
        "store_result",
        vec![
            Instruction::Store {
                key: REMOTE_OUTCOME_KEY.to_string(),
                src: Operand::Reg(RegId(2)),
            },
            Instruction::DeleteMessage,
        ],
    );
    RuleSet::new(id, owner)
        .with_rule(Rule::new("purify", condition, action).with_partner(partner).with_shared_tag(tag))
        .with_rule(Rule::new("accept", accept_condition, accept_action).with_shared_tag(tag))
}

/// Timing that starts an emission round on `slot` at `first_emit_time`
pub fn link_timing(slot: ChannelSlot, first_emit_time: SimTime, interval: SimTime) -> MessageBody {
    MessageBody::BsmTimingNotification(BsmTimingNotification {
        slot,
        first_emit_time,
        interval,
    })
}

/// Herald `photons` of the last round as shared between `a` and `b`
pub fn herald(
    network: &mut QuantumNetwork,
    at: SimTime,
    a: NodeAddr,
    b: NodeAddr,
    slot: ChannelSlot,
    photons: &[usize],
) {
    let successes: Vec<BsmSuccess> = photons
        .iter()
        .map(|&photon_index| BsmSuccess {
            photon_index,
            correction: PauliOperator::I,
        })
        .collect();
    for (node, neighbor) in [(a, b), (b, a)] {
        let result = BsmResult {
            slot,
            neighbor,
            successes: successes.clone(),
        };
        network.send(at, node, MessageBody::BsmResult(result));
    }
}

/// Pair-source timing for a passive receiver linked to `partner`
pub fn epps_timing(partner: NodeAddr, epps_addr: NodeAddr, first_emit_time: SimTime, interval: SimTime) -> MessageBody {
    MessageBody::EppsTimingNotification(EppsTimingNotification {
        qnic_index: 0,
        partner,
        partner_qnic_index: 0,
        epps_addr,
        first_emit_time,
        interval,
        total_travel_time: SimTime::from_micros(1),
    })
}

/// Two emitter nodes that generate two pairs and purify them
pub fn purification_run(network: &mut QuantumNetwork) -> HarnessResult<()> {
    let (a, b) = (NodeAddr(1), NodeAddr(2));
    let slot = ChannelSlot::emitter(0);
    for node in [a, b] {
        let partner = if node == a { b } else { a };
        network
            .node_mut(node)?
            .submit_ruleset(purification_ruleset(RuleSetId(1), node, partner, SharedTag(0)))?;
        network.send(
            SimTime::from_micros(1),
            node,
            link_timing(slot, SimTime::from_micros(2), SimTime::from_nanos(10)),
        );
    }
    network.run_until(SimTime::from_micros(3))?;
    herald(network, SimTime::from_micros(4), a, b, slot, &[0, 1]);
    network.run_until(SimTime::from_micros(10))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{IdealBackend, PhysicalOperation, SingleClickResult, StopEmitting};
    use qnet_engine::EngineConfig;

    use crate::{init_tracing, LossConfig, LossyBackend, RecordingBackend};

    fn emitter_pair() -> QuantumNetwork {
        let mut network = QuantumNetwork::new(SimTime::from_micros(1));
        for addr in [1, 2] {
            let config = EngineConfig::emitter_node(NodeAddr(addr), 1, 2);
            network.add_node(config, Box::new(IdealBackend)).unwrap();
        }
        network
    }

    #[test]
    fn test_emission_round_uses_every_emitter_once() {
        init_tracing();
        let mut network = QuantumNetwork::new(SimTime::from_micros(1));
        let backend = RecordingBackend::new();
        let log = backend.log();
        network
            .add_node(EngineConfig::emitter_node(NodeAddr(1), 1, 3), Box::new(backend))
            .unwrap();
        network.send(
            SimTime::from_micros(1),
            NodeAddr(1),
            link_timing(ChannelSlot::emitter(0), SimTime::from_micros(2), SimTime::from_nanos(10)),
        );
        network.run_until(SimTime::from_micros(5)).unwrap();

        let pulses: Vec<_> = log
            .borrow()
            .iter()
            .filter_map(|op| match op {
                PhysicalOperation::EmitPhoton { pulse, .. } => Some(*pulse),
                _ => None,
            })
            .collect();
        assert_eq!(pulses.len(), 3);
        assert!(pulses[0].begin && !pulses[0].end);
        assert!(!pulses[1].begin && !pulses[1].end);
        assert!(pulses[2].end);
        assert_eq!(network.pending(), 0);
    }

    #[test]
    fn test_new_timing_cancels_running_round() {
        let mut network = QuantumNetwork::new(SimTime::from_micros(1));
        let backend = RecordingBackend::new();
        let log = backend.log();
        network
            .add_node(EngineConfig::emitter_node(NodeAddr(1), 1, 4), Box::new(backend))
            .unwrap();
        let slot = ChannelSlot::emitter(0);
        network.send(
            SimTime::from_micros(1),
            NodeAddr(1),
            link_timing(slot, SimTime::from_micros(2), SimTime::from_micros(1)),
        );
        network.send(
            SimTime::from_nanos(2500),
            NodeAddr(1),
            link_timing(slot, SimTime::from_micros(10), SimTime::from_micros(1)),
        );
        network.run_until(SimTime::from_micros(5)).unwrap();

        let emitted = |log: &crate::OperationLog| {
            log.borrow()
                .iter()
                .filter(|op| matches!(op, PhysicalOperation::EmitPhoton { .. }))
                .count()
        };
        assert_eq!(emitted(&log), 1);
        assert_eq!(network.stats().timers_cancelled, 1);

        network.run_until(SimTime::from_micros(20)).unwrap();
        // The failed photon was freed, so the new round uses all four
        assert_eq!(emitted(&log), 5);
    }

    #[test]
    fn test_purification_between_two_nodes() {
        let mut network = emitter_pair();
        purification_run(&mut network).unwrap();

        for addr in [1, 2] {
            let engine = network.node(NodeAddr(addr)).unwrap();
            let runtime = engine.context().runtimes.find(RuleSetId(1)).unwrap();
            assert_eq!(runtime.memory(REMOTE_OUTCOME_KEY), Some(0));

            let snapshot = engine.snapshot(RuleSetId(1)).unwrap();
            assert_eq!(snapshot.qubit_resources, 1);
            assert_eq!(snapshot.active_partners, 1);

            let stats = engine.context().pool.stats();
            assert_eq!(stats.allocated, 1);
            assert_eq!(stats.entangled, 1);
        }
        assert!(network.stats().routed >= 2);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let run = |seed: u64| {
            let mut network = QuantumNetwork::new(SimTime::from_micros(1));
            for addr in [1, 2] {
                let backend = LossyBackend::new(LossConfig::noisy(), seed + addr as u64);
                let config = EngineConfig::emitter_node(NodeAddr(addr), 1, 2);
                network.add_node(config, Box::new(backend)).unwrap();
            }
            purification_run(&mut network).unwrap();
            let outcomes: Vec<_> = [1, 2]
                .iter()
                .map(|&addr| {
                    network
                        .node(NodeAddr(addr))
                        .unwrap()
                        .context()
                        .runtimes
                        .find(RuleSetId(1))
                        .and_then(|r| r.memory(REMOTE_OUTCOME_KEY))
                })
                .collect();
            (network.trace().to_vec(), outcomes)
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_midpoint_source_link() {
        let mut network = QuantumNetwork::new(SimTime::from_micros(1));
        let backend = RecordingBackend::new();
        let log = backend.log();
        network
            .add_node(EngineConfig::passive_node(NodeAddr(1), 1, 1), Box::new(backend))
            .unwrap();
        network
            .add_node(EngineConfig::passive_node(NodeAddr(2), 1, 1), Box::new(IdealBackend))
            .unwrap();
        let epps = NodeAddr(9);
        let interval = SimTime::from_micros(1000);
        for (addr, partner) in [(1, 2), (2, 1)] {
            let timing = epps_timing(NodeAddr(partner), epps, SimTime::from_micros(2), interval);
            network.send(SimTime::from_micros(1), NodeAddr(addr), timing);
        }
        network.run_until(SimTime::from_micros(2)).unwrap();

        for (addr, correction) in [(1, PauliOperator::I), (2, PauliOperator::Z)] {
            let click = SingleClickResult {
                qnic_index: 0,
                success: true,
                correction,
            };
            network.send(SimTime::from_micros(3), NodeAddr(addr), MessageBody::SingleClickResult(click));
        }
        network.run_until(SimTime::from_micros(10)).unwrap();

        let slot = ChannelSlot::passive(0);
        for (addr, partner) in [(1, 2), (2, 1)] {
            let pool = &network.node(NodeAddr(addr)).unwrap().context().pool;
            assert_eq!(pool.range(slot, NodeAddr(partner)).count(), 1);
        }
        // Only the lower address corrects the mismatched frame
        let z_gates = log
            .borrow()
            .iter()
            .filter(|op| matches!(op, PhysicalOperation::Gate { gate: GateKind::Z, .. }))
            .count();
        assert_eq!(z_gates, 1);

        network.send(
            SimTime::from_micros(20),
            NodeAddr(1),
            MessageBody::StopEmitting(StopEmitting { qnic_index: 0 }),
        );
        network.run_until(SimTime::from_micros(20)).unwrap();
        assert_eq!(network.epps_stops().len(), 1);
        assert_eq!(network.epps_stops()[0].dest, epps);
    }
}
