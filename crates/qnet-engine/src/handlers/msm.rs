//! Link generation through a midpoint entangled photon pair source
//!
//! Both ends of the link click independently. Each end reports its local
//! click outcome to the other as an [`MsmResult`]; a pair is stored only
//! when both reports for the same photon index succeed.

use qnet_core::{
    ChannelSlot, EmitPhotonRequest, EppsTimingNotification, EventKind, GateKind, MsmResult, OutboundMessage,
    PauliOperator, PhysicalOperation, ProtocolKind, QnetResult, RulePayload, SingleClickResult, StopEmitting,
    StopEppsEmission,
};
use tracing::{debug, warn};

use crate::handlers::ProtocolHandler;
use crate::{EngineContext, HandlerRegistry, PendingPair};

pub struct MsmHandler;

impl ProtocolHandler for MsmHandler {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::MsmV1
    }

    fn register(&self, registry: &mut HandlerRegistry<EngineContext>) {
        registry.register(EventKind::PeerTiming, ProtocolKind::MsmV1, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::PeerTiming(timing) => handle_peer_timing(ctx, timing),
                _ => Ok(()),
            }
        });
        registry.register(EventKind::EmitRequest, ProtocolKind::MsmV1, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::EmitRequest(request) => handle_emit_request(ctx, request),
                _ => Ok(()),
            }
        });
        registry.register(EventKind::ClickResult, ProtocolKind::MsmV1, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::ClickResult(click) => handle_click_result(ctx, click),
                _ => Ok(()),
            }
        });
        registry.register(EventKind::ChannelResult, ProtocolKind::MsmV1, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::ChannelResult(result) => handle_partner_result(ctx, result),
                _ => Ok(()),
            }
        });
        registry.register(EventKind::StopEmitting, ProtocolKind::MsmV1, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::StopEmitting(stop) => handle_stop_emitting(ctx, stop),
                _ => Ok(()),
            }
        });
    }
}

/// Record the pair source and restart emission on the passive receiver
pub fn handle_peer_timing(ctx: &mut EngineContext, timing: &EppsTimingNotification) -> QnetResult<()> {
    let info = ctx.msm.entry(timing.qnic_index).or_default();
    info.partner = timing.partner;
    info.epps_addr = timing.epps_addr;
    info.partner_qnic_index = timing.partner_qnic_index;
    info.total_travel_time = timing.total_travel_time;

    let slot = ChannelSlot::passive(timing.qnic_index);
    ctx.stop_emission(slot);
    ctx.timers
        .schedule_emission(slot, timing.first_emit_time, timing.interval, true);
    Ok(())
}

/// One emission attempt per pulse. With no free qubit the partner is told
/// the attempt failed. The timer keeps running until stopped.
pub fn handle_emit_request(ctx: &mut EngineContext, request: &EmitPhotonRequest) -> QnetResult<()> {
    let slot = request.slot;
    ctx.timers.fired(slot);
    let node = ctx.node_addr;
    let key = ctx.pool.take_free(slot);

    let info = ctx.msm.entry(slot.index).or_default();
    info.photon_index_counter += 1;
    match key {
        Some(key) => {
            info.qubit_info.insert(info.iteration_index, key);
            ctx.emit_photon(key, true, true);
        }
        None => {
            let failure = MsmResult {
                qnic_index: info.partner_qnic_index,
                photon_index: info.photon_index_counter,
                success: false,
                correction: PauliOperator::I,
                src: node,
                dest: info.partner,
            };
            ctx.send(OutboundMessage::MsmResult(failure));
        }
    }
    ctx.timers.rearm(slot, ctx.now + request.interval);
    Ok(())
}

/// Report the local click to the partner and keep successful qubits
/// until the partner's report for the same photon arrives
pub fn handle_click_result(ctx: &mut EngineContext, click: &SingleClickResult) -> QnetResult<()> {
    let node = ctx.node_addr;
    let info = ctx.msm.entry(click.qnic_index).or_default();
    let qubit = info.qubit_info.get(&info.iteration_index).copied();
    let success = click.success && qubit.is_some();
    let report = MsmResult {
        qnic_index: info.partner_qnic_index,
        photon_index: info.photon_index_counter,
        success,
        correction: click.correction,
        src: node,
        dest: info.partner,
    };

    match qubit {
        Some(qubit) if success => {
            info.pending.insert(
                info.photon_index_counter,
                PendingPair {
                    qubit,
                    correction: click.correction,
                },
            );
            info.iteration_index += 1;
        }
        Some(qubit) => ctx.reset_qubit(qubit),
        None => warn!(qnic = click.qnic_index, "click result without an emitted qubit"),
    }
    ctx.send(OutboundMessage::MsmResult(report));
    Ok(())
}

/// Partner's click report. Stores the pair when both ends succeeded.
pub fn handle_partner_result(ctx: &mut EngineContext, result: &MsmResult) -> QnetResult<()> {
    let node = ctx.node_addr;
    let Some(info) = ctx.msm.get_mut(&result.qnic_index) else {
        return Ok(());
    };
    // Local click failed for this photon
    let Some(pending) = info.pending.remove(&result.photon_index) else {
        return Ok(());
    };
    let partner = info.partner;

    if !result.success {
        ctx.reset_qubit(pending.qubit);
        return Ok(());
    }
    // Only the lower address corrects a phi-minus pair
    if pending.correction != result.correction && node < partner {
        ctx.backend.apply(&PhysicalOperation::Gate {
            gate: GateKind::Z,
            targets: vec![pending.qubit],
        });
    }
    ctx.pool.insert(partner, pending.qubit)?;
    debug!(qubit = ?pending.qubit, partner = partner.0, "midpoint pair stored");
    Ok(())
}

/// Ask the pair source to stop. Links that never emitted are not midpoint
/// links and are left alone.
pub fn handle_stop_emitting(ctx: &mut EngineContext, stop: &StopEmitting) -> QnetResult<()> {
    let Some(info) = ctx.msm.get(&stop.qnic_index) else {
        return Ok(());
    };
    if info.photon_index_counter == 0 {
        return Ok(());
    }
    let message = StopEppsEmission {
        src: ctx.node_addr,
        dest: info.epps_addr,
    };
    ctx.send(OutboundMessage::StopEppsEmission(message));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{IdealBackend, NodeAddr, SimTime};

    use crate::EngineConfig;

    fn context(node: i32, qubits: u16) -> EngineContext {
        EngineContext::new(&EngineConfig::passive_node(NodeAddr(node), 1, qubits), Box::new(IdealBackend))
    }

    fn timing() -> EppsTimingNotification {
        EppsTimingNotification {
            qnic_index: 0,
            partner: NodeAddr(5),
            partner_qnic_index: 2,
            epps_addr: NodeAddr(9),
            first_emit_time: SimTime::from_micros(1),
            interval: SimTime::from_nanos(100),
            total_travel_time: SimTime::from_micros(4),
        }
    }

    fn emit(ctx: &mut EngineContext) {
        let mut request = EmitPhotonRequest::new(ChannelSlot::passive(0));
        request.msm = true;
        request.interval = SimTime::from_nanos(100);
        handle_emit_request(ctx, &request).unwrap();
    }

    fn sent_results(ctx: &mut EngineContext) -> Vec<MsmResult> {
        ctx.outbox
            .drain(..)
            .filter_map(|m| match m {
                OutboundMessage::MsmResult(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_peer_timing_schedules_msm_emission() {
        let mut ctx = context(1, 2);
        handle_peer_timing(&mut ctx, &timing()).unwrap();
        let info = &ctx.msm[&0];
        assert_eq!(info.partner, NodeAddr(5));
        assert_eq!(info.epps_addr, NodeAddr(9));
        let request = ctx.timers.request(ChannelSlot::passive(0)).unwrap();
        assert!(request.msm);
    }

    #[test]
    fn test_emit_without_free_qubit_reports_failure() {
        let mut ctx = context(1, 1);
        handle_peer_timing(&mut ctx, &timing()).unwrap();
        emit(&mut ctx);
        emit(&mut ctx);

        let results = sent_results(&mut ctx);
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].photon_index, 2);
        assert_eq!(results[0].qnic_index, 2);
        assert_eq!(results[0].dest, NodeAddr(5));
        assert!(ctx.timers.is_armed(ChannelSlot::passive(0)));
    }

    #[test]
    fn test_both_ends_succeed_stores_pair() {
        let mut ctx = context(1, 2);
        handle_peer_timing(&mut ctx, &timing()).unwrap();
        emit(&mut ctx);
        let click = SingleClickResult {
            qnic_index: 0,
            success: true,
            correction: PauliOperator::I,
        };
        handle_click_result(&mut ctx, &click).unwrap();
        let report = sent_results(&mut ctx).remove(0);
        assert!(report.success);

        let partner = MsmResult {
            qnic_index: 0,
            photon_index: report.photon_index,
            success: true,
            correction: PauliOperator::Z,
            src: NodeAddr(5),
            dest: NodeAddr(1),
        };
        handle_partner_result(&mut ctx, &partner).unwrap();
        let slot = ChannelSlot::passive(0);
        assert_eq!(ctx.pool.range(slot, NodeAddr(5)).count(), 1);
        assert!(ctx.msm[&0].pending.is_empty());
    }

    #[test]
    fn test_partner_failure_frees_local_qubit() {
        let mut ctx = context(1, 1);
        handle_peer_timing(&mut ctx, &timing()).unwrap();
        emit(&mut ctx);
        let click = SingleClickResult {
            qnic_index: 0,
            success: true,
            correction: PauliOperator::I,
        };
        handle_click_result(&mut ctx, &click).unwrap();
        let slot = ChannelSlot::passive(0);
        assert_eq!(ctx.pool.count_free(slot), 0);

        let partner = MsmResult {
            qnic_index: 0,
            photon_index: 1,
            success: false,
            correction: PauliOperator::I,
            src: NodeAddr(5),
            dest: NodeAddr(1),
        };
        handle_partner_result(&mut ctx, &partner).unwrap();
        assert_eq!(ctx.pool.count_free(slot), 1);
        assert_eq!(ctx.pool.stats().entangled, 0);
    }

    #[test]
    fn test_local_failure_frees_qubit() {
        let mut ctx = context(1, 1);
        handle_peer_timing(&mut ctx, &timing()).unwrap();
        emit(&mut ctx);
        let click = SingleClickResult {
            qnic_index: 0,
            success: false,
            correction: PauliOperator::I,
        };
        handle_click_result(&mut ctx, &click).unwrap();
        assert_eq!(ctx.pool.count_free(ChannelSlot::passive(0)), 1);
        assert_eq!(ctx.msm[&0].iteration_index, 0);
    }

    #[test]
    fn test_stop_emitting_only_for_active_links() {
        let mut ctx = context(1, 1);
        handle_stop_emitting(&mut ctx, &StopEmitting { qnic_index: 0 }).unwrap();
        assert!(ctx.outbox.is_empty());

        handle_peer_timing(&mut ctx, &timing()).unwrap();
        emit(&mut ctx);
        handle_stop_emitting(&mut ctx, &StopEmitting { qnic_index: 0 }).unwrap();
        assert!(matches!(
            ctx.outbox.last(),
            Some(OutboundMessage::StopEppsEmission(StopEppsEmission { dest: NodeAddr(9), .. }))
        ));
    }
}
