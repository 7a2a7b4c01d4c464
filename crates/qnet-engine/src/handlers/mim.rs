//! Link generation through a midpoint measurement station

use qnet_core::{BsmResult, BsmTimingNotification, EmitPhotonRequest, EventKind, ProtocolKind, QnetResult, RulePayload};
use tracing::{debug, warn};

use crate::handlers::ProtocolHandler;
use crate::{EngineContext, HandlerRegistry};

pub struct MimHandler;

impl ProtocolHandler for MimHandler {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::MimV1
    }

    fn register(&self, registry: &mut HandlerRegistry<EngineContext>) {
        registry.register(EventKind::LinkResult, ProtocolKind::MimV1, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::LinkResult(result) => handle_link_result(ctx, result),
                _ => Ok(()),
            }
        });
        registry.register(EventKind::LinkTiming, ProtocolKind::MimV1, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::LinkTiming(timing) => handle_link_timing(ctx, timing),
                _ => Ok(()),
            }
        });
        registry.register(EventKind::EmitRequest, ProtocolKind::MimV1, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::EmitRequest(request) => handle_emit_request(ctx, request),
                _ => Ok(()),
            }
        });
    }
}

/// Store heralded pairs, walking successes from last to first so earlier
/// emission indices stay valid while entries are removed
pub fn handle_link_result(ctx: &mut EngineContext, result: &BsmResult) -> QnetResult<()> {
    for success in result.successes.iter().rev() {
        let emitted = ctx.emitted.entry(result.slot).or_default();
        if success.photon_index >= emitted.len() {
            warn!(slot = ?result.slot, photon_index = success.photon_index, "link result for unknown photon");
            continue;
        }
        let key = emitted.remove(success.photon_index);
        ctx.pool.insert(result.neighbor, key)?;
        ctx.apply_correction(key, success.correction);
    }
    debug!(slot = ?result.slot, neighbor = result.neighbor.0, successes = result.successes.len(), "link result stored");
    Ok(())
}

/// Restart emission on a new timing window
pub fn handle_link_timing(ctx: &mut EngineContext, timing: &BsmTimingNotification) -> QnetResult<()> {
    ctx.stop_emission(timing.slot);
    ctx.free_failed_attempts(timing.slot);
    ctx.timers
        .schedule_emission(timing.slot, timing.first_emit_time, timing.interval, false);
    Ok(())
}

/// Emit one photon and re-arm until the last free emitter is used. An
/// exhausted slot ends the round without emitting.
pub fn handle_emit_request(ctx: &mut EngineContext, request: &EmitPhotonRequest) -> QnetResult<()> {
    let slot = request.slot;
    ctx.timers.fired(slot);
    let free = ctx.pool.count_free(slot);
    let is_last = free <= 1;
    if let Some(key) = ctx.pool.take_free(slot) {
        ctx.emit_photon(key, request.first, is_last);
    }
    ctx.timers.clear_first(slot);
    if !is_last {
        ctx.timers.rearm(slot, ctx.now + request.interval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{BsmSuccess, ChannelSlot, IdealBackend, NodeAddr, PauliOperator, SimTime};

    use crate::{EngineConfig, TimerCommand};

    fn context(qubits: u16) -> EngineContext {
        EngineContext::new(&EngineConfig::emitter_node(NodeAddr(1), 1, qubits), Box::new(IdealBackend))
    }

    fn emit_all(ctx: &mut EngineContext, slot: ChannelSlot) {
        let mut request = EmitPhotonRequest::new(slot);
        request.interval = SimTime::from_nanos(10);
        loop {
            handle_emit_request(ctx, &request).unwrap();
            request.first = false;
            if ctx.pool.count_free(slot) == 0 {
                break;
            }
        }
    }

    #[test]
    fn test_emission_round_stops_at_last_free_emitter() {
        let mut ctx = context(3);
        let slot = ChannelSlot::emitter(0);
        emit_all(&mut ctx, slot);

        assert_eq!(ctx.emitted.get(&slot).map(Vec::len), Some(3));
        let commands = ctx.timers.take_commands();
        // Re-armed after the first two photons only
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], TimerCommand::ScheduleAt { .. }));
        assert!(!ctx.timers.is_armed(slot));
    }

    #[test]
    fn test_link_result_inserts_in_reverse() {
        let mut ctx = context(4);
        let slot = ChannelSlot::emitter(0);
        emit_all(&mut ctx, slot);
        let result = BsmResult {
            slot,
            neighbor: NodeAddr(2),
            successes: vec![
                BsmSuccess {
                    photon_index: 1,
                    correction: PauliOperator::X,
                },
                BsmSuccess {
                    photon_index: 3,
                    correction: PauliOperator::I,
                },
            ],
        };
        handle_link_result(&mut ctx, &result).unwrap();

        let stored: Vec<_> = ctx.pool.range(slot, NodeAddr(2)).map(|r| r.key()).collect();
        assert_eq!(stored, vec![slot.qubit(3), slot.qubit(1)]);
        assert_eq!(ctx.emitted.get(&slot), Some(&vec![slot.qubit(0), slot.qubit(2)]));
    }

    #[test]
    fn test_link_result_ignores_unknown_photon() {
        let mut ctx = context(2);
        let result = BsmResult {
            slot: ChannelSlot::emitter(0),
            neighbor: NodeAddr(2),
            successes: vec![BsmSuccess {
                photon_index: 5,
                correction: PauliOperator::I,
            }],
        };
        handle_link_result(&mut ctx, &result).unwrap();
        assert_eq!(ctx.pool.stats().entangled, 0);
    }

    #[test]
    fn test_timing_frees_failed_round_and_reschedules() {
        let mut ctx = context(2);
        let slot = ChannelSlot::emitter(0);
        emit_all(&mut ctx, slot);
        ctx.timers.take_commands();
        assert_eq!(ctx.pool.count_free(slot), 0);

        let timing = BsmTimingNotification {
            slot,
            first_emit_time: SimTime::from_micros(3),
            interval: SimTime::from_nanos(5),
        };
        handle_link_timing(&mut ctx, &timing).unwrap();
        assert_eq!(ctx.pool.count_free(slot), 2);
        assert!(ctx.timers.is_armed(slot));
        let request = ctx.timers.request(slot).unwrap();
        assert!(request.first && !request.msm);
        assert_eq!(request.interval, SimTime::from_nanos(5));
    }

    #[test]
    fn test_exhausted_slot_does_not_rearm() {
        let mut ctx = context(1);
        let slot = ChannelSlot::emitter(0);
        ctx.pool.take_free(slot).unwrap();
        handle_emit_request(&mut ctx, &EmitPhotonRequest::new(slot)).unwrap();
        assert!(ctx.timers.take_commands().is_empty());
        assert!(ctx.emitted.get(&slot).is_none());
    }
}
