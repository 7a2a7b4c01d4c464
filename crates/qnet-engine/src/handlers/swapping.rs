//! Remote entanglement swapping outcomes

use qnet_core::{EventKind, ProtocolKind, QnetResult, RulePayload, SwappingResult};

use crate::handlers::ProtocolHandler;
use crate::{EngineContext, HandlerRegistry};

pub struct SwappingHandler;

impl ProtocolHandler for SwappingHandler {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Swapping
    }

    fn register(&self, registry: &mut HandlerRegistry<EngineContext>) {
        registry.register(EventKind::SwapResult, ProtocolKind::Swapping, |event, ctx: &mut EngineContext| {
            match &event.payload {
                RulePayload::SwapResult(result) => handle_swapping_result(ctx, result),
                _ => Ok(()),
            }
        });
    }
}

/// Queue `[sequence, correction_frame, new_partner]` on the owning runtime
pub fn handle_swapping_result(ctx: &mut EngineContext, result: &SwappingResult) -> QnetResult<()> {
    ctx.runtimes.assign_message(
        result.ruleset_id,
        result.shared_tag,
        vec![result.sequence, result.correction_frame, i64::from(result.new_partner.0)],
    );
    Ok(())
}
