//! Remote purification outcomes

use qnet_core::{EventKind, ProtocolKind, PurificationResult, QnetResult, RulePayload};

use crate::handlers::ProtocolHandler;
use crate::{EngineContext, HandlerRegistry};

pub struct PurificationHandler;

impl ProtocolHandler for PurificationHandler {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Purification
    }

    fn register(&self, registry: &mut HandlerRegistry<EngineContext>) {
        registry.register(
            EventKind::PurificationResult,
            ProtocolKind::Purification,
            |event, ctx: &mut EngineContext| match &event.payload {
                RulePayload::PurificationResult(result) => handle_purification_result(ctx, result),
                _ => Ok(()),
            },
        );
    }
}

/// Queue `[sequence, measurement, protocol]` on the owning runtime
pub fn handle_purification_result(ctx: &mut EngineContext, result: &PurificationResult) -> QnetResult<()> {
    ctx.runtimes.assign_message(
        result.ruleset_id,
        result.shared_tag,
        vec![result.sequence, result.measurement, result.protocol],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{IdealBackend, NodeAddr, RuleSet, RuleSetId, SharedTag};

    use crate::EngineConfig;

    #[test]
    fn test_result_reaches_owning_runtime() {
        let mut ctx = EngineContext::new(&EngineConfig::default(), Box::new(IdealBackend));
        ctx.runtimes.submit(RuleSet::new(RuleSetId(4), NodeAddr(1)));
        let result = PurificationResult {
            ruleset_id: RuleSetId(4),
            shared_tag: SharedTag(2),
            sequence: 1,
            measurement: 0,
            protocol: 3,
        };
        handle_purification_result(&mut ctx, &result).unwrap();
        let runtime = ctx.runtimes.find(RuleSetId(4)).unwrap();
        assert_eq!(runtime.message_count(SharedTag(2)), 1);
    }

    #[test]
    fn test_unknown_ruleset_is_ignored() {
        let mut ctx = EngineContext::new(&EngineConfig::default(), Box::new(IdealBackend));
        let result = PurificationResult {
            ruleset_id: RuleSetId(4),
            shared_tag: SharedTag(2),
            sequence: 1,
            measurement: 0,
            protocol: 3,
        };
        assert!(handle_purification_result(&mut ctx, &result).is_ok());
    }
}
