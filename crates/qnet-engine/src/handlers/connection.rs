//! Rule sets forwarded by connection setup

use qnet_core::{
    EventKind, ProtocolKind, QnetResult, RulePayload, RuleSet, RuleSetForwarding, RuleSetForwardingApplication,
};
use tracing::debug;

use crate::handlers::ProtocolHandler;
use crate::{EngineContext, HandlerRegistry};

pub struct ConnectionManagementHandler;

impl ProtocolHandler for ConnectionManagementHandler {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::ConnectionManagement
    }

    fn register(&self, registry: &mut HandlerRegistry<EngineContext>) {
        registry.register(
            EventKind::RuleSetForwarding,
            ProtocolKind::ConnectionManagement,
            |event, ctx: &mut EngineContext| match &event.payload {
                RulePayload::RuleSetForwarding(forwarding) => handle_forwarding(ctx, forwarding),
                _ => Ok(()),
            },
        );
        registry.register(
            EventKind::RuleSetForwardingApplication,
            ProtocolKind::ConnectionManagement,
            |event, ctx: &mut EngineContext| match &event.payload {
                RulePayload::RuleSetForwardingApplication(forwarding) => handle_application_forwarding(ctx, forwarding),
                _ => Ok(()),
            },
        );
    }
}

/// Parse the forwarded rule set and submit it. A malformed rule set is an
/// error and nothing is submitted.
pub fn handle_forwarding(ctx: &mut EngineContext, forwarding: &RuleSetForwarding) -> QnetResult<()> {
    submit_serialized(ctx, &forwarding.ruleset)
}

/// Only application type 0 carries a rule set for this engine
pub fn handle_application_forwarding(
    ctx: &mut EngineContext,
    forwarding: &RuleSetForwardingApplication,
) -> QnetResult<()> {
    if forwarding.application_type != 0 {
        debug!(application_type = forwarding.application_type, "application rule set skipped");
        return Ok(());
    }
    submit_serialized(ctx, &forwarding.ruleset)
}

fn submit_serialized(ctx: &mut EngineContext, json: &str) -> QnetResult<()> {
    let ruleset = RuleSet::from_json(json)?;
    ctx.runtimes.submit(ruleset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{IdealBackend, NodeAddr, QnetError, RuleSetId};

    use crate::EngineConfig;

    fn context() -> EngineContext {
        EngineContext::new(&EngineConfig::default(), Box::new(IdealBackend))
    }

    #[test]
    fn test_forwarding_submits_runtime() {
        let mut ctx = context();
        let json = RuleSet::new(RuleSetId(11), NodeAddr(1)).to_json().unwrap();
        handle_forwarding(&mut ctx, &RuleSetForwarding { ruleset: json }).unwrap();
        assert!(ctx.runtimes.find(RuleSetId(11)).is_some());
    }

    #[test]
    fn test_malformed_ruleset_is_rejected() {
        let mut ctx = context();
        let err = handle_forwarding(
            &mut ctx,
            &RuleSetForwarding {
                ruleset: "{\"id\": ".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, QnetError::MalformedRuleSet(_)));
        assert!(ctx.runtimes.is_empty());
    }

    #[test]
    fn test_application_type_filter() {
        let mut ctx = context();
        let json = RuleSet::new(RuleSetId(12), NodeAddr(1)).to_json().unwrap();
        let skipped = RuleSetForwardingApplication {
            application_type: 3,
            ruleset: json.clone(),
        };
        handle_application_forwarding(&mut ctx, &skipped).unwrap();
        assert!(ctx.runtimes.is_empty());

        let accepted = RuleSetForwardingApplication {
            application_type: 0,
            ruleset: json,
        };
        handle_application_forwarding(&mut ctx, &accepted).unwrap();
        assert_eq!(ctx.runtimes.len(), 1);
    }
}
