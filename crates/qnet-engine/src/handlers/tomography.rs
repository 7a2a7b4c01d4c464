//! Link tomography rule sets from the maintenance layer

use qnet_core::{EventKind, LinkTomographyRuleSet, ProtocolKind, QnetResult, RulePayload};

use crate::handlers::ProtocolHandler;
use crate::{EngineContext, HandlerRegistry};

pub struct LinkTomographyHandler;

impl ProtocolHandler for LinkTomographyHandler {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::LinkTomography
    }

    fn register(&self, registry: &mut HandlerRegistry<EngineContext>) {
        registry.register(
            EventKind::TomographyRuleSet,
            ProtocolKind::LinkTomography,
            |event, ctx: &mut EngineContext| match &event.payload {
                RulePayload::TomographyRuleSet(tomography) => handle_tomography_ruleset(ctx, tomography),
                _ => Ok(()),
            },
        );
    }
}

pub fn handle_tomography_ruleset(ctx: &mut EngineContext, tomography: &LinkTomographyRuleSet) -> QnetResult<()> {
    tomography.ruleset.validate()?;
    ctx.runtimes.submit(tomography.ruleset.clone());
    Ok(())
}
