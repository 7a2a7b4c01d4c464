//! QNet rule engine - per-message allocation cycle
//!
//! The scheduler delivers one message at a time. Each delivery runs the
//! same six stages to completion before the next message is accepted.

use qnet_bus::{RuleEventBus, Translation};
use qnet_core::{
    Envelope, EventChannel, EventKind, OpaqueMessage, OutboundMessage, PhysicalBackend, ProtocolKind, QnetResult,
    QubitKey, RuleEvent, RuleSet, RuleSetId, SimTime,
};
use qnet_runtime::RuntimeSnapshot;
use tracing::{debug, warn};

use crate::handlers::{self, ProtocolHandler};
use crate::{Diagnostic, DispatchOutcome, EngineConfig, EngineContext, HandlerRegistry, TimerCommand};

/// Result of one `handle_message` call
#[derive(Clone, Debug, Default)]
pub struct CycleReport {
    /// Events drained and dispatched in this cycle
    pub events: usize,
    /// Inbound message must survive the cycle
    pub keep_message: bool,
    /// The inbound message, handed back when `keep_message` is set
    pub retained: Option<Envelope>,
    /// Resources assigned by the allocation pass
    pub allocated: usize,
    /// Rule actions fired across both execution passes
    pub fired: usize,
}

#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    pub cycles: u64,
    pub events_dispatched: u64,
    pub events_unhandled: u64,
    pub messages_kept: u64,
    pub resources_allocated: u64,
    pub rules_fired: u64,
    pub handler_failures: u64,
}

/// Rule engine of one node
pub struct RuleEngine {
    config: EngineConfig,
    bus: RuleEventBus,
    registry: HandlerRegistry<EngineContext>,
    ctx: EngineContext,
    stats: EngineStats,
    /// Kept inbound message of a cycle that ended in a handler failure
    held: Option<Envelope>,
}

impl RuleEngine {
    /// Engine with no handlers installed
    pub fn new(config: EngineConfig, backend: Box<dyn PhysicalBackend>) -> QnetResult<Self> {
        config.validate()?;
        let ctx = EngineContext::new(&config, backend);
        Ok(RuleEngine {
            bus: RuleEventBus::with_fallback_start(config.fallback_sequence_start),
            registry: HandlerRegistry::new(config.node_addr),
            ctx,
            stats: EngineStats::default(),
            held: None,
            config,
        })
    }

    /// Engine with every default protocol handler installed
    pub fn with_default_handlers(config: EngineConfig, backend: Box<dyn PhysicalBackend>) -> QnetResult<Self> {
        let mut engine = Self::new(config, backend)?;
        engine.register_defaults();
        Ok(engine)
    }

    pub fn register_defaults(&mut self) {
        handlers::register_defaults(&mut self.registry);
    }

    pub fn install(&mut self, handler: &dyn ProtocolHandler) {
        debug!(protocol = handler.protocol().as_str(), "installing protocol handler");
        handler.register(&mut self.registry);
    }

    /// Handle one delivered message
    pub fn handle_message(
        &mut self,
        msg: Option<Envelope>,
        now: SimTime,
        event_number: Option<u64>,
    ) -> QnetResult<CycleReport> {
        self.stats.cycles += 1;
        self.ctx.now = now;
        let mut report = CycleReport::default();

        // Stage 1: Run rules unblocked by the previous cycle
        report.fired += self.ctx.execute_all();

        // Stage 2: Classify and drain
        self.bus.publish_message(msg.as_ref(), now, event_number);
        let events = self.bus.drain(now);

        // Stage 3: Dispatch in order
        let mut pending = events.into_iter();
        while let Some(event) = pending.next() {
            report.events += 1;
            report.keep_message |= event.channel == EventChannel::InternalTimer || event.keep_source;
            match self.registry.dispatch(&event, &mut self.ctx) {
                Ok(DispatchOutcome::Unhandled) => self.stats.events_unhandled += 1,
                Ok(_) => self.stats.events_dispatched += 1,
                Err(err) => {
                    warn!(
                        kind = event.kind.as_str(),
                        sequence = event.sequence,
                        error = %err,
                        "handler failed, aborting cycle"
                    );
                    self.stats.handler_failures += 1;
                    for rest in pending {
                        report.keep_message |= rest.channel == EventChannel::InternalTimer || rest.keep_source;
                        self.bus.publish(rest);
                    }
                    if report.keep_message {
                        self.stats.messages_kept += 1;
                        self.held = msg;
                    }
                    return Err(err);
                }
            }
        }

        // Stage 4: Allocation pass over every slot
        report.allocated = self.ctx.allocate_all();
        self.stats.resources_allocated += report.allocated as u64;

        // Stage 5: Run rules unblocked by new resources
        report.fired += self.ctx.execute_all();
        self.stats.rules_fired += report.fired as u64;

        // Stage 6: Keep or drop the inbound message
        if report.keep_message {
            self.stats.messages_kept += 1;
            report.retained = msg;
        }

        if self.config.purge_terminated {
            let purged = self.ctx.runtimes.purge_terminated();
            if purged > 0 {
                debug!(purged, "terminated runtimes purged");
            }
        }
        Ok(report)
    }

    /// Kept inbound message of the last failed cycle, if any
    pub fn take_held_message(&mut self) -> Option<Envelope> {
        self.held.take()
    }

    /// Submit a rule set. Duplicate ids are ignored.
    pub fn submit_ruleset(&mut self, ruleset: RuleSet) -> QnetResult<bool> {
        ruleset.validate()?;
        Ok(self.ctx.runtimes.submit(ruleset))
    }

    pub fn register_handler<F>(&mut self, kind: EventKind, protocol: ProtocolKind, handler: F) -> bool
    where
        F: FnMut(&RuleEvent, &mut EngineContext) -> QnetResult<()> + 'static,
    {
        self.registry.register(kind, protocol, handler)
    }

    pub fn register_kind_fallback<F>(&mut self, kind: EventKind, handler: F) -> bool
    where
        F: FnMut(&RuleEvent, &mut EngineContext) -> QnetResult<()> + 'static,
    {
        self.registry.register_kind_fallback(kind, handler)
    }

    pub fn register_protocol_fallback<F>(&mut self, protocol: ProtocolKind, handler: F) -> bool
    where
        F: FnMut(&RuleEvent, &mut EngineContext) -> QnetResult<()> + 'static,
    {
        self.registry.register_protocol_fallback(protocol, handler)
    }

    /// Install a name-keyed translator for opaque message types
    pub fn register_translator<F>(&mut self, type_name: impl Into<String>, translator: F) -> bool
    where
        F: Fn(&OpaqueMessage) -> Option<Translation> + 'static,
    {
        self.bus.register_translator(type_name, translator)
    }

    pub fn registry(&self) -> &HandlerRegistry<EngineContext> {
        &self.registry
    }

    pub fn snapshot(&self, id: RuleSetId) -> Option<RuntimeSnapshot> {
        self.ctx.runtimes.snapshot(id)
    }

    /// Messages for the network since the last call
    pub fn take_outbox(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.ctx.outbox)
    }

    /// Timer schedule and cancel requests since the last call
    pub fn take_timer_commands(&mut self) -> Vec<TimerCommand> {
        self.ctx.timers.take_commands()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.registry.diagnostics()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.registry.take_diagnostics()
    }

    /// Consumption path: release `key` from runtime `id` back to the pool
    pub fn free_consumed(&mut self, id: RuleSetId, key: QubitKey) -> bool {
        self.ctx.free_consumed(id, key)
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.ctx
    }

    pub fn bus_mut(&mut self) -> &mut RuleEventBus {
        &mut self.bus
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
