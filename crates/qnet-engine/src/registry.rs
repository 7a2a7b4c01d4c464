//! Handler dispatch registry
//!
//! Resolution order for an event, stopping at the first hit:
//! 1. exact `(kind, protocol)` handler
//! 2. kind-only fallback
//! 3. protocol-only fallback
//! 4. nothing: diagnostic
//!
//! Independently, a known kind carrying an unknown protocol is reported
//! after whichever handler ran.

use std::collections::HashMap;

use qnet_core::{EventKind, NodeAddr, ProtocolKind, QnetResult, RuleEvent};

use crate::{Diagnostic, DiagnosticKind};

/// Event handler over a mutable context `C`
pub type Handler<C> = Box<dyn FnMut(&RuleEvent, &mut C) -> QnetResult<()>>;

/// Which tier handled an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Exact,
    KindFallback,
    ProtocolFallback,
    Unhandled,
}

/// Three-tier handler table
pub struct HandlerRegistry<C> {
    exact: HashMap<(EventKind, ProtocolKind), Handler<C>>,
    by_kind: HashMap<EventKind, Handler<C>>,
    by_protocol: HashMap<ProtocolKind, Handler<C>>,
    diagnostics: Vec<Diagnostic>,
    qnode_addr: NodeAddr,
}

impl<C> HandlerRegistry<C> {
    pub fn new(qnode_addr: NodeAddr) -> Self {
        HandlerRegistry {
            exact: HashMap::new(),
            by_kind: HashMap::new(),
            by_protocol: HashMap::new(),
            diagnostics: Vec::new(),
            qnode_addr,
        }
    }

    /// Install the exact handler for `(kind, protocol)`. Returns false if one was replaced.
    pub fn register<F>(&mut self, kind: EventKind, protocol: ProtocolKind, handler: F) -> bool
    where
        F: FnMut(&RuleEvent, &mut C) -> QnetResult<()> + 'static,
    {
        self.exact.insert((kind, protocol), Box::new(handler)).is_none()
    }

    pub fn register_kind_fallback<F>(&mut self, kind: EventKind, handler: F) -> bool
    where
        F: FnMut(&RuleEvent, &mut C) -> QnetResult<()> + 'static,
    {
        self.by_kind.insert(kind, Box::new(handler)).is_none()
    }

    pub fn register_protocol_fallback<F>(&mut self, protocol: ProtocolKind, handler: F) -> bool
    where
        F: FnMut(&RuleEvent, &mut C) -> QnetResult<()> + 'static,
    {
        self.by_protocol.insert(protocol, Box::new(handler)).is_none()
    }

    pub fn unregister(&mut self, kind: EventKind, protocol: ProtocolKind) -> bool {
        self.exact.remove(&(kind, protocol)).is_some()
    }

    pub fn unregister_kind_fallback(&mut self, kind: EventKind) -> bool {
        self.by_kind.remove(&kind).is_some()
    }

    pub fn unregister_protocol_fallback(&mut self, protocol: ProtocolKind) -> bool {
        self.by_protocol.remove(&protocol).is_some()
    }

    pub fn has_exact(&self, kind: EventKind, protocol: ProtocolKind) -> bool {
        self.exact.contains_key(&(kind, protocol))
    }

    pub fn has_kind_fallback(&self, kind: EventKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    pub fn has_protocol_fallback(&self, protocol: ProtocolKind) -> bool {
        self.by_protocol.contains_key(&protocol)
    }

    /// Registered exact keys, sorted
    pub fn exact_keys(&self) -> Vec<(EventKind, ProtocolKind)> {
        let mut keys: Vec<_> = self.exact.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Resolve and run the handler for `event`.
    ///
    /// A handler error is returned after any diagnostics for the event are
    /// recorded.
    pub fn dispatch(&mut self, event: &RuleEvent, ctx: &mut C) -> QnetResult<DispatchOutcome> {
        let unknown_protocol = event.protocol == ProtocolKind::Unknown && event.kind != EventKind::Unknown;

        let (outcome, result) = if let Some(handler) = self.exact.get_mut(&(event.kind, event.protocol)) {
            (DispatchOutcome::Exact, handler(event, ctx))
        } else if let Some(handler) = self.by_kind.get_mut(&event.kind) {
            (DispatchOutcome::KindFallback, handler(event, ctx))
        } else if let Some(handler) = self.by_protocol.get_mut(&event.protocol) {
            (DispatchOutcome::ProtocolFallback, handler(event, ctx))
        } else {
            (DispatchOutcome::Unhandled, Ok(()))
        };

        match outcome {
            DispatchOutcome::Unhandled if event.kind == EventKind::Unknown => {
                self.record(DiagnosticKind::UnknownRuleEvent, event);
            }
            DispatchOutcome::Unhandled => self.record(DiagnosticKind::UnknownRuleProtocol, event),
            _ if unknown_protocol => self.record(DiagnosticKind::UnknownRuleProtocol, event),
            _ => {}
        }

        result.map(|()| outcome)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn record(&mut self, kind: DiagnosticKind, event: &RuleEvent) {
        let diagnostic = Diagnostic::from_event(kind, event, self.qnode_addr);
        diagnostic.emit();
        self.diagnostics.push(diagnostic);
    }
}
