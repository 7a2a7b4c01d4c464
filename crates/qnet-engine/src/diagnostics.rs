//! Dispatch diagnostics
//!
//! Unresolved or partially resolved events are recorded as structured
//! records rather than errors. Each record is also emitted as a `tracing`
//! warning with the same keys, so any subscriber (including a JSON one) sees
//! the full payload.

use qnet_core::{EventKind, NodeAddr, RuleEvent};
use serde::Serialize;
use tracing::warn;

/// Kind of dispatch diagnostic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// No handler and the event kind itself is unknown
    UnknownRuleEvent,
    /// The event kind is known but its protocol is not
    UnknownRuleProtocol,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::UnknownRuleEvent => "unknown_rule_event",
            DiagnosticKind::UnknownRuleProtocol => "unknown_rule_protocol",
        }
    }
}

/// Structured diagnostic record
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    pub diagnostic: DiagnosticKind,
    pub simtime: f64,
    pub event_number: u64,
    pub event_type: String,
    pub protocol_spec: String,
    pub execution_path: String,
    pub protocol_raw_value: String,
    pub msg_name: String,
    pub msg_type: String,
    pub qnode_addr: i32,
}

impl Diagnostic {
    pub fn from_event(diagnostic: DiagnosticKind, event: &RuleEvent, qnode_addr: NodeAddr) -> Self {
        let event_type = match diagnostic {
            DiagnosticKind::UnknownRuleEvent => EventKind::Unknown.as_str(),
            DiagnosticKind::UnknownRuleProtocol => event.kind.as_str(),
        };
        Diagnostic {
            diagnostic,
            simtime: event.time.as_secs_f64(),
            event_number: event.sequence,
            event_type: event_type.to_string(),
            protocol_spec: event.protocol.as_str().to_string(),
            execution_path: event.execution_path.as_str().to_string(),
            protocol_raw_value: event.protocol_raw_value.clone(),
            msg_name: event.source_name.clone(),
            msg_type: event.source_type_name.clone(),
            qnode_addr: qnode_addr.0,
        }
    }

    /// Log the record through `tracing`
    pub fn emit(&self) {
        warn!(
            target: "qnet::dispatch",
            diagnostic = self.diagnostic.as_str(),
            simtime = self.simtime,
            event_number = self.event_number,
            event_type = %self.event_type,
            protocol_spec = %self.protocol_spec,
            execution_path = %self.execution_path,
            protocol_raw_value = %self.protocol_raw_value,
            msg_name = %self.msg_name,
            msg_type = %self.msg_type,
            qnode_addr = self.qnode_addr,
            "{}",
            self.diagnostic.as_str()
        );
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{ExecutionPath, ProtocolKind, SimTime};

    #[test]
    fn test_diagnostic_fields() {
        let mut event = RuleEvent::new(EventKind::RuleSetForwardingApplication, ProtocolKind::Unknown, SimTime::from_secs(2), 17);
        event.execution_path = ExecutionPath::Forwarding;
        event.protocol_raw_value = "999".to_string();
        event.source_name = "app".to_string();
        event.source_type_name = "RuleSetForwardingApplication".to_string();

        let diag = Diagnostic::from_event(DiagnosticKind::UnknownRuleProtocol, &event, NodeAddr(4));
        assert_eq!(diag.event_type, "RULESET_FORWARDING_APPLICATION");
        assert_eq!(diag.protocol_spec, "Unknown");
        assert_eq!(diag.execution_path, "Forwarding");
        assert_eq!(diag.simtime, 2.0);
        assert_eq!(diag.event_number, 17);

        let json: serde_json::Value = serde_json::from_str(&diag.to_json().unwrap()).unwrap();
        for key in [
            "event_type",
            "simtime",
            "event_number",
            "protocol_spec",
            "execution_path",
            "protocol_raw_value",
            "msg_name",
            "msg_type",
            "qnode_addr",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["diagnostic"], "unknown_rule_protocol");
        assert_eq!(json["protocol_raw_value"], "999");
    }

    #[test]
    fn test_unknown_event_type_label() {
        let event = RuleEvent::new(EventKind::Unknown, ProtocolKind::Unknown, SimTime::ZERO, 1);
        let diag = Diagnostic::from_event(DiagnosticKind::UnknownRuleEvent, &event, NodeAddr(0));
        assert_eq!(diag.event_type, "UNKNOWN");
        diag.emit();
    }
}
