//! Message classification
//!
//! Classification is total and pure: every input, including an absent
//! message, yields exactly one [`RuleEvent`]. Known bodies take the fast path
//! through a fixed table; opaque bodies are looked up in the translator table
//! by type name; everything else becomes an `Unknown` event that keeps the
//! source name and type for diagnostics.

use std::collections::HashMap;

use qnet_core::{
    Envelope, EventChannel, EventKind, ExecutionPath, MessageBody, OpaqueMessage, ProtocolKind, RuleEvent,
    RulePayload, SimTime,
};

/// Classification produced for one message body
#[derive(Clone, Debug, PartialEq)]
pub struct Translation {
    pub protocol: ProtocolKind,
    pub execution_path: ExecutionPath,
    pub protocol_raw_value: String,
    pub keep_source: bool,
    pub payload: RulePayload,
}

impl Translation {
    pub fn new(protocol: ProtocolKind, execution_path: ExecutionPath, payload: RulePayload) -> Self {
        Translation {
            protocol,
            execution_path,
            protocol_raw_value: String::new(),
            keep_source: false,
            payload,
        }
    }

    pub fn with_raw_value(mut self, raw: impl ToString) -> Self {
        self.protocol_raw_value = raw.to_string();
        self
    }

    pub fn keeping_source(mut self) -> Self {
        self.keep_source = true;
        self
    }
}

/// Translator for an opaque message type; `None` falls through to `Unknown`
pub type Translator = Box<dyn Fn(&OpaqueMessage) -> Option<Translation>>;

/// Converts transport messages into rule events
#[derive(Default)]
pub struct Classifier {
    translators: HashMap<String, Translator>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or override the translator for `type_name`
    pub fn register_translator<F>(&mut self, type_name: impl Into<String>, translator: F) -> bool
    where
        F: Fn(&OpaqueMessage) -> Option<Translation> + 'static,
    {
        self.translators.insert(type_name.into(), Box::new(translator)).is_none()
    }

    pub fn remove_translator(&mut self, type_name: &str) -> bool {
        self.translators.remove(type_name).is_some()
    }

    pub fn has_translator(&self, type_name: &str) -> bool {
        self.translators.contains_key(type_name)
    }

    /// Classify a message delivered at `time`
    pub fn classify(&self, msg: Option<&Envelope>, time: SimTime, sequence: u64) -> RuleEvent {
        let Some(envelope) = msg else {
            return RuleEvent::new(EventKind::Unknown, ProtocolKind::Unknown, time, sequence);
        };

        let translation = match &envelope.body {
            MessageBody::Opaque(opaque) => self.translators.get(&opaque.type_name).and_then(|t| t(opaque)),
            body => Some(classify_known(body)),
        };

        let mut event = match translation {
            Some(t) => RuleEvent {
                kind: t.payload.kind(),
                channel: EventChannel::External,
                keep_source: t.keep_source,
                time,
                sequence,
                protocol: t.protocol,
                execution_path: t.execution_path,
                protocol_raw_value: t.protocol_raw_value,
                payload: t.payload,
                source_name: String::new(),
                source_type_name: String::new(),
            },
            None => RuleEvent::new(EventKind::Unknown, ProtocolKind::Unknown, time, sequence)
                .with_channel(EventChannel::External),
        };

        if envelope.self_timer {
            event.channel = EventChannel::InternalTimer;
            event.keep_source = true;
        }
        event.source_name = envelope.name.clone();
        event.source_type_name = envelope.type_name().to_string();
        event
    }
}

/// Fixed table for typed bodies
fn classify_known(body: &MessageBody) -> Translation {
    use ExecutionPath::{EntanglementLifecycle, Forwarding, Maintenance};

    match body {
        MessageBody::BsmResult(m) => Translation::new(
            ProtocolKind::MimV1,
            EntanglementLifecycle,
            RulePayload::LinkResult(m.clone()),
        ),
        MessageBody::BsmTimingNotification(m) => Translation::new(
            ProtocolKind::MimV1,
            EntanglementLifecycle,
            RulePayload::LinkTiming(m.clone()),
        ),
        MessageBody::EppsTimingNotification(m) => Translation::new(
            ProtocolKind::MsmV1,
            EntanglementLifecycle,
            RulePayload::PeerTiming(m.clone()),
        ),
        MessageBody::EmitPhotonRequest(m) => {
            let protocol = if m.msm { ProtocolKind::MsmV1 } else { ProtocolKind::MimV1 };
            // The request is the emission timer itself and gets re-armed.
            Translation::new(protocol, EntanglementLifecycle, RulePayload::EmitRequest(m.clone())).keeping_source()
        }
        MessageBody::LinkTomographyRuleSet(m) => Translation::new(
            ProtocolKind::LinkTomography,
            Maintenance,
            RulePayload::TomographyRuleSet(Box::new(m.clone())),
        ),
        MessageBody::MsmResult(m) => Translation::new(
            ProtocolKind::MsmV1,
            EntanglementLifecycle,
            RulePayload::ChannelResult(m.clone()),
        ),
        MessageBody::PurificationResult(m) => Translation::new(
            ProtocolKind::from_purification_hint(m.protocol),
            EntanglementLifecycle,
            RulePayload::PurificationResult(m.clone()),
        )
        .with_raw_value(m.protocol),
        MessageBody::SingleClickResult(m) => Translation::new(
            ProtocolKind::MsmV1,
            EntanglementLifecycle,
            RulePayload::ClickResult(m.clone()),
        ),
        MessageBody::StopEmitting(m) => Translation::new(
            ProtocolKind::MsmV1,
            EntanglementLifecycle,
            RulePayload::StopEmitting(m.clone()),
        ),
        MessageBody::SwappingResult(m) => Translation::new(
            ProtocolKind::Swapping,
            EntanglementLifecycle,
            RulePayload::SwapResult(m.clone()),
        ),
        MessageBody::RuleSetForwarding(m) => Translation::new(
            ProtocolKind::ConnectionManagement,
            Forwarding,
            RulePayload::RuleSetForwarding(m.clone()),
        ),
        MessageBody::RuleSetForwardingApplication(m) => Translation::new(
            ProtocolKind::from_application_type(m.application_type),
            Forwarding,
            RulePayload::RuleSetForwardingApplication(m.clone()),
        )
        .with_raw_value(m.application_type),
        MessageBody::Opaque(_) => Translation::new(ProtocolKind::Unknown, ExecutionPath::Unknown, RulePayload::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_core::{ChannelSlot, EmitPhotonRequest, PurificationResult, RuleSetForwardingApplication, RuleSetId, SharedTag, StopEmitting};

    fn at(secs: i64) -> SimTime {
        SimTime::from_secs(secs)
    }

    #[test]
    fn test_null_message_is_unknown() {
        let classifier = Classifier::new();
        let event = classifier.classify(None, at(1), 3);
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.channel, EventChannel::Unknown);
        assert!(event.payload.is_none());
        assert_eq!(event.sequence, 3);
    }

    #[test]
    fn test_unrecognised_message_keeps_names() {
        let classifier = Classifier::new();
        let env = Envelope::new("probe-7", MessageBody::Opaque(OpaqueMessage::new("LinkProbe")));
        let event = classifier.classify(Some(&env), at(1), 1);
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.protocol, ProtocolKind::Unknown);
        assert_eq!(event.source_name, "probe-7");
        assert_eq!(event.source_type_name, "LinkProbe");
        assert!(event.payload.is_none());
    }

    #[test]
    fn test_translator_lookup_and_override() {
        let mut classifier = Classifier::new();
        assert!(classifier.register_translator("LegacyStop", |m: &OpaqueMessage| {
            let index = m.fields.get("qnic")?.as_u64()?;
            Some(Translation::new(
                ProtocolKind::MsmV1,
                ExecutionPath::EntanglementLifecycle,
                RulePayload::StopEmitting(StopEmitting { qnic_index: index as u16 }),
            ))
        }));

        let env = Envelope::new(
            "legacy",
            MessageBody::Opaque(OpaqueMessage::new("LegacyStop").with_fields(serde_json::json!({"qnic": 2}))),
        );
        let event = classifier.classify(Some(&env), at(1), 1);
        assert_eq!(event.kind, EventKind::StopEmitting);
        assert_eq!(event.payload, RulePayload::StopEmitting(StopEmitting { qnic_index: 2 }));

        // A translator that declines falls through to Unknown
        assert!(!classifier.register_translator("LegacyStop", |_: &OpaqueMessage| None));
        let event = classifier.classify(Some(&env), at(1), 2);
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.source_type_name, "LegacyStop");
    }

    #[test]
    fn test_emit_request_protocol_and_keep_source() {
        let classifier = Classifier::new();
        let mut req = EmitPhotonRequest::new(ChannelSlot::passive(0));
        let env = Envelope::new("emit", MessageBody::EmitPhotonRequest(req.clone()));
        let event = classifier.classify(Some(&env), at(1), 1);
        assert_eq!(event.protocol, ProtocolKind::MimV1);
        assert!(event.keep_source);
        assert_eq!(event.channel, EventChannel::External);

        req.msm = true;
        let env = Envelope::timer("emit", MessageBody::EmitPhotonRequest(req));
        let event = classifier.classify(Some(&env), at(1), 2);
        assert_eq!(event.protocol, ProtocolKind::MsmV1);
        assert_eq!(event.channel, EventChannel::InternalTimer);
    }

    #[test]
    fn test_self_timer_forces_keep_source() {
        let classifier = Classifier::new();
        let env = Envelope::timer("stop", MessageBody::StopEmitting(StopEmitting { qnic_index: 0 }));
        let event = classifier.classify(Some(&env), at(1), 1);
        assert!(event.keep_source);
        assert_eq!(event.channel, EventChannel::InternalTimer);
    }

    #[test]
    fn test_raw_values_and_unknown_protocols() {
        let classifier = Classifier::new();
        let env = Envelope::of(MessageBody::PurificationResult(PurificationResult {
            ruleset_id: RuleSetId(1),
            shared_tag: SharedTag(0),
            sequence: 0,
            measurement: 1,
            protocol: 42,
        }));
        let event = classifier.classify(Some(&env), at(1), 1);
        assert_eq!(event.kind, EventKind::PurificationResult);
        assert_eq!(event.protocol, ProtocolKind::Unknown);
        assert_eq!(event.protocol_raw_value, "42");

        let env = Envelope::of(MessageBody::RuleSetForwardingApplication(RuleSetForwardingApplication {
            application_type: 999,
            ruleset: "{}".to_string(),
        }));
        let event = classifier.classify(Some(&env), at(1), 2);
        assert_eq!(event.kind, EventKind::RuleSetForwardingApplication);
        assert_eq!(event.protocol, ProtocolKind::Unknown);
        assert_eq!(event.execution_path, ExecutionPath::Forwarding);
        assert_eq!(event.protocol_raw_value, "999");
    }
}
