//! Rule events
//!
//! Every delivered message becomes exactly one [`RuleEvent`]. Classification
//! runs along two axes: [`ProtocolKind`] names the protocol semantics and
//! [`ExecutionPath`] the coarse control-flow phase. Link architecture never
//! leaks into either.

use serde::{Deserialize, Serialize};

use crate::{
    BsmResult, BsmTimingNotification, EmitPhotonRequest, EppsTimingNotification, LinkTomographyRuleSet,
    MsmResult, PurificationResult, RuleSetForwarding, RuleSetForwardingApplication, SimTime,
    SingleClickResult, StopEmitting, SwappingResult,
};

/// Event kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    LinkResult = 0x00,
    LinkTiming = 0x01,
    PeerTiming = 0x02,
    EmitRequest = 0x03,
    TomographyRuleSet = 0x04,
    ChannelResult = 0x05,
    PurificationResult = 0x06,
    ClickResult = 0x07,
    StopEmitting = 0x08,
    SwapResult = 0x09,
    RuleSetForwarding = 0x0A,
    RuleSetForwardingApplication = 0x0B,
    Unknown = 0xFF,
}

impl EventKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(EventKind::LinkResult),
            0x01 => Some(EventKind::LinkTiming),
            0x02 => Some(EventKind::PeerTiming),
            0x03 => Some(EventKind::EmitRequest),
            0x04 => Some(EventKind::TomographyRuleSet),
            0x05 => Some(EventKind::ChannelResult),
            0x06 => Some(EventKind::PurificationResult),
            0x07 => Some(EventKind::ClickResult),
            0x08 => Some(EventKind::StopEmitting),
            0x09 => Some(EventKind::SwapResult),
            0x0A => Some(EventKind::RuleSetForwarding),
            0x0B => Some(EventKind::RuleSetForwardingApplication),
            0xFF => Some(EventKind::Unknown),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::LinkResult => "LINK_RESULT",
            EventKind::LinkTiming => "LINK_TIMING",
            EventKind::PeerTiming => "PEER_TIMING",
            EventKind::EmitRequest => "EMIT_REQUEST",
            EventKind::TomographyRuleSet => "TOMOGRAPHY_RULESET",
            EventKind::ChannelResult => "CHANNEL_RESULT",
            EventKind::PurificationResult => "PURIFICATION_RESULT",
            EventKind::ClickResult => "CLICK_RESULT",
            EventKind::StopEmitting => "STOP_EMITTING",
            EventKind::SwapResult => "SWAP_RESULT",
            EventKind::RuleSetForwarding => "RULESET_FORWARDING",
            EventKind::RuleSetForwardingApplication => "RULESET_FORWARDING_APPLICATION",
            EventKind::Unknown => "UNKNOWN",
        }
    }
}

/// Where an event came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventChannel {
    External,
    InternalTimer,
    #[default]
    Unknown,
}

/// Protocol family an event belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ProtocolKind {
    #[default]
    Unknown,
    /// Link generation through a midpoint measurement station
    MimV1,
    /// Link generation through a midpoint entangled photon source
    MsmV1,
    Purification,
    Swapping,
    LinkTomography,
    ConnectionManagement,
    Maintenance,
}

impl ProtocolKind {
    /// Largest purification scheme hint the engine recognises
    pub const MAX_PURIFICATION_HINT: i64 = 10;

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolKind::Unknown => "Unknown",
            ProtocolKind::MimV1 => "MIM_v1",
            ProtocolKind::MsmV1 => "MSM_v1",
            ProtocolKind::Purification => "Purification",
            ProtocolKind::Swapping => "Swapping",
            ProtocolKind::LinkTomography => "LinkTomography",
            ProtocolKind::ConnectionManagement => "ConnectionManagement",
            ProtocolKind::Maintenance => "Maintenance",
        }
    }

    /// Protocol for a purification scheme hint
    pub fn from_purification_hint(hint: i64) -> Self {
        if (0..=Self::MAX_PURIFICATION_HINT).contains(&hint) {
            ProtocolKind::Purification
        } else {
            ProtocolKind::Unknown
        }
    }

    /// Protocol for a forwarded application rule set
    pub fn from_application_type(application_type: i32) -> Self {
        if application_type == 0 {
            ProtocolKind::ConnectionManagement
        } else {
            ProtocolKind::Unknown
        }
    }
}

/// Coarse control-flow phase of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecutionPath {
    #[default]
    Unknown,
    EntanglementLifecycle,
    ConnectionControl,
    Forwarding,
    Maintenance,
}

impl ExecutionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionPath::Unknown => "Unknown",
            ExecutionPath::EntanglementLifecycle => "EntanglementLifecycle",
            ExecutionPath::ConnectionControl => "ConnectionControl",
            ExecutionPath::Forwarding => "Forwarding",
            ExecutionPath::Maintenance => "Maintenance",
        }
    }
}

/// Typed event payload
#[derive(Clone, Debug, PartialEq, Default)]
pub enum RulePayload {
    #[default]
    None,
    LinkResult(BsmResult),
    LinkTiming(BsmTimingNotification),
    PeerTiming(EppsTimingNotification),
    EmitRequest(EmitPhotonRequest),
    TomographyRuleSet(Box<LinkTomographyRuleSet>),
    ChannelResult(MsmResult),
    PurificationResult(PurificationResult),
    ClickResult(SingleClickResult),
    StopEmitting(StopEmitting),
    SwapResult(SwappingResult),
    RuleSetForwarding(RuleSetForwarding),
    RuleSetForwardingApplication(RuleSetForwardingApplication),
}

impl RulePayload {
    /// Event kind the payload belongs to
    pub fn kind(&self) -> EventKind {
        match self {
            RulePayload::None => EventKind::Unknown,
            RulePayload::LinkResult(_) => EventKind::LinkResult,
            RulePayload::LinkTiming(_) => EventKind::LinkTiming,
            RulePayload::PeerTiming(_) => EventKind::PeerTiming,
            RulePayload::EmitRequest(_) => EventKind::EmitRequest,
            RulePayload::TomographyRuleSet(_) => EventKind::TomographyRuleSet,
            RulePayload::ChannelResult(_) => EventKind::ChannelResult,
            RulePayload::PurificationResult(_) => EventKind::PurificationResult,
            RulePayload::ClickResult(_) => EventKind::ClickResult,
            RulePayload::StopEmitting(_) => EventKind::StopEmitting,
            RulePayload::SwapResult(_) => EventKind::SwapResult,
            RulePayload::RuleSetForwarding(_) => EventKind::RuleSetForwarding,
            RulePayload::RuleSetForwardingApplication(_) => EventKind::RuleSetForwardingApplication,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RulePayload::None)
    }
}

/// Classified, ordered event
#[derive(Clone, Debug, PartialEq)]
pub struct RuleEvent {
    pub kind: EventKind,
    pub channel: EventChannel,
    /// The transport message must outlive dispatch
    pub keep_source: bool,
    pub time: SimTime,
    /// Tie-breaker within one timestamp
    pub sequence: u64,
    pub protocol: ProtocolKind,
    pub execution_path: ExecutionPath,
    /// Raw protocol hint as carried by the message
    pub protocol_raw_value: String,
    pub payload: RulePayload,
    pub source_name: String,
    pub source_type_name: String,
}

impl RuleEvent {
    /// Bare event, used for synthesized cases
    pub fn new(kind: EventKind, protocol: ProtocolKind, time: SimTime, sequence: u64) -> Self {
        RuleEvent {
            kind,
            channel: EventChannel::Unknown,
            keep_source: false,
            time,
            sequence,
            protocol,
            execution_path: ExecutionPath::Unknown,
            protocol_raw_value: String::new(),
            payload: RulePayload::None,
            source_name: String::new(),
            source_type_name: String::new(),
        }
    }

    pub fn with_payload(mut self, payload: RulePayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_channel(mut self, channel: EventChannel) -> Self {
        self.channel = channel;
        self
    }

    /// Ordering key within a drained batch
    #[inline]
    pub fn order_key(&self) -> (SimTime, u64) {
        (self.time, self.sequence)
    }
}
