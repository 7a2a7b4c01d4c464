//! Transport messages
//!
//! The scheduler hands the engine an [`Envelope`]: instance name, self-timer
//! flag and a body. Bodies the engine understands are typed; anything else is
//! carried as an [`OpaqueMessage`] with its type name and raw fields.

use serde::{Deserialize, Serialize};

use crate::{ChannelSlot, NodeAddr, PauliOperator, RuleSet, RuleSetId, SharedTag, SimTime};

/// One heralded success inside a link generation result
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BsmSuccess {
    /// Position of the photon in the emission order
    pub photon_index: usize,
    pub correction: PauliOperator,
}

/// Combined Bell-state measurement results for one emission round
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BsmResult {
    pub slot: ChannelSlot,
    pub neighbor: NodeAddr,
    pub successes: Vec<BsmSuccess>,
}

/// Timing for the next emission round toward a measurement station
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BsmTimingNotification {
    pub slot: ChannelSlot,
    pub first_emit_time: SimTime,
    pub interval: SimTime,
}

/// Timing from an entangled photon pair source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EppsTimingNotification {
    /// Local passive receiver channel index
    pub qnic_index: u16,
    pub partner: NodeAddr,
    pub partner_qnic_index: u16,
    pub epps_addr: NodeAddr,
    pub first_emit_time: SimTime,
    pub interval: SimTime,
    pub total_travel_time: SimTime,
}

/// Self-timer driving periodic photon emission on a slot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmitPhotonRequest {
    pub slot: ChannelSlot,
    pub first: bool,
    pub msm: bool,
    pub interval: SimTime,
}

impl EmitPhotonRequest {
    pub fn new(slot: ChannelSlot) -> Self {
        EmitPhotonRequest {
            slot,
            first: true,
            msm: false,
            interval: SimTime::ZERO,
        }
    }
}

/// Tomography rule set handed down from the maintenance layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkTomographyRuleSet {
    pub ruleset: RuleSet,
}

/// Midpoint-source link result exchanged between the two ends of a link
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MsmResult {
    /// Receiver-side channel index
    pub qnic_index: u16,
    pub photon_index: u64,
    pub success: bool,
    pub correction: PauliOperator,
    pub src: NodeAddr,
    pub dest: NodeAddr,
}

/// Remote purification measurement outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurificationResult {
    pub ruleset_id: RuleSetId,
    pub shared_tag: SharedTag,
    pub sequence: i64,
    pub measurement: i64,
    /// Purification scheme hint; values outside the known range are unrecognised
    pub protocol: i64,
}

/// Local click outcome at a passive receiver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleClickResult {
    pub qnic_index: u16,
    pub success: bool,
    pub correction: PauliOperator,
}

/// Request to stop an ongoing midpoint-source emission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopEmitting {
    pub qnic_index: u16,
}

/// Remote entanglement swapping outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwappingResult {
    pub ruleset_id: RuleSetId,
    pub shared_tag: SharedTag,
    pub sequence: i64,
    pub correction_frame: i64,
    pub new_partner: NodeAddr,
}

/// Serialized rule set forwarded by connection setup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSetForwarding {
    pub ruleset: String,
}

/// Serialized application rule set forwarded by connection setup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSetForwardingApplication {
    /// Only type 0 is handled by the engine
    pub application_type: i32,
    pub ruleset: String,
}

/// Message of a type the engine has no typed form for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpaqueMessage {
    pub type_name: String,
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl OpaqueMessage {
    pub fn new(type_name: impl Into<String>) -> Self {
        OpaqueMessage {
            type_name: type_name.into(),
            fields: serde_json::Value::Null,
        }
    }

    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        self.fields = fields;
        self
    }
}

/// Transport message body
#[derive(Clone, Debug, PartialEq)]
pub enum MessageBody {
    BsmResult(BsmResult),
    BsmTimingNotification(BsmTimingNotification),
    EppsTimingNotification(EppsTimingNotification),
    EmitPhotonRequest(EmitPhotonRequest),
    LinkTomographyRuleSet(LinkTomographyRuleSet),
    MsmResult(MsmResult),
    PurificationResult(PurificationResult),
    SingleClickResult(SingleClickResult),
    StopEmitting(StopEmitting),
    SwappingResult(SwappingResult),
    RuleSetForwarding(RuleSetForwarding),
    RuleSetForwardingApplication(RuleSetForwardingApplication),
    Opaque(OpaqueMessage),
}

impl MessageBody {
    /// Class name used in logs
    pub fn type_name(&self) -> &str {
        match self {
            MessageBody::BsmResult(_) => "BsmResult",
            MessageBody::BsmTimingNotification(_) => "BsmTimingNotification",
            MessageBody::EppsTimingNotification(_) => "EppsTimingNotification",
            MessageBody::EmitPhotonRequest(_) => "EmitPhotonRequest",
            MessageBody::LinkTomographyRuleSet(_) => "LinkTomographyRuleSet",
            MessageBody::MsmResult(_) => "MsmResult",
            MessageBody::PurificationResult(_) => "PurificationResult",
            MessageBody::SingleClickResult(_) => "SingleClickResult",
            MessageBody::StopEmitting(_) => "StopEmitting",
            MessageBody::SwappingResult(_) => "SwappingResult",
            MessageBody::RuleSetForwarding(_) => "RuleSetForwarding",
            MessageBody::RuleSetForwardingApplication(_) => "RuleSetForwardingApplication",
            MessageBody::Opaque(opaque) => &opaque.type_name,
        }
    }
}

/// Message as delivered by the scheduler
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Human-readable instance name
    pub name: String,
    pub self_timer: bool,
    pub body: MessageBody,
}

impl Envelope {
    pub fn new(name: impl Into<String>, body: MessageBody) -> Self {
        Envelope {
            name: name.into(),
            self_timer: false,
            body,
        }
    }

    /// Envelope named after its body type
    pub fn of(body: MessageBody) -> Self {
        let name = body.type_name().to_string();
        Envelope::new(name, body)
    }

    pub fn timer(name: impl Into<String>, body: MessageBody) -> Self {
        Envelope {
            name: name.into(),
            self_timer: true,
            body,
        }
    }

    pub fn type_name(&self) -> &str {
        self.body.type_name()
    }
}

/// Pair-source stop request sent when a midpoint link is torn down
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopEppsEmission {
    pub src: NodeAddr,
    pub dest: NodeAddr,
}

/// Message emitted by a rule action, correlated through its shared tag
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleMessage {
    pub ruleset_id: RuleSetId,
    pub shared_tag: SharedTag,
    pub src: NodeAddr,
    pub dest: NodeAddr,
    pub kind: String,
    pub content: Vec<i64>,
}

/// Message leaving the engine for the network
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    MsmResult(MsmResult),
    StopEppsEmission(StopEppsEmission),
    Rule(RuleMessage),
}

impl OutboundMessage {
    pub fn dest(&self) -> NodeAddr {
        match self {
            OutboundMessage::MsmResult(m) => m.dest,
            OutboundMessage::StopEppsEmission(m) => m.dest,
            OutboundMessage::Rule(m) => m.dest,
        }
    }
}
