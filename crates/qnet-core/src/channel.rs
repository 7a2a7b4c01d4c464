//! Channel slots and physical qubit keys
//!
//! A node's hardware is a set of channel slots, each a (channel type, index)
//! lane holding a fixed number of stationary qubits.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Channel hardware type
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelType {
    /// Emits photons toward a measurement station (E)
    Emitter = 0x00,
    /// Receives photons and measures locally (R)
    Receiver = 0x01,
    /// Passive receiver fed by an entangled photon pair source (RP)
    ReceiverPassive = 0x02,
}

impl ChannelType {
    /// Allocation order: E, then R, then RP
    pub const ALL: [ChannelType; 3] = [
        ChannelType::Emitter,
        ChannelType::Receiver,
        ChannelType::ReceiverPassive,
    ];

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(ChannelType::Emitter),
            0x01 => Some(ChannelType::Receiver),
            0x02 => Some(ChannelType::ReceiverPassive),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Emitter => "E",
            ChannelType::Receiver => "R",
            ChannelType::ReceiverPassive => "RP",
        }
    }
}

/// Addressable channel lane
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelSlot {
    pub channel_type: ChannelType,
    pub index: u16,
}

impl ChannelSlot {
    #[inline]
    pub fn new(channel_type: ChannelType, index: u16) -> Self {
        ChannelSlot {
            channel_type,
            index,
        }
    }

    #[inline]
    pub fn emitter(index: u16) -> Self {
        ChannelSlot::new(ChannelType::Emitter, index)
    }

    #[inline]
    pub fn receiver(index: u16) -> Self {
        ChannelSlot::new(ChannelType::Receiver, index)
    }

    #[inline]
    pub fn passive(index: u16) -> Self {
        ChannelSlot::new(ChannelType::ReceiverPassive, index)
    }

    /// Key of the qubit at `index` inside this slot
    #[inline]
    pub fn qubit(self, index: u16) -> QubitKey {
        QubitKey { slot: self, index }
    }
}

impl fmt::Debug for ChannelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.channel_type.as_str(), self.index)
    }
}

/// Physical location of one stationary qubit
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QubitKey {
    pub slot: ChannelSlot,
    pub index: u16,
}

impl fmt::Debug for QubitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.slot, self.index)
    }
}
