//! Engine configuration

use serde::{Deserialize, Serialize};

use qnet_core::{ChannelSlot, ChannelType, NodeAddr, QnetError, QnetResult};
use qnet_runtime::DEFAULT_STEP_BUDGET;

/// Channels of one type on a node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub channel_type: ChannelType,
    pub channels: u16,
    pub qubits_per_channel: u16,
}

impl ChannelSpec {
    pub fn new(channel_type: ChannelType, channels: u16, qubits_per_channel: u16) -> Self {
        ChannelSpec {
            channel_type,
            channels,
            qubits_per_channel,
        }
    }
}

/// Rule engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub node_addr: NodeAddr,
    pub channels: Vec<ChannelSpec>,
    /// Instruction budget per program run
    pub max_program_steps: usize,
    /// First sequence number used when the scheduler supplies none
    pub fallback_sequence_start: u64,
    /// Drop terminated runtimes at the end of each cycle
    pub purge_terminated: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_addr: NodeAddr(0),
            channels: vec![ChannelSpec::new(ChannelType::Emitter, 1, 8)],
            max_program_steps: DEFAULT_STEP_BUDGET,
            fallback_sequence_start: 0,
            purge_terminated: false,
        }
    }
}

impl EngineConfig {
    /// Node linked through measurement stations
    pub fn emitter_node(node_addr: NodeAddr, channels: u16, qubits_per_channel: u16) -> Self {
        Self {
            node_addr,
            channels: vec![ChannelSpec::new(ChannelType::Emitter, channels, qubits_per_channel)],
            ..Default::default()
        }
    }

    /// Node linked through entangled photon pair sources
    pub fn passive_node(node_addr: NodeAddr, channels: u16, qubits_per_channel: u16) -> Self {
        Self {
            node_addr,
            channels: vec![ChannelSpec::new(ChannelType::ReceiverPassive, channels, qubits_per_channel)],
            ..Default::default()
        }
    }

    pub fn with_channels(mut self, spec: ChannelSpec) -> Self {
        self.channels.retain(|c| c.channel_type != spec.channel_type);
        self.channels.push(spec);
        self
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> QnetResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| QnetError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QnetResult<()> {
        if self.max_program_steps == 0 {
            return Err(QnetError::InvalidConfig("max_program_steps must be positive".to_string()));
        }
        for (i, spec) in self.channels.iter().enumerate() {
            if spec.channels > 0 && spec.qubits_per_channel == 0 {
                return Err(QnetError::InvalidConfig(format!(
                    "{} channels have no qubits",
                    spec.channel_type.as_str()
                )));
            }
            if self.channels[..i].iter().any(|c| c.channel_type == spec.channel_type) {
                return Err(QnetError::InvalidConfig(format!(
                    "{} channels configured twice",
                    spec.channel_type.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Every slot with its qubit count, in allocation order
    pub fn slots(&self) -> Vec<(ChannelSlot, u16)> {
        let mut slots: Vec<(ChannelSlot, u16)> = self
            .channels
            .iter()
            .flat_map(|spec| {
                (0..spec.channels).map(move |index| (ChannelSlot::new(spec.channel_type, index), spec.qubits_per_channel))
            })
            .collect();
        slots.sort_by_key(|(slot, _)| *slot);
        slots
    }
}
