//! Identity types for the rule engine
//!
//! Node addresses follow the simulator's signed convention, where negative
//! values never name a real node. Rule set identifiers are 64-bit and assigned
//! by the connection-setup layer before submission.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of a simulated network node
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddr(pub i32);

impl NodeAddr {
    #[inline]
    pub fn new(addr: i32) -> Self {
        NodeAddr(addr)
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a submitted rule set
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSetId(pub u64);

impl RuleSetId {
    #[inline]
    pub fn new(id: u64) -> Self {
        RuleSetId(id)
    }
}

impl fmt::Debug for RuleSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleSet({:016x})", self.0)
    }
}

impl fmt::Display for RuleSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Tag correlating a rule with its counterpart on the remote node.
/// `-1` means the rule is not correlated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedTag(pub i32);

impl SharedTag {
    pub const NONE: SharedTag = SharedTag(-1);

    #[inline]
    pub fn new(tag: i32) -> Self {
        SharedTag(tag)
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl Default for SharedTag {
    fn default() -> Self {
        SharedTag::NONE
    }
}

impl fmt::Debug for SharedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

/// Program-level name for a bound qubit
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QubitId(pub u32);

/// Interpreter register index
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegId(pub u8);

impl RegId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_tag_none() {
        assert!(SharedTag::NONE.is_none());
        assert!(SharedTag::default().is_none());
        assert!(!SharedTag::new(0).is_none());
    }

    #[test]
    fn test_node_addr_ordering() {
        let mut addrs = vec![NodeAddr(7), NodeAddr(-1), NodeAddr(3)];
        addrs.sort();
        assert_eq!(addrs, vec![NodeAddr(-1), NodeAddr(3), NodeAddr(7)]);
        assert_eq!(format!("{:?}", NodeAddr(3)), "Node(3)");
    }
}
