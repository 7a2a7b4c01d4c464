//! Rule programs
//!
//! A [`RuleSet`] is the unit handed over by the connection-setup layer: an
//! ordered list of condition/action [`Rule`]s plus a termination check. Each
//! [`Program`] is a flat sequence of [`Instruction`]s run by the interpreter.
//!
//! Rule sets travel between nodes as JSON and are validated structurally on
//! parse, so the interpreter never sees an out-of-range jump or register.

use serde::{Deserialize, Serialize};

use crate::{GateKind, NodeAddr, PauliOperator, QnetError, QnetResult, QubitId, RegId, RuleSetId, SharedTag};

/// Number of general-purpose interpreter registers
pub const REGISTER_COUNT: usize = 16;

/// Outcome of running a program
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCode {
    /// Program ended without an explicit return
    #[default]
    None,
    CondPassed,
    CondFailed,
    Terminated,
    /// Program faulted; the rule does not fire
    Error,
}

/// Immediate value or register operand
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Reg(RegId),
    Imm(i64),
}

/// Comparison used by conditional branches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}

/// Interpreter instruction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    // Resources
    /// Bind the `index`th resource shared with `partner` to a named qubit.
    /// Fails the condition when no such resource is bound yet.
    GetQubit { dst: QubitId, partner: NodeAddr, index: usize },
    /// Count resources bound for `partner`
    CountQubits { dst: RegId, partner: NodeAddr },
    /// Consume a named qubit and hand it back to the pool
    FreeQubit { qubit: QubitId },
    /// Move a named qubit's binding to the partner address held in `partner`
    Rebind { qubit: QubitId, partner: Operand },

    // Physical
    Measure { dst: RegId, qubit: QubitId, basis: PauliOperator },
    Gate { gate: GateKind, qubits: Vec<QubitId> },

    // Messages
    /// Read the oldest message for this rule's shared tag into `dst`,
    /// leaving it queued. Fails the condition when none is queued.
    GetMessage { dst: Vec<RegId> },
    /// Drop the oldest message for this rule's shared tag
    DeleteMessage,
    CountMessages { dst: RegId },
    /// Queue an outbound message to `partner` tagged with this rule's shared tag
    Send { partner: Operand, kind: String, content: Vec<Operand> },

    // Registers and memory
    Set { dst: RegId, value: i64 },
    Add { dst: RegId, lhs: Operand, rhs: Operand },
    Sub { dst: RegId, lhs: Operand, rhs: Operand },
    Load { dst: RegId, key: String },
    Store { key: String, src: Operand },

    // Control flow
    Jump { target: usize },
    Branch { cmp: Comparison, lhs: Operand, rhs: Operand, target: usize },
    Ret { code: ReturnCode },
}

impl Instruction {
    fn registers(&self) -> Vec<RegId> {
        fn op(o: &Operand) -> Option<RegId> {
            match o {
                Operand::Reg(r) => Some(*r),
                Operand::Imm(_) => None,
            }
        }
        match self {
            Instruction::CountQubits { dst, .. }
            | Instruction::Measure { dst, .. }
            | Instruction::CountMessages { dst }
            | Instruction::Set { dst, .. }
            | Instruction::Load { dst, .. } => vec![*dst],
            Instruction::Rebind { partner, .. } => op(partner).into_iter().collect(),
            Instruction::GetMessage { dst } => dst.clone(),
            Instruction::Send { partner, content, .. } => {
                op(partner).into_iter().chain(content.iter().filter_map(op)).collect()
            }
            Instruction::Add { dst, lhs, rhs } | Instruction::Sub { dst, lhs, rhs } => {
                std::iter::once(*dst).chain(op(lhs)).chain(op(rhs)).collect()
            }
            Instruction::Store { src, .. } => op(src).into_iter().collect(),
            Instruction::Branch { lhs, rhs, .. } => op(lhs).into_iter().chain(op(rhs)).collect(),
            _ => Vec::new(),
        }
    }

    fn jump_target(&self) -> Option<usize> {
        match self {
            Instruction::Jump { target } | Instruction::Branch { target, .. } => Some(*target),
            _ => None,
        }
    }
}

/// Named instruction sequence
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Program {
            name: name.into(),
            instructions,
        }
    }

    /// Program that immediately returns `code`
    pub fn returning(name: impl Into<String>, code: ReturnCode) -> Self {
        Program::new(name, vec![Instruction::Ret { code }])
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Check jump targets and register indices
    pub fn validate(&self) -> QnetResult<()> {
        for (pc, instruction) in self.instructions.iter().enumerate() {
            if let Some(target) = instruction.jump_target() {
                // Jumping to len() ends the program.
                if target > self.instructions.len() {
                    return Err(QnetError::MalformedRuleSet(format!(
                        "{}: jump at {} targets {} beyond {} instructions",
                        self.name,
                        pc,
                        target,
                        self.instructions.len()
                    )));
                }
            }
            if let Some(reg) = instruction.registers().into_iter().find(|r| r.index() >= REGISTER_COUNT) {
                return Err(QnetError::MalformedRuleSet(format!(
                    "{}: register {} at {} out of range",
                    self.name, reg.0, pc
                )));
            }
            if let Instruction::Gate { gate, qubits } = instruction {
                if qubits.len() != gate.arity() {
                    return Err(QnetError::MalformedRuleSet(format!(
                        "{}: {:?} at {} takes {} qubits, got {}",
                        self.name,
                        gate,
                        pc,
                        gate.arity(),
                        qubits.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One condition/action pair
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// Partner whose resources this rule consumes
    #[serde(default)]
    pub partner: Option<NodeAddr>,
    #[serde(default)]
    pub shared_tag: SharedTag,
    pub condition: Program,
    pub action: Program,
}

impl Rule {
    pub fn new(name: impl Into<String>, condition: Program, action: Program) -> Self {
        Rule {
            name: name.into(),
            partner: None,
            shared_tag: SharedTag::NONE,
            condition,
            action,
        }
    }

    pub fn with_partner(mut self, partner: NodeAddr) -> Self {
        self.partner = Some(partner);
        self
    }

    pub fn with_shared_tag(mut self, tag: SharedTag) -> Self {
        self.shared_tag = tag;
        self
    }
}

/// Submitted rule program
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: RuleSetId,
    pub owner: NodeAddr,
    /// Evaluated in list order
    pub rules: Vec<Rule>,
    /// Returns `Terminated` once the rule set is done
    pub termination: Program,
    /// Maximum resources bound per partner at once, unlimited when absent
    #[serde(default)]
    pub resource_limit: Option<usize>,
}

impl RuleSet {
    pub fn new(id: RuleSetId, owner: NodeAddr) -> Self {
        RuleSet {
            id,
            owner,
            rules: Vec::new(),
            termination: Program::returning("never", ReturnCode::None),
            resource_limit: None,
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_termination(mut self, termination: Program) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_resource_limit(mut self, limit: usize) -> Self {
        self.resource_limit = Some(limit);
        self
    }

    /// Parse and validate a serialized rule set
    pub fn from_json(json: &str) -> QnetResult<Self> {
        let ruleset: RuleSet = serde_json::from_str(json)?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    pub fn from_value(value: serde_json::Value) -> QnetResult<Self> {
        let ruleset: RuleSet = serde_json::from_value(value)?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    pub fn to_json(&self) -> QnetResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> QnetResult<()> {
        for rule in &self.rules {
            rule.condition.validate()?;
            rule.action.validate()?;
        }
        self.termination.validate()?;
        if self.resource_limit == Some(0) {
            return Err(QnetError::MalformedRuleSet(format!(
                "rule set {} has a zero resource limit",
                self.id
            )));
        }
        Ok(())
    }

    /// Partners named by the rules, in rule order without repeats
    pub fn partners(&self) -> Vec<NodeAddr> {
        let mut partners = Vec::new();
        for partner in self.rules.iter().filter_map(|r| r.partner) {
            if !partners.contains(&partner) {
                partners.push(partner);
            }
        }
        partners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RuleSet {
        RuleSet::new(RuleSetId(42), NodeAddr(1))
            .with_rule(
                Rule::new(
                    "swap",
                    Program::new(
                        "cond",
                        vec![
                            Instruction::GetQubit {
                                dst: QubitId(0),
                                partner: NodeAddr(2),
                                index: 0,
                            },
                            Instruction::Ret {
                                code: ReturnCode::CondPassed,
                            },
                        ],
                    ),
                    Program::new(
                        "act",
                        vec![Instruction::FreeQubit { qubit: QubitId(0) }],
                    ),
                )
                .with_partner(NodeAddr(2))
                .with_shared_tag(SharedTag(7)),
            )
            .with_termination(Program::returning("done", ReturnCode::Terminated))
    }

    #[test]
    fn test_ruleset_json_roundtrip() {
        let ruleset = sample();
        let json = ruleset.to_json().unwrap();
        assert!(json.contains("\"op\":\"get_qubit\""));
        let parsed = RuleSet::from_json(&json).unwrap();
        assert_eq!(parsed, ruleset);
    }

    #[test]
    fn test_ruleset_defaults_optional_fields() {
        let json = r#"{
            "id": 9, "owner": 3,
            "rules": [{"name": "r", "condition": {"name": "c", "instructions": []},
                       "action": {"name": "a", "instructions": []}}],
            "termination": {"name": "t", "instructions": [{"op": "ret", "code": "terminated"}]}
        }"#;
        let ruleset = RuleSet::from_json(json).unwrap();
        assert_eq!(ruleset.rules[0].shared_tag, SharedTag::NONE);
        assert_eq!(ruleset.rules[0].partner, None);
        assert_eq!(ruleset.resource_limit, None);
    }

    #[test]
    fn test_delete_message_json() {
        let program: Program =
            serde_json::from_str(r#"{"name": "a", "instructions": [{"op": "delete_message"}]}"#).unwrap();
        assert_eq!(program.instructions, vec![Instruction::DeleteMessage]);
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = RuleSet::from_json("{\"id\": 1, \"rules\": [").unwrap_err();
        assert!(matches!(err, QnetError::MalformedRuleSet(_)));
    }

    #[test]
    fn test_validation_rejects_bad_jump_and_register() {
        let mut ruleset = sample();
        ruleset.rules[0].action.instructions.push(Instruction::Jump { target: 99 });
        assert!(ruleset.validate().is_err());

        let mut ruleset = sample();
        ruleset.termination = Program::new(
            "t",
            vec![Instruction::Set {
                dst: RegId(REGISTER_COUNT as u8),
                value: 1,
            }],
        );
        assert!(ruleset.validate().is_err());

        let mut ruleset = sample();
        ruleset.rules[0].action.instructions.push(Instruction::Gate {
            gate: GateKind::Cnot,
            qubits: vec![QubitId(0)],
        });
        assert!(ruleset.validate().is_err());
    }

    #[test]
    fn test_partners_deduplicated_in_rule_order() {
        let ruleset = sample()
            .with_rule(Rule::new("b", Program::default(), Program::default()).with_partner(NodeAddr(5)))
            .with_rule(Rule::new("c", Program::default(), Program::default()).with_partner(NodeAddr(2)));
        assert_eq!(ruleset.partners(), vec![NodeAddr(2), NodeAddr(5)]);
    }

    #[test]
    fn test_comparison() {
        assert!(Comparison::Le.holds(2, 2));
        assert!(!Comparison::Gt.holds(1, 2));
        assert!(Comparison::Ne.holds(1, 2));
    }
}
