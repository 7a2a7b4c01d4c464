//! Rule program interpreter
//!
//! Runs one [`Program`] against a runtime's registers and bindings. Missing
//! resources or messages are not faults: they make the program return
//! `CondFailed` so the rule is retried on a later pass. Structural faults
//! (unbound qubit, exhausted step budget) end the program with `Error`.

use qnet_core::{
    NodeAddr, Operand, PhysicalBackend, PhysicalOperation, Program, QnetError, QnetResult, QubitId, QubitKey,
    RegId, ReturnCode, RuleMessage, RuleSetId, SharedTag, Instruction,
};
use qnet_pool::ResourcePool;
use tracing::warn;

use crate::RuntimeState;

/// Default instruction budget per program run
pub const DEFAULT_STEP_BUDGET: usize = 1024;

/// Identity of the rule being executed
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    pub ruleset_id: RuleSetId,
    pub owner: NodeAddr,
    pub shared_tag: SharedTag,
}

/// Collaborators a program may touch
pub struct ExecEnv<'a> {
    pub pool: &'a mut ResourcePool,
    pub backend: &'a mut dyn PhysicalBackend,
    pub outbox: &'a mut Vec<RuleMessage>,
    pub step_budget: usize,
}

/// Run `program`, reporting faults as `ReturnCode::Error`
pub fn run(program: &Program, state: &mut RuntimeState, frame: &Frame, env: &mut ExecEnv<'_>) -> ReturnCode {
    match execute(program, state, frame, env) {
        Ok(code) => code,
        Err(err) => {
            warn!(ruleset = %frame.ruleset_id, program = %program.name, error = %err, "program fault");
            ReturnCode::Error
        }
    }
}

fn execute(program: &Program, state: &mut RuntimeState, frame: &Frame, env: &mut ExecEnv<'_>) -> QnetResult<ReturnCode> {
    let fault = |reason: String| QnetError::ProgramFault {
        program: program.name.clone(),
        reason,
    };

    let mut pc = 0;
    let mut steps = 0;
    while let Some(instruction) = program.instructions.get(pc) {
        if steps >= env.step_budget {
            return Err(fault(format!("step budget of {} exhausted at {}", env.step_budget, pc)));
        }
        steps += 1;
        pc += 1;

        match instruction {
            Instruction::GetQubit { dst, partner, index } => match state.qubits.nth(partner, *index) {
                Some(handle) => {
                    state.named.insert(*dst, handle.key());
                }
                None => return Ok(ReturnCode::CondFailed),
            },
            Instruction::CountQubits { dst, partner } => {
                let count = state.qubits.count(partner) as i64;
                write(state, *dst, count).map_err(fault)?;
            }
            Instruction::FreeQubit { qubit } => {
                let key = named(state, *qubit).map_err(fault)?;
                let Some((_, handle)) = state.qubits.remove_any(|h| h.key() == key) else {
                    return Err(fault(format!("{:?} is not held by this runtime", key)));
                };
                state.named.retain(|_, k| *k != key);
                env.backend.apply(&PhysicalOperation::Reinitialize { target: key });
                env.pool.release(handle);
            }
            Instruction::Rebind { qubit, partner } => {
                let key = named(state, *qubit).map_err(fault)?;
                let addr = read(state, *partner).and_then(node_addr).map_err(fault)?;
                let Some((_, handle)) = state.qubits.remove_any(|h| h.key() == key) else {
                    return Err(fault(format!("{:?} is not held by this runtime", key)));
                };
                env.pool.rebind(&handle, addr);
                state.qubits.insert(addr, handle);
                state.partners.insert(addr);
            }
            Instruction::Measure { dst, qubit, basis } => {
                let key = named(state, *qubit).map_err(fault)?;
                let result = env.backend.apply(&PhysicalOperation::Measure {
                    target: key,
                    basis: *basis,
                });
                let value = if result.success {
                    result.outcome.map_or(0, i64::from)
                } else {
                    -1
                };
                write(state, *dst, value).map_err(fault)?;
            }
            Instruction::Gate { gate, qubits } => {
                let targets = qubits
                    .iter()
                    .map(|q| named(state, *q))
                    .collect::<Result<Vec<QubitKey>, String>>()
                    .map_err(fault)?;
                env.backend.apply(&PhysicalOperation::Gate { gate: *gate, targets });
            }
            Instruction::GetMessage { dst } => {
                let Some(record) = state.messages.nth(&frame.shared_tag, 0) else {
                    return Ok(ReturnCode::CondFailed);
                };
                let values: Vec<i64> = (0..dst.len()).map(|i| record.get(i).copied().unwrap_or(0)).collect();
                for (reg, value) in dst.iter().zip(values) {
                    write(state, *reg, value).map_err(fault)?;
                }
            }
            Instruction::DeleteMessage => {
                if state.messages.pop_front(&frame.shared_tag).is_none() {
                    return Err(fault(format!("no message queued under tag {}", frame.shared_tag.0)));
                }
            }
            Instruction::CountMessages { dst } => {
                let count = state.messages.count(&frame.shared_tag) as i64;
                write(state, *dst, count).map_err(fault)?;
            }
            Instruction::Send { partner, kind, content } => {
                let dest = read(state, *partner).and_then(node_addr).map_err(fault)?;
                let content = content
                    .iter()
                    .map(|o| read(state, *o))
                    .collect::<Result<Vec<i64>, String>>()
                    .map_err(fault)?;
                env.outbox.push(RuleMessage {
                    ruleset_id: frame.ruleset_id,
                    shared_tag: frame.shared_tag,
                    src: frame.owner,
                    dest,
                    kind: kind.clone(),
                    content,
                });
            }
            Instruction::Set { dst, value } => write(state, *dst, *value).map_err(fault)?,
            Instruction::Add { dst, lhs, rhs } => {
                let value = read(state, *lhs).map_err(fault)?.wrapping_add(read(state, *rhs).map_err(fault)?);
                write(state, *dst, value).map_err(fault)?;
            }
            Instruction::Sub { dst, lhs, rhs } => {
                let value = read(state, *lhs).map_err(fault)?.wrapping_sub(read(state, *rhs).map_err(fault)?);
                write(state, *dst, value).map_err(fault)?;
            }
            Instruction::Load { dst, key } => {
                let value = state.memory.get(key).copied().unwrap_or(0);
                write(state, *dst, value).map_err(fault)?;
            }
            Instruction::Store { key, src } => {
                let value = read(state, *src).map_err(fault)?;
                state.memory.insert(key.clone(), value);
            }
            Instruction::Jump { target } => pc = *target,
            Instruction::Branch { cmp, lhs, rhs, target } => {
                if cmp.holds(read(state, *lhs).map_err(fault)?, read(state, *rhs).map_err(fault)?) {
                    pc = *target;
                }
            }
            Instruction::Ret { code } => return Ok(*code),
        }
    }
    Ok(ReturnCode::None)
}

fn read(state: &RuntimeState, operand: Operand) -> Result<i64, String> {
    match operand {
        Operand::Imm(value) => Ok(value),
        Operand::Reg(reg) => state
            .registers
            .get(reg.index())
            .copied()
            .ok_or_else(|| format!("register {} out of range", reg.0)),
    }
}

fn write(state: &mut RuntimeState, reg: RegId, value: i64) -> Result<(), String> {
    let slot = state
        .registers
        .get_mut(reg.index())
        .ok_or_else(|| format!("register {} out of range", reg.0))?;
    *slot = value;
    Ok(())
}

fn node_addr(value: i64) -> Result<NodeAddr, String> {
    i32::try_from(value)
        .map(NodeAddr)
        .map_err(|_| format!("{} is not a node address", value))
}

fn named(state: &RuntimeState, qubit: QubitId) -> Result<QubitKey, String> {
    state
        .named
        .get(&qubit)
        .copied()
        .ok_or_else(|| format!("qubit {} is not bound", qubit.0))
}
