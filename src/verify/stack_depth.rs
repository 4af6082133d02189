//! Operand stack depth analysis
//!
//! A worklist pass over the reachable instructions that recomputes the
//! physical stack depth at every pc from the instruction effects alone.
//! Every path into a pc must agree on the depth.

use std::collections::BTreeMap;

use super::insn::{decode, Arg, Insn};
use super::reader::{ClassReader, MethodEntry};
use super::{VerifyError, VerifyResult};
use crate::codegen::descriptor;
use crate::codegen::opcodes::{self, *};
use crate::consts;

#[derive(Debug, Clone, PartialEq)]
pub struct StackAnalysis {
    /// Depth before each reachable instruction
    pub depth_at: BTreeMap<usize, u16>,
    pub max_depth: u16,
}

impl StackAnalysis {
    pub fn depth(&self, pc: usize) -> Option<u16> {
        self.depth_at.get(&pc).copied()
    }
}

fn bad_descriptor(desc: &str) -> VerifyError {
    VerifyError::BadDescriptor(desc.to_string())
}

/// `(pops, pushes)` in slots for one instruction
fn effect(class: &ClassReader, insn: &Insn) -> VerifyResult<(u16, u16)> {
    if let Some((pop, push)) = opcodes::stack_effect(insn.op) {
        return Ok((pop as u16, push as u16));
    }
    let pool_index = match &insn.arg {
        Arg::Pool(i) => *i,
        Arg::Invokeinterface { index, .. } => *index,
        Arg::MultiANewArray { dims, .. } => return Ok((*dims as u16, 1)),
        _ => return Err(VerifyError::BadOpcode { pc: insn.pc, op: insn.op }),
    };
    match insn.op {
        GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD => {
            let member = class.member_ref(pool_index)?;
            let width = descriptor::descriptor_slots(&member.descriptor);
            Ok(match insn.op {
                GETSTATIC => (0, width),
                PUTSTATIC => (width, 0),
                GETFIELD => (1, width),
                _ => (1 + width, 0),
            })
        }
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
            let member = class.member_ref(pool_index)?;
            let args = descriptor::argument_slots(&member.descriptor).ok_or_else(|| bad_descriptor(&member.descriptor))?;
            let ret = descriptor::return_slots(&member.descriptor).ok_or_else(|| bad_descriptor(&member.descriptor))?;
            let receiver = u16::from(insn.op != INVOKESTATIC);
            Ok((args + receiver, ret))
        }
        _ => Err(VerifyError::BadOpcode { pc: insn.pc, op: insn.op }),
    }
}

/// Recompute stack depths for `method` and check them against its
/// `max_stack`
pub fn analyze_stack(class: &ClassReader, method: &MethodEntry) -> VerifyResult<StackAnalysis> {
    let name = format!("{}{}", method.name, method.descriptor);
    let Some(code) = &method.code else {
        return Ok(StackAnalysis { depth_at: BTreeMap::new(), max_depth: 0 });
    };
    let insns = decode(&code.code)?;
    let index_of: BTreeMap<usize, usize> = insns.iter().enumerate().map(|(i, insn)| (insn.pc, i)).collect();
    let mut depth_at = BTreeMap::new();
    let mut max_depth = 0u16;
    let mut worklist = vec![(0usize, 0u16)];
    for handler in &code.exception_table {
        worklist.push((handler.handler_pc as usize, 1));
    }
    let mut steps = 0usize;

    while let Some((pc, depth)) = worklist.pop() {
        steps += 1;
        if steps > consts::VERIFY_MAX_WORKLIST_STEPS {
            return Err(VerifyError::NoConvergence { method: name });
        }
        let Some(&index) = index_of.get(&pc) else {
            return Err(VerifyError::BadJumpTarget { pc, target: pc as i64 });
        };
        match depth_at.get(&pc) {
            Some(&known) if known == depth => continue,
            Some(&known) => {
                return Err(VerifyError::InconsistentDepth { method: name, pc, expected: known, found: depth });
            }
            None => {
                depth_at.insert(pc, depth);
            }
        }

        let insn = &insns[index];
        let (pops, pushes) = effect(class, insn)?;
        if depth < pops {
            return Err(VerifyError::Underflow { method: name, pc });
        }
        let after = depth - pops + pushes;
        max_depth = max_depth.max(depth).max(after);
        if after > code.max_stack {
            return Err(VerifyError::MaxStackExceeded { method: name, pc, depth: after, max: code.max_stack });
        }

        for target in insn.targets() {
            worklist.push((target, after));
        }
        if !opcodes::ends_flow(insn.op) {
            let next = pc + insn.len;
            if next >= code.code.len() {
                return Err(VerifyError::FallsOffEnd { method: name, pc });
            }
            worklist.push((next, after));
        }
    }
    Ok(StackAnalysis { depth_at, max_depth })
}
