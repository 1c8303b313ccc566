//! Multi-pass peephole optimizer.
//!
//! Each pass decodes the stream into instruction records, applies local
//! rewrites (constant folding, jump threading, dead-code removal) and
//! re-encodes, retargeting every jump through an old→new offset map.
//! Passes repeat until one changes nothing. Whenever a rewrite cannot be
//! proven safe (a jump landing inside a folded region, a jump cycle, a
//! fold that would hide a runtime error) the rewrite declines and the
//! optimizer converges; a no-op result is always acceptable.

use std::collections::{HashMap, HashSet};

use crate::bytecode::opcode::OpCode;
use crate::bytecode::program::{Instruction, Program};
use crate::value::Value;

/// Optimize in place until a full pass makes no change.
pub fn optimize(program: &mut Program) {
    while pass(program) {}
}

/// Run one pass; true when the stream was rewritten.
fn pass(program: &mut Program) -> bool {
    let Some(mut instructions) = program.decode() else {
        return false;
    };
    let old_len = program.instructions.len();

    let mut changed = fold_constants(program, &mut instructions);
    changed |= thread_jumps(&mut instructions);
    changed |= strip_dead_code(&mut instructions);

    if !changed {
        return false;
    }

    match encode(&instructions, old_len) {
        Some(bytes) if bytes != program.instructions => {
            program.instructions = bytes;
            true
        }
        _ => false,
    }
}

/// The byte offsets jumps in `instructions` land on.
fn jump_targets(instructions: &[Instruction]) -> HashSet<usize> {
    instructions
        .iter()
        .filter(|inst| matches!(inst.op, OpCode::Jump | OpCode::JumpIfFalse))
        .filter_map(|inst| inst.operand)
        .map(|target| target as usize)
        .collect()
}

/// The constant a single instruction pushes, when it pushes exactly one.
fn constant_operand(program: &Program, inst: &Instruction) -> Option<Value> {
    match inst.op {
        OpCode::Push => Some(Value::Int(inst.operand? as i64)),
        OpCode::Constant => program.constants.get(inst.operand? as usize).cloned(),
        _ => None,
    }
}

/// Fold `<const> <const> <arith-op>` into a single constant push. Only
/// numeric operands fold, and folds that would fail at runtime (division
/// by zero) decline so the error still surfaces there.
fn fold_constants(program: &mut Program, instructions: &mut Vec<Instruction>) -> bool {
    let targets = jump_targets(instructions);
    let mut changed = false;
    let mut i = 0;

    while i + 2 < instructions.len() {
        let result = foldable(program, &instructions[i..i + 3], &targets);
        let Some(value) = result else {
            i += 1;
            continue;
        };

        let folded = match value {
            Value::Int(n) if (0..=65534).contains(&n) => Instruction {
                offset: instructions[i].offset,
                op: OpCode::Push,
                operand: Some(n as u16),
            },
            other => {
                let Ok(idx) = program.add_constant(other) else {
                    i += 1;
                    continue;
                };
                Instruction {
                    offset: instructions[i].offset,
                    op: OpCode::Constant,
                    operand: Some(idx),
                }
            }
        };

        instructions.splice(i..i + 3, [folded]);
        changed = true;
        // A shorter chain may now fold one step earlier.
        i = i.saturating_sub(2);
    }

    changed
}

/// Evaluate a three-instruction window, when it is a safe fold.
fn foldable(program: &Program, window: &[Instruction], targets: &HashSet<usize>) -> Option<Value> {
    let left = constant_operand(program, &window[0])?;
    let right = constant_operand(program, &window[1])?;
    if !matches!(left, Value::Int(_) | Value::Float(_))
        || !matches!(right, Value::Int(_) | Value::Float(_))
    {
        return None;
    }
    // The two trailing offsets disappear; a jump landing on either would
    // be stranded.
    if targets.contains(&window[1].offset) || targets.contains(&window[2].offset) {
        return None;
    }

    match window[2].op {
        OpCode::Add => left.add(&right).ok(),
        OpCode::Sub => left.sub(&right).ok(),
        OpCode::Mul => left.mul(&right).ok(),
        OpCode::Div => left.div(&right).ok(),
        OpCode::Mod => left.rem(&right).ok(),
        OpCode::Power => left.pow(&right).ok(),
        _ => None,
    }
}

/// Retarget jumps whose destination holds an unconditional `OpJump`,
/// following chains to their final destination. Cycles decline.
fn thread_jumps(instructions: &mut [Instruction]) -> bool {
    let by_offset: HashMap<usize, (OpCode, Option<u16>)> = instructions
        .iter()
        .map(|inst| (inst.offset, (inst.op, inst.operand)))
        .collect();
    let mut changed = false;

    for inst in instructions.iter_mut() {
        if !matches!(inst.op, OpCode::Jump | OpCode::JumpIfFalse) {
            continue;
        }
        let Some(start) = inst.operand else { continue };

        let mut target = start as usize;
        let mut visited = HashSet::new();
        while let Some(&(OpCode::Jump, Some(next))) = by_offset.get(&target) {
            if !visited.insert(target) {
                // Jump cycle; leave the original target alone.
                target = start as usize;
                break;
            }
            target = next as usize;
        }

        if target != start as usize {
            inst.operand = Some(target as u16);
            changed = true;
        }
    }

    changed
}

/// Drop instructions strictly after an `OpReturn` that no jump lands on.
fn strip_dead_code(instructions: &mut Vec<Instruction>) -> bool {
    let targets = jump_targets(instructions);
    let mut kept = Vec::with_capacity(instructions.len());
    let mut changed = false;
    let mut i = 0;

    while i < instructions.len() {
        let inst = instructions[i];
        kept.push(inst);
        i += 1;
        if inst.op == OpCode::Return {
            while i < instructions.len() && !targets.contains(&instructions[i].offset) {
                i += 1;
                changed = true;
            }
        }
    }

    if changed {
        *instructions = kept;
    }
    changed
}

/// Re-serialize, mapping every jump operand from old offsets to new.
/// `None` when a jump would land off an instruction start, in which case
/// the caller discards the whole pass.
fn encode(instructions: &[Instruction], old_len: usize) -> Option<Vec<u8>> {
    let mut offset_map = HashMap::new();
    let mut new_offset = 0;
    for inst in instructions {
        offset_map.insert(inst.offset, new_offset);
        new_offset += 1 + inst.op.operand_width();
    }
    // Jumping to the end of the stream is a valid way to halt.
    offset_map.insert(old_len, new_offset);

    let mut bytes = Vec::with_capacity(new_offset);
    for inst in instructions {
        bytes.push(inst.op as u8);
        if let Some(operand) = inst.operand {
            let operand = if matches!(inst.op, OpCode::Jump | OpCode::JumpIfFalse) {
                let mapped = offset_map.get(&(operand as usize))?;
                u16::try_from(*mapped).ok()?
            } else {
                operand
            };
            bytes.extend_from_slice(&operand.to_be_bytes());
        }
    }

    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::parser::Parser;

    fn compile_source(source: &str) -> Program {
        let mut parser = Parser::new(source);
        let ast = parser.parse_program();
        assert!(parser.errors().is_empty(), "parse errors: {:?}", parser.errors());
        Compiler::new().compile(&ast).expect("compile error")
    }

    fn ops(program: &Program) -> Vec<OpCode> {
        program.decode().unwrap().into_iter().map(|i| i.op).collect()
    }

    #[test]
    fn test_folds_arithmetic_chain() {
        let mut program = compile_source("return 1 + 2 * 3;");
        optimize(&mut program);
        let decoded = program.decode().unwrap();
        assert_eq!(
            decoded.iter().map(|i| i.op).collect::<Vec<_>>(),
            vec![OpCode::Push, OpCode::Return]
        );
        assert_eq!(decoded[0].operand, Some(7));
    }

    #[test]
    fn test_fold_large_result_goes_to_pool() {
        let mut program = compile_source("return 60000 + 60000;");
        optimize(&mut program);
        let decoded = program.decode().unwrap();
        assert_eq!(decoded[0].op, OpCode::Constant);
        let idx = decoded[0].operand.unwrap() as usize;
        assert!(program.constants[idx].equals(&Value::Int(120000)));
    }

    #[test]
    fn test_fold_mixed_numeric_types() {
        let mut program = compile_source("return 2 * 1.5;");
        optimize(&mut program);
        let decoded = program.decode().unwrap();
        assert_eq!(decoded[0].op, OpCode::Constant);
        let idx = decoded[0].operand.unwrap() as usize;
        assert!(program.constants[idx].equals(&Value::Float(3.0)));
    }

    #[test]
    fn test_division_by_zero_never_folds() {
        let mut program = compile_source("return 1 / 0;");
        let before = program.instructions.clone();
        optimize(&mut program);
        assert_eq!(program.instructions, before);
    }

    #[test]
    fn test_string_concat_never_folds() {
        let mut program = compile_source(r#"return "a" + "b";"#);
        let before = program.instructions.clone();
        optimize(&mut program);
        assert_eq!(program.instructions, before);
    }

    #[test]
    fn test_dead_code_after_return_removed() {
        let mut program = compile_source("return 1; return 2; return 3;");
        optimize(&mut program);
        assert_eq!(ops(&program), vec![OpCode::Push, OpCode::Return]);
    }

    #[test]
    fn test_jump_target_survives_dead_code_pass() {
        // The trailing `return 2` is reachable via the false branch, so
        // it must not be stripped.
        let mut program = compile_source("if (x) { return 1; } return 2;");
        optimize(&mut program);
        let decoded = program.decode().unwrap();
        let returns = decoded.iter().filter(|i| i.op == OpCode::Return).count();
        assert_eq!(returns, 2);
    }

    #[test]
    fn test_jump_threading() {
        // Hand-built: JumpIfFalse -> 6, where 6 holds Jump -> 10.
        let mut program = Program::new();
        program.instructions = vec![
            OpCode::True as u8,
            OpCode::JumpIfFalse as u8,
            0,
            6,
            OpCode::True as u8,
            OpCode::Return as u8,
            OpCode::Jump as u8,
            0,
            10,
            OpCode::Return as u8,
            OpCode::False as u8,
            OpCode::Return as u8,
        ];
        optimize(&mut program);
        let decoded = program.decode().unwrap();
        let branch = decoded
            .iter()
            .find(|i| i.op == OpCode::JumpIfFalse)
            .unwrap();
        // The branch now lands directly on the False instruction the
        // chain ended at, wherever later passes moved it.
        let target = branch.operand.unwrap() as usize;
        let landed = decoded.iter().find(|i| i.offset == target).unwrap();
        assert_eq!(landed.op, OpCode::False);
    }

    #[test]
    fn test_jumps_retargeted_after_fold() {
        // The loop condition sits after an assignment whose value folds,
        // so the back-edge and exit targets both shift.
        let mut program = compile_source("a = 2 + 3; while (a > 0) { a = a - 1; } return a;");
        let unoptimized = program.clone();
        optimize(&mut program);
        assert!(program.instructions.len() < unoptimized.instructions.len());

        // Integrity: every jump still lands on an instruction start.
        let decoded = program.decode().expect("optimized stream decodes");
        let starts: HashSet<usize> = decoded.iter().map(|i| i.offset).collect();
        for inst in &decoded {
            if matches!(inst.op, OpCode::Jump | OpCode::JumpIfFalse) {
                let target = inst.operand.unwrap() as usize;
                assert!(starts.contains(&target) || target == program.instructions.len());
            }
        }
    }

    #[test]
    fn test_fixed_point() {
        let sources = [
            "return 1 + 2 * 3;",
            "a = 0; while (a < 3) { a = a + 1; } return a;",
            "if (1 < 2) { return \"yes\"; } return \"no\";",
            "return 1; return 2;",
        ];
        for source in sources {
            let mut program = compile_source(source);
            optimize(&mut program);
            let once = program.instructions.clone();
            optimize(&mut program);
            assert_eq!(program.instructions, once, "not a fixed point: {:?}", source);
        }
    }

    #[test]
    fn test_declines_on_unsafe_rewrite_are_noops() {
        // Nothing to optimize at all.
        let mut program = compile_source("return x;");
        let before = program.instructions.clone();
        optimize(&mut program);
        assert_eq!(program.instructions, before);
    }
}
