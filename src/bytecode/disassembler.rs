//! Human-readable bytecode dumps.
//!
//! One line per instruction: a six-digit offset, the mnemonic padded to
//! 14 columns, the operand, and a trailing comment for constant loads,
//! field lookups and calls. A `Constants:` section lists the pool.

use std::fmt::Write;

use crate::bytecode::opcode::OpCode;
use crate::bytecode::program::Program;

/// Render the program's bytecode and constant pool.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    writeln!(&mut out, "Bytecode:").unwrap();

    let mut offset = 0;
    while offset < program.instructions.len() {
        offset = disassemble_instruction(program, offset, &mut out);
    }

    if !program.constants.is_empty() {
        write!(&mut out, "\n\nConstants:\n").unwrap();
        for (index, constant) in program.constants.iter().enumerate() {
            writeln!(
                &mut out,
                "  {:06} Type:{} Value:\"{}\"",
                index,
                constant.type_name(),
                escape(&constant.inspect())
            )
            .unwrap();
        }
    }

    out
}

fn disassemble_instruction(program: &Program, offset: usize, out: &mut String) -> usize {
    let byte = program.instructions[offset];
    let Some(op) = OpCode::from_u8(byte) else {
        writeln!(out, "  {:06}\tUnknown opcode {:#04x}", offset, byte).unwrap();
        return offset + 1;
    };

    write!(out, "  {:06}\t{:>14}", offset, op.to_string()).unwrap();

    if op.has_operand() {
        let operand = program.read_u16(offset + 1);
        write!(out, "\t{}", operand).unwrap();

        match op {
            OpCode::Constant => {
                if let Some(constant) = program.constants.get(operand as usize) {
                    write!(out, "\t// load constant: \"{}\"", escape(&constant.inspect()))
                        .unwrap();
                }
            }
            OpCode::Lookup => {
                if let Some(constant) = program.constants.get(operand as usize) {
                    write!(out, "\t// lookup field: {}", constant.inspect()).unwrap();
                }
            }
            OpCode::Call => {
                write!(out, "\t// call function with {} arg(s)", operand).unwrap();
            }
            _ => {}
        }
    }

    out.push('\n');
    offset + 1 + op.operand_width()
}

fn escape(text: &str) -> String {
    text.replace('\n', "\\n")
}
