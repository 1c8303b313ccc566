//! Bytecode compiler: lowers the AST to a flat instruction stream and a
//! deduplicated constant pool in a single recursive walk.
//!
//! Every emit helper returns the starting offset of the new instruction;
//! forward jumps are emitted with a placeholder operand and backpatched
//! once the branch body has been compiled.

use crate::ast::{Block, Expr, ExprKind, InfixOp, PrefixOp, Program as Ast, Stmt, StmtKind};
use crate::bytecode::opcode::OpCode;
use crate::bytecode::program::Program;
use crate::error::CompileError;
use crate::value::Value;

pub type CompileResult<T> = Result<T, CompileError>;

/// Integer literals up to this value are pushed as immediates; anything
/// else goes through the constant pool.
const MAX_IMMEDIATE: i64 = 65534;

/// Placeholder operand for forward jumps; always overwritten by a
/// backpatch before compilation finishes.
const PLACEHOLDER: u16 = 9999;

/// The bytecode compiler.
pub struct Compiler {
    program: Program,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            program: Program::new(),
        }
    }

    /// Compile a parsed program. Consumes the compiler; the result is
    /// immutable from the caller's point of view.
    pub fn compile(mut self, ast: &Ast) -> CompileResult<Program> {
        for stmt in &ast.statements {
            self.compile_statement(stmt)?;
        }
        Ok(self.program)
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => self.compile_expression(expr),

            StmtKind::Assign { name, value } => {
                self.compile_expression(value)?;
                let name_idx = self.program.add_constant(Value::String(name.clone()))?;
                self.emit_with(OpCode::Constant, name_idx);
                self.emit(OpCode::Set);
                Ok(())
            }

            StmtKind::Return(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::Return);
                Ok(())
            }

            StmtKind::While { condition, body } => {
                // Record the loop head so the body can jump back to
                // retest the condition.
                let loop_start = self.current_offset();

                self.compile_expression(condition)?;
                let exit_jump = self.emit_with(OpCode::JumpIfFalse, PLACEHOLDER);

                self.compile_block(body)?;
                self.emit_with(OpCode::Jump, loop_start as u16);

                let after_body = self.current_offset();
                self.patch_operand(exit_jump, after_body as u16);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Bool(true) => {
                self.emit(OpCode::True);
                Ok(())
            }
            ExprKind::Bool(false) => {
                self.emit(OpCode::False);
                Ok(())
            }

            ExprKind::Int(value) => {
                // Small non-negative integers fit the operand itself and
                // skip the pool entirely.
                if (0..=MAX_IMMEDIATE).contains(value) {
                    self.emit_with(OpCode::Push, *value as u16);
                } else {
                    let idx = self.program.add_constant(Value::Int(*value))?;
                    self.emit_with(OpCode::Constant, idx);
                }
                Ok(())
            }

            ExprKind::Float(value) => {
                let idx = self.program.add_constant(Value::Float(*value))?;
                self.emit_with(OpCode::Constant, idx);
                Ok(())
            }

            ExprKind::Str(value) => {
                let idx = self.program.add_constant(Value::String(value.clone()))?;
                self.emit_with(OpCode::Constant, idx);
                Ok(())
            }

            ExprKind::Regexp { pattern, flags } => {
                // Flags are folded into the pattern so the VM can compile
                // the string opaquely.
                let source = if flags.is_empty() {
                    pattern.clone()
                } else {
                    format!("(?{}){}", flags, pattern)
                };
                let idx = self.program.add_constant(Value::String(source))?;
                self.emit_with(OpCode::Constant, idx);
                Ok(())
            }

            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                let count = u16::try_from(elements.len()).map_err(|_| {
                    CompileError::new("array literal has too many elements", expr.span)
                })?;
                self.emit_with(OpCode::Array, count);
                Ok(())
            }

            ExprKind::Identifier(name) => {
                let idx = self.program.add_constant(Value::String(name.clone()))?;
                self.emit_with(OpCode::Lookup, idx);
                Ok(())
            }

            ExprKind::Prefix { op, right } => {
                self.compile_expression(right)?;
                self.emit(match op {
                    PrefixOp::Not => OpCode::Bang,
                    PrefixOp::Negate => OpCode::Minus,
                    PrefixOp::Root => OpCode::Root,
                });
                Ok(())
            }

            ExprKind::Infix { op, left, right } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.emit(match op {
                    InfixOp::Add => OpCode::Add,
                    InfixOp::Subtract => OpCode::Sub,
                    InfixOp::Multiply => OpCode::Mul,
                    InfixOp::Divide => OpCode::Div,
                    InfixOp::Modulo => OpCode::Mod,
                    InfixOp::Power => OpCode::Power,
                    InfixOp::Less => OpCode::Less,
                    InfixOp::LessEqual => OpCode::LessEqual,
                    InfixOp::Greater => OpCode::Greater,
                    InfixOp::GreaterEqual => OpCode::GreaterEqual,
                    InfixOp::Equal => OpCode::Equal,
                    InfixOp::NotEqual => OpCode::NotEqual,
                    InfixOp::Matches => OpCode::Matches,
                    InfixOp::NotMatches => OpCode::NotMatches,
                    InfixOp::In => OpCode::ArrayIn,
                    InfixOp::And => OpCode::And,
                    InfixOp::Or => OpCode::Or,
                });
                Ok(())
            }

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                // Jump over the consequence when the condition is false;
                // the target is unknown until the consequence is done.
                let skip_consequence = self.emit_with(OpCode::JumpIfFalse, PLACEHOLDER);

                self.compile_block(consequence)?;

                match alternative {
                    None => {
                        let after = self.current_offset();
                        self.patch_operand(skip_consequence, after as u16);
                    }
                    Some(alternative) => {
                        // The consequence falls through past the
                        // alternative; the false-branch lands after the
                        // jump we are about to emit.
                        let skip_alternative = self.emit_with(OpCode::Jump, PLACEHOLDER);

                        let alternative_start = self.current_offset();
                        self.patch_operand(skip_consequence, alternative_start as u16);

                        self.compile_block(alternative)?;

                        let after = self.current_offset();
                        self.patch_operand(skip_alternative, after as u16);
                    }
                }
                Ok(())
            }

            ExprKind::Call {
                function,
                arguments,
            } => {
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                let idx = self.program.add_constant(Value::String(function.clone()))?;
                self.emit_with(OpCode::Constant, idx);
                let argc = u16::try_from(arguments.len()).map_err(|_| {
                    CompileError::new("call has too many arguments", expr.span)
                })?;
                self.emit_with(OpCode::Call, argc);
                Ok(())
            }

            ExprKind::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::ArrayIndex);
                Ok(())
            }
        }
    }

    // ===== Emission =====

    fn current_offset(&self) -> usize {
        self.program.instructions.len()
    }

    /// Append a bare instruction; returns its starting offset.
    fn emit(&mut self, op: OpCode) -> usize {
        let offset = self.current_offset();
        self.program.instructions.push(op as u8);
        offset
    }

    /// Append an instruction with a two-byte operand; returns its
    /// starting offset, which is what backpatching keys on.
    fn emit_with(&mut self, op: OpCode, operand: u16) -> usize {
        let offset = self.emit(op);
        let bytes = operand.to_be_bytes();
        self.program.instructions.push(bytes[0]);
        self.program.instructions.push(bytes[1]);
        offset
    }

    /// Rewrite the operand of the instruction starting at `offset`,
    /// preserving its opcode byte.
    fn patch_operand(&mut self, offset: usize, operand: u16) {
        self.program.patch_u16(offset + 1, operand);
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
