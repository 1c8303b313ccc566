//! The stack virtual machine that executes compiled programs.
//!
//! One operand stack; binary operations pop right then left. The
//! environment is shared with the engine, so assignments made by one run
//! are visible to the next. Regexp patterns compile through a size- and
//! nesting-capped builder and are cached per VM by pattern string.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use regex::{Regex, RegexBuilder};

use crate::bytecode::opcode::OpCode;
use crate::bytecode::program::Program;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::host::HostObject;
use crate::value::Value;

/// Maximum regex nesting depth, guarding against pathological patterns.
const REGEX_NEST_LIMIT: u32 = 10;

/// Maximum size of a compiled regex in bytes.
const REGEX_SIZE_LIMIT: usize = 100_000;

pub type RunResult<T> = Result<T, RuntimeError>;

/// A single-threaded stack machine. Create one per execution; the
/// compiled program itself is never mutated.
pub struct Vm {
    environment: Rc<RefCell<Environment>>,
    stack: Vec<Value>,
    regex_cache: HashMap<String, Regex>,
}

impl Vm {
    pub fn new(environment: Rc<RefCell<Environment>>) -> Self {
        Self {
            environment,
            stack: Vec::new(),
            regex_cache: HashMap::new(),
        }
    }

    /// Execute `program` against `host`, returning the script's terminal
    /// value. A stream that ends without `OpReturn` yields null.
    pub fn run(&mut self, program: &Program, host: &dyn HostObject) -> RunResult<Value> {
        let code = &program.instructions;
        let mut ip = 0;

        while ip < code.len() {
            let byte = code[ip];
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UnknownOpcode(byte, ip))?;

            let operand = if op.has_operand() {
                if ip + 2 >= code.len() {
                    return Err(RuntimeError::new("truncated instruction stream"));
                }
                u16::from_be_bytes([code[ip + 1], code[ip + 2]])
            } else {
                0
            };
            ip += 1 + op.operand_width();

            match op {
                OpCode::Constant => {
                    let value = self.constant(program, operand)?;
                    self.stack.push(value);
                }

                OpCode::Push => self.stack.push(Value::Int(operand as i64)),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),

                OpCode::Lookup => {
                    let name = self.constant_name(program, operand)?;
                    let bound = self.environment.borrow().get(&name);
                    let value = bound
                        .or_else(|| host.field(&name))
                        .unwrap_or(Value::Null);
                    self.stack.push(value);
                }

                OpCode::Set => {
                    let name = match self.pop()? {
                        Value::String(name) => name,
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "assignment target must be a string, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    let value = self.pop()?;
                    self.environment.borrow_mut().set(name, value);
                }

                OpCode::Array => {
                    let count = operand as usize;
                    let mut elements = Vec::with_capacity(count);
                    for _ in 0..count {
                        elements.push(self.pop()?);
                    }
                    elements.reverse();
                    self.stack.push(Value::Array(elements));
                }

                OpCode::ArrayIndex => {
                    let index = self.pop()?;
                    let collection = self.pop()?;
                    self.stack.push(index_value(&collection, &index)?);
                }

                OpCode::ArrayIn => {
                    let collection = self.pop()?;
                    let needle = self.pop()?;
                    self.stack.push(Value::Bool(contains(&collection, &needle)?));
                }

                OpCode::Add => self.binary(Value::add)?,
                OpCode::Sub => self.binary(Value::sub)?,
                OpCode::Mul => self.binary(Value::mul)?,
                OpCode::Div => self.binary(Value::div)?,
                OpCode::Mod => self.binary(Value::rem)?,
                OpCode::Power => self.binary(Value::pow)?,

                OpCode::Less => self.comparison(|ord| ord.is_lt())?,
                OpCode::LessEqual => self.comparison(|ord| ord.is_le())?,
                OpCode::Greater => self.comparison(|ord| ord.is_gt())?,
                OpCode::GreaterEqual => self.comparison(|ord| ord.is_ge())?,

                OpCode::Equal => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.stack.push(Value::Bool(left.equals(&right)));
                }
                OpCode::NotEqual => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.stack.push(Value::Bool(!left.equals(&right)));
                }

                OpCode::Matches => {
                    let matched = self.match_regexp()?;
                    self.stack.push(Value::Bool(matched));
                }
                OpCode::NotMatches => {
                    let matched = self.match_regexp()?;
                    self.stack.push(Value::Bool(!matched));
                }

                OpCode::And => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.stack
                        .push(Value::Bool(left.is_truthy() && right.is_truthy()));
                }
                OpCode::Or => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.stack
                        .push(Value::Bool(left.is_truthy() || right.is_truthy()));
                }

                OpCode::Bang => {
                    let value = self.pop()?;
                    self.stack.push(Value::Bool(!value.is_truthy()));
                }
                OpCode::Minus => {
                    let value = self.pop()?;
                    self.stack.push(value.negate()?);
                }
                OpCode::Root => {
                    let value = self.pop()?;
                    self.stack.push(value.sqrt()?);
                }

                OpCode::Jump => {
                    ip = self.jump_target(program, operand)?;
                }
                OpCode::JumpIfFalse => {
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        ip = self.jump_target(program, operand)?;
                    }
                }

                OpCode::Call => {
                    let name = match self.pop()? {
                        Value::String(name) => name,
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "callee must be a string, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    let argc = operand as usize;
                    let mut args = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        args.push(self.pop()?);
                    }
                    args.reverse();

                    let function = self.environment.borrow().get_function(&name);
                    let function =
                        function.ok_or_else(|| RuntimeError::UnknownFunction(name.clone()))?;
                    let result = function.call(&args)?;
                    self.stack.push(result);
                }

                OpCode::Return => {
                    return self.pop();
                }

                OpCode::SingleArg => {
                    return Err(RuntimeError::UnknownOpcode(byte, ip - 1));
                }
            }
        }

        Ok(Value::Null)
    }

    fn pop(&mut self) -> RunResult<Value> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn binary(
        &mut self,
        op: impl Fn(&Value, &Value) -> RunResult<Value>,
    ) -> RunResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = op(&left, &right)?;
        self.stack.push(result);
        Ok(())
    }

    fn comparison(&mut self, accept: impl Fn(std::cmp::Ordering) -> bool) -> RunResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let ordering = left.compare(&right)?;
        self.stack.push(Value::Bool(accept(ordering)));
        Ok(())
    }

    /// Pop pattern then subject and test the match. The right operand is
    /// a pattern string (or a precompiled regexp); the left operand is
    /// matched through its inspection string.
    fn match_regexp(&mut self) -> RunResult<bool> {
        let pattern = self.pop()?;
        let subject = self.pop()?;

        let matched = match &pattern {
            Value::Regexp(re) => re.is_match(&subject.inspect()),
            Value::String(source) => {
                let re = self.compile_pattern(source)?;
                re.is_match(&subject.inspect())
            }
            other => {
                return Err(RuntimeError::type_mismatch(format!(
                    "match pattern must be a string or regexp, not {}",
                    other.type_name()
                )))
            }
        };
        Ok(matched)
    }

    fn compile_pattern(&mut self, source: &str) -> RunResult<Regex> {
        if let Some(re) = self.regex_cache.get(source) {
            return Ok(re.clone());
        }
        let re = RegexBuilder::new(source)
            .nest_limit(REGEX_NEST_LIMIT)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|err| RuntimeError::InvalidRegexp {
                pattern: source.to_string(),
                message: err.to_string(),
            })?;
        self.regex_cache.insert(source.to_string(), re.clone());
        Ok(re)
    }

    fn constant(&self, program: &Program, index: u16) -> RunResult<Value> {
        program
            .constants
            .get(index as usize)
            .cloned()
            .ok_or_else(|| RuntimeError::new(format!("constant index {} out of range", index)))
    }

    fn constant_name(&self, program: &Program, index: u16) -> RunResult<String> {
        match self.constant(program, index)? {
            Value::String(name) => Ok(name),
            other => Err(RuntimeError::type_mismatch(format!(
                "lookup name must be a string constant, not {}",
                other.type_name()
            ))),
        }
    }

    fn jump_target(&self, program: &Program, operand: u16) -> RunResult<usize> {
        let target = operand as usize;
        if target > program.instructions.len() {
            return Err(RuntimeError::new(format!("jump target {} out of range", target)));
        }
        Ok(target)
    }
}

/// `collection[index]` semantics: arrays and strings index by integer,
/// out-of-range and negative indices yield null.
fn index_value(collection: &Value, index: &Value) -> RunResult<Value> {
    let i = match index {
        Value::Int(i) => *i,
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "index must be an integer, not {}",
                other.type_name()
            )))
        }
    };

    match collection {
        Value::Array(elements) => {
            if i < 0 {
                return Ok(Value::Null);
            }
            Ok(elements.get(i as usize).cloned().unwrap_or(Value::Null))
        }
        Value::String(s) => {
            if i < 0 {
                return Ok(Value::Null);
            }
            Ok(s.chars()
                .nth(i as usize)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null))
        }
        other => Err(RuntimeError::type_mismatch(format!(
            "cannot index {}",
            other.type_name()
        ))),
    }
}

/// `needle in collection`: array membership by value equality, substring
/// containment for strings.
fn contains(collection: &Value, needle: &Value) -> RunResult<bool> {
    match collection {
        Value::Array(elements) => Ok(elements.iter().any(|e| e.equals(needle))),
        Value::String(s) => Ok(s.contains(&needle.inspect())),
        other => Err(RuntimeError::type_mismatch(format!(
            "right side of 'in' must be an array or string, not {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;
    use crate::bytecode::compiler::Compiler;
    use crate::parser::Parser;

    fn run_source(source: &str) -> RunResult<Value> {
        run_with_host(source, &())
    }

    fn run_with_host(source: &str, host: &dyn HostObject) -> RunResult<Value> {
        let mut parser = Parser::new(source);
        let ast = parser.parse_program();
        assert!(parser.errors().is_empty(), "parse errors: {:?}", parser.errors());
        let program = Compiler::new().compile(&ast).expect("compile error");

        let mut env = Environment::new();
        builtins::register(&mut env);
        let mut vm = Vm::new(Rc::new(RefCell::new(env)));
        vm.run(&program, host)
    }

    fn assert_value(source: &str, expected: Value) {
        let got = run_source(source).expect("runtime error");
        assert!(
            got.equals(&expected),
            "{:?}: expected {:?}, got {:?}",
            source,
            expected,
            got
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_value("return 1 + 2 * 3;", Value::Int(7));
        assert_value("return 10 % 3;", Value::Int(1));
        assert_value("return 7 / 2;", Value::Int(3));
        assert_value("return 2 ** 8;", Value::Int(256));
        assert_value("return 1.5 + 1;", Value::Float(2.5));
        assert_value("return -4 + 1;", Value::Int(-3));
        assert_value("return √16;", Value::Float(4.0));
    }

    #[test]
    fn test_string_concat() {
        assert_value(r#"return "foo" + "bar";"#, Value::String("foobar".into()));
        assert_value(r#"return "n=" + 3;"#, Value::String("n=3".into()));
    }

    #[test]
    fn test_comparisons() {
        assert_value("return 1 < 2;", Value::Bool(true));
        assert_value("return 2 <= 2;", Value::Bool(true));
        assert_value("return 3 > 4;", Value::Bool(false));
        assert_value("return 2.5 >= 2;", Value::Bool(true));
        assert_value(r#"return "abc" < "abd";"#, Value::Bool(true));
        assert_value("return 3 == 3.0;", Value::Bool(true));
        assert_value(r#"return 3 == "3";"#, Value::Bool(false));
        assert_value("return 3 != 4;", Value::Bool(true));
    }

    #[test]
    fn test_ordering_type_mismatch_is_an_error() {
        assert!(matches!(
            run_source(r#"return 1 < "a";"#),
            Err(RuntimeError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_logic() {
        assert_value("return true && 1;", Value::Bool(true));
        assert_value("return true && 0;", Value::Bool(false));
        assert_value("return false || \"x\";", Value::Bool(true));
        assert_value("return false || \"\";", Value::Bool(false));
        assert_value("return !0;", Value::Bool(true));
        assert_value("return !\"text\";", Value::Bool(false));
    }

    #[test]
    fn test_regexp_matching() {
        assert_value(r#"return "hello" ~= "^he";"#, Value::Bool(true));
        assert_value(r#"return "hello" !~ "^he";"#, Value::Bool(false));
        assert_value(r#"return "HELLO" ~= /^he/i;"#, Value::Bool(true));
        assert_value(r#"return "HELLO" ~= /^he/;"#, Value::Bool(false));
        // Non-string subjects match through their inspection string.
        assert_value(r#"return 123 ~= "^12";"#, Value::Bool(true));
    }

    #[test]
    fn test_invalid_regexp_is_an_error() {
        assert!(matches!(
            run_source(r#"return "x" ~= "(";"#),
            Err(RuntimeError::InvalidRegexp { .. })
        ));
    }

    #[test]
    fn test_array_membership() {
        assert_value("return 2 in [1, 2, 3];", Value::Bool(true));
        assert_value("return 5 in [1, 2, 3];", Value::Bool(false));
        assert_value(r#"return "b" in ["a", "b"];"#, Value::Bool(true));
        assert_value(r#"return "ell" in "hello";"#, Value::Bool(true));
        assert!(run_source("return 1 in 2;").is_err());
    }

    #[test]
    fn test_indexing() {
        assert_value("return [10, 20, 30][1];", Value::Int(20));
        assert_value("return [10][5];", Value::Null);
        assert_value("return [10][-1];", Value::Null);
        assert_value(r#"return "abc"[0];"#, Value::String("a".into()));
        assert!(run_source("return 3[0];").is_err());
    }

    #[test]
    fn test_variables_and_while() {
        assert_value(
            "a = 0; while (a < 3) { a = a + 1; } return a;",
            Value::Int(3),
        );
    }

    #[test]
    fn test_if_else() {
        assert_value(
            r#"if (1 < 2) { return "yes"; } return "no";"#,
            Value::String("yes".into()),
        );
        assert_value(
            r#"if (1 > 2) { return "yes"; } else { return "no"; }"#,
            Value::String("no".into()),
        );
    }

    #[test]
    fn test_host_field_lookup() {
        let host = serde_json::json!({"Name": "alice", "Age": 32});
        let got = run_with_host("return Name;", &host).unwrap();
        assert!(got.equals(&Value::String("alice".into())));

        // Case-insensitive fallback.
        let got = run_with_host("return age + 1;", &host).unwrap();
        assert!(got.equals(&Value::Int(33)));

        // Environment bindings shadow host fields; unknown names are null.
        let got = run_with_host("Name = \"bob\"; return Name;", &host).unwrap();
        assert!(got.equals(&Value::String("bob".into())));
        let got = run_with_host("return Missing;", &host).unwrap();
        assert!(got.equals(&Value::Null));
    }

    #[test]
    fn test_builtin_calls() {
        assert_value(r#"return len("hello");"#, Value::Int(5));
        assert_value(r#"return trim("  x  ");"#, Value::String("x".into()));
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        assert!(matches!(
            run_source("return nosuch(1);"),
            Err(RuntimeError::UnknownFunction(name)) if name == "nosuch"
        ));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            run_source("return 1 / 0;"),
            Err(RuntimeError::DivisionByZero)
        ));
    }

    #[test]
    fn test_missing_return_yields_null() {
        assert_value("1 + 1;", Value::Null);
        assert_value("", Value::Null);
    }

    #[test]
    fn test_stack_underflow_surfaces() {
        let mut program = Program::new();
        program.instructions = vec![OpCode::Add as u8];
        let mut vm = Vm::new(Rc::new(RefCell::new(Environment::new())));
        assert!(matches!(
            vm.run(&program, &()),
            Err(RuntimeError::StackUnderflow)
        ));
    }

    #[test]
    fn test_environment_persists_across_runs() {
        let mut parser = Parser::new("counter = counter + 1; return counter;");
        let ast = parser.parse_program();
        let program = Compiler::new().compile(&ast).unwrap();

        let mut env = Environment::new();
        env.set("counter", Value::Int(0));
        let env = Rc::new(RefCell::new(env));

        for expected in 1..=3 {
            let mut vm = Vm::new(env.clone());
            let got = vm.run(&program, &()).unwrap();
            assert!(got.equals(&Value::Int(expected)));
        }
    }
}
