//! The embedding API: compile a script once, run it many times.

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins;
use crate::bytecode::{disassemble, optimizer, Compiler, Program, Vm};
use crate::environment::Environment;
use crate::error::SiftError;
use crate::host::HostObject;
use crate::parser::Parser;
use crate::value::{NativeFunction, Value};

/// Flags accepted by [`Engine::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Skip the peephole optimizer when generating bytecode.
    NoOptimize,
}

/// A filter engine holding a script, its environment and, once
/// `prepare` has run, the compiled program.
///
/// ```
/// use siftlang::Engine;
///
/// let mut engine = Engine::new("return Age >= 18;");
/// engine.prepare(&[]).unwrap();
///
/// let adult = serde_json::json!({"Name": "alice", "Age": 32});
/// assert!(engine.run(&adult).unwrap());
/// ```
pub struct Engine {
    script: String,
    environment: Rc<RefCell<Environment>>,
    program: Option<Program>,
}

impl Engine {
    /// Create an engine for `script`. The environment starts with the
    /// built-in functions registered.
    pub fn new(script: impl Into<String>) -> Self {
        let mut environment = Environment::new();
        builtins::register(&mut environment);
        Self {
            script: script.into(),
            environment: Rc::new(RefCell::new(environment)),
            program: None,
        }
    }

    /// Lex, parse, compile and (unless disabled) optimize the script.
    /// Parse errors are reported together; the first compile error
    /// aborts. Nothing is kept from a failed prepare.
    pub fn prepare(&mut self, flags: &[Flag]) -> Result<(), SiftError> {
        self.program = None;

        let mut parser = Parser::new(&self.script);
        let ast = parser.parse_program();
        if !parser.errors().is_empty() {
            return Err(SiftError::from_parse_errors(parser.errors()));
        }

        let mut program = Compiler::new().compile(&ast)?;

        if !flags.contains(&Flag::NoOptimize) {
            optimizer::optimize(&mut program);
        }

        self.program = Some(program);
        Ok(())
    }

    /// Expose a host function to scripts.
    pub fn add_function(
        &mut self,
        name: &str,
        function: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        self.environment
            .borrow_mut()
            .set_function(name, NativeFunction::new(name, None, function));
    }

    /// Bind or rebind a variable visible to scripts.
    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.environment.borrow_mut().set(name, value);
    }

    /// Read a variable, typically one a script assigned. Missing
    /// variables read as null.
    pub fn get_variable(&self, name: &str) -> Value {
        self.environment.borrow().get(name).unwrap_or(Value::Null)
    }

    /// Run the compiled program against `host` and return the script's
    /// terminal value.
    pub fn execute(&self, host: &dyn HostObject) -> Result<Value, SiftError> {
        let program = self.program.as_ref().ok_or(SiftError::NotPrepared)?;
        let mut vm = Vm::new(self.environment.clone());
        Ok(vm.run(program, host)?)
    }

    /// Run the compiled program against `host` and reduce the result to
    /// its truthiness, which is what makes this a filter.
    pub fn run(&self, host: &dyn HostObject) -> Result<bool, SiftError> {
        Ok(self.execute(host)?.is_truthy())
    }

    /// Print a human-readable disassembly of the compiled program.
    pub fn dump(&self) -> Result<(), SiftError> {
        print!("{}", self.disassemble()?);
        Ok(())
    }

    /// The disassembly `dump` prints.
    pub fn disassemble(&self) -> Result<String, SiftError> {
        let program = self.program.as_ref().ok_or(SiftError::NotPrepared)?;
        Ok(disassemble(program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn prepared(source: &str) -> Engine {
        let mut engine = Engine::new(source);
        engine.prepare(&[]).expect("prepare failed");
        engine
    }

    #[test]
    fn test_arithmetic_result() {
        let engine = prepared("return 1 + 2 * 3;");
        let got = engine.execute(&()).unwrap();
        assert!(got.equals(&Value::Int(7)));
    }

    #[test]
    fn test_conditional_result() {
        let engine = prepared(r#"if (1 < 2) { return "yes"; } return "no";"#);
        let got = engine.execute(&()).unwrap();
        assert!(got.equals(&Value::String("yes".into())));
    }

    #[test]
    fn test_loop_result() {
        let engine = prepared("a = 0; while (a < 3) { a = a + 1; } return a;");
        let got = engine.execute(&()).unwrap();
        assert!(got.equals(&Value::Int(3)));
    }

    #[test]
    fn test_regexp_result() {
        let engine = prepared(r#"return "hello" ~= "^he";"#);
        let got = engine.execute(&()).unwrap();
        assert!(got.equals(&Value::Bool(true)));
    }

    #[test]
    fn test_membership_results() {
        assert!(prepared("return 2 in [1,2,3];").run(&()).unwrap());
        assert!(!prepared("return 5 in [1,2,3];").run(&()).unwrap());
    }

    #[test]
    fn test_host_object_field() {
        let engine = prepared(r#"return Name == "alice";"#);
        let host = json!({"Name": "alice"});
        let got = engine.execute(&host).unwrap();
        assert!(got.equals(&Value::Bool(true)));
        assert!(engine.run(&host).unwrap());
    }

    #[test]
    fn test_one_program_many_objects() {
        let engine = prepared("return Age >= 18;");
        assert!(engine.run(&json!({"Age": 32})).unwrap());
        assert!(!engine.run(&json!({"Age": 7})).unwrap());
    }

    #[test]
    fn test_map_host_object() {
        let engine = prepared("return Count + 1;");
        let mut host = HashMap::new();
        host.insert("Count".to_string(), Value::Int(9));
        let got = engine.execute(&host).unwrap();
        assert!(got.equals(&Value::Int(10)));
    }

    #[test]
    fn test_truthiness_of_run() {
        assert!(prepared("return 1;").run(&()).unwrap());
        assert!(!prepared("return 0;").run(&()).unwrap());
        assert!(!prepared("return \"\";").run(&()).unwrap());
        // No return at all yields null, which is falsy.
        assert!(!prepared("1 + 1;").run(&()).unwrap());
    }

    #[test]
    fn test_set_and_get_variable() {
        let mut engine = Engine::new("total = base * 2; return total;");
        engine.prepare(&[]).unwrap();
        engine.set_variable("base", Value::Int(21));
        let got = engine.execute(&()).unwrap();
        assert!(got.equals(&Value::Int(42)));
        assert!(engine.get_variable("total").equals(&Value::Int(42)));
        assert!(engine.get_variable("missing").equals(&Value::Null));
    }

    #[test]
    fn test_add_function() {
        let mut engine = Engine::new("return double(21);");
        engine.prepare(&[]).unwrap();
        engine.add_function("double", |args| match args {
            [Value::Int(n)] => Ok(Value::Int(n * 2)),
            _ => Err("double expects one integer".to_string()),
        });
        let got = engine.execute(&()).unwrap();
        assert!(got.equals(&Value::Int(42)));
    }

    #[test]
    fn test_parse_errors_abort_prepare() {
        let mut engine = Engine::new("a = ; b = @;");
        let err = engine.prepare(&[]).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Errors parsing script:"), "{}", message);
        assert!(message.contains('\n'));
        // Nothing runnable was produced.
        assert!(matches!(engine.execute(&()), Err(SiftError::NotPrepared)));
    }

    #[test]
    fn test_execute_before_prepare() {
        let engine = Engine::new("return 1;");
        assert!(matches!(engine.execute(&()), Err(SiftError::NotPrepared)));
    }

    #[test]
    fn test_runtime_error_surfaces() {
        let engine = prepared("return 1 / 0;");
        assert!(matches!(engine.execute(&()), Err(SiftError::Runtime(_))));
    }

    #[test]
    fn test_no_optimize_flag() {
        let mut plain = Engine::new("return 1 + 2 * 3;");
        plain.prepare(&[Flag::NoOptimize]).unwrap();
        let mut optimized = Engine::new("return 1 + 2 * 3;");
        optimized.prepare(&[]).unwrap();

        // Same answer, shorter bytecode.
        assert!(plain.execute(&()).unwrap().equals(&Value::Int(7)));
        assert!(optimized.execute(&()).unwrap().equals(&Value::Int(7)));
        assert!(optimized.disassemble().unwrap().len() < plain.disassemble().unwrap().len());
    }

    #[test]
    fn test_optimizer_preserves_semantics() {
        let corpus = [
            "return 1 + 2 * 3;",
            "a = 0; while (a < 3) { a = a + 1; } return a;",
            "if (2 + 2 == 4) { return \"math works\"; } return \"broken\";",
            "return 2 in [1, 2, 3];",
            "return -5 + 10;",
            "return 3.5 * 2 - 1;",
            "if (x) { return 1; } return 2;",
            "return \"a\" + 1 + 2;",
            "return 1; return 2;",
        ];
        for source in corpus {
            let mut plain = Engine::new(source);
            plain.prepare(&[Flag::NoOptimize]).unwrap();
            let mut optimized = Engine::new(source);
            optimized.prepare(&[]).unwrap();

            let a = plain.execute(&()).unwrap();
            let b = optimized.execute(&()).unwrap();
            assert!(
                a.equals(&b) && a.type_name() == b.type_name(),
                "{:?}: {:?} != {:?}",
                source,
                a,
                b
            );
        }
    }

    #[test]
    fn test_dump_output() {
        let engine = prepared(r#"return trim(Name);"#);
        let output = engine.disassemble().unwrap();
        assert!(output.starts_with("Bytecode:"));
        assert!(output.contains("OpCall"));
        assert!(output.contains("Constants:"));
    }
}
