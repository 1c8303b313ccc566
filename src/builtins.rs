//! Built-in functions registered in every fresh environment.

use crate::environment::Environment;
use crate::value::{NativeFunction, Value};

/// Register the default built-ins: `len`, `trim` and `print`.
pub fn register(env: &mut Environment) {
    env.set_function(
        "len",
        NativeFunction::new("len", None, |args| {
            let sum: i64 = args
                .iter()
                .map(|arg| arg.inspect().chars().count() as i64)
                .sum();
            Ok(Value::Int(sum))
        }),
    );

    env.set_function(
        "trim",
        NativeFunction::new("trim", None, |args| {
            let joined: String = args.iter().map(|arg| arg.inspect()).collect();
            Ok(Value::String(joined.trim().to_string()))
        }),
    );

    env.set_function(
        "print",
        NativeFunction::new("print", None, |args| {
            for arg in args {
                print!("{}", arg.inspect());
            }
            Ok(Value::Int(0))
        }),
    );
}
