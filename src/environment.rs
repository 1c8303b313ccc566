//! The runtime environment: variables and host-registered functions.

use std::collections::HashMap;
use std::rc::Rc;

use crate::value::{NativeFunction, Value};

/// Variable bindings and the native-function registry shared between an
/// engine and every execution of its compiled program.
///
/// Concurrent executions of one program must each clone the environment
/// first, because assignment in scripts mutates it.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    functions: HashMap<String, Rc<NativeFunction>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable. Missing names are the caller's problem; the VM
    /// falls back to the host object and then to null.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    /// Bind or rebind a variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get_function(&self, name: &str) -> Option<Rc<NativeFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn set_function(&mut self, name: impl Into<String>, function: NativeFunction) {
        self.functions.insert(name.into(), Rc::new(function));
    }
}
