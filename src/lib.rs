//! Sift: an embeddable filter language.
//!
//! A host program supplies a script; the engine compiles it once to
//! bytecode and then runs it repeatedly against host-supplied data,
//! returning either the script's terminal value or its truthiness.
//! Typical uses are admission rules, routing predicates and policy
//! filters.
//!
//! # Example
//!
//! ```
//! use siftlang::Engine;
//!
//! let mut engine = Engine::new(r#"return Name ~= /^ali/ && Age >= 18;"#);
//! engine.prepare(&[]).unwrap();
//!
//! let person = serde_json::json!({"Name": "alice", "Age": 32});
//! assert!(engine.run(&person).unwrap());
//! ```
//!
//! The pipeline is lexer → Pratt parser → single-pass bytecode compiler
//! (with constant-pool interning and jump backpatching) → peephole
//! optimizer → stack VM. Each stage lives in its own module; `Engine`
//! drives them.

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod engine;
pub mod environment;
pub mod error;
pub mod host;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod value;

pub use engine::{Engine, Flag};
pub use error::SiftError;
pub use host::HostObject;
pub use value::Value;

/// One-shot convenience: compile `source` and execute it against `host`.
///
/// Hosts that run a script more than once should keep an [`Engine`]
/// instead, so compilation happens a single time.
pub fn evaluate(source: &str, host: &dyn HostObject) -> Result<Value, SiftError> {
    let mut engine = Engine::new(source);
    engine.prepare(&[])?;
    engine.execute(host)
}
