//! Runtime values and native host functions.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::error::RuntimeError;

/// A runtime value.
///
/// Every value answers a type tag (`type_name`), a canonical inspection
/// string (`inspect`, also the `Display` impl) and a truthiness query.
/// Constant-pool deduplication compares values by tag and inspection.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Regexp(Regex),
}

impl Value {
    /// The type tag, used in dumps and in constant-pool equality.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Regexp(_) => "REGEXP",
        }
    }

    /// Canonical textual form, used for output, concatenation and
    /// constant-pool equality.
    pub fn inspect(&self) -> String {
        self.to_string()
    }

    /// Null, false, zero and the empty string are falsy; everything else,
    /// arrays included, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Regexp(_) => true,
        }
    }

    /// Constant-pool equality: same type tag and same inspection string.
    pub fn constant_eq(&self, other: &Value) -> bool {
        self.type_name() == other.type_name() && self.inspect() == other.inspect()
    }

    /// Value equality as seen by `==` in scripts. Numeric comparison
    /// crosses int/float; mismatched types are unequal, never an error.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Value::Regexp(a), Value::Regexp(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }

    /// Ordering as seen by `<`/`<=`/`>`/`>=`. Numbers promote to float when
    /// mixed, strings order lexicographically; anything else is an error.
    pub fn compare(&self, other: &Value) -> Result<Ordering, RuntimeError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => float_cmp(*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => float_cmp(*a, *b as f64),
            (Value::Float(a), Value::Float(b)) => float_cmp(*a, *b),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => Err(RuntimeError::type_mismatch(format!(
                "cannot order {} against {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// `+`: numeric addition, or concatenation when either side is a string.
    pub fn add(&self, other: &Value) -> Result<Value, RuntimeError> {
        if matches!(self, Value::String(_)) || matches!(other, Value::String(_)) {
            return Ok(Value::String(self.inspect() + &other.inspect()));
        }
        self.numeric_op(other, "+", |a, b| Ok(a.wrapping_add(b)), |a, b| a + b)
    }

    pub fn sub(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.numeric_op(other, "-", |a, b| Ok(a.wrapping_sub(b)), |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.numeric_op(other, "*", |a, b| Ok(a.wrapping_mul(b)), |a, b| a * b)
    }

    /// Integer division stays integral; division by integer zero is an
    /// error rather than a wrap or a NaN.
    pub fn div(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.numeric_op(
            other,
            "/",
            |a, b| {
                if b == 0 {
                    Err(RuntimeError::DivisionByZero)
                } else {
                    Ok(a.wrapping_div(b))
                }
            },
            |a, b| a / b,
        )
    }

    pub fn rem(&self, other: &Value) -> Result<Value, RuntimeError> {
        self.numeric_op(
            other,
            "%",
            |a, b| {
                if b == 0 {
                    Err(RuntimeError::DivisionByZero)
                } else {
                    Ok(a.wrapping_rem(b))
                }
            },
            |a, b| a % b,
        )
    }

    /// `**`. Integer bases with non-negative integer exponents stay
    /// integral; a negative exponent goes through float exponentiation.
    pub fn pow(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if (0..=u32::MAX as i64).contains(b) {
                    Ok(Value::Int(a.wrapping_pow(*b as u32)))
                } else {
                    Ok(Value::Float((*a as f64).powf(*b as f64)))
                }
            }
            _ => self.numeric_op(
                other,
                "**",
                |_, _| unreachable!("integer pairs are handled above"),
                |a, b| a.powf(b),
            ),
        }
    }

    /// Unary `-`.
    pub fn negate(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(RuntimeError::type_mismatch(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        }
    }

    /// Unary `√`. Always produces a float.
    pub fn sqrt(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Int(n) => Ok(Value::Float((*n as f64).sqrt())),
            Value::Float(n) => Ok(Value::Float(n.sqrt())),
            other => Err(RuntimeError::type_mismatch(format!(
                "cannot take the square root of {}",
                other.type_name()
            ))),
        }
    }

    fn numeric_op(
        &self,
        other: &Value,
        op: &str,
        int_op: impl Fn(i64, i64) -> Result<i64, RuntimeError>,
        float_op: impl Fn(f64, f64) -> f64,
    ) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b)?)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
            _ => Err(RuntimeError::type_mismatch(format!(
                "unsupported operands for '{}': {} and {}",
                op,
                self.type_name(),
                other.type_name()
            ))),
        }
    }
}

fn float_cmp(a: f64, b: f64) -> Result<Ordering, RuntimeError> {
    a.partial_cmp(&b)
        .ok_or_else(|| RuntimeError::type_mismatch("cannot order NaN"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Regexp(re) => write!(f, "{}", re.as_str()),
        }
    }
}

/// A host-supplied function callable from scripts.
pub struct NativeFunction {
    name: String,
    arity: Option<usize>,
    func: Box<dyn Fn(&[Value]) -> Result<Value, String>>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        arity: Option<usize>,
        func: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        if let Some(arity) = self.arity {
            if args.len() != arity {
                return Err(RuntimeError::new(format!(
                    "{} expects {} argument(s), got {}",
                    self.name,
                    arity,
                    args.len()
                )));
            }
        }
        (self.func)(args).map_err(RuntimeError::General)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}
