//! Runtime values manipulated by the VM.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::chunk::Instructions;

/// Backing map of a hash value, keyed by the hashable form of each key.
pub type HashPairs = IndexMap<HashKey, HashPair, ahash::RandomState>;

/// Signature of a host-provided function.
pub type BuiltinFunction = fn(&[Value]) -> Value;

/// A runtime value.
///
/// Compound values are reference counted; cloning a value never deep-copies.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
    Null,
    Array(Rc<Vec<Value>>),
    Hash(Rc<HashPairs>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(&'static Builtin),
    /// An error produced by a builtin; a normal value, not a VM fault.
    Error(Rc<str>),
}

/// The hashable projection of a value. Only integers, booleans and strings have one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
}

/// A key/value entry of a hash, keeping the original key for display.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A function body compiled to instructions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    /// Parameters plus `let` bindings in the body.
    pub num_locals: usize,
    pub num_parameters: usize,
    /// Binding name when the literal was the value of a `let`.
    pub name: Option<String>,
}

/// A compiled function paired with the values it captured when created.
#[derive(Debug, Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

impl Closure {
    pub fn new(func: Rc<CompiledFunction>, free: Vec<Value>) -> Self {
        Self { func, free }
    }
}

/// A named host function.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFunction,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(elements))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Value::Error(message.into().into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::String(_) => "STRING",
            Value::Null => "NULL",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Error(_) => "ERROR",
        }
    }

    /// `false` and `null` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey::Integer(*n)),
            Value::Boolean(b) => Some(HashKey::Boolean(*b)),
            Value::String(s) => Some(HashKey::String(Rc::clone(s))),
            _ => None,
        }
    }

    pub fn is_hashable(&self) -> bool {
        self.hash_key().is_some()
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

/// The inspected form printed by the REPL and the file runner.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Null => write!(f, "null"),
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
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(func) => write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func)),
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => write!(f, "builtin function"),
            Value::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}
