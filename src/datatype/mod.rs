//! Datatype contract and registry
//!
//! A domain in a WSL schema is a named datatype. A datatype is a small
//! value-level object: it declares which line-level syntax its tokens use
//! (bare atom or bracketed string) and converts between token bytes and
//! decoded [`Value`]s. The built-ins live in [`builtin`]; embedders add
//! their own by implementing [`Datatype`] and registering a factory under
//! a new name.

pub mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::render;

/// The two surface syntaxes a datatype may present at the line level.
///
/// The tuple codec dispatches on this to pick the lexer and (for
/// [`SyntaxKind::String`]) to add the surrounding brackets on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    Atom,
    String,
}

/// A decoded field value.
///
/// One variant per built-in datatype, plus [`Value::Opaque`] as the
/// decoded form for user-defined datatypes. Values order and hash by
/// their decoded content, which gives constraint sets and sorted output
/// a total order without consulting the datatype.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Atom(Vec<u8>),
    String(Vec<u8>),
    Int(u64),
    /// Zero-based variant index and the variant token.
    Enum(usize, Vec<u8>),
    Ipv4([u8; 4]),
    /// Raw token bytes, for datatypes this crate knows nothing about.
    Opaque(Vec<u8>),
}

impl fmt::Display for Value {
    /// Best-effort token form, for diagnostics. Byte content is rendered
    /// lossily; this is not the wire encoding.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Atom(b) | Value::String(b) | Value::Opaque(b) => {
                f.write_str(&render::lossy(b))
            }
            Value::Int(n) => write!(f, "{n}"),
            Value::Enum(_, token) => f.write_str(&render::lossy(token)),
            Value::Ipv4([a, b, c, d]) => write!(f, "{a}.{b}.{c}.{d}"),
        }
    }
}

/// An ordered, fixed-arity sequence of decoded values; one per column.
pub type Row = Vec<Value>;

/// A token could not be decoded as a value of some datatype.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A value cannot be expressed in its datatype's wire grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot encode value: {message}")]
pub struct EncodeError {
    pub message: String,
}

impl EncodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A datatype factory rejected its `DOMAIN` declaration arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatatypeError {
    #[error("bad arguments for datatype \"{name}\": {message}")]
    Args { name: String, message: String },
}

impl DatatypeError {
    pub fn args(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Args {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// The datatype contract.
///
/// `decode` receives the complete token for a field: the codec lexes the
/// token first (atom run or bracket contents, depending on [`syntax`])
/// and hands the bytes over. `encode` produces the token bytes, without
/// brackets for string-syntax datatypes; bracketing is the codec's job.
/// `encode` must reject any value whose token would violate the line
/// grammar.
///
/// [`syntax`]: Datatype::syntax
pub trait Datatype: fmt::Debug + Send + Sync {
    fn syntax(&self) -> SyntaxKind;

    fn decode(&self, token: &[u8]) -> Result<Value, DecodeError>;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError>;
}

/// A factory builds a datatype from the argument bytes of its `DOMAIN`
/// declaration (everything after the datatype name, possibly empty).
pub type DatatypeFactory =
    Box<dyn Fn(&[u8]) -> Result<Arc<dyn Datatype>, DatatypeError> + Send + Sync>;

/// Registry of datatype factories, keyed by datatype name.
///
/// The schema compiler looks declarations up here. Registering a name
/// that already exists replaces the earlier factory, so user registries
/// may override built-ins.
pub struct DatatypeRegistry {
    factories: BTreeMap<Vec<u8>, DatatypeFactory>,
}

impl DatatypeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Create a registry holding exactly the built-in datatypes.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register all built-in datatypes.
    pub fn register_defaults(&mut self) {
        self.register(b"Atom", Box::new(builtin::atom_factory));
        self.register(b"String", Box::new(builtin::string_factory));
        self.register(b"Integer", Box::new(builtin::integer_factory));
        self.register(b"Enum", Box::new(builtin::enum_factory));
        self.register(b"IPv4", Box::new(builtin::ipv4_factory));
    }

    /// Register a single factory under a name, replacing any earlier one.
    pub fn register(&mut self, name: &[u8], factory: DatatypeFactory) {
        self.factories.insert(name.to_vec(), factory);
    }

    /// Look up a factory by datatype name.
    pub fn get(&self, name: &[u8]) -> Option<&DatatypeFactory> {
        self.factories.get(name)
    }

    /// Iterate registered datatype names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &[u8]> {
        self.factories.keys().map(|k| k.as_slice())
    }
}

impl Default for DatatypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
