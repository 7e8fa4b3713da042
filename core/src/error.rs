//! Error taxonomy for the interpreter, per §7.
//!
//! [`DecodeError`] is fatal: it can only occur before execution starts, and
//! aborts construction of the [`crate::Interpreter`]. [`RuntimeError`],
//! [`ConfigurationError`] and [`InternalError`] are *recovered*: the
//! offending expression yields [`crate::value::Value::Null`] (or the
//! external-value sentinel), an `ERROR` command is emitted, and execution
//! continues with the next statement.

use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Failure to decode a CompactAST byte stream (§4.1).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid CompactAST magic header")]
    InvalidMagic,
    #[error("unsupported CompactAST format version {0}")]
    UnsupportedVersion(u16),
    #[error("CompactAST byte stream truncated at offset {0}")]
    Truncated(usize),
    #[error("string table index {0} out of range")]
    StringIndexOutOfRange(u32),
    #[error("child node index {0} out of range")]
    ChildIndexOutOfRange(u32),
    #[error("unknown AST node kind byte {0}")]
    UnknownNodeKind(u8),
}

/// A fault that occurs while executing a well-formed program; a user-code
/// problem, not an interpreter bug. Always recovered (§7).
#[derive(Copy, Clone, Debug, Serialize, PartialEq)]
pub enum RuntimeError {
    UndefinedVariable,
    UndefinedFunction,
    ArrayIndexOutOfBounds,
    PointerOutOfBounds,
    DivideByZero,
    TypeMismatch,
    NullPointerDereference,
    ConstWrite,
    UnsupportedOperator,
    StackOverDepth,
}

impl RuntimeError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "Undefined variable",
            Self::UndefinedFunction => "Undefined function",
            Self::ArrayIndexOutOfBounds => "Array index out of bounds",
            Self::PointerOutOfBounds => "Pointer dereference out of bounds",
            Self::DivideByZero => "Division by zero",
            Self::TypeMismatch => "Type mismatch",
            Self::NullPointerDereference => "Null pointer dereference",
            Self::ConstWrite => "Assignment to const variable",
            Self::UnsupportedOperator => "Unsupported operator for operand type",
            Self::StackOverDepth => "Maximum call stack depth exceeded",
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// An external value (pin read, timer, library sensor) could not be
/// obtained: no provider configured, or the async deadline elapsed (§4.8).
#[derive(Copy, Clone, Debug, Serialize, PartialEq)]
pub enum ConfigurationError {
    NoProvider { function: &'static str },
    ResponseTimeout { function: &'static str },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProvider { function } => {
                write!(f, "`{}` called without provider", function)
            }
            Self::ResponseTimeout { function } => {
                write!(f, "`{}` timed out waiting for a response", function)
            }
        }
    }
}

/// An invariant violation that should never occur in a correct
/// implementation. Emitted rather than panicking, per §7.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct InternalError(pub String);

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "internal error: {}", self.0)
    }
}

/// Any of the three recoverable error kinds, bundled for the `ERROR`
/// command's `errorType` field.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "kind")]
pub enum RecoverableError {
    Runtime(RuntimeError),
    Configuration(ConfigurationError),
    Internal(InternalError),
}

impl RecoverableError {
    /// The `errorType` string used in the emitted `ERROR` command.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Runtime(_) => "RuntimeError",
            Self::Configuration(_) => "ConfigurationError",
            Self::Internal(_) => "InternalError",
        }
    }
}

impl Display for RecoverableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime(e) => write!(f, "{}", e),
            Self::Configuration(e) => write!(f, "{}", e),
            Self::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<RuntimeError> for RecoverableError {
    fn from(e: RuntimeError) -> Self {
        Self::Runtime(e)
    }
}

impl From<ConfigurationError> for RecoverableError {
    fn from(e: ConfigurationError) -> Self {
        Self::Configuration(e)
    }
}

impl From<InternalError> for RecoverableError {
    fn from(e: InternalError) -> Self {
        Self::Internal(e)
    }
}
