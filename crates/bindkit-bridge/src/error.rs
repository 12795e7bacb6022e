//! Bridge error types
//!
//! Every error that reaches script code is converted into a
//! [`ScriptException`] at the boundary.

use crate::handle::Ownership;
use crate::value::ScriptException;
use bindkit_object::{SignatureError, TreeError};

/// Failed type check on a typed cell or argument
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot cast {found} to {expected}")]
pub struct CastError {
    pub expected: &'static str,
    pub found: &'static str,
}

/// Error raised by a native method callback
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    #[error("{0}")]
    Failed(String),

    #[error("argument {index}: expected {expected}")]
    BadArgument { index: usize, expected: &'static str },

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Call(#[from] Box<CallError>),
}

impl NativeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NativeError::Failed(message.into())
    }
}

impl From<CallError> for NativeError {
    fn from(err: CallError) -> Self {
        NativeError::Call(Box::new(err))
    }
}

/// Binding registration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("a different binding is already registered as '{name}'")]
    Conflict { name: String },
}

/// Script-side construction errors
#[derive(Debug, thiserror::Error)]
pub enum ConstructError {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("{type_name} constructor takes {expected} arguments, got {got}")]
    ArityMismatch {
        type_name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("failed to construct {type_name}: {reason}")]
    NativeConstructionFailed { type_name: &'static str, reason: String },
}

/// Method call errors
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("{type_name} object has been destroyed")]
    DeadObject { type_name: &'static str },

    #[error("{type_name} has no method '{method}'")]
    NoSuchMethod { type_name: &'static str, method: String },

    #[error("{method} takes {expected} arguments, got {got}")]
    ArityMismatch {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("{type_name} is a value, not a native object")]
    NotAnObject { type_name: &'static str },

    #[error("cannot release a {ownership:?} object from script")]
    OwnershipViolation { ownership: Ownership },

    #[error("{0}")]
    NativeException(String),

    #[error(transparent)]
    Cast(#[from] CastError),
}

/// Slot connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("{type_name} has no slot '{slot}'")]
    NoSuchSlot { type_name: &'static str, slot: String },

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Native/script value conversion errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    #[error("no conversion for type '{0}'")]
    UnsupportedType(String),

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: &'static str },
}

impl From<CastError> for ScriptException {
    fn from(err: CastError) -> Self {
        ScriptException::type_error(err.to_string())
    }
}

impl From<NativeError> for ScriptException {
    fn from(err: NativeError) -> Self {
        match err {
            NativeError::BadArgument { .. } | NativeError::Cast(_) => {
                ScriptException::type_error(err.to_string())
            }
            NativeError::Call(call) => ScriptException::from(*call),
            other => ScriptException::error(other.to_string()),
        }
    }
}

impl From<ConstructError> for ScriptException {
    fn from(err: ConstructError) -> Self {
        match err {
            ConstructError::UnknownType(_) => ScriptException::reference_error(err.to_string()),
            ConstructError::ArityMismatch { .. } => ScriptException::type_error(err.to_string()),
            ConstructError::NativeConstructionFailed { .. } => ScriptException::error(err.to_string()),
        }
    }
}

impl From<CallError> for ScriptException {
    fn from(err: CallError) -> Self {
        match err {
            CallError::DeadObject { .. } | CallError::NativeException(_) => {
                ScriptException::error(err.to_string())
            }
            CallError::UnknownType(_) => ScriptException::reference_error(err.to_string()),
            _ => ScriptException::type_error(err.to_string()),
        }
    }
}

impl From<ConnectError> for ScriptException {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Call(call) => ScriptException::from(call),
            other => ScriptException::error(other.to_string()),
        }
    }
}

impl From<MarshalError> for ScriptException {
    fn from(err: MarshalError) -> Self {
        ScriptException::type_error(err.to_string())
    }
}

impl From<RegistrationError> for ScriptException {
    fn from(err: RegistrationError) -> Self {
        ScriptException::error(err.to_string())
    }
}
