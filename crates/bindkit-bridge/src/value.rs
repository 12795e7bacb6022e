//! Script Values
//!
//! What the interpreter side of the bridge sees: primitives, arrays,
//! string-keyed maps, dates, script functions and handles to native objects.

use crate::handle::ObjectHandle;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Exception categories surfaced to script code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Error,
    TypeError,
    ReferenceError,
    RangeError,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionKind::Error => "Error",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ReferenceError => "ReferenceError",
            ExceptionKind::RangeError => "RangeError",
        };
        f.write_str(name)
    }
}

/// A thrown script exception
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ScriptException {
    kind: ExceptionKind,
    message: String,
}

impl ScriptException {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Error, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ReferenceError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::RangeError, message)
    }

    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

type FunctionBody = dyn Fn(&[ScriptValue]) -> Result<ScriptValue, ScriptException>;

/// Callable script function
#[derive(Clone)]
pub struct ScriptFunction {
    name: Rc<str>,
    body: Rc<FunctionBody>,
}

impl ScriptFunction {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[ScriptValue]) -> Result<ScriptValue, ScriptException> + 'static,
    {
        Self {
            name: name.into(),
            body: Rc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the function body directly, without touching interpreter state
    pub fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue, ScriptException> {
        (self.body)(args)
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ScriptFunction) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}()", self.name)
    }
}

/// Script value
#[derive(Clone, Default)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Map(BTreeMap<String, ScriptValue>),
    /// Milliseconds since the Unix epoch, UTC
    Date(f64),
    Function(ScriptFunction),
    Native(ObjectHandle),
}

impl ScriptValue {
    /// `typeof`-style name
    pub fn type_of(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "object",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Function(_) => "function",
            ScriptValue::Array(_)
            | ScriptValue::Map(_)
            | ScriptValue::Date(_)
            | ScriptValue::Native(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&ObjectHandle> {
        match self {
            ScriptValue::Native(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ScriptFunction> {
        match self {
            ScriptValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ScriptValue]> {
        match self {
            ScriptValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Field of a map value
    pub fn field(&self, name: &str) -> Option<&ScriptValue> {
        match self {
            ScriptValue::Map(map) => map.get(name),
            _ => None,
        }
    }

    /// Truthiness
    pub fn to_boolean(&self) -> bool {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ScriptValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric coercion
    pub fn to_number(&self) -> f64 {
        match self {
            ScriptValue::Undefined => f64::NAN,
            ScriptValue::Null => 0.0,
            ScriptValue::Bool(b) => f64::from(u8::from(*b)),
            ScriptValue::Number(n) => *n,
            ScriptValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            ScriptValue::Date(ms) => *ms,
            _ => f64::NAN,
        }
    }

    /// String coercion
    pub fn to_display_string(&self) -> String {
        match self {
            ScriptValue::Undefined => "undefined".to_string(),
            ScriptValue::Null => "null".to_string(),
            ScriptValue::Bool(b) => b.to_string(),
            ScriptValue::Number(n) => format_number(*n),
            ScriptValue::String(s) => s.clone(),
            ScriptValue::Array(items) => items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                .collect::<Vec<_>>()
                .join(","),
            ScriptValue::Map(_) => "[object Object]".to_string(),
            ScriptValue::Date(ms) => format!("Date({})", format_number(*ms)),
            ScriptValue::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
            ScriptValue::Native(h) => format!("[object {}]", h.type_name()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScriptValue::Undefined, ScriptValue::Undefined) => true,
            (ScriptValue::Null, ScriptValue::Null) => true,
            (ScriptValue::Bool(a), ScriptValue::Bool(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::String(a), ScriptValue::String(b)) => a == b,
            (ScriptValue::Array(a), ScriptValue::Array(b)) => a == b,
            (ScriptValue::Map(a), ScriptValue::Map(b)) => a == b,
            (ScriptValue::Date(a), ScriptValue::Date(b)) => a == b,
            (ScriptValue::Function(a), ScriptValue::Function(b)) => a.ptr_eq(b),
            (ScriptValue::Native(a), ScriptValue::Native(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "undefined"),
            ScriptValue::Null => write!(f, "null"),
            ScriptValue::Bool(b) => write!(f, "{}", b),
            ScriptValue::Number(n) => write!(f, "{}", format_number(*n)),
            ScriptValue::String(s) => write!(f, "{:?}", s),
            ScriptValue::Array(items) => f.debug_list().entries(items).finish(),
            ScriptValue::Map(map) => f.debug_map().entries(map).finish(),
            ScriptValue::Date(ms) => write!(f, "Date({})", format_number(*ms)),
            ScriptValue::Function(func) => write!(f, "{:?}", func),
            ScriptValue::Native(h) => write!(f, "{:?}", h),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(v: bool) -> Self {
        ScriptValue::Bool(v)
    }
}

impl From<i32> for ScriptValue {
    fn from(v: i32) -> Self {
        ScriptValue::Number(f64::from(v))
    }
}

impl From<u32> for ScriptValue {
    fn from(v: u32) -> Self {
        ScriptValue::Number(f64::from(v))
    }
}

impl From<f64> for ScriptValue {
    fn from(v: f64) -> Self {
        ScriptValue::Number(v)
    }
}

impl From<&str> for ScriptValue {
    fn from(v: &str) -> Self {
        ScriptValue::String(v.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(v: String) -> Self {
        ScriptValue::String(v)
    }
}

impl From<ObjectHandle> for ScriptValue {
    fn from(v: ObjectHandle) -> Self {
        ScriptValue::Native(v)
    }
}

impl From<ScriptFunction> for ScriptValue {
    fn from(v: ScriptFunction) -> Self {
        ScriptValue::Function(v)
    }
}

impl<T: Into<ScriptValue>> From<Vec<T>> for ScriptValue {
    fn from(v: Vec<T>) -> Self {
        ScriptValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ScriptValue::Null)
    }
}
