//! Signals and Slots
//!
//! String signatures, the raw argument vector handed to receivers, and the
//! receiver trait. Connection bookkeeping lives in the tree.

use std::any::Any;
use std::fmt;
use std::str::FromStr;

/// One position in a raw argument vector.
///
/// Index 0 of every vector is the return slot; parameters start at 1.
pub type ArgSlot = Box<dyn Any>;

/// Connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub(crate) u64);

/// Signature parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("empty signature")]
    Empty,

    #[error("signature '{0}' must look like name(type, ...)")]
    MissingParens(String),

    #[error("invalid method name in '{0}'")]
    InvalidName(String),

    #[error("empty parameter type in '{0}'")]
    EmptyParameter(String),
}

/// Parsed method signature: `[return] name(type, ...)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    name: String,
    params: Vec<String>,
    return_type: Option<String>,
}

impl Signature {
    /// Parse and normalize a signature string
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SignatureError::Empty);
        }

        let open = text
            .find('(')
            .ok_or_else(|| SignatureError::MissingParens(text.to_string()))?;
        if !text.ends_with(')') {
            return Err(SignatureError::MissingParens(text.to_string()));
        }

        let head = text[..open].trim();
        let (return_type, name) = match head.rfind(char::is_whitespace) {
            Some(pos) => {
                let ret = normalize_type(&head[..pos]);
                let ret = if ret.is_empty() || ret == "void" { None } else { Some(ret) };
                (ret, head[pos..].trim())
            }
            None => (None, head),
        };
        if !is_identifier(name) {
            return Err(SignatureError::InvalidName(text.to_string()));
        }

        let inner = text[open + 1..text.len() - 1].trim();
        let mut params = Vec::new();
        if !inner.is_empty() {
            for raw in split_params(inner) {
                let ty = normalize_type(raw);
                if ty.is_empty() {
                    return Err(SignatureError::EmptyParameter(text.to_string()));
                }
                params.push(ty);
            }
        }

        Ok(Self {
            name: name.to_string(),
            params,
            return_type,
        })
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized parameter type names
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Declared return type (`None` for void)
    pub fn return_type(&self) -> Option<&str> {
        self.return_type.as_deref()
    }

    /// Parameter count
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `name(type,type)` without the return type
    pub fn normalized(&self) -> String {
        format!("{}({})", self.name, self.params.join(","))
    }

    /// Check whether a receiver with `slot` can be connected to this signal.
    ///
    /// The receiver may take fewer arguments than the signal provides, but
    /// the ones it takes must match position by position.
    pub fn accepts(&self, slot: &Signature) -> bool {
        slot.params.len() <= self.params.len()
            && slot.params.iter().zip(&self.params).all(|(a, b)| a == b)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ret) = &self.return_type {
            write!(f, "{} ", ret)?;
        }
        write!(f, "{}", self.normalized())
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::parse(s)
    }
}

/// Receiver side of a connection
pub trait SlotTarget {
    /// Parameter list this receiver expects
    fn signature(&self) -> &Signature;

    /// Handle one emission.
    ///
    /// `args` holds the return slot followed by exactly `signature().arity()`
    /// parameters. Returns false when the receiver failed to handle the call.
    fn invoke(&self, args: &mut [ArgSlot]) -> bool;
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split on top-level commas, leaving `Map<String,int>` intact
fn split_params(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

/// `const String &` -> `String`, `Widget *` -> `Widget*`
fn normalize_type(raw: &str) -> String {
    let mut ty = raw.trim();
    if let Some(rest) = ty.strip_prefix("const ") {
        ty = rest.trim_start();
    }
    if let Some(rest) = ty.strip_suffix('&') {
        ty = rest.trim_end();
    }
    let mut out = String::with_capacity(ty.len());
    for word in ty.split_whitespace() {
        if !out.is_empty() && !word.starts_with('*') {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let sig = Signature::parse("valueChanged(int)").unwrap();
        assert_eq!(sig.name(), "valueChanged");
        assert_eq!(sig.params(), &["int".to_string()]);
        assert_eq!(sig.return_type(), None);
    }

    #[test]
    fn test_parse_normalizes_whitespace() {
        let sig = Signature::parse("  moved( int , const String & , Widget * ) ").unwrap();
        assert_eq!(sig.normalized(), "moved(int,String,Widget*)");
    }

    #[test]
    fn test_parse_return_type() {
        let sig = Signature::parse("double scaled(double)").unwrap();
        assert_eq!(sig.return_type(), Some("double"));
        assert_eq!(sig.to_string(), "double scaled(double)");

        let sig = Signature::parse("void clicked()").unwrap();
        assert_eq!(sig.return_type(), None);
        assert_eq!(sig.arity(), 0);
    }

    #[test]
    fn test_parse_template_param() {
        let sig = Signature::parse("changed(Map<String,int>,bool)").unwrap();
        assert_eq!(sig.arity(), 2);
        assert_eq!(sig.params()[0], "Map<String,int>");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Signature::parse(""), Err(SignatureError::Empty));
        assert!(matches!(Signature::parse("clicked"), Err(SignatureError::MissingParens(_))));
        assert!(matches!(Signature::parse("1abc()"), Err(SignatureError::InvalidName(_))));
        assert!(matches!(Signature::parse("f(int,,int)"), Err(SignatureError::EmptyParameter(_))));
    }

    #[test]
    fn test_accepts_prefix() {
        let signal = Signature::parse("resized(int,int)").unwrap();
        assert!(signal.accepts(&Signature::parse("onResize(int)").unwrap()));
        assert!(signal.accepts(&Signature::parse("onResize()").unwrap()));
        assert!(!signal.accepts(&Signature::parse("onResize(double)").unwrap()));
        assert!(!signal.accepts(&Signature::parse("onResize(int,int,int)").unwrap()));
    }
}
