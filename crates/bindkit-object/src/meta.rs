//! Class Metadata
//!
//! Static, const-constructible class descriptors forming a single-inheritance
//! chain. The bridge walks this chain to find the nearest bound ancestor of
//! an object it has no binding for.

use crate::signal::Signature;

/// Upper bound on any superclass walk
const MAX_HIERARCHY_DEPTH: usize = 256;

/// Root class every native object derives from
pub static OBJECT_CLASS: MetaClass =
    MetaClass::new("Object", None, &["destroyed()", "objectNameChanged(String)"]);

/// Static class descriptor
#[derive(Debug)]
pub struct MetaClass {
    name: &'static str,
    superclass: Option<&'static MetaClass>,
    signals: &'static [&'static str],
}

impl MetaClass {
    /// Create a class descriptor
    pub const fn new(
        name: &'static str,
        superclass: Option<&'static MetaClass>,
        signals: &'static [&'static str],
    ) -> Self {
        Self { name, superclass, signals }
    }

    /// Class name
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Direct superclass, if any
    pub const fn superclass(&self) -> Option<&'static MetaClass> {
        self.superclass
    }

    /// Signals declared directly on this class
    pub const fn own_signals(&self) -> &'static [&'static str] {
        self.signals
    }

    /// Walk from this class up to the root (self first)
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            next: Some(self),
            remaining: MAX_HIERARCHY_DEPTH,
        }
    }

    /// Check whether this class is `name` or derives from it
    pub fn inherits(&self, name: &str) -> bool {
        self.ancestors().any(|class| class.name == name)
    }

    /// Number of superclasses above this one
    pub fn depth(&self) -> usize {
        self.ancestors().count().saturating_sub(1)
    }

    /// Check whether `signature` is declared on this class or an ancestor.
    ///
    /// Comparison is done on normalized signatures, so `"valueChanged( int )"`
    /// matches a declared `"valueChanged(int)"`.
    pub fn has_signal(&self, signature: &Signature) -> bool {
        let wanted = signature.normalized();
        self.ancestors().any(|class| {
            class.signals.iter().any(|declared| {
                Signature::parse(declared)
                    .map(|sig| sig.normalized() == wanted)
                    .unwrap_or(false)
            })
        })
    }
}

/// Iterator over a class and its superclasses
pub struct Ancestors<'a> {
    next: Option<&'a MetaClass>,
    remaining: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a MetaClass;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next?;
        self.next = current.superclass;
        Some(current)
    }
}
