//! Typed Cells
//!
//! The payload behind every object handle: a pointer to a tree object, an
//! inline value, or nothing. Every access is type-id checked before the
//! downcast.

use crate::error::CastError;
use bindkit_object::{ObjectId, ObjectTree};
use std::any::{Any, TypeId};
use std::fmt;
use std::rc::{Rc, Weak};

/// Runtime type identity plus a printable name
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

/// What a cell currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Null,
    Pointer,
    Value,
}

enum Payload {
    Null,
    Pointer { id: ObjectId, tree: Weak<ObjectTree> },
    Value(Box<dyn Any>),
}

/// Type-checked payload container
pub struct TypedCell {
    payload: Payload,
    tag: Option<TypeTag>,
    owning: bool,
    released: bool,
}

impl TypedCell {
    /// Empty cell
    pub fn null() -> Self {
        Self {
            payload: Payload::Null,
            tag: None,
            owning: false,
            released: false,
        }
    }

    /// Cell owning an inline value
    pub fn value<T: Any>(value: T) -> Self {
        Self {
            payload: Payload::Value(Box::new(value)),
            tag: Some(TypeTag::of::<T>()),
            owning: true,
            released: false,
        }
    }

    /// Cell pointing at a tree object; `owning` cells destroy it on release
    pub fn pointer(tree: &Rc<ObjectTree>, id: ObjectId, owning: bool) -> Self {
        let tag = tree
            .payload_type(id)
            .map(|(type_id, name)| TypeTag { id: type_id, name });
        Self {
            payload: Payload::Pointer {
                id,
                tree: Rc::downgrade(tree),
            },
            tag,
            owning,
            released: false,
        }
    }

    pub fn kind(&self) -> CellKind {
        match self.payload {
            Payload::Null => CellKind::Null,
            Payload::Pointer { .. } => CellKind::Pointer,
            Payload::Value(_) => CellKind::Value,
        }
    }

    /// Type of the held value or of the pointed-to payload
    pub fn type_tag(&self) -> Option<TypeTag> {
        self.tag
    }

    pub fn is_owning(&self) -> bool {
        self.owning
    }

    pub fn set_owning(&mut self, owning: bool) {
        self.owning = owning;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Inline value as `T`
    pub fn value_ref<T: Any>(&self) -> Option<&T> {
        if !self.tag.is_some_and(|t| t.is::<T>()) {
            return None;
        }
        match &self.payload {
            Payload::Value(boxed) => boxed.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Mutable inline value as `T`
    pub fn value_mut<T: Any>(&mut self) -> Option<&mut T> {
        if !self.tag.is_some_and(|t| t.is::<T>()) {
            return None;
        }
        match &mut self.payload {
            Payload::Value(boxed) => boxed.downcast_mut::<T>(),
            _ => None,
        }
    }

    /// Inline value as `T`, with a descriptive error on mismatch
    pub fn cast<T: Any>(&self) -> Result<&T, CastError> {
        self.value_ref::<T>().ok_or_else(|| self.cast_error::<T>())
    }

    /// Pointed-to object, regardless of payload type
    pub fn object_id(&self) -> Option<ObjectId> {
        match self.payload {
            Payload::Pointer { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Pointed-to object, only when its payload is a `T`
    pub fn pointer_as<T: Any>(&self) -> Option<ObjectId> {
        if !self.tag.is_some_and(|t| t.is::<T>()) {
            return None;
        }
        self.object_id()
    }

    fn cast_error<T: Any>(&self) -> CastError {
        CastError {
            expected: std::any::type_name::<T>(),
            found: self.tag.map(|t| t.name()).unwrap_or("null"),
        }
    }

    /// Replace the payload with an inline value, releasing the old one
    pub fn set_value<T: Any>(&mut self, value: T) {
        self.release();
        *self = TypedCell::value(value);
    }

    /// Re-point the cell, releasing the old payload
    pub fn set_object(&mut self, tree: &Rc<ObjectTree>, id: ObjectId, owning: bool) {
        self.release();
        *self = TypedCell::pointer(tree, id, owning);
    }

    /// Release the payload. Inline values are dropped; owned pointers have
    /// their object destroyed. Idempotent.
    ///
    /// Returns true if something was actually freed.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        match std::mem::replace(&mut self.payload, Payload::Null) {
            Payload::Null => false,
            Payload::Value(value) => {
                drop(value);
                true
            }
            Payload::Pointer { id, tree } => {
                if !self.owning {
                    return false;
                }
                match tree.upgrade() {
                    Some(tree) => tree.destroy(id),
                    None => false,
                }
            }
        }
    }

    /// Drop knowledge of the pointed-to object without touching it
    pub fn forget(&mut self) {
        if let Payload::Pointer { .. } = self.payload {
            self.payload = Payload::Null;
            self.released = true;
        }
    }
}

impl Default for TypedCell {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for TypedCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCell")
            .field("kind", &self.kind())
            .field("type", &self.tag.map(|t| t.name()))
            .field("object", &self.object_id())
            .field("owning", &self.owning)
            .field("released", &self.released)
            .finish()
    }
}
