//! bindkit Object - native object model
//!
//! The native side of the bridge: an arena of objects with static class
//! metadata, parent/child ownership, string-signature signals and per-object
//! event filters. Nothing in here knows that a script engine exists.

mod event;
mod meta;
mod signal;
mod tree;
mod variant;

pub use event::{
    Event, EventData, EventFilter, EventType, FilterId, FocusReason, Modifiers, MouseButton,
};
pub use meta::{Ancestors, MetaClass, OBJECT_CLASS};
pub use signal::{ArgSlot, ConnectionId, Signature, SignatureError, SlotTarget};
pub use tree::{DestroyObserver, ObjectTree, TreeError};
pub use variant::{Date, DateTime, Point, Rect, Size, Time, Variant};

use std::fmt;

/// Native object identifier
///
/// Ids are handed out monotonically and never reused, so a stale id can
/// only ever miss, never alias a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u64);

impl ObjectId {
    /// Raw numeric value
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}
