//! Lifetime Tracker
//!
//! Maps watched native objects to the handles that wrap them. When the tree
//! reports an object destroyed, every such handle becomes a zombie. The
//! tracker never releases anything itself.

use crate::handle::{HandleState, ObjectHandle};
use bindkit_object::ObjectId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

struct Watcher {
    serial: u64,
    handle: Weak<HandleState>,
}

/// Liveness registry for wrapped native objects
#[derive(Default)]
pub struct LifetimeTracker {
    watched: RefCell<HashMap<ObjectId, Vec<Watcher>>>,
}

impl LifetimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a handle's object
    pub fn watch(&self, handle: &ObjectHandle) {
        let Some(id) = handle.object_id() else {
            return;
        };
        self.watched.borrow_mut().entry(id).or_default().push(Watcher {
            serial: handle.serial(),
            handle: Rc::downgrade(handle.state()),
        });
    }

    /// Stop tracking an object entirely; returns how many handles were dropped
    pub fn unwatch(&self, id: ObjectId) -> usize {
        self.watched.borrow_mut().remove(&id).map(|w| w.len()).unwrap_or(0)
    }

    /// Stop tracking one handle
    pub(crate) fn unwatch_handle(&self, id: ObjectId, serial: u64) {
        let mut watched = self.watched.borrow_mut();
        if let Some(watchers) = watched.get_mut(&id) {
            watchers.retain(|w| w.serial != serial);
            if watchers.is_empty() {
                watched.remove(&id);
            }
        }
    }

    /// Zombify every handle wrapping `id`.
    ///
    /// Safe to call repeatedly or for objects nobody watches. Returns the
    /// number of handles that were turned into zombies.
    pub fn notify_destroyed(&self, id: ObjectId) -> usize {
        let watchers = self.watched.borrow_mut().remove(&id).unwrap_or_default();
        let mut killed = 0;
        for watcher in watchers {
            if let Some(state) = watcher.handle.upgrade() {
                if state.kill() {
                    killed += 1;
                }
            }
        }
        if killed > 0 {
            tracing::debug!("{} destroyed, {} handle(s) now dead", id, killed);
        }
        killed
    }

    pub fn is_watched(&self, id: ObjectId) -> bool {
        self.watched.borrow().contains_key(&id)
    }

    /// Number of live handles watching `id`
    pub fn watcher_count(&self, id: ObjectId) -> usize {
        self.watched
            .borrow()
            .get(&id)
            .map(|w| w.iter().filter(|w| w.handle.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Number of watched objects
    pub fn len(&self) -> usize {
        self.watched.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.borrow().is_empty()
    }
}
