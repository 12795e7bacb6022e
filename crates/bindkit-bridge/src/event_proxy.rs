//! Event Proxy
//!
//! Forwards native events of one object to script handlers. The proxy is an
//! event filter on the tree only while at least one handler is registered.

use crate::bridge::{Bridge, BridgeShared};
use crate::event_map;
use crate::handle::{HandleState, ObjectHandle};
use crate::value::{ScriptFunction, ScriptValue};
use bindkit_object::{Event, EventFilter, EventType, FilterId, ObjectId, TreeError};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Per-object event subscription manager
pub struct EventProxy {
    bridge: Weak<BridgeShared>,
    watched: ObjectId,
    owner: Weak<HandleState>,
    handlers: RefCell<BTreeMap<EventType, ScriptFunction>>,
    filter: Cell<Option<FilterId>>,
    this: Weak<EventProxy>,
}

impl EventProxy {
    pub(crate) fn new(bridge: &Bridge, watched: ObjectId, owner: &ObjectHandle) -> Rc<Self> {
        Rc::new_cyclic(|this| EventProxy {
            bridge: bridge.downgrade(),
            watched,
            owner: Rc::downgrade(owner.state()),
            handlers: RefCell::new(BTreeMap::new()),
            filter: Cell::new(None),
            this: this.clone(),
        })
    }

    pub fn watched(&self) -> ObjectId {
        self.watched
    }

    /// Handle whose handler properties feed this proxy
    pub fn owner(&self) -> Option<ObjectHandle> {
        ObjectHandle::from_weak(&self.owner)
    }

    /// Register (or replace) the handler for `kind`.
    ///
    /// The first handler subscribes the proxy to the object's events.
    pub fn add_filter(&self, kind: EventType, handler: ScriptFunction) -> Result<(), TreeError> {
        if self.filter.get().is_none() {
            let bridge = self.bridge.upgrade().ok_or(TreeError::UnknownObject(self.watched))?;
            let this = self.this.upgrade().ok_or(TreeError::UnknownObject(self.watched))?;
            let filter: Rc<dyn EventFilter> = this;
            let id = bridge.tree.install_event_filter(self.watched, filter)?;
            self.filter.set(Some(id));
            tracing::debug!("Subscribed to events of {}", self.watched);
        }
        let old = self.handlers.borrow_mut().insert(kind, handler);
        drop(old);
        Ok(())
    }

    /// Remove the handler for `kind`.
    ///
    /// Removing the last handler unsubscribes the proxy. Removing a handler
    /// that is not there does nothing. Returns whether one was removed.
    pub fn remove_filter(&self, kind: EventType) -> bool {
        let (removed, now_empty) = {
            let mut handlers = self.handlers.borrow_mut();
            let removed = handlers.remove(&kind);
            (removed, handlers.is_empty())
        };
        if removed.is_none() {
            return false;
        }
        if now_empty {
            self.unsubscribe();
        }
        true
    }

    /// Unsubscribe and hand back every handler
    pub(crate) fn detach(&self) -> BTreeMap<EventType, ScriptFunction> {
        let handlers = std::mem::take(&mut *self.handlers.borrow_mut());
        self.unsubscribe();
        handlers
    }

    fn unsubscribe(&self) {
        let Some(id) = self.filter.take() else {
            return;
        };
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.tree.remove_event_filter(self.watched, id);
        }
        tracing::debug!("Unsubscribed from events of {}", self.watched);
    }

    pub fn handler(&self, kind: EventType) -> Option<ScriptFunction> {
        self.handlers.borrow().get(&kind).cloned()
    }

    pub fn is_subscribed(&self, kind: EventType) -> bool {
        self.handlers.borrow().contains_key(&kind)
    }

    /// Subscribed event types in code order
    pub fn subscribed(&self) -> Vec<EventType> {
        self.handlers.borrow().keys().copied().collect()
    }

    /// Number of handlers; the proxy is only installed while this is non-zero
    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }

    pub fn is_installed(&self) -> bool {
        self.filter.get().is_some()
    }

    /// Run the script handler for this event.
    ///
    /// Returns true only when the handler returned `true`; exceptions are
    /// logged and leave the event unconsumed.
    pub fn on_event(&self, event: &mut Event) -> bool {
        let Some(handler) = self.handler(event.kind()) else {
            return false;
        };
        let Some(shared) = self.bridge.upgrade() else {
            return false;
        };
        let bridge = Bridge::from_shared(shared);

        let event_object = event_map::event_to_script(&bridge, event);
        match bridge.call_function(&handler, &[event_object]) {
            Ok(ScriptValue::Bool(consumed)) => consumed,
            Ok(_) => false,
            Err(exc) => {
                tracing::warn!(
                    "Exception in {} handler of {}: {}",
                    event_map::handler_name(event.kind()).unwrap_or("event"),
                    self.watched,
                    exc
                );
                bridge.clear_exception();
                false
            }
        }
    }
}

impl EventFilter for EventProxy {
    fn event_filter(&self, _watched: ObjectId, event: &mut Event) -> bool {
        self.on_event(event)
    }
}
