//! Object Tree
//!
//! Arena of native objects keyed by id. The tree owns parent/child links,
//! payloads, signal connections and event filters.
//!
//! No internal borrow is held while calling out to observers, receivers or
//! filters, so any of them may call back into the tree.

use crate::event::{Event, EventFilter, EventType, FilterId};
use crate::meta::MetaClass;
use crate::signal::{ArgSlot, ConnectionId, Signature, SignatureError, SlotTarget};
use crate::variant::Variant;
use crate::ObjectId;
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::{Rc, Weak};

/// Tree errors
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("making {parent} the parent of {child} would create a cycle")]
    Cycle { child: ObjectId, parent: ObjectId },

    #[error("class {class} has no signal {signal}")]
    UnknownSignal { class: &'static str, signal: String },

    #[error("slot {slot} is not compatible with signal {signal}")]
    IncompatibleSlot { signal: String, slot: String },

    #[error("signal {signal} takes {expected} arguments, got {got}")]
    ArgumentCount { signal: String, expected: usize, got: usize },

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Pre-destruction notification
pub trait DestroyObserver {
    /// Called once per object, before its payload is dropped
    fn object_destroyed(&self, id: ObjectId);
}

type Payload = Rc<RefCell<Box<dyn Any>>>;

struct ObjectEntry {
    meta: &'static MetaClass,
    name: String,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    properties: BTreeMap<String, Variant>,
    payload: Payload,
    payload_type: TypeId,
    payload_type_name: &'static str,
    filters: Vec<(FilterId, Rc<dyn EventFilter>)>,
}

struct Connection {
    id: ConnectionId,
    sender: ObjectId,
    signal: String,
    receiver: Rc<dyn SlotTarget>,
}

/// Arena of native objects
#[derive(Default)]
pub struct ObjectTree {
    objects: RefCell<HashMap<ObjectId, ObjectEntry>>,
    dying: RefCell<HashSet<ObjectId>>,
    connections: RefCell<Vec<Connection>>,
    observers: RefCell<Vec<Weak<dyn DestroyObserver>>>,
    next_id: Cell<u64>,
}

impl ObjectTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    // ========================================================================
    // Lifetime
    // ========================================================================

    /// Create a top-level object
    pub fn create<T: Any>(&self, meta: &'static MetaClass, payload: T) -> ObjectId {
        let id = ObjectId(self.next_id());
        let entry = ObjectEntry {
            meta,
            name: String::new(),
            parent: None,
            children: Vec::new(),
            properties: BTreeMap::new(),
            payload: Rc::new(RefCell::new(Box::new(payload))),
            payload_type: TypeId::of::<T>(),
            payload_type_name: std::any::type_name::<T>(),
            filters: Vec::new(),
        };
        self.objects.borrow_mut().insert(id, entry);
        tracing::trace!("Created {} ({})", id, meta.name());
        id
    }

    /// Create an object owned by `parent`
    pub fn create_child<T: Any>(
        &self,
        meta: &'static MetaClass,
        payload: T,
        parent: ObjectId,
    ) -> Result<ObjectId, TreeError> {
        if !self.is_alive(parent) {
            return Err(TreeError::UnknownObject(parent));
        }
        let id = self.create(meta, payload);
        self.set_parent(id, Some(parent))?;
        Ok(id)
    }

    /// Destroy an object and everything it owns.
    ///
    /// Observers hear about each object (parent first) before any payload is
    /// dropped. Returns false if the object was already gone.
    pub fn destroy(&self, id: ObjectId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        let doomed = self.subtree(id);
        self.dying.borrow_mut().extend(doomed.iter().copied());
        tracing::debug!("Destroying {} ({} objects)", id, doomed.len());

        let destroyed_signal = Signature::parse("destroyed()").ok();
        for &victim in &doomed {
            if let Some(signal) = &destroyed_signal {
                self.deliver(victim, signal, Vec::new());
            }
            self.notify_destroyed(victim);
        }

        let doomed_set: HashSet<ObjectId> = doomed.iter().copied().collect();
        let parent = self.objects.borrow().get(&id).and_then(|e| e.parent);

        let mut removed_entries = Vec::with_capacity(doomed.len());
        {
            let mut objects = self.objects.borrow_mut();
            if let Some(p) = parent {
                if let Some(parent_entry) = objects.get_mut(&p) {
                    parent_entry.children.retain(|c| *c != id);
                }
            }
            for victim in &doomed {
                if let Some(entry) = objects.remove(victim) {
                    removed_entries.push(entry);
                }
            }
        }

        let removed_connections: Vec<Connection> = {
            let mut connections = self.connections.borrow_mut();
            let (gone, kept): (Vec<_>, Vec<_>) = connections
                .drain(..)
                .partition(|c| doomed_set.contains(&c.sender));
            *connections = kept;
            gone
        };

        {
            let mut dying = self.dying.borrow_mut();
            for victim in &doomed {
                dying.remove(victim);
            }
        }

        // Payloads, filters and receivers may run arbitrary drop code.
        drop(removed_connections);
        drop(removed_entries);

        if let Some(parent) = parent {
            self.send_event(parent, &mut Event::child(EventType::ChildRemoved, id));
        }
        true
    }

    /// Check whether an object exists and is not being torn down
    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.objects.borrow().contains_key(&id) && !self.dying.borrow().contains(&id)
    }

    /// Register a pre-destruction observer
    pub fn add_destroy_observer(&self, observer: Weak<dyn DestroyObserver>) {
        self.observers.borrow_mut().push(observer);
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }

    fn subtree(&self, root: ObjectId) -> Vec<ObjectId> {
        let objects = self.objects.borrow();
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(entry) = objects.get(&next) {
                stack.extend(entry.children.iter().rev().copied());
            }
        }
        out
    }

    fn notify_destroyed(&self, id: ObjectId) {
        let observers: Vec<Rc<dyn DestroyObserver>> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            observer.object_destroyed(id);
        }
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Class descriptor of a live object
    pub fn meta(&self, id: ObjectId) -> Option<&'static MetaClass> {
        if !self.is_alive(id) {
            return None;
        }
        self.objects.borrow().get(&id).map(|e| e.meta)
    }

    /// Class name of a live object
    pub fn class_name(&self, id: ObjectId) -> Option<&'static str> {
        self.meta(id).map(MetaClass::name)
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.borrow().get(&id).and_then(|e| e.parent)
    }

    pub fn children(&self, id: ObjectId) -> Vec<ObjectId> {
        self.objects
            .borrow()
            .get(&id)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    /// Move an object under a new parent (or make it top-level).
    ///
    /// The old parent receives `ChildRemoved`, the new one `ChildAdded`.
    pub fn set_parent(&self, id: ObjectId, parent: Option<ObjectId>) -> Result<(), TreeError> {
        if !self.is_alive(id) {
            return Err(TreeError::UnknownObject(id));
        }
        if let Some(p) = parent {
            if !self.is_alive(p) {
                return Err(TreeError::UnknownObject(p));
            }
        }

        let old_parent = {
            let mut objects = self.objects.borrow_mut();
            if let Some(p) = parent {
                let mut cursor = Some(p);
                while let Some(current) = cursor {
                    if current == id {
                        return Err(TreeError::Cycle { child: id, parent: p });
                    }
                    cursor = objects.get(&current).and_then(|e| e.parent);
                }
            }

            let old_parent = objects.get(&id).and_then(|e| e.parent);
            if old_parent == parent {
                return Ok(());
            }
            if let Some(old) = old_parent {
                if let Some(entry) = objects.get_mut(&old) {
                    entry.children.retain(|c| *c != id);
                }
            }
            if let Some(new) = parent {
                if let Some(entry) = objects.get_mut(&new) {
                    entry.children.push(id);
                }
            }
            if let Some(entry) = objects.get_mut(&id) {
                entry.parent = parent;
            }
            old_parent
        };

        if let Some(old) = old_parent {
            self.send_event(old, &mut Event::child(EventType::ChildRemoved, id));
        }
        if let Some(new) = parent {
            self.send_event(new, &mut Event::child(EventType::ChildAdded, id));
        }
        Ok(())
    }

    pub fn object_name(&self, id: ObjectId) -> Option<String> {
        self.objects.borrow().get(&id).map(|e| e.name.clone())
    }

    /// Rename an object, emitting `objectNameChanged(String)` on change
    pub fn set_object_name(&self, id: ObjectId, name: &str) -> Result<(), TreeError> {
        let changed = {
            let mut objects = self.objects.borrow_mut();
            let entry = objects.get_mut(&id).ok_or(TreeError::UnknownObject(id))?;
            if entry.name == name {
                false
            } else {
                entry.name = name.to_string();
                true
            }
        };
        if changed {
            let signal = Signature::parse("objectNameChanged(String)")?;
            self.deliver(id, &signal, vec![Box::new(name.to_string())]);
        }
        Ok(())
    }

    /// Depth-first search of descendants by object name
    pub fn find_child(&self, id: ObjectId, name: &str) -> Option<ObjectId> {
        let objects = self.objects.borrow();
        let mut stack: Vec<ObjectId> = objects.get(&id)?.children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            let entry = objects.get(&next)?;
            if entry.name == name {
                return Some(next);
            }
            stack.extend(entry.children.iter().rev().copied());
        }
        None
    }

    // ========================================================================
    // Properties and payloads
    // ========================================================================

    /// Read a dynamic property
    pub fn property(&self, id: ObjectId, name: &str) -> Option<Variant> {
        self.objects.borrow().get(&id)?.properties.get(name).cloned()
    }

    /// Write a dynamic property; `Variant::Invalid` removes it
    pub fn set_property(&self, id: ObjectId, name: &str, value: Variant) -> Result<(), TreeError> {
        let mut objects = self.objects.borrow_mut();
        let entry = objects.get_mut(&id).ok_or(TreeError::UnknownObject(id))?;
        if value.is_valid() {
            entry.properties.insert(name.to_string(), value);
        } else {
            entry.properties.remove(name);
        }
        Ok(())
    }

    pub fn property_names(&self, id: ObjectId) -> Vec<String> {
        self.objects
            .borrow()
            .get(&id)
            .map(|e| e.properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Concrete Rust type of an object's payload
    pub fn payload_type(&self, id: ObjectId) -> Option<(TypeId, &'static str)> {
        self.objects
            .borrow()
            .get(&id)
            .map(|e| (e.payload_type, e.payload_type_name))
    }

    fn payload_cell(&self, id: ObjectId) -> Option<Payload> {
        if !self.is_alive(id) {
            return None;
        }
        self.objects.borrow().get(&id).map(|e| e.payload.clone())
    }

    /// Borrow a payload as `T`; `None` on type mismatch or conflicting borrow
    pub fn with_payload<T: Any, R>(&self, id: ObjectId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let cell = self.payload_cell(id)?;
        let guard = cell.try_borrow().ok()?;
        (**guard).downcast_ref::<T>().map(f)
    }

    /// Mutably borrow a payload as `T`
    pub fn with_payload_mut<T: Any, R>(&self, id: ObjectId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let cell = self.payload_cell(id)?;
        let mut guard = cell.try_borrow_mut().ok()?;
        (**guard).downcast_mut::<T>().map(f)
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Connect a receiver to one of `sender`'s signals
    pub fn connect(
        &self,
        sender: ObjectId,
        signal: &str,
        receiver: Rc<dyn SlotTarget>,
    ) -> Result<ConnectionId, TreeError> {
        let signature = Signature::parse(signal)?;
        let meta = self.meta(sender).ok_or(TreeError::UnknownObject(sender))?;
        if !meta.has_signal(&signature) {
            return Err(TreeError::UnknownSignal {
                class: meta.name(),
                signal: signature.normalized(),
            });
        }
        if !signature.accepts(receiver.signature()) {
            return Err(TreeError::IncompatibleSlot {
                signal: signature.normalized(),
                slot: receiver.signature().normalized(),
            });
        }

        let id = ConnectionId(self.next_id());
        tracing::debug!("Connected {}::{} -> {}", sender, signature.normalized(), receiver.signature());
        self.connections.borrow_mut().push(Connection {
            id,
            sender,
            signal: signature.normalized(),
            receiver,
        });
        Ok(id)
    }

    /// Remove one connection
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut connections = self.connections.borrow_mut();
            connections
                .iter()
                .position(|c| c.id == id)
                .map(|pos| connections.remove(pos))
        };
        removed.is_some()
    }

    /// Remove every connection of `sender`'s `signal`
    pub fn disconnect_all(&self, sender: ObjectId, signal: &str) -> Result<usize, TreeError> {
        let key = Signature::parse(signal)?.normalized();
        let removed: Vec<Connection> = {
            let mut connections = self.connections.borrow_mut();
            let (gone, kept): (Vec<_>, Vec<_>) = connections
                .drain(..)
                .partition(|c| c.sender == sender && c.signal == key);
            *connections = kept;
            gone
        };
        Ok(removed.len())
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.borrow().iter().any(|c| c.id == id)
    }

    /// Number of connections where `sender` is the emitter
    pub fn connection_count(&self, sender: ObjectId) -> usize {
        self.connections.borrow().iter().filter(|c| c.sender == sender).count()
    }

    /// Emit a signal and return the final content of the return slot.
    ///
    /// Receivers run in connection order and each sees the return slot plus
    /// as many parameters as it declared.
    pub fn emit(&self, sender: ObjectId, signal: &str, params: Vec<ArgSlot>) -> Result<ArgSlot, TreeError> {
        let signature = Signature::parse(signal)?;
        let meta = self.meta(sender).ok_or(TreeError::UnknownObject(sender))?;
        if !meta.has_signal(&signature) {
            return Err(TreeError::UnknownSignal {
                class: meta.name(),
                signal: signature.normalized(),
            });
        }
        if params.len() != signature.arity() {
            return Err(TreeError::ArgumentCount {
                signal: signature.normalized(),
                expected: signature.arity(),
                got: params.len(),
            });
        }
        Ok(self.deliver(sender, &signature, params))
    }

    fn deliver(&self, sender: ObjectId, signature: &Signature, params: Vec<ArgSlot>) -> ArgSlot {
        let key = signature.normalized();
        let receivers: Vec<(ConnectionId, Rc<dyn SlotTarget>)> = self
            .connections
            .borrow()
            .iter()
            .filter(|c| c.sender == sender && c.signal == key)
            .map(|c| (c.id, c.receiver.clone()))
            .collect();

        let mut args: Vec<ArgSlot> = Vec::with_capacity(params.len() + 1);
        args.push(Box::new(()));
        args.extend(params);

        for (connection, receiver) in receivers {
            // An earlier receiver may have disconnected this one.
            if !self.is_connected(connection) {
                continue;
            }
            let arity = receiver.signature().arity().min(args.len() - 1);
            if !receiver.invoke(&mut args[..=arity]) {
                tracing::debug!("Receiver {} failed handling {}", receiver.signature(), key);
            }
        }
        args.swap_remove(0)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Install an event filter on an object
    pub fn install_event_filter(&self, id: ObjectId, filter: Rc<dyn EventFilter>) -> Result<FilterId, TreeError> {
        if !self.is_alive(id) {
            return Err(TreeError::UnknownObject(id));
        }
        let filter_id = FilterId(self.next_id());
        let mut objects = self.objects.borrow_mut();
        let entry = objects.get_mut(&id).ok_or(TreeError::UnknownObject(id))?;
        entry.filters.push((filter_id, filter));
        Ok(filter_id)
    }

    /// Remove an event filter; false if it was not installed
    pub fn remove_event_filter(&self, id: ObjectId, filter: FilterId) -> bool {
        let removed = {
            let mut objects = self.objects.borrow_mut();
            objects.get_mut(&id).and_then(|entry| {
                entry
                    .filters
                    .iter()
                    .position(|(fid, _)| *fid == filter)
                    .map(|pos| entry.filters.remove(pos))
            })
        };
        removed.is_some()
    }

    pub fn event_filter_count(&self, id: ObjectId) -> usize {
        self.objects.borrow().get(&id).map(|e| e.filters.len()).unwrap_or(0)
    }

    /// Deliver an event through the object's filters (newest first).
    ///
    /// Returns true if a filter consumed it.
    pub fn send_event(&self, id: ObjectId, event: &mut Event) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let filters: Vec<Rc<dyn EventFilter>> = match self.objects.borrow().get(&id) {
            Some(entry) => entry.filters.iter().rev().map(|(_, f)| f.clone()).collect(),
            None => return false,
        };
        for filter in filters {
            if filter.event_filter(id, event) {
                return true;
            }
        }
        false
    }
}
