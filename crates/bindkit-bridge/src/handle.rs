//! Object Handles
//!
//! The script-visible wrapper around a [`TypedCell`]. A handle knows who may
//! release its payload, turns into a zombie when the native object dies
//! first, and routes property access to event handlers, native dynamic
//! properties or script-side expandos.

use crate::bridge::{Bridge, BridgeShared};
use crate::cell::{CellKind, TypedCell};
use crate::convert::{script_to_variant, variant_to_script};
use crate::dispatch::{CallContext, DispatchTable};
use crate::error::{CallError, CastError, NativeError};
use crate::event_map;
use crate::event_proxy::EventProxy;
use crate::value::{ScriptException, ScriptFunction, ScriptValue};
use bindkit_object::{EventType, ObjectId};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Who is allowed to free the wrapped payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Native code owns it; script never frees it
    NativeOwned,
    /// A native parent owns it and will destroy it with itself
    ParentOwned,
    /// The handle frees it when the last script reference goes away
    ScriptOwned,
}

pub(crate) struct HandleState {
    bridge: Weak<BridgeShared>,
    serial: u64,
    table: &'static DispatchTable,
    cell: RefCell<TypedCell>,
    ownership: Cell<Ownership>,
    zombie: Cell<bool>,
    expandos: RefCell<BTreeMap<String, ScriptValue>>,
    events: RefCell<Option<Rc<EventProxy>>>,
}

impl HandleState {
    /// Mark dead without releasing anything. Returns false if already dead.
    pub(crate) fn kill(&self) -> bool {
        if self.zombie.replace(true) {
            return false;
        }
        if let Ok(mut cell) = self.cell.try_borrow_mut() {
            cell.forget();
        }
        let proxy = self.events.try_borrow_mut().ok().and_then(|mut events| events.take());
        if let Some(proxy) = proxy {
            proxy.detach();
        }
        true
    }
}

impl Drop for HandleState {
    fn drop(&mut self) {
        if let Some(proxy) = self.events.get_mut().take() {
            proxy.detach();
        }

        let cell = self.cell.get_mut();
        if let Some(id) = cell.object_id() {
            if let Some(shared) = self.bridge.upgrade() {
                shared.tracker.unwatch_handle(id, self.serial);
            }
        }

        if self.zombie.get() || self.ownership.get() != Ownership::ScriptOwned {
            return;
        }
        cell.set_owning(true);
        if cell.release() {
            tracing::debug!("Released {} on last script reference", self.table.name);
        }
    }
}

/// Script-visible wrapper around a native object or value
#[derive(Clone)]
pub struct ObjectHandle(Rc<HandleState>);

impl ObjectHandle {
    pub(crate) fn new(
        bridge: &Bridge,
        serial: u64,
        table: &'static DispatchTable,
        mut cell: TypedCell,
        ownership: Ownership,
    ) -> Self {
        cell.set_owning(ownership == Ownership::ScriptOwned);
        ObjectHandle(Rc::new(HandleState {
            bridge: bridge.downgrade(),
            serial,
            table,
            cell: RefCell::new(cell),
            ownership: Cell::new(ownership),
            zombie: Cell::new(false),
            expandos: RefCell::new(BTreeMap::new()),
            events: RefCell::new(None),
        }))
    }

    pub(crate) fn state(&self) -> &Rc<HandleState> {
        &self.0
    }

    pub(crate) fn serial(&self) -> u64 {
        self.0.serial
    }

    pub(crate) fn from_weak(weak: &Weak<HandleState>) -> Option<Self> {
        weak.upgrade().map(ObjectHandle)
    }

    pub fn downgrade(&self) -> WeakObjectHandle {
        WeakObjectHandle {
            state: Rc::downgrade(&self.0),
            type_name: self.type_name(),
        }
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Name of the binding this handle dispatches through
    pub fn type_name(&self) -> &'static str {
        self.0.table.name
    }

    pub fn table(&self) -> &'static DispatchTable {
        self.0.table
    }

    pub fn ownership(&self) -> Ownership {
        self.0.ownership.get()
    }

    pub fn is_zombie(&self) -> bool {
        self.0.zombie.get()
    }

    pub fn kind(&self) -> CellKind {
        self.0.cell.borrow().kind()
    }

    /// Wrapped tree object; `None` for values and zombies
    pub fn object_id(&self) -> Option<ObjectId> {
        if self.is_zombie() {
            return None;
        }
        self.0.cell.try_borrow().ok().and_then(|cell| cell.object_id())
    }

    /// Wrapped tree object, or why there is none
    pub fn live_object_id(&self) -> Result<ObjectId, CallError> {
        if self.is_zombie() {
            return Err(self.dead());
        }
        self.object_id().ok_or(CallError::NotAnObject {
            type_name: self.type_name(),
        })
    }

    /// Native class of the wrapped object
    pub fn class_name(&self) -> Option<&'static str> {
        let id = self.object_id()?;
        self.bridge()?.tree().class_name(id)
    }

    /// Same handle (not merely the same object)
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Both handles wrap the same live tree object
    pub fn same_object(&self, other: &ObjectHandle) -> bool {
        match (self.object_id(), other.object_id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn bridge(&self) -> Option<Bridge> {
        self.0.bridge.upgrade().map(Bridge::from_shared)
    }

    fn dead(&self) -> CallError {
        CallError::DeadObject {
            type_name: self.type_name(),
        }
    }

    fn live_bridge(&self) -> Result<Bridge, CallError> {
        if self.is_zombie() {
            return Err(self.dead());
        }
        let bridge = self.bridge().ok_or_else(|| self.dead())?;
        if let Some(id) = self.object_id() {
            if !bridge.tree().is_alive(id) {
                return Err(self.dead());
            }
        }
        Ok(bridge)
    }

    pub(crate) fn set_ownership(&self, ownership: Ownership) {
        self.0.ownership.set(ownership);
        if let Ok(mut cell) = self.0.cell.try_borrow_mut() {
            cell.set_owning(ownership == Ownership::ScriptOwned);
        }
    }

    // ========================================================================
    // Inline values
    // ========================================================================

    /// Borrow the inline value as `T`
    pub fn with_value<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, CastError> {
        let cell = self.0.cell.try_borrow().map_err(|_| busy::<T>())?;
        cell.cast::<T>().map(f)
    }

    /// Mutably borrow the inline value as `T`
    pub fn with_value_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, CastError> {
        let mut cell = self.0.cell.try_borrow_mut().map_err(|_| busy::<T>())?;
        let found = cell.type_tag().map(|t| t.name()).unwrap_or("null");
        cell.value_mut::<T>().map(f).ok_or(CastError {
            expected: std::any::type_name::<T>(),
            found,
        })
    }

    /// Replace the payload with an inline value.
    ///
    /// The old payload is released if this handle owned it. The handle is
    /// script-owned afterwards. Event handlers are dropped, since a value
    /// receives no events.
    pub fn set_value<T: Any>(&self, value: T) -> Result<(), CallError> {
        if self.is_zombie() {
            return Err(self.dead());
        }
        drop(self.detach_events());
        let mut old = {
            let mut cell = self
                .0
                .cell
                .try_borrow_mut()
                .map_err(|_| CallError::NativeException("object is busy".into()))?;
            std::mem::replace(&mut *cell, TypedCell::value(value))
        };
        if let Some(id) = old.object_id() {
            if let Some(shared) = self.0.bridge.upgrade() {
                shared.tracker.unwatch_handle(id, self.0.serial);
            }
        }
        if self.ownership() == Ownership::ScriptOwned {
            old.set_owning(true);
            old.release();
        }
        self.set_ownership(Ownership::ScriptOwned);
        Ok(())
    }

    /// Point the handle at another tree object.
    ///
    /// The old payload is released if this handle owned it. Ownership of the
    /// new object is inferred from whether it has a parent. Event handlers
    /// move to the new object.
    pub fn set_object(&self, id: ObjectId) -> Result<(), CallError> {
        let bridge = self.live_bridge()?;
        if !bridge.tree().is_alive(id) {
            return Err(CallError::DeadObject {
                type_name: self.type_name(),
            });
        }
        if self.object_id() == Some(id) {
            return Ok(());
        }
        let handlers = self.detach_events();
        let ownership = match bridge.tree().parent(id) {
            Some(_) => Ownership::ParentOwned,
            None => Ownership::NativeOwned,
        };
        let mut old = {
            let mut cell = self
                .0
                .cell
                .try_borrow_mut()
                .map_err(|_| CallError::NativeException("object is busy".into()))?;
            std::mem::replace(&mut *cell, TypedCell::pointer(bridge.tree(), id, false))
        };
        if let Some(old_id) = old.object_id() {
            bridge.tracker().unwatch_handle(old_id, self.0.serial);
        }
        if self.ownership() == Ownership::ScriptOwned {
            old.set_owning(true);
            old.release();
        }
        self.set_ownership(ownership);
        bridge.tracker().watch(self);
        for (kind, handler) in handlers {
            self.set_event_handler(&bridge, kind, ScriptValue::Function(handler))?;
        }
        Ok(())
    }

    /// Free the payload from script. Only script-owned handles may do this;
    /// the handle is dead afterwards.
    pub fn release(&self) -> Result<bool, CallError> {
        if self.is_zombie() {
            return Err(self.dead());
        }
        let ownership = self.ownership();
        if ownership != Ownership::ScriptOwned {
            return Err(CallError::OwnershipViolation { ownership });
        }
        let mut cell = {
            let mut cell = self
                .0
                .cell
                .try_borrow_mut()
                .map_err(|_| CallError::NativeException("object is busy".into()))?;
            std::mem::take(&mut *cell)
        };
        if let Some(id) = cell.object_id() {
            if let Some(shared) = self.0.bridge.upgrade() {
                shared.tracker.unwatch_handle(id, self.0.serial);
            }
        }
        self.0.zombie.set(true);
        cell.set_owning(true);
        Ok(cell.release())
    }

    // ========================================================================
    // Methods
    // ========================================================================

    /// Call a bound method
    pub fn call(&self, method: &str, args: &[ScriptValue]) -> Result<ScriptValue, CallError> {
        let bridge = self.live_bridge()?;
        let found = bridge.resolve_method(self, method).ok_or_else(|| CallError::NoSuchMethod {
            type_name: self.type_name(),
            method: method.to_string(),
        })?;

        let arity_ok = if found.is_varargs() {
            args.len() >= found.arity
        } else {
            bridge.config().arity_ok(found.arity, args.len())
        };
        if !arity_ok {
            return Err(CallError::ArityMismatch {
                method: format!("{}.{}", self.type_name(), method),
                expected: found.arity,
                got: args.len(),
            });
        }

        if bridge.config().trace_calls {
            tracing::trace!("{}.{}({} args)", self.type_name(), method, args.len());
        }
        let ctx = CallContext::new(&bridge, Some(self), args);
        let returned = (found.callback)(&ctx).map_err(native_to_call_error)?;
        Ok(bridge.lower(returned))
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.bridge()
            .is_some_and(|bridge| bridge.resolve_method(self, name).is_some())
    }

    /// Enumerable method names across the whole dispatch chain
    pub fn method_names(&self) -> Vec<&'static str> {
        let Some(bridge) = self.bridge() else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for table in bridge.method_chain(self) {
            for method in table.methods.iter().filter(|m| m.is_enumerable()) {
                if !names.contains(&method.name) {
                    names.push(method.name);
                }
            }
        }
        names
    }

    fn bound_method(&self, name: &str) -> ScriptFunction {
        let weak = Rc::downgrade(&self.0);
        let method = name.to_string();
        ScriptFunction::new(name, move |args| {
            let handle = ObjectHandle::from_weak(&weak)
                .ok_or_else(|| ScriptException::error(format!("{} called on a collected object", method)))?;
            handle.call(&method, args).map_err(ScriptException::from)
        })
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Read a property: event handler, native property, expando or method
    pub fn get(&self, name: &str) -> Result<ScriptValue, CallError> {
        let bridge = self.live_bridge()?;

        if let Some(kind) = event_map::event_type_for(name) {
            let handler = self.0.events.borrow().as_ref().and_then(|p| p.handler(kind));
            return Ok(handler.map(ScriptValue::Function).unwrap_or_default());
        }
        if let Some(id) = self.object_id() {
            if let Some(value) = bridge.tree().property(id, name) {
                return Ok(variant_to_script(&bridge, &value));
            }
        }
        if let Some(value) = self.0.expandos.borrow().get(name) {
            return Ok(value.clone());
        }
        if bridge.resolve_method(self, name).is_some() {
            return Ok(ScriptValue::Function(self.bound_method(name)));
        }
        Ok(ScriptValue::Undefined)
    }

    /// Write a property.
    ///
    /// Handler names install or remove event handlers; existing native
    /// properties are converted and written through; anything else is kept
    /// as an expando. Assigning `undefined` deletes an expando.
    pub fn put(&self, name: &str, value: ScriptValue) -> Result<(), CallError> {
        let bridge = self.live_bridge()?;

        if let Some(kind) = event_map::event_type_for(name) {
            return self.set_event_handler(&bridge, kind, value);
        }
        if let Some(id) = self.object_id() {
            if bridge.tree().property(id, name).is_some() {
                bridge
                    .tree()
                    .set_property(id, name, script_to_variant(&value))
                    .map_err(|err| CallError::NativeException(err.to_string()))?;
                return Ok(());
            }
        }
        if bridge.resolve_method(self, name).is_some() {
            tracing::debug!("Ignoring write to read-only {}.{}", self.type_name(), name);
            return Ok(());
        }

        let old = if value.is_undefined() {
            self.0.expandos.borrow_mut().remove(name)
        } else {
            self.0.expandos.borrow_mut().insert(name.to_string(), value)
        };
        drop(old);
        Ok(())
    }

    /// Expando names, sorted
    pub fn expando_names(&self) -> Vec<String> {
        self.0.expandos.borrow().keys().cloned().collect()
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn set_event_handler(&self, bridge: &Bridge, kind: EventType, value: ScriptValue) -> Result<(), CallError> {
        let id = self.live_object_id()?;
        match value {
            ScriptValue::Function(handler) => {
                let proxy = {
                    let mut events = self.0.events.borrow_mut();
                    events
                        .get_or_insert_with(|| EventProxy::new(bridge, id, self))
                        .clone()
                };
                let result = proxy.add_filter(kind, handler);
                if proxy.is_empty() {
                    let gone = self.0.events.borrow_mut().take();
                    drop(gone);
                }
                result.map_err(|err| CallError::NativeException(err.to_string()))
            }
            _ => {
                let proxy = self.0.events.borrow().clone();
                if let Some(proxy) = proxy {
                    proxy.remove_filter(kind);
                    if proxy.is_empty() {
                        let gone = self.0.events.borrow_mut().take();
                        drop(gone);
                    }
                }
                Ok(())
            }
        }
    }

    /// Take the event proxy off the watched object, keeping its handlers
    fn detach_events(&self) -> BTreeMap<EventType, ScriptFunction> {
        let proxy = self.0.events.borrow_mut().take();
        proxy.map(|proxy| proxy.detach()).unwrap_or_default()
    }

    /// Event types with an installed script handler
    pub fn subscribed_events(&self) -> Vec<EventType> {
        self.0
            .events
            .borrow()
            .as_ref()
            .map(|proxy| proxy.subscribed())
            .unwrap_or_default()
    }

    pub fn has_event_proxy(&self) -> bool {
        self.0.events.borrow().is_some()
    }

    /// Event proxy, present while any handler is installed
    pub fn event_proxy(&self) -> Option<Rc<EventProxy>> {
        self.0.events.borrow().clone()
    }

    // ========================================================================
    // Tree structure
    // ========================================================================

    /// Reparent the native object.
    ///
    /// A parented object is owned by its parent; a top-level one by script.
    pub fn set_parent(&self, parent: Option<&ObjectHandle>) -> Result<(), CallError> {
        let bridge = self.live_bridge()?;
        let id = self.live_object_id()?;
        let parent_id = parent.map(ObjectHandle::live_object_id).transpose()?;
        bridge
            .tree()
            .set_parent(id, parent_id)
            .map_err(|err| CallError::NativeException(err.to_string()))?;
        self.set_ownership(match parent_id {
            Some(_) => Ownership::ParentOwned,
            None => Ownership::ScriptOwned,
        });
        Ok(())
    }

    pub fn parent(&self) -> Result<Option<ObjectHandle>, CallError> {
        let bridge = self.live_bridge()?;
        let id = self.live_object_id()?;
        match bridge.tree().parent(id) {
            Some(parent) => bridge.wrap_object(parent, None).map(Some),
            None => Ok(None),
        }
    }

    /// Fresh handles for the direct children
    pub fn children(&self) -> Result<Vec<ObjectHandle>, CallError> {
        let bridge = self.live_bridge()?;
        let id = self.live_object_id()?;
        bridge
            .tree()
            .children(id)
            .into_iter()
            .map(|child| bridge.wrap_object(child, None))
            .collect()
    }

    /// Depth-first search of descendants by object name
    pub fn find_child(&self, name: &str) -> Result<Option<ObjectHandle>, CallError> {
        let bridge = self.live_bridge()?;
        let id = self.live_object_id()?;
        match bridge.tree().find_child(id, name) {
            Some(child) => bridge.wrap_object(child, None).map(Some),
            None => Ok(None),
        }
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Non-owning reference to a handle; does not keep the payload alive
#[derive(Clone)]
pub struct WeakObjectHandle {
    state: Weak<HandleState>,
    type_name: &'static str,
}

impl WeakObjectHandle {
    pub fn upgrade(&self) -> Option<ObjectHandle> {
        ObjectHandle::from_weak(&self.state)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for WeakObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObjectHandle")
            .field("type", &self.type_name)
            .field("alive", &(self.state.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ObjectHandle");
        s.field("type", &self.type_name());
        if let Some(id) = self.object_id() {
            s.field("object", &id);
        }
        s.field("ownership", &self.ownership())
            .field("zombie", &self.is_zombie())
            .finish()
    }
}

fn busy<T: Any>() -> CastError {
    CastError {
        expected: std::any::type_name::<T>(),
        found: "value already borrowed",
    }
}

pub(crate) fn native_to_call_error(err: NativeError) -> CallError {
    match err {
        NativeError::Call(inner) => *inner,
        NativeError::Cast(cast) => CallError::Cast(cast),
        other => CallError::NativeException(other.to_string()),
    }
}
