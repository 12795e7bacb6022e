//! Bridge Context
//!
//! Ties the object tree, the binding registry and the lifetime tracker
//! together and holds the interpreter's pending exception. Every bridge
//! operation goes through a [`Bridge`]; there is no global state.

use crate::builtins::{OPAQUE_OBJECT, OPAQUE_VALUE};
use crate::cell::TypedCell;
use crate::config::BridgeConfig;
use crate::dispatch::{CallContext, DispatchTable, Method, Returned};
use crate::error::{CallError, ConnectError, ConstructError};
use crate::handle::{native_to_call_error, ObjectHandle, Ownership};
use crate::lifetime::LifetimeTracker;
use crate::registry::BindingRegistry;
use crate::slot_proxy::{SlotCallee, SlotProxy};
use crate::value::{ScriptException, ScriptFunction, ScriptValue};
use bindkit_object::{ConnectionId, DestroyObserver, ObjectId, ObjectTree, Signature};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ptr;
use std::rc::{Rc, Weak};

/// Receiving end of a script-side connection
#[derive(Clone, Debug)]
pub enum ConnectTarget {
    /// Call a script function with the signal's arguments
    Function(ScriptFunction),
    /// Call a bound method of another handle; `slot` is its signature
    Method { handle: ObjectHandle, slot: String },
}

struct ConnectionRecord {
    id: ConnectionId,
    sender: ObjectId,
    signal: String,
    receiver: Option<ObjectId>,
    proxy: Weak<SlotProxy>,
}

pub(crate) struct BridgeShared {
    pub(crate) tree: Rc<ObjectTree>,
    pub(crate) registry: BindingRegistry,
    pub(crate) tracker: LifetimeTracker,
    pub(crate) config: BridgeConfig,
    exception: RefCell<Option<ScriptException>>,
    connections: RefCell<Vec<ConnectionRecord>>,
    next_serial: Cell<u64>,
}

impl DestroyObserver for BridgeShared {
    fn object_destroyed(&self, id: ObjectId) {
        self.tracker.notify_destroyed(id);

        // Connections into the dying object go with it; the tree already
        // drops the ones it sends.
        let inbound: Vec<ConnectionId> = {
            let mut records = self.connections.borrow_mut();
            let mut inbound = Vec::new();
            records.retain(|record| {
                if record.sender == id {
                    return false;
                }
                if record.receiver == Some(id) {
                    inbound.push(record.id);
                    return false;
                }
                record.proxy.strong_count() > 0
            });
            inbound
        };
        for connection in inbound {
            self.tree.disconnect(connection);
        }
    }
}

/// Script/native interop context
#[derive(Clone)]
pub struct Bridge {
    shared: Rc<BridgeShared>,
}

impl Bridge {
    /// Create a bridge over `tree` with a fully populated registry
    pub fn new(tree: Rc<ObjectTree>, registry: BindingRegistry, config: BridgeConfig) -> Self {
        let shared = Rc::new(BridgeShared {
            tree,
            registry,
            tracker: LifetimeTracker::new(),
            config,
            exception: RefCell::new(None),
            connections: RefCell::new(Vec::new()),
            next_serial: Cell::new(0),
        });
        let observer: Rc<dyn DestroyObserver> = shared.clone();
        shared.tree.add_destroy_observer(Rc::downgrade(&observer));
        tracing::info!("Bridge ready with {} bindings", shared.registry.len());
        Self { shared }
    }

    pub(crate) fn from_shared(shared: Rc<BridgeShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<BridgeShared> {
        Rc::downgrade(&self.shared)
    }

    pub fn tree(&self) -> &Rc<ObjectTree> {
        &self.shared.tree
    }

    pub fn registry(&self) -> &BindingRegistry {
        &self.shared.registry
    }

    pub fn tracker(&self) -> &LifetimeTracker {
        &self.shared.tracker
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    // ========================================================================
    // Handles
    // ========================================================================

    fn next_serial(&self) -> u64 {
        let serial = self.shared.next_serial.get() + 1;
        self.shared.next_serial.set(serial);
        serial
    }

    /// Wrap a cell in a new handle, watch it and run the bind hook
    pub(crate) fn adopt(&self, table: &'static DispatchTable, cell: TypedCell, ownership: Ownership) -> ObjectHandle {
        let handle = ObjectHandle::new(self, self.next_serial(), table, cell, ownership);
        self.shared.tracker.watch(&handle);
        tracing::trace!("New {} handle ({:?})", table.name, ownership);

        if let Some(bind) = table.constructor.and_then(|c| c.bind) {
            if let Err(err) = bind(self, &handle) {
                tracing::warn!("Bind hook of {} failed: {}", table.name, err);
            }
        }
        handle
    }

    /// Construct a registered type from script arguments
    pub fn construct(&self, type_name: &str, args: &[ScriptValue]) -> Result<ObjectHandle, ConstructError> {
        let table = self
            .registry()
            .get(type_name)
            .ok_or_else(|| ConstructError::UnknownType(type_name.to_string()))?;
        let constructor = table.constructor.ok_or_else(|| ConstructError::NativeConstructionFailed {
            type_name: table.name,
            reason: "type has no constructor".into(),
        })?;
        if !self.config().arity_ok(constructor.arity, args.len()) {
            return Err(ConstructError::ArityMismatch {
                type_name: table.name,
                expected: constructor.arity,
                got: args.len(),
            });
        }

        let ctx = CallContext::new(self, None, args);
        let returned = (constructor.construct)(&ctx).map_err(|err| ConstructError::NativeConstructionFailed {
            type_name: table.name,
            reason: err.to_string(),
        })?;

        let handle = match returned {
            Returned::Inline { type_name: inline_name, cell } => {
                let bound = self.registry().get(inline_name).unwrap_or(table);
                self.adopt(bound, cell, Ownership::ScriptOwned)
            }
            Returned::Object { id, ownership } => {
                if !self.tree().is_alive(id) {
                    return Err(ConstructError::NativeConstructionFailed {
                        type_name: table.name,
                        reason: format!("constructor returned dead {}", id),
                    });
                }
                let ownership = ownership.unwrap_or_else(|| match self.tree().parent(id) {
                    Some(_) => Ownership::ParentOwned,
                    None => Ownership::ScriptOwned,
                });
                let cell = TypedCell::pointer(self.tree(), id, ownership == Ownership::ScriptOwned);
                self.adopt(table, cell, ownership)
            }
            Returned::Value(ScriptValue::Native(handle)) => handle,
            Returned::Value(other) => {
                return Err(ConstructError::NativeConstructionFailed {
                    type_name: table.name,
                    reason: format!("constructor returned a {}", other.type_of()),
                })
            }
        };
        tracing::debug!("Constructed {} ({:?})", type_name, handle.ownership());
        Ok(handle)
    }

    /// Nearest registered binding for a native class, or the opaque fallback
    pub fn resolve_table(&self, id: ObjectId) -> Option<&'static DispatchTable> {
        let meta = self.tree().meta(id)?;
        match self.registry().resolve_class(meta, self.config().max_class_depth) {
            Some(table) => Some(table),
            None => {
                tracing::trace!("No binding for {} or its superclasses", meta.name());
                Some(&OPAQUE_OBJECT)
            }
        }
    }

    /// Wrap a tree object in a fresh handle.
    ///
    /// Without explicit ownership a parented object is parent-owned and a
    /// top-level one native-owned.
    pub fn wrap_object(&self, id: ObjectId, ownership: Option<Ownership>) -> Result<ObjectHandle, CallError> {
        let table = self
            .resolve_table(id)
            .ok_or(CallError::DeadObject { type_name: "Object" })?;
        let ownership = ownership.unwrap_or_else(|| match self.tree().parent(id) {
            Some(_) => Ownership::ParentOwned,
            None => Ownership::NativeOwned,
        });
        let cell = TypedCell::pointer(self.tree(), id, ownership == Ownership::ScriptOwned);
        Ok(self.adopt(table, cell, ownership))
    }

    /// Wrap an inline value in a script-owned handle bound as `type_name`
    pub fn wrap_value<T: Any>(&self, type_name: &str, value: T) -> ObjectHandle {
        let table = self.registry().get(type_name).unwrap_or(&OPAQUE_VALUE);
        self.adopt(table, TypedCell::value(value), Ownership::ScriptOwned)
    }

    /// Turn a callback result into a script value
    pub(crate) fn lower(&self, returned: Returned) -> ScriptValue {
        match returned {
            Returned::Value(value) => value,
            Returned::Inline { type_name, cell } => {
                let table = self.registry().get(type_name).unwrap_or(&OPAQUE_VALUE);
                ScriptValue::Native(self.adopt(table, cell, Ownership::ScriptOwned))
            }
            Returned::Object { id, ownership } => match self.wrap_object(id, ownership) {
                Ok(handle) => ScriptValue::Native(handle),
                Err(err) => {
                    tracing::debug!("Returned object not wrapped: {}", err);
                    ScriptValue::Null
                }
            },
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Tables consulted for a handle's methods, most specific first
    pub(crate) fn method_chain(&self, handle: &ObjectHandle) -> Vec<&'static DispatchTable> {
        let max = self.config().max_class_depth;
        let registry = self.registry();
        let mut chain = Vec::new();
        registry.extend_chain(&mut chain, handle.table(), max);

        if let Some(id) = handle.object_id() {
            if let Some(meta) = self.tree().meta(id) {
                for class in meta.ancestors().take(max) {
                    if let Some(table) = registry.get(class.name()) {
                        registry.extend_chain(&mut chain, table, max);
                    }
                }
            }
            if !chain.iter().any(|t| ptr::eq(*t, &OPAQUE_OBJECT)) {
                chain.push(&OPAQUE_OBJECT);
            }
        }
        chain
    }

    pub(crate) fn resolve_method(&self, handle: &ObjectHandle, name: &str) -> Option<&'static Method> {
        self.method_chain(handle)
            .into_iter()
            .find_map(|table| table.method(name))
    }

    fn static_method(&self, table: &'static DispatchTable, name: &str) -> Option<&'static Method> {
        let mut chain = Vec::new();
        self.registry()
            .extend_chain(&mut chain, table, self.config().max_class_depth);
        chain.into_iter().find_map(|t| t.static_method(name))
    }

    /// Call a static function of a registered type
    pub fn call_static(&self, type_name: &str, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, CallError> {
        let table = self
            .registry()
            .get(type_name)
            .ok_or_else(|| CallError::UnknownType(type_name.to_string()))?;
        let method = self.static_method(table, name).ok_or_else(|| CallError::NoSuchMethod {
            type_name: table.name,
            method: name.to_string(),
        })?;
        let arity_ok = if method.is_varargs() {
            args.len() >= method.arity
        } else {
            self.config().arity_ok(method.arity, args.len())
        };
        if !arity_ok {
            return Err(CallError::ArityMismatch {
                method: format!("{}.{}", table.name, name),
                expected: method.arity,
                got: args.len(),
            });
        }
        if self.config().trace_calls {
            tracing::trace!("{}::{}({} args)", table.name, name, args.len());
        }
        let ctx = CallContext::new(self, None, args);
        let returned = (method.callback)(&ctx).map_err(native_to_call_error)?;
        Ok(self.lower(returned))
    }

    /// Enumerator value of a registered type (or one of its bases)
    pub fn enum_value(&self, type_name: &str, name: &str) -> Option<i64> {
        let table = self.registry().get(type_name)?;
        let mut chain = Vec::new();
        self.registry()
            .extend_chain(&mut chain, table, self.config().max_class_depth);
        chain.into_iter().find_map(|t| t.enum_value(name))
    }

    // ========================================================================
    // Interpreter exception state
    // ========================================================================

    /// Call a script function; a thrown exception is also left pending
    pub fn call_function(&self, function: &ScriptFunction, args: &[ScriptValue]) -> Result<ScriptValue, ScriptException> {
        function.call(args).inspect_err(|exc| self.throw(exc.clone()))
    }

    /// Set the pending exception
    pub fn throw(&self, exception: ScriptException) {
        *self.shared.exception.borrow_mut() = Some(exception);
    }

    pub fn has_exception(&self) -> bool {
        self.shared.exception.borrow().is_some()
    }

    pub fn take_exception(&self) -> Option<ScriptException> {
        self.shared.exception.borrow_mut().take()
    }

    pub fn clear_exception(&self) {
        self.shared.exception.borrow_mut().take();
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Connect one of `sender`'s signals to a script target
    pub fn connect(&self, sender: &ObjectHandle, signal: &str, target: ConnectTarget) -> Result<ConnectionId, ConnectError> {
        let sender_id = sender.live_object_id()?;
        let signal_sig = Signature::parse(signal)?;

        let (slot_sig, callee, receiver) = match target {
            ConnectTarget::Function(function) => (signal_sig.clone(), SlotCallee::Function(function), None),
            ConnectTarget::Method { handle, slot } => {
                if handle.is_zombie() {
                    return Err(CallError::DeadObject {
                        type_name: handle.type_name(),
                    }
                    .into());
                }
                let slot_sig = Signature::parse(&slot)?;
                if self.resolve_method(&handle, slot_sig.name()).is_none() {
                    return Err(ConnectError::NoSuchSlot {
                        type_name: handle.type_name(),
                        slot: slot_sig.normalized(),
                    });
                }
                let receiver = handle.object_id();
                let callee = SlotCallee::Method {
                    target: handle.downgrade(),
                    object: receiver,
                    method: slot_sig.name().to_string(),
                };
                (slot_sig, callee, receiver)
            }
        };

        let proxy = Rc::new(SlotProxy::new(self, slot_sig, callee));
        let id = self.tree().connect(sender_id, signal, proxy.clone())?;
        self.shared.connections.borrow_mut().push(ConnectionRecord {
            id,
            sender: sender_id,
            signal: signal_sig.normalized(),
            receiver,
            proxy: Rc::downgrade(&proxy),
        });
        Ok(id)
    }

    /// Remove a connection made through [`Bridge::connect`]
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.shared.connections.borrow_mut().retain(|r| r.id != id);
        self.tree().disconnect(id)
    }

    /// Remove every connection of `sender`'s `signal` to `function`
    pub fn disconnect_function(&self, sender: &ObjectHandle, signal: &str, function: &ScriptFunction) -> Result<usize, ConnectError> {
        let sender_id = sender.live_object_id()?;
        let key = Signature::parse(signal)?.normalized();
        let matching: Vec<ConnectionId> = self
            .shared
            .connections
            .borrow()
            .iter()
            .filter(|r| r.sender == sender_id && r.signal == key)
            .filter(|r| r.proxy.upgrade().is_some_and(|p| p.calls_function(function)))
            .map(|r| r.id)
            .collect();
        Ok(matching.into_iter().filter(|id| self.disconnect(*id)).count())
    }

    /// Slot proxy behind a connection, while it is connected
    pub fn slot_proxy(&self, id: ConnectionId) -> Option<Rc<SlotProxy>> {
        self.shared
            .connections
            .borrow()
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.proxy.upgrade())
    }
}
