//! Dispatch Tables
//!
//! Static, per-type binding descriptors: methods, static functions,
//! enumerators and an optional constructor. Tables are plain `static`s built
//! with const builders and registered by name.

use crate::bridge::Bridge;
use crate::cell::TypedCell;
use crate::error::{CastError, NativeError};
use crate::handle::{ObjectHandle, Ownership};
use crate::value::ScriptValue;
use bindkit_object::{ObjectId, ObjectTree};
use std::any::Any;
use std::fmt;
use std::ops::BitOr;

/// Native callback behind a method, static or constructor
pub type NativeMethod = fn(&CallContext<'_>) -> Result<Returned, NativeError>;

/// Post-construction hook, run once per new handle of the table's type
pub type BindHook = fn(&Bridge, &ObjectHandle) -> Result<(), NativeError>;

/// Method attribute flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodFlags(u8);

impl MethodFlags {
    pub const NONE: Self = MethodFlags(0);
    pub const READ_ONLY: Self = MethodFlags(1);
    pub const DONT_DELETE: Self = MethodFlags(2);
    pub const DONT_ENUM: Self = MethodFlags(4);
    /// Accept any number of arguments at or above the declared arity
    pub const VARARGS: Self = MethodFlags(8);

    pub const fn union(self, other: Self) -> Self {
        MethodFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MethodFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// One bound method
#[derive(Clone, Copy)]
pub struct Method {
    pub name: &'static str,
    pub arity: usize,
    pub flags: MethodFlags,
    pub callback: NativeMethod,
}

impl Method {
    /// Read-only, undeletable method
    pub const fn new(name: &'static str, arity: usize, callback: NativeMethod) -> Self {
        Self {
            name,
            arity,
            flags: MethodFlags::READ_ONLY.union(MethodFlags::DONT_DELETE),
            callback,
        }
    }

    pub const fn with_flags(self, flags: MethodFlags) -> Self {
        Self { flags, ..self }
    }

    pub const fn is_varargs(&self) -> bool {
        self.flags.contains(MethodFlags::VARARGS)
    }

    pub const fn is_enumerable(&self) -> bool {
        !self.flags.contains(MethodFlags::DONT_ENUM)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Named integer constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enumerator {
    pub name: &'static str,
    pub value: i64,
}

impl Enumerator {
    pub const fn new(name: &'static str, value: i64) -> Self {
        Self { name, value }
    }
}

/// Script-visible constructor
#[derive(Clone, Copy)]
pub struct Constructor {
    pub arity: usize,
    pub construct: NativeMethod,
    pub bind: Option<BindHook>,
}

impl Constructor {
    pub const fn new(arity: usize, construct: NativeMethod) -> Self {
        Self {
            arity,
            construct,
            bind: None,
        }
    }

    pub const fn with_bind(self, bind: BindHook) -> Self {
        Self {
            bind: Some(bind),
            ..self
        }
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("arity", &self.arity)
            .field("bind", &self.bind.is_some())
            .finish()
    }
}

/// Binding descriptor for one native type
#[derive(Debug)]
pub struct DispatchTable {
    pub name: &'static str,
    /// Table consulted when a name is not found here
    pub base: Option<&'static str>,
    pub methods: &'static [Method],
    pub statics: &'static [Method],
    pub enums: &'static [Enumerator],
    pub constructor: Option<Constructor>,
}

impl DispatchTable {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            base: None,
            methods: &[],
            statics: &[],
            enums: &[],
            constructor: None,
        }
    }

    pub const fn with_base(self, base: &'static str) -> Self {
        Self {
            base: Some(base),
            ..self
        }
    }

    pub const fn with_methods(self, methods: &'static [Method]) -> Self {
        Self { methods, ..self }
    }

    pub const fn with_statics(self, statics: &'static [Method]) -> Self {
        Self { statics, ..self }
    }

    pub const fn with_enums(self, enums: &'static [Enumerator]) -> Self {
        Self { enums, ..self }
    }

    pub const fn with_constructor(self, constructor: Constructor) -> Self {
        Self {
            constructor: Some(constructor),
            ..self
        }
    }

    /// First method with this name declared on this table
    pub fn method(&self, name: &str) -> Option<&'static Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn static_method(&self, name: &str) -> Option<&'static Method> {
        self.statics.iter().find(|m| m.name == name)
    }

    pub fn enum_value(&self, name: &str) -> Option<i64> {
        self.enums.iter().find(|e| e.name == name).map(|e| e.value)
    }
}

// ============================================================================
// Call results
// ============================================================================

/// What a native callback hands back to the bridge
pub enum Returned {
    /// Plain script value
    Value(ScriptValue),
    /// Newly created inline value, wrapped as a script-owned handle
    Inline { type_name: &'static str, cell: TypedCell },
    /// Tree object; `None` lets the bridge infer ownership from the parent
    Object {
        id: ObjectId,
        ownership: Option<Ownership>,
    },
}

impl Returned {
    pub fn undefined() -> Self {
        Returned::Value(ScriptValue::Undefined)
    }

    /// New inline value bound as `type_name`
    pub fn inline<T: Any>(type_name: &'static str, value: T) -> Self {
        Returned::Inline {
            type_name,
            cell: TypedCell::value(value),
        }
    }

    /// Existing tree object with inferred ownership
    pub fn object(id: ObjectId) -> Self {
        Returned::Object { id, ownership: None }
    }

    /// Tree object with explicit ownership
    pub fn object_owned(id: ObjectId, ownership: Ownership) -> Self {
        Returned::Object {
            id,
            ownership: Some(ownership),
        }
    }
}

impl<T: Into<ScriptValue>> From<T> for Returned {
    fn from(value: T) -> Self {
        Returned::Value(value.into())
    }
}

// ============================================================================
// Call context
// ============================================================================

/// Arguments and receiver of one native call
pub struct CallContext<'a> {
    bridge: &'a Bridge,
    this: Option<&'a ObjectHandle>,
    args: &'a [ScriptValue],
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(bridge: &'a Bridge, this: Option<&'a ObjectHandle>, args: &'a [ScriptValue]) -> Self {
        Self { bridge, this, args }
    }

    pub fn bridge(&self) -> &'a Bridge {
        self.bridge
    }

    pub fn tree(&self) -> &'a ObjectTree {
        self.bridge.tree()
    }

    /// Receiver handle; `None` for statics and constructors
    pub fn this(&self) -> Option<&'a ObjectHandle> {
        self.this
    }

    pub fn args(&self) -> &'a [ScriptValue] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Option<&'a ScriptValue> {
        self.args.get(index)
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Integer argument, `default` when missing or not numeric
    pub fn int_arg(&self, index: usize, default: i32) -> i32 {
        match self.args.get(index) {
            Some(ScriptValue::Number(n)) if n.is_finite() => *n as i32,
            Some(ScriptValue::Bool(b)) => i32::from(*b),
            _ => default,
        }
    }

    pub fn number_arg(&self, index: usize, default: f64) -> f64 {
        match self.args.get(index) {
            Some(v) if !v.is_nullish() => {
                let n = v.to_number();
                if n.is_nan() {
                    default
                } else {
                    n
                }
            }
            _ => default,
        }
    }

    pub fn bool_arg(&self, index: usize, default: bool) -> bool {
        match self.args.get(index) {
            Some(v) if !v.is_nullish() => v.to_boolean(),
            _ => default,
        }
    }

    pub fn string_arg(&self, index: usize, default: &str) -> String {
        match self.args.get(index) {
            Some(v) if !v.is_nullish() => v.to_display_string(),
            _ => default.to_string(),
        }
    }

    /// Handle argument
    pub fn handle_arg(&self, index: usize) -> Result<&'a ObjectHandle, NativeError> {
        self.args
            .get(index)
            .and_then(ScriptValue::as_handle)
            .ok_or(NativeError::BadArgument {
                index,
                expected: "object",
            })
    }

    /// Tree object behind a handle argument; `None` for null/undefined
    pub fn object_arg(&self, index: usize) -> Result<Option<ObjectId>, NativeError> {
        match self.args.get(index) {
            None | Some(ScriptValue::Null) | Some(ScriptValue::Undefined) => Ok(None),
            Some(ScriptValue::Native(handle)) => handle.live_object_id().map(Some).map_err(NativeError::from),
            Some(_) => Err(NativeError::BadArgument {
                index,
                expected: "object",
            }),
        }
    }

    /// Copy of an inline value held by a handle argument
    pub fn value_arg<T: Any + Clone>(&self, index: usize) -> Result<T, NativeError> {
        let handle = self.handle_arg(index)?;
        Ok(handle.with_value(|v: &T| v.clone())?)
    }

    fn this_handle(&self) -> Result<&'a ObjectHandle, NativeError> {
        self.this.ok_or_else(|| NativeError::failed("method called without a receiver"))
    }

    /// Borrow the receiver's inline value
    pub fn with_this<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, NativeError> {
        Ok(self.this_handle()?.with_value(f)?)
    }

    /// Mutably borrow the receiver's inline value
    pub fn with_this_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, NativeError> {
        Ok(self.this_handle()?.with_value_mut(f)?)
    }

    /// Tree object behind the receiver
    pub fn this_object(&self) -> Result<ObjectId, NativeError> {
        Ok(self.this_handle()?.live_object_id()?)
    }

    /// Borrow the receiver's tree payload as `T`
    pub fn with_this_payload<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, NativeError> {
        let id = self.this_object()?;
        self.tree().with_payload(id, f).ok_or_else(|| {
            NativeError::Cast(CastError {
                expected: std::any::type_name::<T>(),
                found: self.tree().payload_type(id).map(|(_, name)| name).unwrap_or("null"),
            })
        })
    }

    /// Mutably borrow the receiver's tree payload as `T`
    pub fn with_this_payload_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, NativeError> {
        let id = self.this_object()?;
        self.tree().with_payload_mut(id, f).ok_or_else(|| {
            NativeError::Cast(CastError {
                expected: std::any::type_name::<T>(),
                found: self.tree().payload_type(id).map(|(_, name)| name).unwrap_or("null"),
            })
        })
    }
}
