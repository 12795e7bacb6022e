//! bindkit Bridge - script/native object interop
//!
//! Exposes [`bindkit_object`] trees to a dynamic scripting runtime.
//!
//! Features:
//! - Typed cells holding native pointers or inline values
//! - Static dispatch tables with base-table and superclass fallback
//! - Ownership-aware handles that turn into zombies when natives die
//! - Script functions as signal receivers and event handlers
//! - Two-way value marshalling keyed by native type names

mod bridge;
mod builtins;
mod cell;
mod config;
mod dispatch;
mod error;
mod event_proxy;
mod handle;
mod lifetime;
mod registry;
mod slot_proxy;
mod value;

pub mod convert;
pub mod event_map;
pub mod marshal;

pub use bridge::{Bridge, ConnectTarget};
pub use builtins::{OPAQUE_OBJECT, OPAQUE_VALUE};
pub use cell::{CellKind, TypeTag, TypedCell};
pub use config::BridgeConfig;
pub use convert::{FromScript, ToScript};
pub use dispatch::{
    BindHook, CallContext, Constructor, DispatchTable, Enumerator, Method, MethodFlags,
    NativeMethod, Returned,
};
pub use error::{
    CallError, CastError, ConnectError, ConstructError, MarshalError, NativeError,
    RegistrationError,
};
pub use event_proxy::EventProxy;
pub use handle::{ObjectHandle, Ownership, WeakObjectHandle};
pub use lifetime::LifetimeTracker;
pub use registry::BindingRegistry;
pub use slot_proxy::{SlotCallee, SlotProxy};
pub use value::{ExceptionKind, ScriptException, ScriptFunction, ScriptValue};
