//! Slot Proxy
//!
//! A native slot target standing in for a script function (or a bound
//! method of another handle). Each emission is marshalled argument by
//! argument according to the declared parameter types. Script failures are
//! logged and reported as a failed invocation, never propagated into the
//! emitting native code.

use crate::bridge::{Bridge, BridgeShared};
use crate::error::CallError;
use crate::handle::WeakObjectHandle;
use crate::marshal;
use crate::value::{ScriptException, ScriptFunction, ScriptValue};
use bindkit_object::{ArgSlot, ObjectId, Signature, SlotTarget};
use std::cell::Cell;
use std::rc::Weak;

/// What a slot proxy calls.
///
/// A method target is held weakly so a connection never keeps a
/// script-owned receiver alive. If script has dropped every reference but
/// the object lives on, a fresh handle is made for the call.
#[derive(Clone, Debug)]
pub enum SlotCallee {
    Function(ScriptFunction),
    Method {
        target: WeakObjectHandle,
        object: Option<ObjectId>,
        method: String,
    },
}

/// Native-callable wrapper around a script callee
pub struct SlotProxy {
    bridge: Weak<BridgeShared>,
    signature: Signature,
    callee: SlotCallee,
    invocations: Cell<u64>,
    failures: Cell<u64>,
}

impl SlotProxy {
    pub(crate) fn new(bridge: &Bridge, signature: Signature, callee: SlotCallee) -> Self {
        Self {
            bridge: bridge.downgrade(),
            signature,
            callee,
            invocations: Cell::new(0),
            failures: Cell::new(0),
        }
    }

    pub fn callee(&self) -> &SlotCallee {
        &self.callee
    }

    /// Number of times native code invoked this proxy
    pub fn invocations(&self) -> u64 {
        self.invocations.get()
    }

    /// Invocations that ended in a script error or a bad return value
    pub fn failures(&self) -> u64 {
        self.failures.get()
    }

    pub(crate) fn calls_function(&self, function: &ScriptFunction) -> bool {
        matches!(&self.callee, SlotCallee::Function(f) if f.ptr_eq(function))
    }

    fn fail(&self) -> bool {
        self.failures.set(self.failures.get() + 1);
        false
    }

    fn marshal_args(&self, bridge: &Bridge, args: &[ArgSlot]) -> Vec<ScriptValue> {
        self.signature
            .params()
            .iter()
            .zip(args.iter().skip(1))
            .enumerate()
            .map(|(index, (type_name, slot))| {
                match marshal::slot_to_script(bridge, type_name, slot.as_ref()) {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::warn!(
                            "{}: argument {} ({}) not converted: {}; passing null",
                            self.signature,
                            index,
                            type_name,
                            err
                        );
                        ScriptValue::Null
                    }
                }
            })
            .collect()
    }

    fn call_script(&self, bridge: &Bridge, args: &[ScriptValue]) -> Result<ScriptValue, ScriptException> {
        match &self.callee {
            SlotCallee::Function(function) => bridge.call_function(function, args),
            SlotCallee::Method { target, object, method } => {
                let receiver = match (target.upgrade(), object) {
                    (Some(handle), _) => Ok(handle),
                    (None, Some(id)) => bridge.wrap_object(*id, None),
                    (None, None) => Err(CallError::DeadObject {
                        type_name: target.type_name(),
                    }),
                };
                receiver.and_then(|handle| handle.call(method, args)).map_err(|err| {
                    let exc = ScriptException::from(err);
                    bridge.throw(exc.clone());
                    exc
                })
            }
        }
    }
}

impl SlotTarget for SlotProxy {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, args: &mut [ArgSlot]) -> bool {
        self.invocations.set(self.invocations.get() + 1);

        let declared = self.signature.arity();
        if args.len() != declared + 1 {
            tracing::error!(
                "{} invoked with {} arguments, declared {}",
                self.signature,
                args.len().saturating_sub(1),
                declared
            );
            return self.fail();
        }
        let Some(shared) = self.bridge.upgrade() else {
            tracing::warn!("{} invoked after its bridge was dropped", self.signature);
            return self.fail();
        };
        let bridge = Bridge::from_shared(shared);

        let script_args = self.marshal_args(&bridge, args);
        let result = match self.call_script(&bridge, &script_args) {
            Ok(value) => value,
            Err(exc) => {
                tracing::warn!("Exception in slot {}: {}", self.signature, exc);
                bridge.clear_exception();
                return self.fail();
            }
        };

        if let Some(return_type) = self.signature.return_type() {
            match marshal::script_to_slot(return_type, &result) {
                Ok(slot) => args[0] = slot,
                Err(err) => {
                    tracing::warn!("{}: return value not converted: {}", self.signature, err);
                    return self.fail();
                }
            }
        }
        true
    }
}
