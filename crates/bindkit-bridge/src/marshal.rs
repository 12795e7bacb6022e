//! Signature Marshalling
//!
//! Converts raw signal argument slots to script values and back, choosing
//! the conversion from the declared parameter type name.

use crate::bridge::Bridge;
use crate::convert::{variant_to_script, FromScript, ToScript};
use crate::error::MarshalError;
use crate::handle::Ownership;
use crate::value::ScriptValue;
use bindkit_object::{ArgSlot, Date, DateTime, ObjectId, Point, Rect, Size, Time, Variant};
use std::any::Any;
use std::collections::BTreeMap;

fn slot_as<'a, T: Any>(type_name: &str, slot: &'a dyn Any) -> Result<&'a T, MarshalError> {
    slot.downcast_ref::<T>().ok_or_else(|| MarshalError::TypeMismatch {
        expected: type_name.to_string(),
        found: "native value of another type",
    })
}

/// Pointer parameters: `Widget*`
pub fn is_pointer_type(type_name: &str) -> bool {
    type_name.ends_with('*')
}

/// Convert one native argument to a script value
pub fn slot_to_script(bridge: &Bridge, type_name: &str, slot: &dyn Any) -> Result<ScriptValue, MarshalError> {
    let value = match type_name {
        "bool" => slot_as::<bool>(type_name, slot)?.to_script(),
        "int" => slot_as::<i32>(type_name, slot)?.to_script(),
        "uint" => slot_as::<u32>(type_name, slot)?.to_script(),
        "long" => slot_as::<i64>(type_name, slot)?.to_script(),
        "ulong" => slot_as::<u64>(type_name, slot)?.to_script(),
        "double" => slot_as::<f64>(type_name, slot)?.to_script(),
        "float" => slot_as::<f32>(type_name, slot)?.to_script(),
        "String" => slot_as::<String>(type_name, slot)?.to_script(),
        "StringList" => slot_as::<Vec<String>>(type_name, slot)?.to_script(),
        "Variant" => variant_to_script(bridge, slot_as::<Variant>(type_name, slot)?),
        "VariantList" => ScriptValue::Array(
            slot_as::<Vec<Variant>>(type_name, slot)?
                .iter()
                .map(|v| variant_to_script(bridge, v))
                .collect(),
        ),
        "VariantMap" => ScriptValue::Map(
            slot_as::<BTreeMap<String, Variant>>(type_name, slot)?
                .iter()
                .map(|(k, v)| (k.clone(), variant_to_script(bridge, v)))
                .collect(),
        ),
        "Date" => slot_as::<Date>(type_name, slot)?.to_script(),
        "Time" => slot_as::<Time>(type_name, slot)?.to_script(),
        "DateTime" => slot_as::<DateTime>(type_name, slot)?.to_script(),
        "Size" => slot_as::<Size>(type_name, slot)?.to_script(),
        "Point" => slot_as::<Point>(type_name, slot)?.to_script(),
        "Rect" => slot_as::<Rect>(type_name, slot)?.to_script(),
        ptr if is_pointer_type(ptr) => pointer_to_script(bridge, ptr, slot)?,
        other => generic_to_script(bridge, slot).ok_or_else(|| MarshalError::UnsupportedType(other.to_string()))?,
    };
    Ok(value)
}

fn pointer_to_script(bridge: &Bridge, type_name: &str, slot: &dyn Any) -> Result<ScriptValue, MarshalError> {
    let id = match slot.downcast_ref::<ObjectId>() {
        Some(id) => Some(*id),
        None => *slot_as::<Option<ObjectId>>(type_name, slot)?,
    };
    Ok(match id {
        Some(id) => bridge
            .wrap_object(id, Some(Ownership::NativeOwned))
            .map(ScriptValue::Native)
            .unwrap_or(ScriptValue::Null),
        None => ScriptValue::Null,
    })
}

/// Last-resort conversion for undeclared type names
fn generic_to_script(bridge: &Bridge, slot: &dyn Any) -> Option<ScriptValue> {
    if let Some(v) = slot.downcast_ref::<Variant>() {
        return Some(variant_to_script(bridge, v));
    }
    if let Some(s) = slot.downcast_ref::<String>() {
        return Some(s.to_script());
    }
    if let Some(s) = slot.downcast_ref::<&'static str>() {
        return Some(s.to_script());
    }
    if let Some(n) = slot.downcast_ref::<i32>() {
        return Some(n.to_script());
    }
    if let Some(n) = slot.downcast_ref::<f64>() {
        return Some(n.to_script());
    }
    slot.downcast_ref::<bool>().map(ToScript::to_script)
}

/// Convert a script value into a native slot of the declared type
pub fn script_to_slot(type_name: &str, value: &ScriptValue) -> Result<ArgSlot, MarshalError> {
    let slot: ArgSlot = match type_name {
        "bool" => Box::new(bool::from_script(value)?),
        "int" => Box::new(i32::from_script(value)?),
        "uint" => Box::new(u32::from_script(value)?),
        "long" => Box::new(i64::from_script(value)?),
        "ulong" => Box::new(u64::from_script(value)?),
        "double" => Box::new(f64::from_script(value)?),
        "float" => Box::new(f32::from_script(value)?),
        "String" => Box::new(String::from_script(value)?),
        "StringList" => Box::new(Vec::<String>::from_script(value)?),
        "Variant" => Box::new(Variant::from_script(value)?),
        "VariantList" => Box::new(Vec::<Variant>::from_script(value)?),
        "VariantMap" => match Variant::from_script(value)? {
            Variant::Map(map) => Box::new(map),
            _ => {
                return Err(MarshalError::TypeMismatch {
                    expected: type_name.to_string(),
                    found: value.type_of(),
                })
            }
        },
        "Date" => Box::new(Date::from_script(value)?),
        "Time" => Box::new(Time::from_script(value)?),
        "DateTime" => Box::new(DateTime::from_script(value)?),
        "Size" => Box::new(Size::from_script(value)?),
        "Point" => Box::new(Point::from_script(value)?),
        "Rect" => Box::new(Rect::from_script(value)?),
        ptr if is_pointer_type(ptr) => match value {
            ScriptValue::Null | ScriptValue::Undefined => Box::new(None::<ObjectId>),
            ScriptValue::Native(handle) => Box::new(handle.object_id()),
            other => {
                return Err(MarshalError::TypeMismatch {
                    expected: ptr.to_string(),
                    found: other.type_of(),
                })
            }
        },
        other => return Err(MarshalError::UnsupportedType(other.to_string())),
    };
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BindingRegistry;
    use crate::BridgeConfig;
    use bindkit_object::{ObjectTree, OBJECT_CLASS};
    use std::rc::Rc;

    fn bridge() -> Bridge {
        Bridge::new(Rc::new(ObjectTree::new()), BindingRegistry::new(), BridgeConfig::default())
    }

    #[test]
    fn test_scalar_slots() {
        let bridge = bridge();
        assert_eq!(slot_to_script(&bridge, "int", &42i32), Ok(ScriptValue::from(42)));
        assert_eq!(slot_to_script(&bridge, "bool", &true), Ok(ScriptValue::Bool(true)));
        assert_eq!(
            slot_to_script(&bridge, "String", &"hi".to_string()),
            Ok(ScriptValue::from("hi"))
        );
    }

    #[test]
    fn test_declared_type_mismatch() {
        let bridge = bridge();
        assert!(matches!(
            slot_to_script(&bridge, "int", &1.5f64),
            Err(MarshalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_type_best_effort() {
        let bridge = bridge();
        assert_eq!(slot_to_script(&bridge, "Color", &7i32), Ok(ScriptValue::from(7)));
        assert_eq!(
            slot_to_script(&bridge, "Color", &[1u8, 2, 3]),
            Err(MarshalError::UnsupportedType("Color".into()))
        );
    }

    #[test]
    fn test_pointer_slot_wraps_native_owned() {
        let bridge = bridge();
        let id = bridge.tree().create(&OBJECT_CLASS, ());
        let value = slot_to_script(&bridge, "Object*", &id).unwrap();
        let handle = value.as_handle().unwrap();
        assert_eq!(handle.object_id(), Some(id));
        assert_eq!(handle.ownership(), Ownership::NativeOwned);
        assert_eq!(slot_to_script(&bridge, "Object*", &None::<ObjectId>), Ok(ScriptValue::Null));
    }

    #[test]
    fn test_return_slots() {
        let slot = script_to_slot("double", &ScriptValue::Number(2.5)).unwrap();
        assert_eq!(slot.downcast_ref::<f64>(), Some(&2.5));
        let slot = script_to_slot("StringList", &ScriptValue::from(vec!["a"])).unwrap();
        assert_eq!(slot.downcast_ref::<Vec<String>>(), Some(&vec!["a".to_string()]));
        assert!(script_to_slot("Gizmo", &ScriptValue::Null).is_err());
    }
}
