//! Fallback Bindings
//!
//! Tables used when nothing registered matches: every object handle can
//! reach the identity and ownership operations below, and unregistered
//! inline values get an empty table.

use crate::convert::{script_to_variant, variant_to_script};
use crate::dispatch::{CallContext, DispatchTable, Method, Returned};
use crate::error::NativeError;
use crate::value::ScriptValue;

static OBJECT_METHODS: &[Method] = &[
    Method::new("className", 0, class_name),
    Method::new("objectName", 0, object_name),
    Method::new("setObjectName", 1, set_object_name),
    Method::new("inherits", 1, inherits),
    Method::new("parent", 0, parent),
    Method::new("setParent", 1, set_parent),
    Method::new("children", 0, children),
    Method::new("findChild", 1, find_child),
    Method::new("property", 1, property),
    Method::new("setProperty", 2, set_property),
    Method::new("isAlive", 0, is_alive),
    Method::new("destroy", 0, destroy),
];

/// Identity and ownership operations shared by every object handle
pub static OPAQUE_OBJECT: DispatchTable = DispatchTable::new("Object").with_methods(OBJECT_METHODS);

/// Table for inline values of unregistered types
pub static OPAQUE_VALUE: DispatchTable = DispatchTable::new("Value");

fn this_handle<'a>(ctx: &CallContext<'a>) -> Result<&'a crate::ObjectHandle, NativeError> {
    ctx.this().ok_or_else(|| NativeError::failed("method called without a receiver"))
}

fn class_name(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    Ok(ctx.tree().class_name(id).unwrap_or_default().into())
}

fn object_name(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    Ok(ctx.tree().object_name(id).unwrap_or_default().into())
}

fn set_object_name(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    ctx.tree().set_object_name(id, &ctx.string_arg(0, ""))?;
    Ok(Returned::undefined())
}

fn inherits(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    let name = ctx.string_arg(0, "");
    let result = ctx.tree().meta(id).is_some_and(|meta| meta.inherits(&name));
    Ok(result.into())
}

fn parent(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    Ok(match ctx.tree().parent(id) {
        Some(parent) => Returned::object(parent),
        None => ScriptValue::Null.into(),
    })
}

fn set_parent(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let handle = this_handle(ctx)?;
    let parent = match ctx.arg(0) {
        None | Some(ScriptValue::Null) | Some(ScriptValue::Undefined) => None,
        Some(_) => Some(ctx.handle_arg(0)?),
    };
    handle.set_parent(parent)?;
    Ok(Returned::undefined())
}

fn children(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let handle = this_handle(ctx)?;
    let children = handle.children()?;
    Ok(ScriptValue::from(children).into())
}

fn find_child(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let handle = this_handle(ctx)?;
    let child = handle.find_child(&ctx.string_arg(0, ""))?;
    Ok(ScriptValue::from(child).into())
}

fn property(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    let value = ctx
        .tree()
        .property(id, &ctx.string_arg(0, ""))
        .map(|v| variant_to_script(ctx.bridge(), &v))
        .unwrap_or_default();
    Ok(value.into())
}

/// Creates the native property if needed, unlike a plain `put`
fn set_property(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    let value = ctx.arg(1).map(script_to_variant).unwrap_or_default();
    ctx.tree().set_property(id, &ctx.string_arg(0, ""), value)?;
    Ok(Returned::undefined())
}

fn is_alive(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    Ok(ctx.tree().is_alive(id).into())
}

fn destroy(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let handle = this_handle(ctx)?;
    Ok(handle.release()?.into())
}
