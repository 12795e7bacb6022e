//! End-to-end bridge scenarios
//!
//! Construction, dispatch, signals and events driven the way an
//! interpreter would drive them.

use bindkit_bridge::convert::{FromScript, ToScript};
use bindkit_bridge::marshal::{script_to_slot, slot_to_script};
use bindkit_bridge::*;
use bindkit_object::{
    Event, EventType, MetaClass, ObjectId, ObjectTree, Point, Size, Variant, OBJECT_CLASS,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// BINDINGS
// ============================================================================

static COUNTER_CLASS: MetaClass = MetaClass::new(
    "Counter",
    Some(&OBJECT_CLASS),
    &["valueChanged(int)", "int computed(int)"],
);
static FANCY_COUNTER_CLASS: MetaClass = MetaClass::new("FancyCounter", Some(&COUNTER_CLASS), &[]);
static GADGET_CLASS: MetaClass = MetaClass::new("Gadget", Some(&OBJECT_CLASS), &[]);

struct Counter {
    value: i32,
}

fn point_new(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    Ok(Returned::inline("Point", Point::new(ctx.int_arg(0, 0), ctx.int_arg(1, 0))))
}

fn point_x(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    Ok(ctx.with_this(|p: &Point| p.x)?.into())
}

fn point_y(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    Ok(ctx.with_this(|p: &Point| p.y)?.into())
}

fn point_translate(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let (dx, dy) = (ctx.int_arg(0, 0), ctx.int_arg(1, 0));
    ctx.with_this_mut(|p: &mut Point| {
        p.x += dx;
        p.y += dy;
    })?;
    Ok(Returned::undefined())
}

fn point_sum(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let total: f64 = (0..ctx.arg_count()).map(|i| ctx.number_arg(i, 0.0)).sum();
    Ok(total.into())
}

fn point_origin(_ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    Ok(Returned::inline("Point", Point::new(0, 0)))
}

static POINT_METHODS: &[Method] = &[
    Method::new("x", 0, point_x),
    Method::new("y", 0, point_y),
    Method::new("translate", 2, point_translate),
    Method::new("sum", 0, point_sum).with_flags(MethodFlags::VARARGS),
];
static POINT_STATICS: &[Method] = &[Method::new("origin", 0, point_origin)];

static POINT: DispatchTable = DispatchTable::new("Point")
    .with_methods(POINT_METHODS)
    .with_statics(POINT_STATICS)
    .with_constructor(Constructor::new(2, point_new));

fn counter_new(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let value = ctx.int_arg(0, 0);
    let id = ctx.tree().create(&COUNTER_CLASS, Counter { value });
    Ok(Returned::object(id))
}

fn counter_bind(_bridge: &Bridge, handle: &ObjectHandle) -> Result<(), NativeError> {
    handle.put("bound", ScriptValue::Bool(true))?;
    Ok(())
}

fn counter_value(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    Ok(ctx.with_this_payload(|c: &Counter| c.value)?.into())
}

fn counter_set_value(ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    let id = ctx.this_object()?;
    let value = ctx.int_arg(0, 0);
    let changed = ctx.with_this_payload_mut(|c: &mut Counter| std::mem::replace(&mut c.value, value) != value)?;
    if changed {
        ctx.tree().emit(id, "valueChanged(int)", vec![Box::new(value)])?;
    }
    Ok(Returned::undefined())
}

fn counter_limit(_ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    Ok(100.into())
}

fn counter_fail(_ctx: &CallContext<'_>) -> Result<Returned, NativeError> {
    Err(NativeError::failed("counter jammed"))
}

static COUNTER_METHODS: &[Method] = &[
    Method::new("value", 0, counter_value),
    Method::new("setValue", 1, counter_set_value),
    Method::new("jam", 0, counter_fail),
];
static COUNTER_STATICS: &[Method] = &[Method::new("limit", 0, counter_limit)];
static COUNTER_ENUMS: &[Enumerator] = &[Enumerator::new("Up", 1), Enumerator::new("Down", -1)];

static COUNTER: DispatchTable = DispatchTable::new("Counter")
    .with_methods(COUNTER_METHODS)
    .with_statics(COUNTER_STATICS)
    .with_enums(COUNTER_ENUMS)
    .with_constructor(Constructor::new(1, counter_new).with_bind(counter_bind));

static STEPPER: DispatchTable = DispatchTable::new("Stepper").with_base("Counter");

fn bridge_with(config: BridgeConfig) -> Bridge {
    init_tracing();
    let mut registry = BindingRegistry::new();
    registry.register(&POINT).unwrap();
    registry.register(&COUNTER).unwrap();
    registry.register(&STEPPER).unwrap();
    Bridge::new(Rc::new(ObjectTree::new()), registry, config)
}

fn bridge() -> Bridge {
    bridge_with(BridgeConfig::default())
}

fn recorder(log: &Rc<RefCell<Vec<Vec<ScriptValue>>>>) -> ScriptFunction {
    let log = log.clone();
    ScriptFunction::new("record", move |args| {
        log.borrow_mut().push(args.to_vec());
        Ok(ScriptValue::Undefined)
    })
}

// ============================================================================
// CONSTRUCTION AND DISPATCH
// ============================================================================

#[test]
fn test_construct_point_and_call() {
    let bridge = bridge();
    let point = bridge.construct("Point", &[3.into(), 4.into()]).unwrap();
    assert_eq!(point.type_name(), "Point");
    assert_eq!(point.ownership(), Ownership::ScriptOwned);
    assert_eq!(point.call("x", &[]).unwrap(), ScriptValue::from(3));
    assert_eq!(point.call("y", &[]).unwrap(), ScriptValue::from(4));
}

#[test]
fn test_inline_value_mutation() {
    let bridge = bridge();
    let point = bridge.construct("Point", &[1.into(), 1.into()]).unwrap();
    point.call("translate", &[2.into(), 5.into()]).unwrap();
    assert_eq!(point.with_value(|p: &Point| *p).unwrap(), Point::new(3, 6));
}

#[test]
fn test_construct_unknown_type() {
    let bridge = bridge();
    let err = bridge.construct("Widget", &[]).unwrap_err();
    assert!(matches!(err, ConstructError::UnknownType(ref name) if name == "Widget"));
    assert_eq!(ScriptException::from(err).kind(), ExceptionKind::ReferenceError);
}

#[test]
fn test_construct_without_constructor() {
    let bridge = bridge();
    let err = bridge.construct("Stepper", &[]).unwrap_err();
    assert!(matches!(err, ConstructError::NativeConstructionFailed { .. }));
}

#[test]
fn test_constructed_object_is_script_owned() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[7.into()]).unwrap();
    let id = counter.object_id().unwrap();
    assert_eq!(counter.ownership(), Ownership::ScriptOwned);
    assert_eq!(counter.call("value", &[]).unwrap(), ScriptValue::from(7));

    drop(counter);
    assert!(!bridge.tree().is_alive(id));
}

#[test]
fn test_bind_hook_runs_for_every_handle() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    assert_eq!(counter.get("bound").unwrap(), ScriptValue::Bool(true));

    let id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 1 });
    let wrapped = bridge.wrap_object(id, None).unwrap();
    assert_eq!(wrapped.get("bound").unwrap(), ScriptValue::Bool(true));
}

#[test]
fn test_arity_mismatch() {
    let bridge = bridge();
    let err = bridge.construct("Point", &[1.into()]).unwrap_err();
    assert!(matches!(err, ConstructError::ArityMismatch { expected: 2, got: 1, .. }));

    let point = bridge.construct("Point", &[1.into(), 2.into()]).unwrap();
    let err = point.call("x", &[1.into()]).unwrap_err();
    assert!(matches!(err, CallError::ArityMismatch { expected: 0, got: 1, .. }));
    let err = point.call("translate", &[1.into()]).unwrap_err();
    assert!(matches!(err, CallError::ArityMismatch { expected: 2, got: 1, .. }));
    assert_eq!(ScriptException::from(err).kind(), ExceptionKind::TypeError);
}

#[test]
fn test_lenient_arity_tolerates_extra_arguments() {
    let bridge = bridge_with(BridgeConfig::lenient());
    let point = bridge.construct("Point", &[1.into(), 2.into(), 3.into()]).unwrap();
    assert_eq!(point.call("x", &[9.into()]).unwrap(), ScriptValue::from(1));
    assert!(matches!(
        point.call("translate", &[1.into()]),
        Err(CallError::ArityMismatch { .. })
    ));
}

#[test]
fn test_varargs_method() {
    let bridge = bridge();
    let point = bridge.construct("Point", &[0.into(), 0.into()]).unwrap();
    assert_eq!(point.call("sum", &[]).unwrap(), ScriptValue::from(0.0));
    let sum = point.call("sum", &[1.into(), 2.into(), 3.5.into()]).unwrap();
    assert_eq!(sum, ScriptValue::from(6.5));
}

#[test]
fn test_no_such_method() {
    let bridge = bridge();
    let point = bridge.construct("Point", &[0.into(), 0.into()]).unwrap();
    let err = point.call("className", &[]).unwrap_err();
    assert!(matches!(err, CallError::NoSuchMethod { type_name: "Point", .. }));
}

#[test]
fn test_native_failure_becomes_exception() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let err = counter.call("jam", &[]).unwrap_err();
    assert!(matches!(err, CallError::NativeException(ref msg) if msg == "counter jammed"));
    let exc = ScriptException::from(err);
    assert_eq!(exc.kind(), ExceptionKind::Error);
    assert_eq!(exc.message(), "counter jammed");
}

#[test]
fn test_superclass_fallback() {
    let bridge = bridge();
    let id = bridge.tree().create(&FANCY_COUNTER_CLASS, Counter { value: 5 });
    let handle = bridge.wrap_object(id, None).unwrap();
    assert_eq!(handle.type_name(), "Counter");
    assert_eq!(handle.class_name(), Some("FancyCounter"));
    assert_eq!(handle.call("value", &[]).unwrap(), ScriptValue::from(5));
    assert_eq!(handle.call("className", &[]).unwrap(), ScriptValue::from("FancyCounter"));
    assert_eq!(
        handle.call("inherits", &["Counter".into()]).unwrap(),
        ScriptValue::Bool(true)
    );
}

#[test]
fn test_unregistered_class_gets_opaque_table() {
    let bridge = bridge();
    let id = bridge.tree().create(&GADGET_CLASS, ());
    let handle = bridge.wrap_object(id, None).unwrap();
    assert_eq!(handle.type_name(), "Object");
    assert_eq!(handle.ownership(), Ownership::NativeOwned);
    handle.call("setObjectName", &["gizmo".into()]).unwrap();
    assert_eq!(bridge.tree().object_name(id).as_deref(), Some("gizmo"));
    assert_eq!(handle.call("objectName", &[]).unwrap(), ScriptValue::from("gizmo"));
}

#[test]
fn test_statics_and_enums_follow_base() {
    let bridge = bridge();
    assert_eq!(bridge.call_static("Counter", "limit", &[]).unwrap(), ScriptValue::from(100));
    assert_eq!(bridge.call_static("Stepper", "limit", &[]).unwrap(), ScriptValue::from(100));
    assert_eq!(bridge.enum_value("Stepper", "Down"), Some(-1));
    assert_eq!(bridge.enum_value("Counter", "Sideways"), None);

    let origin = bridge.call_static("Point", "origin", &[]).unwrap();
    let handle = origin.as_handle().unwrap();
    assert_eq!(handle.call("x", &[]).unwrap(), ScriptValue::from(0));

    assert!(matches!(
        bridge.call_static("Nope", "limit", &[]),
        Err(CallError::UnknownType(_))
    ));
    assert!(matches!(
        bridge.call_static("Counter", "nothing", &[]),
        Err(CallError::NoSuchMethod { .. })
    ));
}

#[test]
fn test_opaque_handle_lacks_bound_methods() {
    let bridge = bridge();
    let id = bridge.tree().create(&GADGET_CLASS, ());
    let handle = bridge.wrap_object(id, None).unwrap();
    assert!(!handle.has_method("value"));
    assert!(handle.has_method("findChild"));
    assert_eq!(bridge.registry().names(), vec!["Counter", "Point", "Stepper"]);
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn test_native_properties_and_expandos() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();

    bridge
        .tree()
        .set_property(id, "label", Variant::String("a".into()))
        .unwrap();
    assert_eq!(counter.get("label").unwrap(), ScriptValue::from("a"));
    counter.put("label", "b".into()).unwrap();
    assert_eq!(bridge.tree().property(id, "label"), Some(Variant::String("b".into())));

    counter.put("tag", 5.into()).unwrap();
    assert_eq!(counter.get("tag").unwrap(), ScriptValue::from(5));
    assert_eq!(bridge.tree().property(id, "tag"), None);
    counter.put("tag", ScriptValue::Undefined).unwrap();
    assert!(counter.get("tag").unwrap().is_undefined());

    assert!(counter.get("missing").unwrap().is_undefined());
}

#[test]
fn test_methods_read_as_bound_functions() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[11.into()]).unwrap();
    let value = counter.get("value").unwrap();
    let function = value.as_function().unwrap();
    assert_eq!(function.call(&[]).unwrap(), ScriptValue::from(11));

    counter.put("value", 3.into()).unwrap();
    assert!(counter.get("value").unwrap().as_function().is_some());
    assert!(counter.method_names().contains(&"setValue"));
    assert!(counter.method_names().contains(&"destroy"));
}

// ============================================================================
// SIGNALS
// ============================================================================

#[test]
fn test_signal_reaches_script_function_once() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    bridge
        .connect(&counter, "valueChanged(int)", ConnectTarget::Function(recorder(&log)))
        .unwrap();
    bridge
        .tree()
        .emit(id, "valueChanged(int)", vec![Box::new(42i32)])
        .unwrap();

    assert_eq!(*log.borrow(), vec![vec![ScriptValue::from(42)]]);
}

#[test]
fn test_receivers_run_in_connection_order() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));

    for tag in ["first", "second", "third"] {
        let order = order.clone();
        let f = ScriptFunction::new(tag, move |_| {
            order.borrow_mut().push(tag);
            Ok(ScriptValue::Undefined)
        });
        bridge
            .connect(&counter, "valueChanged(int)", ConnectTarget::Function(f))
            .unwrap();
    }
    counter.call("setValue", &[1.into()]).unwrap();
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn test_slot_return_value_reaches_native() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();
    let double = ScriptFunction::new("double", |args| {
        Ok(ScriptValue::Number(args[0].to_number() * 2.0))
    });
    bridge
        .connect(&counter, "int computed(int)", ConnectTarget::Function(double))
        .unwrap();

    let result = bridge
        .tree()
        .emit(id, "computed(int)", vec![Box::new(21i32)])
        .unwrap();
    assert_eq!(result.downcast_ref::<i32>(), Some(&42));
}

#[test]
fn test_script_exception_in_slot_is_contained() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let failing = ScriptFunction::new("boom", |_| Err(ScriptException::type_error("boom")));

    let bad = bridge
        .connect(&counter, "valueChanged(int)", ConnectTarget::Function(failing))
        .unwrap();
    bridge
        .connect(&counter, "valueChanged(int)", ConnectTarget::Function(recorder(&log)))
        .unwrap();

    counter.call("setValue", &[3.into()]).unwrap();
    assert!(!bridge.has_exception());
    assert_eq!(log.borrow().len(), 1);

    let proxy = bridge.slot_proxy(bad).unwrap();
    assert_eq!(proxy.invocations(), 1);
    assert_eq!(proxy.failures(), 1);
}

#[test]
fn test_signal_to_method_slot() {
    let bridge = bridge();
    let source = bridge.construct("Counter", &[0.into()]).unwrap();
    let mirror = bridge.construct("Counter", &[0.into()]).unwrap();

    bridge
        .connect(
            &source,
            "valueChanged(int)",
            ConnectTarget::Method {
                handle: mirror.clone(),
                slot: "setValue(int)".into(),
            },
        )
        .unwrap();
    source.call("setValue", &[7.into()]).unwrap();
    assert_eq!(mirror.call("value", &[]).unwrap(), ScriptValue::from(7));
}

#[test]
fn test_method_slot_does_not_keep_receiver_alive() {
    let bridge = bridge();
    let source = bridge.construct("Counter", &[0.into()]).unwrap();
    let source_id = source.object_id().unwrap();
    let mirror = bridge.construct("Counter", &[0.into()]).unwrap();
    let mirror_id = mirror.object_id().unwrap();

    bridge
        .connect(
            &source,
            "valueChanged(int)",
            ConnectTarget::Method {
                handle: mirror.clone(),
                slot: "setValue(int)".into(),
            },
        )
        .unwrap();
    assert_eq!(bridge.tree().connection_count(source_id), 1);

    drop(mirror);
    assert!(!bridge.tree().is_alive(mirror_id));
    assert_eq!(bridge.tree().connection_count(source_id), 0);
    source.call("setValue", &[5.into()]).unwrap();
    assert!(!bridge.has_exception());
}

#[test]
fn test_self_connected_object_released_with_last_handle() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();

    bridge
        .connect(
            &counter,
            "valueChanged(int)",
            ConnectTarget::Method {
                handle: counter.clone(),
                slot: "setValue(int)".into(),
            },
        )
        .unwrap();
    counter.call("setValue", &[2.into()]).unwrap();
    assert_eq!(counter.call("value", &[]).unwrap(), ScriptValue::from(2));

    drop(counter);
    assert!(!bridge.tree().is_alive(id));
}

#[test]
fn test_method_slot_rewraps_native_receiver() {
    let bridge = bridge();
    let source = bridge.construct("Counter", &[0.into()]).unwrap();
    let mirror_id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 0 });
    let mirror = bridge.wrap_object(mirror_id, None).unwrap();

    bridge
        .connect(
            &source,
            "valueChanged(int)",
            ConnectTarget::Method {
                handle: mirror,
                slot: "setValue(int)".into(),
            },
        )
        .unwrap();
    assert!(!bridge.tracker().is_watched(mirror_id));

    source.call("setValue", &[9.into()]).unwrap();
    assert!(!bridge.has_exception());
    assert_eq!(bridge.tree().with_payload(mirror_id, |c: &Counter| c.value), Some(9));
    assert!(bridge.tree().is_alive(mirror_id));
}

#[test]
fn test_connect_rejects_bad_targets() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let point = bridge.construct("Point", &[0.into(), 0.into()]).unwrap();
    let noop = ScriptFunction::new("noop", |_| Ok(ScriptValue::Undefined));

    let err = bridge
        .connect(
            &counter,
            "valueChanged(int)",
            ConnectTarget::Method {
                handle: counter.clone(),
                slot: "reset(int)".into(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, ConnectError::NoSuchSlot { .. }));

    let err = bridge
        .connect(&counter, "clicked()", ConnectTarget::Function(noop.clone()))
        .unwrap_err();
    assert!(matches!(err, ConnectError::Tree(_)));

    let err = bridge
        .connect(&point, "valueChanged(int)", ConnectTarget::Function(noop))
        .unwrap_err();
    assert!(matches!(err, ConnectError::Call(CallError::NotAnObject { .. })));
}

#[test]
fn test_disconnect_function() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let f = recorder(&log);

    bridge
        .connect(&counter, "valueChanged(int)", ConnectTarget::Function(f.clone()))
        .unwrap();
    counter.call("setValue", &[1.into()]).unwrap();
    assert_eq!(bridge.disconnect_function(&counter, "valueChanged( int )", &f).unwrap(), 1);
    counter.call("setValue", &[2.into()]).unwrap();

    assert_eq!(log.borrow().len(), 1);
    assert_eq!(bridge.disconnect_function(&counter, "valueChanged(int)", &f).unwrap(), 0);
}

#[test]
fn test_receiver_death_drops_connection() {
    let bridge = bridge();
    let source = bridge.construct("Counter", &[0.into()]).unwrap();
    let source_id = source.object_id().unwrap();
    let mirror_id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 0 });
    let mirror = bridge.wrap_object(mirror_id, None).unwrap();

    let connection = bridge
        .connect(
            &source,
            "valueChanged(int)",
            ConnectTarget::Method {
                handle: mirror,
                slot: "setValue(int)".into(),
            },
        )
        .unwrap();
    assert_eq!(bridge.tree().connection_count(source_id), 1);

    bridge.tree().destroy(mirror_id);
    assert_eq!(bridge.tree().connection_count(source_id), 0);
    assert!(!bridge.tree().is_connected(connection));
    source.call("setValue", &[4.into()]).unwrap();
}

// ============================================================================
// EVENTS
// ============================================================================

#[test]
fn test_resize_handler_sees_sizes() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    counter
        .put("resizeEvent", ScriptValue::Function(recorder(&log)))
        .unwrap();
    assert_eq!(counter.subscribed_events(), vec![EventType::Resize]);

    let mut event = Event::resize(Size::new(100, 50), Size::new(80, 40));
    assert!(!bridge.tree().send_event(id, &mut event));

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    let object = &log[0][0];
    let size = object.field("size").unwrap();
    assert_eq!(size.field("width"), Some(&ScriptValue::from(100)));
    assert_eq!(size.field("height"), Some(&ScriptValue::from(50)));
    let old = object.field("oldSize").unwrap();
    assert_eq!(old.field("width"), Some(&ScriptValue::from(80)));
    assert_eq!(old.field("height"), Some(&ScriptValue::from(40)));
}

#[test]
fn test_handler_returning_true_consumes() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();
    let eat = ScriptFunction::new("eat", |_| Ok(ScriptValue::Bool(true)));
    counter.put("timerEvent", ScriptValue::Function(eat.clone())).unwrap();

    assert!(bridge.tree().send_event(id, &mut Event::timer(3)));
    assert!(!bridge.tree().send_event(id, &mut Event::resize(Size::new(1, 1), Size::new(0, 0))));
    let current = counter.get("timerEvent").unwrap();
    assert!(current.as_function().is_some_and(|f| f.ptr_eq(&eat)));
}

#[test]
fn test_handler_exception_is_contained() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();
    let boom = ScriptFunction::new("boom", |_| Err(ScriptException::error("boom")));
    counter.put("showEvent", ScriptValue::Function(boom)).unwrap();

    assert!(!bridge.tree().send_event(id, &mut Event::new(EventType::Show)));
    assert!(!bridge.has_exception());
}

#[test]
fn test_double_remove_filter_is_safe() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    counter.put("resizeEvent", ScriptValue::Function(recorder(&log))).unwrap();
    counter.put("moveEvent", ScriptValue::Function(recorder(&log))).unwrap();
    assert_eq!(bridge.tree().event_filter_count(id), 1);

    let proxy = counter.event_proxy().unwrap();
    assert!(proxy.remove_filter(EventType::Resize));
    assert!(!proxy.remove_filter(EventType::Resize));
    assert_eq!(proxy.handler_count(), 1);
    assert_eq!(bridge.tree().event_filter_count(id), 1);

    assert!(proxy.remove_filter(EventType::Move));
    assert!(!proxy.remove_filter(EventType::Move));
    assert!(!proxy.is_installed());
    assert_eq!(bridge.tree().event_filter_count(id), 0);
}

#[test]
fn test_clearing_handlers_drops_proxy() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let id = counter.object_id().unwrap();
    let f = ScriptFunction::new("f", |_| Ok(ScriptValue::Undefined));

    counter.put("keyPressEvent", ScriptValue::Function(f)).unwrap();
    assert!(counter.has_event_proxy());
    counter.put("keyPressEvent", ScriptValue::Null).unwrap();
    counter.put("keyPressEvent", ScriptValue::Null).unwrap();
    assert!(!counter.has_event_proxy());
    assert_eq!(bridge.tree().event_filter_count(id), 0);
    assert!(counter.get("keyPressEvent").unwrap().is_undefined());
}

#[test]
fn test_native_death_drops_event_proxy() {
    let bridge = bridge();
    let id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 0 });
    let handle = bridge.wrap_object(id, None).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    handle.put("resizeEvent", ScriptValue::Function(recorder(&log))).unwrap();
    assert!(handle.has_event_proxy());
    assert_eq!(Rc::strong_count(&log), 2);

    bridge.tree().destroy(id);
    assert!(handle.is_zombie());
    assert!(!handle.has_event_proxy());
    assert_eq!(Rc::strong_count(&log), 1);
}

#[test]
fn test_set_object_moves_handlers() {
    let bridge = bridge();
    let old_id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 0 });
    let new_id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 1 });
    let handle = bridge.wrap_object(old_id, None).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    handle.put("resizeEvent", ScriptValue::Function(recorder(&log))).unwrap();

    handle.set_object(new_id).unwrap();
    assert_eq!(bridge.tree().event_filter_count(old_id), 0);
    assert_eq!(bridge.tree().event_filter_count(new_id), 1);
    assert_eq!(handle.event_proxy().unwrap().watched(), new_id);

    let mut event = Event::resize(Size::new(2, 2), Size::new(1, 1));
    bridge.tree().send_event(old_id, &mut event);
    assert!(log.borrow().is_empty());
    bridge.tree().send_event(new_id, &mut event);
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn test_handlers_work_after_owned_object_replaced() {
    let bridge = bridge();
    let counter = bridge.construct("Counter", &[0.into()]).unwrap();
    let old_id = counter.object_id().unwrap();
    let new_id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 1 });
    let log = Rc::new(RefCell::new(Vec::new()));
    counter.put("resizeEvent", ScriptValue::Function(recorder(&log))).unwrap();

    counter.set_object(new_id).unwrap();
    assert!(!bridge.tree().is_alive(old_id));
    counter.put("moveEvent", ScriptValue::Function(recorder(&log))).unwrap();
    assert_eq!(counter.subscribed_events().len(), 2);
    assert_eq!(bridge.tree().event_filter_count(new_id), 1);

    bridge
        .tree()
        .send_event(new_id, &mut Event::new(EventType::Move));
    bridge
        .tree()
        .send_event(new_id, &mut Event::resize(Size::new(2, 2), Size::new(1, 1)));
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn test_set_value_drops_handlers() {
    let bridge = bridge();
    let id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 0 });
    let handle = bridge.wrap_object(id, None).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    handle.put("resizeEvent", ScriptValue::Function(recorder(&log))).unwrap();

    handle.set_value(Point::new(1, 2)).unwrap();
    assert!(!handle.has_event_proxy());
    assert_eq!(bridge.tree().event_filter_count(id), 0);
    assert_eq!(Rc::strong_count(&log), 1);

    bridge
        .tree()
        .send_event(id, &mut Event::resize(Size::new(2, 2), Size::new(1, 1)));
    assert!(log.borrow().is_empty());
    assert!(bridge.tree().is_alive(id));
}

// ============================================================================
// MARSHALLING
// ============================================================================

#[test]
fn test_primitive_round_trips() {
    for n in [0, 1, -1, i32::MAX, i32::MIN] {
        assert_eq!(i32::from_script(&n.to_script()), Ok(n));
    }
    for x in [0.0, -2.5, 1e300] {
        assert_eq!(f64::from_script(&x.to_script()), Ok(x));
    }
    for b in [true, false] {
        assert_eq!(bool::from_script(&b.to_script()), Ok(b));
    }
    for s in ["", "hello", "héllo wörld"] {
        assert_eq!(String::from_script(&s.to_script()), Ok(s.to_string()));
    }

    let script = ScriptValue::from("text");
    assert_eq!(String::from_script(&script).unwrap().to_script(), script);
}

#[test]
fn test_slot_round_trips() {
    let bridge = bridge();
    let cases = [
        ("int", ScriptValue::from(-7)),
        ("double", ScriptValue::from(0.25)),
        ("bool", ScriptValue::Bool(true)),
        ("String", ScriptValue::from("abc")),
    ];
    for (type_name, value) in cases {
        let slot = script_to_slot(type_name, &value).unwrap();
        assert_eq!(slot_to_script(&bridge, type_name, slot.as_ref()).unwrap(), value);
    }
}

#[test]
fn test_pointer_parameters_wrap_objects() {
    let bridge = bridge();
    let id = bridge.tree().create(&COUNTER_CLASS, Counter { value: 9 });
    let slot: Option<ObjectId> = Some(id);
    let value = slot_to_script(&bridge, "Counter*", &slot).unwrap();
    let handle = value.as_handle().unwrap();
    assert_eq!(handle.ownership(), Ownership::NativeOwned);
    assert_eq!(handle.call("value", &[]).unwrap(), ScriptValue::from(9));

    let none: Option<ObjectId> = None;
    assert_eq!(slot_to_script(&bridge, "Counter*", &none).unwrap(), ScriptValue::Null);
}
