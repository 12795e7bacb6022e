//! Event Handler Names
//!
//! Fixed two-way table between native event types and the script property
//! names that hold their handlers, plus the script-visible event objects.

use crate::bridge::Bridge;
use crate::convert::ToScript;
use crate::value::ScriptValue;
use bindkit_object::{Event, EventData, EventType, FocusReason, Modifiers, MouseButton};
use std::collections::BTreeMap;

/// Handler property name for every event type scripts can listen to
static HANDLER_NAMES: &[(EventType, &str)] = &[
    (EventType::Timer, "timerEvent"),
    (EventType::MouseButtonPress, "mousePressEvent"),
    (EventType::MouseButtonRelease, "mouseReleaseEvent"),
    (EventType::MouseButtonDblClick, "mouseDoubleClickEvent"),
    (EventType::MouseMove, "mouseMoveEvent"),
    (EventType::KeyPress, "keyPressEvent"),
    (EventType::KeyRelease, "keyReleaseEvent"),
    (EventType::FocusIn, "focusInEvent"),
    (EventType::FocusOut, "focusOutEvent"),
    (EventType::Enter, "enterEvent"),
    (EventType::Leave, "leaveEvent"),
    (EventType::Paint, "paintEvent"),
    (EventType::Move, "moveEvent"),
    (EventType::Resize, "resizeEvent"),
    (EventType::Show, "showEvent"),
    (EventType::Hide, "hideEvent"),
    (EventType::Close, "closeEvent"),
    (EventType::Wheel, "wheelEvent"),
    (EventType::DragEnter, "dragEnterEvent"),
    (EventType::DragMove, "dragMoveEvent"),
    (EventType::DragLeave, "dragLeaveEvent"),
    (EventType::Drop, "dropEvent"),
    (EventType::ChildAdded, "childAddedEvent"),
    (EventType::ChildRemoved, "childRemovedEvent"),
    (EventType::ContextMenu, "contextMenuEvent"),
];

/// Handler property name for an event type
pub fn handler_name(kind: EventType) -> Option<&'static str> {
    HANDLER_NAMES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, name)| *name)
}

/// Event type handled by a property name
pub fn event_type_for(name: &str) -> Option<EventType> {
    HANDLER_NAMES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(kind, _)| *kind)
}

fn button_name(button: MouseButton) -> &'static str {
    match button {
        MouseButton::None => "none",
        MouseButton::Left => "left",
        MouseButton::Right => "right",
        MouseButton::Middle => "middle",
        MouseButton::Back => "back",
        MouseButton::Forward => "forward",
    }
}

fn focus_reason_name(reason: FocusReason) -> &'static str {
    match reason {
        FocusReason::Mouse => "mouse",
        FocusReason::Tab => "tab",
        FocusReason::Backtab => "backtab",
        FocusReason::ActiveWindow => "activeWindow",
        FocusReason::Popup => "popup",
        FocusReason::Shortcut => "shortcut",
        FocusReason::Other => "other",
    }
}

fn modifier_fields(fields: &mut BTreeMap<String, ScriptValue>, modifiers: Modifiers) {
    fields.insert("modifiers".into(), modifiers.bits().to_script());
    fields.insert("shiftKey".into(), ScriptValue::Bool(modifiers.contains(Modifiers::SHIFT)));
    fields.insert("ctrlKey".into(), ScriptValue::Bool(modifiers.contains(Modifiers::CONTROL)));
    fields.insert("altKey".into(), ScriptValue::Bool(modifiers.contains(Modifiers::ALT)));
    fields.insert("metaKey".into(), ScriptValue::Bool(modifiers.contains(Modifiers::META)));
}

/// Build the object handed to a script event handler
pub fn event_to_script(bridge: &Bridge, event: &Event) -> ScriptValue {
    let mut fields: BTreeMap<String, ScriptValue> = BTreeMap::new();
    fields.insert("type".into(), u32::from(event.kind().code()).to_script());
    if let Some(name) = handler_name(event.kind()) {
        fields.insert("handler".into(), name.to_script());
    }
    fields.insert("accepted".into(), ScriptValue::Bool(event.is_accepted()));

    match event.data() {
        EventData::None => {}
        EventData::Resize { size, old_size } => {
            fields.insert("size".into(), size.to_script());
            fields.insert("oldSize".into(), old_size.to_script());
        }
        EventData::Move { pos, old_pos } => {
            fields.insert("pos".into(), pos.to_script());
            fields.insert("oldPos".into(), old_pos.to_script());
        }
        EventData::Key {
            key,
            text,
            auto_repeat,
            modifiers,
            count,
        } => {
            fields.insert("key".into(), key.to_script());
            fields.insert("text".into(), text.to_script());
            fields.insert("isAutoRepeat".into(), ScriptValue::Bool(*auto_repeat));
            fields.insert("count".into(), count.to_script());
            modifier_fields(&mut fields, *modifiers);
        }
        EventData::Mouse {
            pos,
            global_pos,
            button,
            buttons,
            modifiers,
        } => {
            fields.insert("x".into(), pos.x.to_script());
            fields.insert("y".into(), pos.y.to_script());
            fields.insert("pos".into(), pos.to_script());
            fields.insert("globalPos".into(), global_pos.to_script());
            fields.insert("button".into(), button_name(*button).to_script());
            fields.insert("buttons".into(), buttons.to_script());
            modifier_fields(&mut fields, *modifiers);
        }
        EventData::Wheel {
            pos,
            delta,
            buttons,
            modifiers,
        } => {
            fields.insert("pos".into(), pos.to_script());
            fields.insert("delta".into(), delta.to_script());
            fields.insert("buttons".into(), buttons.to_script());
            modifier_fields(&mut fields, *modifiers);
        }
        EventData::Focus { reason } => {
            fields.insert("reason".into(), focus_reason_name(*reason).to_script());
            fields.insert("gotFocus".into(), ScriptValue::Bool(event.kind() == EventType::FocusIn));
            fields.insert("lostFocus".into(), ScriptValue::Bool(event.kind() == EventType::FocusOut));
        }
        EventData::Timer { timer_id } => {
            fields.insert("timerId".into(), timer_id.to_script());
        }
        EventData::Paint { rect } => {
            fields.insert("rect".into(), rect.to_script());
        }
        EventData::Child { child } => {
            let value = bridge
                .wrap_object(*child, None)
                .map(ScriptValue::Native)
                .unwrap_or(ScriptValue::Null);
            fields.insert("child".into(), value);
            fields.insert("added".into(), ScriptValue::Bool(event.kind() == EventType::ChildAdded));
            fields.insert("removed".into(), ScriptValue::Bool(event.kind() == EventType::ChildRemoved));
        }
    }
    ScriptValue::Map(fields)
}
