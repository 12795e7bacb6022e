//! Object Events
//!
//! Event types with stable integer codes, per-category payloads and the
//! filter trait used to intercept an object's events.

use crate::variant::{Point, Rect, Size};
use crate::ObjectId;
use std::ops::BitOr;

/// Event filter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub(crate) u64);

/// Event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum EventType {
    None = 0,
    Timer = 1,
    MouseButtonPress = 2,
    MouseButtonRelease = 3,
    MouseButtonDblClick = 4,
    MouseMove = 5,
    KeyPress = 6,
    KeyRelease = 7,
    FocusIn = 8,
    FocusOut = 9,
    Enter = 10,
    Leave = 11,
    Paint = 12,
    Move = 13,
    Resize = 14,
    Show = 17,
    Hide = 18,
    Close = 19,
    Wheel = 31,
    DragEnter = 60,
    DragMove = 61,
    DragLeave = 62,
    Drop = 63,
    ChildAdded = 68,
    ChildRemoved = 71,
    ContextMenu = 82,
}

impl EventType {
    /// Every known type, in code order
    pub const ALL: [EventType; 26] = [
        EventType::None,
        EventType::Timer,
        EventType::MouseButtonPress,
        EventType::MouseButtonRelease,
        EventType::MouseButtonDblClick,
        EventType::MouseMove,
        EventType::KeyPress,
        EventType::KeyRelease,
        EventType::FocusIn,
        EventType::FocusOut,
        EventType::Enter,
        EventType::Leave,
        EventType::Paint,
        EventType::Move,
        EventType::Resize,
        EventType::Show,
        EventType::Hide,
        EventType::Close,
        EventType::Wheel,
        EventType::DragEnter,
        EventType::DragMove,
        EventType::DragLeave,
        EventType::Drop,
        EventType::ChildAdded,
        EventType::ChildRemoved,
        EventType::ContextMenu,
    ];

    /// Integer code
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a type by its integer code
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MouseButton {
    #[default]
    None,
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

impl MouseButton {
    /// Bit used in button masks
    pub fn bit(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Left => 1,
            Self::Right => 2,
            Self::Middle => 4,
            Self::Back => 8,
            Self::Forward => 16,
        }
    }
}

/// Keyboard modifier mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u32);

impl Modifiers {
    pub const NONE: Self = Modifiers(0);
    pub const SHIFT: Self = Modifiers(1);
    pub const CONTROL: Self = Modifiers(2);
    pub const ALT: Self = Modifiers(4);
    pub const META: Self = Modifiers(8);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Modifiers(self.0 | rhs.0)
    }
}

/// Why focus changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FocusReason {
    Mouse,
    Tab,
    Backtab,
    ActiveWindow,
    Popup,
    Shortcut,
    #[default]
    Other,
}

/// Per-category event payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    None,
    Resize {
        size: Size,
        old_size: Size,
    },
    Move {
        pos: Point,
        old_pos: Point,
    },
    Key {
        key: i32,
        text: String,
        auto_repeat: bool,
        modifiers: Modifiers,
        count: u32,
    },
    Mouse {
        pos: Point,
        global_pos: Point,
        button: MouseButton,
        buttons: u32,
        modifiers: Modifiers,
    },
    Wheel {
        pos: Point,
        delta: i32,
        buttons: u32,
        modifiers: Modifiers,
    },
    Focus {
        reason: FocusReason,
    },
    Timer {
        timer_id: i32,
    },
    Paint {
        rect: Rect,
    },
    Child {
        child: ObjectId,
    },
}

/// Native event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventType,
    accepted: bool,
    data: EventData,
}

impl Event {
    /// Event without a payload (show, hide, close, enter, leave...)
    pub fn new(kind: EventType) -> Self {
        Self::with_data(kind, EventData::None)
    }

    /// Event with an explicit payload
    pub fn with_data(kind: EventType, data: EventData) -> Self {
        Self { kind, accepted: true, data }
    }

    /// Create resize event
    pub fn resize(size: Size, old_size: Size) -> Self {
        Self::with_data(EventType::Resize, EventData::Resize { size, old_size })
    }

    /// Create move event
    pub fn moved(pos: Point, old_pos: Point) -> Self {
        Self::with_data(EventType::Move, EventData::Move { pos, old_pos })
    }

    /// Create key press/release event
    pub fn key(kind: EventType, key: i32, text: &str, modifiers: Modifiers, auto_repeat: bool) -> Self {
        Self::with_data(
            kind,
            EventData::Key {
                key,
                text: text.to_string(),
                auto_repeat,
                modifiers,
                count: 1,
            },
        )
    }

    /// Create mouse event
    pub fn mouse(kind: EventType, pos: Point, button: MouseButton, modifiers: Modifiers) -> Self {
        Self::with_data(
            kind,
            EventData::Mouse {
                pos,
                global_pos: pos,
                button,
                buttons: button.bit(),
                modifiers,
            },
        )
    }

    /// Create wheel event
    pub fn wheel(pos: Point, delta: i32, modifiers: Modifiers) -> Self {
        Self::with_data(
            EventType::Wheel,
            EventData::Wheel { pos, delta, buttons: 0, modifiers },
        )
    }

    /// Create timer event
    pub fn timer(timer_id: i32) -> Self {
        Self::with_data(EventType::Timer, EventData::Timer { timer_id })
    }

    /// Create child added/removed event
    pub fn child(kind: EventType, child: ObjectId) -> Self {
        Self::with_data(kind, EventData::Child { child })
    }

    pub fn kind(&self) -> EventType {
        self.kind
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn accept(&mut self) {
        self.accepted = true;
    }

    pub fn ignore(&mut self) {
        self.accepted = false;
    }
}

/// Intercepts events sent to an object
pub trait EventFilter {
    /// Return true to consume the event and stop further dispatch
    fn event_filter(&self, watched: ObjectId, event: &mut Event) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for kind in EventType::ALL {
            assert_eq!(EventType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(EventType::from_code(15), None);
    }

    #[test]
    fn test_resize_event() {
        let event = Event::resize(Size::new(100, 50), Size::new(80, 40));
        assert_eq!(event.kind(), EventType::Resize);
        assert_eq!(
            event.data(),
            &EventData::Resize { size: Size::new(100, 50), old_size: Size::new(80, 40) }
        );
    }

    #[test]
    fn test_modifiers() {
        let mods = Modifiers::SHIFT | Modifiers::CONTROL;
        assert!(mods.contains(Modifiers::SHIFT));
        assert!(!mods.contains(Modifiers::ALT));
        assert_eq!(mods.bits(), 3);
    }

    #[test]
    fn test_accept_ignore() {
        let mut event = Event::new(EventType::Close);
        assert!(event.is_accepted());
        event.ignore();
        assert!(!event.is_accepted());
    }
}
