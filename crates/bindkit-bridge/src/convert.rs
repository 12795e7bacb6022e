//! Value Conversion
//!
//! Bidirectional conversion between native values and script values:
//! scalars, strings, lists, string-keyed maps, geometry and dates.

use crate::bridge::Bridge;
use crate::error::MarshalError;
use crate::value::ScriptValue;
use bindkit_object::{Date, DateTime, Point, Rect, Size, Time, Variant};
use std::collections::BTreeMap;

/// Largest integer a script number holds exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Native to script conversion
pub trait ToScript {
    fn to_script(&self) -> ScriptValue;
}

/// Script to native conversion
pub trait FromScript: Sized {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError>;
}

fn mismatch(expected: &str, found: &ScriptValue) -> MarshalError {
    MarshalError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_of(),
    }
}

fn finite_number(expected: &str, value: &ScriptValue) -> Result<f64, MarshalError> {
    match value {
        ScriptValue::Number(n) if n.is_finite() => Ok(*n),
        ScriptValue::Bool(b) => Ok(f64::from(u8::from(*b))),
        _ => Err(mismatch(expected, value)),
    }
}

// ============================================================================
// Scalars
// ============================================================================

impl ToScript for bool {
    fn to_script(&self) -> ScriptValue {
        ScriptValue::Bool(*self)
    }
}

impl FromScript for bool {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        Ok(value.to_boolean())
    }
}

macro_rules! number_conversions {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl ToScript for $ty {
                fn to_script(&self) -> ScriptValue {
                    ScriptValue::Number(*self as f64)
                }
            }

            impl FromScript for $ty {
                fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
                    finite_number($name, value).map(|n| n as $ty)
                }
            }
        )*
    };
}

number_conversions! {
    i32 => "int",
    u32 => "uint",
    i64 => "long",
    u64 => "ulong",
    f32 => "float",
}

impl ToScript for f64 {
    fn to_script(&self) -> ScriptValue {
        ScriptValue::Number(*self)
    }
}

impl FromScript for f64 {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        match value {
            ScriptValue::Number(n) => Ok(*n),
            ScriptValue::Bool(_) => finite_number("double", value),
            _ => Err(mismatch("double", value)),
        }
    }
}

impl ToScript for String {
    fn to_script(&self) -> ScriptValue {
        ScriptValue::String(self.clone())
    }
}

impl ToScript for str {
    fn to_script(&self) -> ScriptValue {
        ScriptValue::String(self.to_string())
    }
}

impl FromScript for String {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        match value {
            ScriptValue::String(s) => Ok(s.clone()),
            ScriptValue::Bool(_) | ScriptValue::Number(_) => Ok(value.to_display_string()),
            ScriptValue::Undefined | ScriptValue::Null => Ok(String::new()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl<T: ToScript> ToScript for Vec<T> {
    fn to_script(&self) -> ScriptValue {
        ScriptValue::Array(self.iter().map(ToScript::to_script).collect())
    }
}

impl<T: FromScript> FromScript for Vec<T> {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        match value {
            ScriptValue::Array(items) => items.iter().map(T::from_script).collect(),
            ScriptValue::Undefined | ScriptValue::Null => Ok(Vec::new()),
            _ => Err(mismatch("list", value)),
        }
    }
}

// ============================================================================
// Geometry
// ============================================================================

fn int_field(value: &ScriptValue, name: &str, expected: &str) -> Result<i32, MarshalError> {
    match value.field(name) {
        Some(field) => i32::from_script(field),
        None => Err(mismatch(expected, value)),
    }
}

fn int_map(fields: &[(&str, i32)]) -> ScriptValue {
    ScriptValue::Map(
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), ScriptValue::from(*v)))
            .collect(),
    )
}

/// Geometry may arrive as a plain map or as a handle holding the value
fn inline_copy<T: Copy + 'static>(value: &ScriptValue) -> Option<T> {
    value.as_handle().and_then(|h| h.with_value(|v: &T| *v).ok())
}

impl ToScript for Size {
    fn to_script(&self) -> ScriptValue {
        int_map(&[("width", self.width), ("height", self.height)])
    }
}

impl FromScript for Size {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        if let Some(size) = inline_copy::<Size>(value) {
            return Ok(size);
        }
        Ok(Size::new(
            int_field(value, "width", "Size")?,
            int_field(value, "height", "Size")?,
        ))
    }
}

impl ToScript for Point {
    fn to_script(&self) -> ScriptValue {
        int_map(&[("x", self.x), ("y", self.y)])
    }
}

impl FromScript for Point {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        if let Some(point) = inline_copy::<Point>(value) {
            return Ok(point);
        }
        Ok(Point::new(int_field(value, "x", "Point")?, int_field(value, "y", "Point")?))
    }
}

impl ToScript for Rect {
    fn to_script(&self) -> ScriptValue {
        int_map(&[
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ])
    }
}

impl FromScript for Rect {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        if let Some(rect) = inline_copy::<Rect>(value) {
            return Ok(rect);
        }
        Ok(Rect::new(
            int_field(value, "x", "Rect")?,
            int_field(value, "y", "Rect")?,
            int_field(value, "width", "Rect")?,
            int_field(value, "height", "Rect")?,
        ))
    }
}

// ============================================================================
// Dates
// ============================================================================

fn epoch_millis(expected: &str, value: &ScriptValue) -> Result<i64, MarshalError> {
    match value {
        ScriptValue::Date(ms) | ScriptValue::Number(ms) if ms.is_finite() => Ok(*ms as i64),
        _ => Err(mismatch(expected, value)),
    }
}

/// Largest distance from the epoch a script date can express
const MAX_DATE_MILLIS: i64 = 8_640_000_000_000_000;

/// Dates outside the script range become an invalid date (NaN)
impl ToScript for DateTime {
    fn to_script(&self) -> ScriptValue {
        let ms = self.to_epoch_millis();
        if !(-MAX_DATE_MILLIS..=MAX_DATE_MILLIS).contains(&ms) {
            return ScriptValue::Date(f64::NAN);
        }
        ScriptValue::Date(ms as f64)
    }
}

impl FromScript for DateTime {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        epoch_millis("DateTime", value).map(DateTime::from_epoch_millis)
    }
}

/// Midnight UTC of the date
impl ToScript for Date {
    fn to_script(&self) -> ScriptValue {
        DateTime::new(*self, Time::default()).to_script()
    }
}

impl FromScript for Date {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        DateTime::from_script(value).map(|dt| dt.date)
    }
}

/// The time on the epoch day
impl ToScript for Time {
    fn to_script(&self) -> ScriptValue {
        ScriptValue::Date(self.to_millis() as f64)
    }
}

impl FromScript for Time {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        DateTime::from_script(value).map(|dt| dt.time)
    }
}

// ============================================================================
// Variants
// ============================================================================

/// Convert a native variant. Object references are wrapped through the
/// bridge; dead ones become null.
pub fn variant_to_script(bridge: &Bridge, value: &Variant) -> ScriptValue {
    match value {
        Variant::Invalid => ScriptValue::Null,
        Variant::Bool(b) => ScriptValue::Bool(*b),
        Variant::Int(n) => n.to_script(),
        Variant::UInt(n) => n.to_script(),
        Variant::LongLong(n) => n.to_script(),
        Variant::Double(n) => ScriptValue::Number(*n),
        Variant::String(s) => ScriptValue::String(s.clone()),
        Variant::StringList(items) => items.to_script(),
        Variant::List(items) => {
            ScriptValue::Array(items.iter().map(|v| variant_to_script(bridge, v)).collect())
        }
        Variant::Map(map) => ScriptValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), variant_to_script(bridge, v)))
                .collect(),
        ),
        Variant::Date(d) => d.to_script(),
        Variant::Time(t) => t.to_script(),
        Variant::DateTime(dt) => dt.to_script(),
        Variant::Size(s) => s.to_script(),
        Variant::Point(p) => p.to_script(),
        Variant::Rect(r) => r.to_script(),
        Variant::Object(id) => match bridge.wrap_object(*id, None) {
            Ok(handle) => ScriptValue::Native(handle),
            Err(_) => ScriptValue::Null,
        },
    }
}

/// Best-effort conversion of any script value into a variant
pub fn script_to_variant(value: &ScriptValue) -> Variant {
    match value {
        ScriptValue::Undefined | ScriptValue::Null | ScriptValue::Function(_) => Variant::Invalid,
        ScriptValue::Bool(b) => Variant::Bool(*b),
        ScriptValue::Number(n) => number_to_variant(*n),
        ScriptValue::String(s) => Variant::String(s.clone()),
        ScriptValue::Array(items) => Variant::List(items.iter().map(script_to_variant).collect()),
        ScriptValue::Map(map) => Variant::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), script_to_variant(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
        ScriptValue::Date(ms) if ms.is_finite() => {
            Variant::DateTime(DateTime::from_epoch_millis(*ms as i64))
        }
        ScriptValue::Date(_) => Variant::Invalid,
        ScriptValue::Native(handle) => {
            if let Some(id) = handle.object_id() {
                return Variant::Object(id);
            }
            handle
                .with_value(|v: &Size| Variant::Size(*v))
                .ok()
                .or_else(|| handle.with_value(|v: &Point| Variant::Point(*v)).ok())
                .or_else(|| handle.with_value(|v: &Rect| Variant::Rect(*v)).ok())
                .or_else(|| handle.with_value(|v: &DateTime| Variant::DateTime(*v)).ok())
                .or_else(|| handle.with_value(|v: &Variant| v.clone()).ok())
                .unwrap_or(Variant::Invalid)
        }
    }
}

fn number_to_variant(n: f64) -> Variant {
    if n.fract() != 0.0 || !n.is_finite() {
        return Variant::Double(n);
    }
    if n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
        Variant::Int(n as i32)
    } else if n.abs() <= MAX_SAFE_INTEGER {
        Variant::LongLong(n as i64)
    } else {
        Variant::Double(n)
    }
}

impl FromScript for Variant {
    fn from_script(value: &ScriptValue) -> Result<Self, MarshalError> {
        Ok(script_to_variant(value))
    }
}
