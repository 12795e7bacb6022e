//! Variant
//!
//! The native platform's dynamically typed value: what dynamic properties
//! hold and what generic conversions go through.

use crate::ObjectId;
use std::collections::BTreeMap;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Calendar date (proleptic Gregorian)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Date {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Check that month and day are in range for the year
    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month) && self.day >= 1 && self.day <= days_in_month(self.year, self.month)
    }

    /// Days since 1970-01-01
    pub fn to_days(&self) -> i64 {
        // Howard Hinnant's days_from_civil
        let y = i64::from(self.year) - i64::from(self.month <= 2);
        let era = y.div_euclid(400);
        let yoe = y - era * 400;
        let m = i64::from(self.month);
        let mp = if m > 2 { m - 3 } else { m + 9 };
        let doy = (153 * mp + 2) / 5 + i64::from(self.day) - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        era * 146_097 + doe - 719_468
    }

    /// Inverse of [`Date::to_days`]
    pub fn from_days(days: i64) -> Self {
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
        let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
        let year = (yoe + era * 400 + i64::from(month <= 2)) as i32;
        Self { year, month, day }
    }
}

/// Wall-clock time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub msec: u32,
}

impl Time {
    pub fn new(hour: u32, minute: u32, second: u32, msec: u32) -> Self {
        Self { hour, minute, second, msec }
    }

    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.second < 60 && self.msec < 1000
    }

    /// Milliseconds since midnight
    pub fn to_millis(&self) -> i64 {
        ((i64::from(self.hour) * 60 + i64::from(self.minute)) * 60 + i64::from(self.second)) * 1000
            + i64::from(self.msec)
    }

    /// Build from milliseconds since midnight (wrapped into one day)
    pub fn from_millis(ms: i64) -> Self {
        let ms = ms.rem_euclid(MILLIS_PER_DAY);
        Self {
            hour: (ms / 3_600_000) as u32,
            minute: (ms / 60_000 % 60) as u32,
            second: (ms / 1000 % 60) as u32,
            msec: (ms % 1000) as u32,
        }
    }
}

/// Date plus time, UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    pub date: Date,
    pub time: Time,
}

impl DateTime {
    pub fn new(date: Date, time: Time) -> Self {
        Self { date, time }
    }

    pub fn is_valid(&self) -> bool {
        self.date.is_valid() && self.time.is_valid()
    }

    /// Milliseconds since the Unix epoch, saturating at the `i64` range
    pub fn to_epoch_millis(&self) -> i64 {
        self.date
            .to_days()
            .saturating_mul(MILLIS_PER_DAY)
            .saturating_add(self.time.to_millis())
    }

    pub fn from_epoch_millis(ms: i64) -> Self {
        Self {
            date: Date::from_days(ms.div_euclid(MILLIS_PER_DAY)),
            time: Time::from_millis(ms.rem_euclid(MILLIS_PER_DAY)),
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Width and height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Integer point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// Dynamically typed native value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Invalid,
    Bool(bool),
    Int(i32),
    UInt(u32),
    LongLong(i64),
    Double(f64),
    String(String),
    StringList(Vec<String>),
    List(Vec<Variant>),
    Map(BTreeMap<String, Variant>),
    Date(Date),
    Time(Time),
    DateTime(DateTime),
    Size(Size),
    Point(Point),
    Rect(Rect),
    Object(ObjectId),
}

impl Variant {
    /// Native type name, as used in signatures
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Invalid => "Invalid",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::UInt(_) => "uint",
            Variant::LongLong(_) => "long",
            Variant::Double(_) => "double",
            Variant::String(_) => "String",
            Variant::StringList(_) => "StringList",
            Variant::List(_) => "VariantList",
            Variant::Map(_) => "VariantMap",
            Variant::Date(_) => "Date",
            Variant::Time(_) => "Time",
            Variant::DateTime(_) => "DateTime",
            Variant::Size(_) => "Size",
            Variant::Point(_) => "Point",
            Variant::Rect(_) => "Rect",
            Variant::Object(_) => "Object*",
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Variant::Invalid)
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_is_day_zero() {
        assert_eq!(Date::new(1970, 1, 1).to_days(), 0);
        assert_eq!(Date::from_days(0), Date::new(1970, 1, 1));
    }

    #[test]
    fn test_known_dates() {
        assert_eq!(Date::new(2000, 3, 1).to_days(), 11_017);
        assert_eq!(Date::from_days(-1), Date::new(1969, 12, 31));
        assert_eq!(Date::from_days(Date::new(2024, 2, 29).to_days()), Date::new(2024, 2, 29));
    }

    #[test]
    fn test_date_validity() {
        assert!(Date::new(2024, 2, 29).is_valid());
        assert!(!Date::new(2023, 2, 29).is_valid());
        assert!(!Date::new(1900, 2, 29).is_valid());
        assert!(!Date::new(2023, 13, 1).is_valid());
    }

    #[test]
    fn test_datetime_epoch_millis() {
        let dt = DateTime::new(Date::new(2001, 9, 9), Time::new(1, 46, 40, 0));
        assert_eq!(dt.to_epoch_millis(), 1_000_000_000_000);
        assert_eq!(DateTime::from_epoch_millis(1_000_000_000_000), dt);
    }

    #[test]
    fn test_extreme_years_saturate() {
        let far = DateTime::new(Date::new(i32::MAX, 12, 31), Time::new(23, 59, 59, 999));
        assert_eq!(far.to_epoch_millis(), i64::MAX);
        let early = DateTime::new(Date::new(i32::MIN, 1, 1), Time::default());
        assert_eq!(early.to_epoch_millis(), i64::MIN);
    }

    #[test]
    fn test_time_wraps() {
        assert_eq!(Time::from_millis(-1), Time::new(23, 59, 59, 999));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Variant::Int(3).type_name(), "int");
        assert_eq!(Variant::from("x").type_name(), "String");
        assert!(!Variant::default().is_valid());
    }
}
