//! Calendar values built from the native date/time structures.

use crate::api::{DateStruct, TimeStruct, TimestampStruct};
use crate::error::{Error, Result};

use super::{FromValue, Value, mismatch};

/// A calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: i16,
    pub month: u8,
    pub day: u8,
}

/// A time of day with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
}

/// A date and time of day, without time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub date: Date,
    pub time: Time,
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

impl Date {
    pub fn new(year: i16, month: u8, day: u8) -> Result<Self> {
        if !(1..=12).contains(&month)
            || day == 0
            || u32::from(day) > days_in_month(year.into(), month.into())
        {
            return Err(Error::Conversion(format!(
                "invalid date {:04}-{:02}-{:02}",
                year, month, day
            )));
        }
        Ok(Self { year, month, day })
    }

    pub fn from_native(raw: &DateStruct) -> Result<Self> {
        let month = u8::try_from(raw.month).map_err(|_| Error::overflow("u16", "month"))?;
        let day = u8::try_from(raw.day).map_err(|_| Error::overflow("u16", "day"))?;
        Self::new(raw.year, month, day)
    }

    pub fn to_native(self) -> DateStruct {
        DateStruct {
            year: self.year,
            month: self.month.into(),
            day: self.day.into(),
        }
    }
}

impl Time {
    pub const MIDNIGHT: Time = Time {
        hour: 0,
        minute: 0,
        second: 0,
        nanosecond: 0,
    };

    pub fn new(hour: u8, minute: u8, second: u8, nanosecond: u32) -> Result<Self> {
        if hour > 23 || minute > 59 || second > 59 || nanosecond > 999_999_999 {
            return Err(Error::Conversion(format!(
                "invalid time {:02}:{:02}:{:02}.{:09}",
                hour, minute, second, nanosecond
            )));
        }
        Ok(Self {
            hour,
            minute,
            second,
            nanosecond,
        })
    }

    pub fn from_native(raw: &TimeStruct) -> Result<Self> {
        let hour = u8::try_from(raw.hour).map_err(|_| Error::overflow("u16", "hour"))?;
        let minute = u8::try_from(raw.minute).map_err(|_| Error::overflow("u16", "minute"))?;
        let second = u8::try_from(raw.second).map_err(|_| Error::overflow("u16", "second"))?;
        Self::new(hour, minute, second, 0)
    }

    /// The native time struct has no fractional field; sub-second precision is dropped.
    pub fn to_native(self) -> TimeStruct {
        TimeStruct {
            hour: self.hour.into(),
            minute: self.minute.into(),
            second: self.second.into(),
        }
    }
}

impl Timestamp {
    pub fn new(date: Date, time: Time) -> Self {
        Self { date, time }
    }

    pub fn from_native(raw: &TimestampStruct) -> Result<Self> {
        let date = Date::from_native(&DateStruct {
            year: raw.year,
            month: raw.month,
            day: raw.day,
        })?;
        let time = Time::from_native(&TimeStruct {
            hour: raw.hour,
            minute: raw.minute,
            second: raw.second,
        })?;
        let time = Time::new(time.hour, time.minute, time.second, raw.fraction)?;
        Ok(Self { date, time })
    }

    pub fn to_native(self) -> TimestampStruct {
        TimestampStruct {
            year: self.date.year,
            month: self.date.month.into(),
            day: self.date.day.into(),
            hour: self.time.hour.into(),
            minute: self.time.minute.into(),
            second: self.time.second.into(),
            fraction: self.time.nanosecond,
        }
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
        if self.nanosecond != 0 {
            write!(f, ".{:09}", self.nanosecond)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

impl FromValue for Date {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(d),
            Value::Timestamp(ts) if ts.time == Time::MIDNIGHT => Ok(ts.date),
            ref v => mismatch(v, "Date"),
        }
    }
}

impl FromValue for Time {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(t) => Ok(t),
            ref v => mismatch(v, "Time"),
        }
    }
}

impl FromValue for Timestamp {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Date(date) => Ok(Timestamp::new(date, Time::MIDNIGHT)),
            ref v => mismatch(v, "Timestamp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_validation() {
        assert!(Date::new(2024, 2, 29).is_ok());
        assert!(Date::new(2023, 2, 29).is_err());
        assert!(Date::new(1900, 2, 29).is_err());
        assert!(Date::new(2000, 2, 29).is_ok());
        assert!(Date::new(2024, 13, 1).is_err());
        assert!(Date::new(2024, 4, 31).is_err());
        assert!(Date::new(2024, 1, 0).is_err());
    }

    #[test]
    fn test_time_validation() {
        assert!(Time::new(23, 59, 59, 999_999_999).is_ok());
        assert!(Time::new(24, 0, 0, 0).is_err());
        assert!(Time::new(0, 60, 0, 0).is_err());
        assert!(Time::new(0, 0, 0, 1_000_000_000).is_err());
    }

    #[test]
    fn test_timestamp_native() {
        let raw = TimestampStruct {
            year: 2024,
            month: 3,
            day: 15,
            hour: 14,
            minute: 30,
            second: 45,
            fraction: 123_456_000,
        };
        let ts = Timestamp::from_native(&raw).unwrap();
        assert_eq!(ts.to_string(), "2024-03-15 14:30:45.123456000");
        assert_eq!(ts.to_native(), raw);

        let bad = TimestampStruct { month: 300, ..raw };
        assert!(matches!(
            Timestamp::from_native(&bad),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn test_date_into_timestamp() {
        let date = Date::new(1999, 12, 31).unwrap();
        let ts: Timestamp = crate::conversion::decode(Value::Date(date)).unwrap();
        assert_eq!(ts.to_string(), "1999-12-31 00:00:00");
    }
}
