//! Time crate type implementations (Date, Time, PrimitiveDateTime).

use crate::error::{Error, Result};

use super::{Date, FromValue, Time, Timestamp, Value};

fn to_date(d: Date) -> Result<time::Date> {
    let month = time::Month::try_from(d.month)
        .map_err(|e| Error::Conversion(format!("invalid month: {}", e)))?;
    time::Date::from_calendar_date(d.year.into(), month, d.day)
        .map_err(|e| Error::Conversion(format!("invalid date: {}", e)))
}

fn to_time(t: Time) -> Result<time::Time> {
    time::Time::from_hms_nano(t.hour, t.minute, t.second, t.nanosecond)
        .map_err(|e| Error::Conversion(format!("invalid time: {}", e)))
}

impl FromValue for time::Date {
    fn from_value(value: Value) -> Result<Self> {
        to_date(Date::from_value(value)?)
    }
}

impl FromValue for time::Time {
    fn from_value(value: Value) -> Result<Self> {
        to_time(Time::from_value(value)?)
    }
}

impl FromValue for time::PrimitiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        let ts = Timestamp::from_value(value)?;
        Ok(time::PrimitiveDateTime::new(
            to_date(ts.date)?,
            to_time(ts.time)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::decode;

    #[test]
    fn test_primitive_datetime() {
        let ts = Timestamp::new(
            Date::new(2024, 3, 15).unwrap(),
            Time::new(14, 30, 45, 500_000_000).unwrap(),
        );
        let dt: time::PrimitiveDateTime = decode(Value::Timestamp(ts)).unwrap();
        assert_eq!(dt.date(), time::macros::date!(2024 - 03 - 15));
        assert_eq!(dt.time(), time::macros::time!(14:30:45.5));
    }

    #[test]
    fn test_time() {
        let t: time::Time = decode(Value::Time(Time::new(1, 2, 3, 0).unwrap())).unwrap();
        assert_eq!(t, time::macros::time!(1:02:03));
    }
}
