//! Chrono crate type implementations (NaiveDate, NaiveTime, NaiveDateTime).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};

use super::{Date, FromValue, Time, Timestamp, Value};

fn to_naive_date(d: Date) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(d.year.into(), d.month.into(), d.day.into())
        .ok_or_else(|| Error::Conversion(format!("date {} out of range for NaiveDate", d)))
}

fn to_naive_time(t: Time) -> Result<NaiveTime> {
    NaiveTime::from_hms_nano_opt(t.hour.into(), t.minute.into(), t.second.into(), t.nanosecond)
        .ok_or_else(|| Error::Conversion(format!("time {} out of range for NaiveTime", t)))
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        to_naive_date(Date::from_value(value)?)
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self> {
        to_naive_time(Time::from_value(value)?)
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        let ts = Timestamp::from_value(value)?;
        Ok(NaiveDateTime::new(
            to_naive_date(ts.date)?,
            to_naive_time(ts.time)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::decode;

    #[test]
    fn test_naive_datetime() {
        let ts = Timestamp::new(
            Date::new(2024, 3, 15).unwrap(),
            Time::new(14, 30, 45, 123_456_789).unwrap(),
        );
        let dt: NaiveDateTime = decode(Value::Timestamp(ts)).unwrap();
        assert_eq!(dt.to_string(), "2024-03-15 14:30:45.123456789");
    }

    #[test]
    fn test_naive_date_from_date() {
        let d: NaiveDate = decode(Value::Date(Date::new(2000, 2, 29).unwrap())).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2000, 2, 29).unwrap());
        assert!(decode::<NaiveDate>(Value::Text("2000-02-29".into())).is_err());
    }
}
