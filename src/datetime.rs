//! Datetime fields.
//!
//! Three wrappers over [`NaiveDateTime`] pick how a timestamp is stored:
//! whole unix seconds, fractional unix seconds, or ISO 8601 text. Naive
//! values are read as UTC. Each of them loads from any of the three
//! storage forms, so a column may be re-declared without migrating data.

use std::ops::Deref;

use chrono::{DateTime, NaiveDateTime};

use crate::affinity::{FieldType, PrimitiveKind};
use crate::error::MarshalError;
use crate::sqlite::{SqlField, Value};

/// Format written by [`DatetimeIso8601`]; sub-second digits only when non-zero.
pub const ISO8601_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

macro_rules! datetime_field {
    ($(#[$meta:meta])* $name:ident, $kind:expr, |$dt:ident| $store:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub NaiveDateTime);

        impl $name {
            pub fn into_inner(self) -> NaiveDateTime {
                self.0
            }
        }

        impl From<NaiveDateTime> for $name {
            fn from(value: NaiveDateTime) -> Self {
                Self(value)
            }
        }

        impl Deref for $name {
            type Target = NaiveDateTime;

            fn deref(&self) -> &NaiveDateTime {
                &self.0
            }
        }

        impl SqlField for $name {
            fn field_type() -> FieldType {
                FieldType::Primitive($kind)
            }

            fn to_value(&self) -> Value {
                let $dt = &self.0;
                $store
            }

            fn from_value(value: Value) -> Result<Self, MarshalError> {
                load_datetime(value, stringify!($name)).map(Self)
            }
        }
    };
}

datetime_field!(
    /// Stored as INTEGER unix seconds; sub-second precision is dropped.
    DatetimeUnix,
    PrimitiveKind::Integer,
    |dt| Value::Integer(dt.and_utc().timestamp())
);

datetime_field!(
    /// Stored as REAL unix seconds with microsecond precision.
    DatetimeUnixNs,
    PrimitiveKind::Real,
    |dt| {
        let utc = dt.and_utc();
        Value::Real(utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_micros()) / 1e6)
    }
);

datetime_field!(
    /// Stored as ISO 8601 TEXT.
    DatetimeIso8601,
    PrimitiveKind::Text,
    |dt| Value::Text(dt.format(ISO8601_FORMAT).to_string())
);

fn load_datetime(value: Value, expected: &'static str) -> Result<NaiveDateTime, MarshalError> {
    let loaded = match &value {
        Value::Integer(secs) => from_unix_seconds(*secs, 0),
        Value::Real(secs) => from_float_seconds(*secs),
        Value::Text(text) => parse_iso8601(text),
        _ => None,
    };
    loaded.ok_or_else(|| {
        let found = match value {
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => format!("{v:?}"),
            Value::Text(v) => format!("{v:?}"),
            other => other.kind_name().to_string(),
        };
        MarshalError::new(expected, found)
    })
}

fn from_unix_seconds(secs: i64, nanos: u32) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}

fn from_float_seconds(secs: f64) -> Option<NaiveDateTime> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let mut micros = ((secs - whole) * 1e6).round() as u32;
    let mut whole = whole as i64;
    if micros >= 1_000_000 {
        whole += 1;
        micros = 0;
    }
    from_unix_seconds(whole, micros * 1_000)
}

fn parse_iso8601(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, ISO8601_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}
