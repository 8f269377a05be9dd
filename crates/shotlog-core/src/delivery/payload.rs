//! Flat key/value wire format shared by both devices.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::PayloadError;
use crate::session::{SessionRecord, SessionType};

pub type PayloadMap = Map<String, Value>;

pub const KEY_DATE: &str = "date";
pub const KEY_MAKES: &str = "makes";
pub const KEY_LENGTH: &str = "length";
pub const KEY_SHOT_TYPE: &str = "shotType";
pub const KEY_SESSION_TYPE: &str = "sessionType";
pub const KEY_ID: &str = "id";

/// A validated incoming session.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSession {
    pub record: SessionRecord,
    /// Whether the sender supplied its own delivery id.
    pub explicit_id: bool,
}

pub fn encode(record: &SessionRecord) -> PayloadMap {
    let mut map = PayloadMap::new();
    map.insert(KEY_DATE.into(), Value::String(record.date.to_rfc3339()));
    map.insert(KEY_MAKES.into(), Value::from(record.makes));
    map.insert(KEY_LENGTH.into(), Value::from(record.length));
    map.insert(KEY_SHOT_TYPE.into(), Value::from(record.shot_type.as_str()));
    map.insert(
        KEY_SESSION_TYPE.into(),
        Value::from(record.session_type.as_str()),
    );
    map.insert(KEY_ID.into(), Value::String(record.id.to_string()));
    map
}

/// Validate a payload and build the record it describes.
///
/// Without an `id` key the record gets a fresh id; `explicit_id` tells the
/// receiver which dedup rule applies.
pub fn decode(payload: &PayloadMap) -> Result<DecodedSession, PayloadError> {
    let date = decode_date(required(payload, KEY_DATE)?)?;
    let makes = decode_count(payload, KEY_MAKES)?;
    let length = decode_count(payload, KEY_LENGTH)?;

    let shot_type = match required(payload, KEY_SHOT_TYPE)? {
        Value::String(s) => s.parse().map_err(|message| PayloadError::InvalidField {
            field: KEY_SHOT_TYPE,
            message,
        })?,
        other => return Err(invalid(KEY_SHOT_TYPE, format!("expected string, got {other}"))),
    };

    let session_type = match payload.get(KEY_SESSION_TYPE) {
        None | Some(Value::Null) => SessionType::default(),
        Some(Value::String(s)) => s.parse().map_err(|message| PayloadError::InvalidField {
            field: KEY_SESSION_TYPE,
            message,
        })?,
        Some(other) => {
            return Err(invalid(
                KEY_SESSION_TYPE,
                format!("expected string, got {other}"),
            ))
        }
    };

    let explicit = match payload.get(KEY_ID) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(
            Uuid::parse_str(s).map_err(|e| invalid(KEY_ID, e.to_string()))?,
        ),
        Some(other) => return Err(invalid(KEY_ID, format!("expected string, got {other}"))),
    };

    let mut record = SessionRecord::new(date, makes, length, shot_type, session_type);
    if let Some(id) = explicit {
        record.id = id;
    }
    Ok(DecodedSession {
        record,
        explicit_id: explicit.is_some(),
    })
}

fn required<'a>(payload: &'a PayloadMap, key: &'static str) -> Result<&'a Value, PayloadError> {
    match payload.get(key) {
        None | Some(Value::Null) => Err(PayloadError::MissingField(key)),
        Some(value) => Ok(value),
    }
}

fn invalid(field: &'static str, message: String) -> PayloadError {
    PayloadError::InvalidField { field, message }
}

fn decode_count(payload: &PayloadMap, key: &'static str) -> Result<u32, PayloadError> {
    let value = required(payload, key)?;
    let n = value
        .as_u64()
        .ok_or_else(|| invalid(key, format!("expected a non-negative integer, got {value}")))?;
    u32::try_from(n).map_err(|_| invalid(key, format!("{n} is out of range")))
}

/// RFC 3339 strings or numeric UNIX seconds.
fn decode_date(value: &Value) -> Result<DateTime<Utc>, PayloadError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| invalid(KEY_DATE, format!("'{s}': {e}"))),
        Value::Number(n) => {
            let secs = n
                .as_f64()
                .filter(|secs| secs.is_finite())
                .ok_or_else(|| invalid(KEY_DATE, format!("'{n}' is not a timestamp")))?;
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
                return Err(invalid(KEY_DATE, format!("'{n}' is out of range")));
            }
            Utc.timestamp_opt(whole as i64, nanos)
                .single()
                .ok_or_else(|| invalid(KEY_DATE, format!("'{n}' is out of range")))
        }
        other => Err(invalid(
            KEY_DATE,
            format!("expected timestamp, got {other}"),
        )),
    }
}
