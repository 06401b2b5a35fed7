//! Opaque keyset cursor codec
//!
//! A cursor is the ordered tuple of sort-key values of a boundary row. Each
//! value carries its own type tag, so decoding needs no schema. The token is
//! a versioned JSON envelope encoded as URL-safe base64 without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::QueryError;
use super::metadata::DataType;
use crate::utils::time::{millis_to_datetime, parse_timestamp};

const CURSOR_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum CursorValue {
    Null,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl CursorValue {
    /// Capture a result-row value for a sort key of the given type
    ///
    /// Temporal columns accept RFC 3339 strings and epoch milliseconds.
    pub fn from_row_value(field: &str, value: &Value, data_type: DataType) -> Result<Self, QueryError> {
        if data_type == DataType::Timestamp {
            return match value {
                Value::Null => Ok(Self::Null),
                Value::String(s) => parse_timestamp(s)
                    .map(Self::Timestamp)
                    .ok_or_else(|| QueryError::unsupported_temporal(field, value)),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(millis_to_datetime)
                    .map(Self::Timestamp)
                    .ok_or_else(|| QueryError::unsupported_temporal(field, value)),
                _ => Err(QueryError::unsupported_temporal(field, value)),
            };
        }

        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .ok_or_else(|| QueryError::invalid_operand(field, value)),
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(QueryError::invalid_operand(field, value)),
        }
    }

    fn to_wire(&self) -> WireValue {
        match self {
            Self::Null => WireValue::Null,
            Self::String(s) => WireValue::Str(s.clone()),
            Self::Int(i) => WireValue::Int(*i),
            // Shortest round-trip text keeps every bit of the float
            Self::Float(f) => WireValue::Float(f.to_string()),
            Self::Bool(b) => WireValue::Bool(*b),
            Self::Timestamp(ts) => WireValue::Ts(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }

    fn from_wire(wire: WireValue) -> Result<Self, QueryError> {
        Ok(match wire {
            WireValue::Null => Self::Null,
            WireValue::Str(s) => Self::String(s),
            WireValue::Int(i) => Self::Int(i),
            WireValue::Float(s) => Self::Float(
                s.parse::<f64>()
                    .map_err(|_| QueryError::InvalidCursor(format!("bad float {}", s)))?,
            ),
            WireValue::Bool(b) => Self::Bool(b),
            WireValue::Ts(s) => Self::Timestamp(
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| QueryError::InvalidCursor(format!("bad timestamp {}", s)))?,
            ),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
enum WireValue {
    Null,
    Str(String),
    Int(i64),
    Float(String),
    Bool(bool),
    Ts(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "ver")]
    version: u8,
    #[serde(rename = "k")]
    values: Vec<WireValue>,
}

/// Encode sort-key values into an opaque token
pub fn encode(values: &[CursorValue]) -> Result<String, QueryError> {
    let envelope = Envelope {
        version: CURSOR_VERSION,
        values: values.iter().map(CursorValue::to_wire).collect(),
    };
    let json = serde_json::to_vec(&envelope).map_err(|e| QueryError::InvalidCursor(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a token produced by [`encode`]
pub fn decode(token: &str) -> Result<Vec<CursorValue>, QueryError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| QueryError::InvalidCursor("invalid cursor format".to_string()))?;
    let envelope: Envelope = serde_json::from_slice(&bytes)
        .map_err(|_| QueryError::InvalidCursor("invalid cursor payload".to_string()))?;
    if envelope.version != CURSOR_VERSION {
        return Err(QueryError::InvalidCursor(format!(
            "unsupported cursor version {}",
            envelope.version
        )));
    }
    envelope.values.into_iter().map(CursorValue::from_wire).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_round_trip_all_kinds() {
        let values = vec![
            CursorValue::String("héllo, wörld".into()),
            CursorValue::Int(-42),
            CursorValue::Int(i64::MAX),
            CursorValue::Float(0.1 + 0.2),
            CursorValue::Float(-1e-300),
            CursorValue::Bool(true),
            CursorValue::Timestamp(ts("2024-02-29T23:59:59.123456789Z")),
            CursorValue::Null,
        ];
        let token = encode(&values).unwrap();
        assert_eq!(decode(&token).unwrap(), values);
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = encode(&[CursorValue::String("??>>~~".repeat(10))]).unwrap();
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_empty_round_trip() {
        let token = encode(&[]).unwrap();
        assert!(decode(&token).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("!!!"), Err(QueryError::InvalidCursor(_))));
        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert!(matches!(decode(&not_json), Err(QueryError::InvalidCursor(_))));
        let wrong_version = URL_SAFE_NO_PAD.encode(r#"{"ver":9,"k":[]}"#);
        assert!(matches!(
            decode(&wrong_version),
            Err(QueryError::InvalidCursor(_))
        ));
        let bad_float = URL_SAFE_NO_PAD.encode(r#"{"ver":1,"k":[{"t":"float","v":"x"}]}"#);
        assert!(decode(&bad_float).is_err());
    }

    #[test]
    fn test_from_row_value_plain() {
        assert_eq!(
            CursorValue::from_row_value("age", &json!(3), DataType::Integer).unwrap(),
            CursorValue::Int(3)
        );
        assert_eq!(
            CursorValue::from_row_value("score", &json!(2.5), DataType::Float).unwrap(),
            CursorValue::Float(2.5)
        );
        assert!(CursorValue::from_row_value("tags", &json!([1]), DataType::Json).is_err());
    }

    #[test]
    fn test_from_row_value_temporal() {
        let expected = CursorValue::Timestamp(ts("2024-01-01T00:00:00Z"));
        assert_eq!(
            CursorValue::from_row_value("birthday", &json!("2024-01-01T00:00:00Z"), DataType::Timestamp)
                .unwrap(),
            expected
        );
        assert_eq!(
            CursorValue::from_row_value("birthday", &json!(1_704_067_200_000_i64), DataType::Timestamp)
                .unwrap(),
            expected
        );
        let err = CursorValue::from_row_value("birthday", &json!(true), DataType::Timestamp)
            .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedTemporal { .. }));
    }
}
