use std::fmt;
use std::str::FromStr;

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GdaError, Result};

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Null,
    Tinyint,
    Smallint,
    Integer,
    Bigint,
    Single,
    Double,
    Boolean,
    Date,
    Time,
    Timestamp,
    Varchar,
    Longvarchar,
    Binary,
    Guid,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Null => "null",
            FieldType::Tinyint => "tinyint",
            FieldType::Smallint => "smallint",
            FieldType::Integer => "integer",
            FieldType::Bigint => "bigint",
            FieldType::Single => "single",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Timestamp => "timestamp",
            FieldType::Varchar => "varchar",
            FieldType::Longvarchar => "longvarchar",
            FieldType::Binary => "binary",
            FieldType::Guid => "guid",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = GdaError;

    /// Accepts the canonical names plus the common SQL spellings.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "null" => Ok(FieldType::Null),
            "tinyint" => Ok(FieldType::Tinyint),
            "smallint" => Ok(FieldType::Smallint),
            "integer" | "int" => Ok(FieldType::Integer),
            "bigint" => Ok(FieldType::Bigint),
            "single" | "float" | "real" => Ok(FieldType::Single),
            "double" => Ok(FieldType::Double),
            "boolean" | "bool" | "bit" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "time" => Ok(FieldType::Time),
            "timestamp" | "datetime" | "datetime2" => Ok(FieldType::Timestamp),
            "varchar" | "nvarchar" | "char" | "nchar" | "string" => Ok(FieldType::Varchar),
            "longvarchar" | "text" | "ntext" | "xml" => Ok(FieldType::Longvarchar),
            "binary" | "varbinary" | "image" => Ok(FieldType::Binary),
            "guid" | "uuid" | "uniqueidentifier" => Ok(FieldType::Guid),
            other => Err(GdaError::Config(format!("Unknown field type: {other}"))),
        }
    }
}

/// A column value. Each variant carries its own payload, so reading a
/// value through the wrong getter is a checked error.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Tinyint(u8),
    Smallint(i16),
    Integer(i32),
    Bigint(i64),
    Single(f32),
    Double(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Varchar(String),
    Longvarchar(String),
    Binary(Vec<u8>),
    Guid(Uuid),
}

macro_rules! getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self) -> Result<$ty> {
            match self {
                Value::$variant(v) => Ok(v.clone()),
                other => Err(GdaError::TypeMismatch {
                    expected: FieldType::$variant,
                    found: other.field_type(),
                }),
            }
        }
    };
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Null => FieldType::Null,
            Value::Tinyint(_) => FieldType::Tinyint,
            Value::Smallint(_) => FieldType::Smallint,
            Value::Integer(_) => FieldType::Integer,
            Value::Bigint(_) => FieldType::Bigint,
            Value::Single(_) => FieldType::Single,
            Value::Double(_) => FieldType::Double,
            Value::Boolean(_) => FieldType::Boolean,
            Value::Date(_) => FieldType::Date,
            Value::Time(_) => FieldType::Time,
            Value::Timestamp(_) => FieldType::Timestamp,
            Value::Varchar(_) => FieldType::Varchar,
            Value::Longvarchar(_) => FieldType::Longvarchar,
            Value::Binary(_) => FieldType::Binary,
            Value::Guid(_) => FieldType::Guid,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    getter!(as_tinyint, Tinyint, u8);
    getter!(as_smallint, Smallint, i16);
    getter!(as_integer, Integer, i32);
    getter!(as_bigint, Bigint, i64);
    getter!(as_single, Single, f32);
    getter!(as_double, Double, f64);
    getter!(as_boolean, Boolean, bool);
    getter!(as_date, Date, NaiveDate);
    getter!(as_time, Time, NaiveTime);
    getter!(as_timestamp, Timestamp, NaiveDateTime);
    getter!(as_guid, Guid, Uuid);

    /// String content of a `Varchar` or `Longvarchar` value.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Varchar(s) | Value::Longvarchar(s) => Ok(s),
            other => Err(GdaError::TypeMismatch {
                expected: FieldType::Varchar,
                found: other.field_type(),
            }),
        }
    }

    pub fn as_binary(&self) -> Result<&[u8]> {
        match self {
            Value::Binary(b) => Ok(b),
            other => Err(GdaError::TypeMismatch {
                expected: FieldType::Binary,
                found: other.field_type(),
            }),
        }
    }

    /// Number of bytes the value occupies; 0 for NULL.
    pub fn actual_size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Tinyint(_) | Value::Boolean(_) => 1,
            Value::Smallint(_) => 2,
            Value::Integer(_) | Value::Single(_) => 4,
            Value::Bigint(_) | Value::Double(_) => 8,
            Value::Date(_) | Value::Time(_) => 6,
            Value::Timestamp(_) | Value::Guid(_) => 16,
            Value::Varchar(s) | Value::Longvarchar(s) => s.len(),
            Value::Binary(b) => b.len(),
        }
    }

    /// Convert to JSON for the C ABI. Bigints outside the JavaScript safe
    /// range and binary data become strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Tinyint(n) => serde_json::json!(n),
            Value::Smallint(n) => serde_json::json!(n),
            Value::Integer(n) => serde_json::json!(n),
            Value::Bigint(n) => {
                if (-(1i64 << 53)..=(1i64 << 53)).contains(n) {
                    serde_json::json!(n)
                } else {
                    serde_json::Value::String(n.to_string())
                }
            }
            Value::Single(n) => serde_json::json!(n),
            Value::Double(n) => serde_json::json!(n),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Date(d) => serde_json::Value::String(d.to_string()),
            Value::Time(t) => serde_json::Value::String(t.to_string()),
            Value::Timestamp(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Value::Varchar(s) | Value::Longvarchar(s) => serde_json::Value::String(s.clone()),
            Value::Binary(bytes) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ),
            Value::Guid(u) => serde_json::Value::String(u.to_string()),
        }
    }

    /// Build a value from JSON. With a type hint the JSON is coerced to
    /// that type; without one the JSON shape decides.
    pub fn from_json(json: &serde_json::Value, hint: Option<FieldType>) -> Result<Value> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        match hint {
            None | Some(FieldType::Null) => Ok(infer_from_json(json)),
            Some(ty) => coerce_json(json, ty),
        }
    }
}

fn infer_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if (i32::MIN as i64..=i32::MAX as i64).contains(&i) {
                    Value::Integer(i as i32)
                } else {
                    Value::Bigint(i)
                }
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Varchar(s.clone()),
        other => Value::Longvarchar(other.to_string()),
    }
}

fn coerce_json(json: &serde_json::Value, ty: FieldType) -> Result<Value> {
    let mismatch = || {
        GdaError::Config(format!("Cannot read {json} as {ty}"))
    };
    match ty {
        FieldType::Null => Ok(Value::Null),
        FieldType::Tinyint => json
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .map(Value::Tinyint)
            .ok_or_else(mismatch),
        FieldType::Smallint => json
            .as_i64()
            .and_then(|n| i16::try_from(n).ok())
            .map(Value::Smallint)
            .ok_or_else(mismatch),
        FieldType::Integer => json
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::Integer)
            .ok_or_else(mismatch),
        FieldType::Bigint => match json {
            serde_json::Value::String(s) => s.parse().map(Value::Bigint).map_err(|_| mismatch()),
            _ => json.as_i64().map(Value::Bigint).ok_or_else(mismatch),
        },
        FieldType::Single => json.as_f64().map(|f| Value::Single(f as f32)).ok_or_else(mismatch),
        FieldType::Double => json.as_f64().map(Value::Double).ok_or_else(mismatch),
        FieldType::Boolean => match json {
            serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
            serde_json::Value::Number(n) => Ok(Value::Boolean(n.as_i64() != Some(0))),
            _ => Err(mismatch()),
        },
        FieldType::Date => {
            let s = json.as_str().ok_or_else(mismatch)?;
            s.parse::<NaiveDate>()
                .map(Value::Date)
                .map_err(|e| GdaError::Config(format!("Invalid date: {e}")))
        }
        FieldType::Time => {
            let s = json.as_str().ok_or_else(mismatch)?;
            s.parse::<NaiveTime>()
                .map(Value::Time)
                .map_err(|e| GdaError::Config(format!("Invalid time: {e}")))
        }
        FieldType::Timestamp => {
            let s = json.as_str().ok_or_else(mismatch)?;
            parse_timestamp(s).map(Value::Timestamp)
        }
        FieldType::Varchar => match json {
            serde_json::Value::String(s) => Ok(Value::Varchar(s.clone())),
            other => Ok(Value::Varchar(other.to_string())),
        },
        FieldType::Longvarchar => match json {
            serde_json::Value::String(s) => Ok(Value::Longvarchar(s.clone())),
            other => Ok(Value::Longvarchar(other.to_string())),
        },
        FieldType::Binary => {
            let s = json.as_str().ok_or_else(mismatch)?;
            base64::engine::general_purpose::STANDARD
                .decode(s)
                .map(Value::Binary)
                .map_err(|e| GdaError::Config(format!("Invalid base64: {e}")))
        }
        FieldType::Guid => {
            let s = json.as_str().ok_or_else(mismatch)?;
            s.parse::<Uuid>()
                .map(Value::Guid)
                .map_err(|e| GdaError::Config(format!("Invalid UUID: {e}")))
        }
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    Err(GdaError::Config(format!("Invalid timestamp: {s}")))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("<NULL>"),
            Value::Tinyint(n) => write!(f, "{n}"),
            Value::Smallint(n) => write!(f, "{n}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Bigint(n) => write!(f, "{n}"),
            Value::Single(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::Boolean(b) => f.write_str(if *b { "true" } else { "false" }),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Timestamp(dt) => write!(f, "{dt}"),
            Value::Varchar(s) | Value::Longvarchar(s) => f.write_str(s),
            Value::Binary(bytes) => {
                for b in bytes {
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
            Value::Guid(u) => write!(f, "{u}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_getter_is_a_checked_error() {
        let v = Value::Varchar("abc".into());
        assert_eq!(v.as_str().unwrap(), "abc");
        match v.as_integer() {
            Err(GdaError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, FieldType::Integer);
                assert_eq!(found, FieldType::Varchar);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn longvarchar_reads_as_str() {
        assert_eq!(Value::Longvarchar("long".into()).as_str().unwrap(), "long");
    }

    #[test]
    fn null_has_zero_size_and_stringifies() {
        assert_eq!(Value::Null.actual_size(), 0);
        assert_eq!(Value::Null.to_string(), "<NULL>");
        assert!(Value::Null.as_boolean().is_err());
    }

    #[test]
    fn actual_size_follows_payload() {
        assert_eq!(Value::Integer(7).actual_size(), 4);
        assert_eq!(Value::Bigint(7).actual_size(), 8);
        assert_eq!(Value::Varchar("hello".into()).actual_size(), 5);
        assert_eq!(Value::Binary(vec![1, 2, 3]).actual_size(), 3);
    }

    #[test]
    fn stringify_matches_display_conventions() {
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Binary(vec![0xAB, 0x01]).to_string(), "AB01");
        let d = NaiveDate::from_ymd_opt(2001, 2, 3).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2001-02-03");
    }

    #[test]
    fn from_json_with_hint() {
        let v = Value::from_json(&serde_json::json!("2024-01-31"), Some(FieldType::Date)).unwrap();
        assert_eq!(v.as_date().unwrap(), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());

        let v = Value::from_json(&serde_json::json!("AQID"), Some(FieldType::Binary)).unwrap();
        assert_eq!(v.as_binary().unwrap(), &[1, 2, 3]);

        let v = Value::from_json(&serde_json::json!(1), Some(FieldType::Boolean)).unwrap();
        assert!(v.as_boolean().unwrap());

        assert!(Value::from_json(&serde_json::json!(300), Some(FieldType::Tinyint)).is_err());
        assert!(Value::from_json(&serde_json::json!("x"), Some(FieldType::Integer)).is_err());
    }

    #[test]
    fn from_json_without_hint_infers() {
        assert_eq!(
            Value::from_json(&serde_json::json!(5), None).unwrap(),
            Value::Integer(5)
        );
        assert_eq!(
            Value::from_json(&serde_json::json!(5_000_000_000i64), None).unwrap(),
            Value::Bigint(5_000_000_000)
        );
        assert_eq!(
            Value::from_json(&serde_json::json!("a"), None).unwrap(),
            Value::Varchar("a".into())
        );
        assert_eq!(
            Value::from_json(&serde_json::Value::Null, Some(FieldType::Integer)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn large_bigint_serializes_as_string() {
        assert_eq!(Value::Bigint(1 << 60).to_json(), serde_json::json!("1152921504606846976"));
        assert_eq!(Value::Bigint(42).to_json(), serde_json::json!(42));
    }

    #[test]
    fn field_type_parses_sql_spellings() {
        assert_eq!("INT".parse::<FieldType>().unwrap(), FieldType::Integer);
        assert_eq!("nvarchar".parse::<FieldType>().unwrap(), FieldType::Varchar);
        assert_eq!("uniqueidentifier".parse::<FieldType>().unwrap(), FieldType::Guid);
        assert!("geometry".parse::<FieldType>().is_err());
    }

    #[test]
    fn timestamp_accepts_space_and_t_separators() {
        assert!(parse_timestamp("2024-01-01T10:00:00").is_ok());
        assert!(parse_timestamp("2024-01-01 10:00:00.250").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
