use std::fmt;

use serde::Serialize;

use crate::value::FieldType;

/// Error types for the recordset engine and its providers.
pub enum GdaError {
    Config(String),
    Connection(String),
    Command(String),
    Transport(String),
    Pool(String),
    Cancelled,
    NoConnection,
    NotOpen,
    AlreadyOpen,
    NoCurrentRow,
    FieldNotFound(String),
    FieldOutOfRange(usize),
    DuplicateField(String),
    TypeMismatch {
        expected: FieldType,
        found: FieldType,
    },
    InvalidPosition,
    Unsupported(String),
}

impl GdaError {
    /// Stable numeric code, reported as `ErrorRecord::number`.
    pub fn code(&self) -> i32 {
        match self {
            GdaError::Config(_) => 1,
            GdaError::Connection(_) => 2,
            GdaError::Command(_) => 3,
            GdaError::Transport(_) => 4,
            GdaError::Pool(_) => 5,
            GdaError::Cancelled => 6,
            GdaError::NoConnection => 10,
            GdaError::NotOpen => 11,
            GdaError::AlreadyOpen => 12,
            GdaError::NoCurrentRow => 13,
            GdaError::FieldNotFound(_) => 14,
            GdaError::FieldOutOfRange(_) => 15,
            GdaError::DuplicateField(_) => 16,
            GdaError::TypeMismatch { .. } => 17,
            GdaError::InvalidPosition => 18,
            GdaError::Unsupported(_) => 19,
        }
    }

    /// Build the record appended to a connection's error list.
    pub fn to_record(&self, source: &str) -> ErrorRecord {
        ErrorRecord {
            number: self.code(),
            description: self.to_string(),
            source: source.to_string(),
            sqlstate: self.sqlstate().map(str::to_string),
            native_message: match self {
                GdaError::Connection(msg)
                | GdaError::Command(msg)
                | GdaError::Transport(msg)
                | GdaError::Pool(msg) => Some(msg.clone()),
                _ => None,
            },
        }
    }

    fn sqlstate(&self) -> Option<&'static str> {
        match self {
            GdaError::Connection(_) | GdaError::Pool(_) => Some("08000"),
            GdaError::NoConnection => Some("08003"),
            GdaError::Command(_) => Some("42000"),
            GdaError::InvalidPosition | GdaError::NoCurrentRow => Some("24000"),
            GdaError::AlreadyOpen | GdaError::NotOpen => Some("24000"),
            GdaError::Cancelled => Some("HY008"),
            GdaError::Unsupported(_) => Some("HYC00"),
            _ => None,
        }
    }
}

impl fmt::Display for GdaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GdaError::Config(msg) => write!(f, "Config error: {msg}"),
            GdaError::Connection(msg) => write!(f, "Connection error: {msg}"),
            GdaError::Command(msg) => write!(f, "Command error: {msg}"),
            GdaError::Transport(msg) => write!(f, "Transport error: {msg}"),
            GdaError::Pool(msg) => write!(f, "Pool error: {msg}"),
            GdaError::Cancelled => write!(f, "Operation cancelled"),
            GdaError::NoConnection => write!(f, "Recordset has no connection"),
            GdaError::NotOpen => write!(f, "Recordset is not open"),
            GdaError::AlreadyOpen => write!(f, "Recordset is already open"),
            GdaError::NoCurrentRow => write!(f, "Recordset is not positioned on a row"),
            GdaError::FieldNotFound(name) => write!(f, "No field named '{name}'"),
            GdaError::FieldOutOfRange(idx) => write!(f, "Field index {idx} out of range"),
            GdaError::DuplicateField(name) => write!(f, "Field '{name}' already exists"),
            GdaError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {expected}, found {found}")
            }
            GdaError::InvalidPosition => write!(f, "Invalid recordset position"),
            GdaError::Unsupported(msg) => write!(f, "Unsupported: {msg}"),
        }
    }
}

impl fmt::Debug for GdaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for GdaError {}

impl From<mssql_client::Error> for GdaError {
    fn from(e: mssql_client::Error) -> Self {
        match e {
            mssql_client::Error::Config(msg) => GdaError::Config(msg),
            mssql_client::Error::Connection(msg) => GdaError::Connection(msg),
            mssql_client::Error::ConnectionClosed => {
                GdaError::Connection("Connection closed".into())
            }
            mssql_client::Error::ConnectTimeout
            | mssql_client::Error::ConnectionTimeout
            | mssql_client::Error::TlsTimeout => {
                GdaError::Connection("Connection timeout".into())
            }
            mssql_client::Error::CommandTimeout => GdaError::Transport("Command timeout".into()),
            mssql_client::Error::Query(msg) => GdaError::Command(msg),
            mssql_client::Error::Transaction(msg) => GdaError::Command(msg),
            mssql_client::Error::Server {
                number,
                message,
                class,
                ..
            } => GdaError::Command(format!(
                "SQL Server error {number} (severity {class}): {message}"
            )),
            mssql_client::Error::Authentication(e) => {
                GdaError::Connection(format!("Authentication error: {e}"))
            }
            mssql_client::Error::Cancelled => GdaError::Cancelled,
            other => GdaError::Transport(format!("{other}")),
        }
    }
}

impl From<mssql_driver_pool::PoolError> for GdaError {
    fn from(e: mssql_driver_pool::PoolError) -> Self {
        use mssql_driver_pool::PoolError;
        match e {
            PoolError::Timeout => GdaError::Pool("Connection timeout: pool exhausted".into()),
            PoolError::AcquisitionTimeout(d) => GdaError::Pool(format!(
                "Connection timeout after {}ms: pool exhausted",
                d.as_millis()
            )),
            PoolError::PoolClosed => GdaError::Pool("Pool is closed".into()),
            PoolError::MaxConnectionsReached { max } => GdaError::Pool(format!(
                "Pool exhausted: maximum connections ({max}) reached"
            )),
            PoolError::ConnectionCreation(msg) => {
                GdaError::Pool(format!("Could not establish connection: {msg}"))
            }
            PoolError::Connection(msg) => GdaError::Pool(format!("Connection error: {msg}")),
            PoolError::UnhealthyConnection(msg) => {
                GdaError::Pool(format!("Connection health check failed: {msg}"))
            }
            PoolError::ResetFailed(msg) => {
                GdaError::Pool(format!("Connection reset failed: {msg}"))
            }
            PoolError::Configuration(msg) => {
                GdaError::Pool(format!("Pool configuration error: {msg}"))
            }
            PoolError::ValidationFailed(msg) => {
                GdaError::Pool(format!("Connection validation failed: {msg}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GdaError>;

/// One entry of a connection's error list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub number: i32,
    pub description: String,
    pub source: String,
    pub sqlstate: Option<String>,
    pub native_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_code_and_source() {
        let rec = GdaError::Transport("socket reset".into()).to_record("fetch");
        assert_eq!(rec.number, 4);
        assert_eq!(rec.source, "fetch");
        assert_eq!(rec.description, "Transport error: socket reset");
        assert_eq!(rec.native_message.as_deref(), Some("socket reset"));
    }

    #[test]
    fn precondition_errors_have_no_native_message() {
        let rec = GdaError::NoCurrentRow.to_record("field");
        assert_eq!(rec.sqlstate.as_deref(), Some("24000"));
        assert!(rec.native_message.is_none());
    }

    #[test]
    fn type_mismatch_names_both_types() {
        let err = GdaError::TypeMismatch {
            expected: FieldType::Integer,
            found: FieldType::Varchar,
        };
        assert_eq!(err.to_string(), "Type mismatch: expected integer, found varchar");
    }
}
