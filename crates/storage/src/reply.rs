//! Store replies

use std::fmt;

/// A single reply from the store
///
/// Error replies are values, not `Err`: inside a pipeline or a MULTI block
/// one failing command does not stop the others, so the caller decides what
/// an error reply at a given position means.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Missing value
    Nil,
    /// Simple status string such as `OK` or a TYPE tag
    Status(String),
    /// Integer reply
    Int(i64),
    /// Binary-safe string
    Bulk(Vec<u8>),
    /// Nested replies
    Array(Vec<Reply>),
    /// Error reply
    Error(String),
}

impl Reply {
    /// The canonical `OK` status
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Build an error reply
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    /// Build a bulk reply from anything byte-like
    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(bytes.into())
    }

    /// True for a status reply equal to `OK`
    pub fn is_ok_status(&self) -> bool {
        matches!(self, Reply::Status(s) if s == "OK")
    }

    /// True for an error reply
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Integer payload, if this is an integer reply
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Reply::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Short human-readable description, used in shape errors
    pub fn describe(&self) -> String {
        match self {
            Reply::Nil => "nil".to_string(),
            Reply::Status(s) => format!("status '{}'", s),
            Reply::Int(i) => format!("integer {}", i),
            Reply::Bulk(b) => format!("bulk '{}'", String::from_utf8_lossy(b)),
            Reply::Array(items) => format!("array of {}", items.len()),
            Reply::Error(e) => format!("error '{}'", e),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
