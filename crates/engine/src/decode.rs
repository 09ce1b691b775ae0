//! Reply decoders
//!
//! Each decoder takes the reply's position in its stream so a shape error
//! can point at the exact command. Error replies become [`Error::Store`];
//! any other unexpected shape is [`Error::ResponseShape`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use recordkv_core::{Error, Result, Value};
use recordkv_storage::Reply;

/// A sorted-set member with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    /// Member as decoded from the store
    pub member: Value,
    /// Score
    pub score: f64,
}

impl ScoredMember {
    /// Build a scored member
    pub fn new(member: impl Into<Value>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Value fetched for a key, shaped by its store type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fetched {
    /// Key missing, or of a type with no fetch command
    Nil,
    /// Plain string value
    String(Value),
    /// All fields of a hash
    Hash(BTreeMap<String, Value>),
    /// All elements of a list
    List(Vec<Value>),
    /// All members of a sorted set, ascending by score
    SortedSet(Vec<ScoredMember>),
}

impl Fetched {
    /// True when nothing was fetched
    pub fn is_nil(&self) -> bool {
        matches!(self, Fetched::Nil)
    }
}

/// Fail on an error reply, pass anything else through
pub fn check_error(position: usize, reply: Reply) -> Result<Reply> {
    match reply {
        Reply::Error(message) => Err(Error::store(format!(
            "reply {} failed: {}",
            position, message
        ))),
        other => Ok(other),
    }
}

/// Integer reply
pub fn int(position: usize, reply: Reply) -> Result<i64> {
    match check_error(position, reply)? {
        Reply::Int(i) => Ok(i),
        other => Err(Error::response_shape(position, "integer", other.describe())),
    }
}

/// Non-negative integer reply
pub fn count(position: usize, reply: Reply) -> Result<u64> {
    let n = int(position, reply)?;
    u64::try_from(n).map_err(|_| Error::response_shape(position, "non-negative integer", n.to_string()))
}

/// Status reply text
pub fn status(position: usize, reply: Reply) -> Result<String> {
    match check_error(position, reply)? {
        Reply::Status(s) => Ok(s),
        other => Err(Error::response_shape(position, "status", other.describe())),
    }
}

/// Status reply that must be `OK`
///
/// A different status is a store-level failure, not a shape problem.
pub fn ok_status(position: usize, reply: Reply) -> Result<()> {
    let status = status(position, reply)?;
    if status == "OK" {
        Ok(())
    } else {
        Err(Error::store(format!(
            "reply {} returned status '{}' instead of OK",
            position, status
        )))
    }
}

/// Bulk reply that must equal `expected`
pub fn echo(position: usize, reply: Reply, expected: &str) -> Result<()> {
    match check_error(position, reply)? {
        Reply::Bulk(bytes) if bytes == expected.as_bytes() => Ok(()),
        other => Err(Error::response_shape(position, "echo of the tagged key", other.describe())),
    }
}

/// Optional bulk reply as a value
pub fn optional_value(position: usize, reply: Reply) -> Result<Option<Value>> {
    match check_error(position, reply)? {
        Reply::Nil => Ok(None),
        Reply::Bulk(bytes) => Ok(Some(Value::from_store_bytes(bytes))),
        other => Err(Error::response_shape(position, "bulk or nil", other.describe())),
    }
}

fn array(position: usize, reply: Reply) -> Result<Vec<Reply>> {
    match check_error(position, reply)? {
        Reply::Array(items) => Ok(items),
        Reply::Nil => Ok(Vec::new()),
        other => Err(Error::response_shape(position, "array", other.describe())),
    }
}

fn bulk(position: usize, reply: Reply) -> Result<Vec<u8>> {
    match reply {
        Reply::Bulk(bytes) => Ok(bytes),
        other => Err(Error::response_shape(position, "bulk element", other.describe())),
    }
}

/// Array of bulks as values (LRANGE)
pub fn values(position: usize, reply: Reply) -> Result<Vec<Value>> {
    array(position, reply)?
        .into_iter()
        .map(|item| bulk(position, item).map(Value::from_store_bytes))
        .collect()
}

/// Alternating field/value array as a map (HGETALL)
pub fn hash(position: usize, reply: Reply) -> Result<BTreeMap<String, Value>> {
    let items = array(position, reply)?;
    if items.len() % 2 != 0 {
        return Err(Error::response_shape(
            position,
            "field/value pairs",
            format!("array of {}", items.len()),
        ));
    }
    let mut map = BTreeMap::new();
    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        let field = String::from_utf8_lossy(&bulk(position, field)?).into_owned();
        map.insert(field, Value::from_store_bytes(bulk(position, value)?));
    }
    Ok(map)
}

/// Alternating member/score array (ZRANGE ... WITHSCORES)
pub fn scored(position: usize, reply: Reply) -> Result<Vec<ScoredMember>> {
    let items = array(position, reply)?;
    if items.len() % 2 != 0 {
        return Err(Error::response_shape(
            position,
            "member/score pairs",
            format!("array of {}", items.len()),
        ));
    }
    let mut members = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
        let member = Value::from_store_bytes(bulk(position, member)?);
        let raw = bulk(position, score)?;
        let score = parse_score(&raw).ok_or_else(|| {
            Error::response_shape(position, "numeric score", String::from_utf8_lossy(&raw))
        })?;
        members.push(ScoredMember { member, score });
    }
    Ok(members)
}

fn parse_score(raw: &[u8]) -> Option<f64> {
    match std::str::from_utf8(raw).ok()? {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        s => s.parse().ok(),
    }
}
