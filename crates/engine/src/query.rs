//! Key, type and value queries
//!
//! Keys are enumerated with SCAN, typed with one pipelined TYPE per key,
//! and fetched with one pipelined read per key whose command depends on
//! the type. Replies are decoded one-to-one against the key order.

use std::collections::HashSet;

use tracing::debug;

use recordkv_core::{DataType, Error, Result};
use recordkv_storage::{Command, Reply, StoreClient};

use crate::decode::{self, Fetched};

/// Keys with their store types, in discovery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedKeys {
    entries: Vec<(String, DataType)>,
}

impl TypedKeys {
    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no key matched
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Type of `key`, if it was found
    pub fn get(&self, key: &str) -> Option<DataType> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, t)| *t)
    }

    /// Keys and types in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (&str, DataType)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), *t))
    }

    /// Keys in discovery order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Keep only keys of `data_type`
    pub fn retain_type(&mut self, data_type: DataType) {
        self.entries.retain(|(_, t)| *t == data_type);
    }

    /// Consume into the underlying pairs
    pub fn into_vec(self) -> Vec<(String, DataType)> {
        self.entries
    }
}

/// Query layer over a store client
pub struct KeyQuery<'a, C: StoreClient + ?Sized> {
    client: &'a C,
    scan_count: usize,
}

impl<'a, C: StoreClient + ?Sized> KeyQuery<'a, C> {
    /// Create a query layer; `scan_count` is the SCAN batch size hint
    pub fn new(client: &'a C, scan_count: usize) -> Self {
        Self {
            client,
            scan_count: scan_count.max(1),
        }
    }

    /// All keys matching the glob `pattern`, without duplicates
    pub fn get_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut cursor = 0u64;
        let mut rounds = 0usize;
        loop {
            let reply = self.client.execute(Command::Scan {
                cursor,
                pattern: pattern.to_string(),
                count: self.scan_count,
            })?;
            let (next, batch) = decode_scan(rounds, reply)?;
            for key in batch {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
            rounds += 1;
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(target: "recordkv::query", pattern, keys = keys.len(), rounds, "Scanned keys");
        Ok(keys)
    }

    /// Keys matching `pattern` with their types
    pub fn get_keys_and_types(&self, pattern: &str) -> Result<TypedKeys> {
        let keys = self.get_keys(pattern)?;
        self.types_of(keys)
    }

    /// Keys matching `pattern` that hold `data_type`
    pub fn get_keys_of_type(&self, pattern: &str, data_type: DataType) -> Result<Vec<String>> {
        let mut typed = self.get_keys_and_types(pattern)?;
        typed.retain_type(data_type);
        Ok(typed.into_vec().into_iter().map(|(k, _)| k).collect())
    }

    /// Keys matching `pattern` with their values, optionally of one type
    ///
    /// Keys whose type has no fetch command (`set`, `none`) are skipped.
    pub fn get_keys_and_values(
        &self,
        pattern: &str,
        data_type: Option<DataType>,
    ) -> Result<Vec<(String, Fetched)>> {
        let mut typed = self.get_keys_and_types(pattern)?;
        if let Some(data_type) = data_type {
            typed.retain_type(data_type);
        }

        let mut keys = Vec::new();
        let mut commands = Vec::new();
        for (key, data_type) in typed.into_vec() {
            if let Some(command) = fetch_command(&key, data_type) {
                commands.push(command);
                keys.push((key, data_type));
            }
        }
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let replies = self.client.pipeline(commands)?;
        crate::tagged::pair_replies(keys, replies)?
            .into_iter()
            .map(|(position, (key, data_type), reply)| {
                Ok((key, decode_fetched(position, data_type, reply)?))
            })
            .collect()
    }

    /// Value of one key; its type is looked up when not given
    pub fn get(&self, key: &str, data_type: Option<DataType>) -> Result<Fetched> {
        let data_type = match data_type {
            Some(t) => t,
            None => decode_type(0, self.client.execute(Command::Type { key: key.to_string() })?)?,
        };
        match fetch_command(key, data_type) {
            Some(command) => decode_fetched(0, data_type, self.client.execute(command)?),
            None => Ok(Fetched::Nil),
        }
    }

    fn types_of(&self, keys: Vec<String>) -> Result<TypedKeys> {
        if keys.is_empty() {
            return Ok(TypedKeys::default());
        }
        let commands = keys
            .iter()
            .map(|key| Command::Type { key: key.clone() })
            .collect();
        let replies = self.client.pipeline(commands)?;
        let entries = crate::tagged::pair_replies(keys, replies)?
            .into_iter()
            .map(|(position, key, reply)| Ok((key, decode_type(position, reply)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(TypedKeys { entries })
    }
}

fn fetch_command(key: &str, data_type: DataType) -> Option<Command> {
    let key = key.to_string();
    match data_type {
        DataType::String => Some(Command::Get { key }),
        DataType::Hash => Some(Command::HGetAll { key }),
        DataType::List => Some(Command::LRange {
            key,
            start: 0,
            stop: -1,
        }),
        DataType::SortedSet => Some(Command::ZRange {
            key,
            start: 0,
            stop: -1,
            with_scores: true,
        }),
        DataType::Set | DataType::None => None,
    }
}

fn decode_fetched(position: usize, data_type: DataType, reply: Reply) -> Result<Fetched> {
    Ok(match data_type {
        DataType::String => match decode::optional_value(position, reply)? {
            Some(value) => Fetched::String(value),
            None => Fetched::Nil,
        },
        DataType::Hash => Fetched::Hash(decode::hash(position, reply)?),
        DataType::List => Fetched::List(decode::values(position, reply)?),
        DataType::SortedSet => Fetched::SortedSet(decode::scored(position, reply)?),
        DataType::Set | DataType::None => Fetched::Nil,
    })
}

fn decode_type(position: usize, reply: Reply) -> Result<DataType> {
    let tag = decode::status(position, reply)?;
    DataType::from_tag(&tag)
        .ok_or_else(|| Error::response_shape(position, "a known type tag", format!("status '{}'", tag)))
}

fn decode_scan(position: usize, reply: Reply) -> Result<(u64, Vec<String>)> {
    let parts = match decode::check_error(position, reply)? {
        Reply::Array(parts) if parts.len() == 2 => parts,
        other => return Err(Error::response_shape(position, "[cursor, keys]", other.describe())),
    };
    let mut parts = parts.into_iter();
    let (Some(cursor), Some(keys)) = (parts.next(), parts.next()) else {
        return Err(Error::response_shape(position, "[cursor, keys]", "short array"));
    };
    let cursor = match cursor {
        Reply::Bulk(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::response_shape(position, "numeric cursor", String::from_utf8_lossy(&bytes)))?,
        Reply::Int(i) if i >= 0 => i as u64,
        other => return Err(Error::response_shape(position, "numeric cursor", other.describe())),
    };
    let keys = decode::values(position, keys)?
        .into_iter()
        .map(|value| match value {
            recordkv_core::Value::String(s) => s,
            other => String::from_utf8_lossy(other.as_bytes().unwrap_or_default()).into_owned(),
        })
        .collect();
    Ok((cursor, keys))
}
