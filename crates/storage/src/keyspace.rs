//! One logical database of the in-memory store
//!
//! A `Keyspace` owns the typed entries of a single database, the per-key
//! modification versions used by WATCH, and the TTL index. It applies
//! single commands; locking and database selection live in
//! [`crate::memory::MemoryStore`].
//!
//! # Design Notes
//!
//! - **Lazy expiration**: every command first drops its own keys if they
//!   are past their expiry. `purge_expired` sweeps the rest in bulk.
//! - **Per-key versions**: every modification stamps the key with a fresh
//!   global version. Removing a key drops its version and stamps the
//!   keyspace-wide removal mark instead, which absent keys report. A
//!   watched key is unchanged iff its version is unchanged.
//! - **SCAN cursors**: a non-zero cursor names the last key a previous
//!   page examined. The next page resumes strictly after that key, so
//!   deletes between pages never shift live keys out of the scan.
//! - **Empty aggregates vanish**: a list or sorted set trimmed to nothing
//!   is removed, so TYPE reports `none` afterwards.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::command::Command;
use crate::pattern::glob_match;
use crate::reply::Reply;
use crate::ttl::TtlIndex;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
const OVERFLOW: &str = "ERR increment or decrement would overflow";
const NOT_FLOAT: &str = "ERR value is not a valid float";
const INVALID_CURSOR: &str = "ERR invalid cursor";

/// Open SCAN cursors kept per keyspace; the oldest is dropped beyond this
const MAX_SCAN_CURSORS: usize = 1024;

/// Typed payload of a key
#[derive(Debug, Clone)]
enum Data {
    Str(Vec<u8>),
    Hash(BTreeMap<String, Vec<u8>>),
    List(VecDeque<Vec<u8>>),
    /// Kept sorted by (score, member)
    ZSet(Vec<(f64, Vec<u8>)>),
}

impl Data {
    fn type_tag(&self) -> &'static str {
        match self {
            Data::Str(_) => "string",
            Data::Hash(_) => "hash",
            Data::List(_) => "list",
            Data::ZSet(_) => "zset",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    data: Data,
    expires_at: Option<Instant>,
}

/// Resolve an inclusive Redis-style index range against a length
///
/// Negative indices count from the end. Returns `None` for an empty range.
pub(crate) fn resolve_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Format a score the way the server prints doubles
pub(crate) fn format_score(score: f64) -> String {
    if score.is_infinite() {
        if score > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        score.to_string()
    }
}

/// Entries, versions and TTLs of one database
#[derive(Debug, Default)]
pub(crate) struct Keyspace {
    entries: BTreeMap<String, Entry>,
    /// Versions of live keys only
    versions: HashMap<String, u64>,
    /// Version stamped by the most recent key removal
    removed_version: u64,
    ttl: TtlIndex,
    /// Cursor id to the last key its page examined
    scan_cursors: BTreeMap<u64, String>,
    next_cursor: u64,
}

impl Keyspace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current modification version of a key
    ///
    /// An absent key reports the latest removal mark (0 before any removal).
    pub(crate) fn version_of(&mut self, key: &str, clock: &AtomicU64) -> u64 {
        self.expire_if_due(key, Instant::now(), clock);
        self.versions
            .get(key)
            .copied()
            .unwrap_or(self.removed_version)
    }

    /// Number of live keys
    pub(crate) fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .values()
            .filter(|e| e.expires_at.map_or(true, |at| at > now))
            .count()
    }

    /// Drop every key whose expiry has passed; returns how many were removed
    pub(crate) fn purge_expired(&mut self, clock: &AtomicU64) -> usize {
        let now = Instant::now();
        let due = self.ttl.drain_expired(now);
        let mut removed = 0;
        for key in due {
            let expired = self
                .entries
                .get(&key)
                .and_then(|e| e.expires_at)
                .is_some_and(|at| at <= now);
            if expired {
                self.entries.remove(&key);
                self.touch(&key, clock);
                removed += 1;
            }
        }
        removed
    }

    /// Remove everything and stamp the removal mark
    pub(crate) fn flush(&mut self, clock: &AtomicU64) {
        self.entries.clear();
        self.ttl.clear();
        self.versions.clear();
        self.scan_cursors.clear();
        self.removed_version = clock.fetch_add(1, Ordering::SeqCst) + 1;
    }

    /// Apply one command and return its reply
    pub(crate) fn apply(&mut self, command: &Command, clock: &AtomicU64) -> Reply {
        let now = Instant::now();
        for key in command.keys() {
            self.expire_if_due(key, now, clock);
        }

        let reply = self.dispatch(command, now, clock);

        if command.is_write() && !reply.is_error() && !matches!(command, Command::Del { .. }) {
            for key in command.keys() {
                self.touch(key, clock);
            }
        }
        reply
    }

    fn dispatch(&mut self, command: &Command, now: Instant, clock: &AtomicU64) -> Reply {
        match command {
            Command::Get { key } => match self.entries.get(key).map(|e| &e.data) {
                None => Reply::Nil,
                Some(Data::Str(v)) => Reply::Bulk(v.clone()),
                Some(_) => Reply::error(WRONGTYPE),
            },
            Command::Set { key, value } => {
                self.remove_entry(key);
                self.entries.insert(
                    key.clone(),
                    Entry {
                        data: Data::Str(value.clone()),
                        expires_at: None,
                    },
                );
                Reply::ok()
            }
            Command::Del { keys } => {
                let mut removed = 0;
                for key in keys {
                    if self.remove_entry(key) {
                        self.touch(key, clock);
                        removed += 1;
                    }
                }
                Reply::Int(removed)
            }
            Command::Exists { key } => Reply::Int(self.entries.contains_key(key) as i64),
            Command::HSet { key, field, value } => {
                match self.entry_or(key, || Data::Hash(BTreeMap::new())) {
                    Data::Hash(h) => Reply::Int(h.insert(field.clone(), value.clone()).is_none() as i64),
                    _ => Reply::error(WRONGTYPE),
                }
            }
            Command::HGetAll { key } => match self.entries.get(key).map(|e| &e.data) {
                None => Reply::Array(Vec::new()),
                Some(Data::Hash(h)) => Reply::Array(
                    h.iter()
                        .flat_map(|(f, v)| [Reply::bulk(f.as_bytes()), Reply::Bulk(v.clone())])
                        .collect(),
                ),
                Some(_) => Reply::error(WRONGTYPE),
            },
            Command::Incr { key } => self.increment(key, 1),
            Command::IncrBy { key, by } => self.increment(key, *by),
            Command::DecrBy { key, by } => match by.checked_neg() {
                Some(neg) => self.increment(key, neg),
                None => Reply::error(OVERFLOW),
            },
            Command::Expire { key, secs } => {
                if !self.entries.contains_key(key) {
                    return Reply::Int(0);
                }
                if *secs == 0 {
                    self.remove_entry(key);
                } else {
                    self.set_expiry(key, now + Duration::from_secs(*secs));
                }
                Reply::Int(1)
            }
            Command::ExpireAt { key, timestamp } => {
                if !self.entries.contains_key(key) {
                    return Reply::Int(0);
                }
                let remaining = timestamp - chrono::Utc::now().timestamp();
                if remaining <= 0 {
                    self.remove_entry(key);
                } else {
                    self.set_expiry(key, now + Duration::from_secs(remaining as u64));
                }
                Reply::Int(1)
            }
            Command::Ttl { key } => match self.entries.get(key) {
                None => Reply::Int(-2),
                Some(Entry { expires_at: None, .. }) => Reply::Int(-1),
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => {
                    let millis = at.saturating_duration_since(now).as_millis() as i64;
                    Reply::Int((millis + 500) / 1000)
                }
            },
            Command::LPush { key, values } | Command::RPush { key, values } => {
                let front = matches!(command, Command::LPush { .. });
                match self.entry_or(key, || Data::List(VecDeque::new())) {
                    Data::List(list) => {
                        for value in values {
                            if front {
                                list.push_front(value.clone());
                            } else {
                                list.push_back(value.clone());
                            }
                        }
                        Reply::Int(list.len() as i64)
                    }
                    _ => Reply::error(WRONGTYPE),
                }
            }
            Command::LTrim { key, start, stop } => {
                let emptied = match self.entries.get_mut(key).map(|e| &mut e.data) {
                    None => return Reply::ok(),
                    Some(Data::List(list)) => match resolve_range(*start, *stop, list.len()) {
                        Some((s, e)) => {
                            list.truncate(e + 1);
                            list.drain(..s);
                            false
                        }
                        None => true,
                    },
                    Some(_) => return Reply::error(WRONGTYPE),
                };
                if emptied {
                    self.remove_entry(key);
                }
                Reply::ok()
            }
            Command::LRange { key, start, stop } => match self.entries.get(key).map(|e| &e.data) {
                None => Reply::Array(Vec::new()),
                Some(Data::List(list)) => match resolve_range(*start, *stop, list.len()) {
                    Some((s, e)) => Reply::Array(
                        list.range(s..=e).map(|v| Reply::Bulk(v.clone())).collect(),
                    ),
                    None => Reply::Array(Vec::new()),
                },
                Some(_) => Reply::error(WRONGTYPE),
            },
            Command::ZAdd { key, score, member } => {
                if score.is_nan() {
                    return Reply::error(NOT_FLOAT);
                }
                match self.entry_or(key, || Data::ZSet(Vec::new())) {
                    Data::ZSet(set) => {
                        let existed = match set.iter().position(|(_, m)| m == member) {
                            Some(pos) => {
                                set.remove(pos);
                                true
                            }
                            None => false,
                        };
                        let at = set
                            .binary_search_by(|(s, m)| {
                                s.total_cmp(score).then_with(|| m.as_slice().cmp(member.as_slice()))
                            })
                            .unwrap_or_else(|pos| pos);
                        set.insert(at, (*score, member.clone()));
                        Reply::Int(!existed as i64)
                    }
                    _ => Reply::error(WRONGTYPE),
                }
            }
            Command::ZRange {
                key,
                start,
                stop,
                with_scores,
            } => match self.entries.get(key).map(|e| &e.data) {
                None => Reply::Array(Vec::new()),
                Some(Data::ZSet(set)) => match resolve_range(*start, *stop, set.len()) {
                    Some((s, e)) => Reply::Array(
                        set[s..=e]
                            .iter()
                            .flat_map(|(score, member)| {
                                let mut items = vec![Reply::Bulk(member.clone())];
                                if *with_scores {
                                    items.push(Reply::bulk(format_score(*score)));
                                }
                                items
                            })
                            .collect(),
                    ),
                    None => Reply::Array(Vec::new()),
                },
                Some(_) => Reply::error(WRONGTYPE),
            },
            Command::ZRemRangeByRank { key, start, stop } => {
                let (removed, emptied) = match self.entries.get_mut(key).map(|e| &mut e.data) {
                    None => return Reply::Int(0),
                    Some(Data::ZSet(set)) => match resolve_range(*start, *stop, set.len()) {
                        Some((s, e)) => {
                            set.drain(s..=e);
                            (e - s + 1, set.is_empty())
                        }
                        None => (0, false),
                    },
                    Some(_) => return Reply::error(WRONGTYPE),
                };
                if emptied {
                    self.remove_entry(key);
                }
                Reply::Int(removed as i64)
            }
            Command::ZRem { key, members } => {
                let (removed, emptied) = match self.entries.get_mut(key).map(|e| &mut e.data) {
                    None => return Reply::Int(0),
                    Some(Data::ZSet(set)) => {
                        let before = set.len();
                        set.retain(|(_, m)| !members.contains(m));
                        (before - set.len(), set.is_empty())
                    }
                    Some(_) => return Reply::error(WRONGTYPE),
                };
                if emptied {
                    self.remove_entry(key);
                }
                Reply::Int(removed as i64)
            }
            Command::Type { key } => Reply::Status(
                self.entries
                    .get(key)
                    .map_or("none", |e| e.data.type_tag())
                    .to_string(),
            ),
            Command::Scan {
                cursor,
                pattern,
                count,
            } => self.scan(*cursor, pattern, *count, now),
            Command::Echo { message } => Reply::bulk(message.as_bytes()),
            Command::FlushDb => {
                self.flush(clock);
                Reply::ok()
            }
            Command::Select { .. } | Command::ConfigGet { .. } | Command::FlushAll => {
                Reply::error(format!("ERR {} is not a keyspace command", command.name()))
            }
        }
    }

    /// Examine up to `count` keys after the cursor's resume point
    ///
    /// Cursors are single use: continuing from one retires it.
    fn scan(&mut self, cursor: u64, pattern: &str, count: usize, now: Instant) -> Reply {
        let count = count.max(1);
        let after = match cursor {
            0 => None,
            id => match self.scan_cursors.remove(&id) {
                Some(last) => Some(last),
                None => return Reply::error(INVALID_CURSOR),
            },
        };
        let lower = match after.as_deref() {
            Some(last) => Bound::Excluded(last),
            None => Bound::Unbounded,
        };

        let mut keys = Vec::new();
        let mut last = None;
        for (key, entry) in self.entries.range::<str, _>((lower, Bound::Unbounded)).take(count) {
            last = Some(key);
            if entry.expires_at.is_some_and(|at| at <= now) {
                continue;
            }
            if glob_match(pattern, key) {
                keys.push(Reply::bulk(key.as_bytes()));
            }
        }
        let last = last.cloned();

        let next = match last {
            Some(last) if self.has_keys_after(&last) => self.park_cursor(last),
            _ => 0,
        };
        Reply::Array(vec![Reply::bulk(next.to_string()), Reply::Array(keys)])
    }

    fn has_keys_after(&self, key: &str) -> bool {
        self.entries
            .range::<str, _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .is_some()
    }

    fn park_cursor(&mut self, last: String) -> u64 {
        if self.scan_cursors.len() >= MAX_SCAN_CURSORS {
            self.scan_cursors.pop_first();
        }
        self.next_cursor += 1;
        self.scan_cursors.insert(self.next_cursor, last);
        self.next_cursor
    }

    fn increment(&mut self, key: &str, by: i64) -> Reply {
        let current = match self.entries.get(key).map(|e| &e.data) {
            None => 0,
            Some(Data::Str(v)) => match std::str::from_utf8(v).ok().and_then(|s| s.parse::<i64>().ok()) {
                Some(n) => n,
                None => return Reply::error(NOT_INTEGER),
            },
            Some(_) => return Reply::error(WRONGTYPE),
        };
        let Some(next) = current.checked_add(by) else {
            return Reply::error(OVERFLOW);
        };
        let bytes = next.to_string().into_bytes();
        match self.entries.get_mut(key) {
            Some(entry) => entry.data = Data::Str(bytes),
            None => {
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        data: Data::Str(bytes),
                        expires_at: None,
                    },
                );
            }
        }
        Reply::Int(next)
    }

    fn entry_or(&mut self, key: &str, make: impl FnOnce() -> Data) -> &mut Data {
        &mut self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                data: make(),
                expires_at: None,
            })
            .data
    }

    fn set_expiry(&mut self, key: &str, at: Instant) {
        if let Some(entry) = self.entries.get_mut(key) {
            if let Some(old) = entry.expires_at.replace(at) {
                self.ttl.remove(old, key);
            }
            self.ttl.insert(at, key.to_string());
        }
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                if let Some(at) = entry.expires_at {
                    self.ttl.remove(at, key);
                }
                true
            }
            None => false,
        }
    }

    fn expire_if_due(&mut self, key: &str, now: Instant, clock: &AtomicU64) {
        let due = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now);
        if due {
            self.remove_entry(key);
            self.touch(key, clock);
        }
    }

    fn touch(&mut self, key: &str, clock: &AtomicU64) {
        let version = clock.fetch_add(1, Ordering::SeqCst) + 1;
        if self.entries.contains_key(key) {
            self.versions.insert(key.to_string(), version);
        } else {
            self.versions.remove(key);
            self.removed_version = version;
        }
    }
}
