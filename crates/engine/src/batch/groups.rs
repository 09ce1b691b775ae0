//! Typed argument groups and the commands each one queues

use recordkv_core::{Error, Result, Value};
use recordkv_storage::Command;

use super::args::{numeric, ArgumentGroup, SlotReader};
use crate::tagged::TaggedBatch;

const LIST: &str = "list";
const SORTED_SET: &str = "sorted_set";

const EXPECT_VALUES: &str = "an array that contains the values";
const EXPECT_CAP: &str = "a number that limits the list size";
const EXPECT_EXPIRE: &str = "a number that sets the expire time duration in seconds";
const EXPECT_PUSH_SIDE: &str =
    "a boolean indicating whether to push the values to the left or right of the list";
const EXPECT_POP_INDEX: &str = "a number that determines the starting/ending index to pop in the list";
const EXPECT_POP_SIDE: &str =
    "a boolean indicating whether to pop the values from the left or right of the list";
const EXPECT_MEMBERS: &str = "a map of members to numeric scores";
const EXPECT_START: &str = "a number that determines the starting index to remove in the sorted set";
const EXPECT_STOP: &str = "a number that determines the ending index to remove in the sorted set";

/// How to read the reply of a batch command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchSlot {
    /// Push / ZADD / EXPIRE counts: only error replies matter
    Bookkeeping,
    /// ECHO of the group's key
    Echo { group: usize },
    /// Data that is the group's result as soon as it arrives
    Payload { group: usize },
    /// Data held until the next confirmation of the same group
    Pending { group: usize },
    /// LTRIM status confirming a pending payload
    TrimStatus { group: usize },
    /// Removed count confirming a pending payload when positive
    Removed { group: usize },
}

/// Tagged commands of a batch call
pub(crate) type GroupBatch = TaggedBatch<BatchSlot>;

/// A group that knows which commands it needs
pub(crate) trait QueueGroup: ArgumentGroup {
    fn queue(&self, group: usize, echo: bool, batch: &mut GroupBatch) -> Result<()>;
}

fn encode_all(values: &[Value]) -> Result<Vec<Vec<u8>>> {
    values.iter().map(Value::to_store_bytes).collect()
}

// ============================================================================
// List append
// ============================================================================

/// Push values onto a list, trim it to a cap and set its expiry
#[derive(Debug, Clone, PartialEq)]
pub struct ListAppend {
    /// List key
    pub key: String,
    /// Values pushed one after another
    pub values: Vec<Value>,
    /// Maximum length kept (0 = unbounded)
    pub cap: u64,
    /// Expiry in seconds (0 = leave unchanged)
    pub expire_secs: u64,
    /// Push to the tail (RPUSH) instead of the head (LPUSH)
    pub append_to_tail: bool,
}

impl ListAppend {
    /// Append `values` to the tail of `key`, unbounded, no expiry
    pub fn new(key: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            values,
            cap: 0,
            expire_secs: 0,
            append_to_tail: true,
        }
    }

    /// Keep at most `cap` of the most recently pushed elements
    pub fn with_cap(mut self, cap: u64) -> Self {
        self.cap = cap;
        self
    }

    /// Expire the list after `secs` seconds
    pub fn expire_after(mut self, secs: u64) -> Self {
        self.expire_secs = secs;
        self
    }

    /// Push to the head instead of the tail
    pub fn at_head(mut self) -> Self {
        self.append_to_tail = false;
        self
    }
}

impl ArgumentGroup for ListAppend {
    const ARITY: usize = 5;
    const COLLECTION: &'static str = LIST;

    fn decode(slots: &mut SlotReader<'_>) -> Result<Self> {
        Ok(Self {
            key: slots.key()?,
            values: slots.sequence(EXPECT_VALUES)?.to_vec(),
            cap: slots.non_negative(EXPECT_CAP)?,
            expire_secs: slots.non_negative(EXPECT_EXPIRE)?,
            append_to_tail: slots.boolean(EXPECT_PUSH_SIDE)?,
        })
    }

    fn key(&self) -> &str {
        &self.key
    }
}

impl QueueGroup for ListAppend {
    fn queue(&self, group: usize, echo: bool, batch: &mut GroupBatch) -> Result<()> {
        let key = &self.key;
        for value in encode_all(&self.values)? {
            let command = if self.append_to_tail {
                Command::RPush {
                    key: key.clone(),
                    values: vec![value],
                }
            } else {
                Command::LPush {
                    key: key.clone(),
                    values: vec![value],
                }
            };
            batch.push(command, BatchSlot::Bookkeeping);
        }
        if self.cap > 0 {
            let cap = i64::try_from(self.cap).unwrap_or(i64::MAX);
            let (start, stop) = if self.append_to_tail {
                (-cap, -1)
            } else {
                (0, cap - 1)
            };
            batch.push(
                Command::LTrim {
                    key: key.clone(),
                    start,
                    stop,
                },
                BatchSlot::Bookkeeping,
            );
        }
        if self.expire_secs > 0 {
            batch.push(
                Command::Expire {
                    key: key.clone(),
                    secs: self.expire_secs,
                },
                BatchSlot::Bookkeeping,
            );
        }
        if echo {
            batch.push(Command::Echo { message: key.clone() }, BatchSlot::Echo { group });
        }
        batch.push(
            Command::LRange {
                key: key.clone(),
                start: 0,
                stop: -1,
            },
            BatchSlot::Payload { group },
        );
        Ok(())
    }
}

// ============================================================================
// List pop
// ============================================================================

/// Pop a slice off one end of a list
///
/// Popping right removes every element after `index`; popping left removes
/// every element up to and including `index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPop {
    /// List key
    pub key: String,
    /// Boundary index
    pub index: u64,
    /// Pop from the tail side
    pub pop_right: bool,
}

impl ListPop {
    /// Pop every element after `index`
    pub fn right(key: impl Into<String>, index: u64) -> Self {
        Self {
            key: key.into(),
            index,
            pop_right: true,
        }
    }

    /// Pop every element up to and including `index`
    pub fn left(key: impl Into<String>, index: u64) -> Self {
        Self {
            key: key.into(),
            index,
            pop_right: false,
        }
    }
}

impl ArgumentGroup for ListPop {
    const ARITY: usize = 3;
    const COLLECTION: &'static str = LIST;

    fn decode(slots: &mut SlotReader<'_>) -> Result<Self> {
        Ok(Self {
            key: slots.key()?,
            index: slots.non_negative(EXPECT_POP_INDEX)?,
            pop_right: slots.boolean(EXPECT_POP_SIDE)?,
        })
    }

    fn key(&self) -> &str {
        &self.key
    }
}

impl QueueGroup for ListPop {
    fn queue(&self, group: usize, echo: bool, batch: &mut GroupBatch) -> Result<()> {
        let key = &self.key;
        let index = i64::try_from(self.index).unwrap_or(i64::MAX - 1);
        if echo {
            batch.push(Command::Echo { message: key.clone() }, BatchSlot::Echo { group });
        }
        let (popped, kept) = if self.pop_right {
            ((index + 1, -1), (0, index))
        } else {
            ((0, index), (index + 1, -1))
        };
        batch.push(
            Command::LRange {
                key: key.clone(),
                start: popped.0,
                stop: popped.1,
            },
            BatchSlot::Pending { group },
        );
        batch.push(
            Command::LTrim {
                key: key.clone(),
                start: kept.0,
                stop: kept.1,
            },
            BatchSlot::TrimStatus { group },
        );
        Ok(())
    }
}

// ============================================================================
// Sorted set upsert
// ============================================================================

/// Set member scores of a sorted set and its expiry
#[derive(Debug, Clone, PartialEq)]
pub struct SortedSetUpsert {
    /// Sorted set key
    pub key: String,
    /// Members and their scores; re-adding a member replaces its score
    pub members: Vec<(String, f64)>,
    /// Expiry in seconds (0 = leave unchanged)
    pub expire_secs: u64,
}

impl SortedSetUpsert {
    /// Upsert `members` into `key` with no expiry
    pub fn new(key: impl Into<String>, members: Vec<(String, f64)>) -> Self {
        Self {
            key: key.into(),
            members,
            expire_secs: 0,
        }
    }

    /// Expire the set after `secs` seconds
    pub fn expire_after(mut self, secs: u64) -> Self {
        self.expire_secs = secs;
        self
    }
}

impl ArgumentGroup for SortedSetUpsert {
    const ARITY: usize = 3;
    const COLLECTION: &'static str = SORTED_SET;

    fn decode(slots: &mut SlotReader<'_>) -> Result<Self> {
        let key = slots.key()?;
        let map = slots.map(EXPECT_MEMBERS)?;
        let mut members = Vec::with_capacity(map.len());
        for (member, score) in map {
            let score = numeric(score).ok_or_else(|| slots.reject(EXPECT_MEMBERS))?;
            members.push((member.clone(), score));
        }
        Ok(Self {
            key,
            members,
            expire_secs: slots.non_negative(EXPECT_EXPIRE)?,
        })
    }

    fn key(&self) -> &str {
        &self.key
    }
}

impl QueueGroup for SortedSetUpsert {
    fn queue(&self, group: usize, echo: bool, batch: &mut GroupBatch) -> Result<()> {
        let key = &self.key;
        if let Some((member, _)) = self.members.iter().find(|(_, score)| score.is_nan()) {
            return Err(Error::invalid_input(format!(
                "sorted set '{}' member '{}' has a NaN score",
                key, member
            )));
        }
        for (member, score) in &self.members {
            batch.push(
                Command::ZAdd {
                    key: key.clone(),
                    score: *score,
                    member: member.as_bytes().to_vec(),
                },
                BatchSlot::Bookkeeping,
            );
        }
        if self.expire_secs > 0 {
            batch.push(
                Command::Expire {
                    key: key.clone(),
                    secs: self.expire_secs,
                },
                BatchSlot::Bookkeeping,
            );
        }
        if echo {
            batch.push(Command::Echo { message: key.clone() }, BatchSlot::Echo { group });
        }
        batch.push(
            Command::ZRange {
                key: key.clone(),
                start: 0,
                stop: -1,
                with_scores: true,
            },
            BatchSlot::Payload { group },
        );
        Ok(())
    }
}

// ============================================================================
// Sorted set range removal
// ============================================================================

/// Remove members of a sorted set by rank range (inclusive, negative from end)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedSetRangeRemove {
    /// Sorted set key
    pub key: String,
    /// First rank removed
    pub start: i64,
    /// Last rank removed
    pub stop: i64,
}

impl SortedSetRangeRemove {
    /// Remove ranks `start..=stop` of `key`
    pub fn new(key: impl Into<String>, start: i64, stop: i64) -> Self {
        Self {
            key: key.into(),
            start,
            stop,
        }
    }
}

impl ArgumentGroup for SortedSetRangeRemove {
    const ARITY: usize = 3;
    const COLLECTION: &'static str = SORTED_SET;

    fn decode(slots: &mut SlotReader<'_>) -> Result<Self> {
        Ok(Self {
            key: slots.key()?,
            start: slots.integer(EXPECT_START)?,
            stop: slots.integer(EXPECT_STOP)?,
        })
    }

    fn key(&self) -> &str {
        &self.key
    }
}

impl QueueGroup for SortedSetRangeRemove {
    fn queue(&self, group: usize, echo: bool, batch: &mut GroupBatch) -> Result<()> {
        let key = &self.key;
        if echo {
            batch.push(Command::Echo { message: key.clone() }, BatchSlot::Echo { group });
        }
        batch.push(
            Command::ZRange {
                key: key.clone(),
                start: self.start,
                stop: self.stop,
                with_scores: true,
            },
            BatchSlot::Pending { group },
        );
        batch.push(
            Command::ZRemRangeByRank {
                key: key.clone(),
                start: self.start,
                stop: self.stop,
            },
            BatchSlot::Removed { group },
        );
        Ok(())
    }
}
