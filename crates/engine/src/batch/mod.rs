//! Batched list and sorted-set operations
//!
//! Each call takes any number of groups (typed, or decoded from a flat
//! argument list), queues every group's commands into one atomic block and
//! decodes the replies back into a map keyed by the group keys.
//!
//! Result reporting differs per operation:
//! - `add_to_list` / `upsert_sorted_set`: every key, with its full contents
//! - `pop_from_list`: every key, with the popped slice (empty if nothing)
//! - `remove_from_sorted_set_by_index`: only keys that lost members

mod args;
mod groups;

pub use args::{decode_groups, numeric, ArgumentGroup, SlotReader, EXPECT_KEY, EXPECT_PRESENT};
pub use groups::{ListAppend, ListPop, SortedSetRangeRemove, SortedSetUpsert};

use std::collections::BTreeMap;

use tracing::debug;

use recordkv_core::{Error, Result, Value};
use recordkv_storage::{Command, Reply, StoreClient};

use crate::decode::{self, ScoredMember};
use crate::tagged::pair_replies;
use groups::{BatchSlot, GroupBatch, QueueGroup};

/// Runs batch operations against a store
pub struct BatchOps<'a, C: StoreClient + ?Sized> {
    client: &'a C,
    echo_keys: bool,
}

impl<'a, C: StoreClient + ?Sized> BatchOps<'a, C> {
    /// Create batch operations over `client`
    ///
    /// With `echo_keys` each group's replies are preceded by an ECHO of its
    /// key, which decoding checks.
    pub fn new(client: &'a C, echo_keys: bool) -> Self {
        Self { client, echo_keys }
    }

    /// Push values onto lists; returns each list's full contents afterwards
    pub fn add_to_list(&self, groups: &[ListAppend]) -> Result<BTreeMap<String, Vec<Value>>> {
        self.run(groups, decode::values)
    }

    /// Flat form of [`BatchOps::add_to_list`]: `[key, values, cap, expire_secs, append_to_tail]*`
    pub fn add_to_list_args(&self, args: &[Value]) -> Result<BTreeMap<String, Vec<Value>>> {
        self.add_to_list(&decode_groups::<ListAppend>(args)?)
    }

    /// Pop slices off lists; returns the popped elements of every key
    pub fn pop_from_list(&self, groups: &[ListPop]) -> Result<BTreeMap<String, Vec<Value>>> {
        self.run(groups, decode::values)
    }

    /// Flat form of [`BatchOps::pop_from_list`]: `[key, index, pop_right]*`
    pub fn pop_from_list_args(&self, args: &[Value]) -> Result<BTreeMap<String, Vec<Value>>> {
        self.pop_from_list(&decode_groups::<ListPop>(args)?)
    }

    /// Upsert sorted-set members; returns each set's members afterwards
    pub fn upsert_sorted_set(
        &self,
        groups: &[SortedSetUpsert],
    ) -> Result<BTreeMap<String, Vec<ScoredMember>>> {
        self.run(groups, decode::scored)
    }

    /// Flat form of [`BatchOps::upsert_sorted_set`]: `[key, {member: score}, expire_secs]*`
    pub fn upsert_sorted_set_args(&self, args: &[Value]) -> Result<BTreeMap<String, Vec<ScoredMember>>> {
        self.upsert_sorted_set(&decode_groups::<SortedSetUpsert>(args)?)
    }

    /// Remove sorted-set members by rank; returns the removed members of
    /// every key that lost at least one
    pub fn remove_from_sorted_set_by_index(
        &self,
        groups: &[SortedSetRangeRemove],
    ) -> Result<BTreeMap<String, Vec<ScoredMember>>> {
        self.run(groups, decode::scored)
    }

    /// Flat form of [`BatchOps::remove_from_sorted_set_by_index`]: `[key, start, stop]*`
    pub fn remove_from_sorted_set_by_index_args(
        &self,
        args: &[Value],
    ) -> Result<BTreeMap<String, Vec<ScoredMember>>> {
        self.remove_from_sorted_set_by_index(&decode_groups::<SortedSetRangeRemove>(args)?)
    }

    /// Remove named members from one sorted set; returns how many were removed
    pub fn remove_from_sorted_set(&self, key: &str, members: &[Value]) -> Result<u64> {
        let members = members
            .iter()
            .map(Value::to_store_bytes)
            .collect::<Result<Vec<_>>>()?;
        if members.is_empty() {
            return Ok(0);
        }
        let reply = self.client.execute(Command::ZRem {
            key: key.to_string(),
            members,
        })?;
        decode::count(0, reply)
    }

    fn run<G, T>(
        &self,
        groups: &[G],
        payload: fn(usize, Reply) -> Result<T>,
    ) -> Result<BTreeMap<String, T>>
    where
        G: QueueGroup,
    {
        if groups.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut batch = GroupBatch::new();
        for (index, group) in groups.iter().enumerate() {
            group.queue(index, self.echo_keys, &mut batch)?;
        }
        debug!(
            target: "recordkv::batch",
            collection = G::COLLECTION,
            groups = groups.len(),
            commands = batch.len(),
            "Sending batch"
        );

        let (commands, tags) = batch.into_parts();
        let replies = self.client.atomic(commands)?;
        decode_batch(groups, tags, replies, payload)
    }
}

/// Walk replies against their tags and collect each group's result
fn decode_batch<G: ArgumentGroup, T>(
    groups: &[G],
    tags: Vec<BatchSlot>,
    replies: Vec<Reply>,
    payload: fn(usize, Reply) -> Result<T>,
) -> Result<BTreeMap<String, T>> {
    let mut results = BTreeMap::new();
    let mut pending: Option<(usize, T)> = None;

    for (position, tag, reply) in pair_replies(tags, replies)? {
        match tag {
            BatchSlot::Bookkeeping => {
                decode::check_error(position, reply)?;
            }
            BatchSlot::Echo { group } => {
                decode::echo(position, reply, groups[group].key())?;
            }
            BatchSlot::Payload { group } => {
                results.insert(groups[group].key().to_string(), payload(position, reply)?);
            }
            BatchSlot::Pending { group } => {
                pending = Some((group, payload(position, reply)?));
            }
            BatchSlot::TrimStatus { group } => {
                decode::ok_status(position, reply)?;
                let value = take_pending(&mut pending, group, position)?;
                results.insert(groups[group].key().to_string(), value);
            }
            BatchSlot::Removed { group } => {
                let removed = decode::count(position, reply)?;
                let value = take_pending(&mut pending, group, position)?;
                if removed > 0 {
                    results.insert(groups[group].key().to_string(), value);
                }
            }
        }
    }
    Ok(results)
}

fn take_pending<T>(pending: &mut Option<(usize, T)>, group: usize, position: usize) -> Result<T> {
    match pending.take() {
        Some((owner, value)) if owner == group => Ok(value),
        _ => Err(Error::response_shape(
            position,
            "a confirmation following its group's data",
            format!("confirmation for group {} without data", group),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordkv_storage::MemoryStore;

    fn strings(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn test_add_to_list_round_trip() {
        let store = MemoryStore::new();
        let ops = BatchOps::new(&store, true);
        let result = ops
            .add_to_list(&[
                ListAppend::new("a", strings(&["1", "2"])),
                ListAppend::new("b", strings(&["x"])).at_head(),
            ])
            .unwrap();
        assert_eq!(result["a"], strings(&["1", "2"]));
        assert_eq!(result["b"], strings(&["x"]));
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let store = MemoryStore::new();
        let ops = BatchOps::new(&store, false);
        let result = ops
            .add_to_list(&[ListAppend::new("l", strings(&["1", "2", "3", "4", "5"])).with_cap(3)])
            .unwrap();
        assert_eq!(result["l"], strings(&["3", "4", "5"]));

        let result = ops
            .add_to_list(&[ListAppend::new("h", strings(&["1", "2", "3", "4", "5"]))
                .with_cap(3)
                .at_head()])
            .unwrap();
        assert_eq!(result["h"], strings(&["5", "4", "3"]));
    }

    #[test]
    fn test_pop_reports_every_key() {
        let store = MemoryStore::new();
        let ops = BatchOps::new(&store, true);
        ops.add_to_list(&[ListAppend::new("l", strings(&["a", "b", "c", "d", "e"]))])
            .unwrap();
        let result = ops
            .pop_from_list(&[ListPop::right("l", 1), ListPop::left("empty", 0)])
            .unwrap();
        assert_eq!(result["l"], strings(&["c", "d", "e"]));
        assert_eq!(result["empty"], Vec::<Value>::new());
    }

    #[test]
    fn test_range_remove_omits_untouched_keys() {
        let store = MemoryStore::new();
        let ops = BatchOps::new(&store, true);
        ops.upsert_sorted_set(&[SortedSetUpsert::new(
            "z",
            vec![("a".into(), 1.0), ("b".into(), 2.0), ("c".into(), 3.0)],
        )])
        .unwrap();
        let result = ops
            .remove_from_sorted_set_by_index(&[
                SortedSetRangeRemove::new("z", 0, 1),
                SortedSetRangeRemove::new("missing", 0, -1),
            ])
            .unwrap();
        assert_eq!(
            result["z"],
            vec![ScoredMember::new("a", 1.0), ScoredMember::new("b", 2.0)]
        );
        assert!(!result.contains_key("missing"));
    }

    #[test]
    fn test_argument_error_issues_no_commands() {
        let store = MemoryStore::new();
        let ops = BatchOps::new(&store, true);
        let args = vec![Value::from("l"), Value::Int(0), Value::Bool(true), Value::from("m")];
        let err = ops.pop_from_list_args(&args).unwrap_err();
        assert!(matches!(err, Error::ArgumentType { slot: 2, .. }));
        assert_eq!(store.commands_applied(), 0);
    }

    #[test]
    fn test_wrong_type_key_is_store_error() {
        let store = MemoryStore::new();
        store
            .execute(Command::Set {
                key: "s".into(),
                value: b"v".to_vec(),
            })
            .unwrap();
        let ops = BatchOps::new(&store, true);
        let err = ops
            .add_to_list(&[ListAppend::new("s", strings(&["x"]))])
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_confirmation_without_data_is_rejected() {
        let groups = [ListPop::left("l", 0)];
        let err = decode_batch(
            &groups,
            vec![BatchSlot::TrimStatus { group: 0 }],
            vec![Reply::ok()],
            decode::values,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ResponseShape { position: 0, .. }));
    }

    #[test]
    fn test_confirmation_for_another_group_is_rejected() {
        let groups = [
            SortedSetRangeRemove::new("a", 0, 0),
            SortedSetRangeRemove::new("b", 0, 0),
        ];
        let err = decode_batch(
            &groups,
            vec![BatchSlot::Pending { group: 0 }, BatchSlot::Removed { group: 1 }],
            vec![Reply::Array(Vec::new()), Reply::Int(1)],
            decode::scored,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ResponseShape { position: 1, .. }));
    }

    #[test]
    fn test_nan_score_queues_nothing() {
        let store = MemoryStore::new();
        let ops = BatchOps::new(&store, true);
        let err = ops
            .upsert_sorted_set(&[
                SortedSetUpsert::new("ok", vec![("a".into(), 1.0)]),
                SortedSetUpsert::new("bad", vec![("b".into(), 2.0), ("c".into(), f64::NAN)]),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref message) if message.contains("'c'")));
        assert_eq!(store.commands_applied(), 0);
    }

    #[test]
    fn test_remove_named_members() {
        let store = MemoryStore::new();
        let ops = BatchOps::new(&store, true);
        ops.upsert_sorted_set(&[SortedSetUpsert::new("z", vec![("a".into(), 1.0), ("b".into(), 2.0)])])
            .unwrap();
        assert_eq!(
            ops.remove_from_sorted_set("z", &[Value::from("a"), Value::from("zz")])
                .unwrap(),
            1
        );
        assert_eq!(ops.remove_from_sorted_set("z", &[]).unwrap(), 0);
    }
}
