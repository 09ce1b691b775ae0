//! Store commands
//!
//! `Command` is the closed set of store operations the engine issues. Each
//! variant mirrors one command of a Redis-style key/value server; the reply
//! shapes are documented on [`crate::Reply`].
//!
//! Keys are written unprefixed. A client configured with a key prefix
//! applies it through [`Command::prefix_keys`] right before execution.

/// A single store command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// GET key -> Bulk | Nil
    Get {
        /// Target key
        key: String,
    },
    /// SET key value -> Status OK (clears any expiry)
    Set {
        /// Target key
        key: String,
        /// Encoded value
        value: Vec<u8>,
    },
    /// DEL key [key ...] -> Int (keys removed)
    Del {
        /// Keys to remove
        keys: Vec<String>,
    },
    /// EXISTS key -> Int (0 or 1)
    Exists {
        /// Target key
        key: String,
    },
    /// HSET key field value -> Int (1 when the field is new)
    HSet {
        /// Hash key
        key: String,
        /// Field name
        field: String,
        /// Encoded value
        value: Vec<u8>,
    },
    /// HGETALL key -> Array of alternating field/value bulks
    HGetAll {
        /// Hash key
        key: String,
    },
    /// INCR key -> Int (value after increment)
    Incr {
        /// Counter key
        key: String,
    },
    /// INCRBY key by -> Int
    IncrBy {
        /// Counter key
        key: String,
        /// Increment
        by: i64,
    },
    /// DECRBY key by -> Int
    DecrBy {
        /// Counter key
        key: String,
        /// Decrement
        by: i64,
    },
    /// EXPIRE key secs -> Int (1 if the key exists)
    Expire {
        /// Target key
        key: String,
        /// Time to live in seconds; 0 removes the key
        secs: u64,
    },
    /// EXPIREAT key unix-seconds -> Int
    ExpireAt {
        /// Target key
        key: String,
        /// Absolute expiry as a unix timestamp in seconds
        timestamp: i64,
    },
    /// TTL key -> Int (-2 missing, -1 no expiry)
    Ttl {
        /// Target key
        key: String,
    },
    /// LPUSH key value [value ...] -> Int (list length)
    LPush {
        /// List key
        key: String,
        /// Encoded values, pushed one after another
        values: Vec<Vec<u8>>,
    },
    /// RPUSH key value [value ...] -> Int (list length)
    RPush {
        /// List key
        key: String,
        /// Encoded values, pushed one after another
        values: Vec<Vec<u8>>,
    },
    /// LTRIM key start stop -> Status OK
    LTrim {
        /// List key
        key: String,
        /// First index kept (negative counts from the tail)
        start: i64,
        /// Last index kept (inclusive)
        stop: i64,
    },
    /// LRANGE key start stop -> Array of bulks
    LRange {
        /// List key
        key: String,
        /// First index
        start: i64,
        /// Last index (inclusive)
        stop: i64,
    },
    /// ZADD key score member -> Int (1 when the member is new)
    ZAdd {
        /// Sorted set key
        key: String,
        /// Member score
        score: f64,
        /// Encoded member
        member: Vec<u8>,
    },
    /// ZRANGE key start stop [WITHSCORES] -> Array
    ZRange {
        /// Sorted set key
        key: String,
        /// First rank
        start: i64,
        /// Last rank (inclusive)
        stop: i64,
        /// Interleave scores with members
        with_scores: bool,
    },
    /// ZREMRANGEBYRANK key start stop -> Int (members removed)
    ZRemRangeByRank {
        /// Sorted set key
        key: String,
        /// First rank
        start: i64,
        /// Last rank (inclusive)
        stop: i64,
    },
    /// ZREM key member [member ...] -> Int (members removed)
    ZRem {
        /// Sorted set key
        key: String,
        /// Encoded members
        members: Vec<Vec<u8>>,
    },
    /// TYPE key -> Status type tag
    Type {
        /// Target key
        key: String,
    },
    /// SCAN cursor MATCH pattern COUNT count -> Array [cursor, Array keys]
    Scan {
        /// Cursor returned by the previous call, 0 to start
        cursor: u64,
        /// Glob pattern
        pattern: String,
        /// Hint for the number of keys examined per call
        count: usize,
    },
    /// ECHO message -> Bulk message
    Echo {
        /// Message echoed back
        message: String,
    },
    /// SELECT index -> Status OK
    Select {
        /// Logical database index
        index: u32,
    },
    /// CONFIG GET parameter -> Array [name, value]
    ConfigGet {
        /// Parameter name
        parameter: String,
    },
    /// FLUSHDB -> Status OK
    FlushDb,
    /// FLUSHALL -> Status OK
    FlushAll,
}

impl Command {
    /// Command name as the server spells it
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::HSet { .. } => "HSET",
            Command::HGetAll { .. } => "HGETALL",
            Command::Incr { .. } => "INCR",
            Command::IncrBy { .. } => "INCRBY",
            Command::DecrBy { .. } => "DECRBY",
            Command::Expire { .. } => "EXPIRE",
            Command::ExpireAt { .. } => "EXPIREAT",
            Command::Ttl { .. } => "TTL",
            Command::LPush { .. } => "LPUSH",
            Command::RPush { .. } => "RPUSH",
            Command::LTrim { .. } => "LTRIM",
            Command::LRange { .. } => "LRANGE",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRange { .. } => "ZRANGE",
            Command::ZRemRangeByRank { .. } => "ZREMRANGEBYRANK",
            Command::ZRem { .. } => "ZREM",
            Command::Type { .. } => "TYPE",
            Command::Scan { .. } => "SCAN",
            Command::Echo { .. } => "ECHO",
            Command::Select { .. } => "SELECT",
            Command::ConfigGet { .. } => "CONFIG GET",
            Command::FlushDb => "FLUSHDB",
            Command::FlushAll => "FLUSHALL",
        }
    }

    /// Keys this command reads or writes
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Command::Del { keys } => keys.iter().map(String::as_str).collect(),
            Command::Get { key }
            | Command::Set { key, .. }
            | Command::Exists { key }
            | Command::HSet { key, .. }
            | Command::HGetAll { key }
            | Command::Incr { key }
            | Command::IncrBy { key, .. }
            | Command::DecrBy { key, .. }
            | Command::Expire { key, .. }
            | Command::ExpireAt { key, .. }
            | Command::Ttl { key }
            | Command::LPush { key, .. }
            | Command::RPush { key, .. }
            | Command::LTrim { key, .. }
            | Command::LRange { key, .. }
            | Command::ZAdd { key, .. }
            | Command::ZRange { key, .. }
            | Command::ZRemRangeByRank { key, .. }
            | Command::ZRem { key, .. }
            | Command::Type { key } => vec![key.as_str()],
            Command::Scan { .. }
            | Command::Echo { .. }
            | Command::Select { .. }
            | Command::ConfigGet { .. }
            | Command::FlushDb
            | Command::FlushAll => Vec::new(),
        }
    }

    /// Whether the command can modify the keyspace
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. }
                | Command::Del { .. }
                | Command::HSet { .. }
                | Command::Incr { .. }
                | Command::IncrBy { .. }
                | Command::DecrBy { .. }
                | Command::Expire { .. }
                | Command::ExpireAt { .. }
                | Command::LPush { .. }
                | Command::RPush { .. }
                | Command::LTrim { .. }
                | Command::ZAdd { .. }
                | Command::ZRemRangeByRank { .. }
                | Command::ZRem { .. }
                | Command::FlushDb
                | Command::FlushAll
        )
    }

    /// Prepend `prefix` to every key, including the SCAN match pattern
    ///
    /// Echo messages are left untouched.
    pub fn prefix_keys(&mut self, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        let apply = |key: &mut String| key.insert_str(0, prefix);
        match self {
            Command::Del { keys } => keys.iter_mut().for_each(apply),
            Command::Scan { pattern, .. } => apply(pattern),
            Command::Get { key }
            | Command::Set { key, .. }
            | Command::Exists { key }
            | Command::HSet { key, .. }
            | Command::HGetAll { key }
            | Command::Incr { key }
            | Command::IncrBy { key, .. }
            | Command::DecrBy { key, .. }
            | Command::Expire { key, .. }
            | Command::ExpireAt { key, .. }
            | Command::Ttl { key }
            | Command::LPush { key, .. }
            | Command::RPush { key, .. }
            | Command::LTrim { key, .. }
            | Command::LRange { key, .. }
            | Command::ZAdd { key, .. }
            | Command::ZRange { key, .. }
            | Command::ZRemRangeByRank { key, .. }
            | Command::ZRem { key, .. }
            | Command::Type { key } => apply(key),
            Command::Echo { .. }
            | Command::Select { .. }
            | Command::ConfigGet { .. }
            | Command::FlushDb
            | Command::FlushAll => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_applies_to_keys_and_pattern() {
        let mut del = Command::Del {
            keys: vec!["a".into(), "b".into()],
        };
        del.prefix_keys("app:");
        assert_eq!(del.keys(), vec!["app:a", "app:b"]);

        let mut scan = Command::Scan {
            cursor: 0,
            pattern: "user*".into(),
            count: 10,
        };
        scan.prefix_keys("app:");
        assert_eq!(
            scan,
            Command::Scan {
                cursor: 0,
                pattern: "app:user*".into(),
                count: 10
            }
        );
    }

    #[test]
    fn test_prefix_leaves_echo_alone() {
        let mut echo = Command::Echo {
            message: "list1".into(),
        };
        echo.prefix_keys("app:");
        assert_eq!(
            echo,
            Command::Echo {
                message: "list1".into()
            }
        );
    }

    #[test]
    fn test_empty_prefix_is_noop() {
        let mut get = Command::Get { key: "k".into() };
        get.prefix_keys("");
        assert_eq!(get.keys(), vec!["k"]);
    }

    #[test]
    fn test_write_classification() {
        assert!(Command::Incr { key: "c".into() }.is_write());
        assert!(Command::FlushAll.is_write());
        assert!(!Command::LRange {
            key: "l".into(),
            start: 0,
            stop: -1
        }
        .is_write());
        assert!(!Command::Echo {
            message: "x".into()
        }
        .is_write());
    }
}
