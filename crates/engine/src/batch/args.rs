//! Flat argument decoding
//!
//! Batch calls may be driven by a flat `&[Value]` list made of fixed-arity
//! groups, e.g. `[key, index, pop_right, key, index, pop_right, ...]`.
//! Decoding checks the whole list before anything is queued: a wrong slot
//! type or an incomplete trailing group fails the call with
//! [`Error::ArgumentType`] and no command reaches the store.

use std::collections::BTreeMap;

use recordkv_core::{Error, Result, Value};

/// Expected-type text of a key slot
pub const EXPECT_KEY: &str = "a string that will serve as the unique key";
/// Expected-type text of the slots missing from a trailing group
pub const EXPECT_PRESENT: &str = "present to complete the argument group";

/// A fixed-arity argument group
pub trait ArgumentGroup: Sized {
    /// Slots per group
    const ARITY: usize;
    /// Collection family named in error messages
    const COLLECTION: &'static str;

    /// Decode one group; the reader yields exactly `ARITY` slots
    fn decode(slots: &mut SlotReader<'_>) -> Result<Self>;

    /// Key the group operates on
    fn key(&self) -> &str;
}

/// Sequential reader over the slots of one group
#[derive(Debug)]
pub struct SlotReader<'a> {
    collection: &'static str,
    slots: &'a [Value],
    next: usize,
    key: String,
}

impl<'a> SlotReader<'a> {
    fn new(collection: &'static str, slots: &'a [Value], last_key: String) -> Self {
        Self {
            collection,
            slots,
            next: 0,
            key: last_key,
        }
    }

    fn take(&mut self) -> Result<&'a Value> {
        let value = self.slots.get(self.next).ok_or_else(|| {
            Error::argument_type(self.collection, self.key.clone(), self.next + 1, EXPECT_PRESENT)
        })?;
        self.next += 1;
        Ok(value)
    }

    fn fail_current(&self, expected: &'static str) -> Error {
        Error::argument_type(self.collection, self.key.clone(), self.next, expected)
    }

    /// Key slot; becomes the key named in later errors
    pub fn key(&mut self) -> Result<String> {
        match self.take()? {
            Value::String(s) => {
                self.key = s.clone();
                Ok(s.clone())
            }
            _ => Err(self.fail_current(EXPECT_KEY)),
        }
    }

    /// Array slot
    pub fn sequence(&mut self, expected: &'static str) -> Result<&'a [Value]> {
        match self.take()? {
            Value::Array(items) => Ok(items),
            _ => Err(self.fail_current(expected)),
        }
    }

    /// Object slot
    pub fn map(&mut self, expected: &'static str) -> Result<&'a BTreeMap<String, Value>> {
        match self.take()? {
            Value::Object(map) => Ok(map),
            _ => Err(self.fail_current(expected)),
        }
    }

    /// Numeric slot: Int, Float or a numeric string
    pub fn number(&mut self, expected: &'static str) -> Result<f64> {
        let value = self.take()?;
        numeric(value).ok_or_else(|| self.fail_current(expected))
    }

    /// Integral numeric slot
    pub fn integer(&mut self, expected: &'static str) -> Result<i64> {
        let n = self.number(expected)?;
        if n.fract() != 0.0 || !n.is_finite() || n < i64::MIN as f64 || n > i64::MAX as f64 {
            return Err(self.fail_current(expected));
        }
        Ok(n as i64)
    }

    /// Non-negative integral numeric slot
    pub fn non_negative(&mut self, expected: &'static str) -> Result<u64> {
        let n = self.integer(expected)?;
        u64::try_from(n).map_err(|_| self.fail_current(expected))
    }

    /// Boolean slot
    pub fn boolean(&mut self, expected: &'static str) -> Result<bool> {
        match self.take()? {
            Value::Bool(b) => Ok(*b),
            _ => Err(self.fail_current(expected)),
        }
    }

    /// Fail on the slot just read
    pub fn reject(&self, expected: &'static str) -> Error {
        self.fail_current(expected)
    }
}

/// Numeric view of a slot value, accepting numeric strings
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) if !f.is_nan() => Some(*f),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
        _ => None,
    }
}

/// Decode a flat argument list into groups
///
/// The argument count is checked first; every group is then decoded in
/// order and the first bad slot fails the whole call.
pub fn decode_groups<G: ArgumentGroup>(args: &[Value]) -> Result<Vec<G>> {
    let remainder = args.len() % G::ARITY;
    if remainder != 0 {
        let trailing = args.len() - remainder;
        let key = args[trailing]
            .as_str()
            .or_else(|| {
                trailing
                    .checked_sub(G::ARITY)
                    .and_then(|start| args[start].as_str())
            })
            .unwrap_or_default();
        return Err(Error::argument_type(
            G::COLLECTION,
            key,
            remainder + 1,
            EXPECT_PRESENT,
        ));
    }

    let mut groups = Vec::with_capacity(args.len() / G::ARITY);
    let mut last_key = String::new();
    for window in args.chunks(G::ARITY) {
        let mut reader = SlotReader::new(G::COLLECTION, window, last_key);
        let group = G::decode(&mut reader)?;
        last_key = reader.key;
        groups.push(group);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Pair {
        key: String,
        n: u64,
    }

    impl ArgumentGroup for Pair {
        const ARITY: usize = 2;
        const COLLECTION: &'static str = "test";

        fn decode(slots: &mut SlotReader<'_>) -> Result<Self> {
            Ok(Pair {
                key: slots.key()?,
                n: slots.non_negative("a number")?,
            })
        }

        fn key(&self) -> &str {
            &self.key
        }
    }

    #[test]
    fn test_decodes_groups_in_order() {
        let args = vec![Value::from("a"), Value::Int(1), Value::from("b"), Value::from("2")];
        let groups: Vec<Pair> = decode_groups(&args).unwrap();
        assert_eq!(
            groups,
            vec![
                Pair { key: "a".into(), n: 1 },
                Pair { key: "b".into(), n: 2 }
            ]
        );
    }

    #[test]
    fn test_empty_args_yield_no_groups() {
        let groups: Vec<Pair> = decode_groups(&[]).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_trailing_group_reports_missing_slot() {
        let args = vec![Value::from("a"), Value::Int(1), Value::from("b")];
        let err = decode_groups::<Pair>(&args).unwrap_err();
        match err {
            Error::ArgumentType { key, slot, .. } => {
                assert_eq!(key, "b");
                assert_eq!(slot, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_slot_names_key_and_slot() {
        let args = vec![Value::from("a"), Value::Int(1), Value::from("b"), Value::Bool(true)];
        let err = decode_groups::<Pair>(&args).unwrap_err();
        assert_eq!(err.to_string(), "(test: b) Argument 2 has to be a number");
    }

    #[test]
    fn test_bad_key_slot_names_previous_key() {
        let args = vec![Value::from("a"), Value::Int(1), Value::Int(5), Value::Int(1)];
        let err = decode_groups::<Pair>(&args).unwrap_err();
        assert!(matches!(err, Error::ArgumentType { ref key, slot: 1, .. } if key == "a"));
    }

    #[test]
    fn test_negative_and_fractional_rejected() {
        for bad in [Value::Int(-1), Value::Float(1.5), Value::from("x")] {
            let args = vec![Value::from("a"), bad];
            assert!(decode_groups::<Pair>(&args).is_err());
        }
    }

    #[test]
    fn test_numeric_accepts_numeric_strings() {
        assert_eq!(numeric(&Value::from(" 2.5 ")), Some(2.5));
        assert_eq!(numeric(&Value::Int(3)), Some(3.0));
        assert_eq!(numeric(&Value::from("NaN")), None);
        assert_eq!(numeric(&Value::Bool(true)), None);
    }
}
