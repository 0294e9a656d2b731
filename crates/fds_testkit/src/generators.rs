//! Property-based test generators using proptest.
//!
//! Keys are drawn from small ranges so that searches, updates and
//! per-instance clears hit existing records often.

use fds_core::RecordKey;
use proptest::prelude::*;
use std::ops::RangeInclusive;

/// Record types produced by [`record_key_strategy`].
pub const RECORD_TYPES: RangeInclusive<u16> = 1..=3;

/// Instances produced by [`record_key_strategy`].
pub const INSTANCES: RangeInclusive<u16> = 1..=3;

/// One store call in a generated sequence.
///
/// Updates and clears name their target by `slot`, an index into the live
/// records of the model taken modulo their count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Write a new record.
    Write {
        /// Key of the record.
        key: RecordKey,
        /// Payload words.
        payload: Vec<u32>,
    },
    /// Replace a live record.
    Update {
        /// Target slot.
        slot: usize,
        /// New payload words.
        payload: Vec<u32>,
    },
    /// Clear a live record.
    Clear {
        /// Target slot.
        slot: usize,
    },
    /// Clear every record of an instance.
    ClearInstance {
        /// Instance to clear.
        instance: u16,
    },
    /// Run garbage collection.
    Gc,
}

/// Strategy for generating valid record keys.
pub fn record_key_strategy() -> impl Strategy<Value = RecordKey> {
    (RECORD_TYPES, INSTANCES).prop_map(|(record_type, instance)| RecordKey::new(record_type, instance))
}

/// Strategy for generating non-empty payloads of up to `max_words` words.
pub fn payload_strategy(max_words: usize) -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(any::<u32>(), 1..=max_words.max(1))
}

/// Strategy for generating a single operation.
pub fn op_strategy(max_words: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (record_key_strategy(), payload_strategy(max_words))
            .prop_map(|(key, payload)| Op::Write { key, payload }),
        2 => (any::<usize>(), payload_strategy(max_words))
            .prop_map(|(slot, payload)| Op::Update { slot, payload }),
        2 => any::<usize>().prop_map(|slot| Op::Clear { slot }),
        1 => INSTANCES.prop_map(|instance| Op::ClearInstance { instance }),
        1 => Just(Op::Gc),
    ]
}

/// Strategy for generating operation sequences.
pub fn ops_strategy(
    max_words: usize,
    len: std::ops::Range<usize>,
) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(max_words), len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn keys_are_valid(key in record_key_strategy()) {
            prop_assert!(key.is_valid());
            prop_assert!(RECORD_TYPES.contains(&key.record_type));
        }

        #[test]
        fn payloads_respect_bounds(payload in payload_strategy(5)) {
            prop_assert!(!payload.is_empty());
            prop_assert!(payload.len() <= 5);
        }
    }
}
