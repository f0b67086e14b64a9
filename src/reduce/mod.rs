//! Incremental aggregation: the combine law
//!
//! The index store reduces key groups at arbitrary fan-in, both over raw
//! rows (leaf pass) and over previously reduced partials (merge pass,
//! "rereduce"), possibly while the tree is being rebuilt. Correctness
//! therefore rests on an explicit monoid: [`Accumulator::zero`],
//! [`Accumulator::observe`] for leaf inputs and [`Accumulator::combine`]
//! for partials, with combine associative and commutative over sum and
//! count. Any partition of a value set, reduced leaf-wise and then merged
//! in any tree shape, yields the same accumulator as one flat leaf pass.
//!
//! Rules carried by the accumulator:
//!
//! - **sum**: only values coercing to a finite float contribute
//! - **count**: every contributing row counts, numeric or not (a
//!   compatibility quirk preserved deliberately; downstream consumers
//!   read count as "records containing the field")
//! - **latest**: strict `>` on the event timestamp; equal timestamps keep
//!   the earliest-seen contributor
//! - **passthrough**: metadata rides the row bearing the maximum
//!   timestamp, making the representative row deterministic

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::document::numeric_value;
use crate::types::{Envelope, RowValue};

/// Metadata copied from the representative (max-timestamp) row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Passthrough {
    /// Field name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Backing entity id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Entity short code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_code: Option<String>,

    /// Geographic hierarchy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Vec<String>>,

    /// Aggregation-path snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_paths: Option<BTreeMap<String, Vec<String>>>,
}

impl Passthrough {
    fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            field: envelope.field.clone(),
            entity_id: envelope.entity_id.clone(),
            short_code: envelope.short_code.clone(),
            location: envelope.location.clone(),
            aggregation_paths: envelope.aggregation_paths.clone(),
        }
    }
}

/// Running aggregate for one key group
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Accumulator {
    /// Sum of numerically-coercible contributions
    pub sum: f64,

    /// Number of contributing rows
    pub count: u64,

    /// Value carried by the max-timestamp row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<Value>,

    /// Maximum event timestamp seen (epoch milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Representative-row metadata
    #[serde(flatten)]
    pub passthrough: Passthrough,
}

impl Accumulator {
    /// The monoid identity
    pub fn zero() -> Self {
        Self::default()
    }

    /// Fold one raw row in (leaf pass)
    pub fn observe(&mut self, row: &RowValue) {
        self.count += 1;
        match row {
            RowValue::Scalar(value) => {
                if let Some(n) = numeric_value(value) {
                    self.sum += n;
                }
            }
            RowValue::Envelope(envelope) => {
                if let Some(n) = numeric_value(&envelope.value) {
                    self.sum += n;
                }
                if self.beats_current(envelope.timestamp) {
                    self.timestamp = Some(envelope.timestamp);
                    self.latest = Some(envelope.value.clone());
                    self.passthrough = Passthrough::from_envelope(envelope);
                }
            }
            RowValue::Id(_) | RowValue::Unit => {}
        }
    }

    /// Fold a previously reduced partial in (merge pass)
    pub fn combine(&mut self, other: &Accumulator) {
        self.sum += other.sum;
        self.count += other.count;
        if let Some(ts) = other.timestamp {
            if self.beats_current(ts) {
                self.timestamp = Some(ts);
                self.latest = other.latest.clone();
                self.passthrough = other.passthrough.clone();
            }
        }
    }

    /// Strict ordering keeps the earliest-seen contributor on ties
    fn beats_current(&self, ts: i64) -> bool {
        match self.timestamp {
            None => true,
            Some(current) => ts > current,
        }
    }
}

/// Input to the store-facing reduce contract
#[derive(Debug, Clone)]
pub enum ReduceInput {
    /// A raw emitted row (leaf pass)
    Row(RowValue),
    /// A previously reduced partial (merge pass)
    Partial(Accumulator),
}

/// The reduce contract exposed to the index store
///
/// `rereduce` mirrors the host engine's calling convention: false for the
/// leaf pass over raw rows, true for the merge pass over partials. The
/// monoid handles either input kind, so a mismatched flag cannot corrupt
/// the result; the debug assertion catches contract misuse in tests.
pub fn reduce(inputs: &[ReduceInput], rereduce: bool) -> Accumulator {
    let mut acc = Accumulator::zero();
    for input in inputs {
        match input {
            ReduceInput::Row(row) => {
                debug_assert!(!rereduce, "raw row in a rereduce pass");
                acc.observe(row);
            }
            ReduceInput::Partial(partial) => {
                debug_assert!(rereduce, "partial in a leaf pass");
                acc.combine(partial);
            }
        }
    }
    acc
}

/// Leaf-reduce an iterator of raw rows
pub fn reduce_rows<'a, I>(rows: I) -> Accumulator
where
    I: IntoIterator<Item = &'a RowValue>,
{
    let mut acc = Accumulator::zero();
    for row in rows {
        acc.observe(row);
    }
    acc
}

/// Merge-reduce an iterator of partials
pub fn rereduce<'a, I>(partials: I) -> Accumulator
where
    I: IntoIterator<Item = &'a Accumulator>,
{
    let mut acc = Accumulator::zero();
    for partial in partials {
        acc.combine(partial);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value, timestamp: i64) -> RowValue {
        RowValue::Envelope(Envelope {
            timestamp,
            value,
            field: None,
            entity_id: None,
            short_code: None,
            primitive_type: None,
            location: None,
            aggregation_paths: None,
        })
    }

    #[test]
    fn test_leaf_reduce_example() {
        let rows = vec![envelope(json!(1), 10), envelope(json!(2), 20)];
        let acc = reduce_rows(&rows);
        assert_eq!(acc.sum, 3.0);
        assert_eq!(acc.count, 2);
        assert_eq!(acc.latest, Some(json!(2)));
        assert_eq!(acc.timestamp, Some(20));
    }

    #[test]
    fn test_merge_reduce_example() {
        let left = reduce_rows(&[envelope(json!(1), 10), envelope(json!(2), 20)]);
        let mut right = Accumulator::zero();
        right.sum = 5.0;
        right.count = 1;
        right.latest = Some(json!(5));
        right.timestamp = Some(5);

        let merged = rereduce([&left, &right]);
        assert_eq!(merged.sum, 8.0);
        assert_eq!(merged.count, 3);
        assert_eq!(merged.latest, Some(json!(2)));
        assert_eq!(merged.timestamp, Some(20));
    }

    #[test]
    fn test_scalar_rows_sum_and_count_only() {
        let rows = vec![
            RowValue::Scalar(json!(2.5)),
            RowValue::Scalar(json!("4.5")),
            RowValue::Scalar(json!("n/a")),
        ];
        let acc = reduce_rows(&rows);
        assert_eq!(acc.sum, 7.0);
        // The quirk: the unusable value still counts.
        assert_eq!(acc.count, 3);
        assert!(acc.latest.is_none());
        assert!(acc.timestamp.is_none());
    }

    #[test]
    fn test_latest_tie_keeps_earliest_seen() {
        let rows = vec![envelope(json!("first"), 50), envelope(json!("second"), 50)];
        let acc = reduce_rows(&rows);
        assert_eq!(acc.latest, Some(json!("first")));

        // The same rule holds through a merge.
        let left = reduce_rows(&rows[..1]);
        let right = reduce_rows(&rows[1..]);
        let merged = rereduce([&left, &right]);
        assert_eq!(merged.latest, Some(json!("first")));
    }

    #[test]
    fn test_partition_invariance() {
        let rows: Vec<RowValue> = (0..12)
            .map(|i| envelope(json!(i), (i as i64 * 7) % 11))
            .collect();
        let flat = reduce_rows(&rows);

        // Several partition shapes, including nested merges.
        for split in [1, 3, 5, 11] {
            let (a, b) = rows.split_at(split);
            let merged = rereduce([&reduce_rows(a), &reduce_rows(b)]);
            assert_eq!(merged.sum, flat.sum);
            assert_eq!(merged.count, flat.count);
            assert_eq!(merged.timestamp, flat.timestamp);
            assert_eq!(merged.latest, flat.latest);
        }

        let nested = rereduce([
            &rereduce([&reduce_rows(&rows[..2]), &reduce_rows(&rows[2..7])]),
            &reduce_rows(&rows[7..]),
        ]);
        assert_eq!(nested, flat);
    }

    #[test]
    fn test_passthrough_follows_max_timestamp() {
        let older = RowValue::Envelope(Envelope {
            timestamp: 10,
            value: json!(1),
            field: Some("temp".to_string()),
            entity_id: Some("old".to_string()),
            short_code: None,
            primitive_type: None,
            location: None,
            aggregation_paths: None,
        });
        let newer = RowValue::Envelope(Envelope {
            timestamp: 90,
            value: json!(2),
            field: Some("temp".to_string()),
            entity_id: Some("new".to_string()),
            short_code: None,
            primitive_type: None,
            location: Some(vec!["in".to_string()]),
            aggregation_paths: None,
        });

        // Order of observation must not matter.
        let forward = reduce_rows([&older, &newer]);
        let backward = reduce_rows([&newer, &older]);
        for acc in [forward, backward] {
            assert_eq!(acc.passthrough.entity_id.as_deref(), Some("new"));
            assert_eq!(acc.passthrough.location, Some(vec!["in".to_string()]));
        }
    }

    #[test]
    fn test_reduce_contract_dispatch() {
        let rows = vec![
            ReduceInput::Row(envelope(json!(1), 10)),
            ReduceInput::Row(envelope(json!(2), 20)),
        ];
        let leaf = reduce(&rows, false);
        assert_eq!(leaf.sum, 3.0);

        let partials = vec![
            ReduceInput::Partial(leaf.clone()),
            ReduceInput::Partial(leaf),
        ];
        let merged = reduce(&partials, true);
        assert_eq!(merged.sum, 6.0);
        assert_eq!(merged.count, 4);
    }

    #[test]
    fn test_zero_is_identity() {
        let acc = reduce_rows(&[envelope(json!(3), 30)]);
        let merged = rereduce([&Accumulator::zero(), &acc, &Accumulator::zero()]);
        assert_eq!(merged, acc);
    }
}
