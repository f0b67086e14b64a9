//! In-memory reference index store
//!
//! The persistent sorted-index engine is an external collaborator; this
//! module is the call-contract glue plus an in-memory stand-in faithful to
//! that contract, used by integration tests and embedded callers:
//!
//! - rows live sorted by composite key, per view
//! - row provenance is tracked per document, so inserting a changed (or
//!   voided) document re-indexes incrementally (old rows out, new rows
//!   in), never a full rebuild
//! - grouped queries leaf-reduce each key's rows, then merge the partials
//!   through a balanced tree of configurable fan-in, exercising the
//!   rereduce path on every query
//!
//! All mutation goes through a `parking_lot::RwLock`; reads proceed
//! concurrently. The map/reduce calls themselves are pure, so the store
//! may re-run them at any time and in any order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::reduce::{rereduce, Accumulator, ReduceInput};
use crate::types::{CompositeKey, RowValue};
use crate::views::View;

/// Fan-in of the merge tree used when combining key-group partials
const DEFAULT_MERGE_FAN_IN: usize = 4;

/// Trailing calendar components on hierarchy-view keys
const CALENDAR_COMPONENTS: usize = 6;

/// One statistic selectable from a reduced group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    /// Sum of numeric contributions
    Sum,
    /// Number of records containing the field
    Count,
    /// Value carried by the max-timestamp row
    Latest,
}

impl Stat {
    fn extract(&self, acc: &Accumulator) -> Value {
        match self {
            Stat::Sum => Value::from(acc.sum),
            Stat::Count => Value::from(acc.count),
            Stat::Latest => acc.latest.clone().unwrap_or(Value::Null),
        }
    }
}

/// Which statistic to read per field when fetching
///
/// A wildcard, when set, applies one statistic to every field and
/// overrides per-field selections.
#[derive(Debug, Clone, Default)]
pub struct StatSelector {
    /// Per-field selections
    pub per_field: BTreeMap<String, Stat>,

    /// Wildcard selection applied to all fields
    pub all_fields: Option<Stat>,
}

impl StatSelector {
    /// Select one statistic for every field
    pub fn all(stat: Stat) -> Self {
        Self {
            per_field: BTreeMap::new(),
            all_fields: Some(stat),
        }
    }

    /// Select a statistic for one field
    pub fn field(mut self, name: &str, stat: Stat) -> Self {
        self.per_field.insert(name.to_string(), stat);
        self
    }

    fn stat_for(&self, field: &str) -> Option<Stat> {
        self.all_fields.or_else(|| self.per_field.get(field).copied())
    }
}

#[derive(Default)]
struct ViewState {
    /// Sorted rows; values per key in document-insertion order
    rows: BTreeMap<CompositeKey, Vec<(String, RowValue)>>,

    /// Keys each document contributed, for incremental removal
    by_doc: HashMap<String, Vec<CompositeKey>>,
}

impl ViewState {
    fn remove_doc(&mut self, doc_id: &str) {
        let Some(keys) = self.by_doc.remove(doc_id) else {
            return;
        };
        for key in keys {
            if let Some(values) = self.rows.get_mut(&key) {
                values.retain(|(owner, _)| owner != doc_id);
                if values.is_empty() {
                    self.rows.remove(&key);
                }
            }
        }
    }

    fn insert_rows(&mut self, doc_id: &str, rows: Vec<crate::types::EmittedRow>) {
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(row.key.clone());
            self.rows
                .entry(row.key)
                .or_default()
                .push((doc_id.to_string(), row.value));
        }
        if !keys.is_empty() {
            self.by_doc.insert(doc_id.to_string(), keys);
        }
    }
}

/// In-memory index over a set of views
pub struct InMemoryIndexStore {
    views: Vec<Arc<dyn View>>,
    state: RwLock<HashMap<String, ViewState>>,
    merge_fan_in: usize,
}

impl InMemoryIndexStore {
    /// Create a store over the given views
    pub fn new(views: Vec<Arc<dyn View>>) -> Self {
        let state = views
            .iter()
            .map(|v| (v.name().to_string(), ViewState::default()))
            .collect();
        Self {
            views,
            state: RwLock::new(state),
            merge_fan_in: DEFAULT_MERGE_FAN_IN,
        }
    }

    /// Override the merge-tree fan-in (must be at least 2)
    pub fn with_merge_fan_in(mut self, fan_in: usize) -> Self {
        self.merge_fan_in = fan_in.max(2);
        self
    }

    /// Views this store indexes
    pub fn views(&self) -> &[Arc<dyn View>] {
        &self.views
    }

    /// Index a document, replacing whatever it contributed before
    ///
    /// Voiding follows the document lifecycle: saving the record again
    /// with `void: true` maps to zero rows, so its old rows simply drop
    /// out. Documents without an `_id` cannot be tracked and are skipped.
    pub fn upsert(&self, raw: &Value) {
        let Some(doc_id) = raw.get("_id").and_then(Value::as_str) else {
            warn!("ignoring document without _id");
            return;
        };
        let mut state = self.state.write();
        for view in &self.views {
            let rows = view.map(raw);
            let Some(view_state) = state.get_mut(view.name()) else {
                continue;
            };
            view_state.remove_doc(doc_id);
            let emitted = rows.len();
            view_state.insert_rows(doc_id, rows);
            debug!(view = view.name(), doc = doc_id, rows = emitted, "re-indexed");
        }
    }

    /// Drop every row a document contributed
    pub fn remove(&self, doc_id: &str) {
        let mut state = self.state.write();
        for view_state in state.values_mut() {
            view_state.remove_doc(doc_id);
        }
    }

    /// Raw rows under a key prefix, in key order
    pub fn rows_in(&self, view: &str, prefix: &CompositeKey) -> Vec<(CompositeKey, RowValue)> {
        let state = self.state.read();
        let Some(view_state) = state.get(view) else {
            return Vec::new();
        };
        view_state
            .rows
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |(_, value)| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Reduce every row under a key prefix to one accumulator
    ///
    /// Leaf pass per key, then a balanced merge tree over the per-key
    /// partials. Returns `None` for map-only views.
    pub fn aggregate(&self, view: &str, prefix: &CompositeKey) -> Option<Accumulator> {
        let groups = self.grouped(view, prefix, prefix.len());
        match groups {
            Some(mut groups) if groups.len() == 1 => groups.pop().map(|(_, acc)| acc),
            Some(groups) => Some(merge_tree(
                groups.into_iter().map(|(_, acc)| acc).collect(),
                self.merge_fan_in,
            )),
            None => None,
        }
    }

    /// Group rows under a prefix by their first `group_level` components
    /// and reduce each group
    ///
    /// Mirrors the host engine's grouped queries: each full key is
    /// leaf-reduced, and the per-key partials merge through a balanced
    /// tree; the merge pass runs on every grouped query, so any
    /// associativity defect surfaces immediately. Returns `None` for
    /// map-only views.
    pub fn grouped(
        &self,
        view: &str,
        prefix: &CompositeKey,
        group_level: usize,
    ) -> Option<Vec<(CompositeKey, Accumulator)>> {
        self.grouped_where(view, prefix, group_level, |_| true)
    }

    /// Grouped reduce over the keys a filter admits
    fn grouped_where(
        &self,
        view: &str,
        prefix: &CompositeKey,
        group_level: usize,
        admit: impl Fn(&CompositeKey) -> bool,
    ) -> Option<Vec<(CompositeKey, Accumulator)>> {
        let view_def = self.views.iter().find(|v| v.name() == view)?;
        if !view_def.has_reduce() {
            return None;
        }

        let state = self.state.read();
        let view_state = state.get(view)?;

        let mut groups: Vec<(CompositeKey, Vec<Accumulator>)> = Vec::new();
        for (key, values) in view_state
            .rows
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            if !admit(key) {
                continue;
            }
            let leaf_inputs: Vec<ReduceInput> = values
                .iter()
                .map(|(_, value)| ReduceInput::Row(value.clone()))
                .collect();
            let partial = view_def.reduce(&leaf_inputs, false)?;

            let group_key = key.truncated(group_level);
            match groups.last_mut() {
                Some((current, partials)) if *current == group_key => partials.push(partial),
                _ => groups.push((group_key, vec![partial])),
            }
        }

        Some(
            groups
                .into_iter()
                .map(|(key, partials)| (key, merge_tree(partials, self.merge_fan_in)))
                .collect(),
        )
    }

    /// Per-entity statistics for an entity type
    ///
    /// Groups an entity-scoped view at `[entity_type, entity_id, field]`
    /// and selects one statistic per field. Result:
    /// entity id → field → value.
    pub fn fetch(
        &self,
        view: &str,
        entity_type: &str,
        selector: &StatSelector,
    ) -> BTreeMap<String, BTreeMap<String, Value>> {
        let prefix = CompositeKey::from(vec![entity_type.into()]);
        let mut result: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for (key, acc) in self.grouped(view, &prefix, 3).unwrap_or_default() {
            let components = key.components();
            let (Some(entity), Some(field)) = (text_at(components, 1), text_at(components, 2))
            else {
                continue;
            };
            let Some(stat) = selector.stat_for(field) else {
                continue;
            };
            result
                .entry(entity.to_string())
                .or_default()
                .insert(field.to_string(), stat.extract(&acc));
        }
        result
    }

    /// Per-prefix statistics along one aggregation dimension
    ///
    /// Hierarchy views fan every record out into one row per prefix
    /// depth, so a granularity query must read exactly the rows of the
    /// requested depth: their keys are the 3 discriminators, `level` path
    /// components, and the 6 calendar components. Grouping those by their
    /// path yields one bucket per hierarchy prefix, each record counted
    /// once. Result: hierarchy prefix → field → value.
    pub fn fetch_by_path(
        &self,
        view: &str,
        entity_type: &str,
        dimension: &str,
        level: usize,
        selector: &StatSelector,
    ) -> BTreeMap<Vec<String>, BTreeMap<String, Value>> {
        let prefix = CompositeKey::from(vec![entity_type.into(), dimension.into()]);
        let depth_len = 3 + level + CALENDAR_COMPONENTS;
        let groups = self
            .grouped_where(view, &prefix, 3 + level, |key| key.len() == depth_len)
            .unwrap_or_default();

        let mut result: BTreeMap<Vec<String>, BTreeMap<String, Value>> = BTreeMap::new();
        for (key, acc) in groups {
            let components = key.components();
            let Some(field) = text_at(components, 2) else {
                continue;
            };
            let Some(stat) = selector.stat_for(field) else {
                continue;
            };
            let path: Vec<String> = components[3..3 + level]
                .iter()
                .map(|c| c.to_string())
                .collect();
            result
                .entry(path)
                .or_default()
                .insert(field.to_string(), stat.extract(&acc));
        }
        result
    }
}

fn text_at(components: &[crate::types::KeyComponent], index: usize) -> Option<&str> {
    match components.get(index) {
        Some(crate::types::KeyComponent::Text(s)) => Some(s.as_str()),
        _ => None,
    }
}

/// Merge partials through a balanced tree of the given fan-in
fn merge_tree(mut partials: Vec<Accumulator>, fan_in: usize) -> Accumulator {
    if partials.is_empty() {
        return Accumulator::zero();
    }
    while partials.len() > 1 {
        partials = partials
            .chunks(fan_in)
            .map(|chunk| rereduce(chunk.iter()))
            .collect();
    }
    partials.pop().unwrap_or_else(Accumulator::zero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::reduce_rows;
    use crate::types::RowValue;
    use serde_json::json;

    #[test]
    fn test_merge_tree_matches_flat_reduce() {
        let rows: Vec<RowValue> = (1..=9).map(|i| RowValue::Scalar(json!(i))).collect();
        let flat = reduce_rows(&rows);

        for fan_in in [2, 3, 4, 9] {
            let partials: Vec<Accumulator> = rows
                .iter()
                .map(|row| reduce_rows(std::iter::once(row)))
                .collect();
            let merged = merge_tree(partials, fan_in);
            assert_eq!(merged.sum, flat.sum);
            assert_eq!(merged.count, flat.count);
        }
    }

    #[test]
    fn test_merge_tree_of_nothing_is_zero() {
        let acc = merge_tree(Vec::new(), 4);
        assert_eq!(acc, Accumulator::zero());
    }
}
