//! Record mapping: document → keyed rows
//!
//! One configurable pipeline covers every view shape the platform needs,
//! replacing the per-view mapper variants of the source system. A mapper
//! is a pure function of one document: it holds no state, performs no IO,
//! and yields identical rows regardless of invocation order, so documents
//! map concurrently without coordination.
//!
//! Configuration axes:
//!
//! - [`KeyShape`]: which composite-key family rows are emitted under
//! - [`OutputMode`]: raw scalar values or timestamped envelopes with
//!   passthrough metadata
//! - `numeric_only`: restrict emission to numerically-coercible fields
//!
//! Failure policy: a malformed document contributes zero rows; a malformed
//! aggregation-path dimension contributes zero rows for that dimension
//! only. Both are absorbed here, logged at `warn`, and never propagate.

pub mod paths;
pub mod timebucket;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SchemaConfig;
use crate::document::{numeric_value, DataEntry, DataRecord, Document};
use crate::types::{CompositeKey, EmittedRow, Envelope, KeyComponent, RowValue};

/// Calendar period used by period-scoped key shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    /// ISO 8601 week (Monday-start, first-Thursday rule)
    IsoWeek,
    /// US/calendar week (Sunday-start, prior-year rollback)
    UsWeek,
    /// Calendar month (1-12)
    Month,
}

/// Composite-key family a mapper emits under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// `[entity_type, dimension, field, ...hierarchy_prefix, ...calendar]`
    ///
    /// The hierarchy-expanding family: every non-`_type` dimension fans
    /// out into all of its non-empty prefixes.
    HierarchyCalendar,

    /// `[entity_type, entity_id, field, form_code, epoch_millis]`
    EntityForm,

    /// `[entity_type, entity_id, field, ...calendar]`
    EntityCalendar,

    /// `[entity_type, field, ...calendar]`
    TypeCalendar,

    /// `[year, period, form_code, entity_type, short_code, field]`
    Period(PeriodKind),

    /// `[form_code, short_code, field, epoch_millis]`
    FormEntity,
}

/// Which passthrough fields an envelope copies from the document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeSpec {
    /// Copy the field name
    pub field: bool,
    /// Copy the backing entity id
    pub entity_id: bool,
    /// Copy the entity short code
    pub short_code: bool,
    /// Copy the data dictionary primitive type
    pub primitive_type: bool,
    /// Copy the geographic hierarchy
    pub location: bool,
    /// Copy the full aggregation-path snapshot
    pub aggregation_paths: bool,
}

/// Value half of emitted rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Raw value only, for sum/count views
    Scalar,
    /// Timestamped envelope with the selected passthrough fields
    Envelope(EnvelopeSpec),
}

/// The configurable mapping pipeline
#[derive(Debug, Clone)]
pub struct RecordMapper {
    shape: KeyShape,
    output: OutputMode,
    numeric_only: bool,
}

impl RecordMapper {
    /// Create a mapper for a key shape and output mode
    pub fn new(shape: KeyShape, output: OutputMode) -> Self {
        Self {
            shape,
            output,
            numeric_only: false,
        }
    }

    /// Restrict emission to fields whose value coerces to a finite number
    pub fn numeric_only(mut self, numeric_only: bool) -> Self {
        self.numeric_only = numeric_only;
        self
    }

    /// Map a raw JSON document, absorbing all failures
    ///
    /// The indexing boundary: never raises. Non-DataRecord documents and
    /// malformed documents yield zero rows.
    pub fn map_json(&self, raw: &Value, schema: &SchemaConfig) -> Vec<EmittedRow> {
        match Document::decode(raw, schema) {
            Ok(Some(Document::DataRecord(record))) => {
                let rows = self.emit(&record);
                debug!(
                    doc = record.id.as_deref().unwrap_or("?"),
                    rows = rows.len(),
                    "mapped data record"
                );
                rows
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "skipping malformed document");
                Vec::new()
            }
        }
    }

    /// Map a decoded record
    ///
    /// Pure over the record's data: void records and records missing a
    /// discriminator the key shape requires emit nothing.
    pub fn emit(&self, record: &DataRecord) -> Vec<EmittedRow> {
        if record.void {
            return Vec::new();
        }
        match self.shape {
            KeyShape::HierarchyCalendar => self.emit_hierarchy(record),
            _ => self.emit_flat(record),
        }
    }

    /// Hierarchy-expanding family: one row per (field, dimension, prefix)
    fn emit_hierarchy(&self, record: &DataRecord) -> Vec<EmittedRow> {
        let agg_paths = record.aggregation_paths();
        let Some(entity_type) = paths::entity_type(agg_paths) else {
            return Vec::new();
        };
        let dims = match paths::dimension_entries(agg_paths) {
            Ok(dims) => dims,
            Err(e) => {
                warn!(
                    doc = record.id.as_deref().unwrap_or("?"),
                    error = %e,
                    "skipping aggregation paths"
                );
                return Vec::new();
            }
        };

        // Validate each dimension once; a bad dimension skips only itself.
        let mut expanded: Vec<(&str, Vec<String>)> = Vec::with_capacity(dims.len());
        for (name, value) in dims {
            match paths::dimension_path(name, value) {
                Ok(Some(path)) => expanded.push((name, path)),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        doc = record.id.as_deref().unwrap_or("?"),
                        error = %e,
                        "skipping dimension"
                    );
                }
            }
        }

        let calendar = timebucket::calendar_components(record.event_time);
        let mut rows = Vec::new();
        for (field, entry) in &record.data {
            let Some(value) = self.row_value(record, field, entry) else {
                continue;
            };
            for (dimension, path) in &expanded {
                for prefix in paths::prefixes(path) {
                    let mut key = CompositeKey::new();
                    key.push(KeyComponent::from(entity_type.as_str()));
                    key.push(KeyComponent::from(*dimension));
                    key.push(KeyComponent::from(field.as_str()));
                    key.extend(prefix.iter().map(|p| KeyComponent::from(p.as_str())));
                    key.extend(calendar.iter().map(|&c| KeyComponent::Int(c)));
                    rows.push(EmittedRow::new(key, value.clone()));
                }
            }
        }
        rows
    }

    /// Flat families: one row per field
    fn emit_flat(&self, record: &DataRecord) -> Vec<EmittedRow> {
        let mut rows = Vec::new();
        for (field, entry) in &record.data {
            let Some(value) = self.row_value(record, field, entry) else {
                continue;
            };
            let Some(key) = self.flat_key(record, field) else {
                // A discriminator this shape needs is missing; the record
                // cannot be keyed at all.
                return Vec::new();
            };
            rows.push(EmittedRow::new(key, value));
        }
        rows
    }

    fn flat_key(&self, record: &DataRecord, field: &str) -> Option<CompositeKey> {
        let agg_paths = record.aggregation_paths();
        let millis = record.event_time.timestamp_millis();
        let mut key = CompositeKey::new();
        match self.shape {
            KeyShape::EntityForm => {
                key.push(paths::entity_type(agg_paths)?.into());
                key.push(record.entity_id()?.into());
                key.push(field.into());
                key.push(record.form_code.as_deref()?.into());
                key.push(KeyComponent::Int(millis));
            }
            KeyShape::EntityCalendar => {
                key.push(paths::entity_type(agg_paths)?.into());
                key.push(record.entity_id()?.into());
                key.push(field.into());
                let calendar = timebucket::calendar_components(record.event_time);
                key.extend(calendar.iter().map(|&c| KeyComponent::Int(c)));
            }
            KeyShape::TypeCalendar => {
                key.push(paths::entity_type(agg_paths)?.into());
                key.push(field.into());
                let calendar = timebucket::calendar_components(record.event_time);
                key.extend(calendar.iter().map(|&c| KeyComponent::Int(c)));
            }
            KeyShape::Period(kind) => {
                let date = record.event_time.date_naive();
                let (year, period) = match kind {
                    PeriodKind::IsoWeek => timebucket::iso_week(date),
                    PeriodKind::UsWeek => timebucket::us_week(date),
                    PeriodKind::Month => {
                        let [year, month, ..] = timebucket::calendar_components(record.event_time);
                        (year as i32, month as u32)
                    }
                };
                key.push(KeyComponent::Int(i64::from(year)));
                key.push(KeyComponent::Int(i64::from(period)));
                key.push(record.form_code.as_deref()?.into());
                key.push(paths::entity_type(agg_paths)?.into());
                key.push(record.short_code()?.into());
                key.push(field.into());
            }
            KeyShape::FormEntity => {
                key.push(record.form_code.as_deref()?.into());
                key.push(record.short_code()?.into());
                key.push(field.into());
                key.push(KeyComponent::Int(millis));
            }
            KeyShape::HierarchyCalendar => return None,
        }
        Some(key)
    }

    /// Apply the numeric filter and build the row value
    fn row_value(&self, record: &DataRecord, field: &str, entry: &DataEntry) -> Option<RowValue> {
        let numeric = numeric_value(&entry.value);
        if self.numeric_only && numeric.is_none() {
            return None;
        }
        Some(match &self.output {
            OutputMode::Scalar => {
                // Numeric-filtered scalar views emit the coerced number so
                // "37.5" and 37.5 index identically.
                let value = match numeric {
                    Some(n) if self.numeric_only => {
                        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(entry.value.clone())
                    }
                    _ => entry.value.clone(),
                };
                RowValue::Scalar(value)
            }
            OutputMode::Envelope(spec) => RowValue::Envelope(self.envelope(record, field, entry, spec)),
        })
    }

    fn envelope(
        &self,
        record: &DataRecord,
        field: &str,
        entry: &DataEntry,
        spec: &EnvelopeSpec,
    ) -> Envelope {
        let agg_paths = record.aggregation_paths();
        Envelope {
            timestamp: record.event_time.timestamp_millis(),
            value: entry.value.clone(),
            field: spec.field.then(|| field.to_string()),
            entity_id: if spec.entity_id {
                record.entity_id().map(str::to_string)
            } else {
                None
            },
            short_code: if spec.short_code {
                record.short_code().map(str::to_string)
            } else {
                None
            },
            primitive_type: if spec.primitive_type {
                entry
                    .dd_type
                    .as_ref()
                    .and_then(|t| t.primitive_type.clone())
            } else {
                None
            },
            location: if spec.location {
                paths::location(agg_paths)
            } else {
                None
            },
            aggregation_paths: if spec.aggregation_paths {
                let snapshot = paths::sequence_paths(agg_paths);
                (!snapshot.is_empty()).then_some(snapshot)
            } else {
                None
            },
        }
    }
}
