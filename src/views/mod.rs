//! View definitions: the contract surface toward the index store
//!
//! A view pairs a mapping pass with an optional reduce stage. The store
//! invokes `map` once per document change and `reduce` at arbitrary
//! fan-in while grouping or compacting; both calls are pure and absorb
//! malformed input as zero rows, so the store never sees a document-level
//! failure.
//!
//! Two concrete kinds exist:
//!
//! - [`RollupView`]: a [`RecordMapper`] configuration plus the shared
//!   accumulator reduce; the aggregation-bearing views.
//! - [`ProjectionView`]: a direct filter+emit pass over decoded documents
//!   with no aggregation weight (lookup tables), optionally with the
//!   count-only reduce.

pub mod catalog;

use serde_json::Value;
use tracing::warn;

use crate::config::SchemaConfig;
use crate::document::Document;
use crate::mapping::RecordMapper;
use crate::reduce::{self, Accumulator, ReduceInput};
use crate::types::EmittedRow;

pub use catalog::{standard_views, VIEW_NAMES};

/// The map/reduce contract a view exposes to the index store
pub trait View: Send + Sync {
    /// Stable view name, used as the index namespace
    fn name(&self) -> &str;

    /// Transform one raw document into rows; never raises
    fn map(&self, raw: &Value) -> Vec<EmittedRow>;

    /// Combine rows (leaf) or partials (merge) for one key group
    ///
    /// `None` for map-only projection views.
    fn reduce(&self, inputs: &[ReduceInput], rereduce: bool) -> Option<Accumulator>;

    /// Whether the view carries a reduce stage
    fn has_reduce(&self) -> bool;
}

impl std::fmt::Debug for dyn View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name())
            .field("has_reduce", &self.has_reduce())
            .finish()
    }
}

/// An aggregation-bearing view
pub struct RollupView {
    name: &'static str,
    mapper: RecordMapper,
    schema: SchemaConfig,
}

impl RollupView {
    /// Create a rollup view over a mapper configuration
    pub fn new(name: &'static str, mapper: RecordMapper, schema: SchemaConfig) -> Self {
        Self {
            name,
            mapper,
            schema,
        }
    }
}

impl View for RollupView {
    fn name(&self) -> &str {
        self.name
    }

    fn map(&self, raw: &Value) -> Vec<EmittedRow> {
        self.mapper.map_json(raw, &self.schema)
    }

    fn reduce(&self, inputs: &[ReduceInput], rereduce: bool) -> Option<Accumulator> {
        Some(reduce::reduce(inputs, rereduce))
    }

    fn has_reduce(&self) -> bool {
        true
    }
}

/// A direct filter+emit pass with no aggregation weight
pub struct ProjectionView {
    name: &'static str,
    schema: SchemaConfig,
    project: fn(&Document) -> Vec<EmittedRow>,
    counted: bool,
}

impl ProjectionView {
    /// Create a projection view from a pure projection function
    pub fn new(
        name: &'static str,
        schema: SchemaConfig,
        project: fn(&Document) -> Vec<EmittedRow>,
    ) -> Self {
        Self {
            name,
            schema,
            project,
            counted: false,
        }
    }

    /// Attach the count-only reduce (rows per key)
    pub fn counted(mut self) -> Self {
        self.counted = true;
        self
    }
}

impl View for ProjectionView {
    fn name(&self) -> &str {
        self.name
    }

    fn map(&self, raw: &Value) -> Vec<EmittedRow> {
        match Document::decode(raw, &self.schema) {
            Ok(Some(doc)) => (self.project)(&doc),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(view = self.name, error = %e, "skipping malformed document");
                Vec::new()
            }
        }
    }

    fn reduce(&self, inputs: &[ReduceInput], rereduce: bool) -> Option<Accumulator> {
        self.counted.then(|| reduce::reduce(inputs, rereduce))
    }

    fn has_reduce(&self) -> bool {
        self.counted
    }
}
