//! Rollup Index - Map/reduce aggregation-indexing core for hierarchical
//! time-series data records
//!
//! This library turns immutable, timestamped data records tagged with
//! hierarchical classification paths into multi-dimensional rollups:
//! - Deterministic multi-key fan-out per record (every hierarchy prefix,
//!   every calendar granularity)
//! - An associative/commutative combine law, so partial aggregates merge
//!   identically under any tree shape
//! - Sum, count, and "latest value" statistics with deterministic
//!   passthrough metadata
//! - One configurable mapping pipeline behind a named view catalog
//!
//! The persistent sorted-index engine is an external collaborator; the
//! in-memory store here is the reference implementation of its call
//! contract.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod document;
pub mod error;
pub mod mapping;
pub mod reduce;
pub mod types;
pub mod views;

/// In-memory reference store implementing the index-engine call contract
pub mod store;

// Re-export main types
pub use config::{IndexConfig, SchemaConfig};
pub use document::{DataRecord, Document};
pub use error::{ConfigError, Error, MapError, Result};
pub use mapping::{EnvelopeSpec, KeyShape, OutputMode, PeriodKind, RecordMapper};
pub use reduce::{reduce, Accumulator, ReduceInput};
pub use store::{InMemoryIndexStore, Stat, StatSelector};
pub use types::{CompositeKey, EmittedRow, Envelope, KeyComponent, RowValue};
pub use views::{standard_views, View, VIEW_NAMES};
