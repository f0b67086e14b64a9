//! Core key and row types used throughout the indexing core
//!
//! # Key Types
//!
//! - **`KeyComponent`**: one heterogeneous atom of a composite key
//! - **`CompositeKey`**: ordered tuple of components with total,
//!   lexicographic ordering, enabling prefix-range queries
//! - **`RowValue`**: the value half of an emitted row (scalar, envelope,
//!   projection reference, or unit)
//! - **`EmittedRow`**: one `(key, value)` pair produced by a mapper
//!
//! # Example
//!
//! ```rust
//! use rollup_index::types::{CompositeKey, KeyComponent};
//!
//! let key = CompositeKey::from(vec![
//!     KeyComponent::from("clinic"),
//!     KeyComponent::from("geo"),
//!     KeyComponent::from(2021_i64),
//! ]);
//! let prefix = key.truncated(2);
//! assert!(key.starts_with(&prefix));
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One component of a composite key
///
/// Components collate the way the host index store collates mixed-type key
/// tuples: null < booleans < numbers < strings. Integer and floating
/// components occupy the same band and compare numerically, so `Int(7)`
/// and `Num(7.0)` are interchangeable in a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyComponent {
    /// JSON null
    Null,
    /// Boolean, collating false < true
    Bool(bool),
    /// Integer component (calendar fields, epoch milliseconds)
    Int(i64),
    /// Floating component (raw data values used as keys)
    Num(f64),
    /// String component
    Text(String),
}

impl KeyComponent {
    /// Collation band of the component type
    fn rank(&self) -> u8 {
        match self {
            KeyComponent::Null => 0,
            KeyComponent::Bool(_) => 1,
            KeyComponent::Int(_) | KeyComponent::Num(_) => 2,
            KeyComponent::Text(_) => 3,
        }
    }

    /// Numeric reading for components in the number band
    fn as_f64(&self) -> Option<f64> {
        match self {
            KeyComponent::Int(i) => Some(*i as f64),
            KeyComponent::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Build a component from an arbitrary JSON scalar
    ///
    /// Non-scalar values (arrays, objects) collapse to their compact JSON
    /// text so that any emitted value can participate in a projection key
    /// deterministically.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => KeyComponent::Null,
            serde_json::Value::Bool(b) => KeyComponent::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => KeyComponent::Int(i),
                None => KeyComponent::Num(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => KeyComponent::Text(s.clone()),
            other => KeyComponent::Text(other.to_string()),
        }
    }
}

impl PartialEq for KeyComponent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyComponent {}

impl PartialOrd for KeyComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyComponent::Bool(a), KeyComponent::Bool(b)) => a.cmp(b),
            (KeyComponent::Int(a), KeyComponent::Int(b)) => a.cmp(b),
            (KeyComponent::Text(a), KeyComponent::Text(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }
}

impl From<&str> for KeyComponent {
    fn from(s: &str) -> Self {
        KeyComponent::Text(s.to_string())
    }
}

impl From<String> for KeyComponent {
    fn from(s: String) -> Self {
        KeyComponent::Text(s)
    }
}

impl From<i64> for KeyComponent {
    fn from(i: i64) -> Self {
        KeyComponent::Int(i)
    }
}

impl From<f64> for KeyComponent {
    fn from(n: f64) -> Self {
        KeyComponent::Num(n)
    }
}

impl fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyComponent::Null => write!(f, "null"),
            KeyComponent::Bool(b) => write!(f, "{}", b),
            KeyComponent::Int(i) => write!(f, "{}", i),
            KeyComponent::Num(n) => write!(f, "{}", n),
            KeyComponent::Text(s) => write!(f, "{}", s),
        }
    }
}

/// An ordered, heterogeneous key tuple
///
/// Keys compare lexicographically component-by-component; a key that is a
/// strict prefix of another sorts before it. This matches the multi-level
/// grouping the index store performs and makes every hierarchy prefix a
/// contiguous key range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey(Vec<KeyComponent>);

impl CompositeKey {
    /// Create an empty key
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append one component
    pub fn push(&mut self, component: KeyComponent) {
        self.0.push(component);
    }

    /// Append several components
    pub fn extend<I: IntoIterator<Item = KeyComponent>>(&mut self, components: I) {
        self.0.extend(components);
    }

    /// Components as a slice
    pub fn components(&self) -> &[KeyComponent] {
        &self.0
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the key has no components
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `prefix` matches the leading components of this key
    pub fn starts_with(&self, prefix: &CompositeKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// The first `level` components as a new key
    ///
    /// Used by grouped queries: rows sharing a truncated key belong to the
    /// same group at that level.
    pub fn truncated(&self, level: usize) -> CompositeKey {
        CompositeKey(self.0.iter().take(level).cloned().collect())
    }
}

impl Default for CompositeKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<KeyComponent>> for CompositeKey {
    fn from(components: Vec<KeyComponent>) -> Self {
        Self(components)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

/// Row payload emitted under an envelope-producing view
///
/// Carries the event timestamp alongside the raw value plus whichever
/// passthrough fields the view is configured to copy from the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Event time as epoch milliseconds
    pub timestamp: i64,

    /// Raw field value, unfiltered
    pub value: serde_json::Value,

    /// Field name the value came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Backing entity document id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Entity short code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_code: Option<String>,

    /// Primitive type slug from the field's data dictionary entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primitive_type: Option<String>,

    /// Geographic hierarchy snapshot, when present on the entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Vec<String>>,

    /// Full aggregation-path snapshot (sequence-valued dimensions only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_paths: Option<BTreeMap<String, Vec<String>>>,
}

/// The value half of an emitted row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowValue {
    /// Raw field value, used by sum/count-only views
    Scalar(serde_json::Value),

    /// Timestamped value with passthrough metadata
    Envelope(Envelope),

    /// Document reference emitted by projection views
    Id(String),

    /// No payload; the row's existence is the datum
    Unit,
}

/// One `(key, value)` pair produced by a mapper
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedRow {
    /// Sort/group key
    pub key: CompositeKey,

    /// Row payload
    pub value: RowValue,
}

impl EmittedRow {
    /// Create a new row
    pub fn new(key: CompositeKey, value: RowValue) -> Self {
        Self { key, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: Vec<KeyComponent>) -> CompositeKey {
        CompositeKey::from(parts)
    }

    #[test]
    fn test_component_collation_bands() {
        let null = KeyComponent::Null;
        let flag = KeyComponent::Bool(false);
        let num = KeyComponent::Int(99);
        let text = KeyComponent::from("a");

        assert!(null < flag);
        assert!(flag < num);
        assert!(num < text);
    }

    #[test]
    fn test_int_and_num_compare_numerically() {
        assert_eq!(KeyComponent::Int(7), KeyComponent::Num(7.0));
        assert!(KeyComponent::Int(7) < KeyComponent::Num(7.5));
        assert!(KeyComponent::Num(6.5) < KeyComponent::Int(7));
    }

    #[test]
    fn test_key_ordering_is_lexicographic() {
        let a = key(vec!["clinic".into(), "geo".into(), 2021_i64.into()]);
        let b = key(vec!["clinic".into(), "geo".into(), 2022_i64.into()]);
        let c = key(vec!["clinic".into(), "geo".into()]);

        assert!(a < b);
        // A strict prefix sorts before any extension of it.
        assert!(c < a);
    }

    #[test]
    fn test_prefix_and_truncation() {
        let full = key(vec![
            "clinic".into(),
            "geo".into(),
            "temp".into(),
            "country".into(),
            2021_i64.into(),
        ]);
        let prefix = full.truncated(3);

        assert_eq!(prefix.len(), 3);
        assert!(full.starts_with(&prefix));
        assert!(!prefix.starts_with(&full));
        assert!(full.starts_with(&CompositeKey::new()));
    }

    #[test]
    fn test_component_from_json() {
        assert_eq!(
            KeyComponent::from_json(&serde_json::json!(42)),
            KeyComponent::Int(42)
        );
        assert_eq!(
            KeyComponent::from_json(&serde_json::json!(37.5)),
            KeyComponent::Num(37.5)
        );
        assert_eq!(
            KeyComponent::from_json(&serde_json::json!("x")),
            KeyComponent::from("x")
        );
        assert_eq!(KeyComponent::from_json(&serde_json::Value::Null), KeyComponent::Null);
    }

    #[test]
    fn test_key_display() {
        let k = key(vec!["clinic".into(), 2021_i64.into()]);
        assert_eq!(k.to_string(), "[clinic, 2021]");
    }
}
