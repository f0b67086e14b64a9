//! Aggregation-path expansion
//!
//! An entity carries `aggregation_paths`: a map from dimension name to an
//! ordered hierarchy (e.g. `"_geo": ["in", "mh", "pune"]`). The `"_type"`
//! dimension is the entity-type classification and is exposed as a scalar
//! discriminator; every other dimension fans out into all of its non-empty
//! prefixes, so a record groups at every granularity of the hierarchy.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::MapError;

/// Dimension holding the entity-type hierarchy
pub const TYPE_DIMENSION: &str = "_type";

/// Conventional dimension holding the geographic hierarchy
pub const GEO_DIMENSION: &str = "_geo";

/// The scalar entity-type discriminator
///
/// The `"_type"` hierarchy collapses to its dot-joined form ("clinic", or
/// "clinic.chw" for nested types). A flat string value is accepted as-is.
/// Returns `None` when the type is missing, empty, or unusable; records
/// without a type discriminator index to nothing.
pub fn entity_type(paths: &Value) -> Option<String> {
    match paths.get(TYPE_DIMENSION)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(parts) if !parts.is_empty() => {
            let segments: Option<Vec<&str>> = parts.iter().map(Value::as_str).collect();
            segments.map(|s| s.join("."))
        }
        _ => None,
    }
}

/// All dimensions except `"_type"`, in deterministic (sorted) order
///
/// The paths value being present but not a map is the whole-structure
/// malformation case; the caller absorbs it per document.
pub fn dimension_entries(paths: &Value) -> Result<Vec<(&str, &Value)>, MapError> {
    match paths {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .filter(|(name, _)| name.as_str() != TYPE_DIMENSION)
            .map(|(name, value)| (name.as_str(), value))
            .collect()),
        other => Err(MapError::MalformedPath {
            dimension: "*".to_string(),
            reason: format!("aggregation_paths is not a map: {}", other),
        }),
    }
}

/// Decode one dimension's hierarchy sequence
///
/// Returns `Ok(None)` for an empty sequence (skipped silently); a value
/// that is not a sequence of strings is that dimension's malformation,
/// absorbed by the caller with zero rows for the dimension.
pub fn dimension_path(name: &str, value: &Value) -> Result<Option<Vec<String>>, MapError> {
    let Value::Array(parts) = value else {
        return Err(MapError::MalformedPath {
            dimension: name.to_string(),
            reason: format!("expected a sequence, got {}", value),
        });
    };
    if parts.is_empty() {
        return Ok(None);
    }
    let mut path = Vec::with_capacity(parts.len());
    for part in parts {
        match part.as_str() {
            Some(s) => path.push(s.to_string()),
            None => {
                return Err(MapError::MalformedPath {
                    dimension: name.to_string(),
                    reason: format!("non-string path element: {}", part),
                })
            }
        }
    }
    Ok(Some(path))
}

/// Every non-empty prefix of a hierarchy, shortest first
///
/// A path of depth d yields exactly d prefixes (lengths 1..=d).
pub fn prefixes(path: &[String]) -> impl Iterator<Item = &[String]> {
    (1..=path.len()).map(move |len| &path[..len])
}

/// Sequence-valued dimensions as a typed snapshot, `"_type"` included
///
/// Used for envelope passthrough; dimensions that fail to decode are
/// omitted rather than failing the row.
pub fn sequence_paths(paths: &Value) -> BTreeMap<String, Vec<String>> {
    let Value::Object(map) = paths else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(name, value)| {
            dimension_path(name, value)
                .ok()
                .flatten()
                .map(|path| (name.clone(), path))
        })
        .collect()
}

/// The geographic hierarchy, when present and well-formed
pub fn location(paths: &Value) -> Option<Vec<String>> {
    paths
        .get(GEO_DIMENSION)
        .and_then(|v| dimension_path(GEO_DIMENSION, v).ok().flatten())
}
