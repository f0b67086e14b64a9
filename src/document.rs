//! Boundary document model
//!
//! Incoming documents are loosely-typed JSON. They are decoded exactly once,
//! at the mapping boundary, into a small set of tagged variants with
//! explicit optional members; everything downstream works on typed data.
//!
//! Decoding policy matches the indexing contract:
//!
//! - an unrecognized or absent `document_type` decodes to nothing (zero
//!   rows, no error)
//! - absent optional fields never fail
//! - a structurally required field that is present but unusable raises
//!   [`MapError::MalformedDocument`], which the mapping boundary absorbs as
//!   zero rows for that document

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::SchemaConfig;
use crate::error::MapError;

/// Document type discriminators understood by the decoder
pub mod document_type {
    /// Timestamped field data attached to an entity
    pub const DATA_RECORD: &str = "DataRecord";
    /// A registered entity with its aggregation hierarchy
    pub const ENTITY: &str = "Entity";
    /// Submission transport metadata
    pub const SUBMISSION_LOG: &str = "SubmissionLog";
    /// A structured survey submission
    pub const SURVEY_RESPONSE: &str = "SurveyResponse";
    /// A data-sender contact card
    pub const CONTACT: &str = "Contact";
}

/// Embedded entity reference, snapshotted into each data record at
/// creation time
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityRef {
    /// Entity document id
    #[serde(rename = "_id", alias = "id", default)]
    pub id: Option<String>,

    /// Human-facing entity code
    #[serde(default)]
    pub short_code: Option<String>,

    /// Dimension name → hierarchy value. Kept loosely typed; the path
    /// expander validates shape per dimension.
    #[serde(default)]
    pub aggregation_paths: Value,
}

/// Data dictionary type attached to a field value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataDictType {
    /// Stable slug for the type
    #[serde(default)]
    pub slug: Option<String>,

    /// Primitive type name ("number", "string", ...)
    #[serde(default)]
    pub primitive_type: Option<String>,

    /// Free-form classification tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Data dictionary document id
    #[serde(rename = "_id", alias = "id", default)]
    pub id: Option<String>,
}

/// One field entry inside a data record's `data` map
#[derive(Debug, Clone, Default)]
pub struct DataEntry {
    /// Raw submitted value
    pub value: Value,

    /// Data dictionary type, when recorded
    pub dd_type: Option<DataDictType>,
}

impl DataEntry {
    /// Decode a single entry leniently
    ///
    /// A non-object entry or an unusable `type` sub-object degrades to an
    /// entry with a null value / no type rather than failing the document.
    fn from_json(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return DataEntry::default();
        };
        let value = obj.get("value").cloned().unwrap_or(Value::Null);
        let dd_type = obj
            .get("type")
            .and_then(|t| serde_json::from_value(t.clone()).ok());
        DataEntry { value, dd_type }
    }
}

/// A timestamped, immutable data record
#[derive(Debug, Clone)]
pub struct DataRecord {
    /// Document id
    pub id: Option<String>,

    /// Soft-delete marker; void records index to nothing
    pub void: bool,

    /// When the measured event occurred (not when it was reported)
    pub event_time: DateTime<Utc>,

    /// Entity snapshot taken at record creation
    pub entity: Option<EntityRef>,

    /// Code of the form that produced this record, resolved through the
    /// schema table (submission-nested first, then top-level)
    pub form_code: Option<String>,

    /// Field name → submitted entry
    pub data: BTreeMap<String, DataEntry>,
}

impl DataRecord {
    /// Entity document id, when the snapshot carries one
    pub fn entity_id(&self) -> Option<&str> {
        self.entity.as_ref().and_then(|e| e.id.as_deref())
    }

    /// Entity short code, when the snapshot carries one
    pub fn short_code(&self) -> Option<&str> {
        self.entity.as_ref().and_then(|e| e.short_code.as_deref())
    }

    /// The entity's aggregation paths (JSON null when absent)
    pub fn aggregation_paths(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.entity
            .as_ref()
            .map(|e| &e.aggregation_paths)
            .unwrap_or(&NULL)
    }
}

/// A registered entity document
#[derive(Debug, Clone)]
pub struct Entity {
    /// Document id
    pub id: Option<String>,

    /// Soft-delete marker
    pub void: bool,

    /// Human-facing entity code
    pub short_code: Option<String>,

    /// Dimension name → hierarchy value
    pub aggregation_paths: Value,

    /// Latest known value per field
    pub data: BTreeMap<String, DataEntry>,
}

/// Submission transport metadata
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionLog {
    /// Document id
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    /// Soft-delete marker
    #[serde(default)]
    pub void: bool,

    /// Submitting identity (phone number, account, ...)
    #[serde(default)]
    pub source: Option<String>,

    /// Transport channel (sms, web, ...)
    #[serde(default)]
    pub channel: Option<String>,

    /// Form the submission targeted
    #[serde(default)]
    pub form_code: Option<String>,

    /// Processing outcome; arbitrary JSON scalar in old documents
    #[serde(default)]
    pub status: Value,
}

/// A structured survey submission
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveyResponse {
    /// Document id
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    /// Soft-delete marker
    #[serde(default)]
    pub void: bool,

    /// Form the response belongs to
    #[serde(default)]
    pub form_code: Option<String>,

    /// Processing outcome
    #[serde(default)]
    pub status: Value,
}

/// A data-sender contact card
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contact {
    /// Document id
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    /// Soft-delete marker
    #[serde(default)]
    pub void: bool,

    /// Contact email
    #[serde(default)]
    pub email: Option<String>,

    /// Contact mobile number
    #[serde(default)]
    pub mobile_number: Option<String>,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

/// A decoded document, tagged by `document_type`
#[derive(Debug, Clone)]
pub enum Document {
    /// Timestamped field data
    DataRecord(DataRecord),
    /// Registered entity
    Entity(Entity),
    /// Submission transport metadata
    SubmissionLog(SubmissionLog),
    /// Structured survey submission
    SurveyResponse(SurveyResponse),
    /// Data-sender contact card
    Contact(Contact),
}

impl Document {
    /// Decode a raw JSON document
    ///
    /// Returns `Ok(None)` for documents the indexing core does not consume
    /// (missing or unrecognized `document_type`).
    pub fn decode(raw: &Value, schema: &SchemaConfig) -> Result<Option<Document>, MapError> {
        let Some(doc_type) = raw.get("document_type").and_then(Value::as_str) else {
            return Ok(None);
        };

        let doc = match doc_type {
            document_type::DATA_RECORD => {
                Document::DataRecord(decode_data_record(raw, schema)?)
            }
            document_type::ENTITY => Document::Entity(decode_entity(raw)?),
            document_type::SUBMISSION_LOG => {
                Document::SubmissionLog(decode_as(raw, document_type::SUBMISSION_LOG)?)
            }
            document_type::SURVEY_RESPONSE => {
                Document::SurveyResponse(decode_as(raw, document_type::SURVEY_RESPONSE)?)
            }
            document_type::CONTACT => {
                Document::Contact(decode_as(raw, document_type::CONTACT)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(doc))
    }
}

fn doc_id(raw: &Value) -> String {
    raw.get("_id")
        .and_then(Value::as_str)
        .unwrap_or("?")
        .to_string()
}

fn malformed(raw: &Value, reason: impl Into<String>) -> MapError {
    MapError::MalformedDocument {
        id: doc_id(raw),
        reason: reason.into(),
    }
}

fn decode_as<T: for<'de> Deserialize<'de>>(raw: &Value, what: &str) -> Result<T, MapError> {
    serde_json::from_value(raw.clone())
        .map_err(|e| malformed(raw, format!("unreadable {} document: {}", what, e)))
}

fn decode_data_record(raw: &Value, schema: &SchemaConfig) -> Result<DataRecord, MapError> {
    let void = raw.get("void").and_then(Value::as_bool).unwrap_or(false);

    let event_time = match raw.get("event_time") {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| malformed(raw, format!("unparseable event_time {:?}: {}", s, e)))?,
        Some(other) => {
            return Err(malformed(
                raw,
                format!("event_time is not a datestring: {}", other),
            ))
        }
        None => return Err(malformed(raw, "missing event_time")),
    };

    let mut entity = None;
    for alias in &schema.entity_aliases {
        match raw.get(alias) {
            None | Some(Value::Null) => continue,
            Some(v) => {
                let decoded: EntityRef = serde_json::from_value(v.clone()).map_err(|e| {
                    malformed(raw, format!("unreadable entity reference `{}`: {}", alias, e))
                })?;
                entity = Some(decoded);
                break;
            }
        }
    }

    let form_code = resolve_form_code(raw, schema);

    let data = match raw.get("data") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(field, entry)| (field.clone(), DataEntry::from_json(entry)))
            .collect(),
        Some(other) => {
            return Err(malformed(raw, format!("data is not a map: {}", other)))
        }
    };

    Ok(DataRecord {
        id: raw.get("_id").and_then(Value::as_str).map(str::to_string),
        void,
        event_time,
        entity,
        form_code,
        data,
    })
}

fn resolve_form_code(raw: &Value, schema: &SchemaConfig) -> Option<String> {
    if schema.form_code_from_submission {
        let nested = raw
            .get("submission")
            .and_then(|s| s.get("form_code"))
            .and_then(Value::as_str);
        if let Some(code) = nested {
            return Some(code.to_string());
        }
    }
    if schema.accept_top_level_form_code {
        if let Some(code) = raw.get("form_code").and_then(Value::as_str) {
            return Some(code.to_string());
        }
    }
    None
}

fn decode_entity(raw: &Value) -> Result<Entity, MapError> {
    let data = match raw.get("data") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(field, entry)| (field.clone(), DataEntry::from_json(entry)))
            .collect(),
        Some(other) => {
            return Err(malformed(raw, format!("data is not a map: {}", other)))
        }
    };
    Ok(Entity {
        id: raw.get("_id").and_then(Value::as_str).map(str::to_string),
        void: raw.get("void").and_then(Value::as_bool).unwrap_or(false),
        short_code: raw
            .get("short_code")
            .and_then(Value::as_str)
            .map(str::to_string),
        aggregation_paths: raw
            .get("aggregation_paths")
            .cloned()
            .unwrap_or(Value::Null),
        data,
    })
}

/// Numeric coercion used throughout the mapping pipeline
///
/// A value is numeric iff parsing it as a floating-point number succeeds
/// and the result is finite. Numeric-looking text counts; null, booleans,
/// empty strings, `NaN` and infinities do not.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
