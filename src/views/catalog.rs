//! The standard view catalog
//!
//! Every named view the platform queries, expressed through the one
//! configurable pipeline. Rollup views differ only in key shape, output
//! mode, and numeric filtering; projection views are plain filter+emit
//! passes over decoded documents.

use std::sync::Arc;

use crate::config::IndexConfig;
use crate::document::Document;
use crate::error::ConfigError;
use crate::mapping::{EnvelopeSpec, KeyShape, OutputMode, PeriodKind, RecordMapper};
use crate::types::{CompositeKey, EmittedRow, KeyComponent, RowValue};
use crate::views::{ProjectionView, RollupView, View};

/// Names of every view in the catalog
pub const VIEW_NAMES: &[&str] = &[
    "by_values",
    "by_values_time",
    "by_values_latest",
    "by_aggregation_path",
    "by_aggregation_path_latest",
    "by_time",
    "weekly_aggregate_stats",
    "weekly_aggregate_latest",
    "monthly_aggregate_stats",
    "monthly_aggregate_latest",
    "data_by_form",
    "by_label_value",
    "entity_data",
    "entities_by_short_code",
    "submission_status",
    "data_senders",
];

/// Build the enabled view set from configuration
///
/// `None` in `views.enabled` means the full catalog; an unknown name is a
/// configuration error rather than a silently missing index.
pub fn standard_views(config: &IndexConfig) -> Result<Vec<Arc<dyn View>>, ConfigError> {
    let names: Vec<&str> = match &config.views.enabled {
        Some(enabled) => enabled.iter().map(String::as_str).collect(),
        None => VIEW_NAMES.to_vec(),
    };
    names
        .into_iter()
        .map(|name| build_view(name, config).ok_or_else(|| ConfigError::UnknownView(name.to_string())))
        .collect()
}

fn build_view(name: &str, config: &IndexConfig) -> Option<Arc<dyn View>> {
    let schema = config.schema.clone();
    let rollup = |name: &'static str, mapper: RecordMapper| -> Arc<dyn View> {
        Arc::new(RollupView::new(name, mapper, config.schema.clone()))
    };

    let view: Arc<dyn View> = match name {
        "by_values" => rollup(
            "by_values",
            RecordMapper::new(KeyShape::EntityForm, OutputMode::Scalar).numeric_only(true),
        ),
        "by_values_time" => rollup(
            "by_values_time",
            RecordMapper::new(
                KeyShape::EntityCalendar,
                OutputMode::Envelope(EnvelopeSpec {
                    field: true,
                    entity_id: true,
                    primitive_type: true,
                    location: true,
                    ..EnvelopeSpec::default()
                }),
            ),
        ),
        "by_values_latest" => rollup(
            "by_values_latest",
            RecordMapper::new(
                KeyShape::EntityForm,
                OutputMode::Envelope(EnvelopeSpec::default()),
            ),
        ),
        "by_aggregation_path" => rollup(
            "by_aggregation_path",
            RecordMapper::new(KeyShape::HierarchyCalendar, OutputMode::Scalar).numeric_only(true),
        ),
        "by_aggregation_path_latest" => rollup(
            "by_aggregation_path_latest",
            RecordMapper::new(
                KeyShape::HierarchyCalendar,
                OutputMode::Envelope(EnvelopeSpec {
                    field: true,
                    entity_id: true,
                    aggregation_paths: true,
                    ..EnvelopeSpec::default()
                }),
            )
            .numeric_only(true),
        ),
        "by_time" => rollup(
            "by_time",
            RecordMapper::new(KeyShape::TypeCalendar, OutputMode::Scalar).numeric_only(true),
        ),
        "weekly_aggregate_stats" => rollup(
            "weekly_aggregate_stats",
            RecordMapper::new(KeyShape::Period(PeriodKind::IsoWeek), OutputMode::Scalar)
                .numeric_only(true),
        ),
        "weekly_aggregate_latest" => rollup(
            "weekly_aggregate_latest",
            RecordMapper::new(
                KeyShape::Period(PeriodKind::UsWeek),
                OutputMode::Envelope(EnvelopeSpec::default()),
            ),
        ),
        "monthly_aggregate_stats" => rollup(
            "monthly_aggregate_stats",
            RecordMapper::new(KeyShape::Period(PeriodKind::Month), OutputMode::Scalar)
                .numeric_only(true),
        ),
        "monthly_aggregate_latest" => rollup(
            "monthly_aggregate_latest",
            RecordMapper::new(
                KeyShape::Period(PeriodKind::Month),
                OutputMode::Envelope(EnvelopeSpec::default()),
            ),
        ),
        "data_by_form" => rollup(
            "data_by_form",
            RecordMapper::new(
                KeyShape::FormEntity,
                OutputMode::Envelope(EnvelopeSpec {
                    short_code: true,
                    ..EnvelopeSpec::default()
                }),
            ),
        ),
        "by_label_value" => Arc::new(ProjectionView::new("by_label_value", schema, project_label_value)),
        "entity_data" => Arc::new(ProjectionView::new("entity_data", schema, project_entity_data)),
        "entities_by_short_code" => Arc::new(ProjectionView::new(
            "entities_by_short_code",
            schema,
            project_entity_short_code,
        )),
        "submission_status" => {
            Arc::new(ProjectionView::new("submission_status", schema, project_submission_status).counted())
        }
        "data_senders" => Arc::new(ProjectionView::new("data_senders", schema, project_data_senders)),
        _ => return None,
    };
    Some(view)
}

/// DataRecord → `([field, value], entity_id)`: find entities by a
/// submitted field value
fn project_label_value(doc: &Document) -> Vec<EmittedRow> {
    let Document::DataRecord(record) = doc else {
        return Vec::new();
    };
    if record.void {
        return Vec::new();
    }
    let Some(entity_id) = record.entity_id() else {
        return Vec::new();
    };
    record
        .data
        .iter()
        .map(|(field, entry)| {
            let key = CompositeKey::from(vec![
                KeyComponent::from(field.as_str()),
                KeyComponent::from_json(&entry.value),
            ]);
            EmittedRow::new(key, RowValue::Id(entity_id.to_string()))
        })
        .collect()
}

/// DataRecord → `([entity_id], record_id)`: all records backing an entity
fn project_entity_data(doc: &Document) -> Vec<EmittedRow> {
    let Document::DataRecord(record) = doc else {
        return Vec::new();
    };
    if record.void {
        return Vec::new();
    }
    match (record.entity_id(), record.id.as_deref()) {
        (Some(entity_id), Some(record_id)) => vec![EmittedRow::new(
            CompositeKey::from(vec![KeyComponent::from(entity_id)]),
            RowValue::Id(record_id.to_string()),
        )],
        _ => Vec::new(),
    }
}

/// Entity → `([entity_type, short_code], entity_id)`: resolve an entity
/// from its human-facing code
fn project_entity_short_code(doc: &Document) -> Vec<EmittedRow> {
    let Document::Entity(entity) = doc else {
        return Vec::new();
    };
    if entity.void {
        return Vec::new();
    }
    let entity_type = crate::mapping::paths::entity_type(&entity.aggregation_paths);
    match (entity_type, entity.short_code.as_deref(), entity.id.as_deref()) {
        (Some(entity_type), Some(short_code), Some(id)) => vec![EmittedRow::new(
            CompositeKey::from(vec![
                KeyComponent::from(entity_type),
                KeyComponent::from(short_code),
            ]),
            RowValue::Id(id.to_string()),
        )],
        _ => Vec::new(),
    }
}

/// SubmissionLog / SurveyResponse → `([form_code, status], unit)`,
/// counted per key
fn project_submission_status(doc: &Document) -> Vec<EmittedRow> {
    let (void, form_code, status) = match doc {
        Document::SubmissionLog(log) => (log.void, log.form_code.as_deref(), &log.status),
        Document::SurveyResponse(resp) => (resp.void, resp.form_code.as_deref(), &resp.status),
        _ => return Vec::new(),
    };
    if void {
        return Vec::new();
    }
    let Some(form_code) = form_code else {
        return Vec::new();
    };
    vec![EmittedRow::new(
        CompositeKey::from(vec![
            KeyComponent::from(form_code),
            KeyComponent::from_json(status),
        ]),
        RowValue::Unit,
    )]
}

/// Contact → `([email|mobile], contact_id)`: data-sender lookup
fn project_data_senders(doc: &Document) -> Vec<EmittedRow> {
    let Document::Contact(contact) = doc else {
        return Vec::new();
    };
    if contact.void {
        return Vec::new();
    }
    let Some(id) = contact.id.as_deref() else {
        return Vec::new();
    };
    [&contact.email, &contact.mobile_number]
        .into_iter()
        .flatten()
        .map(|handle| {
            EmittedRow::new(
                CompositeKey::from(vec![KeyComponent::from(handle.as_str())]),
                RowValue::Id(id.to_string()),
            )
        })
        .collect()
}
