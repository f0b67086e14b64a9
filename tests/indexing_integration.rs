//! Integration tests for the full indexing pipeline
//!
//! These tests drive the in-memory store end-to-end:
//! - Multi-key fan-out per record across the view catalog
//! - Incremental re-indexing on document update and voiding
//! - Grouped prefix-range queries with leaf + merge reduce passes
//! - Week-numbering behavior at year boundaries
//! - Statistic selection mirroring the platform's query layer

use serde_json::{json, Value};

use rollup_index::{
    standard_views, CompositeKey, IndexConfig, InMemoryIndexStore, KeyComponent, RowValue, Stat,
    StatSelector,
};

// ============================================================================
// Helper Functions
// ============================================================================

/// A clinic data record with a depth-3 geographic hierarchy
fn clinic_record(id: &str, event_time: &str, temp: Value) -> Value {
    json!({
        "_id": id,
        "document_type": "DataRecord",
        "void": false,
        "event_time": event_time,
        "entity": {
            "_id": "e1",
            "short_code": "e1",
            "aggregation_paths": {
                "_type": ["clinic"],
                "geo": ["country", "region", "district"]
            }
        },
        "submission": {"form_code": "CL1"},
        "data": {"temp": {"value": temp}}
    })
}

fn store() -> InMemoryIndexStore {
    InMemoryIndexStore::new(standard_views(&IndexConfig::default()).unwrap())
}

fn key(parts: Vec<KeyComponent>) -> CompositeKey {
    CompositeKey::from(parts)
}

// ============================================================================
// Fan-out
// ============================================================================

#[test]
fn test_hierarchy_fanout_golden_example() {
    let store = store();
    store.upsert(&clinic_record("r1", "2021-03-15T10:20:30Z", json!(37.5)));

    let rows = store.rows_in("by_aggregation_path", &key(vec!["clinic".into()]));
    assert_eq!(rows.len(), 3);

    let calendar: Vec<KeyComponent> = [2021_i64, 3, 15, 10, 20, 30]
        .iter()
        .map(|&c| KeyComponent::Int(c))
        .collect();
    let expected: Vec<CompositeKey> = [
        vec!["clinic".into(), "geo".into(), "temp".into(), "country".into()],
        vec![
            "clinic".into(),
            "geo".into(),
            "temp".into(),
            "country".into(),
            "region".into(),
        ],
        vec![
            "clinic".into(),
            "geo".into(),
            "temp".into(),
            "country".into(),
            "region".into(),
            "district".into(),
        ],
    ]
    .into_iter()
    .map(|mut parts: Vec<KeyComponent>| {
        parts.extend(calendar.iter().cloned());
        CompositeKey::from(parts)
    })
    .collect();

    for (row, expected_key) in rows.iter().zip(&expected) {
        assert_eq!(&row.0, expected_key);
        assert_eq!(row.1, RowValue::Scalar(json!(37.5)));
    }
}

#[test]
fn test_depth_k_dimension_emits_k_rows_per_field() {
    let store = store();
    let mut raw = clinic_record("r1", "2021-03-15T10:20:30Z", json!(37.5));
    raw["entity"]["aggregation_paths"]["admin"] = json!(["zone"]);
    raw["data"]["weight"] = json!({"value": 64});
    store.upsert(&raw);

    // 2 fields x (geo depth 3 + admin depth 1) = 8 hierarchy rows.
    let rows = store.rows_in("by_aggregation_path", &CompositeKey::new());
    assert_eq!(rows.len(), 8);

    let admin_rows = store.rows_in(
        "by_aggregation_path",
        &key(vec!["clinic".into(), "admin".into()]),
    );
    assert_eq!(admin_rows.len(), 2);
}

#[test]
fn test_void_documents_index_to_nothing() {
    let store = store();
    let mut raw = clinic_record("r1", "2021-03-15T10:20:30Z", json!(37.5));
    raw["void"] = json!(true);
    store.upsert(&raw);

    for view in [
        "by_values",
        "by_values_time",
        "by_aggregation_path",
        "weekly_aggregate_stats",
        "by_label_value",
        "entity_data",
    ] {
        assert!(
            store.rows_in(view, &CompositeKey::new()).is_empty(),
            "view {} indexed a void record",
            view
        );
    }
}

// ============================================================================
// Incremental re-indexing
// ============================================================================

#[test]
fn test_voiding_removes_rows_incrementally() {
    let store = store();
    store.upsert(&clinic_record("r1", "2021-03-15T10:20:30Z", json!(37.5)));
    store.upsert(&clinic_record("r2", "2021-03-16T10:20:30Z", json!(39.0)));

    let prefix = key(vec!["clinic".into()]);
    assert_eq!(store.rows_in("by_aggregation_path", &prefix).len(), 6);

    // Mark r1 void and save it again: its rows drop out, r2's stay.
    let mut voided = clinic_record("r1", "2021-03-15T10:20:30Z", json!(37.5));
    voided["void"] = json!(true);
    store.upsert(&voided);

    let remaining = store.rows_in("by_aggregation_path", &prefix);
    assert_eq!(remaining.len(), 3);

    let acc = store.aggregate("by_aggregation_path", &prefix).unwrap();
    assert_eq!(acc.sum, 39.0 * 3.0);
    assert_eq!(acc.count, 3);
}

#[test]
fn test_update_replaces_prior_contribution() {
    let store = store();
    store.upsert(&clinic_record("r1", "2021-03-15T10:20:30Z", json!(37.5)));
    store.upsert(&clinic_record("r1", "2021-03-15T10:20:30Z", json!(40.0)));

    let acc = store
        .aggregate("by_values", &key(vec!["clinic".into()]))
        .unwrap();
    assert_eq!(acc.count, 1);
    assert_eq!(acc.sum, 40.0);
}

#[test]
fn test_remove_drops_document() {
    let store = store();
    store.upsert(&clinic_record("r1", "2021-03-15T10:20:30Z", json!(37.5)));
    store.remove("r1");
    assert!(store
        .rows_in("by_aggregation_path", &CompositeKey::new())
        .is_empty());
}

// ============================================================================
// Grouped queries and the merge pass
// ============================================================================

#[test]
fn test_grouped_aggregate_is_merge_shape_invariant() {
    // Same documents, different merge fan-ins: identical aggregates.
    let records: Vec<Value> = (0..20)
        .map(|i| {
            clinic_record(
                &format!("r{}", i),
                &format!("2021-03-{:02}T08:00:00Z", (i % 27) + 1),
                json!(i as f64 * 1.5),
            )
        })
        .collect();

    let mut baseline = None;
    for fan_in in [2, 3, 7, 64] {
        let store = InMemoryIndexStore::new(standard_views(&IndexConfig::default()).unwrap())
            .with_merge_fan_in(fan_in);
        for record in &records {
            store.upsert(record);
        }
        // The full-depth prefix selects exactly one row per record.
        let district = key(vec![
            "clinic".into(),
            "geo".into(),
            "temp".into(),
            "country".into(),
            "region".into(),
            "district".into(),
        ]);
        let groups = store.grouped("by_aggregation_path", &district, 6).unwrap();
        assert_eq!(groups.len(), 1, "one group at the district level");
        let acc = &groups[0].1;
        assert_eq!(acc.count, 20);

        match &baseline {
            None => baseline = Some(acc.clone()),
            Some(expected) => {
                assert_eq!(expected.sum, acc.sum);
                assert_eq!(expected.count, acc.count);
            }
        }
    }
}

#[test]
fn test_granularity_levels_walk_the_hierarchy() {
    let store = store();
    let mut region_b = clinic_record("r2", "2021-03-16T08:00:00Z", json!(10.0));
    region_b["entity"]["_id"] = json!("e2");
    region_b["entity"]["short_code"] = json!("e2");
    region_b["entity"]["aggregation_paths"]["geo"] = json!(["country", "other-region"]);
    store.upsert(&clinic_record("r1", "2021-03-15T08:00:00Z", json!(5.0)));
    store.upsert(&region_b);

    let selector = StatSelector::all(Stat::Sum);

    // Country level: both records in one bucket, each counted once.
    let countries = store.fetch_by_path("by_aggregation_path", "clinic", "geo", 1, &selector);
    assert_eq!(countries.len(), 1);
    assert_eq!(countries[&vec!["country".to_string()]]["temp"], json!(15.0));

    // Region level: they split.
    let regions = store.fetch_by_path("by_aggregation_path", "clinic", "geo", 2, &selector);
    assert_eq!(regions.len(), 2);
    assert_eq!(
        regions[&vec!["country".to_string(), "region".to_string()]]["temp"],
        json!(5.0)
    );
    assert_eq!(
        regions[&vec!["country".to_string(), "other-region".to_string()]]["temp"],
        json!(10.0)
    );
}

#[test]
fn test_latest_monotonicity_through_the_store() {
    let store = store();
    store.upsert(&clinic_record("r1", "2021-03-15T10:00:00Z", json!(1.0)));
    store.upsert(&clinic_record("r2", "2021-03-20T10:00:00Z", json!(2.0)));
    store.upsert(&clinic_record("r3", "2021-03-10T10:00:00Z", json!(3.0)));

    let acc = store
        .aggregate("by_values_latest", &key(vec!["clinic".into()]))
        .unwrap();
    // r2 bears the maximum timestamp.
    assert_eq!(acc.latest, Some(json!(2.0)));
    assert_eq!(acc.timestamp, Some(1616234400000));
    assert_eq!(acc.count, 3);
}

#[test]
fn test_projection_views_do_not_reduce() {
    let store = store();
    store.upsert(&clinic_record("r1", "2021-03-15T10:00:00Z", json!(37.5)));

    assert!(store.grouped("by_label_value", &CompositeKey::new(), 1).is_none());
    let rows = store.rows_in("by_label_value", &key(vec!["temp".into()]));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, RowValue::Id("e1".to_string()));
}

// ============================================================================
// Week conventions at the year boundary
// ============================================================================

#[test]
fn test_weekly_views_disagree_at_year_boundary() {
    let store = store();
    store.upsert(&clinic_record("r1", "2023-01-01T08:00:00Z", json!(37.5)));

    // ISO: week 52 of 2022.
    let iso = store.rows_in(
        "weekly_aggregate_stats",
        &key(vec![KeyComponent::Int(2022), KeyComponent::Int(52)]),
    );
    assert_eq!(iso.len(), 1);

    // US/calendar: week 1 of 2023.
    let us = store.rows_in(
        "weekly_aggregate_latest",
        &key(vec![KeyComponent::Int(2023), KeyComponent::Int(1)]),
    );
    assert_eq!(us.len(), 1);

    // And neither view has rows under the other's key.
    assert!(store
        .rows_in(
            "weekly_aggregate_stats",
            &key(vec![KeyComponent::Int(2023), KeyComponent::Int(1)]),
        )
        .is_empty());
    assert!(store
        .rows_in(
            "weekly_aggregate_latest",
            &key(vec![KeyComponent::Int(2022), KeyComponent::Int(52)]),
        )
        .is_empty());
}

#[test]
fn test_monthly_aggregate_buckets() {
    let store = store();
    store.upsert(&clinic_record("r1", "2021-03-15T10:00:00Z", json!(2.0)));
    store.upsert(&clinic_record("r2", "2021-03-25T10:00:00Z", json!(3.0)));
    store.upsert(&clinic_record("r3", "2021-04-02T10:00:00Z", json!(9.0)));

    let march = key(vec![KeyComponent::Int(2021), KeyComponent::Int(3)]);
    let acc = store.aggregate("monthly_aggregate_stats", &march).unwrap();
    assert_eq!(acc.sum, 5.0);
    assert_eq!(acc.count, 2);

    // Grouping at [year, month, form, type, short_code, field] keeps
    // per-entity buckets for the reporting layer.
    let groups = store
        .grouped("monthly_aggregate_latest", &march, 6)
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].1.latest, Some(json!(3.0)));
}

// ============================================================================
// Statistic selection (query-layer mirror)
// ============================================================================

#[test]
fn test_fetch_selects_stat_per_field() {
    let store = store();
    let mut r1 = clinic_record("r1", "2021-03-15T10:00:00Z", json!(37.5));
    r1["data"]["beds"] = json!({"value": 10});
    let mut r2 = clinic_record("r2", "2021-03-20T10:00:00Z", json!(39.0));
    r2["data"]["beds"] = json!({"value": 12});
    store.upsert(&r1);
    store.upsert(&r2);

    let selector = StatSelector::default()
        .field("temp", Stat::Latest)
        .field("beds", Stat::Sum);
    let result = store.fetch("by_values_latest", "clinic", &selector);

    let e1 = &result["e1"];
    assert_eq!(e1["temp"], json!(39.0));
    assert_eq!(e1["beds"], json!(22.0));
}

#[test]
fn test_fetch_wildcard_overrides_field_selection() {
    let store = store();
    store.upsert(&clinic_record("r1", "2021-03-15T10:00:00Z", json!(37.5)));
    store.upsert(&clinic_record("r2", "2021-03-20T10:00:00Z", json!(39.0)));

    let selector = StatSelector::all(Stat::Count).field("temp", Stat::Sum);
    let result = store.fetch("by_values_latest", "clinic", &selector);
    assert_eq!(result["e1"]["temp"], json!(2));
}

#[test]
fn test_fetch_by_path_groups_on_hierarchy_prefixes() {
    let store = store();
    let mut other = clinic_record("r2", "2021-03-16T08:00:00Z", json!(10.0));
    other["entity"]["aggregation_paths"]["geo"] = json!(["country", "other-region"]);
    store.upsert(&clinic_record("r1", "2021-03-15T08:00:00Z", json!(5.0)));
    store.upsert(&other);

    let selector = StatSelector::all(Stat::Sum);
    let by_country = store.fetch_by_path("by_aggregation_path", "clinic", "geo", 1, &selector);
    assert_eq!(
        by_country[&vec!["country".to_string()]]["temp"],
        json!(15.0)
    );

    let by_region = store.fetch_by_path("by_aggregation_path", "clinic", "geo", 2, &selector);
    assert_eq!(by_region.len(), 2);
    assert_eq!(
        by_region[&vec!["country".to_string(), "region".to_string()]]["temp"],
        json!(5.0)
    );
}

// ============================================================================
// Projection catalog
// ============================================================================

#[test]
fn test_submission_status_counts() {
    let store = store();
    for (i, status) in [true, true, false].iter().enumerate() {
        store.upsert(&json!({
            "_id": format!("s{}", i),
            "document_type": "SubmissionLog",
            "form_code": "CL1",
            "status": status,
            "source": "254700000001",
            "channel": "sms"
        }));
    }
    // Survey responses land in the same tally.
    store.upsert(&json!({
        "_id": "sr1",
        "document_type": "SurveyResponse",
        "form_code": "CL1",
        "status": true
    }));

    let groups = store
        .grouped("submission_status", &key(vec!["CL1".into()]), 2)
        .unwrap();
    assert_eq!(groups.len(), 2);
    // false sorts before true in the key order.
    assert_eq!(groups[0].1.count, 1);
    assert_eq!(groups[1].1.count, 3);
}

#[test]
fn test_data_sender_lookup() {
    let store = store();
    store.upsert(&json!({
        "_id": "c1",
        "document_type": "Contact",
        "email": "cw@example.org",
        "mobile_number": "254700000001",
        "name": "Community Worker"
    }));

    let by_email = store.rows_in("data_senders", &key(vec!["cw@example.org".into()]));
    assert_eq!(by_email.len(), 1);
    assert_eq!(by_email[0].1, RowValue::Id("c1".to_string()));

    let by_mobile = store.rows_in("data_senders", &key(vec!["254700000001".into()]));
    assert_eq!(by_mobile.len(), 1);
}

#[test]
fn test_schema_drift_documents_index_identically() {
    // The same record expressed in the legacy field naming lands on the
    // same keys as the current naming.
    let store = store();
    let legacy = json!({
        "_id": "r1",
        "document_type": "DataRecord",
        "event_time": "2021-03-15T10:20:30Z",
        "entity_backing_field": {
            "_id": "e1",
            "short_code": "e1",
            "aggregation_paths": {
                "_type": ["clinic"],
                "geo": ["country", "region", "district"]
            }
        },
        "form_code": "CL1",
        "data": {"temp": {"value": 37.5}}
    });
    store.upsert(&legacy);

    let modern_store = store2_with(&clinic_record("r1", "2021-03-15T10:20:30Z", json!(37.5)));
    for view in ["by_values", "by_aggregation_path", "weekly_aggregate_stats"] {
        let legacy_rows = store.rows_in(view, &CompositeKey::new());
        let modern_rows = modern_store.rows_in(view, &CompositeKey::new());
        assert_eq!(legacy_rows, modern_rows, "view {} diverged", view);
    }
}

fn store2_with(record: &Value) -> InMemoryIndexStore {
    let s = store();
    s.upsert(record);
    s
}
