// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//! Dynamic typing through the full ingest and replay path.

mod common;

use common::Harness;
use serde_json::json;
use tidemark_core::{IndexError, ReplayOutcome};
use tidemark_mapping::{
    DynamicMode, DynamicTemplate, FieldType, MappingError, Mappings, MatchMappingType,
    NumericKind, Property, TemplateRule,
};
use tidemark_wal::WalLog;

#[tokio::test]
async fn strict_index_rejects_mistyped_field() {
    let h = Harness::memory();
    let mappings = Mappings::new(DynamicMode::Strict)
        .with_property("age", Property::typed(FieldType::Numeric(NumericKind::Integer)));
    h.create("people", 1, mappings.clone()).await;

    let err = h
        .ingestor
        .ingest("people", vec![json!({"age": "not a number"})])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IndexError::Mapping(MappingError::InvalidField { ref field, .. }) if field == "age"
    ));

    let log = h.registry.get("people/0").unwrap();
    assert_eq!(log.last_index().unwrap(), 0);
    assert_eq!(h.catalog.get_index("people").unwrap().mappings(), mappings);
    assert!(h.writers.segment_keys().is_empty());
}

#[tokio::test]
async fn strict_index_rejects_mistyped_record_on_replay() {
    let h = Harness::memory();
    let mappings = Mappings::new(DynamicMode::Strict)
        .with_property("age", Property::typed(FieldType::Numeric(NumericKind::Integer)));
    h.create("people", 1, mappings.clone()).await;

    h.registry
        .get("people/0")
        .unwrap()
        .write(br#"{"_id":"p1","age":"not a number"}"#)
        .unwrap();

    let err = h.consumer.consume_shard("people/0").await.unwrap_err();
    assert!(matches!(err, IndexError::Mapping(MappingError::InvalidField { .. })));
    assert_eq!(h.catalog.get_index("people").unwrap().mappings(), mappings);
    assert!(h.writers.segment_keys().is_empty());
}

#[tokio::test]
async fn strict_index_rejects_unknown_field() {
    let h = Harness::memory();
    let mappings = Mappings::new(DynamicMode::Strict)
        .with_property("age", Property::typed(FieldType::Numeric(NumericKind::Integer)));
    h.create("people", 1, mappings).await;

    let err = h
        .ingestor
        .ingest("people", vec![json!({"age": 3, "nickname": "x"})])
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::Mapping(_)));
}

#[tokio::test]
async fn dynamic_index_promotes_double() {
    let h = Harness::memory();
    h.create("scores", 1, Mappings::from_json(json!({"dynamic": "true"})).unwrap())
        .await;

    h.ingestor
        .ingest("scores", vec![json!({"score": 3.14})])
        .await
        .unwrap();
    // Promotion happens on replay, not on ingest.
    let index = h.catalog.get_index("scores").unwrap();
    assert!(index.mappings().properties.get("score").is_none());

    h.consumer.tick().await;
    let mappings = index.mappings();
    let score = mappings.properties.get("score").unwrap();
    assert_eq!(score.field_type, Some(FieldType::Numeric(NumericKind::Double)));
    assert_eq!(score.dynamic, Some(DynamicMode::Dynamic));
}

#[tokio::test]
async fn override_only_field_is_typed_on_replay() {
    let h = Harness::memory();
    let mappings = Mappings::new(DynamicMode::Strict)
        .with_property("labels", Property::default().with_dynamic(DynamicMode::Dynamic));
    h.create("tags", 1, mappings).await;

    h.ingestor
        .ingest("tags", vec![json!({"_id": "t1", "labels": 5})])
        .await
        .unwrap();
    h.consumer.tick().await;

    let index = h.catalog.get_index("tags").unwrap();
    let labels = index.mappings().properties["labels"].clone();
    assert_eq!(labels.field_type, Some(FieldType::Numeric(NumericKind::Long)));
    assert_eq!(labels.dynamic, Some(DynamicMode::Dynamic));

    let err = h
        .ingestor
        .ingest("tags", vec![json!({"labels": "text"})])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IndexError::Mapping(MappingError::InvalidField { ref field, .. }) if field == "labels"
    ));
}

#[tokio::test]
async fn template_maps_status_fields_to_keyword() {
    let h = Harness::memory();
    let template = DynamicTemplate::new(
        "status_as_keyword",
        TemplateRule {
            match_name: Some("^status_*".to_string()),
            match_mapping_type: MatchMappingType::String,
            mapping: Property::typed(FieldType::Keyword),
            ..Default::default()
        },
    )
    .unwrap();
    let mappings = Mappings::new(DynamicMode::Dynamic).with_template(template);
    h.create("http", 1, mappings).await;

    h.ingestor
        .ingest("http", vec![json!({"status_code": "OK", "path": "/"})])
        .await
        .unwrap();
    h.consumer.tick().await;

    let mappings = h.catalog.get_index("http").unwrap().mappings();
    assert_eq!(
        mappings.properties["status_code"].field_type,
        Some(FieldType::Keyword)
    );
    assert_eq!(mappings.properties["path"].field_type, Some(FieldType::Text));
}

#[tokio::test]
async fn ignore_mode_stores_but_does_not_promote() {
    let h = Harness::memory();
    h.create("loose", 1, Mappings::from_json(json!({"dynamic": false})).unwrap())
        .await;

    h.ingestor
        .ingest("loose", vec![json!({"_id": "a", "extra": 1})])
        .await
        .unwrap();
    h.consumer.tick().await;

    assert!(h.catalog.get_index("loose").unwrap().mappings().properties.is_empty());
    assert_eq!(h.writers.index_documents("loose")["a"]["extra"], json!(1));
}

#[tokio::test]
async fn repeated_promotion_is_idempotent() {
    let h = Harness::memory();
    h.create_dynamic("metrics", 1).await;

    h.ingestor
        .ingest("metrics", vec![json!({"cpu": 0.5})])
        .await
        .unwrap();
    h.consumer.tick().await;
    let first = h.catalog.get_index("metrics").unwrap().mappings();

    h.ingestor
        .ingest("metrics", vec![json!({"cpu": 0.75})])
        .await
        .unwrap();
    let outcome = h.consumer.consume_shard("metrics/0").await.unwrap();
    assert_eq!(outcome, ReplayOutcome::Replayed { from: 2, to: 2 });
    assert_eq!(h.catalog.get_index("metrics").unwrap().mappings(), first);
}

#[tokio::test]
async fn conflicting_value_for_promoted_field_is_rejected() {
    let h = Harness::memory();
    h.create_dynamic("metrics", 1).await;

    h.ingestor
        .ingest("metrics", vec![json!({"count": 3})])
        .await
        .unwrap();
    h.consumer.tick().await;

    let err = h
        .ingestor
        .ingest("metrics", vec![json!({"count": "many"})])
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::Mapping(MappingError::InvalidField { .. })));
}
