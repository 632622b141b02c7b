//! Tests for field mapping and metadata placement.

use super::*;
use serde_json::json;

fn created_at() -> Timestamp {
    Timestamp::from_rfc3339("2024-03-05T08:07:09Z").unwrap()
}

fn form(value: Value) -> FormData {
    value.as_object().cloned().unwrap_or_default()
}

fn mappings(pairs: &[(&str, &str)]) -> Vec<FieldMapping> {
    pairs
        .iter()
        .map(|(from, to)| FieldMapping::new(*from, *to))
        .collect()
}

fn flat_keys(output: &MappedOutput) -> Vec<String> {
    match output {
        MappedOutput::Flat(map) => map.keys().cloned().collect(),
        MappedOutput::FieldList(_) => panic!("expected flat output"),
    }
}

fn list_ids(output: &MappedOutput) -> Vec<String> {
    match output {
        MappedOutput::FieldList(fields) => fields.iter().map(|f| f.id.clone()).collect(),
        MappedOutput::Flat(_) => panic!("expected field list output"),
    }
}

#[test]
fn test_flat_output_follows_mapping_order_then_metadata() {
    let data = form(json!({"email": "a@b.c", "name": "Ann", "phone": "555"}));
    let rules = mappings(&[("phone", "contact_phone"), ("email", "contact_email"), ("name", "full_name")]);

    let output = FieldMapper::new().map(
        &data,
        &rules,
        "KEY-1",
        OutputShape::Flat,
        SourceTag::WebhookAutomation,
        created_at(),
    );

    assert_eq!(
        flat_keys(&output),
        vec!["contact_phone", "contact_email", "full_name", "uniqueKey", "createdAt", "source"]
    );
    assert_eq!(output.get("uniqueKey"), Some(&json!("KEY-1")));
    assert_eq!(output.get("createdAt"), Some(&json!("2024-03-05T08:07:09.000Z")));
    assert_eq!(output.get("source"), Some(&json!("webhook_automation")));
    assert_eq!(output.mapped_field_count(), 3);
}

#[test]
fn test_absent_null_and_blank_destination_are_skipped() {
    let data = form(json!({"email": "a@b.c", "fax": null}));
    let rules = mappings(&[
        ("email", "contact_email"),
        ("fax", "contact_fax"),
        ("missing", "contact_missing"),
        ("email", "   "),
    ]);

    let output = FieldMapper::new().map(
        &data,
        &rules,
        "KEY-1",
        OutputShape::Flat,
        SourceTag::WebhookAutomation,
        created_at(),
    );

    assert_eq!(output.mapped_field_count(), 1);
    assert_eq!(flat_keys(&output)[0], "contact_email");
    assert!(output.get("contact_fax").is_none());
    assert!(output.get("contact_missing").is_none());
}

#[test]
fn test_falsy_values_are_kept() {
    let data = form(json!({"note": "", "count": 0, "opt_in": false}));
    let rules = mappings(&[("note", "note"), ("count", "count"), ("opt_in", "opt_in")]);

    let output = FieldMapper::new().map(
        &data,
        &rules,
        "KEY-1",
        OutputShape::Flat,
        SourceTag::WebhookAutomation,
        created_at(),
    );

    assert_eq!(output.mapped_field_count(), 3);
    assert_eq!(output.get("note"), Some(&json!("")));
    assert_eq!(output.get("count"), Some(&json!(0)));
    assert_eq!(output.get("opt_in"), Some(&json!(false)));
}

#[test]
fn test_flat_metadata_wins_collisions_and_stays_last() {
    let data = form(json!({"ref": "from-form", "channel": "web", "email": "a@b.c"}));
    let rules = mappings(&[("ref", "uniqueKey"), ("channel", "source"), ("email", "email")]);

    let output = FieldMapper::new().map(
        &data,
        &rules,
        "KEY-9",
        OutputShape::Flat,
        SourceTag::FormSubmission,
        created_at(),
    );

    assert_eq!(flat_keys(&output), vec!["email", "uniqueKey", "createdAt", "source"]);
    assert_eq!(output.get("uniqueKey"), Some(&json!("KEY-9")));
    assert_eq!(output.get("source"), Some(&json!("form_submission")));
}

#[test]
fn test_field_list_output_keeps_duplicates() {
    let data = form(json!({"ref": "from-form", "email": "a@b.c"}));
    let rules = mappings(&[("email", "email"), ("ref", "unique_key")]);

    let output = FieldMapper::new().map(
        &data,
        &rules,
        "KEY-2",
        OutputShape::FieldList,
        SourceTag::WebhookAutomation,
        created_at(),
    );

    assert_eq!(
        list_ids(&output),
        vec!["email", "unique_key", "unique_key", "created_at", "source"]
    );
    assert_eq!(output.get("unique_key"), Some(&json!("KEY-2")));
    assert_eq!(output.shape(), OutputShape::FieldList);
}

#[test]
fn test_field_list_serializes_as_id_value_array() {
    let data = form(json!({"email": "a@b.c"}));
    let rules = mappings(&[("email", "email")]);

    let output = FieldMapper::new().map(
        &data,
        &rules,
        "KEY-3",
        OutputShape::FieldList,
        SourceTag::WebhookAutomation,
        created_at(),
    );

    assert_eq!(
        serde_json::to_value(&output).unwrap(),
        json!([
            {"id": "email", "value": "a@b.c"},
            {"id": "unique_key", "value": "KEY-3"},
            {"id": "created_at", "value": "2024-03-05T08:07:09.000Z"},
            {"id": "source", "value": "webhook_automation"}
        ])
    );
    assert_eq!(output.to_json(), serde_json::to_value(&output).unwrap());
}

#[test]
fn test_no_mappings_yields_metadata_only() {
    let output = FieldMapper::new().map(
        &FormData::new(),
        &[],
        "KEY-4",
        OutputShape::Flat,
        SourceTag::WebhookAutomation,
        created_at(),
    );

    assert_eq!(output.mapped_field_count(), 0);
    assert_eq!(flat_keys(&output), vec!["uniqueKey", "createdAt", "source"]);
}
