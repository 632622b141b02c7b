//! Integration tests for the webhook path, from payload to CRM record

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{jane_doe, json_body, lead_configuration, nested_payload, TestContext};
use form_relay_api::ServiceConfig;
use form_relay_core::{ConfigKeyArity, LogLevel};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, ResponseTemplate,
};

/// Verify a configured form produces a flat custom object with mapped fields
#[tokio::test]
async fn test_configured_form_creates_flat_object() {
    // Arrange
    let ctx = TestContext::new().await;
    ctx.configure(lead_configuration("loc1", "form1")).await;

    Mock::given(method("POST"))
        .and(path("/locations/loc1/customObjects"))
        .and(header("authorization", "Bearer crm-secret"))
        .and(header("version", "2021-07-28"))
        .and(body_partial_json(json!({
            "objectType": "custom_objects.leads",
            "data": {
                "email_address": "jane@example.com",
                "first_name": "Jane",
                "last_name": "Doe",
                "uniqueKey": "LEAD-001",
                "source": "webhook_automation"
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "rec_1"})))
        .expect(1)
        .mount(&ctx.crm)
        .await;

    // Act
    let response = ctx
        .webhook(nested_payload("loc1", "form1", jane_doe()))
        .await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["objectId"], "rec_1");
    assert_eq!(body["uniqueKey"], "LEAD-001");

    let sent = ctx.crm_bodies().await;
    let data = sent[0]["data"].as_object().unwrap();
    let keys: Vec<&str> = data.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "email_address",
            "first_name",
            "last_name",
            "uniqueKey",
            "createdAt",
            "source"
        ]
    );
    assert!(data.get("phone").is_none());
}

/// Verify the field-list variant posts to the record endpoint
#[tokio::test]
async fn test_field_list_shape_uses_record_endpoint() {
    // Arrange
    let ctx = TestContext::new().await;
    let mut configuration = lead_configuration("loc1", "form1");
    configuration["outputShape"] = json!("fieldList");
    configuration["sourceTag"] = json!("form_submission");
    ctx.configure(configuration).await;

    Mock::given(method("POST"))
        .and(path("/locations/loc1/customObjects/record"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"record": {"id": "rec_9"}})),
        )
        .expect(1)
        .mount(&ctx.crm)
        .await;

    // Act
    let response = ctx
        .webhook(nested_payload("loc1", "form1", jane_doe()))
        .await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["objectId"], "rec_9");

    let sent = ctx.crm_bodies().await;
    assert_eq!(sent[0]["objectId"], "custom_objects.leads");
    let fields = sent[0]["fields"].as_array().unwrap();
    assert_eq!(fields[0], json!({"id": "email_address", "value": "jane@example.com"}));
    assert_eq!(
        fields.last().unwrap(),
        &json!({"id": "source", "value": "form_submission"})
    );
}

/// Verify flat payloads with `submissionData` are accepted
#[tokio::test]
async fn test_flat_payload_with_submission_data() {
    // Arrange
    let ctx = TestContext::new().await;
    ctx.configure(lead_configuration("loc1", "form1")).await;

    Mock::given(method("POST"))
        .and(path("/locations/loc1/customObjects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rec_2"})))
        .mount(&ctx.crm)
        .await;

    let payload = json!({
        "locationId": "loc1",
        "formId": "form1",
        "contactId": "contact_7",
        "type": "form_submission",
        "submissionData": {"email": "flat@example.com"}
    });

    // Act
    let response = ctx.webhook(payload).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let sent = ctx.crm_bodies().await;
    assert_eq!(sent[0]["data"]["email_address"], "flat@example.com");
    assert!(sent[0]["data"].get("first_name").is_none());
}

/// Verify identifiers can come from request headers
#[tokio::test]
async fn test_identifiers_from_headers() {
    // Arrange
    let ctx = TestContext::new().await;
    ctx.configure(lead_configuration("loc1", "form1")).await;

    Mock::given(method("POST"))
        .and(path("/locations/loc1/customObjects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rec_3"})))
        .expect(1)
        .mount(&ctx.crm)
        .await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook/form-submission")
        .header("content-type", "application/json")
        .header("x-location-id", "loc1")
        .header("x-form-id", "form1")
        .body(Body::from(jane_doe().to_string()))
        .unwrap();

    // Act
    let response = ctx.send_request(request).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["objectId"], "rec_3");
}

/// Verify unconfigured forms are acknowledged without calling the CRM
#[tokio::test]
async fn test_unconfigured_form_is_acknowledged() {
    // Arrange
    let ctx = TestContext::new().await;
    ctx.configure(lead_configuration("loc1", "form1")).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ctx.crm)
        .await;

    // Act
    let response = ctx
        .webhook(nested_payload("loc1", "other-form", jane_doe()))
        .await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "No configuration found for this form");
    assert!(body.get("objectId").is_none());

    let last = ctx.state.activity_log.recent(1);
    assert_eq!(last[0].level, LogLevel::Warning);
}

/// Verify CRM rejections surface as 500 with the CRM's message
#[tokio::test]
async fn test_crm_rejection_is_reported() {
    // Arrange
    let ctx = TestContext::new().await;
    ctx.configure(lead_configuration("loc1", "form1")).await;

    Mock::given(method("POST"))
        .and(path("/locations/loc1/customObjects"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({"message": ["email_address is invalid"]})),
        )
        .mount(&ctx.crm)
        .await;

    // Act
    let response = ctx
        .webhook(nested_payload("loc1", "form1", jane_doe()))
        .await;

    // Assert
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Failed to create custom object: email_address is invalid"
    );

    let counts = ctx.state.activity_log.counts();
    assert_eq!(counts.error, 1);
    assert_eq!(counts.success, 0);
}

/// Verify a slow CRM is cut off by the client timeout
#[tokio::test]
async fn test_crm_timeout_is_reported() {
    // Arrange
    let mut config = ServiceConfig::default();
    config.crm.timeout_seconds = 1;
    let ctx = TestContext::with_config(config).await;
    ctx.configure(lead_configuration("loc1", "form1")).await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "late"}))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&ctx.crm)
        .await;

    // Act
    let response = ctx
        .webhook(nested_payload("loc1", "form1", jane_doe()))
        .await;

    // Assert
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["error"],
        "Failed to create custom object: Request timed out after 1 seconds"
    );
}

/// Verify location-only keying ignores the form id
#[tokio::test]
async fn test_location_only_keying() {
    // Arrange
    let mut config = ServiceConfig::default();
    config.dispatch.config_key_arity = ConfigKeyArity::LocationOnly;
    let ctx = TestContext::with_config(config).await;

    let mut configuration = lead_configuration("loc1", "ignored");
    configuration
        .as_object_mut()
        .unwrap()
        .remove("formId");
    let configured = ctx.configure(configuration).await;
    assert_eq!(configured["configKey"], "loc1");

    Mock::given(method("POST"))
        .and(path("/locations/loc1/customObjects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rec_4"})))
        .expect(2)
        .mount(&ctx.crm)
        .await;

    // Act
    let first = ctx
        .webhook(nested_payload("loc1", "form-a", jane_doe()))
        .await;
    let second = ctx
        .webhook(nested_payload("loc1", "form-b", jane_doe()))
        .await;

    // Assert
    assert_eq!(json_body(first).await["uniqueKey"], "LEAD-001");
    assert_eq!(json_body(second).await["uniqueKey"], "LEAD-002");
}

/// Verify concurrent webhooks each receive a distinct sequential key
#[tokio::test]
async fn test_concurrent_webhooks_get_distinct_keys() {
    // Arrange
    let ctx = std::sync::Arc::new(TestContext::new().await);
    ctx.configure(lead_configuration("loc1", "form1")).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rec"})))
        .mount(&ctx.crm)
        .await;

    // Act
    let mut handles = Vec::new();
    for _ in 0..10 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let response = ctx
                .webhook(nested_payload("loc1", "form1", jane_doe()))
                .await;
            json_body(response).await["uniqueKey"]
                .as_str()
                .unwrap()
                .to_string()
        }));
    }
    let mut keys = Vec::new();
    for handle in handles {
        keys.push(handle.await.unwrap());
    }

    // Assert
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 10);
    assert_eq!(keys[0], "LEAD-001");
    assert_eq!(keys[9], "LEAD-010");
}

/// Verify a blank key type generates a standard UUID
#[tokio::test]
async fn test_blank_key_type_generates_uuid() {
    // Arrange
    let ctx = TestContext::new().await;
    let mut configuration = lead_configuration("loc1", "form1");
    configuration["keyType"] = json!("");
    ctx.configure(configuration).await;

    Mock::given(method("POST"))
        .and(path("/locations/loc1/customObjects"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "rec_1"})))
        .mount(&ctx.crm)
        .await;

    // Act
    let response = ctx
        .webhook(nested_payload("loc1", "form1", jane_doe()))
        .await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let unique_key = body["uniqueKey"].as_str().unwrap();
    assert_eq!(unique_key.len(), 36);
    assert_eq!(unique_key.chars().nth(14), Some('4'));
    assert!(!unique_key.starts_with("key_"));
}
