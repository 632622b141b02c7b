//! Common test utilities for form-relay-api integration tests
//!
//! This module provides:
//! - A test context wiring the real CRM client against a wiremock server
//! - Request helpers for driving the router in-process
//! - Shared configuration and payload builders

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
};
use form_relay_api::{create_router, AppState, ServiceConfig, ServiceMetrics};
use form_relay_core::{
    ActivityLog, ConfigurationStore, CrmClient, InMemoryActivityLog, InMemoryConfigurationStore,
    KeyGenerator,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::MockServer;

/// Application state wired like the service binary, with the CRM mocked
#[allow(dead_code)]
pub struct TestContext {
    pub state: AppState,
    pub crm: MockServer,
}

#[allow(dead_code)]
impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(ServiceConfig::default()).await
    }

    pub async fn with_config(mut config: ServiceConfig) -> Self {
        let crm = MockServer::start().await;
        config.crm.base_url = crm.uri();

        let activity_log: Arc<dyn ActivityLog> = Arc::new(InMemoryActivityLog::with_capacity(
            config.dispatch.log_capacity,
        ));
        let store: Arc<dyn ConfigurationStore> = Arc::new(InMemoryConfigurationStore::new());
        let crm_client = Arc::new(
            CrmClient::new(config.crm.client_config(), activity_log.clone())
                .expect("CRM client should build"),
        );
        let metrics = ServiceMetrics::new().expect("metrics should register");

        let state = AppState::new(
            config,
            store,
            activity_log,
            crm_client.clone(),
            crm_client,
            KeyGenerator::system(),
            metrics,
        );

        Self { state, crm }
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        self.send_request(builder.body(body).unwrap()).await
    }

    pub async fn send_request(&self, request: Request<Body>) -> Response {
        create_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap()
    }

    /// Store a configuration and return the response body
    pub async fn configure(&self, configuration: Value) -> Value {
        let response = self
            .send(Method::POST, "/api/configure", Some(configuration))
            .await;
        assert!(
            response.status().is_success(),
            "configure failed with {}",
            response.status()
        );
        json_body(response).await
    }

    pub async fn webhook(&self, payload: Value) -> Response {
        self.send(Method::POST, "/webhook/form-submission", Some(payload))
            .await
    }

    /// Bodies of every request the mocked CRM received
    pub async fn crm_bodies(&self) -> Vec<Value> {
        self.crm
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap_or(Value::Null))
            .collect()
    }
}

#[allow(dead_code)]
pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Lead configuration mapping email and names, keyed by `LEAD-NNN`
#[allow(dead_code)]
pub fn lead_configuration(location_id: &str, form_id: &str) -> Value {
    json!({
        "locationId": location_id,
        "formId": form_id,
        "apiKey": "crm-secret",
        "objectType": "custom_objects.leads",
        "fieldMappings": [
            {"formField": "email", "objectField": "email_address"},
            {"formField": "firstName", "objectField": "first_name"},
            {"formField": "lastName", "objectField": "last_name"}
        ],
        "keyType": "sequential",
        "keyConfig": {"prefix": "LEAD"}
    })
}

/// Payload nesting fields under `data` and identifiers under `extras`
#[allow(dead_code)]
pub fn nested_payload(location_id: &str, form_id: &str, data: Value) -> Value {
    json!({
        "data": data,
        "extras": {"locationId": location_id, "formId": form_id}
    })
}

#[allow(dead_code)]
pub fn jane_doe() -> Value {
    json!({
        "email": "jane@example.com",
        "firstName": "Jane",
        "lastName": "Doe",
        "phone": "555-0199"
    })
}
