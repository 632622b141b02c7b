//! # CRM Custom-Object Client
//!
//! HTTP implementation of [`ObjectSubmitter`] for the CRM's custom-object
//! API, plus the read-only form and object listings used to populate
//! configuration UIs.
//!
//! Every call carries `Authorization: Bearer {apiKey}`, the fixed `Version`
//! header and a bounded timeout. Failures never produce a record id; they
//! surface the CRM's own error text when the response carries one.

use crate::activity_log::ActivityLog;
use crate::configuration::FormConfiguration;
use crate::field_mapping::MappedOutput;
use crate::submission::{ObjectSubmitter, RemoteObjectId, SubmissionError};
use crate::{ApiKey, LocationId};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Default CRM API host
pub const DEFAULT_CRM_BASE_URL: &str = "https://services.leadconnectorhq.com";

/// Value of the `Version` header expected by the CRM
pub const DEFAULT_API_VERSION: &str = "2021-07-28";

/// Configuration for the CRM client
#[derive(Debug, Clone)]
pub struct CrmClientConfig {
    pub base_url: String,
    pub api_version: String,
    /// Applies to the whole request, body included
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for CrmClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CRM_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(10),
            user_agent: format!("form-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CrmClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }
}

/// CRM API client
#[derive(Clone)]
pub struct CrmClient {
    http_client: reqwest::Client,
    config: CrmClientConfig,
    activity_log: Arc<dyn ActivityLog>,
}

impl CrmClient {
    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::Transport` if the HTTP client cannot be
    /// created.
    pub fn new(
        config: CrmClientConfig,
        activity_log: Arc<dyn ActivityLog>,
    ) -> Result<Self, SubmissionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| SubmissionError::Transport {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            config,
            activity_log,
        })
    }

    pub fn config(&self) -> &CrmClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder, api_key: &ApiKey) -> RequestBuilder {
        request
            .bearer_auth(api_key.expose_secret())
            .header("Version", &self.config.api_version)
            .header("Accept", "application/json")
    }

    /// Forms defined for a location; returns the CRM document unchanged
    #[instrument(skip(self, api_key), fields(location_id = %location_id))]
    pub async fn list_forms(
        &self,
        location_id: &LocationId,
        api_key: &ApiKey,
    ) -> Result<Value, SubmissionError> {
        let request = self
            .http_client
            .get(self.url("/forms/"))
            .query(&[("locationId", location_id.as_str())]);
        self.send(self.authorized(request, api_key)).await
    }

    /// Custom-object schemas defined for a location; returns the CRM document
    /// unchanged
    #[instrument(skip(self, api_key), fields(location_id = %location_id))]
    pub async fn list_objects(
        &self,
        location_id: &LocationId,
        api_key: &ApiKey,
    ) -> Result<Value, SubmissionError> {
        let request = self
            .http_client
            .get(self.url("/objects/"))
            .query(&[("locationId", location_id.as_str())]);
        self.send(self.authorized(request, api_key)).await
    }

    /// Send a request and decode a JSON success body
    async fn send(&self, request: RequestBuilder) -> Result<Value, SubmissionError> {
        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;
        let body = serde_json::from_str::<Value>(&text).ok();

        if !status.is_success() {
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                message: extract_error_message(body.as_ref(), status),
            });
        }

        body.ok_or_else(|| SubmissionError::MalformedResponse {
            message: "response body is not JSON".to_string(),
        })
    }

    fn classify(&self, error: reqwest::Error) -> SubmissionError {
        if error.is_timeout() {
            let millis = self.config.timeout.as_millis() as u64;
            SubmissionError::Timeout {
                seconds: millis.div_ceil(1000),
            }
        } else {
            SubmissionError::Transport {
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl ObjectSubmitter for CrmClient {
    #[instrument(
        skip(self, output, configuration),
        fields(
            config_key = %configuration.key,
            object_type = %configuration.object_type,
        )
    )]
    async fn submit(
        &self,
        output: &MappedOutput,
        configuration: &FormConfiguration,
    ) -> Result<RemoteObjectId, SubmissionError> {
        let location = configuration.location_id().as_str();
        let (url, body) = match output {
            MappedOutput::Flat(data) => (
                self.url(&format!("/locations/{}/customObjects", location)),
                json!({
                    "objectType": configuration.object_type,
                    "data": data,
                }),
            ),
            MappedOutput::FieldList(fields) => (
                self.url(&format!("/locations/{}/customObjects/record", location)),
                json!({
                    "objectId": configuration.object_type,
                    "fields": fields,
                }),
            ),
        };

        self.activity_log.info(&format!(
            "Creating custom object of type {}",
            configuration.object_type
        ));
        debug!(url = %url, fields = output.mapped_field_count(), "Submitting custom object");

        let started = Instant::now();
        let request = self.authorized(
            self.http_client.post(&url).json(&body),
            &configuration.api_key,
        );

        let result = self.send(request).await.and_then(|response| {
            extract_object_id(&response).ok_or_else(|| SubmissionError::MalformedResponse {
                message: "response carries no record id".to_string(),
            })
        });

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(object_id) => {
                info!(object_id = %object_id, elapsed_ms, "Custom object created");
                self.activity_log
                    .info(&format!("Custom object created with id {}", object_id));
            }
            Err(e) => {
                error!(
                    error = %e,
                    status = ?e.status(),
                    elapsed_ms,
                    "Custom object creation failed"
                );
                self.activity_log
                    .warning(&format!("CRM rejected custom object: {}", e));
            }
        }

        result
    }
}

impl std::fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Record id from `id`, `record.id` or `customObject.id`
fn extract_object_id(body: &Value) -> Option<RemoteObjectId> {
    ["/id", "/record/id", "/customObject/id"]
        .iter()
        .filter_map(|pointer| body.pointer(pointer))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(RemoteObjectId::new(s.clone())),
            Value::Number(n) => Some(RemoteObjectId::new(n.to_string())),
            _ => None,
        })
}

/// Error text from a CRM error body
fn extract_error_message(body: Option<&Value>, status: StatusCode) -> String {
    let from_body = body.and_then(|body| match body.get("message") {
        Some(Value::String(message)) if !message.is_empty() => Some(message.clone()),
        Some(Value::Array(messages)) => {
            let parts: Vec<&str> = messages.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => body
            .get("error")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(str::to_string),
    });

    from_body.unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

#[cfg(test)]
#[path = "crm_client_tests.rs"]
mod tests;
