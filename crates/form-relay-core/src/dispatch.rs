//! # Webhook Dispatch
//!
//! Orchestrates one inbound form submission:
//!
//! 1. Resolve the form data and the location/form identifiers
//! 2. Look up the configuration; a missing one is a terminal,
//!    non-error outcome so the CRM does not redeliver
//! 3. Generate the unique key
//! 4. Map the fields
//! 5. Submit to the CRM and report the remote id, or the failure
//!
//! Every terminal state appends an activity-log entry. Nothing is retried.

use crate::activity_log::ActivityLog;
use crate::configuration::{ConfigurationStore, FormConfiguration, StoreError};
use crate::field_mapping::{FieldMapper, MappedOutput};
use crate::key_generation::KeyGenerator;
use crate::submission::{ObjectSubmitter, RemoteObjectId, SubmissionError};
use crate::{
    ConfigKey, ConfigKeyArity, DispatchId, FormData, FormId, LocationId, Timestamp,
    ValidationError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Header carrying the location id when the payload does not
pub const LOCATION_HEADER: &str = "x-location-id";

/// Header carrying the form id when the payload does not
pub const FORM_HEADER: &str = "x-form-id";

/// Fixed record used by test submissions
pub fn sample_form_data() -> FormData {
    let sample = json!({
        "firstName": "John",
        "lastName": "Doe",
        "email": "john.doe@example.com",
        "phone": "555-0123",
        "company": "Test Company",
        "message": "This is a test submission"
    });
    match sample {
        Value::Object(map) => map,
        _ => FormData::new(),
    }
}

/// Inbound submission with its identifiers resolved
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmission {
    pub location_id: Option<String>,
    pub form_id: Option<String>,
    pub form_data: FormData,
}

impl FormSubmission {
    /// Extract form data and identifiers from a webhook payload
    ///
    /// Form data comes from `data`, then `submissionData`, then the whole
    /// payload. Identifiers come from `extras`, then the top level, then the
    /// `x-location-id` / `x-form-id` headers. Header names must be
    /// lowercase.
    pub fn from_payload(
        payload: &Value,
        headers: &HashMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let root = payload
            .as_object()
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "body".to_string(),
                message: "webhook payload must be a JSON object".to_string(),
            })?;

        let form_data = ["data", "submissionData"]
            .iter()
            .find_map(|name| root.get(*name).and_then(Value::as_object))
            .unwrap_or(root)
            .clone();

        let extras = root.get("extras").and_then(Value::as_object);
        let resolve = |name: &str, header: &str| {
            extras
                .and_then(|extras| identifier(extras.get(name)))
                .or_else(|| identifier(root.get(name)))
                .or_else(|| {
                    headers
                        .get(header)
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty())
                })
        };

        Ok(Self {
            location_id: resolve("locationId", LOCATION_HEADER),
            form_id: resolve("formId", FORM_HEADER),
            form_data,
        })
    }
}

fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Result of a completed dispatch
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub object_id: RemoteObjectId,
    pub unique_key: String,
    pub mapped: MappedOutput,
}

/// Terminal, non-error dispatch states
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// No configuration for the submission; acknowledged without retry
    NotConfigured {
        config_key: Option<ConfigKey>,
        message: String,
    },

    Completed(DispatchReceipt),
}

/// Dispatch failures
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to create custom object: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Internal error: {0}")]
    Internal(#[from] StoreError),
}

/// Runs submissions through lookup, key generation, mapping and submission
#[derive(Clone)]
pub struct WebhookDispatcher {
    store: Arc<dyn ConfigurationStore>,
    activity_log: Arc<dyn ActivityLog>,
    submitter: Arc<dyn ObjectSubmitter>,
    key_generator: KeyGenerator,
    mapper: FieldMapper,
    arity: ConfigKeyArity,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn ConfigurationStore>,
        activity_log: Arc<dyn ActivityLog>,
        submitter: Arc<dyn ObjectSubmitter>,
        key_generator: KeyGenerator,
        arity: ConfigKeyArity,
    ) -> Self {
        Self {
            store,
            activity_log,
            submitter,
            key_generator,
            mapper: FieldMapper::new(),
            arity,
        }
    }

    pub fn arity(&self) -> ConfigKeyArity {
        self.arity
    }

    /// Process one webhook submission
    #[instrument(
        skip(self, submission),
        fields(
            dispatch_id = %DispatchId::new(),
            location_id = ?submission.location_id,
            form_id = ?submission.form_id,
        )
    )]
    pub async fn dispatch(
        &self,
        submission: FormSubmission,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.activity_log.info(&format!(
            "Received form submission for location {} form {}",
            submission.location_id.as_deref().unwrap_or("unknown"),
            submission.form_id.as_deref().unwrap_or("unknown"),
        ));

        let key = match self.resolve_key(&submission) {
            Some(key) => key,
            None => {
                let message = "Submission is missing its location or form identifier";
                warn!("{}", message);
                self.activity_log.warning(message);
                return Ok(DispatchOutcome::NotConfigured {
                    config_key: None,
                    message: message.to_string(),
                });
            }
        };

        let configuration = match self.store.get(&key).await {
            Ok(Some(configuration)) => configuration,
            Ok(None) => {
                self.activity_log
                    .warning(&format!("No configuration found for {}", key));
                return Ok(DispatchOutcome::NotConfigured {
                    config_key: Some(key),
                    message: "No configuration found for this form".to_string(),
                });
            }
            Err(e) => {
                self.activity_log.error(&format!("Webhook error: {}", e));
                return Err(e.into());
            }
        };

        self.run(&configuration, &submission.form_data)
            .await
            .map(DispatchOutcome::Completed)
    }

    /// Run the pipeline against the fixed sample record
    ///
    /// Without a form id, the location's oldest configuration is used.
    #[instrument(skip(self), fields(dispatch_id = %DispatchId::new()))]
    pub async fn dispatch_test(
        &self,
        location_id: LocationId,
        form_id: Option<FormId>,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.activity_log
            .info(&format!("Test submission requested for location {}", location_id));

        let lookup = match (self.arity, form_id) {
            (ConfigKeyArity::LocationAndForm, None) => {
                self.store.find_by_location(&location_id).await
            }
            (arity, form_id) => match ConfigKey::new(arity, location_id.clone(), form_id) {
                Ok(key) => self.store.get(&key).await,
                Err(_) => Ok(None),
            },
        };

        let configuration = match lookup {
            Ok(Some(configuration)) => configuration,
            Ok(None) => {
                self.activity_log.warning(&format!(
                    "No configuration found for test submission on location {}",
                    location_id
                ));
                return Ok(DispatchOutcome::NotConfigured {
                    config_key: None,
                    message: "No configuration found for this location".to_string(),
                });
            }
            Err(e) => {
                self.activity_log.error(&format!("Test error: {}", e));
                return Err(e.into());
            }
        };

        self.run(&configuration, &sample_form_data())
            .await
            .map(DispatchOutcome::Completed)
    }

    fn resolve_key(&self, submission: &FormSubmission) -> Option<ConfigKey> {
        let location_id = LocationId::new(submission.location_id.clone()?).ok()?;
        let form_id = submission
            .form_id
            .clone()
            .and_then(|form| FormId::new(form).ok());
        ConfigKey::new(self.arity, location_id, form_id).ok()
    }

    async fn run(
        &self,
        configuration: &FormConfiguration,
        form_data: &FormData,
    ) -> Result<DispatchReceipt, DispatchError> {
        let now = self.key_generator.clock().now();
        let unique_key = self.key_generator.generate(
            &configuration.key.to_string(),
            form_data,
            &configuration.key_type,
            &configuration.key_config,
        );

        let mapped = self.mapper.map(
            form_data,
            &configuration.field_mappings,
            &unique_key,
            configuration.output_shape,
            configuration.source_tag,
            Timestamp::from_datetime(now),
        );

        info!(
            config_key = %configuration.key,
            unique_key = %unique_key,
            key_type = %configuration.key_type,
            mapped_fields = mapped.mapped_field_count(),
            "Submission mapped"
        );

        match self.submitter.submit(&mapped, configuration).await {
            Ok(object_id) => {
                self.activity_log.success(&format!(
                    "Custom object {} created with unique key {}",
                    object_id, unique_key
                ));
                Ok(DispatchReceipt {
                    object_id,
                    unique_key,
                    mapped,
                })
            }
            Err(e) => {
                let error = DispatchError::from(e);
                self.activity_log.error(&error.to_string());
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
