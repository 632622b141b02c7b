//! # Form Configuration
//!
//! A configuration tells the dispatcher, for one CRM location (and usually
//! one form), which custom object to create, how submitted fields map onto
//! object fields, and how the unique record key is derived.
//!
//! Configurations are created or replaced whole through
//! [`ConfigurationRequest`] and kept in a [`ConfigurationStore`].

use crate::key_generation::{KeyConfig, KeyType};
use crate::{ApiKey, ConfigKey, ConfigKeyArity, FormId, LocationId, Timestamp, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One submitted-field to object-field rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    #[serde(default, alias = "form_field")]
    pub form_field: String,

    #[serde(default, alias = "object_field")]
    pub object_field: String,
}

impl FieldMapping {
    pub fn new(form_field: impl Into<String>, object_field: impl Into<String>) -> Self {
        Self {
            form_field: form_field.into(),
            object_field: object_field.into(),
        }
    }
}

/// Target schema variant of the CRM custom-object API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputShape {
    /// `{objectType, data: {field: value}}`
    #[default]
    Flat,

    /// `{objectId, fields: [{id, value}]}`
    #[serde(alias = "field_list")]
    FieldList,
}

/// Literal tag written into the `source` metadata field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    #[default]
    WebhookAutomation,
    FormSubmission,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebhookAutomation => "webhook_automation",
            Self::FormSubmission => "form_submission",
        }
    }
}

/// Stored configuration for one location/form
#[derive(Debug, Clone)]
pub struct FormConfiguration {
    pub key: ConfigKey,
    pub form_id: Option<FormId>,
    pub api_key: ApiKey,
    pub object_type: String,
    pub field_mappings: Vec<FieldMapping>,
    pub key_type: KeyType,
    pub key_config: KeyConfig,
    pub output_shape: OutputShape,
    pub source_tag: SourceTag,
    pub created_at: Timestamp,
    pub last_updated: Timestamp,
}

impl FormConfiguration {
    pub fn location_id(&self) -> &LocationId {
        self.key.location_id()
    }

    /// Read view without the credential
    pub fn redacted(&self) -> RedactedConfiguration {
        RedactedConfiguration {
            config_key: self.key.to_string(),
            location_id: self.location_id().clone(),
            form_id: self.form_id.clone(),
            object_type: self.object_type.clone(),
            field_mappings: self.field_mappings.clone(),
            key_type: self.key_type.clone(),
            key_config: self.key_config.clone(),
            output_shape: self.output_shape,
            source_tag: self.source_tag,
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }
}

/// Configuration as returned by the read API; the API key is never included
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedConfiguration {
    pub config_key: String,
    pub location_id: LocationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_id: Option<FormId>,
    pub object_type: String,
    pub field_mappings: Vec<FieldMapping>,
    pub key_type: KeyType,
    pub key_config: KeyConfig,
    pub output_shape: OutputShape,
    pub source_tag: SourceTag,
    pub created_at: Timestamp,
    pub last_updated: Timestamp,
}

/// Body of a configure call
///
/// Every field is optional at the wire level so that all missing required
/// fields can be reported together.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationRequest {
    pub location_id: Option<String>,
    pub api_key: Option<String>,
    pub form_id: Option<String>,
    pub object_type: Option<String>,
    pub field_mappings: Option<Vec<FieldMapping>>,
    pub key_type: Option<String>,
    pub key_config: Option<KeyConfig>,
    pub output_shape: Option<OutputShape>,
    pub source_tag: Option<SourceTag>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl ConfigurationRequest {
    /// Validate and build the stored configuration
    ///
    /// `formId` is required only when configurations are keyed by location
    /// and form.
    pub fn into_configuration(
        self,
        arity: ConfigKeyArity,
        now: Timestamp,
    ) -> Result<FormConfiguration, ValidationError> {
        let mut missing = Vec::new();
        if !present(&self.location_id) {
            missing.push("locationId".to_string());
        }
        if !present(&self.api_key) {
            missing.push("apiKey".to_string());
        }
        if arity == ConfigKeyArity::LocationAndForm && !present(&self.form_id) {
            missing.push("formId".to_string());
        }
        if !present(&self.object_type) {
            missing.push("objectType".to_string());
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields { fields: missing });
        }

        let location_id = LocationId::new(self.location_id.unwrap_or_default())?;
        let form_id = match self.form_id.filter(|f| !f.trim().is_empty()) {
            Some(form) => Some(FormId::new(form)?),
            None => None,
        };
        let key = ConfigKey::new(arity, location_id, form_id.clone())?;

        Ok(FormConfiguration {
            key,
            form_id,
            api_key: ApiKey::new(self.api_key.unwrap_or_default().trim()),
            object_type: self.object_type.unwrap_or_default().trim().to_string(),
            field_mappings: self.field_mappings.unwrap_or_default(),
            key_type: self
                .key_type
                .filter(|k| !k.trim().is_empty())
                .map(|k| KeyType::parse(&k))
                .unwrap_or_default(),
            key_config: self.key_config.unwrap_or_default(),
            output_shape: self.output_shape.unwrap_or_default(),
            source_tag: self.source_tag.unwrap_or_default(),
            created_at: now,
            last_updated: now,
        })
    }
}

/// Configuration storage failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Configuration store unavailable: {message}")]
    Unavailable { message: String },
}

/// Interface for configuration persistence
///
/// Writes replace the whole value for a key. When a value is replaced its
/// `created_at` carries over to the new value.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// Exact-match lookup
    async fn get(&self, key: &ConfigKey) -> Result<Option<FormConfiguration>, StoreError>;

    /// Store or replace; returns the replaced value
    async fn put(
        &self,
        configuration: FormConfiguration,
    ) -> Result<Option<FormConfiguration>, StoreError>;

    /// Remove; returns the removed value
    async fn delete(&self, key: &ConfigKey) -> Result<Option<FormConfiguration>, StoreError>;

    /// Oldest configuration registered for a location
    async fn find_by_location(
        &self,
        location_id: &LocationId,
    ) -> Result<Option<FormConfiguration>, StoreError>;

    /// Number of stored configurations
    async fn count(&self) -> Result<usize, StoreError>;
}

#[cfg(test)]
#[path = "configuration_tests.rs"]
mod tests;
