//! # Form Relay Core
//!
//! Core business logic for the Form Relay webhook service.
//!
//! The service receives form-submission webhooks from a CRM platform, maps the
//! submitted fields onto a configured custom-object schema, derives a unique
//! record key, and forwards the result to the CRM's custom-object API.
//!
//! ## Architecture
//!
//! - Key generation and field mapping are pure transforms; time, randomness
//!   and sequence numbers are injected through [`sources`]
//! - Configuration storage, the activity log and the outbound CRM call sit
//!   behind traits so the dispatcher can be exercised without I/O
//! - In-memory and HTTP implementations live in [`adapters`]
//!
//! ## Usage
//!
//! ```rust
//! use form_relay_core::{ConfigKey, ConfigKeyArity, FormId, LocationId};
//!
//! let location = LocationId::new("loc-123").unwrap();
//! let form = FormId::new("form-9").unwrap();
//! let key = ConfigKey::new(ConfigKeyArity::LocationAndForm, location, Some(form)).unwrap();
//! assert_eq!(key.to_string(), "loc-123_form-9");
//! ```

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use ulid::Ulid;

/// Submitted form fields, keyed by field name
pub type FormData = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Identifier Types
// ============================================================================

const MAX_IDENTIFIER_LENGTH: usize = 128;

fn validate_identifier(field: &str, value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if trimmed.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max_length: MAX_IDENTIFIER_LENGTH,
        });
    }

    Ok(trimmed.to_string())
}

/// CRM location (sub-account) identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationId(String);

impl LocationId {
    /// Create location ID with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        validate_identifier("locationId", value.into()).map(Self)
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LocationId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LocationId> for String {
    fn from(value: LocationId) -> Self {
        value.0
    }
}

/// CRM form identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormId(String);

impl FormId {
    /// Create form ID with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        validate_identifier("formId", value.into()).map(Self)
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FormId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FormId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FormId> for String {
    fn from(value: FormId) -> Self {
        value.0
    }
}

/// How many identifiers make up a configuration key
///
/// Older deployments keyed configuration by location only; current ones key
/// by location and form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKeyArity {
    #[default]
    LocationAndForm,
    LocationOnly,
}

/// Composite key identifying a stored configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    location_id: LocationId,
    form_id: Option<FormId>,
}

impl ConfigKey {
    /// Build a key for the given arity
    ///
    /// `LocationOnly` discards the form; `LocationAndForm` requires it.
    pub fn new(
        arity: ConfigKeyArity,
        location_id: LocationId,
        form_id: Option<FormId>,
    ) -> Result<Self, ValidationError> {
        match arity {
            ConfigKeyArity::LocationOnly => Ok(Self {
                location_id,
                form_id: None,
            }),
            ConfigKeyArity::LocationAndForm => {
                let form_id = form_id.ok_or_else(|| ValidationError::Required {
                    field: "formId".to_string(),
                })?;
                Ok(Self {
                    location_id,
                    form_id: Some(form_id),
                })
            }
        }
    }

    pub fn location_id(&self) -> &LocationId {
        &self.location_id
    }

    pub fn form_id(&self) -> Option<&FormId> {
        self.form_id.as_ref()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.form_id {
            Some(form_id) => write!(f, "{}_{}", self.location_id, form_id),
            None => write!(f, "{}", self.location_id),
        }
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// Bearer credential for the CRM API
///
/// The value is wiped from memory on drop and never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the credential for immediate use in a request header
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("length", &self.0.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Time and Tracking Types
// ============================================================================

/// UTC timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        Self(value)
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ValidationError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| ValidationError::InvalidFormat {
                field: "timestamp".to_string(),
                message: e.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string with millisecond precision
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

/// Identifier attached to every log line of a single webhook dispatch
///
/// Uses ULID so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchId(Ulid);

impl DispatchId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Missing required configuration fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<String> },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Injectable clock, entropy and sequence sources
pub mod sources;

/// Form configuration model and storage interface
pub mod configuration;

/// Unique record key strategies
pub mod key_generation;

/// Submitted-field to object-field mapping
pub mod field_mapping;

/// Rolling activity log
pub mod activity_log;

/// Outbound custom-object submission interface
pub mod submission;

/// Webhook dispatch pipeline
pub mod dispatch;

/// In-memory and HTTP implementations of the core interfaces
pub mod adapters;

pub use activity_log::{ActivityLog, LogCounts, LogEntry, LogLevel};
pub use adapters::{CrmClient, CrmClientConfig, InMemoryActivityLog, InMemoryConfigurationStore};
pub use configuration::{
    ConfigurationRequest, ConfigurationStore, FieldMapping, FormConfiguration, OutputShape,
    RedactedConfiguration, SourceTag, StoreError,
};
pub use dispatch::{
    DispatchError, DispatchOutcome, DispatchReceipt, FormSubmission, WebhookDispatcher,
};
pub use field_mapping::{FieldMapper, FieldValue, MappedOutput};
pub use key_generation::{KeyConfig, KeyGenerator, KeyType};
pub use sources::{
    Clock, Entropy, FixedClock, InMemorySequence, SeededEntropy, SequenceSource, SystemClock,
    ThreadEntropy,
};
pub use submission::{ObjectSubmitter, RemoteObjectId, SubmissionError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
