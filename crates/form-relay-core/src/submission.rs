//! # Object Submission
//!
//! Interface for creating the custom-object record in the CRM. The HTTP
//! implementation is [`crate::adapters::CrmClient`].

use crate::configuration::FormConfiguration;
use crate::field_mapping::MappedOutput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the CRM assigned to a created record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteObjectId(String);

impl RemoteObjectId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure to create the record
///
/// In every case no record is reported as created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("{message}")]
    Transport { message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },
}

impl SubmissionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Remote status code, when the CRM answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text surfaced to the webhook caller
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Interface for forwarding mapped records to the CRM
#[async_trait]
pub trait ObjectSubmitter: Send + Sync {
    /// Create one record from `output` using the target and credential in
    /// `configuration`
    async fn submit(
        &self,
        output: &MappedOutput,
        configuration: &FormConfiguration,
    ) -> Result<RemoteObjectId, SubmissionError>;
}

#[cfg(test)]
#[path = "submission_tests.rs"]
mod tests;
