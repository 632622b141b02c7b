//! Request and response bodies for the API.

use form_relay_core::{DispatchOutcome, LogEntry, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Response Types
// ============================================================================

/// Webhook and test-submission response
///
/// `success: false` with a message is the acknowledged "not configured"
/// outcome.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Mapped record, returned by test submissions only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_data: Option<Value>,
}

impl WebhookResponse {
    pub fn from_outcome(outcome: DispatchOutcome, success_message: &str) -> Self {
        match outcome {
            DispatchOutcome::NotConfigured { message, .. } => Self {
                success: false,
                object_id: None,
                unique_key: None,
                message: Some(message),
                test_data: None,
            },
            DispatchOutcome::Completed(receipt) => Self {
                success: true,
                object_id: Some(receipt.object_id.to_string()),
                unique_key: Some(receipt.unique_key),
                message: Some(success_message.to_string()),
                test_data: None,
            },
        }
    }
}

/// Configuration save response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureResponse {
    pub success: bool,
    pub message: String,
    pub config_key: String,
}

/// Generic acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Activity log page
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
    pub total_logs: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub active_configurations: usize,
    pub total_logs: usize,
    /// Process uptime in seconds
    pub uptime: f64,
    pub version: String,
}

/// Derived submission statistics
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub active_configurations: usize,
    pub total_processed: usize,
    pub successful_submissions: usize,
    pub failed_submissions: usize,
    pub success_rate: u32,
    pub last_activity: Option<Timestamp>,
}

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /api/test-submission`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSubmissionRequest {
    pub location_id: Option<String>,
    pub form_id: Option<String>,
}

/// Query parameters of the pass-through routes
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialQuery {
    pub api_key: Option<String>,
}
