//! CloudFormation custom resource request and response documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle stage of the custom resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Other,
}

/// Request sent by CloudFormation to the custom resource function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    /// Pre-signed URL the response must be PUT to
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub service_token: Option<String>,
    #[serde(default)]
    pub resource_properties: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Response document PUT to [`LifecycleEvent::response_url`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub data: Map<String, Value>,
}

impl CallbackResponse {
    /// Successful response; the function's log stream doubles as the
    /// physical resource id
    pub fn success(event: &LifecycleEvent, log_stream: &str) -> Self {
        Self::new(
            event,
            log_stream,
            ResponseStatus::Success,
            format!("Log stream name: {log_stream}"),
        )
    }

    pub fn failed(event: &LifecycleEvent, log_stream: &str, error: &str) -> Self {
        Self::new(
            event,
            log_stream,
            ResponseStatus::Failed,
            format!("{error}. Log stream name: {log_stream}"),
        )
    }

    fn new(
        event: &LifecycleEvent,
        log_stream: &str,
        status: ResponseStatus,
        reason: String,
    ) -> Self {
        Self {
            status,
            reason,
            physical_resource_id: log_stream.to_string(),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data: Map::new(),
        }
    }
}
