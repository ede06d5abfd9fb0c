//! Delivery of the custom resource response to CloudFormation.

use crate::event::CallbackResponse;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Response upload failed: {0}")]
    Http(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseSender: Send + Sync {
    /// PUT `response` to the pre-signed `url`
    async fn send(&self, url: &str, response: &CallbackResponse) -> Result<(), CallbackError>;
}

pub struct HttpResponseSender {
    client: reqwest::Client,
}

impl HttpResponseSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpResponseSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseSender for HttpResponseSender {
    #[instrument(skip(self, url, response), fields(status = ?response.status))]
    async fn send(&self, url: &str, response: &CallbackResponse) -> Result<(), CallbackError> {
        // The pre-signed URL is signed without a content type, so none is set
        let body = serde_json::to_vec(response)?;

        let reply = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CallbackError::Http(e.to_string()))?;

        info!(http_status = %reply.status(), "Response delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LifecycleEvent, ResponseStatus};
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::put;
    use axum::Router;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(HeaderMap, Bytes)>>>;

    async fn accept(State(captured): State<Captured>, headers: HeaderMap, body: Bytes) -> StatusCode {
        captured.lock().unwrap().push((headers, body));
        StatusCode::OK
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn event(response_url: &str) -> LifecycleEvent {
        serde_json::from_value(json!({
            "RequestType": "Create",
            "ResponseURL": response_url,
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/social-media/guid",
            "RequestId": "request-1",
            "LogicalResourceId": "AddTrigger"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_sends_json_without_content_type() {
        let captured = Captured::default();
        let base = serve(
            Router::new()
                .route("/signed", put(accept))
                .with_state(captured.clone()),
        )
        .await;
        let url = format!("{base}/signed");
        let response = CallbackResponse::success(&event(&url), "log-stream");

        HttpResponseSender::new().send(&url, &response).await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (headers, body) = &captured[0];
        assert!(headers.get(header::CONTENT_TYPE).is_none());

        let body: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(body["Status"], json!("SUCCESS"));
        assert_eq!(body["PhysicalResourceId"], json!("log-stream"));
        assert_eq!(body["Data"], json!({}));
    }

    #[tokio::test]
    async fn test_rejected_put_is_an_error() {
        let base = serve(Router::new().route("/signed", put(|| async { StatusCode::FORBIDDEN })))
            .await;
        let url = format!("{base}/signed");
        let response = CallbackResponse::failed(&event(&url), "log-stream", "AccessDenied");
        assert_eq!(response.status, ResponseStatus::Failed);

        let result = HttpResponseSender::new().send(&url, &response).await;
        assert!(matches!(result, Err(CallbackError::Http(_))));
    }
}
