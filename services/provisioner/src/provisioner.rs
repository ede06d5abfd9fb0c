//! Custom resource lifecycle handling.

use crate::callback::{CallbackError, ResponseSender};
use crate::config::{ConfigError, ProvisionerConfig};
use crate::event::{CallbackResponse, LifecycleEvent, RequestType};
use crate::wiring::{BucketWiring, InvokePermission, NotificationRule, WiringError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Wiring(#[from] WiringError),
}

pub struct TriggerProvisioner {
    config: ProvisionerConfig,
    wiring: Arc<dyn BucketWiring>,
    sender: Arc<dyn ResponseSender>,
}

impl TriggerProvisioner {
    pub fn new(
        config: ProvisionerConfig,
        wiring: Arc<dyn BucketWiring>,
        sender: Arc<dyn ResponseSender>,
    ) -> Self {
        Self {
            config,
            wiring,
            sender,
        }
    }

    /// Grant S3 the invoke permission, then install the notification rule
    pub async fn provision(&self) -> Result<(), ProvisionError> {
        let target = self.config.target()?;

        let permission = InvokePermission::for_target(&target, &self.config.statement_id);
        self.wiring.grant_invoke_permission(&permission).await?;

        let rule = NotificationRule::for_target(
            &target,
            &self.config.notification_id,
            &self.config.notification_prefix,
        );
        self.wiring.put_notification(&rule).await?;

        info!(
            bucket = %target.bucket,
            function = %target.function_arn,
            prefix = %self.config.notification_prefix,
            "Bucket wired to function"
        );
        Ok(())
    }

    /// Handle one lifecycle request and report the outcome.
    ///
    /// Only `Create` touches AWS; `Update` and `Delete` leave the wiring in
    /// place. Unless `report_failures` is set, a failed provision is logged
    /// and still answered with SUCCESS so stack operations never hang on
    /// this resource. The callback is sent on every path.
    #[instrument(skip(self, event), fields(request_type = ?event.request_type, request_id = %event.request_id))]
    pub async fn handle(
        &self,
        event: &LifecycleEvent,
        log_stream: &str,
    ) -> Result<CallbackResponse, CallbackError> {
        let outcome = match event.request_type {
            RequestType::Create => self.provision().await,
            _ => {
                info!("Nothing to do for this request type");
                Ok(())
            }
        };

        let response = match outcome {
            Ok(()) => CallbackResponse::success(event, log_stream),
            Err(e) if self.config.report_failures => {
                warn!(error = %e, "Provisioning failed");
                CallbackResponse::failed(event, log_stream, &e.to_string())
            }
            Err(e) => {
                warn!(error = %e, "Provisioning failed, reporting success");
                CallbackResponse::success(event, log_stream)
            }
        };

        if let Err(e) = self.sender.send(&event.response_url, &response).await {
            warn!(error = %e, "Failed to deliver custom resource response");
            return Err(e);
        }
        Ok(response)
    }
}
