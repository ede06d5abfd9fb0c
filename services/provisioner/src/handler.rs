//! Lambda entry point for CloudFormation custom resource requests.

use crate::event::{CallbackResponse, LifecycleEvent};
use crate::provisioner::TriggerProvisioner;
use lambda_runtime::{Error, LambdaEvent};
use tracing::info;

pub async fn function_handler(
    event: LambdaEvent<LifecycleEvent>,
    provisioner: &TriggerProvisioner,
) -> Result<CallbackResponse, Error> {
    let (payload, context) = event.into_parts();
    info!(event = ?payload, "Received custom resource request");

    let response = provisioner
        .handle(&payload, &context.env_config.log_stream)
        .await?;
    Ok(response)
}
