//! Permission grant and bucket notification calls.

use crate::config::TriggerTarget;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::{BuildError, DisplayErrorContext};
use aws_sdk_s3::types::{
    Event, FilterRule, FilterRuleName, LambdaFunctionConfiguration, NotificationConfiguration,
    NotificationConfigurationFilter, S3KeyFilter,
};
use thiserror::Error;
use tracing::{info, instrument};

const INVOKE_ACTION: &str = "lambda:InvokeFunction";
const S3_PRINCIPAL: &str = "s3.amazonaws.com";
const OBJECT_CREATED: &str = "s3:ObjectCreated:*";

#[derive(Error, Debug)]
#[error("{operation} failed: {message}")]
pub struct WiringError {
    pub operation: &'static str,
    pub message: String,
}

impl WiringError {
    fn new(operation: &'static str, error: impl std::fmt::Display) -> Self {
        Self {
            operation,
            message: error.to_string(),
        }
    }
}

/// Permission for S3 to invoke the function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokePermission {
    pub function_name: String,
    pub statement_id: String,
    pub source_arn: String,
    pub source_account: String,
}

impl InvokePermission {
    pub fn for_target(target: &TriggerTarget, statement_id: &str) -> Self {
        Self {
            function_name: target.function_arn.clone(),
            statement_id: statement_id.to_string(),
            source_arn: format!("arn:aws:s3:::{}", target.bucket),
            source_account: target.account.clone(),
        }
    }
}

/// The single "object created" rule installed on the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRule {
    pub bucket: String,
    pub id: String,
    pub function_arn: String,
    pub prefix: String,
}

impl NotificationRule {
    pub fn for_target(target: &TriggerTarget, id: &str, prefix: &str) -> Self {
        Self {
            bucket: target.bucket.clone(),
            id: id.to_string(),
            function_arn: target.function_arn.clone(),
            prefix: prefix.to_string(),
        }
    }

    /// Bucket notification document holding only this rule
    pub fn to_configuration(&self) -> Result<NotificationConfiguration, BuildError> {
        let filter = NotificationConfigurationFilter::builder()
            .key(
                S3KeyFilter::builder()
                    .filter_rules(
                        FilterRule::builder()
                            .name(FilterRuleName::Prefix)
                            .value(&self.prefix)
                            .build(),
                    )
                    .build(),
            )
            .build();

        let lambda = LambdaFunctionConfiguration::builder()
            .id(&self.id)
            .lambda_function_arn(&self.function_arn)
            .events(Event::from(OBJECT_CREATED))
            .filter(filter)
            .build()?;

        Ok(NotificationConfiguration::builder()
            .lambda_function_configurations(lambda)
            .build())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BucketWiring: Send + Sync {
    async fn grant_invoke_permission(&self, permission: &InvokePermission)
        -> Result<(), WiringError>;

    /// Replace the bucket's notification configuration with `rule`
    async fn put_notification(&self, rule: &NotificationRule) -> Result<(), WiringError>;
}

pub struct AwsBucketWiring {
    lambda: aws_sdk_lambda::Client,
    s3: aws_sdk_s3::Client,
}

impl AwsBucketWiring {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            lambda: aws_sdk_lambda::Client::new(sdk_config),
            s3: aws_sdk_s3::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl BucketWiring for AwsBucketWiring {
    #[instrument(skip(self))]
    async fn grant_invoke_permission(
        &self,
        permission: &InvokePermission,
    ) -> Result<(), WiringError> {
        self.lambda
            .add_permission()
            .function_name(&permission.function_name)
            .statement_id(&permission.statement_id)
            .action(INVOKE_ACTION)
            .principal(S3_PRINCIPAL)
            .source_arn(&permission.source_arn)
            .source_account(&permission.source_account)
            .send()
            .await
            .map_err(|e| WiringError::new("AddPermission", DisplayErrorContext(e)))?;

        info!("Invoke permission granted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn put_notification(&self, rule: &NotificationRule) -> Result<(), WiringError> {
        let configuration = rule
            .to_configuration()
            .map_err(|e| WiringError::new("PutBucketNotificationConfiguration", e))?;

        self.s3
            .put_bucket_notification_configuration()
            .bucket(&rule.bucket)
            .notification_configuration(configuration)
            .send()
            .await
            .map_err(|e| {
                WiringError::new(
                    "PutBucketNotificationConfiguration",
                    DisplayErrorContext(e),
                )
            })?;

        info!("Bucket notification installed");
        Ok(())
    }
}
