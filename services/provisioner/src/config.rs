use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),
}

/// Provisioner configuration.
///
/// `lambda_arn`, `s3_bucket` and `account_number` come from the stack
/// template and are only needed when a `Create` request arrives.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionerConfig {
    /// ARN of the analyzer function to invoke
    #[serde(default)]
    pub lambda_arn: Option<String>,
    /// Bucket whose uploads trigger the analyzer
    #[serde(default)]
    pub s3_bucket: Option<String>,
    /// Account that owns the bucket
    #[serde(default)]
    pub account_number: Option<String>,
    /// Key prefix the notification is filtered on
    #[serde(default = "default_notification_prefix")]
    pub notification_prefix: String,
    /// Statement id of the invoke permission
    #[serde(default = "default_statement_id")]
    pub statement_id: String,
    /// Id of the bucket notification rule
    #[serde(default = "default_notification_id")]
    pub notification_id: String,
    /// Send FAILED to CloudFormation when wiring fails instead of SUCCESS
    #[serde(default)]
    pub report_failures: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Everything needed to wire the bucket to the function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerTarget {
    pub function_arn: String,
    pub bucket: String,
    pub account: String,
}

fn default_notification_prefix() -> String {
    "raw/".to_string()
}

fn default_statement_id() -> String {
    "S3callingLambdaForSocialMedia".to_string()
}

fn default_notification_id() -> String {
    "TriggerRawProcessing".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            lambda_arn: None,
            s3_bucket: None,
            account_number: None,
            notification_prefix: default_notification_prefix(),
            statement_id: default_statement_id(),
            notification_id: default_notification_id(),
            report_failures: false,
            log_level: default_log_level(),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from an optional config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(config::File::with_name("config/provisioner").required(false))
            .add_source(config::Environment::default())
            .build()?;

        Self::from_source(source)
    }

    pub fn from_source(source: config::Config) -> Result<Self, ConfigError> {
        Ok(source.try_deserialize()?)
    }

    /// The function/bucket pair to wire, if fully configured
    pub fn target(&self) -> Result<TriggerTarget, ConfigError> {
        fn required(value: &Option<String>, key: &'static str) -> Result<String, ConfigError> {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(String::from)
                .ok_or(ConfigError::MissingRequired(key))
        }

        Ok(TriggerTarget {
            function_arn: required(&self.lambda_arn, "lambda_arn")?,
            bucket: required(&self.s3_bucket, "s3_bucket")?,
            account: required(&self.account_number, "account_number")?,
        })
    }
}
