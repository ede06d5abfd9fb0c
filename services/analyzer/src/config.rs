use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// What to do when a post cannot be analyzed (text analysis, delivery or
/// a malformed line in the batch file)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextFailurePolicy {
    /// Fail the whole invocation and let the platform retry the object
    #[default]
    Abort,
    /// Log the failure, drop the post and continue with the batch
    Skip,
}

/// Analyzer configuration.
///
/// Keys match the environment variables of the deployed function
/// (`SENTIMENT_STREAM`, `MAX_LABELS`, ...). Every key is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Firehose delivery stream receiving sentiment records
    #[serde(default)]
    pub sentiment_stream: String,
    /// Firehose delivery stream receiving entity records
    #[serde(default)]
    pub entity_stream: String,
    /// Firehose delivery stream receiving image analysis records
    #[serde(default)]
    pub rekognition_stream: String,
    /// Bucket that holds cached post images
    #[serde(default)]
    pub bucket: String,
    /// Key prefix for cached images
    #[serde(default = "default_imagekey_prefix")]
    pub imagekey_prefix: String,
    /// Minimum confidence for DetectLabels (0-100)
    #[serde(default = "default_min_label_confidence")]
    pub min_label_confidence: f32,
    /// Maximum labels returned by DetectLabels
    #[serde(default = "default_max_labels")]
    pub max_labels: i32,
    /// Language passed to Comprehend
    #[serde(default = "default_language_code")]
    pub language_code: String,
    /// Local directory used to stage downloaded images
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Log level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub text_failure_policy: TextFailurePolicy,
}

fn default_imagekey_prefix() -> String {
    "tmp/".to_string()
}

fn default_min_label_confidence() -> f32 {
    50.0
}

fn default_max_labels() -> i32 {
    100
}

fn default_language_code() -> String {
    "en".to_string()
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sentiment_stream: String::new(),
            entity_stream: String::new(),
            rekognition_stream: String::new(),
            bucket: String::new(),
            imagekey_prefix: default_imagekey_prefix(),
            min_label_confidence: default_min_label_confidence(),
            max_labels: default_max_labels(),
            language_code: default_language_code(),
            scratch_dir: default_scratch_dir(),
            log_level: default_log_level(),
            text_failure_policy: TextFailurePolicy::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from an optional config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(config::File::with_name("config/analyzer").required(false))
            // SENTIMENT_STREAM -> sentiment_stream
            .add_source(config::Environment::default())
            .build()?;

        Self::from_source(source)
    }

    /// Deserialize and validate an already built configuration source
    pub fn from_source(source: config::Config) -> Result<Self, ConfigError> {
        let config: Self = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_labels < 1 {
            return Err(ConfigError::InvalidValue {
                key: "max_labels",
                message: format!("must be at least 1, got {}", self.max_labels),
            });
        }

        if !(0.0..=100.0).contains(&self.min_label_confidence) {
            return Err(ConfigError::InvalidValue {
                key: "min_label_confidence",
                message: format!(
                    "must be between 0 and 100, got {}",
                    self.min_label_confidence
                ),
            });
        }

        if self.language_code.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "language_code",
                message: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
