//! Seams between the analysis pipeline and the services it calls.
//!
//! Each trait covers one collaborator: text analytics, image recognition,
//! object storage, remote media download and the delivery streams. The
//! AWS-backed implementations live in [`crate::aws`].

use crate::vision::{CelebrityRecognition, FaceDetail, Label, ModerationLabel, TextDetection};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors returned by a collaborating service
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} returned an incomplete response: missing {field}")]
    IncompleteResponse {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    pub fn service(operation: &'static str, error: impl fmt::Display) -> Self {
        Self::Service {
            operation,
            message: error.to_string(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Per-class sentiment confidence
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SentimentScores {
    pub positive: f32,
    pub negative: f32,
    pub neutral: f32,
    pub mixed: f32,
}

impl SentimentScores {
    pub fn total(&self) -> f32 {
        self.positive + self.negative + self.neutral + self.mixed
    }
}

/// Result of a sentiment detection call
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentAnalysis {
    /// `POSITIVE`, `NEGATIVE`, `NEUTRAL` or `MIXED`
    pub sentiment: String,
    pub scores: SentimentScores,
}

/// A named span found by entity detection
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedEntity {
    pub text: String,
    pub entity_type: String,
    pub score: f32,
}

/// Location of an object in the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextAnalysis: Send + Sync {
    async fn detect_sentiment(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<SentimentAnalysis, ClientError>;

    async fn detect_entities(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<Vec<DetectedEntity>, ClientError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageRecognition: Send + Sync {
    async fn detect_labels(
        &self,
        image: &ObjectLocation,
        max_labels: i32,
        min_confidence: f32,
    ) -> Result<Vec<Label>, ClientError>;

    async fn detect_text(&self, image: &ObjectLocation) -> Result<Vec<TextDetection>, ClientError>;

    async fn recognize_celebrities(
        &self,
        image: &ObjectLocation,
    ) -> Result<CelebrityRecognition, ClientError>;

    /// Face detection with every facial attribute requested
    async fn detect_faces(&self, image: &ObjectLocation) -> Result<Vec<FaceDetail>, ClientError>;

    async fn detect_moderation_labels(
        &self,
        image: &ObjectLocation,
    ) -> Result<Vec<ModerationLabel>, ClientError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object into memory
    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>, ClientError>;

    /// True when at least one object exists under `location.key` used as a prefix
    async fn exists(&self, location: &ObjectLocation) -> Result<bool, ClientError>;

    async fn upload_file(&self, location: &ObjectLocation, path: &Path)
        -> Result<(), ClientError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Fetch `url` and write the body to `dest`
    async fn download(&self, url: &str, dest: &Path) -> Result<(), ClientError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryStream: Send + Sync {
    /// Append one record to the named stream
    async fn put_record(&self, stream_name: &str, data: Vec<u8>) -> Result<(), ClientError>;
}
