//! Tweet Analyzer
//!
//! Lambda function that labels batches of social media posts. It is invoked
//! for every newline-delimited JSON file a delivery stream lands under the
//! `raw/` prefix of the bucket, and for each post:
//!
//! - detects sentiment and entities with Amazon Comprehend
//! - caches attached photos in the bucket and labels them with Amazon
//!   Rekognition
//! - writes one JSON record per result to the matching Firehose stream
//!
//! ## Architecture
//!
//! ```text
//! S3 raw/ object ──▶ handler ──▶ TweetAnalyzer ──┬──▶ Comprehend ──▶ sentiment / entity streams
//!                                                │
//!                                                └──▶ MediaCache ──▶ ImageLabeler ──▶ rekognition stream
//!                                                      (S3 tmp/)      (Rekognition)
//! ```
//!
//! Every external service sits behind a trait in [`clients`]; [`aws`] holds
//! the SDK-backed implementations.

pub mod aws;
pub mod clients;
pub mod config;
pub mod handler;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod vision;

pub use config::{AnalyzerConfig, ConfigError, TextFailurePolicy};
pub use handler::function_handler;
pub use media::MediaCache;
pub use model::{EntityRecord, ImageRecord, Post, SentimentRecord};
pub use pipeline::{AnalyzerError, BatchSummary, Collaborators, PostSummary, TweetAnalyzer};
pub use vision::{ImageLabeler, ImageLabels};
