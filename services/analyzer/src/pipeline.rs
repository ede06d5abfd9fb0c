//! Per-post analysis pipeline.
//!
//! For each post, in order: sentiment detection, entity detection, then
//! labelling of every attached photo. Each result is written to its own
//! delivery stream as a newline-terminated JSON record.

use crate::clients::{ClientError, DeliveryStream, ObjectLocation, ObjectStore, TextAnalysis};
use crate::config::{AnalyzerConfig, TextFailurePolicy};
use crate::media::MediaCache;
use crate::model::{to_line, EntityRecord, ImageRecord, Media, Post, SentimentRecord};
use crate::vision::ImageLabeler;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors that end the analysis of a post (or of the whole batch)
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Failed to download batch {location}: {source}")]
    BatchDownload {
        location: String,
        #[source]
        source: ClientError,
    },

    #[error("Batch {location} is not valid UTF-8")]
    InvalidEncoding { location: String },

    #[error("Malformed post on line {line}: {source}")]
    MalformedPost {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Text analysis failed: {0}")]
    TextAnalysis(#[source] ClientError),

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to deliver record to {stream}: {source}")]
    Delivery {
        stream: String,
        #[source]
        source: ClientError,
    },
}

/// What was emitted for one post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostSummary {
    pub sentiment_records: usize,
    pub entity_records: usize,
    pub image_records: usize,
    pub images_failed: usize,
}

/// What was emitted for one batch file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub posts: usize,
    pub posts_skipped: usize,
    pub sentiment_records: usize,
    pub entity_records: usize,
    pub image_records: usize,
    pub images_failed: usize,
}

impl BatchSummary {
    fn add(&mut self, post: PostSummary) {
        self.posts += 1;
        self.sentiment_records += post.sentiment_records;
        self.entity_records += post.entity_records;
        self.image_records += post.image_records;
        self.images_failed += post.images_failed;
    }

    pub fn merge(&mut self, other: BatchSummary) {
        self.posts += other.posts;
        self.posts_skipped += other.posts_skipped;
        self.sentiment_records += other.sentiment_records;
        self.entity_records += other.entity_records;
        self.image_records += other.image_records;
        self.images_failed += other.images_failed;
    }
}

/// Collaborators the analyzer is built from
pub struct Collaborators {
    pub text: Arc<dyn TextAnalysis>,
    pub store: Arc<dyn ObjectStore>,
    pub media: MediaCache,
    pub labeler: ImageLabeler,
    pub streams: Arc<dyn DeliveryStream>,
}

/// Analyzes batches of posts and forwards the results to the delivery streams
pub struct TweetAnalyzer {
    config: Arc<AnalyzerConfig>,
    text: Arc<dyn TextAnalysis>,
    store: Arc<dyn ObjectStore>,
    media: MediaCache,
    labeler: ImageLabeler,
    streams: Arc<dyn DeliveryStream>,
}

impl TweetAnalyzer {
    pub fn new(config: AnalyzerConfig, collaborators: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            text: collaborators.text,
            store: collaborators.store,
            media: collaborators.media,
            labeler: collaborators.labeler,
            streams: collaborators.streams,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Download a newline-delimited batch file and analyze every post in it
    #[instrument(skip(self), fields(location = %location))]
    pub async fn process_object(
        &self,
        location: &ObjectLocation,
    ) -> Result<BatchSummary, AnalyzerError> {
        let body = self
            .store
            .get_object(location)
            .await
            .map_err(|source| AnalyzerError::BatchDownload {
                location: location.to_string(),
                source,
            })?;

        let body = String::from_utf8(body).map_err(|_| AnalyzerError::InvalidEncoding {
            location: location.to_string(),
        })?;

        let summary = self.process_batch(&body).await?;

        info!(
            posts = summary.posts,
            posts_skipped = summary.posts_skipped,
            sentiment_records = summary.sentiment_records,
            entity_records = summary.entity_records,
            image_records = summary.image_records,
            images_failed = summary.images_failed,
            "Batch processed"
        );

        Ok(summary)
    }

    /// Analyze every non-empty line of a batch, strictly in order
    pub async fn process_batch(&self, body: &str) -> Result<BatchSummary, AnalyzerError> {
        let mut summary = BatchSummary::default();

        for (index, line) in body.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let result = match serde_json::from_str::<Post>(line) {
                Ok(post) => self.analyze_post(&post).await,
                Err(source) => Err(AnalyzerError::MalformedPost {
                    line: index + 1,
                    source,
                }),
            };

            match result {
                Ok(post_summary) => summary.add(post_summary),
                Err(e) if self.config.text_failure_policy == TextFailurePolicy::Skip => {
                    warn!(line = index + 1, error = %e, "Skipping post");
                    summary.posts_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    /// Run the full analysis for one post.
    ///
    /// Text analysis and delivery failures are returned to the caller; image
    /// failures are logged and only cost the affected photo.
    #[instrument(skip(self, post), fields(post_id = %post.id))]
    pub async fn analyze_post(&self, post: &Post) -> Result<PostSummary, AnalyzerError> {
        let mut summary = PostSummary::default();
        let language = self.config.language_code.as_str();

        let sentiment = self
            .text
            .detect_sentiment(&post.text, language)
            .await
            .map_err(AnalyzerError::TextAnalysis)?;
        self.emit(
            &self.config.sentiment_stream,
            &SentimentRecord::new(post, &sentiment),
        )
        .await?;
        summary.sentiment_records = 1;

        let entities = self
            .text
            .detect_entities(&post.text, language)
            .await
            .map_err(AnalyzerError::TextAnalysis)?;
        for entity in &entities {
            self.emit(&self.config.entity_stream, &EntityRecord::new(post, entity))
                .await?;
        }
        summary.entity_records = entities.len();

        for media in post.photos() {
            match self.label_media(post, media).await? {
                MediaOutcome::Labelled => summary.image_records += 1,
                MediaOutcome::Failed => summary.images_failed += 1,
                MediaOutcome::Unsupported => {}
            }
        }

        metrics::counter!("analyzer.posts.processed").increment(1);
        Ok(summary)
    }

    async fn label_media(&self, post: &Post, media: &Media) -> Result<MediaOutcome, AnalyzerError> {
        let image = match self.media.ensure_stored(&media.media_url).await {
            Ok(Some(image)) => image,
            Ok(None) => {
                debug!(media_url = %media.media_url, "Skipping unsupported media");
                return Ok(MediaOutcome::Unsupported);
            }
            Err(e) => {
                warn!(media_url = %media.media_url, error = %e, "Failed to store image");
                metrics::counter!("analyzer.images.failed").increment(1);
                return Ok(MediaOutcome::Failed);
            }
        };

        let labels = match self.labeler.label(&image).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!(image = %image, error = %e, "Failed to analyze image");
                metrics::counter!("analyzer.images.failed").increment(1);
                return Ok(MediaOutcome::Failed);
            }
        };

        self.emit(
            &self.config.rekognition_stream,
            &ImageRecord::new(post, media, labels),
        )
        .await?;

        Ok(MediaOutcome::Labelled)
    }

    async fn emit<T: Serialize>(&self, stream: &str, record: &T) -> Result<(), AnalyzerError> {
        let data = to_line(record)?;

        self.streams
            .put_record(stream, data)
            .await
            .map_err(|source| AnalyzerError::Delivery {
                stream: stream.to_string(),
                source,
            })?;

        metrics::counter!("analyzer.records.emitted", "stream" => stream.to_string()).increment(1);
        Ok(())
    }
}

enum MediaOutcome {
    Labelled,
    Failed,
    Unsupported,
}
