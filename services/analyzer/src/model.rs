//! Post records read from the batch file and the records written to the
//! delivery streams.

use crate::clients::{DetectedEntity, SentimentAnalysis};
use crate::vision::ImageLabels;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One social media post, one line of the batch file
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    /// Post identifier, passed through to every derived record as-is
    pub id: Value,
    /// Body text
    pub text: String,
    #[serde(default)]
    pub extended_entities: Option<ExtendedEntities>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedEntities {
    #[serde(default)]
    pub media: Vec<Media>,
}

/// Media attached to a post
#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub id: Value,
    /// Media kind (`photo`, `video`, `animated_gif`)
    #[serde(rename = "type")]
    pub media_type: String,
    pub media_url: String,
}

impl Media {
    pub fn is_photo(&self) -> bool {
        self.media_type == "photo"
    }
}

impl Post {
    /// Attached media, empty when the post carries none
    pub fn media(&self) -> &[Media] {
        self.extended_entities
            .as_ref()
            .map(|e| e.media.as_slice())
            .unwrap_or_default()
    }

    /// Photos attached to the post, in their original order
    pub fn photos(&self) -> impl Iterator<Item = &Media> {
        self.media().iter().filter(|m| m.is_photo())
    }
}

/// Record sent to the sentiment stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentRecord {
    pub tweetid: Value,
    pub text: String,
    pub sentiment: String,
    pub sentiment_pos_score: f32,
    pub sentiment_neg_score: f32,
    pub sentiment_neu_score: f32,
    pub sentiment_mixed_score: f32,
}

impl SentimentRecord {
    pub fn new(post: &Post, analysis: &SentimentAnalysis) -> Self {
        Self {
            tweetid: post.id.clone(),
            text: post.text.clone(),
            sentiment: analysis.sentiment.clone(),
            sentiment_pos_score: analysis.scores.positive,
            sentiment_neg_score: analysis.scores.negative,
            sentiment_neu_score: analysis.scores.neutral,
            sentiment_mixed_score: analysis.scores.mixed,
        }
    }
}

/// Record sent to the entity stream, one per detected entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub tweetid: Value,
    pub text: String,
    pub entity: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub score: f32,
}

impl EntityRecord {
    pub fn new(post: &Post, entity: &DetectedEntity) -> Self {
        Self {
            tweetid: post.id.clone(),
            text: post.text.clone(),
            entity: entity.text.clone(),
            entity_type: entity.entity_type.clone(),
            score: entity.score,
        }
    }
}

/// Record sent to the image analysis stream, one per labelled photo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub tweetid: Value,
    pub text: String,
    pub mediaid: Value,
    pub media_url: String,
    pub image_labels: ImageLabels,
}

impl ImageRecord {
    pub fn new(post: &Post, media: &Media, labels: ImageLabels) -> Self {
        Self {
            tweetid: post.id.clone(),
            text: post.text.clone(),
            mediaid: media.id.clone(),
            media_url: media.media_url.clone(),
            image_labels: labels,
        }
    }
}

/// Serialize a record as a single newline-terminated JSON line
pub fn to_line<T: Serialize>(record: &T) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}
