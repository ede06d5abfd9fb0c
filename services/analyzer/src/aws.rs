//! AWS-backed implementations of the pipeline's collaborators.

use crate::clients::{
    ClientError, DeliveryStream, DetectedEntity, ImageRecognition, MediaDownloader,
    ObjectLocation, ObjectStore, SentimentAnalysis, SentimentScores, TextAnalysis,
};
use crate::config::AnalyzerConfig;
use crate::media::MediaCache;
use crate::pipeline::{Collaborators, TweetAnalyzer};
use crate::vision::{
    AgeRange, BoundingBox, Celebrity, CelebrityRecognition, ComparedFace, Emotion, EyeDirection,
    FaceDetail, FacialAttribute, Gender, Geometry, ImageLabeler, ImageQuality, KnownGender, Label,
    LabelInstance, Landmark, ModerationLabel, Parent, Point, Pose, TextDetection,
};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_comprehend::types::LanguageCode;
use aws_sdk_firehose::primitives::Blob;
use aws_sdk_rekognition::types::{Attribute, Image, S3Object};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Wire an analyzer to the real AWS services
pub fn build_analyzer(sdk_config: &SdkConfig, config: AnalyzerConfig) -> TweetAnalyzer {
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(sdk_config));
    let media = MediaCache::new(
        store.clone(),
        Arc::new(HttpMediaDownloader::new()),
        &config.bucket,
        &config.imagekey_prefix,
        &config.scratch_dir,
    );
    let labeler = ImageLabeler::new(
        Arc::new(RekognitionVision::new(sdk_config)),
        config.max_labels,
        config.min_label_confidence,
    );

    TweetAnalyzer::new(
        config,
        Collaborators {
            text: Arc::new(ComprehendText::new(sdk_config)),
            store,
            media,
            labeler,
            streams: Arc::new(FirehoseStreams::new(sdk_config)),
        },
    )
}

/// Accepts both `T` and `Option<T>` accessors from the SDK
fn opt<T>(value: impl Into<Option<T>>) -> Option<T> {
    value.into()
}

/// Content type for a cached image key
fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

pub struct ComprehendText {
    client: aws_sdk_comprehend::Client,
}

impl ComprehendText {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_comprehend::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl TextAnalysis for ComprehendText {
    async fn detect_sentiment(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<SentimentAnalysis, ClientError> {
        let output = self
            .client
            .detect_sentiment()
            .text(text)
            .language_code(LanguageCode::from(language_code))
            .send()
            .await
            .map_err(sdk_error("DetectSentiment"))?;

        let sentiment = output
            .sentiment()
            .ok_or(ClientError::IncompleteResponse {
                operation: "DetectSentiment",
                field: "Sentiment",
            })?
            .as_str()
            .to_string();

        let scores = output
            .sentiment_score()
            .map(|s| SentimentScores {
                positive: opt(s.positive()).unwrap_or_default(),
                negative: opt(s.negative()).unwrap_or_default(),
                neutral: opt(s.neutral()).unwrap_or_default(),
                mixed: opt(s.mixed()).unwrap_or_default(),
            })
            .unwrap_or_default();

        Ok(SentimentAnalysis { sentiment, scores })
    }

    async fn detect_entities(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<Vec<DetectedEntity>, ClientError> {
        let output = self
            .client
            .detect_entities()
            .text(text)
            .language_code(LanguageCode::from(language_code))
            .send()
            .await
            .map_err(sdk_error("DetectEntities"))?;

        Ok(output
            .entities()
            .iter()
            .map(|entity| DetectedEntity {
                text: entity.text().unwrap_or_default().to_string(),
                entity_type: entity
                    .r#type()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default(),
                score: opt(entity.score()).unwrap_or_default(),
            })
            .collect())
    }
}

pub struct RekognitionVision {
    client: aws_sdk_rekognition::Client,
}

impl RekognitionVision {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_rekognition::Client::new(sdk_config),
        }
    }
}

fn rekognition_image(location: &ObjectLocation) -> Image {
    Image::builder()
        .s3_object(
            S3Object::builder()
                .bucket(&location.bucket)
                .name(&location.key)
                .build(),
        )
        .build()
}

/// Map an SDK error to a [`ClientError`], keeping the service message
fn sdk_error<E: std::error::Error>(operation: &'static str) -> impl FnOnce(E) -> ClientError {
    move |e| ClientError::service(operation, DisplayErrorContext(e))
}

fn bounding_box(b: &aws_sdk_rekognition::types::BoundingBox) -> BoundingBox {
    BoundingBox {
        width: opt(b.width()),
        height: opt(b.height()),
        left: opt(b.left()),
        top: opt(b.top()),
    }
}

fn geometry(g: &aws_sdk_rekognition::types::Geometry) -> Geometry {
    Geometry {
        bounding_box: g.bounding_box().map(bounding_box),
        polygon: g
            .polygon()
            .iter()
            .map(|p| Point {
                x: opt(p.x()),
                y: opt(p.y()),
            })
            .collect(),
    }
}

fn landmarks(landmarks: &[aws_sdk_rekognition::types::Landmark]) -> Vec<Landmark> {
    landmarks
        .iter()
        .map(|l| Landmark {
            landmark_type: l.r#type().map(|t| t.as_str().to_string()),
            x: opt(l.x()),
            y: opt(l.y()),
        })
        .collect()
}

fn pose(p: &aws_sdk_rekognition::types::Pose) -> Pose {
    Pose {
        roll: opt(p.roll()),
        yaw: opt(p.yaw()),
        pitch: opt(p.pitch()),
    }
}

fn quality(q: &aws_sdk_rekognition::types::ImageQuality) -> ImageQuality {
    ImageQuality {
        brightness: opt(q.brightness()),
        sharpness: opt(q.sharpness()),
    }
}

fn emotions(emotions: &[aws_sdk_rekognition::types::Emotion]) -> Vec<Emotion> {
    emotions
        .iter()
        .map(|e| Emotion {
            emotion_type: e.r#type().map(|t| t.as_str().to_string()),
            confidence: opt(e.confidence()),
        })
        .collect()
}

macro_rules! facial_attribute {
    ($attr:expr) => {
        $attr.map(|a| FacialAttribute {
            value: opt(a.value()),
            confidence: opt(a.confidence()),
        })
    };
}

fn compared_face(face: &aws_sdk_rekognition::types::ComparedFace) -> ComparedFace {
    ComparedFace {
        bounding_box: face.bounding_box().map(bounding_box),
        confidence: opt(face.confidence()),
        landmarks: landmarks(face.landmarks()),
        pose: face.pose().map(pose),
        quality: face.quality().map(quality),
        emotions: emotions(face.emotions()),
        smile: facial_attribute!(face.smile()),
    }
}

fn celebrity(c: &aws_sdk_rekognition::types::Celebrity) -> Celebrity {
    Celebrity {
        urls: c.urls().to_vec(),
        name: c.name().map(String::from),
        id: c.id().map(String::from),
        face: c.face().map(compared_face),
        match_confidence: opt(c.match_confidence()),
        known_gender: c.known_gender().map(|g| KnownGender {
            gender_type: g.r#type().map(|t| t.as_str().to_string()),
        }),
    }
}

fn face_detail(face: &aws_sdk_rekognition::types::FaceDetail) -> FaceDetail {
    FaceDetail {
        bounding_box: face.bounding_box().map(bounding_box),
        age_range: face.age_range().map(|a| AgeRange {
            low: opt(a.low()),
            high: opt(a.high()),
        }),
        smile: facial_attribute!(face.smile()),
        eyeglasses: facial_attribute!(face.eyeglasses()),
        sunglasses: facial_attribute!(face.sunglasses()),
        gender: face.gender().map(|g| Gender {
            value: g.value().map(|v| v.as_str().to_string()),
            confidence: opt(g.confidence()),
        }),
        beard: facial_attribute!(face.beard()),
        mustache: facial_attribute!(face.mustache()),
        eyes_open: facial_attribute!(face.eyes_open()),
        mouth_open: facial_attribute!(face.mouth_open()),
        emotions: emotions(face.emotions()),
        landmarks: landmarks(face.landmarks()),
        pose: face.pose().map(pose),
        quality: face.quality().map(quality),
        confidence: opt(face.confidence()),
        face_occluded: facial_attribute!(face.face_occluded()),
        eye_direction: face.eye_direction().map(|d| EyeDirection {
            yaw: opt(d.yaw()),
            pitch: opt(d.pitch()),
            confidence: opt(d.confidence()),
        }),
    }
}

#[async_trait]
impl ImageRecognition for RekognitionVision {
    #[instrument(skip(self, image), fields(image = %image))]
    async fn detect_labels(
        &self,
        image: &ObjectLocation,
        max_labels: i32,
        min_confidence: f32,
    ) -> Result<Vec<Label>, ClientError> {
        let output = self
            .client
            .detect_labels()
            .image(rekognition_image(image))
            .max_labels(max_labels)
            .min_confidence(min_confidence)
            .send()
            .await
            .map_err(sdk_error("DetectLabels"))?;

        debug!(count = output.labels().len(), "Labels detected");

        Ok(output
            .labels()
            .iter()
            .map(|label| Label {
                name: label.name().unwrap_or_default().to_string(),
                confidence: opt(label.confidence()),
                parents: label
                    .parents()
                    .iter()
                    .map(|p| Parent {
                        name: p.name().map(String::from),
                    })
                    .collect(),
                instances: label
                    .instances()
                    .iter()
                    .map(|i| LabelInstance {
                        bounding_box: i.bounding_box().map(bounding_box),
                        confidence: opt(i.confidence()),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn detect_text(&self, image: &ObjectLocation) -> Result<Vec<TextDetection>, ClientError> {
        let output = self
            .client
            .detect_text()
            .image(rekognition_image(image))
            .send()
            .await
            .map_err(sdk_error("DetectText"))?;

        Ok(output
            .text_detections()
            .iter()
            .map(|t| TextDetection {
                detected_text: t.detected_text().map(String::from),
                text_type: t.r#type().map(|ty| ty.as_str().to_string()),
                id: opt(t.id()),
                parent_id: opt(t.parent_id()),
                confidence: opt(t.confidence()),
                geometry: t.geometry().map(geometry),
            })
            .collect())
    }

    #[allow(deprecated)]
    async fn recognize_celebrities(
        &self,
        image: &ObjectLocation,
    ) -> Result<CelebrityRecognition, ClientError> {
        let output = self
            .client
            .recognize_celebrities()
            .image(rekognition_image(image))
            .send()
            .await
            .map_err(sdk_error("RecognizeCelebrities"))?;

        Ok(CelebrityRecognition {
            unrecognized_faces: output.unrecognized_faces().iter().map(compared_face).collect(),
            celebrity_faces: output.celebrity_faces().iter().map(celebrity).collect(),
            orientation_correction: output
                .orientation_correction()
                .map(|o| o.as_str().to_string()),
        })
    }

    async fn detect_faces(&self, image: &ObjectLocation) -> Result<Vec<FaceDetail>, ClientError> {
        let output = self
            .client
            .detect_faces()
            .image(rekognition_image(image))
            .attributes(Attribute::All)
            .send()
            .await
            .map_err(sdk_error("DetectFaces"))?;

        Ok(output.face_details().iter().map(face_detail).collect())
    }

    async fn detect_moderation_labels(
        &self,
        image: &ObjectLocation,
    ) -> Result<Vec<ModerationLabel>, ClientError> {
        let output = self
            .client
            .detect_moderation_labels()
            .image(rekognition_image(image))
            .send()
            .await
            .map_err(sdk_error("DetectModerationLabels"))?;

        Ok(output
            .moderation_labels()
            .iter()
            .map(|m| ModerationLabel {
                name: m.name().map(String::from),
                parent_name: m.parent_name().map(String::from),
                confidence: opt(m.confidence()),
            })
            .collect())
    }
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, location), fields(location = %location))]
    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>, ClientError> {
        let output = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(sdk_error("GetObject"))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ClientError::service("GetObject", e))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn exists(&self, location: &ObjectLocation) -> Result<bool, ClientError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&location.bucket)
            .prefix(&location.key)
            .max_keys(1)
            .send()
            .await
            .map_err(sdk_error("ListObjectsV2"))?;

        Ok(!output.contents().is_empty())
    }

    #[instrument(skip(self, location, path), fields(location = %location))]
    async fn upload_file(&self, location: &ObjectLocation, path: &Path) -> Result<(), ClientError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| ClientError::service("PutObject", e))?;

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(content_type_for(&location.key))
            .body(body)
            .send()
            .await
            .map_err(sdk_error("PutObject"))?;

        debug!("Image uploaded");
        Ok(())
    }
}

pub struct FirehoseStreams {
    client: aws_sdk_firehose::Client,
}

impl FirehoseStreams {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_firehose::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl DeliveryStream for FirehoseStreams {
    async fn put_record(&self, stream_name: &str, data: Vec<u8>) -> Result<(), ClientError> {
        let record = aws_sdk_firehose::types::Record::builder()
            .data(Blob::new(data))
            .build()
            .map_err(|e| ClientError::service("PutRecord", e))?;

        self.client
            .put_record()
            .delivery_stream_name(stream_name)
            .record(record)
            .send()
            .await
            .map_err(sdk_error("PutRecord"))?;

        Ok(())
    }
}

/// Downloads remote media over HTTP(S) with the client's default timeouts
pub struct HttpMediaDownloader {
    client: reqwest::Client,
}

impl HttpMediaDownloader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpMediaDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDownloader for HttpMediaDownloader {
    #[instrument(skip(self, dest))]
    async fn download(&self, url: &str, dest: &Path) -> Result<(), ClientError> {
        let download_error = |e: reqwest::Error| ClientError::Download {
            url: url.to_string(),
            message: e.to_string(),
        };

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download_error)?
            .bytes()
            .await
            .map_err(download_error)?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ClientError::io(dest, e))?;

        debug!(size_bytes = bytes.len(), "Media downloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("tmp/ABC.jpg"), "image/jpeg");
        assert_eq!(content_type_for("tmp/ABC.png"), "image/png");
        assert_eq!(content_type_for("tmp/ABC"), "application/octet-stream");
    }

    #[test]
    fn test_opt_accepts_plain_and_optional_values() {
        assert_eq!(opt::<f32>(0.5), Some(0.5));
        assert_eq!(opt::<f32>(None), None);
    }

    #[test]
    fn test_bounding_box_conversion() {
        let sdk_box = aws_sdk_rekognition::types::BoundingBox::builder()
            .width(0.5)
            .height(0.25)
            .left(0.1)
            .top(0.2)
            .build();

        assert_eq!(
            bounding_box(&sdk_box),
            BoundingBox {
                width: Some(0.5),
                height: Some(0.25),
                left: Some(0.1),
                top: Some(0.2),
            }
        );
    }

    #[test]
    fn test_text_geometry_keeps_polygon() {
        let sdk_geometry = aws_sdk_rekognition::types::Geometry::builder()
            .bounding_box(
                aws_sdk_rekognition::types::BoundingBox::builder()
                    .width(0.5)
                    .height(0.25)
                    .build(),
            )
            .polygon(aws_sdk_rekognition::types::Point::builder().x(0.5).y(0.25).build())
            .polygon(aws_sdk_rekognition::types::Point::builder().x(1.0).y(0.25).build())
            .build();

        let converted = geometry(&sdk_geometry);
        assert_eq!(
            converted.bounding_box,
            Some(BoundingBox {
                width: Some(0.5),
                height: Some(0.25),
                ..Default::default()
            })
        );
        assert_eq!(
            converted.polygon,
            vec![
                Point {
                    x: Some(0.5),
                    y: Some(0.25)
                },
                Point {
                    x: Some(1.0),
                    y: Some(0.25)
                },
            ]
        );
    }

    async fn serve_media() -> String {
        use axum::routing::get;

        let router = axum::Router::new().route(
            "/media/ABC.jpg",
            get(|| async { &b"jpeg-bytes"[..] }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_download_writes_body_to_destination() {
        let base = serve_media().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ABC.jpg");

        HttpMediaDownloader::new()
            .download(&format!("{base}/media/ABC.jpg"), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_download_not_found_is_download_error() {
        let base = serve_media().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("GONE.jpg");
        let url = format!("{base}/media/GONE.jpg");

        let result = HttpMediaDownloader::new().download(&url, &dest).await;

        match result {
            Err(ClientError::Download { url: failed, message }) => {
                assert_eq!(failed, url);
                assert!(message.contains("404"));
            }
            other => panic!("expected download error, got {other:?}"),
        }
        assert!(!dest.exists());
    }
}
