//! Image labelling.
//!
//! Every stored image goes through label detection first. The labels found
//! decide which follow-up calls run (see [`FOLLOW_UPS`]), and moderation
//! label detection always runs last. All results are bundled into one
//! [`ImageLabels`] value, serialized with Rekognition's field names.

use crate::clients::{ClientError, ImageRecognition, ObjectLocation};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

// The types below mirror Rekognition's response documents field for field.
// Absent optional fields are left out rather than written as null.

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Point {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Geometry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub polygon: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Label {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub instances: Vec<LabelInstance>,
    pub parents: Vec<Parent>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LabelInstance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextDetection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_text: Option<String>,
    /// `LINE` or `WORD`
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub text_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Landmark {
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub landmark_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pose {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageQuality {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpness: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComparedFace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub landmarks: Vec<Landmark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<ImageQuality>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub emotions: Vec<Emotion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smile: Option<FacialAttribute>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KnownGender {
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub gender_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Celebrity {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<ComparedFace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_gender: Option<KnownGender>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CelebrityRecognition {
    pub unrecognized_faces: Vec<ComparedFace>,
    pub celebrity_faces: Vec<Celebrity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation_correction: Option<String>,
}

/// A boolean facial attribute (smile, eyeglasses, ...) with its confidence
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacialAttribute {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Gender {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Emotion {
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub emotion_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EyeDirection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FaceDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_range: Option<AgeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smile: Option<FacialAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyeglasses: Option<FacialAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunglasses: Option<FacialAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beard: Option<FacialAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mustache: Option<FacialAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes_open: Option<FacialAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mouth_open: Option<FacialAttribute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub emotions: Vec<Emotion>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub landmarks: Vec<Landmark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<ImageQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_occluded: Option<FacialAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye_direction: Option<EyeDirection>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModerationLabel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
}

/// Every vision result for one image
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageLabels {
    pub labels: Vec<Label>,
    pub text_detections: Vec<TextDetection>,
    pub celebrity_recognition: CelebrityRecognition,
    pub face_details: Vec<FaceDetail>,
    pub moderation_labels: Vec<ModerationLabel>,
}

/// Vision calls that only run when a specific label was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    DetectText,
    RecognizeCelebrities,
    DetectFaces,
}

/// Label name -> calls it triggers. Calls run in table order.
pub const FOLLOW_UPS: &[(&str, &[FollowUp])] = &[
    ("Text", &[FollowUp::DetectText]),
    (
        "Person",
        &[FollowUp::RecognizeCelebrities, FollowUp::DetectFaces],
    ),
];

/// Follow-up calls required by a set of detected labels
pub fn follow_ups(labels: &[Label]) -> Vec<FollowUp> {
    FOLLOW_UPS
        .iter()
        .filter(|(trigger, _)| labels.iter().any(|label| label.name == *trigger))
        .flat_map(|(_, calls)| calls.iter().copied())
        .collect()
}

/// Runs the vision call sequence against images already in the bucket
pub struct ImageLabeler {
    vision: Arc<dyn ImageRecognition>,
    max_labels: i32,
    min_confidence: f32,
}

impl ImageLabeler {
    pub fn new(vision: Arc<dyn ImageRecognition>, max_labels: i32, min_confidence: f32) -> Self {
        Self {
            vision,
            max_labels,
            min_confidence,
        }
    }

    /// Label one image. Any failing call fails the whole bundle.
    #[instrument(skip(self, image), fields(image = %image))]
    pub async fn label(&self, image: &ObjectLocation) -> Result<ImageLabels, ClientError> {
        let labels = self
            .vision
            .detect_labels(image, self.max_labels, self.min_confidence)
            .await?;

        let mut bundle = ImageLabels {
            labels,
            ..Default::default()
        };

        for call in follow_ups(&bundle.labels) {
            debug!(call = ?call, "Running follow-up vision call");
            match call {
                FollowUp::DetectText => {
                    bundle.text_detections = self.vision.detect_text(image).await?;
                }
                FollowUp::RecognizeCelebrities => {
                    bundle.celebrity_recognition = self.vision.recognize_celebrities(image).await?;
                }
                FollowUp::DetectFaces => {
                    bundle.face_details = self.vision.detect_faces(image).await?;
                }
            }
        }

        bundle.moderation_labels = self.vision.detect_moderation_labels(image).await?;

        info!(
            labels = bundle.labels.len(),
            moderation_labels = bundle.moderation_labels.len(),
            "Processed: {}",
            image
        );

        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockImageRecognition;
    use mockall::Sequence;
    use serde_json::json;

    fn label(name: &str) -> Label {
        Label {
            name: name.to_string(),
            confidence: Some(98.5),
            ..Default::default()
        }
    }

    fn image() -> ObjectLocation {
        ObjectLocation::new("bucket", "tmp/ABC.jpg")
    }

    #[test]
    fn test_follow_ups_decision_table() {
        assert!(follow_ups(&[label("Tree")]).is_empty());
        assert_eq!(follow_ups(&[label("Text")]), vec![FollowUp::DetectText]);
        assert_eq!(
            follow_ups(&[label("Person")]),
            vec![FollowUp::RecognizeCelebrities, FollowUp::DetectFaces]
        );
        assert_eq!(
            follow_ups(&[label("Person"), label("Text")]),
            vec![
                FollowUp::DetectText,
                FollowUp::RecognizeCelebrities,
                FollowUp::DetectFaces
            ]
        );
    }

    #[test]
    fn test_label_names_are_case_sensitive() {
        assert!(follow_ups(&[label("person"), label("TEXT")]).is_empty());
    }

    #[tokio::test]
    async fn test_label_without_follow_ups() {
        let mut vision = MockImageRecognition::new();
        let mut seq = Sequence::new();
        vision
            .expect_detect_labels()
            .withf(|_, max, min| *max == 100 && *min == 50.0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(vec![label("Tree")]));
        vision
            .expect_detect_moderation_labels()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));

        let labeler = ImageLabeler::new(Arc::new(vision), 100, 50.0);
        let bundle = labeler.label(&image()).await.unwrap();

        assert_eq!(bundle.labels, vec![label("Tree")]);
        assert!(bundle.text_detections.is_empty());
        assert!(bundle.face_details.is_empty());
        assert_eq!(bundle.celebrity_recognition, CelebrityRecognition::default());
    }

    #[tokio::test]
    async fn test_label_person_and_text_runs_every_call() {
        let mut vision = MockImageRecognition::new();
        let mut seq = Sequence::new();
        vision
            .expect_detect_labels()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(vec![label("Person"), label("Text")]));
        vision
            .expect_detect_text()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![TextDetection {
                    detected_text: Some("HELLO".to_string()),
                    text_type: Some("LINE".to_string()),
                    ..Default::default()
                }])
            });
        vision
            .expect_recognize_celebrities()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(CelebrityRecognition {
                    celebrity_faces: vec![Celebrity {
                        name: Some("Someone Famous".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                })
            });
        vision
            .expect_detect_faces()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![FaceDetail::default()]));
        vision
            .expect_detect_moderation_labels()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![ModerationLabel {
                    name: Some("Suggestive".to_string()),
                    ..Default::default()
                }])
            });

        let labeler = ImageLabeler::new(Arc::new(vision), 100, 50.0);
        let bundle = labeler.label(&image()).await.unwrap();

        assert_eq!(bundle.text_detections.len(), 1);
        assert_eq!(bundle.celebrity_recognition.celebrity_faces.len(), 1);
        assert_eq!(bundle.face_details.len(), 1);
        assert_eq!(bundle.moderation_labels.len(), 1);
    }

    #[tokio::test]
    async fn test_label_detection_failure_stops_sequence() {
        let mut vision = MockImageRecognition::new();
        vision
            .expect_detect_labels()
            .times(1)
            .returning(|_, _, _| Err(ClientError::service("DetectLabels", "AccessDenied")));

        let labeler = ImageLabeler::new(Arc::new(vision), 100, 50.0);
        let result = labeler.label(&image()).await;

        assert!(matches!(
            result,
            Err(ClientError::Service {
                operation: "DetectLabels",
                ..
            })
        ));
    }

    #[test]
    fn test_bundle_uses_rekognition_field_names() {
        let bundle = ImageLabels {
            labels: vec![Label {
                name: "Car".to_string(),
                confidence: Some(99.5),
                parents: vec![Parent {
                    name: Some("Vehicle".to_string()),
                }],
                ..Default::default()
            }],
            text_detections: vec![TextDetection {
                detected_text: Some("HI".to_string()),
                text_type: Some("LINE".to_string()),
                geometry: Some(Geometry {
                    bounding_box: Some(BoundingBox {
                        width: Some(0.5),
                        height: Some(0.25),
                        left: Some(0.0),
                        top: Some(0.5),
                    }),
                    polygon: vec![Point {
                        x: Some(0.0),
                        y: Some(0.5),
                    }],
                }),
                ..Default::default()
            }],
            celebrity_recognition: CelebrityRecognition {
                celebrity_faces: vec![Celebrity {
                    name: Some("Someone Famous".to_string()),
                    known_gender: Some(KnownGender {
                        gender_type: Some("Female".to_string()),
                    }),
                    face: Some(ComparedFace {
                        pose: Some(Pose {
                            roll: Some(1.0),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
            face_details: vec![FaceDetail {
                landmarks: vec![Landmark {
                    landmark_type: Some("eyeLeft".to_string()),
                    x: Some(0.25),
                    y: Some(0.5),
                }],
                quality: Some(ImageQuality {
                    brightness: Some(75.0),
                    sharpness: Some(50.0),
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&bundle).unwrap();

        assert_eq!(
            value["Labels"][0],
            json!({"Name": "Car", "Confidence": 99.5, "Instances": [], "Parents": [{"Name": "Vehicle"}]})
        );
        assert_eq!(
            value["TextDetections"][0],
            json!({
                "DetectedText": "HI",
                "Type": "LINE",
                "Geometry": {
                    "BoundingBox": {"Width": 0.5, "Height": 0.25, "Left": 0.0, "Top": 0.5},
                    "Polygon": [{"X": 0.0, "Y": 0.5}]
                }
            })
        );
        assert_eq!(
            value["CelebrityRecognition"],
            json!({
                "UnrecognizedFaces": [],
                "CelebrityFaces": [{
                    "Urls": [],
                    "Name": "Someone Famous",
                    "Face": {"Pose": {"Roll": 1.0}},
                    "KnownGender": {"Type": "Female"}
                }]
            })
        );
        assert_eq!(
            value["FaceDetails"][0],
            json!({
                "Landmarks": [{"Type": "eyeLeft", "X": 0.25, "Y": 0.5}],
                "Quality": {"Brightness": 75.0, "Sharpness": 50.0}
            })
        );
        assert_eq!(value["ModerationLabels"], json!([]));
    }
}
