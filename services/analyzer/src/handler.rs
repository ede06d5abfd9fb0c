//! Lambda entry point for S3 "object created" notifications.

use crate::clients::ObjectLocation;
use crate::pipeline::{BatchSummary, TweetAnalyzer};
use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{Error, LambdaEvent};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug, PartialEq)]
pub enum EventError {
    #[error("S3 event contains no records")]
    NoRecords,

    #[error("S3 event record {index} has no {field}")]
    MissingField { index: usize, field: &'static str },
}

/// Bucket and key of every object named by the event, in record order
///
/// Keys are used as delivered. S3 URL-encodes them in notifications, so a
/// key containing spaces or `=` is not found when fetched.
pub fn object_locations(event: &S3Event) -> Result<Vec<ObjectLocation>, EventError> {
    if event.records.is_empty() {
        return Err(EventError::NoRecords);
    }

    event
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let bucket = record
                .s3
                .bucket
                .name
                .clone()
                .ok_or(EventError::MissingField {
                    index,
                    field: "bucket name",
                })?;
            let key = record
                .s3
                .object
                .key
                .clone()
                .ok_or(EventError::MissingField {
                    index,
                    field: "object key",
                })?;
            Ok(ObjectLocation::new(bucket, key))
        })
        .collect()
}

/// Analyze every batch file named by the notification.
///
/// Errors are returned to the Lambda runtime so the invocation is reported
/// as failed and retried by the platform.
#[instrument(skip(event, analyzer), fields(request_id = %event.context.request_id))]
pub async fn function_handler(
    event: LambdaEvent<S3Event>,
    analyzer: &TweetAnalyzer,
) -> Result<BatchSummary, Error> {
    let locations = object_locations(&event.payload)?;

    let mut summary = BatchSummary::default();
    for location in &locations {
        info!(bucket = %location.bucket, key = %location.key, "Processing batch file");
        summary.merge(analyzer.process_object(location).await?);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s3_event(bucket: &str, key: &str) -> serde_json::Value {
        json!({
            "Records": [{
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "awsRegion": "us-east-1",
                "eventTime": "2019-08-27T15:00:00.000Z",
                "eventName": "ObjectCreated:Put",
                "userIdentity": {"principalId": "AWS:AIDAEXAMPLE"},
                "requestParameters": {"sourceIPAddress": "127.0.0.1"},
                "responseElements": {
                    "x-amz-request-id": "C3D13FE58DE4C810",
                    "x-amz-id-2": "FMyUVURIY8/IgAtTv8xRjskZQpcIZ9KG4V5Wp6S7S/JRWeUWerMUE5JgHvANOjpD"
                },
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "configurationId": "TriggerRawProcessing",
                    "bucket": {
                        "name": bucket,
                        "ownerIdentity": {"principalId": "A3NL1KOZZKExample"},
                        "arn": format!("arn:aws:s3:::{bucket}")
                    },
                    "object": {
                        "key": key,
                        "size": 1024,
                        "eTag": "d41d8cd98f00b204e9800998ecf8427e",
                        "sequencer": "0055AED6DCD90281E5"
                    }
                }
            }]
        })
    }

    #[test]
    fn test_object_locations_from_notification() {
        let event: S3Event =
            serde_json::from_value(s3_event("social-media-raw", "raw/2019/08/27/15/batch-1"))
                .unwrap();

        assert_eq!(
            object_locations(&event).unwrap(),
            vec![ObjectLocation::new(
                "social-media-raw",
                "raw/2019/08/27/15/batch-1"
            )]
        );
    }

    #[test]
    fn test_object_locations_requires_records() {
        let event: S3Event = serde_json::from_value(json!({"Records": []})).unwrap();
        assert_eq!(object_locations(&event), Err(EventError::NoRecords));
    }
}
