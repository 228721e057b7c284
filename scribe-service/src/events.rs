//! Storage-write event notifications.
//!
//! The wire format follows the S3 event notification layout
//! (`Records[].s3.bucket.name`, `Records[].s3.object.key`) so the worker can be
//! driven by a real bucket notification as well as by the local object store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ServiceError, ServiceResult};
use crate::storage::ObjectRef;

const EVENT_SOURCE: &str = "scribe:storage";
const EVENT_NAME_PUT: &str = "ObjectCreated:Put";

/// A storage-write event as seen by the worker (key already decoded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub object: ObjectRef,
    pub size: Option<u64>,
    pub etag: Option<String>,
    pub event_time: DateTime<Utc>,
}

impl StorageEvent {
    pub fn object_created(object: ObjectRef, size: u64, etag: String) -> Self {
        Self {
            object,
            size: Some(size),
            etag: Some(etag),
            event_time: Utc::now(),
        }
    }

    /// Build the notification payload for this event, with the key encoded
    /// the way bucket notifications encode it.
    pub fn to_notification(&self) -> StorageNotification {
        StorageNotification {
            records: vec![NotificationRecord {
                event_source: Some(EVENT_SOURCE.to_string()),
                event_name: Some(EVENT_NAME_PUT.to_string()),
                event_time: Some(
                    self.event_time
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
                s3: S3Entity {
                    bucket: BucketEntity {
                        name: self.object.bucket.clone(),
                    },
                    object: ObjectEntity {
                        key: encode_object_key(&self.object.key),
                        size: self.size,
                        e_tag: self.etag.clone(),
                    },
                },
            }],
        }
    }
}

/// Notification envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntity {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}

impl StorageNotification {
    /// Decode the first record of the notification.
    ///
    /// Only one object is processed per notification; additional records are
    /// logged and dropped.
    pub fn first_event(&self) -> ServiceResult<StorageEvent> {
        let record = self.records.first().ok_or_else(|| ServiceError::InvalidEvent {
            message: "notification contains no records".to_string(),
        })?;

        if self.records.len() > 1 {
            warn!(
                records = self.records.len(),
                "Storage notification carries more than one record, processing only the first"
            );
        }

        if record.s3.bucket.name.is_empty() {
            return Err(ServiceError::InvalidEvent {
                message: "bucket name is empty".to_string(),
            });
        }

        let key = decode_object_key(&record.s3.object.key)?;
        if key.is_empty() {
            return Err(ServiceError::InvalidEvent {
                message: "object key is empty".to_string(),
            });
        }

        let event_time = record
            .event_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(StorageEvent {
            object: ObjectRef::new(record.s3.bucket.name.clone(), key),
            size: record.s3.object.size,
            etag: record.s3.object.e_tag.clone(),
            event_time,
        })
    }
}

/// Decode a notification object key: `+` is a space, then percent-decoding.
pub fn decode_object_key(raw: &str) -> ServiceResult<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ServiceError::InvalidEvent {
            message: format!("object key {raw:?} is not valid percent-encoded UTF-8: {e}"),
        })
}

/// Inverse of [`decode_object_key`].
pub fn encode_object_key(key: &str) -> String {
    urlencoding::encode(key).replace("%20", "+")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Records": [
            {
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "awsRegion": "us-east-1",
                "eventTime": "2024-05-01T12:30:00.000Z",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "bucket": { "name": "documents", "arn": "arn:aws:s3:::documents" },
                    "object": {
                        "key": "5d3c2a10-4b7e-4a53-9a51-2f0e8d6c1b11_my+scan%281%29.pdf",
                        "size": 2048,
                        "eTag": "abc123"
                    }
                }
            }
        ]
    }"#;

    #[test]
    fn test_first_event_decodes_key() {
        let notification: StorageNotification = serde_json::from_str(SAMPLE).unwrap();
        let event = notification.first_event().unwrap();

        assert_eq!(event.object.bucket, "documents");
        assert_eq!(
            event.object.key,
            "5d3c2a10-4b7e-4a53-9a51-2f0e8d6c1b11_my scan(1).pdf"
        );
        assert_eq!(event.size, Some(2048));
        assert_eq!(event.etag.as_deref(), Some("abc123"));
        assert_eq!(
            event.event_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            "2024-05-01T12:30:00Z"
        );
    }

    #[test]
    fn test_only_first_record_is_used() {
        let json = r#"{"Records": [
            {"s3": {"bucket": {"name": "a"}, "object": {"key": "first.png"}}},
            {"s3": {"bucket": {"name": "b"}, "object": {"key": "second.png"}}}
        ]}"#;
        let notification: StorageNotification = serde_json::from_str(json).unwrap();
        let event = notification.first_event().unwrap();
        assert_eq!(event.object, ObjectRef::new("a", "first.png"));
    }

    #[test]
    fn test_empty_notification_is_rejected() {
        let notification: StorageNotification = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            notification.first_event(),
            Err(ServiceError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_key_is_rejected() {
        assert!(matches!(
            decode_object_key("bad%FF%FEkey"),
            Err(ServiceError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn test_literal_plus_survives_encoding() {
        let key = "id_c++ notes.png";
        let encoded = encode_object_key(key);
        assert_eq!(encoded, "id_c%2B%2B+notes.png");
        assert_eq!(decode_object_key(&encoded).unwrap(), key);
    }

    #[test]
    fn test_to_notification_shape() {
        let event = StorageEvent::object_created(
            ObjectRef::new("documents", "k_photo one.jpg"),
            10,
            "etag".to_string(),
        );
        let json = serde_json::to_value(event.to_notification()).unwrap();
        assert_eq!(json["Records"][0]["s3"]["bucket"]["name"], "documents");
        assert_eq!(json["Records"][0]["s3"]["object"]["key"], "k_photo+one.jpg");
        assert_eq!(json["Records"][0]["s3"]["object"]["eTag"], "etag");
        assert_eq!(json["Records"][0]["eventName"], "ObjectCreated:Put");
    }
}
