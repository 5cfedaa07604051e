use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A part the storage provider has already acknowledged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
}

/// A part as listed in the complete-multipart-upload request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// An in-progress multipart upload on the remote side.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    #[serde(rename = "Initiated", default, skip_serializing_if = "Option::is_none")]
    pub initiated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUpload {
    pub upload_id: String,
    pub key: String,
}

/// Metadata written to the object registry once an upload completes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NewObject {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ObjectRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
}

/// Handle to one file in an [`UploadQueue`](crate::UploadQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UploadId(pub u64);

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    Queued,
    Resuming,
    Uploading,
    Complete,
    Failed,
}

impl UploadState {
    pub fn is_active(self) -> bool {
        matches!(self, UploadState::Resuming | UploadState::Uploading)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Complete | UploadState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedSnapshot {
    pub calculating: bool,
    /// Bytes per second.
    pub raw: f64,
    pub readable: String,
}

/// Point-in-time view of one upload, for whatever renders the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSnapshot {
    pub id: UploadId,
    pub name: String,
    pub remote_key: String,
    pub state: UploadState,
    pub percentage: u8,
    /// The chunk plan exists and percentages are meaningful.
    pub ready: bool,
    pub speed: SpeedSnapshot,
    pub complete: bool,
    pub error: Option<String>,
    pub registration_error: Option<String>,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadEvent {
    pub upload: UploadId,
    pub status: UploadStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum UploadStatus {
    Queued,
    Resuming,
    Started {
        total_size: u64,
        total_chunks: u32,
        resumed_parts: usize,
    },
    Progress {
        percentage: u8,
        bytes: u64,
    },
    BatchCompleted {
        completed_chunks: u32,
        total_chunks: u32,
        speed: f64,
    },
    Completed {
        location: String,
    },
    Registered,
    RegistrationFailed {
        error: String,
    },
    Failed {
        error: String,
    },
    Removed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_use_s3_field_names() {
        let part: UploadedPart =
            serde_json::from_str(r#"{"PartNumber": 2, "ETag": "\"abc\"", "Size": 5}"#).unwrap();
        assert_eq!(part.part_number, 2);
        assert_eq!(part.etag, "\"abc\"");
        assert_eq!(part.size, 5);
    }

    #[test]
    fn multipart_upload_initiated_is_optional() {
        let upload: MultipartUpload =
            serde_json::from_str(r#"{"Key": "k.txt", "UploadId": "u1"}"#).unwrap();
        assert!(upload.initiated.is_none());

        let upload: MultipartUpload = serde_json::from_str(
            r#"{"Key": "k.txt", "UploadId": "u1", "Initiated": "2023-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert!(upload.initiated.is_some());
    }

    #[test]
    fn new_object_serializes_type_field() {
        let json = serde_json::to_value(NewObject {
            id: "k.txt".into(),
            name: "a.txt".into(),
            mime_type: "text/plain".into(),
            size: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "text/plain");
    }
}
