use crate::errors::Result;
use crate::storage::StorageApi;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};

/// Parallel list-parts calls when building the report.
const MAX_PARALLEL_LISTS: usize = 8;

/// An unfinished multipart upload still held by the storage provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub key: String,
    pub upload_id: String,
    pub initiated: Option<DateTime<Utc>>,
    pub parts_completed: usize,
    pub bytes_completed: u64,
}

/// Lists in-progress multipart uploads with their part counts, newest first.
pub async fn list_pending(storage: &dyn StorageApi) -> Result<Vec<PendingUpload>> {
    let uploads = storage.list_multipart_uploads().await?;

    let mut pending: Vec<PendingUpload> = stream::iter(uploads)
        .map(|upload| async move {
            let parts = storage.list_parts(&upload.key, &upload.upload_id).await?;
            Ok::<_, crate::errors::UploadError>(PendingUpload {
                parts_completed: parts.len(),
                bytes_completed: parts.iter().map(|p| p.size).sum(),
                key: upload.key,
                upload_id: upload.upload_id,
                initiated: upload.initiated,
            })
        })
        .buffered(MAX_PARALLEL_LISTS)
        .try_collect()
        .await?;

    // Stable sort: uploads without a timestamp keep their order, at the end.
    pending.sort_by(|a, b| match (a.initiated, b.initiated) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    Ok(pending)
}

/// Aborts every in-progress multipart upload. Returns how many were aborted.
pub async fn abort_all(storage: &dyn StorageApi) -> Result<usize> {
    let uploads = storage.list_multipart_uploads().await?;
    let count = uploads.len();

    for upload in uploads {
        storage
            .abort_multipart_upload(&upload.key, &upload.upload_id)
            .await?;
        log::info!("Aborted {} ({})", upload.key, upload.upload_id);
    }
    Ok(count)
}

/// Human age of an upload: "3 hours", "1 minute", "42 seconds".
pub fn format_age(initiated: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const INTERVALS: [(&str, i64); 5] = [
        ("year", 365 * 24 * 60 * 60),
        ("month", 30 * 24 * 60 * 60),
        ("day", 24 * 60 * 60),
        ("hour", 60 * 60),
        ("minute", 60),
    ];

    let seconds = (now - initiated).num_seconds().max(0);
    for (label, length) in INTERVALS {
        let count = seconds / length;
        if count >= 1 {
            return format!("{} {}{}", count, label, if count > 1 { "s" } else { "" });
        }
    }
    format!("{} seconds", seconds)
}
