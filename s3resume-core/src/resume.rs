use crate::errors::{Result, UploadError};
use crate::identity::remote_key;
use crate::models::{MultipartUpload, UploadedPart};
use crate::source::UploadSource;
use crate::storage::StorageApi;

/// Where an upload starts: a fresh multipart upload or an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub key: String,
    pub upload_id: String,
    /// Parts the server already holds; empty for a fresh start.
    pub parts: Vec<UploadedPart>,
    pub resumed: bool,
}

/// Resumes the first remote upload whose key matches the source's remote
/// key, or opens a new multipart upload for it.
///
/// `remote_uploads` is a snapshot of in-progress uploads taken by the
/// caller. Storage failures surface as [`UploadError::ResumeResolution`].
pub async fn resolve(
    source: &dyn UploadSource,
    remote_uploads: &[MultipartUpload],
    storage: &dyn StorageApi,
) -> Result<Resolved> {
    let key = remote_key(source)?;
    let resolution_error = |e: UploadError| UploadError::ResumeResolution {
        key: key.clone(),
        reason: e.to_string(),
    };

    if let Some(existing) = remote_uploads.iter().find(|u| u.key == key) {
        let parts = storage
            .list_parts(&existing.key, &existing.upload_id)
            .await
            .map_err(resolution_error)?;

        log::info!(
            "Resuming {} ({}): {} part(s) already uploaded",
            key,
            existing.upload_id,
            parts.len()
        );
        return Ok(Resolved {
            key,
            upload_id: existing.upload_id.clone(),
            parts,
            resumed: true,
        });
    }

    let created = storage
        .create_multipart_upload(&key)
        .await
        .map_err(resolution_error)?;
    if created.key != key {
        log::warn!(
            "Storage API answered key {} for requested key {}; keeping {}",
            created.key,
            key,
            key
        );
    }

    log::info!("Started multipart upload {} for {}", created.upload_id, key);
    Ok(Resolved {
        key,
        upload_id: created.upload_id,
        parts: Vec::new(),
        resumed: false,
    })
}
