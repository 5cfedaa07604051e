use crate::chunk::Chunk;
use crate::errors::{Result, UploadError};
use crate::models::CompletedPart;
use crate::source::UploadSource;
use crate::storage::StorageApi;
use crate::transport::{ByteProgress, PartTransport};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::sync::Arc;

/// Receives `(part number, bytes sent so far)` for every transport progress event.
pub type ChunkProgressFn = Arc<dyn Fn(u32, u64) + Send + Sync>;

/// Uploads one batch of chunks concurrently, all-or-nothing.
#[derive(Clone)]
pub struct TransferExecutor {
    storage: Arc<dyn StorageApi>,
    transport: Arc<dyn PartTransport>,
}

impl TransferExecutor {
    pub fn new(storage: Arc<dyn StorageApi>, transport: Arc<dyn PartTransport>) -> Self {
        Self { storage, transport }
    }

    /// Presigns every chunk, PUTs them all at once and waits for every
    /// transfer to settle.
    ///
    /// Fails with [`UploadError::BatchTransfer`] if any chunk fails, even when
    /// others went through: their ETags are discarded and they are sent
    /// again on the next attempt. On success the parts are ordered by number.
    pub async fn send_batch(
        &self,
        key: &str,
        upload_id: &str,
        source: &dyn UploadSource,
        chunks: &[Chunk],
        on_progress: ChunkProgressFn,
    ) -> Result<Vec<CompletedPart>> {
        let numbers: Vec<u32> = chunks.iter().map(|c| c.number).collect();

        let urls = self
            .storage
            .prepare_upload_parts(key, upload_id, &numbers)
            .await
            .map_err(|e| batch_error(&numbers, e))?;

        let mut transfers = FuturesUnordered::new();
        for chunk in chunks {
            let url = urls.get(&chunk.number).cloned().ok_or_else(|| UploadError::BatchTransfer {
                parts: numbers.clone(),
                reason: format!("no presigned URL for part {}", chunk.number),
            })?;

            let transport = Arc::clone(&self.transport);
            let progress = Arc::clone(&on_progress);
            let number = chunk.number;
            let range = chunk.range.clone();

            transfers.push(async move {
                let data = source.read_range(range).await?;
                let report: ByteProgress = Arc::new(move |sent| progress(number, sent));
                let etag = transport.put_part(&url, data, report).await?;
                Ok::<CompletedPart, UploadError>(CompletedPart {
                    part_number: number,
                    etag,
                })
            });
        }

        let mut parts = Vec::with_capacity(chunks.len());
        let mut first_error: Option<UploadError> = None;
        let mut failed = 0usize;

        // Drain everything: a slow chunk holds the batch even after another failed.
        while let Some(result) = transfers.next().await {
            match result {
                Ok(part) => parts.push(part),
                Err(e) => {
                    failed += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            log::debug!(
                "Batch {:?} of {} failed ({} of {} parts): {}",
                numbers,
                key,
                failed,
                numbers.len(),
                err
            );
            return Err(batch_error(&numbers, err));
        }

        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }
}

fn batch_error(numbers: &[u32], err: UploadError) -> UploadError {
    match err {
        UploadError::BatchTransfer { .. } => err,
        other => UploadError::BatchTransfer {
            parts: numbers.to_vec(),
            reason: other.to_string(),
        },
    }
}
