use crate::chunk::{ChunkPlan, ChunkPolicy};
use crate::config::Config;
use crate::errors::{ErrorKind, Result, UploadError};
use crate::identity::remote_key;
use crate::models::{NewObject, UploadEvent, UploadId, UploadSnapshot, UploadState, UploadStatus};
use crate::progress::ProgressTracker;
use crate::registry::ObjectRegistry;
use crate::resume::resolve;
use crate::retry::RetryPolicy;
use crate::source::UploadSource;
use crate::storage::StorageApi;
use crate::transfer::{ChunkProgressFn, TransferExecutor};
use crate::transport::PartTransport;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// What the transfer of a batch reports back to the queue driver.
enum Signal {
    Attempt(u32),
    Progress { number: u32, loaded: u64 },
}

struct UploadEntry {
    id: UploadId,
    source: Arc<dyn UploadSource>,
    remote_key: String,
    upload_id: Option<String>,
    state: UploadState,
    ready: bool,
    progress: ProgressTracker,
    cancel: CancellationToken,
    error: Option<String>,
    error_kind: Option<ErrorKind>,
    registration_error: Option<String>,
    location: Option<String>,
}

impl UploadEntry {
    fn snapshot(&self) -> UploadSnapshot {
        let complete = self.state == UploadState::Complete;
        UploadSnapshot {
            id: self.id,
            name: self.source.name().to_string(),
            remote_key: self.remote_key.clone(),
            state: self.state,
            percentage: if complete { 100 } else { self.progress.percentage() },
            ready: self.ready,
            speed: self.progress.speed(self.state == UploadState::Uploading),
            complete,
            error: self.error.clone(),
            registration_error: self.registration_error.clone(),
            bytes_uploaded: self.progress.bytes_uploaded(),
            total_bytes: self.progress.total_size(),
        }
    }
}

/// Counts of what one [`UploadQueue::run`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub removed: usize,
}

/// Serial queue of uploads: one file at a time, a window of chunks in
/// parallel within that file.
pub struct UploadQueue {
    storage: Arc<dyn StorageApi>,
    executor: TransferExecutor,
    registry: Option<Arc<dyn ObjectRegistry>>,
    events: Option<mpsc::Sender<UploadEvent>>,
    policy: ChunkPolicy,
    retry: RetryPolicy,
    window: usize,
    uploads: RwLock<Vec<UploadEntry>>,
    next_id: AtomicU64,
    running: AtomicBool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl UploadQueue {
    pub fn new(
        config: &Config,
        storage: Arc<dyn StorageApi>,
        transport: Arc<dyn PartTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            executor: TransferExecutor::new(Arc::clone(&storage), transport),
            storage,
            registry: None,
            events: None,
            policy: ChunkPolicy::from(config),
            retry: RetryPolicy::new(config.max_retries),
            window: config.window,
            uploads: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
        })
    }

    pub fn with_registry(mut self, registry: Arc<dyn ObjectRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sends lifecycle events to `sender`.
    ///
    /// State events are sent with `send().await` and wait for channel room;
    /// progress events are dropped when the channel is full. The receiver
    /// must be drained while [`run`](Self::run) is in progress, or `run`
    /// stalls once the channel fills up.
    pub fn with_events(mut self, sender: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    // =======================================================================
    // Queue surface
    // =======================================================================

    /// Queues a file. Fails without queueing when no remote key can be derived.
    pub async fn add(&self, source: Arc<dyn UploadSource>) -> Result<UploadId> {
        let key = remote_key(source.as_ref())?;
        let id = UploadId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let entry = UploadEntry {
            id,
            progress: ProgressTracker::new(source.size(), 0),
            source,
            remote_key: key,
            upload_id: None,
            state: UploadState::Queued,
            ready: false,
            cancel: CancellationToken::new(),
            error: None,
            error_kind: None,
            registration_error: None,
            location: None,
        };
        log::debug!("Queued {} as {} ({})", entry.source.name(), id, entry.remote_key);
        self.uploads.write().await.push(entry);

        self.emit(id, UploadStatus::Queued).await;
        Ok(id)
    }

    pub async fn add_all(&self, sources: Vec<Arc<dyn UploadSource>>) -> Vec<Result<UploadId>> {
        let mut ids = Vec::with_capacity(sources.len());
        for source in sources {
            ids.push(self.add(source).await);
        }
        ids
    }

    /// Drops an upload from the queue.
    ///
    /// A queued upload never starts. An active one has its in-flight
    /// transfers aborted and disappears once the driver has stopped it;
    /// nothing of its unfinished batch is counted as uploaded. An upload
    /// whose completion call has already succeeded stays `Complete`.
    pub async fn remove(&self, id: UploadId) -> Result<()> {
        {
            let mut uploads = self.uploads.write().await;
            let index = uploads
                .iter()
                .position(|u| u.id == id)
                .ok_or(UploadError::UploadNotFound(id.0))?;

            if uploads[index].state.is_active() {
                log::info!("Cancelling active upload {}", id);
                uploads[index].cancel.cancel();
                return Ok(());
            }
            uploads.remove(index);
        }

        self.emit(id, UploadStatus::Removed).await;
        Ok(())
    }

    pub async fn snapshot(&self, id: UploadId) -> Option<UploadSnapshot> {
        let uploads = self.uploads.read().await;
        uploads.iter().find(|u| u.id == id).map(UploadEntry::snapshot)
    }

    pub async fn snapshots(&self) -> Vec<UploadSnapshot> {
        let uploads = self.uploads.read().await;
        uploads.iter().map(UploadEntry::snapshot).collect()
    }

    /// Location reported by the storage service for a completed upload.
    pub async fn location(&self, id: UploadId) -> Option<String> {
        let uploads = self.uploads.read().await;
        uploads.iter().find(|u| u.id == id).and_then(|u| u.location.clone())
    }

    /// The failure class of a failed upload.
    pub async fn error_kind(&self, id: UploadId) -> Option<ErrorKind> {
        let uploads = self.uploads.read().await;
        uploads.iter().find(|u| u.id == id).and_then(|u| u.error_kind)
    }

    /// Starts the queue: uploads queued files one after another until none
    /// is left. Files added while running are picked up in order.
    ///
    /// A failed file does not stop the queue. Only one `run` may be active.
    pub async fn run(&self) -> Result<RunSummary> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(UploadError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);
        let mut summary = RunSummary::default();

        while let Some((id, source, cancel)) = self.claim_next().await {
            // Once completion has succeeded the object exists remotely: a late
            // removal no longer turns it into a dropped upload.
            match self.process(id, source.as_ref(), &cancel).await {
                Ok(location) => {
                    summary.completed += 1;
                    self.register(id, source.as_ref()).await;
                    log::debug!("{} available at {}", id, location);
                }
                Err(UploadError::Cancelled) => {
                    self.drop_entry(id).await;
                    summary.removed += 1;
                }
                Err(e) => {
                    log::error!("Upload {} ({}) failed: {}", id, source.name(), e);
                    self.update(id, |u| {
                        u.state = UploadState::Failed;
                        u.error_kind = Some(e.kind());
                        u.error = Some(e.to_string());
                        u.progress.freeze();
                    })
                    .await;
                    self.emit(id, UploadStatus::Failed { error: e.to_string() }).await;
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    // =======================================================================
    // Driver
    // =======================================================================

    /// Moves the first queued upload to `Resuming`.
    async fn claim_next(&self) -> Option<(UploadId, Arc<dyn UploadSource>, CancellationToken)> {
        let claimed = {
            let mut uploads = self.uploads.write().await;
            let entry = uploads.iter_mut().find(|u| u.state == UploadState::Queued)?;
            entry.state = UploadState::Resuming;
            (entry.id, Arc::clone(&entry.source), entry.cancel.clone())
        };
        log::info!("Resuming {} ({})", claimed.0, claimed.1.name());
        self.emit(claimed.0, UploadStatus::Resuming).await;
        Some(claimed)
    }

    async fn process(
        &self,
        id: UploadId,
        source: &dyn UploadSource,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let key = remote_key(source)?;

        // The remote snapshot is taken now, not when the file was added.
        let resolved = cancellable(cancel, async {
            let remote = self.storage.list_multipart_uploads().await.map_err(|e| {
                UploadError::ResumeResolution {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            })?;
            resolve(source, &remote, self.storage.as_ref()).await
        })
        .await?;

        let mut plan = ChunkPlan::new(source.size(), &resolved.parts, self.policy);
        let total_chunks = plan.len() as u32;
        let resumed_parts = plan.completed_count();

        self.update(id, |u| {
            u.upload_id = Some(resolved.upload_id.clone());
            u.progress = ProgressTracker::new(plan.total_size(), plan.completed_bytes());
            u.state = UploadState::Uploading;
            u.ready = true;
        })
        .await;
        self.emit(
            id,
            UploadStatus::Started {
                total_size: plan.total_size(),
                total_chunks,
                resumed_parts,
            },
        )
        .await;

        loop {
            let window = plan.next_window(self.window);
            if window.is_empty() {
                break;
            }

            let now = Instant::now();
            self.update(id, |u| u.progress.start_batch(&window, now)).await;
            log::debug!(
                "{}: sending parts {:?}",
                id,
                window.iter().map(|c| c.number).collect::<Vec<_>>()
            );

            let (tx, mut rx) = mpsc::unbounded_channel();
            let outcome = {
                let executor = &self.executor;
                let key = resolved.key.as_str();
                let upload_id = resolved.upload_id.as_str();
                let chunks = window.as_slice();

                let batch = self.retry.run(move |attempt| {
                    let _ = tx.send(Signal::Attempt(attempt));
                    let progress_tx = tx.clone();
                    let on_progress: ChunkProgressFn = Arc::new(move |number, loaded| {
                        let _ = progress_tx.send(Signal::Progress { number, loaded });
                    });
                    executor.send_batch(key, upload_id, source, chunks, on_progress)
                });
                tokio::pin!(batch);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break Err(UploadError::Cancelled),
                        Some(signal) = rx.recv() => self.apply(id, signal).await,
                        result = &mut batch => break result,
                    }
                }
            };

            match outcome {
                Ok(parts) => {
                    while let Ok(signal) = rx.try_recv() {
                        self.apply(id, signal).await;
                    }
                    plan.mark_complete(&parts);

                    let (speed, percentage, bytes) = self
                        .update(id, |u| {
                            let speed = u.progress.end_batch(Instant::now());
                            (speed, u.progress.percentage(), u.progress.bytes_uploaded())
                        })
                        .await
                        .unwrap_or_default();
                    log::debug!("{}: batch done at {:.0} B/s", id, speed);

                    self.emit(
                        id,
                        UploadStatus::BatchCompleted {
                            completed_chunks: plan.completed_count() as u32,
                            total_chunks,
                            speed,
                        },
                    )
                    .await;
                    self.emit_progress(id, percentage, bytes);
                }
                Err(UploadError::Cancelled) => {
                    self.update(id, |u| u.progress.abort_batch()).await;
                    return Err(UploadError::Cancelled);
                }
                Err(e) => {
                    while let Ok(signal) = rx.try_recv() {
                        self.apply(id, signal).await;
                    }
                    return Err(e);
                }
            }
        }

        let location = cancellable(cancel, async {
            self.storage
                .complete_multipart_upload(&resolved.key, &resolved.upload_id, &plan.completed_parts())
                .await
                .map_err(|e| UploadError::Completion {
                    upload_id: resolved.upload_id.clone(),
                    reason: e.to_string(),
                })
        })
        .await?;

        log::info!("Completed {} as {}", source.name(), resolved.key);
        self.update(id, |u| {
            u.state = UploadState::Complete;
            u.location = Some(location.clone());
        })
        .await;
        self.emit(
            id,
            UploadStatus::Completed {
                location: location.clone(),
            },
        )
        .await;
        Ok(location)
    }

    /// Writes the finished object's metadata. Failures are recorded on the
    /// upload but leave it `Complete`.
    async fn register(&self, id: UploadId, source: &dyn UploadSource) {
        let Some(registry) = &self.registry else {
            return;
        };
        let Some(key) = self.snapshot(id).await.map(|s| s.remote_key) else {
            return;
        };

        let object = NewObject {
            id: key.clone(),
            name: source.name().to_string(),
            mime_type: source.mime_type().to_string(),
            size: source.size(),
        };

        match registry.register_object(object).await {
            Ok(_) => self.emit(id, UploadStatus::Registered).await,
            Err(e) => {
                let err = UploadError::Registration {
                    id: key,
                    reason: e.to_string(),
                };
                log::warn!("{}", err);
                self.update(id, |u| u.registration_error = Some(err.to_string()))
                    .await;
                self.emit(
                    id,
                    UploadStatus::RegistrationFailed {
                        error: err.to_string(),
                    },
                )
                .await;
            }
        }
    }

    async fn apply(&self, id: UploadId, signal: Signal) {
        match signal {
            Signal::Attempt(0) => {}
            Signal::Attempt(n) => {
                log::debug!("{}: retry {} of current batch", id, n);
                self.update(id, |u| u.progress.restart_batch(Instant::now()))
                    .await;
            }
            Signal::Progress { number, loaded } => {
                let update = self
                    .update(id, |u| {
                        if !u.progress.chunk_progress(number, loaded) {
                            log::debug!("{}: ignored progress {} for part {}", id, loaded, number);
                        }
                        (u.progress.percentage(), u.progress.bytes_uploaded())
                    })
                    .await;
                if let Some((percentage, bytes)) = update {
                    self.emit_progress(id, percentage, bytes);
                }
            }
        }
    }

    async fn update<T>(&self, id: UploadId, f: impl FnOnce(&mut UploadEntry) -> T) -> Option<T> {
        let mut uploads = self.uploads.write().await;
        uploads.iter_mut().find(|u| u.id == id).map(f)
    }

    async fn drop_entry(&self, id: UploadId) {
        log::info!("Removed {} while uploading", id);
        self.uploads.write().await.retain(|u| u.id != id);
        self.emit(id, UploadStatus::Removed).await;
    }

    async fn emit(&self, upload: UploadId, status: UploadStatus) {
        if let Some(sender) = &self.events {
            let _ = sender.send(UploadEvent { upload, status }).await;
        }
    }

    fn emit_progress(&self, upload: UploadId, percentage: u8, bytes: u64) {
        if let Some(sender) = &self.events {
            let _ = sender.try_send(UploadEvent {
                upload,
                status: UploadStatus::Progress { percentage, bytes },
            });
        }
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UploadError::Cancelled),
        result = fut => result,
    }
}
