#![allow(dead_code)]

pub mod stub;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use s3resume_core::{
    ByteProgress, CompletedPart, Config, CreatedUpload, MemorySource, MultipartUpload, NewObject,
    ObjectRecord, ObjectRegistry, PartTransport, Result, StorageApi, UploadError, UploadedPart,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;

pub fn config() -> Config {
    Config::new("http://storage.test")
}

pub fn file(name: &str, size: usize) -> Arc<MemorySource> {
    let modified = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    Arc::new(MemorySource::new(
        name,
        "text/plain",
        modified,
        Bytes::from(vec![1u8; size]),
    ))
}

fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

pub fn part_number(url: &str) -> u32 {
    query_param(url, "partNumber").and_then(|n| n.parse().ok()).unwrap()
}

/// In-memory multipart service. Parts are stored when a PUT succeeds, the
/// way S3 keeps them regardless of what the client does afterwards.
#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<MultipartUpload>>,
    pub parts: Mutex<HashMap<String, Vec<UploadedPart>>>,
    pub completed: Mutex<Vec<(String, String, Vec<CompletedPart>)>>,
    pub aborted: Mutex<Vec<String>>,
    pub presigned: Mutex<Vec<Vec<u32>>>,
    pub created: AtomicU32,
    pub list_calls: AtomicU32,
    pub fail_list_uploads: AtomicBool,
    pub fail_complete: AtomicBool,
    signature: AtomicU32,
}

impl FakeStorage {
    pub fn store_part(&self, upload_id: &str, part: UploadedPart) {
        let mut parts = self.parts.lock().unwrap();
        let list = parts.entry(upload_id.to_string()).or_default();
        list.retain(|p| p.part_number != part.part_number);
        list.push(part);
        list.sort_by_key(|p| p.part_number);
    }

    pub fn stored_part_numbers(&self, upload_id: &str) -> Vec<u32> {
        let parts = self.parts.lock().unwrap();
        parts
            .get(upload_id)
            .map(|l| l.iter().map(|p| p.part_number).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageApi for FakeStorage {
    async fn create_multipart_upload(&self, key: &str) -> Result<CreatedUpload> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let upload_id = format!("upload-{n}");
        self.uploads.lock().unwrap().push(MultipartUpload {
            key: key.to_string(),
            upload_id: upload_id.clone(),
            initiated: Some(Utc.timestamp_opt(1_700_000_000 + i64::from(n), 0).unwrap()),
        });
        Ok(CreatedUpload {
            upload_id,
            key: key.to_string(),
        })
    }

    async fn list_parts(&self, _key: &str, upload_id: &str) -> Result<Vec<UploadedPart>> {
        Ok(self
            .parts
            .lock()
            .unwrap()
            .get(upload_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_multipart_uploads(&self) -> Result<Vec<MultipartUpload>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_uploads.load(Ordering::SeqCst) {
            return Err(UploadError::StorageApi {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(self.uploads.lock().unwrap().clone())
    }

    async fn prepare_upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[u32],
    ) -> Result<HashMap<u32, String>> {
        self.presigned.lock().unwrap().push(parts.to_vec());
        let sig = self.signature.fetch_add(1, Ordering::SeqCst);
        Ok(parts
            .iter()
            .map(|&n| {
                (
                    n,
                    format!("http://bucket.test/{key}?partNumber={n}&uploadId={upload_id}&sig={sig}"),
                )
            })
            .collect())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(UploadError::StorageApi {
                status: 500,
                body: "InternalError".into(),
            });
        }
        self.completed
            .lock()
            .unwrap()
            .push((key.to_string(), upload_id.to_string(), parts.to_vec()));
        self.uploads.lock().unwrap().retain(|u| u.upload_id != upload_id);
        Ok(format!("http://bucket.test/{key}"))
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> Result<()> {
        self.aborted.lock().unwrap().push(upload_id.to_string());
        self.uploads.lock().unwrap().retain(|u| u.upload_id != upload_id);
        self.parts.lock().unwrap().remove(upload_id);
        Ok(())
    }
}

/// Scriptable part transport backed by a [`FakeStorage`].
pub struct FakeTransport {
    storage: Arc<FakeStorage>,
    pub calls: Mutex<Vec<String>>,
    /// Part numbers that always fail.
    pub failing_parts: Mutex<HashSet<u32>>,
    /// Keys whose parts always fail.
    pub failing_keys: Mutex<HashSet<String>>,
    /// Number of leading calls that fail, whatever the part.
    pub fail_first: AtomicUsize,
    /// Bytes reported before a failing call errors out.
    pub report_before_failure: Mutex<Option<u64>>,
    pub hang: AtomicBool,
    pub delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeTransport {
    pub fn new(storage: Arc<FakeStorage>) -> Self {
        Self {
            storage,
            calls: Mutex::new(Vec::new()),
            failing_parts: Mutex::new(HashSet::new()),
            failing_keys: Mutex::new(HashSet::new()),
            fail_first: AtomicUsize::new(0),
            report_before_failure: Mutex::new(None),
            hang: AtomicBool::new(false),
            delay: Duration::from_millis(5),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for_part(&self, number: u32) -> usize {
        self.calls().iter().filter(|u| part_number(u) == number).count()
    }

    fn should_fail(&self, url: &str, call_index: usize) -> bool {
        if call_index < self.fail_first.load(Ordering::SeqCst) {
            return true;
        }
        if self.failing_parts.lock().unwrap().contains(&part_number(url)) {
            return true;
        }
        self.failing_keys
            .lock()
            .unwrap()
            .iter()
            .any(|key| url.contains(key.as_str()))
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PartTransport for FakeTransport {
    async fn put_part(&self, url: &str, data: Bytes, on_progress: ByteProgress) -> Result<String> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(url.to_string());
            calls.len() - 1
        };

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(self.delay).await;

        if self.should_fail(url, call_index) {
            let reported = *self.report_before_failure.lock().unwrap();
            if let Some(bytes) = reported {
                on_progress(bytes);
            }
            return Err(UploadError::StorageApi {
                status: 400,
                body: format!("part {} rejected", part_number(url)),
            });
        }

        let size = data.len() as u64;
        on_progress(size / 2);
        on_progress(size);

        let number = part_number(url);
        let etag = format!("\"etag-{number}\"");
        let upload_id = query_param(url, "uploadId").unwrap_or_default().to_string();
        self.storage.store_part(
            &upload_id,
            UploadedPart {
                part_number: number,
                etag: etag.clone(),
                size,
            },
        );
        Ok(etag)
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    pub objects: Mutex<Vec<NewObject>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ObjectRegistry for FakeRegistry {
    async fn register_object(&self, object: NewObject) -> Result<ObjectRecord> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UploadError::StorageApi {
                status: 500,
                body: "database unavailable".into(),
            });
        }
        self.objects.lock().unwrap().push(object.clone());
        Ok(ObjectRecord {
            id: object.id,
            name: object.name,
            mime_type: object.mime_type,
            size: object.size,
        })
    }
}
