use crate::errors::{Result, UploadError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{header, Body, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Receives the cumulative number of bytes sent for one part.
pub type ByteProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// Body frames handed to the connection: 64 KiB.
const FRAME_SIZE: usize = 65_536;

/// Sends one part's bytes to a presigned URL and returns its ETag.
#[async_trait]
pub trait PartTransport: Send + Sync {
    async fn put_part(&self, url: &str, data: Bytes, on_progress: ByteProgress) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpPartTransport {
    client: Client,
}

impl HttpPartTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

fn frames(data: &Bytes) -> Vec<Bytes> {
    (0..data.len())
        .step_by(FRAME_SIZE)
        .map(|start| data.slice(start..(start + FRAME_SIZE).min(data.len())))
        .collect()
}

#[async_trait]
impl PartTransport for HttpPartTransport {
    async fn put_part(&self, url: &str, data: Bytes, on_progress: ByteProgress) -> Result<String> {
        let total = data.len() as u64;

        // Counted as the connection pulls frames, not when the server acks.
        let mut sent = 0u64;
        let stream = futures::stream::iter(frames(&data)).map(move |frame| {
            sent += frame.len() as u64;
            on_progress(sent);
            Ok::<Bytes, std::io::Error>(frame)
        });

        let res = self
            .client
            .put(url)
            .header(header::CONTENT_LENGTH, total)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;

        if res.status() != StatusCode::OK {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(UploadError::StorageApi { status, body });
        }

        res.headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::StorageApi {
                status: StatusCode::OK.as_u16(),
                body: "part upload response has no ETag header".to_string(),
            })
    }
}
