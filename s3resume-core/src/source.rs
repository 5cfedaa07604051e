use crate::errors::{Result, UploadError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A re-readable byte source with fixed metadata.
///
/// Implementations must return the same bytes for the same range for as long
/// as the upload lives; the engine reads a range again on every retry.
#[async_trait]
pub trait UploadSource: Send + Sync {
    fn name(&self) -> &str;
    fn mime_type(&self) -> &str;
    fn size(&self) -> u64;
    fn modified(&self) -> DateTime<Utc>;
    async fn read_range(&self, range: Range<u64>) -> Result<Bytes>;
}

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    mime_type: String,
    size: u64,
    modified: DateTime<Utc>,
}

impl LocalFile {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let modified: DateTime<Utc> = metadata.modified()?.into();

        Ok(Self {
            mime_type: guess_mime_type(&name).to_string(),
            path,
            name,
            size: metadata.len(),
            modified,
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UploadSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Bytes> {
        let mut file = File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(range.start)).await?;

        let mut buffer = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buffer).await?;

        log::debug!(
            "Read {} bytes {}..{} from {}",
            buffer.len(),
            range.start,
            range.end,
            self.path.display()
        );
        Ok(Bytes::from(buffer))
    }
}

/// An in-memory source, mainly for tests and piped input.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    mime_type: String,
    modified: DateTime<Utc>,
    data: Bytes,
}

impl MemorySource {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        modified: DateTime<Utc>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            modified,
            data: data.into(),
        }
    }
}

#[async_trait]
impl UploadSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Bytes> {
        if range.end > self.size() || range.start > range.end {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("range {}..{} outside {} bytes", range.start, range.end, self.size()),
            )));
        }
        Ok(self.data.slice(range.start as usize..range.end as usize))
    }
}

fn guess_mime_type(name: &str) -> mime::Mime {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" => mime::TEXT_PLAIN,
        "csv" => mime::TEXT_CSV,
        "html" | "htm" => mime::TEXT_HTML,
        "json" => mime::APPLICATION_JSON,
        "pdf" => mime::APPLICATION_PDF,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "svg" => mime::IMAGE_SVG,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
