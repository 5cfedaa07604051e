use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid file name '{0}': no extension to derive a remote key from")]
    InvalidName(String),

    #[error("Could not resolve multipart upload for {key}: {reason}")]
    ResumeResolution { key: String, reason: String },

    #[error("Batch transfer failed for parts {parts:?}: {reason}")]
    BatchTransfer { parts: Vec<u32>, reason: String },

    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("Completing multipart upload {upload_id} failed: {reason}")]
    Completion { upload_id: String, reason: String },

    #[error("Registering object {id} failed: {reason}")]
    Registration { id: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage API error ({status}): {body}")]
    StorageApi { status: u16, body: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Upload not found: {0}")]
    UploadNotFound(u64),

    #[error("Upload queue is already running")]
    AlreadyRunning,
}

/// The class of failure, as reported on a file's observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Identity,
    ResumeResolution,
    BatchTransfer,
    Completion,
    Registration,
    Cancelled,
    Other,
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::InvalidName(_) => ErrorKind::Identity,
            UploadError::ResumeResolution { .. } => ErrorKind::ResumeResolution,
            UploadError::BatchTransfer { .. } | UploadError::RetryExhausted { .. } => {
                ErrorKind::BatchTransfer
            }
            UploadError::Completion { .. } => ErrorKind::Completion,
            UploadError::Registration { .. } => ErrorKind::Registration,
            UploadError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
