//! Deterministic identity for a file, derived from its metadata only.
//!
//! Name, MIME type, size and modification time; the content is never read.

use crate::errors::{Result, UploadError};
use crate::source::UploadSource;
use sha1::{Digest, Sha1};

/// Builds the identity string `<name>-<type>-<size>-<modified ms>`.
///
/// Non-alphanumeric characters of the name are replaced by `-` and the name
/// is lowercased, so the identity is safe to log and compare.
pub fn identity(source: &dyn UploadSource) -> String {
    let name: String = source
        .name()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();

    format!(
        "{}-{}-{}-{}",
        name,
        source.mime_type(),
        source.size(),
        source.modified().timestamp_millis()
    )
}

/// Extension of `name` after the last `.`.
pub fn extension(name: &str) -> Result<&str> {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Ok(ext),
        _ => Err(UploadError::InvalidName(name.to_string())),
    }
}

/// Storage key for a source: the SHA-1 of its identity, then `.<extension>`.
///
/// Each digest byte is written as hex without zero padding, so a key can be
/// shorter than 40 characters. Keys must match those of the web uploader
/// sharing the same storage API, or its unfinished uploads are never resumed.
pub fn remote_key(source: &dyn UploadSource) -> Result<String> {
    let ext = extension(source.name())?;
    let digest = Sha1::digest(identity(source).as_bytes());
    let hash: String = digest.iter().map(|b| format!("{:x}", b)).collect();
    Ok(format!("{}.{}", hash, ext))
}
