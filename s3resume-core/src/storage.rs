use crate::errors::{Result, UploadError};
use crate::models::{CompletedPart, CreatedUpload, MultipartUpload, UploadedPart};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// The multipart-upload operations the engine needs from the storage service.
///
/// Credentials and bucket selection live behind this trait; the engine only
/// ever sees keys, upload ids and presigned URLs.
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn create_multipart_upload(&self, key: &str) -> Result<CreatedUpload>;

    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<UploadedPart>>;

    async fn list_multipart_uploads(&self) -> Result<Vec<MultipartUpload>>;

    /// One short-lived presigned PUT URL per part number.
    async fn prepare_upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[u32],
    ) -> Result<HashMap<u32, String>>;

    /// Returns the location of the assembled object.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRef<'a> {
    key: &'a str,
    upload_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRequest<'a> {
    key: &'a str,
    upload_id: &'a str,
    parts: &'a [u32],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest<'a> {
    key: &'a str,
    upload_id: &'a str,
    parts: &'a [CompletedPart],
}

#[derive(Deserialize)]
struct PartsResponse {
    #[serde(default)]
    parts: Option<Vec<UploadedPart>>,
}

#[derive(Deserialize)]
struct UploadsResponse {
    #[serde(default, alias = "Uploads")]
    uploads: Option<Vec<MultipartUpload>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignedResponse {
    presigned_urls: HashMap<u32, String>,
}

#[derive(Deserialize)]
struct CompleteResponse {
    #[serde(default)]
    location: Option<String>,
}

/// [`StorageApi`] over the JSON routes under `{base}/api/storage/`.
#[derive(Clone)]
pub struct HttpStorageApi {
    client: Client,
    base: Url,
}

impl HttpStorageApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| UploadError::Config(format!("Invalid storage API URL {base_url}: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub(crate) fn endpoint(&self, operation: &str) -> String {
        format!(
            "{}/api/storage/{}",
            self.base.as_str().trim_end_matches('/'),
            operation
        )
    }
}

/// Turns a non-2xx response into [`UploadError::StorageApi`].
pub(crate) async fn check_status(res: Response) -> Result<Response> {
    if !res.status().is_success() {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        return Err(UploadError::StorageApi { status, body });
    }
    Ok(res)
}

#[async_trait]
impl StorageApi for HttpStorageApi {
    async fn create_multipart_upload(&self, key: &str) -> Result<CreatedUpload> {
        let res = self
            .client
            .post(self.endpoint("createMultipartUpload"))
            .json(&serde_json::json!({ "name": key }))
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<UploadedPart>> {
        let res = self
            .client
            .get(self.endpoint("listParts"))
            .query(&[("key", key), ("uploadId", upload_id)])
            .send()
            .await?;
        let body: PartsResponse = check_status(res).await?.json().await?;
        Ok(body.parts.unwrap_or_default())
    }

    async fn list_multipart_uploads(&self) -> Result<Vec<MultipartUpload>> {
        let res = self
            .client
            .get(self.endpoint("listMultipartUploads"))
            .send()
            .await?;
        let body: UploadsResponse = check_status(res).await?.json().await?;
        Ok(body.uploads.unwrap_or_default())
    }

    async fn prepare_upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[u32],
    ) -> Result<HashMap<u32, String>> {
        let res = self
            .client
            .post(self.endpoint("prepareUploadParts"))
            .json(&PrepareRequest {
                key,
                upload_id,
                parts,
            })
            .send()
            .await?;
        let body: PresignedResponse = check_status(res).await?.json().await?;
        Ok(body.presigned_urls)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        let res = self
            .client
            .post(self.endpoint("completeMultipartUpload"))
            .json(&CompleteRequest {
                key,
                upload_id,
                parts,
            })
            .send()
            .await?;
        let body: CompleteResponse = check_status(res).await?.json().await?;
        Ok(body.location.unwrap_or_default())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let res = self
            .client
            .post(self.endpoint("abortMultipartUpload"))
            .json(&UploadRef { key, upload_id })
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }
}
