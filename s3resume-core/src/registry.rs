use crate::errors::{Result, UploadError};
use crate::models::{NewObject, ObjectRecord};
use crate::storage::check_status;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Records metadata of finished uploads. Optional; owned by another service.
#[async_trait]
pub trait ObjectRegistry: Send + Sync {
    async fn register_object(&self, object: NewObject) -> Result<ObjectRecord>;
}

#[derive(Deserialize)]
struct RegisterResponse {
    object: ObjectRecord,
}

#[derive(Clone)]
pub struct HttpObjectRegistry {
    client: Client,
    endpoint: String,
}

impl HttpObjectRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| UploadError::Config(format!("Invalid registry URL {base_url}: {e}")))?;
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: format!(
                "{}/api/storage/objects",
                base.as_str().trim_end_matches('/')
            ),
        })
    }
}

#[async_trait]
impl ObjectRegistry for HttpObjectRegistry {
    async fn register_object(&self, mut object: NewObject) -> Result<ObjectRecord> {
        if object.mime_type.is_empty() {
            object.mime_type = mime::APPLICATION_OCTET_STREAM.to_string();
        }

        let res = self.client.post(&self.endpoint).json(&object).send().await?;
        let body: RegisterResponse = check_status(res).await?.json().await?;
        Ok(body.object)
    }
}
