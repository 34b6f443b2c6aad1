use std::time::{Duration, Instant};

use anyhow::Context;
use log::debug;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{KeyValueStore, StoreError};

const STORAGE_API: &str = "https://storage.googleapis.com";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// A Google Cloud Storage bucket accessed through the JSON API.
pub struct GcsStore {
    client: reqwest::Client,
    bucket: String,
    token: TokenSource,
}

enum TokenSource {
    Static(String),
    /// Tokens of the service account the instance runs as, renewed shortly before expiry.
    Metadata(Mutex<Option<(String, Instant)>>),
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

impl GcsStore {
    pub fn new(bucket: String, access_token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let token = match access_token {
            Some(token) => TokenSource::Static(token),
            None => TokenSource::Metadata(Mutex::new(None)),
        };
        Ok(Self {
            client,
            bucket,
            token,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{STORAGE_API}/storage/v1/b/{}/o/{}?alt=media",
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key),
        )
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{STORAGE_API}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key),
        )
    }

    async fn access_token(&self) -> Result<String, StoreError> {
        let cache = match &self.token {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata(cache) => cache,
        };
        let mut cache = cache.lock().await;
        if let Some((token, valid_until)) = &*cache {
            if Instant::now() < *valid_until {
                return Ok(token.clone());
            }
        }
        let token = self
            .fetch_metadata_token()
            .await
            .map_err(StoreError::Token)?;
        debug!("Obtained a storage access token valid for {}s", token.expires_in);
        let valid_until = Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60));
        *cache = Some((token.access_token.clone(), valid_until));
        Ok(token.access_token)
    }

    async fn fetch_metadata_token(&self) -> anyhow::Result<MetadataToken> {
        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("Metadata server is unreachable")?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn check_status(
        key: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            key: key.to_owned(),
            status,
            body,
        })
    }
}

impl KeyValueStore for GcsStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let request_error = |error| StoreError::Request {
            key: key.to_owned(),
            error,
        };
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(self.access_token().await?)
            .send()
            .await
            .map_err(request_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(key, response).await?;
        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(self.access_token().await?)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(value)
            .send()
            .await
            .map_err(|error| StoreError::Request {
                key: key.to_owned(),
                error,
            })?;
        Self::check_status(key, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::GcsStore;

    #[test]
    fn object_names_are_percent_encoded() {
        let store = GcsStore::new("bank-data".into(), Some("token".into())).unwrap();
        assert_eq!(
            store.object_url("sessions/main"),
            "https://storage.googleapis.com/storage/v1/b/bank-data/o/sessions%2Fmain?alt=media"
        );
        assert_eq!(
            store.upload_url("last_request_time"),
            "https://storage.googleapis.com/upload/storage/v1/b/bank-data/o?uploadType=media&name=last_request_time"
        );
    }
}
