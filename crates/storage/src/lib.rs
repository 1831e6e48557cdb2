//! Object storage client for site assets
//!
//! Covers the parts of the Supabase Storage API the site needs: signed
//! direct uploads, signed and public read URLs, and object removal.
//! Bytes never pass through this client; browsers upload straight to the
//! signed URL.

use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("API error: {message} (Status: {status})")]
    ApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl StorageError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::NetworkError(err) => err.status(),
            _ => None,
        }
    }

    /// Storage answers 400 or 404 with "not found" when an object is missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ApiError { message, status } => {
                *status == StatusCode::NOT_FOUND || message.to_lowercase().contains("not found")
            }
            _ => false,
        }
    }
}

/// Credentials for one direct browser upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUpload {
    pub signed_url: String,
    pub token: String,
    pub path: String,
}

/// One entry of a batch signing call. `signed_url` is absent when that
/// path could not be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlEntry {
    pub path: String,
    pub signed_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageClient {
    base_url: String,
    api_key: String,
    http_client: Client,
}

/// Operations scoped to a single bucket.
#[derive(Debug, Clone)]
pub struct StorageBucketClient<'a> {
    parent: &'a StorageClient,
    bucket_id: String,
}

impl StorageClient {
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client,
        }
    }

    pub fn from<'a>(&'a self, bucket_id: &str) -> StorageBucketClient<'a> {
        StorageBucketClient {
            parent: self,
            bucket_id: bucket_id.to_string(),
        }
    }

    fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.base_url)
    }

    /// Storage returns signed URLs relative to `/storage/v1`.
    fn absolute(&self, relative: &str) -> Result<String> {
        if relative.starts_with("http://") || relative.starts_with("https://") {
            return Ok(relative.to_string());
        }
        let joined = format!("{}/{}", self.storage_url(), relative.trim_start_matches('/'));
        Ok(Url::parse(&joined)?.to_string())
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .post(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

impl<'a> StorageBucketClient<'a> {
    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    fn object_url(&self, kind: &str, path: &str) -> Result<String> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(StorageError::InvalidPath("object path is empty".to_string()));
        }
        Ok(format!(
            "{}/object/{}{}/{}",
            self.parent.storage_url(),
            kind,
            self.bucket_id,
            path
        ))
    }

    /// Reserve a one-shot upload URL for `path`.
    pub async fn create_signed_upload_url(&self, path: &str) -> Result<SignedUpload> {
        let url = self.object_url("upload/sign/", path)?;
        debug!("storage sign upload {}", url);

        let response = self.parent.post(&url).json(&json!({})).send().await?;
        let response = check(response).await?;

        #[derive(Deserialize)]
        struct UploadSignResponse {
            url: String,
        }

        let body: UploadSignResponse = response
            .json()
            .await
            .map_err(|e| StorageError::DeserializationError(e.to_string()))?;

        let signed_url = self.parent.absolute(&body.url)?;
        let token = Url::parse(&signed_url)?
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| {
                StorageError::DeserializationError("signed upload url carries no token".to_string())
            })?;

        Ok(SignedUpload {
            signed_url,
            token,
            path: path.trim_start_matches('/').to_string(),
        })
    }

    /// Time-limited read URL for a private object.
    pub async fn create_signed_url(&self, path: &str, expires_in: u64) -> Result<String> {
        let url = self.object_url("sign/", path)?;

        let response = self
            .parent
            .post(&url)
            .json(&json!({ "expiresIn": expires_in }))
            .send()
            .await?;
        let response = check(response).await?;

        #[derive(Deserialize)]
        struct SignedUrlResponse {
            #[serde(rename = "signedURL")]
            signed_url: String,
        }

        let body: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| StorageError::DeserializationError(e.to_string()))?;
        self.parent.absolute(&body.signed_url)
    }

    /// Sign many paths in one call. Per-path failures are reported in the
    /// entries rather than failing the batch.
    pub async fn create_signed_urls(
        &self,
        paths: &[String],
        expires_in: u64,
    ) -> Result<Vec<SignedUrlEntry>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/object/sign/{}", self.parent.storage_url(), self.bucket_id);

        let response = self
            .parent
            .post(&url)
            .json(&json!({ "expiresIn": expires_in, "paths": paths }))
            .send()
            .await?;
        let response = check(response).await?;

        #[derive(Deserialize)]
        struct BatchEntry {
            path: Option<String>,
            #[serde(rename = "signedURL")]
            signed_url: Option<String>,
            error: Option<String>,
        }

        let entries: Vec<BatchEntry> = response
            .json()
            .await
            .map_err(|e| StorageError::DeserializationError(e.to_string()))?;

        entries
            .into_iter()
            .map(|entry| {
                let signed_url = match entry.signed_url {
                    Some(relative) => Some(self.parent.absolute(&relative)?),
                    None => None,
                };
                Ok(SignedUrlEntry {
                    path: entry.path.unwrap_or_default(),
                    signed_url,
                    error: entry.error,
                })
            })
            .collect()
    }

    /// Remove objects. Paths that do not exist are ignored by the server.
    pub async fn remove(&self, paths: &[String]) -> Result<()> {
        let url = format!("{}/object/{}", self.parent.storage_url(), self.bucket_id);

        let response = self
            .parent
            .http_client
            .delete(&url)
            .header("apikey", &self.parent.api_key)
            .header("Authorization", format!("Bearer {}", self.parent.api_key))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub fn get_public_url(&self, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.parent.storage_url(),
            self.bucket_id,
            path.trim_start_matches('/')
        )
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());
    Err(StorageError::ApiError { message, status })
}
