use async_trait::async_trait;

use topos_storage::StorageClient;

use super::{ObjectStore, SignedUpload, SignedUrlEntry};
use crate::error::Result;

/// One bucket of the project's Supabase Storage.
#[derive(Debug, Clone)]
pub struct SupabaseObjects {
    storage: StorageClient,
    bucket: String,
    public_base: Option<String>,
}

impl SupabaseObjects {
    pub fn new(storage: StorageClient, bucket: &str, public_base: Option<String>) -> Self {
        Self {
            storage,
            bucket: bucket.to_string(),
            public_base,
        }
    }
}

#[async_trait]
impl ObjectStore for SupabaseObjects {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_signed_upload(&self, path: &str) -> Result<SignedUpload> {
        Ok(self
            .storage
            .from(&self.bucket)
            .create_signed_upload_url(path)
            .await?)
    }

    async fn signed_url(&self, path: &str, expires_in: u64) -> Result<String> {
        Ok(self
            .storage
            .from(&self.bucket)
            .create_signed_url(path, expires_in)
            .await?)
    }

    async fn signed_urls(&self, paths: &[String], expires_in: u64) -> Result<Vec<SignedUrlEntry>> {
        Ok(self
            .storage
            .from(&self.bucket)
            .create_signed_urls(paths, expires_in)
            .await?)
    }

    fn public_url(&self, path: &str) -> Option<String> {
        self.public_base
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.storage
            .from(&self.bucket)
            .remove(&[path.to_string()])
            .await?;
        Ok(())
    }
}
