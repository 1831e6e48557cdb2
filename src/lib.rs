//! Topos Collective site backend
//!
//! Serves the public portfolio (projects, units, gallery) and the staff CMS
//! that edits it. Rows live in a Supabase Postgres reached through PostgREST,
//! photos in a Supabase Storage bucket uploaded to directly by the browser
//! through signed URLs.

pub mod api;
pub mod cascade;
pub mod catalog;
pub mod client;
pub mod collection;
pub mod config;
pub mod contact;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod model;
pub mod ordering;
pub mod projects;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod upload;
pub mod validation;
pub mod view;

use reqwest::Client;

use topos_auth::AuthClient;
use topos_postgrest::PostgrestClient;
use topos_storage::StorageClient;

/// Handles to one Supabase project, sharing a single HTTP client.
#[derive(Debug, Clone)]
pub struct Supabase {
    /// The base URL for the Supabase project
    pub url: String,
    /// API key sent with every request
    pub key: String,
    /// HTTP client used for requests
    pub http_client: Client,
}

impl Supabase {
    /// Create a new Supabase handle
    ///
    /// # Example
    ///
    /// ```
    /// use topos_site::Supabase;
    ///
    /// let supabase = Supabase::new("https://abcd.supabase.co", "service-key", reqwest::Client::new());
    /// let query = supabase.from("projects");
    /// ```
    pub fn new(supabase_url: &str, supabase_key: &str, http_client: Client) -> Self {
        Self {
            url: supabase_url.trim_end_matches('/').to_string(),
            key: supabase_key.to_string(),
            http_client,
        }
    }

    /// Query builder on a table or view
    pub fn from(&self, table: &str) -> PostgrestClient {
        PostgrestClient::new(&self.url, &self.key, table, self.http_client.clone())
    }

    pub fn storage(&self) -> StorageClient {
        StorageClient::new(&self.url, &self.key, self.http_client.clone())
    }

    /// Auth client authenticating with `key` instead of the handle's own.
    pub fn auth(&self, key: &str) -> AuthClient {
        AuthClient::new(&self.url, key, self.http_client.clone())
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::SiteConfig;
    pub use crate::error::{Error, Result};
    pub use crate::state::AppState;
    pub use crate::Supabase;
}
