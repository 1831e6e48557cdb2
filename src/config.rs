//! Configuration for the site backend

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::Error;

pub const DEFAULT_BUCKET: &str = "project-assets";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
pub const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";
pub const SMTP2GO_SEND_URL: &str = "https://api.smtp2go.com/v3/email/send";

/// Where rows and objects live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgREST and Storage of a Supabase project
    Supabase,
    /// Process-local tables, lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(Self::Supabase),
            "memory" => Ok(Self::Memory),
            other => Err(Error::config(format!("unknown STORE_BACKEND '{}'", other))),
        }
    }
}

/// Configuration options for the site backend
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    /// Verifies session tokens locally instead of asking the Auth server
    pub supabase_jwt_secret: Option<String>,
    pub storage_bucket: String,
    /// Bearer token accepted as an admin on every gated endpoint
    pub admin_api_token: Option<String>,
    pub turnstile_secret_key: Option<String>,
    pub turnstile_verify_url: String,
    pub smtp2go_api_key: Option<String>,
    pub smtp2go_send_url: String,
    pub smtp2go_from_email: Option<String>,
    pub contact_email: Option<String>,
    pub sender_name: String,
    pub maps_api_key: Option<String>,
    pub bind_address: String,
    pub signed_url_ttl: Duration,
    pub store_backend: StoreBackend,
    pub request_timeout: Option<Duration>,
    pub contact_rate_limit: u32,
    pub contact_rate_window: Duration,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: None,
            storage_bucket: DEFAULT_BUCKET.to_string(),
            admin_api_token: None,
            turnstile_secret_key: None,
            turnstile_verify_url: TURNSTILE_VERIFY_URL.to_string(),
            smtp2go_api_key: None,
            smtp2go_send_url: SMTP2GO_SEND_URL.to_string(),
            smtp2go_from_email: None,
            contact_email: None,
            sender_name: "Topos Collective".to_string(),
            maps_api_key: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            signed_url_ttl: Duration::from_secs(3600),
            store_backend: StoreBackend::Memory,
            request_timeout: Some(Duration::from_secs(30)),
            contact_rate_limit: 3,
            contact_rate_window: Duration::from_secs(15 * 60),
        }
    }
}

impl SiteConfig {
    /// Read settings from the environment, loading `.env` first when present.
    pub fn from_env() -> Result<Self, Error> {
        if dotenvy::dotenv().is_ok() {
            info!("Loaded settings from .env");
        }

        let defaults = Self::default();
        let store_backend = match optional("STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => StoreBackend::Supabase,
        };

        let (supabase_url, supabase_anon_key, supabase_service_role_key) = match store_backend {
            StoreBackend::Supabase => (
                required("SUPABASE_URL")?,
                required("SUPABASE_ANON_KEY")?,
                required("SUPABASE_SERVICE_ROLE_KEY")?,
            ),
            StoreBackend::Memory => (
                optional("SUPABASE_URL").unwrap_or_default(),
                optional("SUPABASE_ANON_KEY").unwrap_or_default(),
                optional("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
            ),
        };

        let request_timeout = match optional("REQUEST_TIMEOUT_SECS") {
            Some(value) => match parse::<u64>("REQUEST_TIMEOUT_SECS", &value)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => defaults.request_timeout,
        };

        let signed_url_ttl = match optional("SIGNED_URL_TTL_SECS") {
            Some(value) => Duration::from_secs(parse("SIGNED_URL_TTL_SECS", &value)?),
            None => defaults.signed_url_ttl,
        };

        let config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_service_role_key,
            supabase_jwt_secret: optional("SUPABASE_JWT_SECRET"),
            storage_bucket: optional("PROJECT_STORAGE_BUCKET").unwrap_or(defaults.storage_bucket),
            admin_api_token: optional("ADMIN_API_TOKEN"),
            turnstile_secret_key: optional("TURNSTILE_SECRET_KEY"),
            smtp2go_api_key: optional("SMTP2GO_API_KEY"),
            smtp2go_from_email: optional("SMTP2GO_FROM_EMAIL"),
            contact_email: optional("CONTACT_EMAIL"),
            maps_api_key: optional("GOOGLE_MAPS_API_KEY"),
            bind_address: optional("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            signed_url_ttl,
            store_backend,
            request_timeout,
            ..defaults
        };

        if config.turnstile_secret_key.is_none() {
            warn!("TURNSTILE_SECRET_KEY not set, contact submissions skip bot verification");
        }
        if config.smtp2go_api_key.is_none() {
            warn!("SMTP2GO_API_KEY not set, contact submissions will fail");
        }

        Ok(config)
    }

    pub fn with_supabase(mut self, url: &str, anon_key: &str, service_role_key: &str) -> Self {
        self.supabase_url = url.trim_end_matches('/').to_string();
        self.supabase_anon_key = anon_key.to_string();
        self.supabase_service_role_key = service_role_key.to_string();
        self
    }

    pub fn with_jwt_secret(mut self, value: Option<&str>) -> Self {
        self.supabase_jwt_secret = value.map(str::to_string);
        self
    }

    pub fn with_storage_bucket(mut self, value: &str) -> Self {
        self.storage_bucket = value.to_string();
        self
    }

    pub fn with_admin_api_token(mut self, value: Option<&str>) -> Self {
        self.admin_api_token = value.map(str::to_string);
        self
    }

    pub fn with_turnstile(mut self, secret: Option<&str>, verify_url: &str) -> Self {
        self.turnstile_secret_key = secret.map(str::to_string);
        self.turnstile_verify_url = verify_url.to_string();
        self
    }

    pub fn with_smtp2go(mut self, api_key: Option<&str>, send_url: &str) -> Self {
        self.smtp2go_api_key = api_key.map(str::to_string);
        self.smtp2go_send_url = send_url.to_string();
        self
    }

    pub fn with_contact_addresses(mut self, from: &str, to: &str) -> Self {
        self.smtp2go_from_email = Some(from.to_string());
        self.contact_email = Some(to.to_string());
        self
    }

    pub fn with_maps_api_key(mut self, value: Option<&str>) -> Self {
        self.maps_api_key = value.map(str::to_string);
        self
    }

    pub fn with_bind_address(mut self, value: &str) -> Self {
        self.bind_address = value.to_string();
        self
    }

    pub fn with_signed_url_ttl(mut self, value: Duration) -> Self {
        self.signed_url_ttl = value;
        self
    }

    pub fn with_store_backend(mut self, value: StoreBackend) -> Self {
        self.store_backend = value;
        self
    }

    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn with_contact_rate_limit(mut self, limit: u32, window: Duration) -> Self {
        self.contact_rate_limit = limit;
        self.contact_rate_window = window;
        self
    }

    /// `{SUPABASE_URL}/storage/v1/object/public/{bucket}`, or `None` without a project URL.
    pub fn public_base_url(&self) -> Option<String> {
        if self.supabase_url.is_empty() {
            return None;
        }
        Some(format!(
            "{}/storage/v1/object/public/{}",
            self.supabase_url.trim_end_matches('/'),
            self.storage_bucket
        ))
    }

    /// HTTP client honoring the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(key: &str) -> Result<String, Error> {
    optional(key).ok_or_else(|| Error::config(format!("{} must be set", key)))
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, Error>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(format!("invalid {} value '{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(" Supabase ".parse::<StoreBackend>().unwrap(), StoreBackend::Supabase);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_public_base_url() {
        let config = SiteConfig::default();
        assert_eq!(config.public_base_url(), None);

        let config = config
            .with_supabase("https://abcd.supabase.co/", "anon", "service")
            .with_storage_bucket("assets");
        assert_eq!(
            config.public_base_url().as_deref(),
            Some("https://abcd.supabase.co/storage/v1/object/public/assets")
        );
    }

    #[test]
    fn test_defaults() {
        let config = SiteConfig::default();
        assert_eq!(config.storage_bucket, DEFAULT_BUCKET);
        assert_eq!(config.contact_rate_limit, 3);
        assert_eq!(config.contact_rate_window, Duration::from_secs(900));
        assert_eq!(config.signed_url_ttl, Duration::from_secs(3600));
    }
}
