//! Session resolution against Supabase Auth
//!
//! The site never signs users in itself. Browsers hold a Supabase session
//! cookie; this crate reads that cookie, asks the Auth server who the token
//! belongs to, and signs the session out again.

pub mod jwt;
pub mod session;

use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use jwt::{Claims, JwtVerifier};
pub use session::{extract_session, project_ref_from_url, SessionTokens};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {message} (Status: {status})")]
    ApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing session")]
    MissingSession,
}

impl AuthError {
    /// The server rejected the token itself, as opposed to being unreachable.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::ApiError { status, .. } => {
                *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
            }
            Self::InvalidToken(_) | Self::MissingSession => true,
            _ => false,
        }
    }
}

/// User record returned by `/auth/v1/user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    url: String,
    key: String,
    http_client: Client,
}

impl AuthClient {
    pub fn new(url: &str, key: &str, http_client: Client) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
        }
    }

    /// Resolve the user owning `access_token`.
    pub async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::MissingSession);
        }
        let url = format!("{}/auth/v1/user", self.url);
        debug!("auth get_user");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::ApiError { message, status });
        }

        let user_data = response.json::<serde_json::Value>().await?;
        Ok(serde_json::from_value::<User>(user_data)?)
    }

    /// Revoke the session behind `access_token`. An already-expired token
    /// counts as signed out.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let url = format!("{}/auth/v1/logout", self.url);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND
        {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(AuthError::ApiError { message, status })
    }
}
