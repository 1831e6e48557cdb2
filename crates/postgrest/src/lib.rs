//! PostgREST client for the site store
//!
//! A small by-value query builder over the PostgREST HTTP interface that
//! Supabase exposes under `/rest/v1`.
//!
//! # Features
//!
//! - Query API (`execute`, `insert`, `update`, `upsert`, `delete`)
//! - Filtering (`eq`, `neq`, `in_list`)
//! - Ordering and limits
//! - Structured API errors, so callers can react to schema drift
//!   (`42703` undefined column, `PGRST200` missing relationship)

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Postgres error code for an undefined column.
pub const UNDEFINED_COLUMN: &str = "42703";
/// Postgres error code for an undefined table.
pub const UNDEFINED_TABLE: &str = "42P01";
/// Postgres error code for a unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";
/// PostgREST error code when an embedded relationship cannot be resolved.
pub const MISSING_RELATIONSHIP: &str = "PGRST200";
/// PostgREST error code when a referenced column is not in the schema cache.
pub const SCHEMA_CACHE_COLUMN: &str = "PGRST204";

/// Error body returned by PostgREST.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ApiError { status, .. } | Self::UnparsedApiError { status, .. } => Some(*status),
            Self::NetworkError(err) => err.status(),
            _ => None,
        }
    }

    /// Postgres / PostgREST error code (`42703`, `PGRST200`, ...).
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::ApiError { details, .. } => details.code.as_deref(),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION)
    }

    /// True when the server rejected the query because of the schema
    /// (unknown column, table or relationship) rather than the data.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(
            self.code(),
            Some(UNDEFINED_COLUMN)
                | Some(UNDEFINED_TABLE)
                | Some(MISSING_RELATIONSHIP)
                | Some(SCHEMA_CACHE_COLUMN)
        )
    }

    /// Lower-cased message, details and hint joined together.
    pub fn text(&self) -> String {
        match self {
            Self::ApiError { details, .. } => [&details.message, &details.details, &details.hint]
                .iter()
                .filter_map(|part| part.as_deref())
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            Self::UnparsedApiError { message, .. } => message.to_lowercase(),
            other => other.to_string().to_lowercase(),
        }
    }

    /// Whether the error text names `needle` (case-insensitive).
    pub fn mentions(&self, needle: &str) -> bool {
        self.text().contains(&needle.to_lowercase())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// PostgREST client bound to one table.
///
/// Builder methods consume and return the client, so a query reads as a
/// chain: `client.select("id").eq("unit_id", id).order(...).execute()`.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
}

impl PostgrestClient {
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value.clone());
            if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
                headers.insert("Authorization", bearer);
            }
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns (and embedded relations) to return.
    pub fn select(mut self, columns: &str) -> Self {
        self.query_params.retain(|(key, _)| key != "select");
        self.query_params
            .push(("select".to_string(), compact_select(columns)));
        self
    }

    pub fn eq(self, column: &str, value: &str) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: &str) -> Self {
        self.filter(column, "neq", value)
    }

    /// Column value is one of `values`. Values are quoted so ids containing
    /// reserved characters survive the round trip.
    pub fn in_list(self, column: &str, values: &[&str]) -> Self {
        let quoted: Vec<String> = values
            .iter()
            .map(|value| format!("\"{}\"", value.replace('"', "\\\"")))
            .collect();
        let list = format!("({})", quoted.join(","));
        self.filter(column, "in", &list)
    }

    /// Append an ordering term; repeated calls add tie-breakers.
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        let term = format!("{}.{}", column, order.as_str());
        match self.query_params.iter_mut().find(|(key, _)| key == "order") {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(&term);
            }
            None => self.query_params.push(("order".to_string(), term)),
        }
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.query_params.retain(|(key, _)| key != "limit");
        self.query_params
            .push(("limit".to_string(), count.to_string()));
        self
    }

    fn filter(mut self, column: &str, operator: &str, value: &str) -> Self {
        self.query_params
            .push((column.to_string(), format!("{}.{}", operator, value)));
        self
    }

    fn has_filter(&self) -> bool {
        self.query_params
            .iter()
            .any(|(key, _)| !matches!(key.as_str(), "select" | "order" | "limit" | "on_conflict"))
    }

    fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        body: Option<Vec<u8>>,
        prefer: Option<&'static str>,
    ) -> Result<Response, PostgrestError> {
        let url = self.build_url()?;
        debug!("postgrest {} {}", method, url);

        let mut headers = self.headers.clone();
        if let Some(prefer) = prefer {
            headers.insert(HeaderName::from_static("prefer"), HeaderValue::from_static(prefer));
        }

        let mut request = self
            .http_client
            .request(method, url.as_str())
            .headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// Fetch matching rows.
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self.send(Method::GET, None, None).await?;
        read_rows(response).await
    }

    /// Fetch at most one row.
    pub async fn execute_one<T: DeserializeOwned>(self) -> Result<Option<T>, PostgrestError> {
        let rows = self.limit(1).execute::<T>().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row or an array of rows and return the stored representation.
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        let body = serde_json::to_vec(values)?;
        let response = self
            .send(Method::POST, Some(body), Some("return=representation"))
            .await?;
        read_rows(response).await
    }

    /// Insert, merging into an existing row when `on_conflict` collides.
    pub async fn upsert<T: Serialize, R: DeserializeOwned>(
        mut self,
        values: &T,
        on_conflict: &str,
    ) -> Result<Vec<R>, PostgrestError> {
        self.query_params
            .push(("on_conflict".to_string(), on_conflict.to_string()));
        let body = serde_json::to_vec(values)?;
        let response = self
            .send(
                Method::POST,
                Some(body),
                Some("resolution=merge-duplicates,return=representation"),
            )
            .await?;
        read_rows(response).await
    }

    /// Patch every row matching the filters. Refuses to run unfiltered.
    pub async fn update<T: Serialize, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        if !self.has_filter() {
            return Err(PostgrestError::InvalidParameters(format!(
                "update on {} requires a filter",
                self.table
            )));
        }
        let body = serde_json::to_vec(values)?;
        let response = self
            .send(Method::PATCH, Some(body), Some("return=representation"))
            .await?;
        read_rows(response).await
    }

    /// Delete every row matching the filters. Refuses to run unfiltered.
    pub async fn delete<R: DeserializeOwned>(&self) -> Result<Vec<R>, PostgrestError> {
        if !self.has_filter() {
            return Err(PostgrestError::InvalidParameters(format!(
                "delete on {} requires a filter",
                self.table
            )));
        }
        let response = self
            .send(Method::DELETE, None, Some("return=representation"))
            .await?;
        read_rows(response).await
    }
}

/// Strip the whitespace that multi-line select templates carry.
fn compact_select(columns: &str) -> String {
    columns.split_whitespace().collect::<Vec<_>>().join("")
}

async fn read_rows<R: DeserializeOwned>(response: Response) -> Result<Vec<R>, PostgrestError> {
    let body_text = response.text().await.map_err(|e| {
        PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
    })?;

    // 204 No Content and `return=minimal` both come back empty.
    if body_text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(&body_text)
        .map_err(|e| PostgrestError::DeserializationError(e.to_string()))?;
    let rows = match value {
        serde_json::Value::Array(_) => value,
        single => serde_json::Value::Array(vec![single]),
    };
    serde_json::from_value(rows).map_err(|e| PostgrestError::DeserializationError(e.to_string()))
}

async fn error_from_response(response: Response) -> PostgrestError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
        Ok(details) if details.code.is_some() || details.message.is_some() => {
            PostgrestError::ApiError { details, status }
        }
        _ => PostgrestError::UnparsedApiError {
            message: error_text,
            status,
        },
    }
}
