//! Admin-side client of the collection endpoints.
//!
//! [`AdminApi`] speaks the response envelope and turns failures back into
//! [`Error`]s; [`OrderedList`] keeps an editor's drag order stable while
//! writes are in flight.

mod ordered;

pub use ordered::OrderedList;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchBuilder};
use crate::model::{Photo, PhotoRole};
use crate::store::CollectionScope;

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

/// Rebuild the server-side error from a failed envelope.
fn envelope_error(status: u16, envelope: Envelope) -> Error {
    let message = envelope
        .error
        .unwrap_or_else(|| format!("Request failed with status {}", status));
    let failed_ids = envelope
        .details
        .as_ref()
        .and_then(|details| details.get("failedIds"))
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>());

    match (status, failed_ids) {
        (400, _) => Error::Validation {
            message,
            details: envelope.details,
        },
        (401, _) => Error::Unauthorized(message),
        (403, _) => Error::Forbidden(message),
        (404, _) => Error::NotFound(message),
        (207, _) => Error::Partial {
            message,
            details: envelope.details.map(|details| details.to_string()).unwrap_or_default(),
        },
        (_, Some(failed)) => Error::Incomplete { message, failed },
        _ => Error::Upstream(message),
    }
}

#[derive(Debug, Clone)]
pub struct AdminApi {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl AdminApi {
    pub fn new(base_url: &str, http: Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Authenticate with the admin API token instead of a session cookie.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: FetchBuilder<'_>) -> Result<Value> {
        let request = match &self.token {
            Some(token) => request.header("Authorization", &format!("Bearer {}", token))?,
            None => request,
        };
        let response = request.execute_raw().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|_| Error::upstream(format!("Request failed with status {}: {}", status, text)))?;
        if !envelope.success || !(200..300).contains(&status) || status == 207 {
            return Err(envelope_error(status, envelope));
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    pub fn collection(&self, scope: CollectionScope) -> CollectionEndpoint<'_> {
        CollectionEndpoint { api: self, scope }
    }
}

/// The endpoints of one photo collection.
#[derive(Debug, Clone)]
pub struct CollectionEndpoint<'a> {
    api: &'a AdminApi,
    scope: CollectionScope,
}

fn field<T: DeserializeOwned>(data: Value, name: &str) -> Result<T> {
    Ok(serde_json::from_value(data.get(name).cloned().unwrap_or(Value::Null))?)
}

impl<'a> CollectionEndpoint<'a> {
    pub fn scope(&self) -> &CollectionScope {
        &self.scope
    }

    fn path(&self) -> String {
        match &self.scope {
            CollectionScope::ProjectPhotos(id) => format!("/api/projects/{}/photos", id),
            CollectionScope::UnitPhotos(id) => format!("/api/projects/units/{}/photos", id),
            CollectionScope::Gallery => "/api/gallery/photos".to_string(),
        }
    }

    pub async fn list<R: DeserializeOwned>(&self) -> Result<Vec<R>> {
        let url = self.api.url(&self.path());
        let data = self.api.send(Fetch::get(&self.api.http, &url)).await?;
        field(data, "photos")
    }

    /// Submit the complete order of the collection.
    pub async fn persist(&self, order: &[String]) -> Result<()> {
        let url = self.api.url(&format!("{}/reorder", self.path()));
        self.api
            .send(Fetch::post(&self.api.http, &url).json(&json!({ "order": order }))?)
            .await?;
        Ok(())
    }

    pub async fn set_role(&self, id: &str, role: &PhotoRole) -> Result<Photo> {
        let url = self.api.url(&format!("{}/{}", self.path(), id));
        let data = self
            .api
            .send(Fetch::put(&self.api.http, &url).json(&json!({ "role": role }))?)
            .await?;
        field(data, "photo")
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let url = self.api.url(&format!("{}/{}", self.path(), id));
        self.api.send(Fetch::delete(&self.api.http, &url)).await?;
        Ok(())
    }
}
