//! Read URLs for private objects, for the admin previews.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::envelope::{json_body, ok, ApiResult, RouteExt};
use super::extract::RequireStaff;
use crate::error::Error;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SignedParams {
    path: Option<String>,
    expires: Option<String>,
}

fn is_absolute(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn expires_in(state: &AppState, requested: Option<u64>) -> u64 {
    requested
        .filter(|secs| *secs > 0)
        .unwrap_or_else(|| state.config.signed_url_ttl.as_secs())
}

pub async fn sign(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SignedParams>,
) -> ApiResult {
    let path = params
        .path
        .filter(|path| !path.is_empty())
        .ok_or_else(|| Error::validation("path is required"))
        .route("photos/signed")?;
    if is_absolute(&path) {
        return Ok(ok(json!({ "url": path })));
    }

    let expires = expires_in(&state, params.expires.and_then(|value| value.parse().ok()));
    let url = match state.objects.signed_url(&path, expires).await {
        Ok(url) => Some(url),
        Err(err) => {
            warn!(route = "photos/signed", "failed to sign {}: {}", path, err);
            state.objects.public_url(&path)
        }
    };
    let url = url
        .ok_or_else(|| Error::upstream("Failed to create signed URL"))
        .route("photos/signed")?;
    Ok(ok(json!({ "url": url })))
}

pub async fn sign_batch(RequireStaff(_): RequireStaff, State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let body = json_body(&body).route("photos/signed/batch")?;
    let paths: Vec<String> = body
        .get("paths")
        .and_then(Value::as_array)
        .map(|paths| paths.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    if paths.is_empty() {
        return Err(Error::validation("paths[] is required")).route("photos/signed/batch");
    }
    let expires = expires_in(&state, body.get("expires").and_then(Value::as_u64));

    let mut urls = BTreeMap::new();
    let (absolute, stored): (Vec<String>, Vec<String>) = paths.into_iter().partition(|path| is_absolute(path));
    for path in absolute {
        urls.insert(path.clone(), path);
    }

    if !stored.is_empty() {
        let signed: BTreeMap<String, String> = match state.objects.signed_urls(&stored, expires).await {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|entry| match (entry.signed_url, entry.error) {
                    (Some(url), _) => Some((entry.path, url)),
                    (None, error) => {
                        warn!(route = "photos/signed/batch", "failed to sign {}: {:?}", entry.path, error);
                        None
                    }
                })
                .collect(),
            Err(err) => {
                warn!(route = "photos/signed/batch", "batch signing failed: {}", err);
                BTreeMap::new()
            }
        };
        for path in stored {
            let url = signed
                .get(&path)
                .cloned()
                .or_else(|| state.objects.public_url(&path));
            if let Some(url) = url {
                urls.insert(path, url);
            }
        }
    }

    Ok(ok(json!({ "urls": urls })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("HTTPS://cdn.test/a.jpg"));
        assert!(is_absolute("http://cdn.test/a.jpg"));
        assert!(!is_absolute("projects/p1/a.jpg"));
    }
}
