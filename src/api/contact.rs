use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap};
use serde_json::json;

use super::envelope::{json_body, ok, ApiResult, RouteExt};
use crate::contact::ContactRequest;
use crate::error::Error;
use crate::rate_limit::client_ip;
use crate::state::AppState;

pub async fn submit(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> ApiResult {
    let body = json_body(&body).route("contact")?;
    let request: ContactRequest = serde_json::from_value(body)
        .map_err(|_| Error::validation("Missing required fields"))
        .route("contact")?;

    state
        .contact
        .submit(&client_ip(&headers), &request)
        .await
        .route("contact")?;
    Ok(ok(json!({ "sent": true })))
}
