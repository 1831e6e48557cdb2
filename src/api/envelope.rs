//! The `{success, data, error, details}` envelope every endpoint answers with.

use std::error::Error as StdError;

use axum::{
    body::Bytes,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// A failed request, tagged with the route it failed on for the logs.
#[derive(Debug)]
pub struct ApiError {
    route: &'static str,
    error: Error,
}

impl ApiError {
    pub fn new(route: &'static str, error: Error) -> Self {
        Self { route, error }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }
}

pub trait RouteExt<T> {
    fn route(self, route: &'static str) -> Result<T, ApiError>;
}

impl<T> RouteExt<T> for Result<T> {
    fn route(self, route: &'static str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::new(route, error))
    }
}

pub type ApiResult = Result<Response, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match code {
            500..=u16::MAX => error!(route = self.route, "{}", chain(&self.error)),
            207 => warn!(route = self.route, "{}", chain(&self.error)),
            429 => info!(route = self.route, "{}", self.error),
            _ => debug!(route = self.route, "{}", self.error),
        }

        let mut body = json!({
            "success": false,
            "error": self.error.public_message(),
        });
        if let Some(details) = self.error.details() {
            body["details"] = details;
        }

        let mut response = (status, Json(body)).into_response();
        if let Error::RateLimited {
            limit,
            retry_after,
            reset_at,
        } = &self.error
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            headers.insert(HeaderName::from_static("x-ratelimit-limit"), HeaderValue::from(*limit));
            headers.insert(HeaderName::from_static("x-ratelimit-remaining"), HeaderValue::from(0u32));
            headers.insert(HeaderName::from_static("x-ratelimit-reset"), HeaderValue::from(*reset_at));
        }
        response
    }
}

/// The error followed by each of its causes.
fn chain(error: &Error) -> String {
    let mut message = error.to_string();
    let mut source = StdError::source(error);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = StdError::source(cause);
    }
    message
}

pub fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    respond(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: T) -> Response {
    respond(StatusCode::CREATED, data)
}

pub fn deleted() -> Response {
    ok(json!({ "deleted": true }))
}

/// Request body as JSON. Empty bodies read as `{}`.
pub fn json_body(bytes: &Bytes) -> Result<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(bytes).map_err(|err| Error::validation_with("Invalid JSON body", json!(err.to_string())))
}
