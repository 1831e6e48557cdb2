//! Staff roles, access requests and the session.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::envelope::{created, deleted, json_body, ok, ApiResult, RouteExt};
use super::extract::RequireAdmin;
use crate::error::{Error, ResultExt};
use crate::gate::session_cookie_names;
use crate::model::{AccessRequestOutcome, AdminRole, NewAccessRequest, RoleEntry};
use crate::state::AppState;

fn text(body: &Value, field: &str) -> String {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn role_of(body: &Value) -> Option<AdminRole> {
    text(body, "role").parse().ok()
}

pub async fn list_roles(RequireAdmin(_): RequireAdmin, State(state): State<Arc<AppState>>) -> ApiResult {
    let roles = state
        .store
        .list_roles()
        .await
        .context("Failed to fetch roles")
        .route("admin/roles")?;
    Ok(ok(json!({ "roles": roles })))
}

pub async fn save_role(RequireAdmin(staff): RequireAdmin, State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let body = json_body(&body).route("admin/roles")?;
    let email = text(&body, "email").to_lowercase();
    let role = match (email.is_empty(), role_of(&body)) {
        (false, Some(role)) => role,
        _ => return Err(Error::validation("Valid email and role are required")).route("admin/roles"),
    };

    let entry = state
        .store
        .upsert_role(&RoleEntry {
            email,
            role,
            created_by: staff.email,
            created_at: None,
        })
        .await
        .context("Failed to save role")
        .route("admin/roles")?;
    info!(route = "admin/roles", "granted {} to {}", entry.role, entry.email);
    Ok(created(json!({ "role": entry })))
}

pub async fn update_role(
    RequireAdmin(_): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    body: Bytes,
) -> ApiResult {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(Error::validation("Email is required")).route("admin/roles/:email");
    }
    let body = json_body(&body).route("admin/roles/:email")?;
    let role = role_of(&body)
        .ok_or_else(|| Error::validation("Valid role is required"))
        .route("admin/roles/:email")?;

    let entry = state
        .store
        .update_role(&email, role)
        .await
        .context("Failed to update role")
        .route("admin/roles/:email")?
        .ok_or_else(|| Error::not_found("Role not found"))
        .route("admin/roles/:email")?;
    Ok(ok(json!({ "role": entry })))
}

pub async fn delete_role(
    RequireAdmin(_): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> ApiResult {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(Error::validation("Email is required")).route("admin/roles/:email");
    }
    state
        .store
        .delete_role(&email)
        .await
        .context("Failed to delete role")
        .route("admin/roles/:email")?;
    Ok(deleted())
}

pub async fn list_access_requests(RequireAdmin(_): RequireAdmin, State(state): State<Arc<AppState>>) -> ApiResult {
    let requests = state
        .store
        .list_access_requests()
        .await
        .context("Failed to fetch access requests")
        .route("admin/access-requests")?;
    Ok(ok(json!({ "requests": requests })))
}

/// Open to anyone: this is how a new staff member asks in.
pub async fn request_access(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let body = json_body(&body).route("admin/access-requests")?;
    let request = NewAccessRequest {
        email: text(&body, "email").to_lowercase(),
        name: text(&body, "name"),
        note: text(&body, "note"),
    };
    if request.email.is_empty() || request.name.is_empty() {
        return Err(Error::validation("Name and email are required")).route("admin/access-requests");
    }

    let outcome = state
        .store
        .insert_access_request(&request)
        .await
        .context("Failed to submit access request")
        .route("admin/access-requests")?;
    match outcome {
        AccessRequestOutcome::Created(created_request) => Ok(created(json!({ "request": created_request }))),
        AccessRequestOutcome::Duplicate => Ok(ok(json!({ "request": null, "duplicate": true }))),
    }
}

pub async fn delete_access_request(
    RequireAdmin(_): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    if id.trim().is_empty() {
        return Err(Error::validation("Request id is required")).route("admin/access-requests/:id");
    }
    state
        .store
        .delete_access_request(&id)
        .await
        .context("Failed to delete request")
        .route("admin/access-requests/:id")?;
    Ok(deleted())
}

pub async fn session(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult {
    Ok(ok(state.gate.session(&headers).await))
}

/// Revoke the session and expire every Supabase cookie the browser sent.
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(err) = state.gate.sign_out(&headers).await {
        warn!(route = "admin/logout", "sign out failed: {}", err);
    }

    let mut response = Json(json!({ "success": true })).into_response();
    for name in session_cookie_names(&headers) {
        let cookie = format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", name);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}
