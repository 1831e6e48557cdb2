//! Project, unit and gallery photo collections.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
};
use serde_json::json;

use super::envelope::{created, deleted, json_body, ok, ApiResult, RouteExt};
use super::extract::RequireStaff;
use crate::collection::{parse_order, reordered};
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::store::CollectionScope;
use crate::upload::UploadRequest;

async fn project_scope(state: &AppState, identifier: &str) -> Result<CollectionScope> {
    Ok(CollectionScope::ProjectPhotos(state.projects.resolve_id(identifier).await?))
}

async fn list_in(state: &AppState, scope: &CollectionScope) -> ApiResult {
    let photos = state.collections.list(scope).await.route(scope.label())?;
    Ok(ok(json!({ "photos": photos })))
}

async fn upload_into(state: &AppState, scope: &CollectionScope, body: &Bytes) -> ApiResult {
    let body = json_body(body).route(scope.label())?;
    let request: UploadRequest = serde_json::from_value(body)
        .map_err(|err| Error::validation_with("Invalid upload payload", json!(err.to_string())))
        .route(scope.label())?;
    let slot = state.uploads.create_slot(scope, request).await.route(scope.label())?;
    Ok(created(json!({ "photo": slot.row, "upload": slot.upload })))
}

async fn reorder_in(state: &AppState, scope: &CollectionScope, body: &Bytes) -> ApiResult {
    let body = json_body(body).route(scope.label())?;
    let order = parse_order(&body).route(scope.label())?;
    state.collections.persist_order(scope, &order).await.route(scope.label())?;
    Ok(ok(reordered()))
}

async fn set_role_in(state: &AppState, scope: &CollectionScope, photo_id: &str, body: &Bytes) -> ApiResult {
    let body = json_body(body).route(scope.label())?;
    let photo = state
        .collections
        .set_role(scope, photo_id, &body)
        .await
        .route(scope.label())?;
    Ok(ok(json!({ "photo": photo })))
}

async fn delete_from(state: &AppState, scope: &CollectionScope, photo_id: &str) -> ApiResult {
    state
        .collections
        .delete_item(scope, photo_id)
        .await
        .route(scope.label())?;
    Ok(deleted())
}

pub async fn list_project_photos(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let scope = project_scope(&state, &id).await.route("projects/photos")?;
    list_in(&state, &scope).await
}

pub async fn upload_project_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let scope = project_scope(&state, &id).await.route("projects/photos")?;
    upload_into(&state, &scope, &body).await
}

pub async fn update_project_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path((id, photo_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult {
    let scope = project_scope(&state, &id).await.route("projects/photos")?;
    set_role_in(&state, &scope, &photo_id, &body).await
}

pub async fn delete_project_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path((id, photo_id)): Path<(String, String)>,
) -> ApiResult {
    let scope = project_scope(&state, &id).await.route("projects/photos")?;
    delete_from(&state, &scope, &photo_id).await
}

pub async fn reorder_project_photos(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let scope = project_scope(&state, &id).await.route("projects/photos")?;
    reorder_in(&state, &scope, &body).await
}

pub async fn list_unit_photos(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(unit_id): Path<String>,
) -> ApiResult {
    list_in(&state, &CollectionScope::UnitPhotos(unit_id)).await
}

pub async fn upload_unit_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(unit_id): Path<String>,
    body: Bytes,
) -> ApiResult {
    upload_into(&state, &CollectionScope::UnitPhotos(unit_id), &body).await
}

pub async fn update_unit_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path((unit_id, photo_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult {
    set_role_in(&state, &CollectionScope::UnitPhotos(unit_id), &photo_id, &body).await
}

pub async fn delete_unit_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path((unit_id, photo_id)): Path<(String, String)>,
) -> ApiResult {
    delete_from(&state, &CollectionScope::UnitPhotos(unit_id), &photo_id).await
}

pub async fn reorder_unit_photos(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(unit_id): Path<String>,
    body: Bytes,
) -> ApiResult {
    reorder_in(&state, &CollectionScope::UnitPhotos(unit_id), &body).await
}

pub async fn list_gallery(RequireStaff(_): RequireStaff, State(state): State<Arc<AppState>>) -> ApiResult {
    let photos = state
        .collections
        .list_gallery()
        .await
        .route("gallery/photos")?;
    Ok(ok(json!({ "photos": photos })))
}

pub async fn upload_gallery_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult {
    upload_into(&state, &CollectionScope::Gallery, &body).await
}

pub async fn update_gallery_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(photo_id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let body = json_body(&body).route("gallery/photos/:photoId")?;
    let photo = state
        .collections
        .update_gallery(&photo_id, &body)
        .await
        .route("gallery/photos/:photoId")?;
    Ok(ok(json!({ "photo": photo })))
}

pub async fn delete_gallery_photo(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(photo_id): Path<String>,
) -> ApiResult {
    delete_from(&state, &CollectionScope::Gallery, &photo_id).await
}

pub async fn reorder_gallery(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult {
    reorder_in(&state, &CollectionScope::Gallery, &body).await
}
