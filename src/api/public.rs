//! Read-only data behind the marketing pages.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;

use super::envelope::{ok, ApiResult, RouteExt};
use super::projects::parse_status;
use crate::model::ProjectStatus;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    status: Option<String>,
}

pub async fn projects(State(state): State<Arc<AppState>>, Query(params): Query<StatusParams>) -> ApiResult {
    let status = parse_status(params.status.as_deref()).route("public/projects")?;
    let projects = state.catalog.public_projects(status).await;
    Ok(ok(json!({ "projects": projects })))
}

pub async fn project_page(State(state): State<Arc<AppState>>, Path(slug): Path<String>) -> ApiResult {
    let page = state
        .catalog
        .project_page(&slug)
        .await
        .route("public/projects/:slug")?;
    Ok(ok(page))
}

pub async fn unit_page(
    State(state): State<Arc<AppState>>,
    Path((slug, unit_slug)): Path<(String, String)>,
) -> ApiResult {
    let page = state
        .catalog
        .unit_page(&slug, &unit_slug)
        .await
        .route("public/projects/:slug/units/:unitSlug")?;
    Ok(ok(page))
}

/// Showcase cards; completed projects unless `status` says otherwise.
pub async fn showcase(State(state): State<Arc<AppState>>, Query(params): Query<StatusParams>) -> ApiResult {
    let status = parse_status(params.status.as_deref())
        .route("public/showcase")?
        .unwrap_or(ProjectStatus::Completed);
    let items = state.catalog.showcase(status).await;
    Ok(ok(json!({ "items": items })))
}

pub async fn showcase_unit(
    State(state): State<Arc<AppState>>,
    Path((status, slug)): Path<(String, String)>,
) -> ApiResult {
    let status = parse_status(Some(&status))
        .route("public/showcase/:status/units/:slug")?
        .unwrap_or(ProjectStatus::Completed);
    let page = state
        .catalog
        .unit_page_by_status(status, &slug)
        .await
        .route("public/showcase/:status/units/:slug")?;
    Ok(ok(page))
}

pub async fn gallery(State(state): State<Arc<AppState>>) -> ApiResult {
    let photos = state.catalog.gallery().await;
    Ok(ok(json!({ "photos": photos })))
}
