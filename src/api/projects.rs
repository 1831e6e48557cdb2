use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::json;

use super::envelope::{created, deleted, json_body, ok, ApiResult, RouteExt};
use super::extract::RequireStaff;
use crate::error::{Error, Result};
use crate::model::{Include, ProjectQuery, ProjectStatus};
use crate::state::AppState;

const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    status: Option<String>,
    featured: Option<String>,
    public: Option<String>,
    limit: Option<String>,
    include: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IncludeParams {
    include: Option<String>,
}

pub(crate) fn parse_status(value: Option<&str>) -> Result<Option<ProjectStatus>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::validation("Invalid status filter")),
        None => Ok(None),
    }
}

fn project_query(params: &ListParams) -> Result<ProjectQuery> {
    Ok(ProjectQuery {
        status: parse_status(params.status.as_deref())?,
        featured: params.featured.as_deref() == Some("true"),
        is_public: params.public.as_deref().map(|value| value == "true"),
        limit: params
            .limit
            .as_deref()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .map(|limit| limit.clamp(1, MAX_LIMIT) as usize),
        include: Include::parse(params.include.as_deref()),
    })
}

pub async fn list(State(state): State<Arc<AppState>>, Query(params): Query<ListParams>) -> ApiResult {
    let query = project_query(&params).route("projects")?;
    let projects = state.projects.list(&query).await.route("projects")?;
    Ok(ok(json!({ "projects": projects })))
}

pub async fn create(RequireStaff(_): RequireStaff, State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let body = json_body(&body).route("projects")?;
    let project = state.projects.create(&body).await.route("projects")?;
    Ok(created(json!({ "project": project })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<IncludeParams>,
) -> ApiResult {
    let include = Include::parse(params.include.as_deref());
    let project = state.projects.get(&id, include).await.route("projects/:id")?;
    Ok(ok(json!({ "project": project })))
}

pub async fn update(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let body = json_body(&body).route("projects/:id")?;
    let project = state.projects.update(&id, &body).await.route("projects/:id")?;
    Ok(ok(json!({ "project": project })))
}

pub async fn delete(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    state.projects.delete(&id).await.route("projects/:id")?;
    Ok(deleted())
}

pub async fn add_units(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let body = json_body(&body).route("projects/:id/units")?;
    let units = state.projects.add_units(&id, &body).await.route("projects/:id/units")?;
    Ok(created(json!({ "units": units })))
}

pub async fn update_unit(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path((id, unit_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult {
    let body = json_body(&body).route("projects/:id/units/:unitId")?;
    let unit = state
        .projects
        .update_unit(&id, &unit_id, &body)
        .await
        .route("projects/:id/units/:unitId")?;
    Ok(ok(json!({ "unit": unit })))
}

pub async fn delete_unit(
    RequireStaff(_): RequireStaff,
    State(state): State<Arc<AppState>>,
    Path((id, unit_id)): Path<(String, String)>,
) -> ApiResult {
    state
        .projects
        .delete_unit(&id, &unit_id)
        .await
        .route("projects/:id/units/:unitId")?;
    Ok(deleted())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_query() {
        let params = ListParams {
            status: Some("completed".to_string()),
            featured: Some("true".to_string()),
            public: Some("false".to_string()),
            limit: Some("500".to_string()),
            include: Some("Units, photos".to_string()),
        };
        let query = project_query(&params).unwrap();
        assert_eq!(query.status, Some(ProjectStatus::Completed));
        assert!(query.featured);
        assert_eq!(query.is_public, Some(false));
        assert_eq!(query.limit, Some(100));
        assert_eq!(query.include, Include::ALL);

        let query = project_query(&ListParams {
            limit: Some("0".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.limit, Some(1));
        assert_eq!(query.is_public, None);
    }

    #[test]
    fn test_invalid_status() {
        let err = parse_status(Some("sold_out")).unwrap_err();
        assert_eq!(err.public_message(), "Invalid status filter");
        assert_eq!(parse_status(Some("")).unwrap(), None);
    }
}
