use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use topos_postgrest::{PostgrestClient, SortOrder};

use super::{
    CollectionScope, SiteStore, ACCESS_REQUESTS_TABLE, GALLERY_PHOTOS_TABLE, PROJECTS_TABLE,
    ROLES_TABLE, UNITS_TABLE,
};
use crate::cascade::QueryShape;
use crate::error::{Error, Result};
use crate::model::{
    AccessRequest, AccessRequestOutcome, AdminRole, GalleryPatch, GalleryPhoto, Include,
    NewAccessRequest, NewPhoto, Photo, PhotoRole, Project, ProjectKey, ProjectQuery, ProjectRow,
    ProjectStatus, RoleEntry, Unit, UnitRow,
};
use crate::Supabase;

#[derive(Deserialize)]
struct IdRow {
    id: String,
}

#[derive(Deserialize)]
struct SortOrderRow {
    sort_order: Option<i64>,
}

#[derive(Deserialize)]
struct StoragePathRow {
    storage_path: String,
}

#[derive(Deserialize)]
struct RoleRow {
    role: String,
}

fn first<T>(rows: Vec<T>, table: &str) -> Result<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::general(format!("write to {} returned no row", table)))
}

/// Rows in the Supabase project's Postgres, reached through PostgREST.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    supabase: Supabase,
}

impl PostgrestStore {
    pub fn new(supabase: Supabase) -> Self {
        Self { supabase }
    }

    /// Query on the scope's table, filtered to its parent.
    fn scoped(&self, scope: &CollectionScope) -> PostgrestClient {
        let client = self.supabase.from(scope.table());
        match scope.parent() {
            Some((column, id)) => client.eq(column, id),
            None => client,
        }
    }

    fn require_parent(scope: &CollectionScope) -> Result<()> {
        match scope.parent() {
            Some(_) => Ok(()),
            None => Err(Error::general(format!(
                "{} rows carry no role",
                scope.table()
            ))),
        }
    }
}

#[async_trait]
impl SiteStore for PostgrestStore {
    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>> {
        let mut request = self
            .supabase
            .from(PROJECTS_TABLE)
            .select(&query.include.select())
            .order("sort_order", SortOrder::Ascending)
            .order("created_at", SortOrder::Descending);

        if let Some(status) = query.status {
            request = request.eq("status", status.as_str());
        }
        if query.featured {
            request = request.eq("featured", "true");
        }
        if let Some(is_public) = query.is_public {
            request = request.eq("is_public", if is_public { "true" } else { "false" });
        }
        if let Some(limit) = query.limit {
            request = request.limit(limit);
        }

        Ok(request.execute().await?)
    }

    async fn get_project(&self, key: &ProjectKey, include: Include) -> Result<Option<Project>> {
        Ok(self
            .supabase
            .from(PROJECTS_TABLE)
            .select(&include.select())
            .eq(key.column(), key.value())
            .execute_one()
            .await?)
    }

    async fn insert_project(&self, row: &ProjectRow) -> Result<Project> {
        let rows = self.supabase.from(PROJECTS_TABLE).insert(&[row]).await?;
        first(rows, PROJECTS_TABLE)
    }

    async fn update_project(&self, id: &str, row: &ProjectRow) -> Result<Option<Project>> {
        let rows: Vec<Project> = self
            .supabase
            .from(PROJECTS_TABLE)
            .eq("id", id)
            .update(row)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.supabase
            .from(PROJECTS_TABLE)
            .eq("id", id)
            .delete::<Value>()
            .await?;
        Ok(())
    }

    async fn public_projects(
        &self,
        shape: QueryShape,
        status: Option<ProjectStatus>,
    ) -> Result<Vec<Project>> {
        debug!(target: "public/projects", "reading with shape '{}'", shape.name);
        let mut request = self
            .supabase
            .from(PROJECTS_TABLE)
            .select(&shape.select())
            .eq("is_public", "true");
        if let Some(status) = status {
            request = request.eq("status", status.as_str());
        }

        Ok(request
            .order("sort_order", SortOrder::Ascending)
            .order("created_at", SortOrder::Descending)
            .execute()
            .await?)
    }

    async fn list_units(&self, project_id: &str) -> Result<Vec<Unit>> {
        Ok(self
            .supabase
            .from(UNITS_TABLE)
            .select("*")
            .eq("project_id", project_id)
            .order("sort_order", SortOrder::Ascending)
            .order("created_at", SortOrder::Ascending)
            .execute()
            .await?)
    }

    async fn insert_units(&self, rows: &[UnitRow]) -> Result<Vec<Unit>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.supabase.from(UNITS_TABLE).insert(&rows).await?)
    }

    async fn update_unit(&self, project_id: &str, unit_id: &str, row: &UnitRow) -> Result<Option<Unit>> {
        let rows: Vec<Unit> = self
            .supabase
            .from(UNITS_TABLE)
            .eq("id", unit_id)
            .eq("project_id", project_id)
            .update(row)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_units(&self, project_id: &str, unit_ids: &[String]) -> Result<()> {
        if unit_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = unit_ids.iter().map(String::as_str).collect();
        self.supabase
            .from(UNITS_TABLE)
            .eq("project_id", project_id)
            .in_list("id", &ids)
            .delete::<Value>()
            .await?;
        Ok(())
    }

    async fn list_photos(&self, scope: &CollectionScope) -> Result<Vec<Photo>> {
        Self::require_parent(scope)?;
        Ok(self
            .scoped(scope)
            .select("*")
            .order("sort_order", SortOrder::Ascending)
            .order("created_at", SortOrder::Ascending)
            .execute()
            .await?)
    }

    async fn list_gallery(&self) -> Result<Vec<GalleryPhoto>> {
        Ok(self
            .supabase
            .from(GALLERY_PHOTOS_TABLE)
            .select("*")
            .order("sort_order", SortOrder::Ascending)
            .order("created_at", SortOrder::Ascending)
            .execute()
            .await?)
    }

    async fn collection_ids(&self, scope: &CollectionScope) -> Result<Vec<String>> {
        let rows: Vec<IdRow> = self.scoped(scope).select("id").execute().await?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    async fn max_sort_order(&self, scope: &CollectionScope) -> Result<Option<i64>> {
        // Postgres sorts nulls first when descending, so take the max here.
        let rows: Vec<SortOrderRow> = self.scoped(scope).select("sort_order").execute().await?;
        Ok(rows.into_iter().filter_map(|row| row.sort_order).max())
    }

    async fn set_sort_order(&self, scope: &CollectionScope, id: &str, sort_order: i64) -> Result<bool> {
        let rows: Vec<IdRow> = self
            .scoped(scope)
            .eq("id", id)
            .update(&json!({ "sort_order": sort_order }))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn storage_path(&self, scope: &CollectionScope, id: &str) -> Result<Option<String>> {
        let row: Option<StoragePathRow> = self
            .scoped(scope)
            .select("storage_path")
            .eq("id", id)
            .execute_one()
            .await?;
        Ok(row.map(|row| row.storage_path))
    }

    async fn delete_item(&self, scope: &CollectionScope, id: &str) -> Result<()> {
        self.scoped(scope).eq("id", id).delete::<Value>().await?;
        Ok(())
    }

    async fn insert_photo(&self, scope: &CollectionScope, photo: &NewPhoto) -> Result<Photo> {
        let (column, parent_id) = scope
            .parent()
            .ok_or_else(|| Error::general("gallery photos carry no role"))?;

        let mut body = serde_json::to_value(photo)?;
        if let Some(map) = body.as_object_mut() {
            map.insert(column.to_string(), Value::String(parent_id.to_string()));
        }
        let rows = self.supabase.from(scope.table()).insert(&[body]).await?;
        first(rows, scope.table())
    }

    async fn insert_gallery_photo(&self, photo: &NewPhoto) -> Result<GalleryPhoto> {
        let rows = self
            .supabase
            .from(GALLERY_PHOTOS_TABLE)
            .insert(&[photo])
            .await?;
        first(rows, GALLERY_PHOTOS_TABLE)
    }

    async fn update_photo_role(
        &self,
        scope: &CollectionScope,
        id: &str,
        role: &PhotoRole,
    ) -> Result<Option<Photo>> {
        Self::require_parent(scope)?;
        let rows: Vec<Photo> = self
            .scoped(scope)
            .eq("id", id)
            .update(&json!({ "role": role.as_str() }))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn set_primary_role(&self, scope: &CollectionScope, id: &str) -> Result<Option<Photo>> {
        let primary = scope
            .primary_role()
            .ok_or_else(|| Error::general(format!("{} has no primary role", scope.table())))?;

        let target: Option<IdRow> = self.scoped(scope).select("id").eq("id", id).execute_one().await?;
        if target.is_none() {
            return Ok(None);
        }

        let demoted: Vec<IdRow> = self
            .scoped(scope)
            .eq("role", primary.as_str())
            .neq("id", id)
            .update(&json!({ "role": PhotoRole::Gallery.as_str() }))
            .await?;
        if !demoted.is_empty() {
            debug!(target: "photos/role", "demoted {} {} photo(s)", demoted.len(), primary);
        }

        self.update_photo_role(scope, id, &primary).await
    }

    async fn update_gallery_photo(&self, id: &str, patch: &GalleryPatch) -> Result<Option<GalleryPhoto>> {
        let rows: Vec<GalleryPhoto> = self
            .supabase
            .from(GALLERY_PHOTOS_TABLE)
            .eq("id", id)
            .update(patch)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_roles(&self) -> Result<Vec<RoleEntry>> {
        Ok(self
            .supabase
            .from(ROLES_TABLE)
            .select("*")
            .order("email", SortOrder::Ascending)
            .execute()
            .await?)
    }

    async fn role_for_email(&self, email: &str) -> Result<Option<AdminRole>> {
        let row: Option<RoleRow> = self
            .supabase
            .from(ROLES_TABLE)
            .select("role")
            .eq("email", email)
            .execute_one()
            .await?;
        Ok(row.and_then(|row| row.role.parse().ok()))
    }

    async fn upsert_role(&self, entry: &RoleEntry) -> Result<RoleEntry> {
        let rows = self
            .supabase
            .from(ROLES_TABLE)
            .upsert(&[entry], "email")
            .await?;
        first(rows, ROLES_TABLE)
    }

    async fn update_role(&self, email: &str, role: AdminRole) -> Result<Option<RoleEntry>> {
        let rows: Vec<RoleEntry> = self
            .supabase
            .from(ROLES_TABLE)
            .eq("email", email)
            .update(&json!({ "role": role }))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_role(&self, email: &str) -> Result<()> {
        self.supabase
            .from(ROLES_TABLE)
            .eq("email", email)
            .delete::<Value>()
            .await?;
        Ok(())
    }

    async fn list_access_requests(&self) -> Result<Vec<AccessRequest>> {
        Ok(self
            .supabase
            .from(ACCESS_REQUESTS_TABLE)
            .select("*")
            .order("created_at", SortOrder::Descending)
            .execute()
            .await?)
    }

    async fn insert_access_request(&self, request: &NewAccessRequest) -> Result<AccessRequestOutcome> {
        match self
            .supabase
            .from(ACCESS_REQUESTS_TABLE)
            .insert::<_, AccessRequest>(&[request])
            .await
        {
            Ok(rows) => Ok(AccessRequestOutcome::Created(first(rows, ACCESS_REQUESTS_TABLE)?)),
            Err(err) if err.is_unique_violation() => Ok(AccessRequestOutcome::Duplicate),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_access_request(&self, id: &str) -> Result<()> {
        self.supabase
            .from(ACCESS_REQUESTS_TABLE)
            .eq("id", id)
            .delete::<Value>()
            .await?;
        Ok(())
    }
}
