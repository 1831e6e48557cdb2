//! Persistence seams.
//!
//! [`SiteStore`] holds the rows, [`ObjectStore`] the uploaded bytes. Both
//! come in a Supabase flavor and an in-memory one.

mod memory;
mod objects;
mod postgrest;

pub use memory::{MemoryObjects, MemoryStore};
pub use objects::SupabaseObjects;
pub use postgrest::PostgrestStore;

use async_trait::async_trait;
pub use topos_storage::{SignedUpload, SignedUrlEntry};

use crate::cascade::QueryShape;
use crate::error::Result;
use crate::model::{
    AccessRequest, AccessRequestOutcome, AdminRole, GalleryPatch, GalleryPhoto, Include, NewAccessRequest,
    NewPhoto, Photo, PhotoRole, Project, ProjectKey, ProjectQuery, ProjectRow, ProjectStatus, RoleEntry,
    Unit, UnitRow,
};

pub const PROJECTS_TABLE: &str = "projects";
pub const UNITS_TABLE: &str = "units";
pub const PROJECT_PHOTOS_TABLE: &str = "project_photos";
pub const UNIT_PHOTOS_TABLE: &str = "unit_photos";
pub const GALLERY_PHOTOS_TABLE: &str = "gallery_photos";
pub const ROLES_TABLE: &str = "roles";
pub const ACCESS_REQUESTS_TABLE: &str = "access_requests";

/// Object path segment standing in for the gallery's missing parent.
pub const GALLERY_PARENT: &str = "portfolio";

/// One ordered collection of photos.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionScope {
    ProjectPhotos(String),
    UnitPhotos(String),
    Gallery,
}

impl CollectionScope {
    pub fn table(&self) -> &'static str {
        match self {
            CollectionScope::ProjectPhotos(_) => PROJECT_PHOTOS_TABLE,
            CollectionScope::UnitPhotos(_) => UNIT_PHOTOS_TABLE,
            CollectionScope::Gallery => GALLERY_PHOTOS_TABLE,
        }
    }

    /// Parent column and id; the gallery has none.
    pub fn parent(&self) -> Option<(&'static str, &str)> {
        match self {
            CollectionScope::ProjectPhotos(id) => Some(("project_id", id)),
            CollectionScope::UnitPhotos(id) => Some(("unit_id", id)),
            CollectionScope::Gallery => None,
        }
    }

    /// The role at most one photo of the scope may hold.
    pub fn primary_role(&self) -> Option<PhotoRole> {
        match self {
            CollectionScope::ProjectPhotos(_) => Some(PhotoRole::Hero),
            CollectionScope::UnitPhotos(_) => Some(PhotoRole::Main),
            CollectionScope::Gallery => None,
        }
    }

    /// Roles an admin may assign in this scope.
    pub fn allowed_roles(&self) -> Vec<PhotoRole> {
        match self.primary_role() {
            Some(primary) => vec![primary, PhotoRole::Gallery],
            None => Vec::new(),
        }
    }

    /// First segment of object paths uploaded into this scope.
    pub fn storage_prefix(&self) -> &'static str {
        match self {
            CollectionScope::ProjectPhotos(_) => "projects",
            CollectionScope::UnitPhotos(_) => "units",
            CollectionScope::Gallery => "gallery",
        }
    }

    pub fn parent_segment(&self) -> &str {
        match self {
            CollectionScope::ProjectPhotos(id) | CollectionScope::UnitPhotos(id) => id,
            CollectionScope::Gallery => GALLERY_PARENT,
        }
    }

    /// Route-shaped label used as the log target.
    pub fn label(&self) -> &'static str {
        match self {
            CollectionScope::ProjectPhotos(_) => "projects/photos",
            CollectionScope::UnitPhotos(_) => "units/photos",
            CollectionScope::Gallery => "gallery/photos",
        }
    }
}

/// Row storage for the site.
///
/// Listings come back in presentation order: `sort_order` ascending, then
/// creation time (newest first for projects, oldest first for everything
/// else).
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>>;

    async fn get_project(&self, key: &ProjectKey, include: Include) -> Result<Option<Project>>;

    async fn insert_project(&self, row: &ProjectRow) -> Result<Project>;

    /// `None` when no project has this id.
    async fn update_project(&self, id: &str, row: &ProjectRow) -> Result<Option<Project>>;

    /// Units and photos go with the project.
    async fn delete_project(&self, id: &str) -> Result<()>;

    /// Public projects read with the given shape, optionally of one status.
    async fn public_projects(
        &self,
        shape: QueryShape,
        status: Option<ProjectStatus>,
    ) -> Result<Vec<Project>>;

    async fn list_units(&self, project_id: &str) -> Result<Vec<Unit>>;

    async fn insert_units(&self, rows: &[UnitRow]) -> Result<Vec<Unit>>;

    async fn update_unit(&self, project_id: &str, unit_id: &str, row: &UnitRow) -> Result<Option<Unit>>;

    async fn delete_units(&self, project_id: &str, unit_ids: &[String]) -> Result<()>;

    /// Project or unit photos. The gallery reads through [`SiteStore::list_gallery`].
    async fn list_photos(&self, scope: &CollectionScope) -> Result<Vec<Photo>>;

    async fn list_gallery(&self) -> Result<Vec<GalleryPhoto>>;

    async fn collection_ids(&self, scope: &CollectionScope) -> Result<Vec<String>>;

    /// Highest `sort_order` in the scope, `None` when it is empty.
    async fn max_sort_order(&self, scope: &CollectionScope) -> Result<Option<i64>>;

    /// `false` when the row is not in the scope.
    async fn set_sort_order(&self, scope: &CollectionScope, id: &str, sort_order: i64) -> Result<bool>;

    async fn storage_path(&self, scope: &CollectionScope, id: &str) -> Result<Option<String>>;

    async fn delete_item(&self, scope: &CollectionScope, id: &str) -> Result<()>;

    async fn insert_photo(&self, scope: &CollectionScope, photo: &NewPhoto) -> Result<Photo>;

    async fn insert_gallery_photo(&self, photo: &NewPhoto) -> Result<GalleryPhoto>;

    async fn update_photo_role(
        &self,
        scope: &CollectionScope,
        id: &str,
        role: &PhotoRole,
    ) -> Result<Option<Photo>>;

    /// Give `id` the scope's primary role, demoting every sibling that holds
    /// it first. `None` when `id` is not in the scope.
    async fn set_primary_role(&self, scope: &CollectionScope, id: &str) -> Result<Option<Photo>>;

    async fn update_gallery_photo(&self, id: &str, patch: &GalleryPatch) -> Result<Option<GalleryPhoto>>;

    /// Ordered by email.
    async fn list_roles(&self) -> Result<Vec<RoleEntry>>;

    async fn role_for_email(&self, email: &str) -> Result<Option<AdminRole>>;

    /// Insert, or replace the role of an existing email.
    async fn upsert_role(&self, entry: &RoleEntry) -> Result<RoleEntry>;

    async fn update_role(&self, email: &str, role: AdminRole) -> Result<Option<RoleEntry>>;

    async fn delete_role(&self, email: &str) -> Result<()>;

    /// Newest first.
    async fn list_access_requests(&self) -> Result<Vec<AccessRequest>>;

    async fn insert_access_request(&self, request: &NewAccessRequest) -> Result<AccessRequestOutcome>;

    async fn delete_access_request(&self, id: &str) -> Result<()>;
}

/// Bucket of uploaded objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// One-shot upload URL and token for exactly `path`.
    async fn create_signed_upload(&self, path: &str) -> Result<SignedUpload>;

    async fn signed_url(&self, path: &str, expires_in: u64) -> Result<String>;

    async fn signed_urls(&self, paths: &[String], expires_in: u64) -> Result<Vec<SignedUrlEntry>>;

    /// `None` when no public base is configured.
    fn public_url(&self, path: &str) -> Option<String>;

    async fn remove(&self, path: &str) -> Result<()>;
}
