//! Process-local store, for local runs and tests.
//!
//! Follows the same ordering rules as the database-backed store and
//! reports constraint violations with the same Postgres codes, so the
//! services above cannot tell the two apart.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use uuid::Uuid;

use topos_postgrest::{PostgrestApiErrorDetails, PostgrestError};
use topos_storage::StorageError;

use super::{CollectionScope, ObjectStore, SignedUpload, SignedUrlEntry, SiteStore};
use crate::cascade::{OptionalPiece, QueryShape};
use crate::error::{Error, Result};
use crate::ordering::presentation_sort;
use crate::model::{
    AccessRequest, AccessRequestOutcome, AdminRole, GalleryPatch, GalleryPhoto, Include,
    NewAccessRequest, NewPhoto, Photo, PhotoRole, Project, ProjectKey, ProjectQuery, ProjectRow,
    ProjectStatus, RoleEntry, Unit, UnitRow,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn api_error(status: StatusCode, code: &str, message: &str) -> Error {
    Error::Database(PostgrestError::ApiError {
        details: PostgrestApiErrorDetails {
            code: Some(code.to_string()),
            message: Some(message.to_string()),
            details: None,
            hint: None,
        },
        status,
    })
}

fn unique_violation(constraint: &str) -> Error {
    api_error(
        StatusCode::CONFLICT,
        "23505",
        &format!("duplicate key value violates unique constraint \"{}\"", constraint),
    )
}

fn foreign_key_violation(constraint: &str) -> Error {
    api_error(
        StatusCode::CONFLICT,
        "23503",
        &format!("insert or update on table violates foreign key constraint \"{}\"", constraint),
    )
}

/// The error PostgREST raises when a select names something the schema lacks.
fn schema_error(piece: OptionalPiece) -> Error {
    let status = StatusCode::BAD_REQUEST;
    match piece {
        OptionalPiece::UnitPhotoRole => {
            api_error(status, "42703", "column unit_photos_1.role does not exist")
        }
        OptionalPiece::ProjectPhotoRole => {
            api_error(status, "42703", "column project_photos_1.role does not exist")
        }
        OptionalPiece::UnitPricing => api_error(status, "42703", "column units_1.price does not exist"),
        OptionalPiece::UnitPhotos => api_error(
            status,
            "PGRST200",
            "Could not find a relationship between 'units' and 'unit_photos' in the schema cache",
        ),
        OptionalPiece::ProjectPhotos => api_error(
            status,
            "PGRST200",
            "Could not find a relationship between 'projects' and 'project_photos' in the schema cache",
        ),
        OptionalPiece::Units => api_error(
            status,
            "PGRST200",
            "Could not find a relationship between 'projects' and 'units' in the schema cache",
        ),
    }
}

#[derive(Debug, Default)]
struct Tables {
    projects: Vec<Project>,
    units: Vec<Unit>,
    project_photos: Vec<Photo>,
    unit_photos: Vec<Photo>,
    gallery: Vec<GalleryPhoto>,
    roles: Vec<RoleEntry>,
    access_requests: Vec<AccessRequest>,
}

impl Tables {
    fn photos(&self, scope: &CollectionScope) -> Vec<Photo> {
        let (table, column_id) = match scope {
            CollectionScope::ProjectPhotos(id) => (&self.project_photos, id),
            CollectionScope::UnitPhotos(id) => (&self.unit_photos, id),
            CollectionScope::Gallery => return Vec::new(),
        };
        let mut photos: Vec<Photo> = table
            .iter()
            .filter(|photo| photo_parent(scope, photo) == Some(column_id.as_str()))
            .cloned()
            .collect();
        presentation_sort(&mut photos);
        photos
    }

    fn photo_mut(&mut self, scope: &CollectionScope, id: &str) -> Option<&mut Photo> {
        let table = match scope {
            CollectionScope::ProjectPhotos(_) => &mut self.project_photos,
            CollectionScope::UnitPhotos(_) => &mut self.unit_photos,
            CollectionScope::Gallery => return None,
        };
        let parent = scope.parent().map(|(_, parent)| parent.to_string());
        table
            .iter_mut()
            .find(|photo| photo.id == id && photo_parent(scope, photo) == parent.as_deref())
    }

    fn units_of(&self, project_id: &str) -> Vec<Unit> {
        let mut units: Vec<Unit> = self
            .units
            .iter()
            .filter(|unit| unit.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect();
        presentation_sort(&mut units);
        units
    }

    /// A project with the requested embeds.
    fn hydrate(&self, project: &Project, include: Include) -> Project {
        let mut project = project.clone();
        if include.units {
            project.units = Some(self.units_of(&project.id));
        }
        if include.photos {
            project.project_photos = Some(self.photos(&CollectionScope::ProjectPhotos(project.id.clone())));
        }
        project
    }

    /// A project as the public select returns it for `shape`.
    fn shaped(&self, project: &Project, shape: QueryShape) -> Project {
        let mut project = project.clone();
        if !shape.omits(OptionalPiece::ProjectPhotos) {
            let mut photos = self.photos(&CollectionScope::ProjectPhotos(project.id.clone()));
            if shape.omits(OptionalPiece::ProjectPhotoRole) {
                photos.iter_mut().for_each(|photo| photo.role = None);
            }
            project.project_photos = Some(photos);
        }
        if !shape.omits(OptionalPiece::Units) {
            let units = self
                .units_of(&project.id)
                .into_iter()
                .map(|mut unit| {
                    if shape.omits(OptionalPiece::UnitPricing) {
                        unit.price = None;
                        unit.sold_price = None;
                    }
                    if !shape.omits(OptionalPiece::UnitPhotos) {
                        let mut photos = self.photos(&CollectionScope::UnitPhotos(unit.id.clone()));
                        if shape.omits(OptionalPiece::UnitPhotoRole) {
                            photos.iter_mut().for_each(|photo| photo.role = None);
                        }
                        unit.unit_photos = Some(photos);
                    }
                    unit
                })
                .collect();
            project.units = Some(units);
        }
        project
    }

    fn remove_unit_cascade(&mut self, unit_ids: &[String]) {
        self.units.retain(|unit| !unit_ids.contains(&unit.id));
        self.unit_photos.retain(|photo| {
            photo
                .unit_id
                .as_ref()
                .map(|id| !unit_ids.contains(id))
                .unwrap_or(true)
        });
    }
}

fn photo_parent<'a>(scope: &CollectionScope, photo: &'a Photo) -> Option<&'a str> {
    match scope {
        CollectionScope::ProjectPhotos(_) => photo.project_id.as_deref(),
        CollectionScope::UnitPhotos(_) => photo.unit_id.as_deref(),
        CollectionScope::Gallery => None,
    }
}

/// Site rows held in memory.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    epoch: DateTime<Utc>,
    ticks: AtomicI64,
    missing: Mutex<BTreeSet<OptionalPiece>>,
    failures: Mutex<Vec<String>>,
    shapes_read: Mutex<Vec<&'static str>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            epoch: Utc::now(),
            ticks: AtomicI64::new(0),
            missing: Mutex::new(BTreeSet::new()),
            failures: Mutex::new(Vec::new()),
            shapes_read: Mutex::new(Vec::new()),
        }
    }

    /// Pretend the schema predates `pieces`: public reads naming them fail
    /// the way PostgREST does.
    pub fn with_missing_pieces(self, pieces: &[OptionalPiece]) -> Self {
        lock(&self.missing).extend(pieces.iter().copied());
        self
    }

    /// Make the next call of `operation` fail. Operations are named after
    /// the [`SiteStore`] methods.
    pub fn fail_next(&self, operation: &str) {
        lock(&self.failures).push(operation.to_string());
    }

    /// Names of the shapes public reads were attempted with, in order.
    pub fn shapes_read(&self) -> Vec<&'static str> {
        lock(&self.shapes_read).clone()
    }

    fn check(&self, operation: &str) -> Result<()> {
        let mut failures = lock(&self.failures);
        match failures.iter().position(|name| name == operation) {
            Some(index) => {
                failures.remove(index);
                Err(Error::general(format!("{} failed", operation)))
            }
            None => Ok(()),
        }
    }

    /// Strictly increasing creation times, so ties break deterministically.
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        self.epoch + Duration::milliseconds(tick)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock(&self.tables)
    }
}

#[async_trait]
impl SiteStore for MemoryStore {
    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>> {
        self.check("list_projects")?;
        let tables = self.tables();
        let mut projects: Vec<Project> = tables
            .projects
            .iter()
            .filter(|project| query.status.map_or(true, |status| project.status == status))
            .filter(|project| !query.featured || project.featured)
            .filter(|project| query.is_public.map_or(true, |public| project.is_public == public))
            .map(|project| tables.hydrate(project, query.include))
            .collect();
        projects.sort_by(|a, b| {
            a.sort_order
                .unwrap_or(0)
                .cmp(&b.sort_order.unwrap_or(0))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        if let Some(limit) = query.limit {
            projects.truncate(limit);
        }
        Ok(projects)
    }

    async fn get_project(&self, key: &ProjectKey, include: Include) -> Result<Option<Project>> {
        self.check("get_project")?;
        let tables = self.tables();
        Ok(tables
            .projects
            .iter()
            .find(|project| key.matches(project))
            .map(|project| tables.hydrate(project, include)))
    }

    async fn insert_project(&self, row: &ProjectRow) -> Result<Project> {
        self.check("insert_project")?;
        let mut tables = self.tables();
        if tables.projects.iter().any(|project| project.slug == row.slug) {
            return Err(unique_violation("projects_slug_key"));
        }
        let project = Project::from_row(&Uuid::new_v4().to_string(), row, Some(self.now()));
        tables.projects.push(project.clone());
        Ok(project)
    }

    async fn update_project(&self, id: &str, row: &ProjectRow) -> Result<Option<Project>> {
        self.check("update_project")?;
        let mut tables = self.tables();
        if tables
            .projects
            .iter()
            .any(|project| project.slug == row.slug && project.id != id)
        {
            return Err(unique_violation("projects_slug_key"));
        }
        Ok(tables
            .projects
            .iter_mut()
            .find(|project| project.id == id)
            .map(|project| {
                project.apply_row(row);
                project.clone()
            }))
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.check("delete_project")?;
        let mut tables = self.tables();
        let unit_ids: Vec<String> = tables
            .units_of(id)
            .into_iter()
            .map(|unit| unit.id)
            .collect();
        tables.remove_unit_cascade(&unit_ids);
        tables
            .project_photos
            .retain(|photo| photo.project_id.as_deref() != Some(id));
        tables.projects.retain(|project| project.id != id);
        Ok(())
    }

    async fn public_projects(
        &self,
        shape: QueryShape,
        status: Option<ProjectStatus>,
    ) -> Result<Vec<Project>> {
        lock(&self.shapes_read).push(shape.name);
        self.check("public_projects")?;

        let missing = lock(&self.missing).clone();
        if let Some(piece) = missing.into_iter().find(|piece| !shape.omits(*piece)) {
            return Err(schema_error(piece));
        }

        let tables = self.tables();
        let mut projects: Vec<Project> = tables
            .projects
            .iter()
            .filter(|project| project.is_public)
            .filter(|project| status.map_or(true, |status| project.status == status))
            .map(|project| tables.shaped(project, shape))
            .collect();
        projects.sort_by(|a, b| {
            a.sort_order
                .unwrap_or(0)
                .cmp(&b.sort_order.unwrap_or(0))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(projects)
    }

    async fn list_units(&self, project_id: &str) -> Result<Vec<Unit>> {
        self.check("list_units")?;
        Ok(self.tables().units_of(project_id))
    }

    async fn insert_units(&self, rows: &[UnitRow]) -> Result<Vec<Unit>> {
        self.check("insert_units")?;
        let mut tables = self.tables();
        for row in rows {
            if !tables.projects.iter().any(|project| project.id == row.project_id) {
                return Err(foreign_key_violation("units_project_id_fkey"));
            }
        }
        let units: Vec<Unit> = rows
            .iter()
            .map(|row| Unit::from_row(&Uuid::new_v4().to_string(), row, Some(self.now())))
            .collect();
        tables.units.extend(units.iter().cloned());
        Ok(units)
    }

    async fn update_unit(&self, project_id: &str, unit_id: &str, row: &UnitRow) -> Result<Option<Unit>> {
        self.check("update_unit")?;
        let mut tables = self.tables();
        Ok(tables
            .units
            .iter_mut()
            .find(|unit| unit.id == unit_id && unit.project_id.as_deref() == Some(project_id))
            .map(|unit| {
                unit.apply_row(row);
                unit.clone()
            }))
    }

    async fn delete_units(&self, project_id: &str, unit_ids: &[String]) -> Result<()> {
        self.check("delete_units")?;
        let mut tables = self.tables();
        let owned: Vec<String> = tables
            .units_of(project_id)
            .into_iter()
            .map(|unit| unit.id)
            .filter(|id| unit_ids.contains(id))
            .collect();
        tables.remove_unit_cascade(&owned);
        Ok(())
    }

    async fn list_photos(&self, scope: &CollectionScope) -> Result<Vec<Photo>> {
        self.check("list_photos")?;
        if scope.parent().is_none() {
            return Err(Error::general("gallery photos carry no role"));
        }
        Ok(self.tables().photos(scope))
    }

    async fn list_gallery(&self) -> Result<Vec<GalleryPhoto>> {
        self.check("list_gallery")?;
        let mut photos = self.tables().gallery.clone();
        presentation_sort(&mut photos);
        Ok(photos)
    }

    async fn collection_ids(&self, scope: &CollectionScope) -> Result<Vec<String>> {
        self.check("collection_ids")?;
        let tables = self.tables();
        Ok(match scope {
            CollectionScope::Gallery => tables.gallery.iter().map(|photo| photo.id.clone()).collect(),
            _ => tables.photos(scope).into_iter().map(|photo| photo.id).collect(),
        })
    }

    async fn max_sort_order(&self, scope: &CollectionScope) -> Result<Option<i64>> {
        self.check("max_sort_order")?;
        let tables = self.tables();
        Ok(match scope {
            CollectionScope::Gallery => tables.gallery.iter().filter_map(|photo| photo.sort_order).max(),
            _ => tables
                .photos(scope)
                .iter()
                .filter_map(|photo| photo.sort_order)
                .max(),
        })
    }

    async fn set_sort_order(&self, scope: &CollectionScope, id: &str, sort_order: i64) -> Result<bool> {
        self.check("set_sort_order")?;
        let mut tables = self.tables();
        let slot = match scope {
            CollectionScope::Gallery => tables
                .gallery
                .iter_mut()
                .find(|photo| photo.id == id)
                .map(|photo| &mut photo.sort_order),
            _ => tables.photo_mut(scope, id).map(|photo| &mut photo.sort_order),
        };
        Ok(match slot {
            Some(slot) => {
                *slot = Some(sort_order);
                true
            }
            None => false,
        })
    }

    async fn storage_path(&self, scope: &CollectionScope, id: &str) -> Result<Option<String>> {
        self.check("storage_path")?;
        let mut tables = self.tables();
        Ok(match scope {
            CollectionScope::Gallery => tables
                .gallery
                .iter()
                .find(|photo| photo.id == id)
                .map(|photo| photo.storage_path.clone()),
            _ => tables
                .photo_mut(scope, id)
                .map(|photo| photo.storage_path.clone()),
        })
    }

    async fn delete_item(&self, scope: &CollectionScope, id: &str) -> Result<()> {
        self.check("delete_item")?;
        let mut tables = self.tables();
        match scope {
            CollectionScope::Gallery => tables.gallery.retain(|photo| photo.id != id),
            CollectionScope::ProjectPhotos(parent) => tables
                .project_photos
                .retain(|photo| !(photo.id == id && photo.project_id.as_deref() == Some(parent))),
            CollectionScope::UnitPhotos(parent) => tables
                .unit_photos
                .retain(|photo| !(photo.id == id && photo.unit_id.as_deref() == Some(parent))),
        }
        Ok(())
    }

    async fn insert_photo(&self, scope: &CollectionScope, photo: &NewPhoto) -> Result<Photo> {
        self.check("insert_photo")?;
        let mut tables = self.tables();
        let mut row = Photo {
            id: Uuid::new_v4().to_string(),
            project_id: None,
            unit_id: None,
            storage_path: photo.storage_path.clone(),
            role: photo.role.clone(),
            alt_text: photo.alt_text.clone(),
            caption: photo.caption.clone(),
            sort_order: Some(photo.sort_order),
            metadata: photo.metadata.clone(),
            created_at: Some(self.now()),
        };
        match scope {
            CollectionScope::ProjectPhotos(project_id) => {
                if !tables.projects.iter().any(|project| &project.id == project_id) {
                    return Err(foreign_key_violation("project_photos_project_id_fkey"));
                }
                row.project_id = Some(project_id.clone());
                tables.project_photos.push(row.clone());
            }
            CollectionScope::UnitPhotos(unit_id) => {
                if !tables.units.iter().any(|unit| &unit.id == unit_id) {
                    return Err(foreign_key_violation("unit_photos_unit_id_fkey"));
                }
                row.unit_id = Some(unit_id.clone());
                tables.unit_photos.push(row.clone());
            }
            CollectionScope::Gallery => return Err(Error::general("gallery photos carry no role")),
        }
        Ok(row)
    }

    async fn insert_gallery_photo(&self, photo: &NewPhoto) -> Result<GalleryPhoto> {
        self.check("insert_gallery_photo")?;
        let row = GalleryPhoto {
            id: Uuid::new_v4().to_string(),
            storage_path: photo.storage_path.clone(),
            alt_text: photo.alt_text.clone(),
            caption: photo.caption.clone(),
            size: Some(photo.size.unwrap_or_default()),
            sort_order: Some(photo.sort_order),
            metadata: photo.metadata.clone(),
            created_at: Some(self.now()),
        };
        self.tables().gallery.push(row.clone());
        Ok(row)
    }

    async fn update_photo_role(
        &self,
        scope: &CollectionScope,
        id: &str,
        role: &PhotoRole,
    ) -> Result<Option<Photo>> {
        self.check("update_photo_role")?;
        let mut tables = self.tables();
        Ok(tables.photo_mut(scope, id).map(|photo| {
            photo.role = Some(role.clone());
            photo.clone()
        }))
    }

    async fn set_primary_role(&self, scope: &CollectionScope, id: &str) -> Result<Option<Photo>> {
        self.check("set_primary_role")?;
        let primary = scope
            .primary_role()
            .ok_or_else(|| Error::general("gallery photos carry no role"))?;

        let mut tables = self.tables();
        if tables.photo_mut(scope, id).is_none() {
            return Ok(None);
        }
        let sibling_ids: Vec<String> = tables
            .photos(scope)
            .into_iter()
            .filter(|photo| photo.id != id && photo.has_role(&primary))
            .map(|photo| photo.id)
            .collect();
        for sibling in sibling_ids {
            if let Some(photo) = tables.photo_mut(scope, &sibling) {
                photo.role = Some(PhotoRole::Gallery);
            }
        }
        Ok(tables.photo_mut(scope, id).map(|photo| {
            photo.role = Some(primary);
            photo.clone()
        }))
    }

    async fn update_gallery_photo(&self, id: &str, patch: &GalleryPatch) -> Result<Option<GalleryPhoto>> {
        self.check("update_gallery_photo")?;
        let mut tables = self.tables();
        Ok(tables.gallery.iter_mut().find(|photo| photo.id == id).map(|photo| {
            if let Some(alt_text) = &patch.alt_text {
                photo.alt_text = alt_text.clone();
            }
            if let Some(caption) = &patch.caption {
                photo.caption = caption.clone();
            }
            if let Some(size) = patch.size {
                photo.size = Some(size);
            }
            photo.clone()
        }))
    }

    async fn list_roles(&self) -> Result<Vec<RoleEntry>> {
        self.check("list_roles")?;
        let mut roles = self.tables().roles.clone();
        roles.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(roles)
    }

    async fn role_for_email(&self, email: &str) -> Result<Option<AdminRole>> {
        self.check("role_for_email")?;
        Ok(self
            .tables()
            .roles
            .iter()
            .find(|entry| entry.email == email)
            .map(|entry| entry.role))
    }

    async fn upsert_role(&self, entry: &RoleEntry) -> Result<RoleEntry> {
        self.check("upsert_role")?;
        let now = self.now();
        let mut tables = self.tables();
        match tables.roles.iter_mut().find(|existing| existing.email == entry.email) {
            Some(existing) => {
                existing.role = entry.role;
                existing.created_by = entry.created_by.clone();
                Ok(existing.clone())
            }
            None => {
                let mut stored = entry.clone();
                stored.created_at = Some(now);
                tables.roles.push(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn update_role(&self, email: &str, role: AdminRole) -> Result<Option<RoleEntry>> {
        self.check("update_role")?;
        let mut tables = self.tables();
        Ok(tables
            .roles
            .iter_mut()
            .find(|entry| entry.email == email)
            .map(|entry| {
                entry.role = role;
                entry.clone()
            }))
    }

    async fn delete_role(&self, email: &str) -> Result<()> {
        self.check("delete_role")?;
        self.tables().roles.retain(|entry| entry.email != email);
        Ok(())
    }

    async fn list_access_requests(&self) -> Result<Vec<AccessRequest>> {
        self.check("list_access_requests")?;
        let mut requests = self.tables().access_requests.clone();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn insert_access_request(&self, request: &NewAccessRequest) -> Result<AccessRequestOutcome> {
        self.check("insert_access_request")?;
        let now = self.now();
        let mut tables = self.tables();
        if tables
            .access_requests
            .iter()
            .any(|existing| existing.email == request.email)
        {
            return Ok(AccessRequestOutcome::Duplicate);
        }
        let stored = AccessRequest {
            id: Uuid::new_v4().to_string(),
            email: request.email.clone(),
            name: request.name.clone(),
            note: Some(request.note.clone()).filter(|note| !note.is_empty()),
            created_at: Some(now),
        };
        tables.access_requests.push(stored.clone());
        Ok(AccessRequestOutcome::Created(stored))
    }

    async fn delete_access_request(&self, id: &str) -> Result<()> {
        self.check("delete_access_request")?;
        self.tables().access_requests.retain(|request| request.id != id);
        Ok(())
    }
}

/// Objects held in memory. Signed URLs use the `memory://` scheme; tests
/// complete an upload with [`MemoryObjects::put`].
#[derive(Debug)]
pub struct MemoryObjects {
    bucket: String,
    public_base: Option<String>,
    objects: Mutex<HashSet<String>>,
    signing_down: AtomicBool,
}

impl MemoryObjects {
    pub fn new(bucket: &str, public_base: Option<String>) -> Self {
        Self {
            bucket: bucket.to_string(),
            public_base,
            objects: Mutex::new(HashSet::new()),
            signing_down: AtomicBool::new(false),
        }
    }

    pub fn put(&self, path: &str) {
        lock(&self.objects).insert(path.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.objects).contains(path)
    }

    /// Make every signing call fail until switched back.
    pub fn set_signing_down(&self, down: bool) {
        self.signing_down.store(down, Ordering::Relaxed);
    }

    fn signing_available(&self) -> Result<()> {
        if self.signing_down.load(Ordering::Relaxed) {
            return Err(Error::Storage(StorageError::ApiError {
                message: "signing service unavailable".to_string(),
                status: StatusCode::SERVICE_UNAVAILABLE,
            }));
        }
        Ok(())
    }

    fn not_found(path: &str) -> Error {
        Error::Storage(StorageError::ApiError {
            message: format!("Object not found: {}", path),
            status: StatusCode::NOT_FOUND,
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_signed_upload(&self, path: &str) -> Result<SignedUpload> {
        self.signing_available()?;
        let token = Uuid::new_v4().simple().to_string();
        Ok(SignedUpload {
            signed_url: format!("memory://{}/{}?token={}", self.bucket, path, token),
            token,
            path: path.to_string(),
        })
    }

    async fn signed_url(&self, path: &str, expires_in: u64) -> Result<String> {
        self.signing_available()?;
        if !self.contains(path) {
            return Err(Self::not_found(path));
        }
        Ok(format!("memory://{}/{}?expires={}", self.bucket, path, expires_in))
    }

    async fn signed_urls(&self, paths: &[String], expires_in: u64) -> Result<Vec<SignedUrlEntry>> {
        self.signing_available()?;
        Ok(paths
            .iter()
            .map(|path| {
                let found = self.contains(path);
                SignedUrlEntry {
                    path: path.clone(),
                    signed_url: found
                        .then(|| format!("memory://{}/{}?expires={}", self.bucket, path, expires_in)),
                    error: (!found).then(|| "Object not found".to_string()),
                }
            })
            .collect())
    }

    fn public_url(&self, path: &str) -> Option<String> {
        self.public_base
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        if lock(&self.objects).remove(path) {
            Ok(())
        } else {
            Err(Self::not_found(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project_row(slug: &str) -> ProjectRow {
        ProjectRow {
            slug: slug.to_string(),
            name: slug.to_string(),
            status: ProjectStatus::Completed,
            is_public: true,
            address_line1: "1 Main St".to_string(),
            address_line2: None,
            city: None,
            state: None,
            postal_code: None,
            country: Some("USA".to_string()),
            estimated_completion: None,
            actual_completion: None,
            total_units: None,
            short_description: None,
            long_description: None,
            featured: false,
            sort_order: 0,
            metadata: json!({}),
        }
    }

    fn new_photo(path: &str, role: PhotoRole, sort_order: i64) -> NewPhoto {
        NewPhoto {
            storage_path: path.to_string(),
            role: Some(role),
            sort_order,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_unique_violation() {
        let store = MemoryStore::new();
        store.insert_project(&project_row("elm")).await.unwrap();
        let err = store.insert_project(&project_row("elm")).await.unwrap_err();
        assert!(err.as_postgrest().unwrap().is_unique_violation());
    }

    #[tokio::test]
    async fn test_set_primary_role_demotes_siblings() {
        let store = MemoryStore::new();
        let project = store.insert_project(&project_row("elm")).await.unwrap();
        let scope = CollectionScope::ProjectPhotos(project.id.clone());

        let first = store
            .insert_photo(&scope, &new_photo("a.jpg", PhotoRole::Hero, 0))
            .await
            .unwrap();
        let second = store
            .insert_photo(&scope, &new_photo("b.jpg", PhotoRole::Gallery, 1))
            .await
            .unwrap();

        let promoted = store.set_primary_role(&scope, &second.id).await.unwrap().unwrap();
        assert_eq!(promoted.role, Some(PhotoRole::Hero));

        let photos = store.list_photos(&scope).await.unwrap();
        let heroes: Vec<&str> = photos
            .iter()
            .filter(|photo| photo.has_role(&PhotoRole::Hero))
            .map(|photo| photo.id.as_str())
            .collect();
        assert_eq!(heroes, vec![second.id.as_str()]);
        assert!(photos
            .iter()
            .any(|photo| photo.id == first.id && photo.has_role(&PhotoRole::Gallery)));

        let other = CollectionScope::ProjectPhotos("elsewhere".to_string());
        assert_eq!(store.set_primary_role(&other, &second.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ties_break_by_creation_time() {
        let store = MemoryStore::new();
        let project = store.insert_project(&project_row("elm")).await.unwrap();
        let scope = CollectionScope::ProjectPhotos(project.id.clone());
        for path in ["a", "b", "c"] {
            store
                .insert_photo(&scope, &new_photo(path, PhotoRole::Gallery, 0))
                .await
                .unwrap();
        }
        let paths: Vec<String> = store
            .list_photos(&scope)
            .await
            .unwrap()
            .into_iter()
            .map(|photo| photo.storage_path)
            .collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_missing_piece_fails_like_postgrest() {
        let store = MemoryStore::new().with_missing_pieces(&[OptionalPiece::UnitPricing]);
        let shapes = crate::cascade::PUBLIC_PROJECT_SHAPES;

        let without_pricing = shapes
            .iter()
            .find(|shape| shape.name == "without unit pricing")
            .copied()
            .unwrap();

        let err = store.public_projects(shapes[0], None).await.unwrap_err();
        assert_eq!(err.as_postgrest().unwrap().code(), Some("42703"));
        assert!(store.public_projects(without_pricing, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_next("list_roles");
        assert!(store.list_roles().await.is_err());
        assert!(store.list_roles().await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_missing_object_errors() {
        let objects = MemoryObjects::new("assets", None);
        objects.put("gallery/portfolio/a.jpg");
        assert!(objects.remove("gallery/portfolio/a.jpg").await.is_ok());
        let err = objects.remove("gallery/portfolio/a.jpg").await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
