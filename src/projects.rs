//! Project and unit administration.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{Error, Result, ResultExt};
use crate::model::{Include, Project, ProjectKey, ProjectQuery, Unit, UnitRow};
use crate::store::{CollectionScope, ObjectStore, SiteStore};
use crate::validation::{parse_units, ProjectInput, UnitInput};

/// Project CRUD with nested units.
#[derive(Clone)]
pub struct ProjectService {
    store: Arc<dyn SiteStore>,
    objects: Arc<dyn ObjectStore>,
}

impl ProjectService {
    pub fn new(store: Arc<dyn SiteStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }

    pub async fn list(&self, query: &ProjectQuery) -> Result<Vec<Project>> {
        let mut projects = self
            .store
            .list_projects(query)
            .await
            .context("Failed to fetch projects")?;
        for project in projects.iter_mut() {
            project.sort_embeds();
        }
        Ok(projects)
    }

    pub async fn get(&self, identifier: &str, include: Include) -> Result<Project> {
        let mut project = self
            .store
            .get_project(&ProjectKey::parse(identifier), include)
            .await
            .context("Failed to fetch project")?
            .ok_or_else(|| Error::not_found("Project not found"))?;
        project.sort_embeds();
        Ok(project)
    }

    /// Project id behind a uuid or slug.
    pub async fn resolve_id(&self, identifier: &str) -> Result<String> {
        self.store
            .get_project(&ProjectKey::parse(identifier), Include::default())
            .await?
            .map(|project| project.id)
            .ok_or_else(|| Error::not_found("Project not found"))
    }

    async fn hydrated(&self, fallback: Project) -> Project {
        match self
            .store
            .get_project(&ProjectKey::Id(fallback.id.clone()), Include::ALL)
            .await
        {
            Ok(Some(mut project)) => {
                project.sort_embeds();
                project
            }
            Ok(None) => fallback,
            Err(err) => {
                warn!(target: "projects", "failed to hydrate {}: {}", fallback.id, err);
                fallback
            }
        }
    }

    /// Create a project and its nested units.
    ///
    /// Units are written after the project. When that fails the project row
    /// is deleted again; only if the delete fails too does the caller get a
    /// partial success.
    pub async fn create(&self, body: &Value) -> Result<Project> {
        let input = ProjectInput::parse(body)?;
        let project = self
            .store
            .insert_project(&input.to_row())
            .await
            .context("Failed to create project")?;
        info!(target: "projects", "created project {} ({})", project.slug, project.id);

        let units = input.units.unwrap_or_default();
        if !units.is_empty() {
            let rows: Vec<UnitRow> = units
                .iter()
                .enumerate()
                .map(|(index, unit)| unit.to_insert_row(&project.id, index as i64))
                .collect();
            if let Err(err) = self.store.insert_units(&rows).await {
                error!(target: "projects", "failed to insert units of {}: {}", project.id, err);
                return match self.store.delete_project(&project.id).await {
                    Ok(()) => Err(Error::RolledBack {
                        message: "Failed to create project units".to_string(),
                        source: Box::new(err),
                    }),
                    Err(cleanup) => {
                        error!(
                            target: "projects",
                            "failed to roll back project {}: {}", project.id, cleanup
                        );
                        Err(Error::Partial {
                            message: "Project created but adding units failed".to_string(),
                            details: err.to_string(),
                        })
                    }
                };
            }
        }

        Ok(self.hydrated(project).await)
    }

    /// Replace the project's columns. A `units` key also syncs its units:
    /// absent ones are deleted, known ids updated, the rest inserted.
    pub async fn update(&self, identifier: &str, body: &Value) -> Result<Project> {
        let input = ProjectInput::parse(body)?;
        let id = self.resolve_id(identifier).await?;
        let project = self
            .store
            .update_project(&id, &input.to_row())
            .await
            .context("Failed to update project")?
            .ok_or_else(|| Error::not_found("Project not found"))?;

        if let Some(units) = &input.units {
            self.sync_units(&id, units)
                .await
                .context("Failed to update project units")?;
        }
        Ok(self.hydrated(project).await)
    }

    async fn sync_units(&self, project_id: &str, units: &[UnitInput]) -> Result<()> {
        let existing = self.store.list_units(project_id).await?;
        let existing_ids: HashSet<&str> = existing.iter().map(|unit| unit.id.as_str()).collect();
        let kept: HashSet<&str> = units.iter().filter_map(|unit| unit.id.as_deref()).collect();

        let removed: Vec<String> = existing
            .iter()
            .filter(|unit| !kept.contains(unit.id.as_str()))
            .map(|unit| unit.id.clone())
            .collect();
        if !removed.is_empty() {
            self.remove_unit_objects(&removed).await;
            self.store.delete_units(project_id, &removed).await?;
        }

        let mut next_order = existing.iter().filter_map(|unit| unit.sort_order).max().map_or(0, |max| max + 1);
        let mut inserts = Vec::new();
        for (index, unit) in units.iter().enumerate() {
            match unit.id.as_deref().filter(|id| existing_ids.contains(id)) {
                Some(unit_id) => {
                    let mut row = unit.to_update_row(project_id);
                    if row.sort_order.is_none() {
                        row.sort_order = Some(index as i64);
                    }
                    self.store.update_unit(project_id, unit_id, &row).await?;
                }
                None => {
                    inserts.push(unit.to_insert_row(project_id, next_order));
                    next_order += 1;
                }
            }
        }
        if !inserts.is_empty() {
            self.store.insert_units(&inserts).await?;
        }
        Ok(())
    }

    /// Delete the project after freeing the objects of its photos.
    pub async fn delete(&self, identifier: &str) -> Result<()> {
        let id = self.resolve_id(identifier).await?;

        let scope = CollectionScope::ProjectPhotos(id.clone());
        match self.store.list_photos(&scope).await {
            Ok(photos) => {
                for photo in photos {
                    self.remove_object(&photo.storage_path).await;
                }
            }
            Err(err) => warn!(target: "projects", "failed to list photos of {}: {}", id, err),
        }
        match self.store.list_units(&id).await {
            Ok(units) => {
                let unit_ids: Vec<String> = units.into_iter().map(|unit| unit.id).collect();
                self.remove_unit_objects(&unit_ids).await;
            }
            Err(err) => warn!(target: "projects", "failed to list units of {}: {}", id, err),
        }

        self.store
            .delete_project(&id)
            .await
            .context("Failed to delete project")?;
        info!(target: "projects", "deleted project {}", id);
        Ok(())
    }

    /// Append units; their order continues after the existing ones.
    pub async fn add_units(&self, identifier: &str, body: &Value) -> Result<Vec<Unit>> {
        let units = parse_units(body)?;
        let id = self.resolve_id(identifier).await?;
        let first = self
            .store
            .list_units(&id)
            .await
            .context("Failed to insert units")?
            .iter()
            .filter_map(|unit| unit.sort_order)
            .max()
            .map_or(0, |max| max + 1);

        let rows: Vec<UnitRow> = units
            .iter()
            .enumerate()
            .map(|(index, unit)| unit.to_insert_row(&id, first + index as i64))
            .collect();
        self.store
            .insert_units(&rows)
            .await
            .context("Failed to insert units")
    }

    pub async fn update_unit(&self, identifier: &str, unit_id: &str, body: &Value) -> Result<Unit> {
        let unit = UnitInput::parse(body)?;
        let id = self.resolve_id(identifier).await?;
        self.store
            .update_unit(&id, unit_id, &unit.to_update_row(&id))
            .await
            .context("Failed to update unit")?
            .ok_or_else(|| Error::not_found("Unit not found"))
    }

    pub async fn delete_unit(&self, identifier: &str, unit_id: &str) -> Result<()> {
        let id = self.resolve_id(identifier).await?;
        let unit_ids = vec![unit_id.to_string()];
        self.remove_unit_objects(&unit_ids).await;
        self.store
            .delete_units(&id, &unit_ids)
            .await
            .context("Failed to delete unit")
    }

    async fn remove_unit_objects(&self, unit_ids: &[String]) {
        for unit_id in unit_ids {
            let scope = CollectionScope::UnitPhotos(unit_id.clone());
            match self.store.list_photos(&scope).await {
                Ok(photos) => {
                    for photo in photos {
                        self.remove_object(&photo.storage_path).await;
                    }
                }
                Err(err) => warn!(target: "projects", "failed to list photos of unit {}: {}", unit_id, err),
            }
        }
    }

    async fn remove_object(&self, path: &str) {
        if let Err(err) = self.objects.remove(path).await {
            warn!(target: "projects", "failed to remove {}: {}", path, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewPhoto, PhotoRole};
    use crate::store::{MemoryObjects, MemoryStore};
    use serde_json::json;

    fn service() -> (ProjectService, Arc<MemoryStore>, Arc<MemoryObjects>) {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjects::new("assets", None));
        (ProjectService::new(store.clone(), objects.clone()), store, objects)
    }

    fn payload(slug: &str) -> Value {
        json!({
            "slug": slug,
            "name": "Elm Street",
            "status": "completed",
            "isPublic": true,
            "addressLine1": "12 Elm St",
            "units": [
                {
                    "name": "A",
                    "unitCode": "A-1",
                    "price": "425000.499",
                    "bedrooms": 3,
                    "bathrooms": "2.5",
                    "squareFeet": 1450.6,
                    "description": "Corner unit"
                },
                { "name": "B", "availabilityStatus": "Sold" }
            ]
        })
    }

    #[tokio::test]
    async fn test_create_round_trips_unit_fields() {
        let (service, _store, _objects) = service();
        let created = service.create(&payload("elm")).await.unwrap();

        let fetched = service
            .get("elm", Include::parse(Some("units")))
            .await
            .unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.country.as_deref(), Some("USA"));

        let units = fetched.units.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "A");
        assert_eq!(units[0].unit_code.as_deref(), Some("A-1"));
        assert_eq!(units[0].price, Some(425000.5));
        assert_eq!(units[0].bedrooms, Some(3.0));
        assert_eq!(units[0].bathrooms, Some(2.5));
        assert_eq!(units[0].square_feet, Some(1451.0));
        assert_eq!(units[0].description.as_deref(), Some("Corner unit"));
        assert_eq!(units[0].sort_order, Some(0));
        assert!(units[1].is_sold());
    }

    #[tokio::test]
    async fn test_failed_units_roll_back_project() {
        let (service, store, _objects) = service();
        store.fail_next("insert_units");

        let err = service.create(&payload("elm")).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Failed to create project units");
        assert_eq!(err.details().unwrap()["rolledBack"], true);
        assert!(store
            .list_projects(&ProjectQuery::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_rollback_is_partial() {
        let (service, store, _objects) = service();
        store.fail_next("insert_units");
        store.fail_next("delete_project");

        let err = service.create(&payload("elm")).await.unwrap_err();
        assert_eq!(err.status_code(), 207);
        assert_eq!(err.public_message(), "Project created but adding units failed");
    }

    #[tokio::test]
    async fn test_update_syncs_units() {
        let (service, _store, _objects) = service();
        let created = service.create(&payload("elm")).await.unwrap();
        let units = created.units.unwrap();
        let kept = &units[0];

        let mut body = payload("elm");
        body["units"] = json!([
            { "id": kept.id, "name": "A renamed" },
            { "name": "C" }
        ]);
        let updated = service.update(&created.id, &body).await.unwrap();

        let names: Vec<String> = updated
            .units
            .unwrap()
            .into_iter()
            .map(|unit| unit.name)
            .collect();
        assert_eq!(names, vec!["A renamed".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn test_update_unknown_project() {
        let (service, _store, _objects) = service();
        let err = service.update("nowhere", &payload("nowhere")).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.public_message(), "Project not found");
    }

    #[tokio::test]
    async fn test_add_units_continues_order() {
        let (service, _store, _objects) = service();
        service.create(&payload("elm")).await.unwrap();

        let added = service
            .add_units("elm", &json!({ "units": [{ "name": "C" }] }))
            .await
            .unwrap();
        assert_eq!(added[0].sort_order, Some(2));

        let err = service.add_units("elm", &json!({ "units": [] })).await.unwrap_err();
        assert_eq!(err.public_message(), "No units provided");
    }

    #[tokio::test]
    async fn test_delete_frees_objects() {
        let (service, store, objects) = service();
        let created = service.create(&payload("elm")).await.unwrap();
        let scope = CollectionScope::ProjectPhotos(created.id.clone());
        store
            .insert_photo(
                &scope,
                &NewPhoto {
                    storage_path: "projects/elm/a.jpg".to_string(),
                    role: Some(PhotoRole::Hero),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        objects.put("projects/elm/a.jpg");

        service.delete("elm").await.unwrap();
        assert!(!objects.contains("projects/elm/a.jpg"));
        assert_eq!(
            service.get("elm", Include::default()).await.unwrap_err().status_code(),
            404
        );
    }

    #[tokio::test]
    async fn test_update_unit_not_found() {
        let (service, _store, _objects) = service();
        service.create(&payload("elm")).await.unwrap();
        let err = service
            .update_unit("elm", "missing", &json!({ "name": "X" }))
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), "Unit not found");
    }
}
