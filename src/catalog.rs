//! Public read paths. They never fail on a database error: a broken read
//! is logged and the page renders empty.

use std::sync::Arc;

use tracing::error;

use crate::cascade::ShapeCascade;
use crate::error::{Error, Result};
use crate::model::{Project, ProjectStatus};
use crate::store::SiteStore;
use crate::view::{matches_project, matches_unit, GalleryTile, ProjectPage, ShowcaseItem, UnitPage, ViewBuilder};

pub struct CatalogService {
    store: Arc<dyn SiteStore>,
    cascade: ShapeCascade,
    views: ViewBuilder,
}

impl CatalogService {
    pub fn new(store: Arc<dyn SiteStore>, cascade: ShapeCascade, views: ViewBuilder) -> Self {
        Self {
            store,
            cascade,
            views,
        }
    }

    /// Public projects, optionally of one status, read through the shape cascade.
    pub async fn public_projects(&self, status: Option<ProjectStatus>) -> Vec<Project> {
        let label = match status {
            Some(status) => format!("public/projects?status={}", status),
            None => "public/projects".to_string(),
        };
        let store = self.store.clone();
        self.cascade
            .run(&label, move |shape| {
                let store = store.clone();
                async move { store.public_projects(shape, status).await }
            })
            .await
    }

    /// Completed projects first, then those coming soon.
    async fn all_public(&self) -> Vec<Project> {
        let mut projects = self.public_projects(Some(ProjectStatus::Completed)).await;
        projects.extend(self.public_projects(Some(ProjectStatus::ComingSoon)).await);
        projects
    }

    pub async fn showcase(&self, status: ProjectStatus) -> Vec<ShowcaseItem> {
        self.public_projects(Some(status))
            .await
            .iter()
            .map(|project| self.views.showcase(project))
            .collect()
    }

    pub async fn project_page(&self, slug: &str) -> Result<ProjectPage> {
        self.all_public()
            .await
            .iter()
            .find(|project| matches_project(project, slug))
            .map(|project| self.views.project_page(project))
            .ok_or_else(|| Error::not_found("Project not found"))
    }

    pub async fn unit_page(&self, project_slug: &str, unit_slug: &str) -> Result<UnitPage> {
        let projects = self.all_public().await;
        let project = projects
            .iter()
            .find(|project| matches_project(project, project_slug))
            .ok_or_else(|| Error::not_found("Project not found"))?;
        project
            .units
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|unit| matches_unit(unit, unit_slug))
            .map(|unit| self.views.unit_page(project, unit))
            .ok_or_else(|| Error::not_found("Unit not found"))
    }

    /// First unit of any public project of `status` matching `slug`.
    pub async fn unit_page_by_status(&self, status: ProjectStatus, slug: &str) -> Result<UnitPage> {
        self.public_projects(Some(status))
            .await
            .iter()
            .find_map(|project| {
                project
                    .units
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .find(|unit| matches_unit(unit, slug))
                    .map(|unit| self.views.unit_page(project, unit))
            })
            .ok_or_else(|| Error::not_found("Unit not found"))
    }

    pub async fn gallery(&self) -> Vec<GalleryTile> {
        match self.store.list_gallery().await {
            Ok(photos) => self.views.gallery_tiles(&photos),
            Err(err) => {
                error!(target: "public/gallery", "failed to fetch gallery photos: {}", err);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::OptionalPiece;
    use crate::model::{NewPhoto, PhotoRole, ProjectRow};
    use crate::store::{CollectionScope, MemoryObjects, MemoryStore};
    use crate::validation::UnitInput;
    use serde_json::json;

    fn row(slug: &str, status: ProjectStatus, is_public: bool) -> ProjectRow {
        ProjectRow {
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            status,
            is_public,
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

    async fn seeded(store: MemoryStore) -> (CatalogService, Arc<MemoryStore>) {
        let store = Arc::new(store);
        let oak = store
            .insert_project(&row("oak", ProjectStatus::Completed, true))
            .await
            .unwrap();
        store
            .insert_project(&row("hidden", ProjectStatus::Completed, false))
            .await
            .unwrap();
        store
            .insert_project(&row("pine", ProjectStatus::ComingSoon, true))
            .await
            .unwrap();

        let unit = UnitInput::parse(&json!({ "name": "Unit 1", "unitCode": "Unit 1", "price": 500000 }))
            .unwrap()
            .to_insert_row(&oak.id, 0);
        let units = store.insert_units(&[unit]).await.unwrap();
        store
            .insert_photo(
                &CollectionScope::UnitPhotos(units[0].id.clone()),
                &NewPhoto {
                    storage_path: "units/u/main.jpg".to_string(),
                    role: Some(PhotoRole::Main),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let objects = Arc::new(MemoryObjects::new("assets", Some("https://cdn.test".to_string())));
        let service = CatalogService::new(
            store.clone(),
            ShapeCascade::default(),
            ViewBuilder::new(objects, None),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_public_projects_hide_private() {
        let (service, _store) = seeded(MemoryStore::new()).await;
        let slugs: Vec<String> = service
            .public_projects(Some(ProjectStatus::Completed))
            .await
            .into_iter()
            .map(|project| project.slug)
            .collect();
        assert_eq!(slugs, vec!["oak".to_string()]);
        assert_eq!(service.public_projects(None).await.len(), 2);
    }

    #[tokio::test]
    async fn test_unit_page_by_code() {
        let (service, _store) = seeded(MemoryStore::new()).await;
        let page = service.unit_page("OAK", "unit-1").await.unwrap();
        assert_eq!(page.hero_image.as_deref(), Some("https://cdn.test/units/u/main.jpg"));
        assert_eq!(page.formatted_price.as_deref(), Some("$500,000"));

        let page = service
            .unit_page_by_status(ProjectStatus::Completed, "Unit 1")
            .await
            .unwrap();
        assert_eq!(page.unit.name, "Unit 1");

        let err = service.unit_page("oak", "unit-9").await.unwrap_err();
        assert_eq!(err.public_message(), "Unit not found");
        let err = service.project_page("hidden").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_schema_lag_still_renders() {
        let (service, store) =
            seeded(MemoryStore::new().with_missing_pieces(&[OptionalPiece::UnitPhotoRole])).await;

        let page = service.project_page("pine").await.unwrap();
        assert_eq!(page.project.slug, "pine");
        assert!(store
            .shapes_read()
            .contains(&"without unit photo role"));
    }

    #[tokio::test]
    async fn test_missing_project_photo_role_keeps_unit_photos() {
        let (service, store) =
            seeded(MemoryStore::new().with_missing_pieces(&[OptionalPiece::ProjectPhotoRole])).await;

        let page = service.unit_page("oak", "unit-1").await.unwrap();
        assert_eq!(page.hero_image.as_deref(), Some("https://cdn.test/units/u/main.jpg"));
        assert_eq!(page.unit.unit_photos.as_ref().map(Vec::len), Some(1));

        let shapes = store.shapes_read();
        assert_eq!(shapes[..2], ["full", "without project photo role"]);
        assert!(!shapes.contains(&"without photos"));
    }

    #[tokio::test]
    async fn test_broken_store_renders_empty() {
        let (service, store) = seeded(MemoryStore::new()).await;
        store.fail_next("list_gallery");
        assert!(service.gallery().await.is_empty());
    }
}
