//! Upload slots: the metadata row plus credentials for a direct upload.
//!
//! The row is written before any bytes arrive. A browser that never
//! completes its upload leaves a row pointing at a missing object; deleting
//! that row still succeeds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::{Error, Result, ResultExt};
use crate::model::{GalleryPhoto, GallerySize, NewPhoto, Photo, PhotoRole};
use crate::store::{CollectionScope, ObjectStore, SiteStore};

/// Body of an upload-slot request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub size: Option<String>,
}

/// Where and how the browser sends the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCredentials {
    pub bucket: String,
    pub object_path: String,
    pub signed_url: String,
    pub token: String,
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SlotRow {
    Photo(Photo),
    Gallery(GalleryPhoto),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadSlot {
    pub row: SlotRow,
    pub upload: UploadCredentials,
}

/// Lowercase, anything outside `[a-z0-9.-]` becomes a dash, dash runs collapse.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized = String::with_capacity(filename.len());
    for c in filename.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(c);
    }
    sanitized
}

/// `{prefix}/{parent}/{uuid}-{sanitized filename}`
pub fn build_object_path(scope: &CollectionScope, filename: &str) -> String {
    format!(
        "{}/{}/{}-{}",
        scope.storage_prefix(),
        scope.parent_segment(),
        uuid::Uuid::new_v4(),
        sanitize_filename(filename)
    )
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|text| !text.is_empty())
}

/// Parse and check a role for `scope`. The message lists what is allowed.
pub fn parse_role(scope: &CollectionScope, role: &str) -> Result<PhotoRole> {
    let allowed = scope.allowed_roles();
    let role = PhotoRole::from(role.trim().to_string());
    if allowed.contains(&role) {
        return Ok(role);
    }
    let names: Vec<&str> = allowed.iter().map(PhotoRole::as_str).collect();
    Err(Error::validation(format!("role must be {}", names.join(" or "))))
}

pub fn parse_size(size: &str) -> Result<GallerySize> {
    size.trim()
        .parse()
        .map_err(|_| Error::validation("size must be normal, tall, or wide"))
}

/// Issues upload slots for every photo collection.
#[derive(Clone)]
pub struct UploadBroker {
    store: Arc<dyn SiteStore>,
    objects: Arc<dyn ObjectStore>,
}

impl UploadBroker {
    pub fn new(store: Arc<dyn SiteStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }

    pub async fn create_slot(&self, scope: &CollectionScope, request: UploadRequest) -> Result<UploadSlot> {
        let label = scope.label();

        // Everything the request itself can get wrong is checked before
        // storage or the database is touched.
        let (filename, _content_type) = match (required(&request.filename), required(&request.content_type)) {
            (Some(filename), Some(content_type)) => (filename.to_string(), content_type.to_string()),
            _ => return Err(Error::validation("filename and contentType are required")),
        };
        let role = match scope.primary_role() {
            Some(_) => Some(match required(&request.role) {
                Some(role) => parse_role(scope, role)?,
                None => PhotoRole::Gallery,
            }),
            None => None,
        };
        let size = match (scope, required(&request.size)) {
            (CollectionScope::Gallery, Some(size)) => Some(parse_size(size)?),
            (CollectionScope::Gallery, None) => Some(GallerySize::Normal),
            _ => None,
        };

        let object_path = build_object_path(scope, &filename);
        let signed = self
            .objects
            .create_signed_upload(&object_path)
            .await
            .map_err(|err| {
                error!(target: "upload", "{}: failed to sign upload for {}: {}", label, object_path, err);
                err
            })
            .context("Failed to create signed upload URL")?;

        let sort_order = match request.sort_order {
            Some(sort_order) => sort_order,
            None => self
                .store
                .max_sort_order(scope)
                .await
                .context("Failed to create photo record")?
                .map_or(0, |max| max + 1),
        };

        let promote = role.as_ref() == scope.primary_role().as_ref() && role.is_some();
        let photo = NewPhoto {
            storage_path: object_path.clone(),
            // A primary photo is inserted as gallery and promoted afterwards,
            // so its siblings are demoted in the same step.
            role: if promote { Some(PhotoRole::Gallery) } else { role },
            alt_text: clean_text(request.alt_text),
            caption: clean_text(request.caption),
            sort_order,
            metadata: Some(request.metadata.unwrap_or_else(|| json!({}))),
            size,
        };

        let row = match scope {
            CollectionScope::Gallery => SlotRow::Gallery(
                self.store
                    .insert_gallery_photo(&photo)
                    .await
                    .context("Failed to create photo record")?,
            ),
            _ => {
                let mut inserted = self
                    .store
                    .insert_photo(scope, &photo)
                    .await
                    .context("Failed to create photo record")?;
                if promote {
                    if let Some(promoted) = self
                        .store
                        .set_primary_role(scope, &inserted.id)
                        .await
                        .context("Failed to create photo record")?
                    {
                        inserted = promoted;
                    }
                }
                SlotRow::Photo(inserted)
            }
        };

        info!(target: "upload", "{}: issued upload slot for {}", label, object_path);

        Ok(UploadSlot {
            row,
            upload: UploadCredentials {
                bucket: self.objects.bucket().to_string(),
                public_url: self.objects.public_url(&object_path),
                object_path,
                signed_url: signed.signed_url,
                token: signed.token,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectRow;
    use crate::store::{MemoryObjects, MemoryStore};

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Photo (1).JPG"), "my-photo-1-.jpg");
        assert_eq!(sanitize_filename("a__b--c.png"), "a-b-c.png");
        assert_eq!(sanitize_filename("café.png"), "caf-.png");
    }

    #[test]
    fn test_object_path_layout() {
        let path = build_object_path(&CollectionScope::Gallery, "View.png");
        assert!(path.starts_with("gallery/portfolio/"));
        assert!(path.ends_with("-view.png"));

        let path = build_object_path(&CollectionScope::UnitPhotos("u1".to_string()), "a.jpg");
        assert!(path.starts_with("units/u1/"));
    }

    #[test]
    fn test_parse_role() {
        let scope = CollectionScope::ProjectPhotos("p1".to_string());
        assert_eq!(parse_role(&scope, "hero").unwrap(), PhotoRole::Hero);
        let err = parse_role(&scope, "main").unwrap_err();
        assert_eq!(err.public_message(), "role must be hero or gallery");
    }

    fn request(filename: &str) -> UploadRequest {
        UploadRequest {
            filename: Some(filename.to_string()),
            content_type: Some("image/jpeg".to_string()),
            ..Default::default()
        }
    }

    async fn broker_with_project() -> (UploadBroker, Arc<MemoryStore>, Arc<MemoryObjects>, CollectionScope) {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjects::new(
            "assets",
            Some("https://cdn.test/assets".to_string()),
        ));
        let project = store
            .insert_project(&ProjectRow {
                slug: "elm".to_string(),
                name: "Elm".to_string(),
                status: Default::default(),
                is_public: true,
                address_line1: "1 Elm St".to_string(),
                address_line2: None,
                city: None,
                state: None,
                postal_code: None,
                country: None,
                estimated_completion: None,
                actual_completion: None,
                total_units: None,
                short_description: None,
                long_description: None,
                featured: false,
                sort_order: 0,
                metadata: json!({}),
            })
            .await
            .unwrap();
        let broker = UploadBroker::new(store.clone(), objects.clone());
        (broker, store, objects, CollectionScope::ProjectPhotos(project.id))
    }

    #[tokio::test]
    async fn test_slot_appends_after_highest_sort_order() {
        let (broker, _store, _objects, scope) = broker_with_project().await;

        let first = broker.create_slot(&scope, request("a.jpg")).await.unwrap();
        let second = broker.create_slot(&scope, request("b.jpg")).await.unwrap();

        match (&first.row, &second.row) {
            (SlotRow::Photo(a), SlotRow::Photo(b)) => {
                assert_eq!(a.sort_order, Some(0));
                assert_eq!(b.sort_order, Some(1));
                assert_eq!(a.role, Some(PhotoRole::Gallery));
            }
            _ => panic!("expected photo rows"),
        }
        assert_eq!(second.upload.bucket, "assets");
        assert_eq!(
            second.upload.public_url,
            Some(format!("https://cdn.test/assets/{}", second.upload.object_path))
        );
        assert!(!second.upload.token.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected_before_any_call() {
        let (broker, store, objects, scope) = broker_with_project().await;
        objects.set_signing_down(true);

        let err = broker
            .create_slot(&scope, UploadRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.public_message(), "filename and contentType are required");
        assert!(store.list_photos(&scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signing_failure_creates_no_row() {
        let (broker, store, objects, scope) = broker_with_project().await;
        objects.set_signing_down(true);

        let err = broker.create_slot(&scope, request("a.jpg")).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Failed to create signed upload URL");
        assert!(store.list_photos(&scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_primary_upload_demotes_previous_primary() {
        let (broker, store, _objects, scope) = broker_with_project().await;
        let mut hero = request("a.jpg");
        hero.role = Some("hero".to_string());

        broker.create_slot(&scope, hero.clone()).await.unwrap();
        broker.create_slot(&scope, hero).await.unwrap();

        let heroes = store
            .list_photos(&scope)
            .await
            .unwrap()
            .into_iter()
            .filter(|photo| photo.has_role(&PhotoRole::Hero))
            .count();
        assert_eq!(heroes, 1);
    }

    #[tokio::test]
    async fn test_gallery_slot_size() {
        let (broker, _store, _objects, _scope) = broker_with_project().await;
        let mut wide = request("wide.jpg");
        wide.size = Some("wide".to_string());

        let slot = broker.create_slot(&CollectionScope::Gallery, wide).await.unwrap();
        match slot.row {
            SlotRow::Gallery(photo) => assert_eq!(photo.size, Some(GallerySize::Wide)),
            _ => panic!("expected gallery row"),
        }

        let mut odd = request("odd.jpg");
        odd.size = Some("huge".to_string());
        let err = broker.create_slot(&CollectionScope::Gallery, odd).await.unwrap_err();
        assert_eq!(err.public_message(), "size must be normal, tall, or wide");
    }
}
