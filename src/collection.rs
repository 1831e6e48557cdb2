//! Admin operations on one ordered photo collection.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{Error, Result, ResultExt};
use crate::model::{GalleryPatch, GalleryPhoto, Photo};
use crate::ordering::{validate_order, OrderViolation};
use crate::store::{CollectionScope, ObjectStore, SiteStore};
use crate::upload::{parse_role, parse_size};

/// Reorder, retag and delete rows of a photo collection.
#[derive(Clone)]
pub struct CollectionService {
    store: Arc<dyn SiteStore>,
    objects: Arc<dyn ObjectStore>,
}

/// Read the `order` field of a reorder body.
pub fn parse_order(body: &Value) -> Result<Vec<String>> {
    let invalid = || Error::validation("order must be an array of photo ids");
    body.get("order")
        .and_then(Value::as_array)
        .ok_or_else(invalid)?
        .iter()
        .map(|entry| entry.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

fn violation_error(violation: OrderViolation) -> Error {
    let message = match &violation {
        OrderViolation::Duplicate(_) => "order must not include duplicate ids",
        OrderViolation::Foreign(_) => "order contains unknown ids",
        OrderViolation::SizeMismatch { .. } => "order must list every photo exactly once",
    };
    Error::validation_with(message, Value::String(violation.to_string()))
}

impl CollectionService {
    pub fn new(store: Arc<dyn SiteStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }

    pub async fn list(&self, scope: &CollectionScope) -> Result<Vec<Photo>> {
        self.store
            .list_photos(scope)
            .await
            .context("Failed to load photos")
    }

    pub async fn list_gallery(&self) -> Result<Vec<GalleryPhoto>> {
        self.store
            .list_gallery()
            .await
            .context("Failed to load gallery photos")
    }

    /// Rewrite every `sort_order` of the scope to its index in `order`.
    ///
    /// The whole batch is refused unless `order` is exactly the scope's id
    /// set. Rows whose write fails are reported; the others keep their new
    /// position.
    pub async fn persist_order(&self, scope: &CollectionScope, order: &[String]) -> Result<()> {
        let label = scope.label();
        let scope_ids = self
            .store
            .collection_ids(scope)
            .await
            .context("Failed to validate photo order")?;
        validate_order(order, &scope_ids).map_err(violation_error)?;

        let mut failed = Vec::new();
        for (index, id) in order.iter().enumerate() {
            match self.store.set_sort_order(scope, id, index as i64).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(target: "reorder", "{}: {} vanished during reorder", label, id);
                    failed.push(id.clone());
                }
                Err(err) => {
                    error!(target: "reorder", "{}: failed to move {}: {}", label, id, err);
                    failed.push(id.clone());
                }
            }
        }

        if !failed.is_empty() {
            return Err(Error::Incomplete {
                message: "Failed to update photo order".to_string(),
                failed,
            });
        }
        info!(target: "reorder", "{}: stored order of {} photo(s)", label, order.len());
        Ok(())
    }

    /// Apply `{role}` to one photo. Promoting to the primary role demotes
    /// whichever sibling held it.
    pub async fn set_role(&self, scope: &CollectionScope, id: &str, body: &Value) -> Result<Photo> {
        let role = match body.get("role") {
            None | Some(Value::Null) => return Err(Error::validation("role is required")),
            Some(Value::String(role)) => parse_role(scope, role)?,
            Some(_) => parse_role(scope, "")?,
        };

        let updated = if Some(&role) == scope.primary_role().as_ref() {
            self.store
                .set_primary_role(scope, id)
                .await
                .context("Failed to update photo role")?
        } else {
            self.store
                .update_photo_role(scope, id, &role)
                .await
                .context("Failed to update photo role")?
        };
        updated.ok_or_else(|| Error::not_found("Photo not found"))
    }

    /// Delete the row, freeing its object first. A missing or stubborn
    /// object does not block the delete.
    pub async fn delete_item(&self, scope: &CollectionScope, id: &str) -> Result<()> {
        let label = scope.label();
        let storage_path = self
            .store
            .storage_path(scope, id)
            .await
            .context("Failed to delete photo metadata")?
            .ok_or_else(|| Error::not_found("Photo not found"))?;

        if let Err(err) = self.objects.remove(&storage_path).await {
            warn!(target: "delete", "{}: failed to remove {}: {}", label, storage_path, err);
        }

        self.store
            .delete_item(scope, id)
            .await
            .context("Failed to delete photo metadata")?;
        info!(target: "delete", "{}: deleted {}", label, id);
        Ok(())
    }

    /// Patch alt text, caption or size of a gallery photo. Blank text clears the field.
    pub async fn update_gallery(&self, id: &str, body: &Value) -> Result<GalleryPhoto> {
        fn text(value: &Value) -> Option<String> {
            value
                .as_str()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        }

        let mut patch = GalleryPatch::default();
        if let Some(alt_text) = body.get("altText") {
            patch.alt_text = Some(text(alt_text));
        }
        if let Some(caption) = body.get("caption") {
            patch.caption = Some(text(caption));
        }
        if let Some(size) = body.get("size") {
            patch.size = Some(parse_size(size.as_str().unwrap_or_default())?);
        }
        if patch.is_empty() {
            return Err(Error::validation("No fields to update"));
        }

        self.store
            .update_gallery_photo(id, &patch)
            .await
            .context("Failed to update gallery photo")?
            .ok_or_else(|| Error::not_found("Photo not found"))
    }
}

/// Response body of a successful reorder.
pub fn reordered() -> Value {
    json!({ "reordered": true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GallerySize, NewPhoto, PhotoRole};
    use crate::store::{MemoryObjects, MemoryStore};

    fn service() -> (CollectionService, Arc<MemoryStore>, Arc<MemoryObjects>) {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjects::new("assets", None));
        (
            CollectionService::new(store.clone(), objects.clone()),
            store,
            objects,
        )
    }

    async fn gallery_of(store: &MemoryStore, names: &[&str]) -> Vec<String> {
        let mut ids = Vec::new();
        for (index, name) in names.iter().enumerate() {
            let photo = store
                .insert_gallery_photo(&NewPhoto {
                    storage_path: format!("gallery/portfolio/{}.jpg", name),
                    sort_order: index as i64,
                    size: Some(GallerySize::Normal),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(photo.id);
        }
        ids
    }

    fn ids(order: &[&String]) -> Vec<String> {
        order.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_parse_order() {
        assert_eq!(
            parse_order(&json!({ "order": ["a", "b"] })).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        for body in [json!({}), json!({ "order": "a" }), json!({ "order": ["a", 1] })] {
            let err = parse_order(&body).unwrap_err();
            assert_eq!(err.public_message(), "order must be an array of photo ids");
        }
    }

    #[tokio::test]
    async fn test_gallery_reorder_b_a_c() {
        let (service, store, _objects) = service();
        let created = gallery_of(&store, &["a", "b", "c"]).await;
        let (a, b, c) = (&created[0], &created[1], &created[2]);

        service
            .persist_order(&CollectionScope::Gallery, &ids(&[b, a, c]))
            .await
            .unwrap();

        let listed: Vec<(String, Option<i64>)> = store
            .list_gallery()
            .await
            .unwrap()
            .into_iter()
            .map(|photo| (photo.id, photo.sort_order))
            .collect();
        assert_eq!(
            listed,
            vec![(b.clone(), Some(0)), (a.clone(), Some(1)), (c.clone(), Some(2))]
        );
    }

    #[tokio::test]
    async fn test_invalid_order_writes_nothing() {
        let (service, store, _objects) = service();
        let created = gallery_of(&store, &["a", "b", "c"]).await;
        let (a, b, c) = (&created[0], &created[1], &created[2]);
        let before = store.list_gallery().await.unwrap();

        let cases = [
            (ids(&[b, a]), "order must list every photo exactly once"),
            (ids(&[b, b, c]), "order must not include duplicate ids"),
            (
                vec![a.clone(), b.clone(), "stranger".to_string()],
                "order contains unknown ids",
            ),
        ];
        for (order, message) in cases {
            let err = service
                .persist_order(&CollectionScope::Gallery, &order)
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), 400);
            assert_eq!(err.public_message(), message);
        }
        assert_eq!(store.list_gallery().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_partial_reorder_reports_failed_ids() {
        let (service, store, _objects) = service();
        let created = gallery_of(&store, &["a", "b"]).await;
        store.fail_next("set_sort_order");

        let err = service
            .persist_order(&CollectionScope::Gallery, &ids(&[&created[1], &created[0]]))
            .await
            .unwrap_err();
        match err {
            Error::Incomplete { failed, .. } => assert_eq!(failed, vec![created[1].clone()]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_survives_missing_object() {
        let (service, store, objects) = service();
        let created = gallery_of(&store, &["a"]).await;
        assert!(!objects.contains("gallery/portfolio/a.jpg"));

        service
            .delete_item(&CollectionScope::Gallery, &created[0])
            .await
            .unwrap();
        assert!(store.list_gallery().await.unwrap().is_empty());

        let err = service
            .delete_item(&CollectionScope::Gallery, &created[0])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_update_gallery_validation() {
        let (service, store, _objects) = service();
        let created = gallery_of(&store, &["a"]).await;

        let err = service.update_gallery(&created[0], &json!({})).await.unwrap_err();
        assert_eq!(err.public_message(), "No fields to update");

        let photo = service
            .update_gallery(&created[0], &json!({ "caption": "Porch", "size": "tall" }))
            .await
            .unwrap();
        assert_eq!(photo.caption.as_deref(), Some("Porch"));
        assert_eq!(photo.size, Some(GallerySize::Tall));

        let err = service
            .update_gallery("missing", &json!({ "altText": "x" }))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_set_role_validation() {
        let (service, _store, _objects) = service();
        let scope = CollectionScope::UnitPhotos("u1".to_string());

        let err = service.set_role(&scope, "p1", &json!({})).await.unwrap_err();
        assert_eq!(err.public_message(), "role is required");

        let err = service
            .set_role(&scope, "p1", &json!({ "role": "hero" }))
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), "role must be main or gallery");

        let err = service
            .set_role(&scope, "p1", &json!({ "role": PhotoRole::Gallery }))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
