use serde::de::DeserializeOwned;
use tracing::warn;

use super::CollectionEndpoint;
use crate::error::{Error, Result};
use crate::model::{Orderable, Photo, PhotoRole};
use crate::ordering::{apply_order, reorder};

/// A collection as the editor sees it.
///
/// Rows come from the server; the drag order is held locally on top of
/// them, so a background refetch never undoes a gesture the editor just
/// made. Every write is applied locally first. When the server rejects it
/// the list shows a banner and re-derives itself from a fresh fetch.
#[derive(Debug, Clone)]
pub struct OrderedList<R> {
    rows: Vec<R>,
    local_order: Option<Vec<String>>,
    banner: Option<String>,
}

impl<R> Default for OrderedList<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            local_order: None,
            banner: None,
        }
    }
}

impl<R: Orderable + Clone + DeserializeOwned> OrderedList<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<R>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Rows in display order.
    pub fn rows(&self) -> Vec<R> {
        apply_order(&self.rows, self.local_order.as_deref())
    }

    pub fn ids(&self) -> Vec<String> {
        self.rows().iter().map(|row| row.id().to_string()).collect()
    }

    /// Message of the last rejected write.
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Take freshly fetched rows. A held drag order survives.
    pub fn receive(&mut self, rows: Vec<R>) {
        self.rows = rows;
    }

    pub async fn refresh(&mut self, endpoint: &CollectionEndpoint<'_>) -> Result<()> {
        let rows = endpoint.list().await?;
        self.receive(rows);
        Ok(())
    }

    /// Drop `moved_id` onto `target_id` and persist the resulting order.
    ///
    /// `Ok(false)` when the gesture changes nothing; no request is sent.
    pub async fn move_item(&mut self, endpoint: &CollectionEndpoint<'_>, moved_id: &str, target_id: &str) -> Result<bool> {
        let current = self.ids();
        let next = reorder(&current, moved_id, target_id);
        if next == current {
            return Ok(false);
        }

        self.local_order = Some(next.clone());
        self.banner = None;
        match endpoint.persist(&next).await {
            Ok(()) => Ok(true),
            Err(err) => {
                self.reject(endpoint, &err).await;
                Err(err)
            }
        }
    }

    /// Show the failure and rebuild from the server's view.
    async fn reject(&mut self, endpoint: &CollectionEndpoint<'_>, err: &Error) {
        warn!(target: "reorder", "{} write rejected: {}", endpoint.scope().label(), err);
        self.banner = Some(err.public_message());
        self.local_order = None;
        match endpoint.list().await {
            Ok(rows) => self.rows = rows,
            Err(refetch) => warn!(target: "reorder", "refetch after rejection failed: {}", refetch),
        }
    }
}

impl OrderedList<Photo> {
    /// Make `id` the one photo of the scope holding its primary role.
    pub async fn set_primary(&mut self, endpoint: &CollectionEndpoint<'_>, id: &str) -> Result<()> {
        let primary = endpoint
            .scope()
            .primary_role()
            .ok_or_else(|| Error::validation("role is required"))?;
        if !self.rows.iter().any(|row| row.id == id) {
            return Err(Error::not_found("Photo not found"));
        }

        for row in self.rows.iter_mut() {
            if row.id == id {
                row.role = Some(primary.clone());
            } else if row.has_role(&primary) {
                row.role = Some(PhotoRole::Gallery);
            }
        }

        self.banner = None;
        match endpoint.set_role(id, &primary).await {
            Ok(photo) => {
                if let Some(row) = self.rows.iter_mut().find(|row| row.id == photo.id) {
                    *row = photo;
                }
                Ok(())
            }
            Err(err) => {
                self.reject(endpoint, &err).await;
                Err(err)
            }
        }
    }

    /// The photo holding the scope's primary role, if any.
    pub fn primary(&self, role: &PhotoRole) -> Option<&Photo> {
        self.rows.iter().find(|row| row.has_role(role))
    }
}
