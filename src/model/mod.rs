//! Rows of the site's tables.

mod access;
mod photo;
mod project;
mod unit;

use chrono::{DateTime, Utc};

pub use access::{AccessRequest, AccessRequestOutcome, AdminRole, NewAccessRequest, RoleEntry};
pub use photo::{GalleryPatch, GalleryPhoto, GallerySize, NewPhoto, Photo, PhotoRole};
pub use project::{Include, Project, ProjectKey, ProjectQuery, ProjectRow, ProjectStatus};
pub use unit::{Unit, UnitRow};

/// A row presented in `sort_order` within its parent scope.
pub trait Orderable {
    fn id(&self) -> &str;

    /// Missing values sort as 0.
    fn sort_order(&self) -> Option<i64>;

    fn created_at(&self) -> Option<DateTime<Utc>>;
}
