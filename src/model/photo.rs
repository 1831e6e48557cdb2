use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::Orderable;

/// Tag carried by project and unit photos.
///
/// Unknown tags read from the store are kept verbatim so they survive a
/// round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PhotoRole {
    Hero,
    Main,
    Gallery,
    Other(String),
}

impl PhotoRole {
    pub fn as_str(&self) -> &str {
        match self {
            PhotoRole::Hero => "hero",
            PhotoRole::Main => "main",
            PhotoRole::Gallery => "gallery",
            PhotoRole::Other(tag) => tag,
        }
    }
}

impl From<String> for PhotoRole {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hero" => PhotoRole::Hero,
            "main" => PhotoRole::Main,
            "gallery" => PhotoRole::Gallery,
            _ => PhotoRole::Other(value),
        }
    }
}

impl From<PhotoRole> for String {
    fn from(role: PhotoRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for PhotoRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project or unit photo row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    pub storage_path: String,
    #[serde(default)]
    pub role: Option<PhotoRole>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Photo {
    pub fn has_role(&self, role: &PhotoRole) -> bool {
        self.role.as_ref() == Some(role)
    }
}

impl Orderable for Photo {
    fn id(&self) -> &str {
        &self.id
    }

    fn sort_order(&self) -> Option<i64> {
        self.sort_order
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// Grid span of a gallery tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GallerySize {
    #[default]
    Normal,
    Tall,
    Wide,
}

impl GallerySize {
    pub fn as_str(&self) -> &'static str {
        match self {
            GallerySize::Normal => "normal",
            GallerySize::Tall => "tall",
            GallerySize::Wide => "wide",
        }
    }
}

impl FromStr for GallerySize {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "normal" => Ok(GallerySize::Normal),
            "tall" => Ok(GallerySize::Tall),
            "wide" => Ok(GallerySize::Wide),
            other => Err(format!("unknown gallery size '{}'", other)),
        }
    }
}

/// A photo of the flat portfolio gallery. No parent, no role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryPhoto {
    pub id: String,
    pub storage_path: String,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub size: Option<GallerySize>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Orderable for GalleryPhoto {
    fn id(&self) -> &str {
        &self.id
    }

    fn sort_order(&self) -> Option<i64> {
        self.sort_order
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// Fields written when a photo row is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewPhoto {
    pub storage_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<PhotoRole>,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub sort_order: i64,
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<GallerySize>,
}

/// Partial update of a gallery photo. Only present fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GalleryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<GallerySize>,
}

impl GalleryPatch {
    pub fn is_empty(&self) -> bool {
        self.alt_text.is_none() && self.caption.is_none() && self.size.is_none()
    }
}
