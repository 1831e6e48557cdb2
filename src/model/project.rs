use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::{Orderable, Photo, Unit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    ComingSoon,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::ComingSoon => "coming_soon",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "coming_soon" => Ok(ProjectStatus::ComingSoon),
            "completed" => Ok(ProjectStatus::Completed),
            other => Err(format!("unknown project status '{}'", other)),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project row, optionally with its units and photos embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub estimated_completion: Option<String>,
    #[serde(default)]
    pub actual_completion: Option<String>,
    #[serde(default)]
    pub total_units: Option<i64>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub hero_image_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Vec<Unit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_photos: Option<Vec<Photo>>,
}

impl Project {
    /// Build the stored representation of a freshly written row.
    pub fn from_row(id: &str, row: &ProjectRow, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.to_string(),
            slug: row.slug.clone(),
            name: row.name.clone(),
            status: row.status,
            is_public: row.is_public,
            address_line1: Some(row.address_line1.clone()),
            address_line2: row.address_line2.clone(),
            city: row.city.clone(),
            state: row.state.clone(),
            postal_code: row.postal_code.clone(),
            country: row.country.clone(),
            estimated_completion: row.estimated_completion.clone(),
            actual_completion: row.actual_completion.clone(),
            total_units: row.total_units,
            short_description: row.short_description.clone(),
            long_description: row.long_description.clone(),
            hero_image_url: None,
            featured: row.featured,
            sort_order: Some(row.sort_order),
            metadata: Some(row.metadata.clone()),
            created_at,
            units: None,
            project_photos: None,
        }
    }

    /// Put embedded units and photos in presentation order.
    pub fn sort_embeds(&mut self) {
        if let Some(units) = self.units.as_mut() {
            crate::ordering::presentation_sort(units);
            for unit in units.iter_mut() {
                if let Some(photos) = unit.unit_photos.as_mut() {
                    crate::ordering::presentation_sort(photos);
                }
            }
        }
        if let Some(photos) = self.project_photos.as_mut() {
            crate::ordering::presentation_sort(photos);
        }
    }

    /// Overwrite the writable columns, keeping id, creation time and embeds.
    pub fn apply_row(&mut self, row: &ProjectRow) {
        let hero_image_url = self.hero_image_url.take();
        let mut updated = Project::from_row(&self.id, row, self.created_at);
        updated.hero_image_url = hero_image_url;
        updated.units = self.units.take();
        updated.project_photos = self.project_photos.take();
        *self = updated;
    }
}

impl Orderable for Project {
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

/// Writable project columns, as sent to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRow {
    pub slug: String,
    pub name: String,
    pub status: ProjectStatus,
    pub is_public: bool,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub estimated_completion: Option<String>,
    pub actual_completion: Option<String>,
    pub total_units: Option<i64>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub featured: bool,
    pub sort_order: i64,
    pub metadata: Value,
}

/// Embeds requested alongside a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Include {
    pub units: bool,
    pub photos: bool,
}

impl Include {
    pub const ALL: Include = Include {
        units: true,
        photos: true,
    };

    /// Parse `include=units,photos` (case-insensitive, unknown entries ignored).
    pub fn parse(value: Option<&str>) -> Self {
        let mut include = Include::default();
        for entry in value.unwrap_or_default().split(',') {
            match entry.trim().to_ascii_lowercase().as_str() {
                "units" => include.units = true,
                "photos" => include.photos = true,
                _ => {}
            }
        }
        include
    }

    /// PostgREST select list for these embeds.
    pub fn select(&self) -> String {
        let mut selections = vec!["*"];
        if self.units {
            selections.push("units(*)");
        }
        if self.photos {
            selections.push("project_photos(*)");
        }
        selections.join(",")
    }
}

/// Filters of the project listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
    pub featured: bool,
    pub is_public: Option<bool>,
    pub limit: Option<usize>,
    pub include: Include,
}

/// How a project is addressed in a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectKey {
    Id(String),
    Slug(String),
}

impl ProjectKey {
    /// UUIDs address by id, anything else by slug.
    pub fn parse(identifier: &str) -> Self {
        match uuid::Uuid::parse_str(identifier) {
            Ok(_) => ProjectKey::Id(identifier.to_string()),
            Err(_) => ProjectKey::Slug(identifier.to_string()),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            ProjectKey::Id(_) => "id",
            ProjectKey::Slug(_) => "slug",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ProjectKey::Id(value) | ProjectKey::Slug(value) => value,
        }
    }

    pub fn matches(&self, project: &Project) -> bool {
        match self {
            ProjectKey::Id(id) => &project.id == id,
            ProjectKey::Slug(slug) => &project.slug == slug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_parse() {
        assert_eq!(Include::parse(None), Include::default());
        assert_eq!(
            Include::parse(Some(" Units , photos,extra")),
            Include::ALL
        );
        assert_eq!(Include::ALL.select(), "*,units(*),project_photos(*)");
    }

    #[test]
    fn test_project_key() {
        assert_eq!(
            ProjectKey::parse("0b6a4f9e-5f1c-4c7e-9d51-2d4f0b2b8e11").column(),
            "id"
        );
        assert_eq!(ProjectKey::parse("elm-street").column(), "slug");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("completed".parse::<ProjectStatus>(), Ok(ProjectStatus::Completed));
        assert!("archived".parse::<ProjectStatus>().is_err());
    }
}
