//! Public page data assembled from project rows.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};

use crate::model::{GalleryPhoto, Photo, PhotoRole, Project, ProjectStatus, Unit};
use crate::ordering::sort_rows;
use crate::store::ObjectStore;

const HERO_STRIP_LEN: usize = 4;

/// Trim, lowercase, whitespace runs become a dash.
pub fn normalize_slug(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// `$1,234` or `$1,234.5`: whole dollars with up to two decimals.
pub fn format_price(value: Option<f64>) -> Option<String> {
    let value = value.filter(|value| value.is_finite())?;
    let cents = (value.abs() * 100.0).round() as u64;
    let (dollars, fraction) = (cents / 100, cents % 100);

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let decimals = match fraction {
        0 => String::new(),
        f if f % 10 == 0 => format!(".{}", f / 10),
        f => format!(".{:02}", f),
    };
    Some(format!("{}${}{}", sign, grouped, decimals))
}

/// Non-empty address parts joined with commas. Country is left out.
pub fn format_address(project: &Project) -> String {
    [
        &project.address_line1,
        &project.address_line2,
        &project.city,
        &project.state,
        &project.postal_code,
    ]
    .into_iter()
    .filter_map(|part| part.as_deref().filter(|part| !part.is_empty()))
    .collect::<Vec<_>>()
    .join(", ")
}

fn month_year(date: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(date).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(&format!("{}-01", date), "%Y-%m-%d").ok())?;
    Some(date.format("%B %Y").to_string())
}

pub fn completion_label(project: &Project) -> String {
    let date = project
        .actual_completion
        .as_deref()
        .or(project.estimated_completion.as_deref())
        .filter(|date| !date.is_empty());
    let date = match date {
        Some(date) => month_year(date).unwrap_or_else(|| date.to_string()),
        None => return "Completion date forthcoming".to_string(),
    };
    match project.status {
        ProjectStatus::Completed => format!("Completed {}", date),
        ProjectStatus::ComingSoon => format!("Estimated completion {}", date),
    }
}

fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|value| *value != 0.0)
}

fn room_parts(unit: &Unit) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(bedrooms) = nonzero(unit.bedrooms) {
        parts.push(format!("{} bd", bedrooms));
    }
    if let Some(bathrooms) = nonzero(unit.bathrooms) {
        parts.push(format!("{} ba", bathrooms));
    }
    if let Some(square_feet) = nonzero(unit.square_feet) {
        parts.push(format!("{} sqft", square_feet));
    }
    parts
}

pub fn unit_details(unit: &Unit) -> String {
    let parts = room_parts(unit);
    if parts.is_empty() {
        return unit
            .description
            .clone()
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "Residence".to_string());
    }
    parts.join(" • ")
}

/// Summary line of a project card: its first three units, else its description.
pub fn project_details(project: &Project) -> String {
    match project.units.as_deref() {
        Some(units) if !units.is_empty() => units
            .iter()
            .take(3)
            .map(|unit| {
                let parts = room_parts(unit);
                if parts.is_empty() {
                    unit.name.clone()
                } else {
                    format!("{}: {}", unit.name, parts.join(" • "))
                }
            })
            .collect::<Vec<_>>()
            .join(" • "),
        _ => project
            .short_description
            .clone()
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "Residential completion".to_string()),
    }
}

/// Unit addressed by id, unit code, or slugged unit code.
pub fn matches_unit(unit: &Unit, slug: &str) -> bool {
    let wanted = slug.to_lowercase();
    let code = unit.unit_code.as_deref().unwrap_or_default();
    unit.id == slug || code.to_lowercase() == wanted || normalize_slug(code) == wanted
}

pub fn matches_project(project: &Project, slug: &str) -> bool {
    let wanted = normalize_slug(slug);
    project.slug == slug || project.slug == wanted || normalize_slug(&project.slug) == wanted
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryImage {
    pub id: String,
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryTile {
    pub id: String,
    pub url: String,
    pub alt: String,
    pub size: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stat {
    pub label: &'static str,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowcaseUnit {
    pub id: String,
    pub name: String,
    pub unit_code: String,
    pub price: Option<f64>,
    pub square_feet: Option<f64>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub details: String,
    pub hero_image: Option<String>,
    pub gallery: Vec<GalleryImage>,
}

/// A project card of the completed / coming-soon listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowcaseItem {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub details: String,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub completion_label: String,
    pub hero_strip_candidates: Vec<Image>,
    pub units: Vec<ShowcaseUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitPage {
    pub project: Project,
    pub unit: Unit,
    pub hero_image: Option<String>,
    pub gallery: Vec<GalleryImage>,
    pub floorplan_url: Option<String>,
    pub formatted_price: Option<String>,
    pub stats: Vec<Stat>,
    pub availability: String,
    pub address: String,
    pub map_url: Option<String>,
    pub is_static_map: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPageUnit {
    pub id: String,
    pub name: String,
    pub unit_code: String,
    pub price: Option<f64>,
    pub formatted_price: Option<String>,
    pub square_feet: Option<f64>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub short_description: Option<String>,
    pub details: String,
    pub hero_image: Option<String>,
    pub availability: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPage {
    pub project: Project,
    pub hero_images: Vec<Image>,
    pub gallery: Vec<GalleryImage>,
    pub completion_label: String,
    pub address: String,
    pub map_url: Option<String>,
    pub is_static_map: bool,
    pub units: Vec<ProjectPageUnit>,
}

fn availability(unit: &Unit) -> String {
    unit.availability_status
        .clone()
        .filter(|status| !status.is_empty())
        .unwrap_or_else(|| "Available".to_string())
}

fn stat(label: &'static str, value: Option<f64>) -> Stat {
    Stat {
        label,
        value: value.map_or_else(|| json!("\u{2014}"), |value| json!(value)),
    }
}

/// Turns rows into page data: resolves image URLs and map links.
#[derive(Clone)]
pub struct ViewBuilder {
    objects: Arc<dyn ObjectStore>,
    maps_api_key: Option<String>,
}

impl ViewBuilder {
    pub fn new(objects: Arc<dyn ObjectStore>, maps_api_key: Option<String>) -> Self {
        Self {
            objects,
            maps_api_key,
        }
    }

    /// Absolute URLs pass through; stored paths resolve to their public URL.
    pub fn image_url(&self, path: Option<&str>) -> Option<String> {
        let path = path.filter(|path| !path.is_empty())?;
        if path.starts_with("http") {
            return Some(path.to_string());
        }
        self.objects.public_url(path)
    }

    pub fn is_static_map(&self) -> bool {
        self.maps_api_key.is_some()
    }

    pub fn map_url(&self, address: &str) -> Option<String> {
        if address.is_empty() {
            return None;
        }
        let encoded = urlencoding::encode(address);
        Some(match &self.maps_api_key {
            Some(key) => format!(
                "https://maps.googleapis.com/maps/api/staticmap?center={0}&zoom=16&size=600x400&markers=color:0x3b7d98|{0}&key={1}",
                encoded, key
            ),
            None => format!(
                "https://maps.google.com/maps?q={}&t=&z=16&ie=UTF8&iwloc=&output=embed",
                encoded
            ),
        })
    }

    fn unit_photos(unit: &Unit) -> Vec<Photo> {
        sort_rows(unit.unit_photos.as_deref().unwrap_or_default())
    }

    /// The unit's `main` photo, else its first photo.
    fn unit_hero(&self, photos: &[Photo]) -> Option<String> {
        let main = photos
            .iter()
            .find(|photo| photo.has_role(&PhotoRole::Main))
            .or_else(|| photos.first());
        self.image_url(main.map(|photo| photo.storage_path.as_str()))
    }

    fn gallery(&self, photos: &[Photo], fallback_alt: &str) -> Vec<GalleryImage> {
        photos
            .iter()
            .filter_map(|photo| {
                Some(GalleryImage {
                    id: photo.id.clone(),
                    url: self.image_url(Some(&photo.storage_path))?,
                    alt: photo
                        .alt_text
                        .clone()
                        .filter(|alt| !alt.is_empty())
                        .unwrap_or_else(|| fallback_alt.to_string()),
                })
            })
            .collect()
    }

    pub fn showcase(&self, project: &Project) -> ShowcaseItem {
        let project_photos = sort_rows(project.project_photos.as_deref().unwrap_or_default());
        let project_alt = format!("{} photo", project.name);
        let units = project.units.as_deref().unwrap_or_default();

        let project_heroes: Vec<Image> = project_photos
            .iter()
            .filter(|photo| photo.has_role(&PhotoRole::Hero))
            .filter_map(|photo| {
                Some(Image {
                    url: self.image_url(Some(&photo.storage_path))?,
                    alt: photo.alt_text.clone().filter(|alt| !alt.is_empty()).unwrap_or_else(|| project_alt.clone()),
                })
            })
            .collect();

        let hero_strip_candidates = if project_heroes.len() >= HERO_STRIP_LEN {
            project_heroes
        } else {
            let unit_mains = units.iter().filter_map(|unit| {
                let photos = Self::unit_photos(unit);
                let main = photos
                    .iter()
                    .find(|photo| photo.has_role(&PhotoRole::Main))
                    .or_else(|| photos.first())?;
                Some(Image {
                    url: self.image_url(Some(&main.storage_path))?,
                    alt: main
                        .alt_text
                        .clone()
                        .filter(|alt| !alt.is_empty())
                        .unwrap_or_else(|| format!("{} {} photo", project.name, unit.name)),
                })
            });
            let mut seen = HashSet::new();
            project_heroes
                .into_iter()
                .chain(unit_mains)
                .filter(|image| seen.insert(image.url.clone()))
                .take(HERO_STRIP_LEN)
                .collect()
        };

        ShowcaseItem {
            id: project.id.clone(),
            slug: project.slug.clone(),
            name: project.name.clone(),
            details: project_details(project),
            description: project.short_description.clone(),
            long_description: project.long_description.clone(),
            completion_label: completion_label(project),
            hero_strip_candidates,
            units: units
                .iter()
                .map(|unit| {
                    let photos = Self::unit_photos(unit);
                    ShowcaseUnit {
                        id: unit.id.clone(),
                        name: unit.name.clone(),
                        unit_code: unit.unit_code.clone().unwrap_or_default(),
                        price: unit.price,
                        square_feet: unit.square_feet,
                        short_description: unit.short_description.clone(),
                        long_description: unit.long_description.clone(),
                        details: unit_details(unit),
                        hero_image: self.unit_hero(&photos),
                        gallery: self.gallery(&photos, &format!("{} {} photo", project.name, unit.name)),
                    }
                })
                .collect(),
        }
    }

    pub fn unit_page(&self, project: &Project, unit: &Unit) -> UnitPage {
        let photos = Self::unit_photos(unit);
        let address = format_address(project);
        UnitPage {
            hero_image: self.unit_hero(&photos),
            gallery: self.gallery(&photos, &format!("{} {} photo", project.name, unit.name)),
            floorplan_url: self.image_url(unit.floorplan_url.as_deref()),
            formatted_price: format_price(unit.price),
            stats: vec![
                stat("Bedrooms", unit.bedrooms),
                stat("Bathrooms", unit.bathrooms),
                stat("Square Feet", unit.square_feet),
            ],
            availability: availability(unit),
            map_url: self.map_url(&address),
            is_static_map: self.is_static_map(),
            address,
            project: project.clone(),
            unit: unit.clone(),
        }
    }

    pub fn project_page(&self, project: &Project) -> ProjectPage {
        let photos = sort_rows(project.project_photos.as_deref().unwrap_or_default());
        let project_alt = format!("{} photo", project.name);
        let address = format_address(project);

        let hero_images = photos
            .iter()
            .filter(|photo| photo.has_role(&PhotoRole::Hero) || photo.has_role(&PhotoRole::Main))
            .take(HERO_STRIP_LEN)
            .filter_map(|photo| {
                Some(Image {
                    url: self.image_url(Some(&photo.storage_path))?,
                    alt: photo.alt_text.clone().filter(|alt| !alt.is_empty()).unwrap_or_else(|| project_alt.clone()),
                })
            })
            .collect();

        let units = project
            .units
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|unit| ProjectPageUnit {
                id: unit.id.clone(),
                name: unit.name.clone(),
                unit_code: unit.unit_code.clone().unwrap_or_default(),
                price: unit.price,
                formatted_price: format_price(unit.price),
                square_feet: unit.square_feet,
                bedrooms: unit.bedrooms,
                bathrooms: unit.bathrooms,
                short_description: unit.short_description.clone(),
                details: unit_details(unit),
                hero_image: self.unit_hero(&Self::unit_photos(unit)),
                availability: availability(unit),
            })
            .collect();

        ProjectPage {
            hero_images,
            gallery: self.gallery(&photos, &project_alt),
            completion_label: completion_label(project),
            map_url: self.map_url(&address),
            is_static_map: self.is_static_map(),
            address,
            units,
            project: project.clone(),
        }
    }

    pub fn gallery_tiles(&self, photos: &[GalleryPhoto]) -> Vec<GalleryTile> {
        photos
            .iter()
            .filter_map(|photo| {
                Some(GalleryTile {
                    id: photo.id.clone(),
                    url: self.image_url(Some(&photo.storage_path))?,
                    alt: photo
                        .alt_text
                        .clone()
                        .filter(|alt| !alt.is_empty())
                        .unwrap_or_else(|| "Gallery photo".to_string()),
                    size: photo.size.unwrap_or_default().as_str(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjects;

    fn builder(maps_api_key: Option<&str>) -> ViewBuilder {
        ViewBuilder::new(
            Arc::new(MemoryObjects::new("assets", Some("https://cdn.test/assets".to_string()))),
            maps_api_key.map(str::to_string),
        )
    }

    fn project() -> Project {
        serde_json::from_value(json!({
            "id": "p1",
            "slug": "elm-street",
            "name": "Elm Street",
            "status": "completed",
            "is_public": true,
            "address_line1": "12 Elm St",
            "city": "Austin",
            "state": "TX",
            "actual_completion": "2024-03-15",
            "project_photos": [
                { "id": "g", "storage_path": "projects/p1/g.jpg", "role": "gallery", "sort_order": 0 },
                { "id": "h", "storage_path": "projects/p1/h.jpg", "role": "hero", "sort_order": 1 }
            ],
            "units": [{
                "id": "u1",
                "name": "Unit A",
                "unit_code": "Unit A",
                "price": 425000.5,
                "bedrooms": 3,
                "bathrooms": 2.5,
                "square_feet": 0,
                "unit_photos": [
                    { "id": "x", "storage_path": "https://img.test/x.jpg", "sort_order": 1 },
                    { "id": "m", "storage_path": "units/u1/m.jpg", "role": "main", "sort_order": 2 }
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(Some(425000.0)).as_deref(), Some("$425,000"));
        assert_eq!(format_price(Some(425000.5)).as_deref(), Some("$425,000.5"));
        assert_eq!(format_price(Some(999.99)).as_deref(), Some("$999.99"));
        assert_eq!(format_price(Some(1_234_567.0)).as_deref(), Some("$1,234,567"));
        assert_eq!(format_price(None), None);
    }

    #[test]
    fn test_labels() {
        let mut project = project();
        assert_eq!(completion_label(&project), "Completed March 2024");
        assert_eq!(format_address(&project), "12 Elm St, Austin, TX");

        project.status = ProjectStatus::ComingSoon;
        project.actual_completion = None;
        project.estimated_completion = Some("2026-09".to_string());
        assert_eq!(completion_label(&project), "Estimated completion September 2026");

        project.estimated_completion = None;
        assert_eq!(completion_label(&project), "Completion date forthcoming");
    }

    #[test]
    fn test_details() {
        let project = project();
        assert_eq!(project_details(&project), "Unit A: 3 bd • 2.5 ba");
        assert_eq!(unit_details(&project.units.as_ref().unwrap()[0]), "3 bd • 2.5 ba");
    }

    #[test]
    fn test_slug_matching() {
        let project = project();
        let unit = &project.units.as_ref().unwrap()[0];
        assert!(matches_project(&project, " Elm Street "));
        assert!(matches_unit(unit, "unit-a"));
        assert!(matches_unit(unit, "UNIT A"));
        assert!(matches_unit(unit, "u1"));
        assert!(!matches_unit(unit, "unit-b"));
    }

    #[test]
    fn test_unit_page_prefers_main_photo() {
        let project = project();
        let page = builder(None).unit_page(&project, &project.units.as_ref().unwrap()[0]);

        assert_eq!(page.hero_image.as_deref(), Some("https://cdn.test/assets/units/u1/m.jpg"));
        assert_eq!(page.gallery[0].url, "https://img.test/x.jpg");
        assert_eq!(page.gallery[0].alt, "Elm Street Unit A photo");
        assert_eq!(page.formatted_price.as_deref(), Some("$425,000.5"));
        assert_eq!(page.availability, "Available");
        assert_eq!(page.stats[2].value, json!(0.0));
        assert!(!page.is_static_map);
        assert!(page.map_url.unwrap().starts_with("https://maps.google.com/maps?q=12%20Elm%20St"));
    }

    #[test]
    fn test_showcase_hero_strip_merges_unit_mains() {
        let item = builder(Some("k")).showcase(&project());
        let urls: Vec<&str> = item
            .hero_strip_candidates
            .iter()
            .map(|image| image.url.as_str())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.test/assets/projects/p1/h.jpg",
                "https://cdn.test/assets/units/u1/m.jpg"
            ]
        );
        assert_eq!(item.completion_label, "Completed March 2024");
    }

    #[test]
    fn test_project_page() {
        let page = builder(Some("k")).project_page(&project());
        assert_eq!(page.hero_images.len(), 1);
        assert_eq!(page.gallery.len(), 2);
        assert!(page.is_static_map);
        assert!(page.map_url.unwrap().contains("&key=k"));
        assert_eq!(page.units[0].formatted_price.as_deref(), Some("$425,000.5"));
    }
}
