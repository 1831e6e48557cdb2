use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Orderable, Photo};

/// A unit row, optionally with its photos embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub unit_code: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sold_price: Option<f64>,
    #[serde(default)]
    pub bedrooms: Option<f64>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    #[serde(default)]
    pub square_feet: Option<f64>,
    #[serde(default)]
    pub time_on_market_days: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub floorplan_url: Option<String>,
    #[serde(default)]
    pub availability_status: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_photos: Option<Vec<Photo>>,
}

impl Unit {
    /// Availability text mentioning "sold" in any case marks a sold unit.
    pub fn is_sold(&self) -> bool {
        self.availability_status
            .as_deref()
            .map(|status| status.to_lowercase().contains("sold"))
            .unwrap_or(false)
    }

    pub fn from_row(id: &str, row: &UnitRow, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.to_string(),
            project_id: Some(row.project_id.clone()),
            name: row.name.clone(),
            unit_code: row.unit_code.clone(),
            price: row.price,
            sold_price: row.sold_price,
            bedrooms: row.bedrooms,
            bathrooms: row.bathrooms,
            square_feet: row.square_feet,
            time_on_market_days: row.time_on_market_days,
            description: row.description.clone(),
            short_description: row.short_description.clone(),
            long_description: row.long_description.clone(),
            floorplan_url: row.floorplan_url.clone(),
            availability_status: row.availability_status.clone(),
            sort_order: Some(row.sort_order.unwrap_or(0)),
            metadata: Some(row.metadata.clone().unwrap_or_else(|| Value::Object(Default::default()))),
            created_at,
            unit_photos: None,
        }
    }

    /// Overwrite the columns a row carries, keeping id and embeds.
    pub fn apply_row(&mut self, row: &UnitRow) {
        let sort_order = row.sort_order.or(self.sort_order);
        let metadata = row.metadata.clone().or_else(|| self.metadata.take());
        let mut updated = Unit::from_row(&self.id, row, self.created_at);
        updated.sort_order = sort_order;
        updated.metadata = metadata;
        updated.unit_photos = self.unit_photos.take();
        *self = updated;
    }
}

impl Orderable for Unit {
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

/// Writable unit columns, as sent to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRow {
    pub project_id: String,
    pub name: String,
    pub unit_code: Option<String>,
    pub price: Option<f64>,
    pub sold_price: Option<f64>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<f64>,
    pub time_on_market_days: Option<i64>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub floorplan_url: Option<String>,
    pub availability_status: Option<String>,
    /// Left untouched on update when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}
