//! Request payload validation for projects and units.
//!
//! Payloads arrive in camelCase. Failures are collected per field and
//! reported as `{formErrors, fieldErrors}` in the error details.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::model::{ProjectRow, ProjectStatus, UnitRow};

const SHORT_TEXT: usize = 500;
const LONG_TEXT: usize = 5000;

/// Accumulated validation failures.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldErrors {
    form_errors: Vec<String>,
    field_errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn form(&mut self, message: impl Into<String>) {
        self.form_errors.push(message.into());
    }

    pub fn field(&mut self, key: &str, message: impl Into<String>) {
        self.field_errors
            .entry(key.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }

    pub fn to_details(&self) -> Value {
        json!({
            "formErrors": self.form_errors,
            "fieldErrors": self.field_errors,
        })
    }

    /// `Ok(value)` when nothing was recorded, a 400 carrying the details otherwise.
    pub fn finish<T>(self, value: T, message: &str) -> Result<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(Error::validation_with(message, self.to_details()))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Field access over one JSON object, prefixing error keys for nested items.
struct Reader<'a> {
    object: &'a Map<String, Value>,
    prefix: String,
}

impl<'a> Reader<'a> {
    fn new(object: &'a Map<String, Value>, prefix: &str) -> Self {
        Self {
            object,
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.object.get(name)
    }

    fn required_string(&self, name: &str, max: usize, errors: &mut FieldErrors) -> String {
        match self.get(name) {
            None => {
                errors.field(&self.key(name), "Required");
                String::new()
            }
            Some(Value::String(text)) => {
                let count = text.chars().count();
                if count == 0 {
                    errors.field(&self.key(name), "String must contain at least 1 character(s)");
                } else if count > max {
                    errors.field(
                        &self.key(name),
                        format!("String must contain at most {} character(s)", max),
                    );
                }
                text.clone()
            }
            Some(other) => {
                errors.field(
                    &self.key(name),
                    format!("Expected string, received {}", type_name(other)),
                );
                String::new()
            }
        }
    }

    /// Trimmed text; null, absent and blank all read as `None`.
    fn optional_string(&self, name: &str, max: usize, errors: &mut FieldErrors) -> Option<String> {
        match self.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                if trimmed.chars().count() > max {
                    errors.field(
                        &self.key(name),
                        format!("String must contain at most {} character(s)", max),
                    );
                    return None;
                }
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Some(other) => {
                errors.field(
                    &self.key(name),
                    format!("Expected string, received {}", type_name(other)),
                );
                None
            }
        }
    }

    /// A number given as a JSON number or numeric text. Unparseable text
    /// and non-finite values read as `None`.
    fn number(&self, name: &str, errors: &mut FieldErrors) -> Option<f64> {
        match self.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => number.as_f64().filter(|value| value.is_finite()),
            Some(Value::String(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                text.parse::<f64>().ok().filter(|value| value.is_finite())
            }
            Some(other) => {
                errors.field(
                    &self.key(name),
                    format!("Expected number or string, received {}", type_name(other)),
                );
                None
            }
        }
    }

    fn integer(&self, name: &str, errors: &mut FieldErrors) -> Option<i64> {
        match self.get(name) {
            None => None,
            Some(Value::Number(number)) => match number.as_i64() {
                Some(value) => Some(value),
                None => {
                    errors.field(&self.key(name), "Expected integer, received float");
                    None
                }
            },
            Some(other) => {
                errors.field(
                    &self.key(name),
                    format!("Expected number, received {}", type_name(other)),
                );
                None
            }
        }
    }

    fn boolean(&self, name: &str, errors: &mut FieldErrors) -> Option<bool> {
        match self.get(name) {
            None => None,
            Some(Value::Bool(value)) => Some(*value),
            Some(other) => {
                errors.field(
                    &self.key(name),
                    format!("Expected boolean, received {}", type_name(other)),
                );
                None
            }
        }
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn non_negative_whole(value: f64) -> i64 {
    value.trunc().max(0.0) as i64
}

/// A unit as submitted by the admin UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitInput {
    pub id: Option<String>,
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
    pub sort_order: Option<i64>,
}

impl UnitInput {
    /// Validate a single unit object.
    pub fn parse(value: &Value) -> Result<Self> {
        let mut errors = FieldErrors::default();
        let unit = Self::read(value, "", &mut errors);
        errors.finish(unit, "Invalid unit payload")
    }

    fn read(value: &Value, prefix: &str, errors: &mut FieldErrors) -> Self {
        let object = match value.as_object() {
            Some(object) => object,
            None => {
                let message = format!("Expected object, received {}", type_name(value));
                if prefix.is_empty() {
                    errors.form(message);
                } else {
                    errors.field(prefix.trim_end_matches('.'), message);
                }
                return Self::default();
            }
        };
        let reader = Reader::new(object, prefix);

        let id = match reader.get("id") {
            None => None,
            Some(Value::String(id)) if uuid::Uuid::parse_str(id).is_ok() => Some(id.clone()),
            Some(_) => {
                errors.field(&reader.key("id"), "Invalid uuid");
                None
            }
        };

        Self {
            id,
            name: reader.required_string("name", 200, errors),
            unit_code: reader.optional_string("unitCode", SHORT_TEXT, errors),
            price: reader.number("price", errors).map(round_cents),
            sold_price: reader.number("soldPrice", errors).map(round_cents),
            bedrooms: reader.number("bedrooms", errors).map(round_cents),
            bathrooms: reader.number("bathrooms", errors).map(round_cents),
            square_feet: reader
                .number("squareFeet", errors)
                .map(|value| (value + 0.5).floor()),
            time_on_market_days: reader
                .number("timeOnMarketDays", errors)
                .map(non_negative_whole),
            description: reader.optional_string("description", SHORT_TEXT, errors),
            short_description: reader.optional_string("shortDescription", SHORT_TEXT, errors),
            long_description: reader.optional_string("longDescription", LONG_TEXT, errors),
            floorplan_url: reader.optional_string("floorplanUrl", SHORT_TEXT, errors),
            availability_status: reader.optional_string("availabilityStatus", SHORT_TEXT, errors),
            sort_order: reader.integer("sortOrder", errors),
        }
    }

    /// Row for insertion; `fallback_order` applies when no `sortOrder` was given.
    pub fn to_insert_row(&self, project_id: &str, fallback_order: i64) -> UnitRow {
        let mut row = self.to_update_row(project_id);
        row.sort_order = Some(self.sort_order.unwrap_or(fallback_order));
        row.metadata = Some(json!({}));
        row
    }

    /// Row for an update; an absent `sortOrder` keeps the stored one.
    pub fn to_update_row(&self, project_id: &str) -> UnitRow {
        UnitRow {
            project_id: project_id.to_string(),
            name: self.name.clone(),
            unit_code: self.unit_code.clone(),
            price: self.price,
            sold_price: self.sold_price,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            square_feet: self.square_feet,
            time_on_market_days: self.time_on_market_days,
            description: self.description.clone(),
            short_description: self.short_description.clone(),
            long_description: self.long_description.clone(),
            floorplan_url: self.floorplan_url.clone(),
            availability_status: self.availability_status.clone(),
            sort_order: self.sort_order,
            metadata: None,
        }
    }
}

fn read_units(value: Option<&Value>, errors: &mut FieldErrors) -> Option<Vec<UnitInput>> {
    match value {
        None => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| UnitInput::read(item, &format!("units.{}.", index), errors))
                .collect(),
        ),
        Some(other) => {
            errors.field(
                "units",
                format!("Expected array, received {}", type_name(other)),
            );
            None
        }
    }
}

/// Validate `{units: [...]}` for appending units to a project.
pub fn parse_units(value: &Value) -> Result<Vec<UnitInput>> {
    let mut errors = FieldErrors::default();
    let units = match value.as_object() {
        Some(object) => read_units(object.get("units"), &mut errors),
        None => {
            errors.form(format!("Expected object, received {}", type_name(value)));
            None
        }
    };
    let units = errors.finish(units.unwrap_or_default(), "Invalid units payload")?;
    if units.is_empty() {
        return Err(Error::validation("No units provided"));
    }
    Ok(units)
}

/// A project as submitted by the admin UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectInput {
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
    /// `None` when the payload carries no `units` key, which leaves units untouched on update.
    pub units: Option<Vec<UnitInput>>,
}

fn is_slug(slug: &str) -> bool {
    slug.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

impl ProjectInput {
    pub fn parse(value: &Value) -> Result<Self> {
        let mut errors = FieldErrors::default();
        let object = match value.as_object() {
            Some(object) => object,
            None => {
                errors.form(format!("Expected object, received {}", type_name(value)));
                return Err(Error::validation_with(
                    "Invalid project payload",
                    errors.to_details(),
                ));
            }
        };
        let reader = Reader::new(object, "");

        let slug = reader.required_string("slug", 140, &mut errors);
        if !slug.is_empty() && !is_slug(&slug) {
            errors.field(
                "slug",
                "Slug must contain lowercase letters, numbers, or dashes",
            );
        }

        let status = match reader.get("status") {
            None => ProjectStatus::default(),
            Some(Value::String(status)) => status.parse().unwrap_or_else(|_| {
                errors.field(
                    "status",
                    format!(
                        "Invalid enum value. Expected 'coming_soon' | 'completed', received '{}'",
                        status
                    ),
                );
                ProjectStatus::default()
            }),
            Some(other) => {
                errors.field(
                    "status",
                    format!("Expected string, received {}", type_name(other)),
                );
                ProjectStatus::default()
            }
        };

        let total_units = match reader.get("totalUnits") {
            Some(Value::Number(number)) if number.as_i64().is_none() => {
                errors.field("totalUnits", "Expected integer, received float");
                None
            }
            _ => reader.number("totalUnits", &mut errors).map(non_negative_whole),
        };

        let metadata = match reader.get("metadata") {
            None => json!({}),
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(other) => {
                errors.field(
                    "metadata",
                    format!("Expected object, received {}", type_name(other)),
                );
                json!({})
            }
        };

        let input = Self {
            slug,
            name: reader.required_string("name", 200, &mut errors),
            status,
            is_public: reader.boolean("isPublic", &mut errors).unwrap_or(false),
            address_line1: reader.required_string("addressLine1", 255, &mut errors),
            address_line2: reader.optional_string("addressLine2", SHORT_TEXT, &mut errors),
            city: reader.optional_string("city", SHORT_TEXT, &mut errors),
            state: reader.optional_string("state", SHORT_TEXT, &mut errors),
            postal_code: reader.optional_string("postalCode", SHORT_TEXT, &mut errors),
            country: reader
                .optional_string("country", SHORT_TEXT, &mut errors)
                .or_else(|| Some("USA".to_string())),
            estimated_completion: reader.optional_string(
                "estimatedCompletion",
                SHORT_TEXT,
                &mut errors,
            ),
            actual_completion: reader.optional_string("actualCompletion", SHORT_TEXT, &mut errors),
            total_units,
            short_description: reader.optional_string("shortDescription", SHORT_TEXT, &mut errors),
            long_description: reader.optional_string("longDescription", LONG_TEXT, &mut errors),
            featured: reader.boolean("featured", &mut errors).unwrap_or(false),
            sort_order: reader.integer("sortOrder", &mut errors).unwrap_or(0),
            metadata,
            units: read_units(reader.get("units"), &mut errors),
        };

        errors.finish(input, "Invalid project payload")
    }

    pub fn to_row(&self) -> ProjectRow {
        ProjectRow {
            slug: self.slug.clone(),
            name: self.name.clone(),
            status: self.status,
            is_public: self.is_public,
            address_line1: self.address_line1.clone(),
            address_line2: self.address_line2.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            postal_code: self.postal_code.clone(),
            country: self.country.clone(),
            estimated_completion: self.estimated_completion.clone(),
            actual_completion: self.actual_completion.clone(),
            total_units: self.total_units,
            short_description: self.short_description.clone(),
            long_description: self.long_description.clone(),
            featured: self.featured,
            sort_order: self.sort_order,
            metadata: self.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_payload() -> Value {
        json!({
            "slug": "elm-street",
            "name": "Elm Street Rowhomes",
            "addressLine1": "12 Elm St",
            "city": "  Denver ",
            "state": "",
            "totalUnits": "4",
            "units": [
                {
                    "name": "Unit A",
                    "price": "525000.456",
                    "bedrooms": 3,
                    "bathrooms": "2.5",
                    "squareFeet": "1799.5",
                    "timeOnMarketDays": -3
                }
            ]
        })
    }

    #[test]
    fn test_project_defaults_and_coercion() {
        let input = ProjectInput::parse(&project_payload()).unwrap();

        assert_eq!(input.status, ProjectStatus::ComingSoon);
        assert!(!input.is_public);
        assert_eq!(input.country.as_deref(), Some("USA"));
        assert_eq!(input.city.as_deref(), Some("Denver"));
        assert_eq!(input.state, None);
        assert_eq!(input.total_units, Some(4));
        assert_eq!(input.metadata, json!({}));

        let units = input.units.unwrap();
        assert_eq!(units[0].price, Some(525000.46));
        assert_eq!(units[0].bathrooms, Some(2.5));
        assert_eq!(units[0].square_feet, Some(1800.0));
        assert_eq!(units[0].time_on_market_days, Some(0));
    }

    #[test]
    fn test_project_field_errors() {
        let err = ProjectInput::parse(&json!({
            "slug": "Elm Street",
            "name": "",
            "status": "archived",
            "units": [{ "price": true }]
        }))
        .unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(err.public_message(), "Invalid project payload");
        let details = err.details().unwrap();
        let fields = &details["fieldErrors"];
        assert_eq!(
            fields["slug"][0],
            "Slug must contain lowercase letters, numbers, or dashes"
        );
        assert!(fields["name"].is_array());
        assert!(fields["status"].is_array());
        assert_eq!(fields["addressLine1"][0], "Required");
        assert_eq!(fields["units.0.name"][0], "Required");
        assert!(fields["units.0.price"].is_array());
    }

    #[test]
    fn test_unparseable_number_reads_as_null() {
        let unit = UnitInput::parse(&json!({ "name": "A", "price": "call us" })).unwrap();
        assert_eq!(unit.price, None);
    }

    #[test]
    fn test_unit_id_must_be_uuid() {
        let err = UnitInput::parse(&json!({ "id": "7", "name": "A" })).unwrap_err();
        assert_eq!(err.public_message(), "Invalid unit payload");
        assert_eq!(err.details().unwrap()["fieldErrors"]["id"][0], "Invalid uuid");
    }

    #[test]
    fn test_parse_units() {
        let err = parse_units(&json!({ "units": [] })).unwrap_err();
        assert_eq!(err.public_message(), "No units provided");

        let err = parse_units(&json!({ "units": "A" })).unwrap_err();
        assert_eq!(err.public_message(), "Invalid units payload");

        let units = parse_units(&json!({ "units": [{ "name": "A" }, { "name": "B" }] })).unwrap();
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn test_rows() {
        let unit = UnitInput::parse(&json!({ "name": "A" })).unwrap();
        let row = unit.to_insert_row("p1", 3);
        assert_eq!(row.sort_order, Some(3));
        assert_eq!(row.metadata, Some(json!({})));
        assert_eq!(unit.to_update_row("p1").sort_order, None);

        let project = ProjectInput::parse(&project_payload()).unwrap().to_row();
        assert_eq!(project.sort_order, 0);
        assert_eq!(project.address_line1, "12 Elm St");
    }
}
