//! Read shapes for the public catalog, and the fallback between them when
//! the live schema lags behind.
//!
//! A shape names the optional pieces it leaves out of the select. Shapes are
//! tried richest first; a recognized schema miss (unknown column, table or
//! relationship) narrows the candidates to shapes that omit what is known to
//! be missing. The first shape that succeeds after such a miss is remembered
//! so later reads start there, until the recheck interval runs out.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use topos_postgrest::{
    MISSING_RELATIONSHIP, SCHEMA_CACHE_COLUMN, UNDEFINED_COLUMN, UNDEFINED_TABLE,
};

/// Parts of the public select that older schemas may not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionalPiece {
    /// `unit_photos.role`
    UnitPhotoRole,
    /// `project_photos.role`
    ProjectPhotoRole,
    /// `units.price` and `units.sold_price`
    UnitPricing,
    /// The `unit_photos` relationship
    UnitPhotos,
    /// The `project_photos` relationship
    ProjectPhotos,
    /// The `units` relationship
    Units,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryShape {
    pub name: &'static str,
    omits: &'static [OptionalPiece],
}

use OptionalPiece::*;

/// Richest first.
pub const PUBLIC_PROJECT_SHAPES: [QueryShape; 11] = [
    QueryShape {
        name: "full",
        omits: &[],
    },
    QueryShape {
        name: "without unit photo role",
        omits: &[UnitPhotoRole],
    },
    QueryShape {
        name: "without project photo role",
        omits: &[ProjectPhotoRole],
    },
    QueryShape {
        name: "without photo roles",
        omits: &[UnitPhotoRole, ProjectPhotoRole],
    },
    QueryShape {
        name: "without unit pricing",
        omits: &[UnitPricing],
    },
    QueryShape {
        name: "without unit photo role or pricing",
        omits: &[UnitPhotoRole, UnitPricing],
    },
    QueryShape {
        name: "without photo roles or pricing",
        omits: &[UnitPhotoRole, ProjectPhotoRole, UnitPricing],
    },
    QueryShape {
        name: "without unit photos",
        omits: &[UnitPhotos, UnitPhotoRole, UnitPricing],
    },
    QueryShape {
        name: "without unit photos or project photo role",
        omits: &[UnitPhotos, UnitPhotoRole, ProjectPhotoRole, UnitPricing],
    },
    QueryShape {
        name: "without photos",
        omits: &[ProjectPhotos, ProjectPhotoRole, UnitPhotos, UnitPhotoRole, UnitPricing],
    },
    QueryShape {
        name: "projects only",
        omits: &[
            Units,
            ProjectPhotos,
            ProjectPhotoRole,
            UnitPhotos,
            UnitPhotoRole,
            UnitPricing,
        ],
    },
];

const PROJECT_COLUMNS: &str = "id,slug,name,status,is_public,address_line1,address_line2,city,state,\
postal_code,country,estimated_completion,actual_completion,total_units,short_description,\
long_description,hero_image_url,featured,sort_order,created_at";

const PROJECT_PHOTO_COLUMNS: &str = "id,storage_path,alt_text,caption,sort_order";

impl QueryShape {
    pub fn omits(&self, piece: OptionalPiece) -> bool {
        self.omits.contains(&piece)
    }

    pub fn omitted(&self) -> BTreeSet<OptionalPiece> {
        self.omits.iter().copied().collect()
    }

    /// PostgREST select list for the public project read.
    pub fn select(&self) -> String {
        let mut select = PROJECT_COLUMNS.to_string();

        if !self.omits(ProjectPhotos) {
            let role = if self.omits(ProjectPhotoRole) { "" } else { ",role" };
            select.push_str(&format!(",project_photos({}{})", PROJECT_PHOTO_COLUMNS, role));
        }

        if !self.omits(Units) {
            let mut units = vec![
                "id",
                "name",
                "unit_code",
                "bedrooms",
                "bathrooms",
                "square_feet",
                "description",
                "short_description",
                "long_description",
                "floorplan_url",
                "availability_status",
                "sort_order",
            ];
            if !self.omits(UnitPricing) {
                units.extend(["price", "sold_price"]);
            }
            let mut units = units.join(",");

            if !self.omits(UnitPhotos) {
                let mut photos = vec!["id", "storage_path", "alt_text", "caption", "sort_order"];
                if !self.omits(UnitPhotoRole) {
                    photos.push("role");
                }
                units.push_str(&format!(",unit_photos({})", photos.join(",")));
            }
            select.push_str(&format!(",units({})", units));
        }

        select
    }
}

/// Which optional pieces a failed read names as missing.
///
/// `None` when the failure is not a schema miss at all, an empty set when
/// it is one but names nothing this module knows.
pub fn missing_pieces(err: &Error) -> Option<BTreeSet<OptionalPiece>> {
    let err = err.as_postgrest()?;
    if !err.is_schema_mismatch() {
        return None;
    }
    let code = err.code()?;

    let mut pieces = BTreeSet::new();
    match code {
        UNDEFINED_COLUMN | SCHEMA_CACHE_COLUMN => {
            if err.mentions("role") {
                // The qualifier names the table; without one either may lack it.
                let project = err.mentions("project_photos");
                let unit = err.mentions("unit_photos");
                if project || !unit {
                    pieces.insert(ProjectPhotoRole);
                }
                if unit || !project {
                    pieces.insert(UnitPhotoRole);
                }
            }
            if err.mentions("price") {
                pieces.insert(UnitPricing);
            }
        }
        MISSING_RELATIONSHIP | UNDEFINED_TABLE => {
            if err.mentions("unit_photos") {
                pieces.insert(UnitPhotos);
            } else if err.mentions("project_photos") {
                pieces.insert(ProjectPhotos);
            } else if err.mentions("units") {
                pieces.insert(Units);
            }
        }
        _ => return None,
    }
    Some(pieces)
}

/// How long a narrower shape is trusted before the richest is tried again.
pub const DEFAULT_RECHECK_AFTER: Duration = Duration::from_secs(600);

/// Tries shapes until one read succeeds.
///
/// A shape settled on after a schema miss is kept for `recheck_after`;
/// the next read after that starts over from the richest shape, so a
/// migration that lands while the process runs is picked up.
#[derive(Debug)]
pub struct ShapeCascade {
    shapes: Vec<QueryShape>,
    start: AtomicUsize,
    settled_at: Mutex<Option<Instant>>,
    recheck_after: Duration,
}

impl Default for ShapeCascade {
    fn default() -> Self {
        Self::new(PUBLIC_PROJECT_SHAPES.to_vec())
    }
}

impl ShapeCascade {
    pub fn new(shapes: Vec<QueryShape>) -> Self {
        Self {
            shapes,
            start: AtomicUsize::new(0),
            settled_at: Mutex::new(None),
            recheck_after: DEFAULT_RECHECK_AFTER,
        }
    }

    pub fn with_recheck_after(mut self, recheck_after: Duration) -> Self {
        self.recheck_after = recheck_after;
        self
    }

    /// True when a narrower shape is remembered and due for a recheck.
    fn recheck_due(&self) -> bool {
        if self.start.load(Ordering::Relaxed) == 0 {
            return false;
        }
        match self.settled_at.lock() {
            Ok(settled_at) => settled_at.map_or(false, |at| at.elapsed() >= self.recheck_after),
            Err(_) => false,
        }
    }

    fn settle(&self, index: usize) {
        self.start.store(index, Ordering::Relaxed);
        if let Ok(mut settled_at) = self.settled_at.lock() {
            *settled_at = Some(Instant::now());
        }
    }

    /// Shape the next read starts from.
    pub fn current(&self) -> Option<QueryShape> {
        self.shapes.get(self.start.load(Ordering::Relaxed)).copied()
    }

    /// Run `attempt` against successive shapes. Never fails: when every
    /// shape errors the read logs and yields no rows.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Vec<T>
    where
        F: FnMut(QueryShape) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        if self.shapes.is_empty() {
            return Vec::new();
        }

        let mut tried = vec![false; self.shapes.len()];
        let mut known_missing: BTreeSet<OptionalPiece> = BTreeSet::new();
        let mut schema_miss = false;
        let recheck = self.recheck_due();
        let mut index = if recheck {
            debug!(target: "cascade", "{}: rechecking the richest shape", label);
            0
        } else {
            self.start.load(Ordering::Relaxed).min(self.shapes.len() - 1)
        };

        loop {
            tried[index] = true;
            let shape = self.shapes[index];

            match attempt(shape).await {
                Ok(rows) => {
                    if schema_miss || recheck {
                        info!(target: "cascade", "{}: using shape '{}'", label, shape.name);
                        self.settle(index);
                    }
                    return rows;
                }
                Err(err) => {
                    warn!(target: "cascade", "{}: shape '{}' failed: {}", label, shape.name, err);
                    if let Some(pieces) = missing_pieces(&err) {
                        schema_miss = true;
                        known_missing.extend(pieces);
                    }
                }
            }

            match self.next_shape(index, &tried, &known_missing) {
                Some(next) => index = next,
                None => {
                    error!(target: "cascade", "{}: every query shape failed", label);
                    return Vec::new();
                }
            }
        }
    }

    /// Most specific untried shape omitting everything known missing,
    /// otherwise the next untried shape in order.
    fn next_shape(
        &self,
        current: usize,
        tried: &[bool],
        known_missing: &BTreeSet<OptionalPiece>,
    ) -> Option<usize> {
        let untried = || (0..self.shapes.len()).filter(|i| !tried[*i]);

        if !known_missing.is_empty() {
            let specific =
                untried().find(|i| known_missing.is_subset(&self.shapes[*i].omitted()));
            if specific.is_some() {
                return specific;
            }
        }
        untried()
            .find(|i| *i > current)
            .or_else(|| untried().next())
    }
}
