//! Presentation order of collections.
//!
//! Pure functions shared by the server (validating and applying a submitted
//! order) and the admin client (keeping a drag order stable across
//! refetches).

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::model::Orderable;

/// Stable sort by `sort_order` ascending; ties keep their incoming order.
pub fn sort_rows<T: Orderable + Clone>(rows: &[T]) -> Vec<T> {
    let mut sorted = rows.to_vec();
    sorted.sort_by_key(|row| row.sort_order().unwrap_or(0));
    sorted
}

/// Presentation order within a scope: `sort_order`, ties by creation time.
pub fn presentation_sort<T: Orderable>(rows: &mut [T]) {
    rows.sort_by(|a, b| {
        a.sort_order()
            .unwrap_or(0)
            .cmp(&b.sort_order().unwrap_or(0))
            .then_with(|| a.created_at().cmp(&b.created_at()))
    });
}

/// Project a locally held order onto freshly fetched rows.
///
/// Without a local order the rows are sorted by `sort_order`. With one,
/// rows named in it come first in that order; rows it does not know are
/// appended in their sorted server order. Ids that no longer exist are
/// skipped.
pub fn apply_order<T: Orderable + Clone>(rows: &[T], local_order: Option<&[String]>) -> Vec<T> {
    let sorted = sort_rows(rows);
    let local_order = match local_order {
        Some(order) if !order.is_empty() => order,
        _ => return sorted,
    };

    let by_id: HashMap<&str, &T> = sorted.iter().map(|row| (row.id(), row)).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(sorted.len());

    for id in local_order {
        if let Some(row) = by_id.get(id.as_str()) {
            if placed.insert(row.id()) {
                ordered.push((*row).clone());
            }
        }
    }
    for row in &sorted {
        if !placed.contains(row.id()) {
            ordered.push(row.clone());
        }
    }
    ordered
}

/// Move `moved_id` to the index `target_id` occupies.
///
/// Returns the input unchanged when the ids are equal or either is missing.
pub fn reorder(ordered_ids: &[String], moved_id: &str, target_id: &str) -> Vec<String> {
    let mut ids = ordered_ids.to_vec();
    if moved_id == target_id {
        return ids;
    }
    let from = ids.iter().position(|id| id == moved_id);
    let to = ids.iter().position(|id| id == target_id);
    if let (Some(from), Some(to)) = (from, to) {
        let moved = ids.remove(from);
        ids.insert(to, moved);
    }
    ids
}

/// Why a submitted order was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderViolation {
    Duplicate(String),
    Foreign(String),
    SizeMismatch { expected: usize, submitted: usize },
}

impl fmt::Display for OrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderViolation::Duplicate(id) => write!(f, "order must not include duplicate ids ({})", id),
            OrderViolation::Foreign(id) => write!(f, "order contains unknown ids ({})", id),
            OrderViolation::SizeMismatch {
                expected,
                submitted,
            } => write!(
                f,
                "order must list every item exactly once (expected {}, got {})",
                expected, submitted
            ),
        }
    }
}

/// A submitted order must be exactly the scope's id set.
pub fn validate_order(submitted: &[String], scope_ids: &[String]) -> Result<(), OrderViolation> {
    let mut seen = HashSet::with_capacity(submitted.len());
    for id in submitted {
        if !seen.insert(id.as_str()) {
            return Err(OrderViolation::Duplicate(id.clone()));
        }
    }

    let scope: HashSet<&str> = scope_ids.iter().map(String::as_str).collect();
    if let Some(foreign) = submitted.iter().find(|id| !scope.contains(id.as_str())) {
        return Err(OrderViolation::Foreign(foreign.clone()));
    }

    if submitted.len() != scope.len() {
        return Err(OrderViolation::SizeMismatch {
            expected: scope.len(),
            submitted: submitted.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
        sort_order: Option<i64>,
    }

    impl Orderable for Row {
        fn id(&self) -> &str {
            &self.id
        }

        fn sort_order(&self) -> Option<i64> {
            self.sort_order
        }

        fn created_at(&self) -> Option<DateTime<Utc>> {
            None
        }
    }

    fn row(id: &str, sort_order: i64) -> Row {
        Row {
            id: id.to_string(),
            sort_order: Some(sort_order),
        }
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|row| row.id.as_str()).collect()
    }

    fn owned(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_apply_order_without_local_order_is_stable() {
        let rows = vec![row("a", 1), row("b", 0), row("c", 1), row("d", 0)];
        assert_eq!(ids(&apply_order(&rows, None)), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_null_sort_order_counts_as_zero() {
        let rows = vec![
            row("a", 1),
            Row {
                id: "b".to_string(),
                sort_order: None,
            },
        ];
        assert_eq!(ids(&apply_order(&rows, None)), vec!["b", "a"]);
    }

    #[test]
    fn test_apply_order_appends_unknown_rows() {
        let rows = vec![row("a", 0), row("b", 1), row("c", 2), row("new", 3)];
        let local = owned(&["c", "a", "b"]);
        assert_eq!(
            ids(&apply_order(&rows, Some(&local))),
            vec!["c", "a", "b", "new"]
        );
    }

    #[test]
    fn test_apply_order_skips_vanished_ids() {
        let rows = vec![row("a", 0), row("c", 2)];
        let local = owned(&["c", "gone", "a"]);
        assert_eq!(ids(&apply_order(&rows, Some(&local))), vec!["c", "a"]);
    }

    #[test]
    fn test_apply_order_is_idempotent() {
        let rows = vec![row("a", 2), row("b", 0), row("c", 1), row("d", 5)];
        let local = owned(&["d", "a"]);

        let once = apply_order(&rows, Some(&local));
        let once_ids: Vec<String> = once.iter().map(|row| row.id.clone()).collect();
        let twice = apply_order(&rows, Some(&once_ids));
        assert_eq!(once, twice);
        assert_eq!(once, apply_order(&rows, Some(&local)));
    }

    #[test]
    fn test_reorder_moves_to_target_index() {
        let order = owned(&["a", "b", "c", "d"]);
        assert_eq!(reorder(&order, "a", "c"), owned(&["b", "c", "a", "d"]));
        assert_eq!(reorder(&order, "d", "b"), owned(&["a", "d", "b", "c"]));
    }

    #[test]
    fn test_reorder_noops() {
        let order = owned(&["a", "b", "c"]);
        assert_eq!(reorder(&order, "b", "b"), order);
        assert_eq!(reorder(&order, "b", "missing"), order);
        assert_eq!(reorder(&order, "missing", "a"), order);
    }

    #[test]
    fn test_validate_order() {
        let scope = owned(&["a", "b", "c"]);

        assert_eq!(validate_order(&owned(&["b", "a", "c"]), &scope), Ok(()));
        assert_eq!(
            validate_order(&owned(&["a", "a", "b"]), &scope),
            Err(OrderViolation::Duplicate("a".to_string()))
        );
        assert_eq!(
            validate_order(&owned(&["a", "b", "x"]), &scope),
            Err(OrderViolation::Foreign("x".to_string()))
        );
        assert_eq!(
            validate_order(&owned(&["a", "b"]), &scope),
            Err(OrderViolation::SizeMismatch {
                expected: 3,
                submitted: 2
            })
        );
        assert_eq!(validate_order(&[], &[]), Ok(()));
        assert!(validate_order(&[], &scope).is_err());
    }
}
