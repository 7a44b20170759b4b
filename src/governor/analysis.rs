//! Static depth and complexity analysis over a [`QueryDocument`].

use serde_json::Value;

use super::query::{QueryDocument, Selection, Variables};
use crate::error::{CacheError, Result};

/// Cost of one leaf field.
pub const LEAF_COST: u64 = 1;
/// Extra cost per nesting level of a field.
pub const DEPTH_SURCHARGE: u64 = 1;
/// Assumed list size when no page-size argument is given.
pub const DEFAULT_LIST_SIZE: u64 = 10;
/// Upper bound on the multiplier a single list field can contribute.
pub const MAX_LIST_SIZE: u64 = 100;
/// Flat cost of an introspection meta-field.
pub const INTROSPECTION_PENALTY: u64 = 1000;

/// Arguments read as a page size, in priority order.
const PAGE_SIZE_ARGS: &[&str] = &["first", "last", "limit", "pageSize", "page_size", "take", "count"];

// == Depth ==
/// Maximum nesting depth. Top-level fields with no sub-selections are
/// depth 0.
pub fn query_depth(doc: &QueryDocument) -> usize {
    doc.selections.iter().map(selection_depth).max().unwrap_or(0)
}

fn selection_depth(sel: &Selection) -> usize {
    sel.selections
        .iter()
        .map(|child| 1 + selection_depth(child))
        .max()
        .unwrap_or(0)
}

/// Returns the depth, or `DepthExceeded` when it is above `max_depth`.
pub fn check_depth(doc: &QueryDocument, max_depth: usize) -> Result<usize> {
    let depth = query_depth(doc);
    if depth > max_depth {
        return Err(CacheError::DepthExceeded {
            depth,
            max: max_depth,
        });
    }
    Ok(depth)
}

// == Complexity ==
/// Weighted cost of the document.
///
/// Each leaf costs [`LEAF_COST`]; every field adds [`DEPTH_SURCHARGE`] per
/// level it sits below the root; a list field multiplies the cost of its
/// whole subtree by its page size; introspection fields add
/// [`INTROSPECTION_PENALTY`] on top.
pub fn score_complexity(doc: &QueryDocument, variables: &Variables) -> u64 {
    doc.selections
        .iter()
        .fold(0u64, |acc, sel| acc.saturating_add(selection_cost(sel, 0, variables)))
}

fn selection_cost(sel: &Selection, level: u64, variables: &Variables) -> u64 {
    let own = if sel.is_leaf() { LEAF_COST } else { 0 };
    let subtree = sel
        .selections
        .iter()
        .fold(own.saturating_add(DEPTH_SURCHARGE.saturating_mul(level)), |acc, child| {
            acc.saturating_add(selection_cost(child, level + 1, variables))
        });

    let cost = if sel.list {
        subtree.saturating_mul(list_size(sel, variables))
    } else {
        subtree
    };

    if sel.is_introspection() {
        cost.saturating_add(INTROSPECTION_PENALTY)
    } else {
        cost
    }
}

/// Page size of a list field: the first page-size argument present,
/// resolving `$variables`, clamped to `1..=MAX_LIST_SIZE`.
fn list_size(sel: &Selection, variables: &Variables) -> u64 {
    PAGE_SIZE_ARGS
        .iter()
        .find_map(|name| sel.arguments.get(*name))
        .and_then(|value| resolve(value, variables))
        .and_then(as_size)
        .unwrap_or(DEFAULT_LIST_SIZE)
        .clamp(1, MAX_LIST_SIZE)
}

fn resolve<'a>(value: &'a Value, variables: &'a Variables) -> Option<&'a Value> {
    match value.as_str().and_then(|s| s.strip_prefix('$')) {
        Some(name) => variables.get(name),
        None => Some(value),
    }
}

fn as_size(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.ceil() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
