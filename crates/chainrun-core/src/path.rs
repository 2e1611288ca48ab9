//! Dotted-path lookup over JSON trees.
//!
//! Exact lookups are the common case. When an earlier response drifted from
//! the shape a step expected, [`search`] scans the tree (bounded depth) for the
//! path's leaf key instead.

use serde_json::Value;

/// Default depth bound for [`search`].
pub const DEFAULT_SEARCH_DEPTH: usize = 5;

/// A value found in a tree together with the path it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<'a> {
    pub value: &'a Value,
    pub path: String,
    /// `true` when the exact path missed and the leaf search produced this value.
    pub via_fallback: bool,
}

/// Split a path into segments. `items[0].id` and `items.0.id` are equivalent.
#[must_use]
pub fn segments(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Final segment of a path, used as the fallback search key.
#[must_use]
pub fn leaf(path: &str) -> Option<String> {
    segments(path).pop()
}

/// Segments to walk for `path` in `tree`. A leading `response` segment is
/// dropped unless the tree really has a `response` key.
#[must_use]
pub fn normalized_segments(tree: &Value, path: &str) -> Vec<String> {
    let mut parts = segments(path);
    if parts.first().is_some_and(|s| s == "response") && tree.get("response").is_none() {
        parts.remove(0);
    }
    parts
}

/// Descend one segment: key lookup in objects, numeric index in arrays.
#[must_use]
pub fn step_into<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Resolve `path` against `tree`. Returns `None` at the first missing segment.
/// An empty path resolves to the tree itself.
#[must_use]
pub fn resolve<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    normalized_segments(tree, path)
        .iter()
        .try_fold(tree, |node, segment| step_into(node, segment))
}

/// Collect every location of `key` up to `max_depth` levels and pick the best:
/// scalars before containers (null last), then shallower paths, then
/// traversal order.
#[must_use]
pub fn search<'a>(tree: &'a Value, key: &str, max_depth: usize) -> Option<Located<'a>> {
    search_where(tree, key, max_depth, |_| true)
}

/// [`search`] restricted to candidates accepted by `accept`.
#[must_use]
pub fn search_where<'a>(
    tree: &'a Value,
    key: &str,
    max_depth: usize,
    accept: impl Fn(&Value) -> bool,
) -> Option<Located<'a>> {
    let mut found = Vec::new();
    collect(tree, key, max_depth, &mut Vec::new(), &mut found);
    found
        .into_iter()
        .filter(|(value, _)| accept(*value))
        .min_by_key(|(value, trail)| (rank(value), trail.len()))
        .map(|(value, trail)| Located {
            value,
            path: trail.join("."),
            via_fallback: true,
        })
}

/// Exact resolution, then the leaf search.
#[must_use]
pub fn resolve_or_search<'a>(tree: &'a Value, path: &str, max_depth: usize) -> Option<Located<'a>> {
    resolve_or_search_where(tree, path, max_depth, |_| true)
}

/// [`resolve_or_search`] where a hit rejected by `accept` counts as a miss.
#[must_use]
pub fn resolve_or_search_where<'a>(
    tree: &'a Value,
    path: &str,
    max_depth: usize,
    accept: impl Fn(&Value) -> bool,
) -> Option<Located<'a>> {
    if let Some(value) = resolve(tree, path).filter(|value| accept(*value)) {
        return Some(Located {
            value,
            path: normalized_segments(tree, path).join("."),
            via_fallback: false,
        });
    }
    let key = leaf(path)?;
    search_where(tree, &key, max_depth, accept)
}

/// Whether a value carries anything: not null and not an empty string.
#[must_use]
pub fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

/// Render a value as request text: strings verbatim, null empty, the rest as JSON.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

const fn rank(value: &Value) -> u8 {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => 0,
        Value::Array(_) | Value::Object(_) => 1,
        Value::Null => 2,
    }
}

fn collect<'a>(
    node: &'a Value,
    key: &str,
    max_depth: usize,
    trail: &mut Vec<String>,
    found: &mut Vec<(&'a Value, Vec<String>)>,
) {
    if trail.len() >= max_depth {
        return;
    }
    match node {
        Value::Object(map) => {
            for (name, child) in map {
                trail.push(name.clone());
                if name == key {
                    found.push((child, trail.clone()));
                }
                collect(child, key, max_depth, trail, found);
                trail.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                trail.push(index.to_string());
                collect(child, key, max_depth, trail, found);
                trail.pop();
            }
        }
        _ => {}
    }
}
