//! Structural utilities over JSON values: classification, lookup and diff.
//!
//! The state tree is a `serde_json::Value`. Deep copies are plain clones and
//! structural equality is `PartialEq`, so this module only adds what `Value`
//! lacks: container-aware lookups and the structural diff used by update
//! groups.

use crate::{Path, Seg, StoreError, StoreResult};
use serde_json::{Map, Value};

/// Coarse classification of a JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    /// Classify a value.
    pub fn of(v: &Value) -> Self {
        match v {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Arrays and objects are containers; everything else is a leaf.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, ValueKind::Array | ValueKind::Object)
    }

    /// Lowercase type name, as used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

/// Get the type name of a JSON value.
#[inline]
pub fn value_type_name(v: &Value) -> &'static str {
    ValueKind::of(v).name()
}

/// Whether a value is an array or an object.
#[inline]
pub fn is_container(v: &Value) -> bool {
    ValueKind::of(v).is_container()
}

/// Get the direct child of a container addressed by one segment.
///
/// Numeric keys index arrays and indices look up stringified keys on
/// objects, so dotted paths and index paths address the same nodes.
pub fn child<'a>(current: &'a Value, seg: &Seg) -> Option<&'a Value> {
    match current {
        Value::Object(obj) => obj.get(seg.component().as_ref()),
        Value::Array(arr) => seg.as_index().and_then(|i| arr.get(i)),
        _ => None,
    }
}

/// Mutable counterpart of [`child`].
pub fn child_mut<'a>(current: &'a mut Value, seg: &Seg) -> Option<&'a mut Value> {
    match current {
        Value::Object(obj) => obj.get_mut(seg.component().as_ref()),
        Value::Array(arr) => seg.as_index().and_then(|i| arr.get_mut(i)),
        _ => None,
    }
}

/// Get a reference to the value at a path, if it exists.
pub fn get_at_path<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    path.iter().try_fold(doc, |current, seg| child(current, seg))
}

/// Get a mutable reference to the value at a path, if it exists.
pub fn get_at_path_mut<'a>(doc: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    path.iter().try_fold(doc, |current, seg| child_mut(current, seg))
}

/// Resolve a path, reporting which component failed.
///
/// A missing key yields `PathNotFound` for the prefix that was missing; an
/// index past the end of an array yields `IndexOutOfBounds`.
pub fn lookup<'a>(doc: &'a Value, path: &Path) -> StoreResult<&'a Value> {
    let mut current = doc;
    let mut walked = Path::root();
    for seg in path {
        walked.push(seg.clone());
        current = match current {
            Value::Array(arr) => match seg.as_index() {
                Some(i) if i < arr.len() => &arr[i],
                Some(i) => return Err(StoreError::index_out_of_bounds(walked, i, arr.len())),
                None => return Err(StoreError::path_not_found(walked)),
            },
            _ => child(current, seg).ok_or_else(|| StoreError::path_not_found(walked.clone()))?,
        };
    }
    Ok(current)
}

/// Structural diff of `before` against `after`.
///
/// For two containers of the same kind, every key of `before` whose value is
/// not structurally equal in `after` records the `after` value, recursing
/// when both sides hold containers so only the deepest divergent fields
/// appear. Keys missing from `after` record `null`; keys only in `after` are
/// recorded directly. Arrays are keyed by index string. For anything else
/// the diff is `after` itself when the two differ.
///
/// Returns `None` when there is no difference, which is distinct from
/// `Some` of an empty object.
///
/// ```
/// use keel_store::deep_diff;
/// use serde_json::json;
///
/// let before = json!({"todos": [{"title": "a"}], "n": 1});
/// let after = json!({"todos": [{"title": "x"}], "n": 1, "extra": true});
/// assert_eq!(
///     deep_diff(&before, &after),
///     Some(json!({"todos": {"0": {"title": "x"}}, "extra": true}))
/// );
/// assert_eq!(deep_diff(&before, &before), None);
/// ```
pub fn deep_diff(before: &Value, after: &Value) -> Option<Value> {
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            let pairs = a.iter().map(|(k, v)| (k.clone(), v, b.get(k)));
            let added = b
                .iter()
                .filter(|(k, _)| !a.contains_key(*k))
                .map(|(k, v)| (k.clone(), v.clone()));
            finish_diff(pairs, added)
        }
        (Value::Array(a), Value::Array(b)) => {
            let pairs = a.iter().enumerate().map(|(i, v)| (i.to_string(), v, b.get(i)));
            let added = b
                .iter()
                .enumerate()
                .skip(a.len())
                .map(|(i, v)| (i.to_string(), v.clone()));
            finish_diff(pairs, added)
        }
        _ if before == after => None,
        _ => Some(after.clone()),
    }
}

fn finish_diff<'a>(
    pairs: impl Iterator<Item = (String, &'a Value, Option<&'a Value>)>,
    added: impl Iterator<Item = (String, Value)>,
) -> Option<Value> {
    let mut diff = Map::new();
    for (key, old, new) in pairs {
        match new {
            None => {
                diff.insert(key, Value::Null);
            }
            Some(new) if ValueKind::of(old) == ValueKind::of(new) && is_container(new) => {
                if let Some(sub) = deep_diff(old, new) {
                    diff.insert(key, sub);
                }
            }
            Some(new) if old != new => {
                diff.insert(key, new.clone());
            }
            Some(_) => {}
        }
    }
    diff.extend(added);
    (!diff.is_empty()).then_some(Value::Object(diff))
}

/// Wrap `leaf` in nested objects so it sits at `path`.
///
/// `nest_at(todos.0, v)` yields `{"todos": {"0": v}}`; the root path yields
/// `leaf` unchanged.
pub fn nest_at(path: &Path, leaf: Value) -> Value {
    path.segments().iter().rev().fold(leaf, |inner, seg| {
        let mut obj = Map::new();
        obj.insert(seg.component().into_owned(), inner);
        Value::Object(obj)
    })
}
