//! Update operators: `$set`, `$push` and `$pull`.
//!
//! Every operator addresses its target with a dot-separated path. Numeric
//! segments index into arrays, other segments name object fields, and a
//! `$` segment stands for the array index that satisfied the filter (see
//! [`Positional`]). All three operators share one path walk; `$set` and
//! `$push` create missing intermediate containers, `$pull` never does.

use serde_json::{Map, Value};

use crate::app_response::{AppResponse, StoreResult};
use crate::collection_file::{json_kind, Document};
use crate::filter::{strict_eq, Filter, Positional};

pub const SET: &str = "$set";
pub const PUSH: &str = "$push";
pub const PULL: &str = "$pull";
pub const POSITIONAL: &str = "$";

/// How far past the end of an array a dotted-path write may land; the gap is
/// filled with `null`.
pub const MAX_ARRAY_GAP: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum PullCriteria {
    /// Removes embedded documents satisfying the filter, e.g. `{ "id": "s1" }`.
    Matching(Filter),
    /// Removes elements equal to a scalar.
    Equal(Value),
}

impl PullCriteria {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => PullCriteria::Matching(Filter::from_map(map)),
            other => PullCriteria::Equal(other.clone()),
        }
    }

    fn removes(&self, element: &Value) -> bool {
        match self {
            PullCriteria::Matching(filter) => filter.matches_value(element),
            PullCriteria::Equal(expected) => strict_eq(element, expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set { path: String, value: Value },
    Push { path: String, value: Value },
    Pull { path: String, criteria: PullCriteria },
}

/// An ordered list of operators applied to one matched document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn push(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Push {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn pull_matching(mut self, path: impl Into<String>, filter: Filter) -> Self {
        self.ops.push(UpdateOp::Pull {
            path: path.into(),
            criteria: PullCriteria::Matching(filter),
        });
        self
    }

    pub fn pull_equal(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Pull {
            path: path.into(),
            criteria: PullCriteria::Equal(value.into()),
        });
        self
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Parses `{ "$set": {..}, "$push": {..}, "$pull": {..} }`. Operators are
    /// applied `$set` first, then `$push`, then `$pull`, regardless of the
    /// key order in the input.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        let Value::Object(doc) = value else {
            return Err(AppResponse::BadRequest(format!(
                "Update must be an object, got {}",
                json_kind(value)
            )));
        };

        if doc.is_empty() {
            return Err(AppResponse::BadRequest(
                "Update document has no operators".to_string(),
            ));
        }

        if let Some(key) = doc.keys().find(|k| ![SET, PUSH, PULL].contains(&k.as_str())) {
            return Err(AppResponse::ValidationError(format!(
                "Unsupported update operator '{key}'"
            )));
        }

        let mut update = Update::new();

        for (path, value) in operator_body(doc, SET)? {
            update = update.set(path.clone(), value.clone());
        }
        for (path, value) in operator_body(doc, PUSH)? {
            update = update.push(path.clone(), value.clone());
        }
        for (path, value) in operator_body(doc, PULL)? {
            update.ops.push(UpdateOp::Pull {
                path: path.clone(),
                criteria: PullCriteria::from_json(value),
            });
        }

        Ok(update)
    }

    /// Applies every operator to a copy of `doc` and commits the copy only if
    /// all of them succeed.
    pub fn apply(&self, doc: &mut Document, positional: &Positional) -> StoreResult<()> {
        let mut root = Value::Object(doc.clone());

        for op in &self.ops {
            match op {
                UpdateOp::Set { path, value } => {
                    let segments = resolve_path(path, positional)?;
                    *slot_mut(&mut root, &segments, path)? = value.clone();
                }
                UpdateOp::Push { path, value } => {
                    let segments = resolve_path(path, positional)?;
                    let slot = slot_mut(&mut root, &segments, path)?;
                    if slot.is_null() {
                        *slot = Value::Array(vec![value.clone()]);
                    } else if let Value::Array(items) = slot {
                        items.push(value.clone());
                    } else {
                        return Err(AppResponse::ValidationError(format!(
                            "Cannot $push onto {} at '{path}'",
                            json_kind(slot)
                        )));
                    }
                }
                UpdateOp::Pull { path, criteria } => {
                    let segments = resolve_path(path, positional)?;
                    match existing_mut(&mut root, &segments) {
                        None | Some(Value::Null) => {}
                        Some(Value::Array(items)) => items.retain(|item| !criteria.removes(item)),
                        Some(other) => {
                            return Err(AppResponse::ValidationError(format!(
                                "Cannot $pull from {} at '{path}'",
                                json_kind(other)
                            )))
                        }
                    }
                }
            }
        }

        if let Value::Object(updated) = root {
            *doc = updated;
        }
        Ok(())
    }
}

fn operator_body<'a>(
    doc: &'a Map<String, Value>,
    operator: &str,
) -> StoreResult<Vec<(&'a String, &'a Value)>> {
    match doc.get(operator) {
        None => Ok(Vec::new()),
        Some(Value::Object(body)) => Ok(body.iter().collect()),
        Some(other) => Err(AppResponse::ValidationError(format!(
            "{operator} expects an object, got {}",
            json_kind(other)
        ))),
    }
}

/// Splits `path` and substitutes `$` with the index the filter captured for
/// the array that precedes it.
fn resolve_path(path: &str, positional: &Positional) -> StoreResult<Vec<String>> {
    let mut segments: Vec<String> = Vec::new();

    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(AppResponse::ValidationError(format!(
                "Empty segment in update path '{path}'"
            )));
        }

        if segment == POSITIONAL {
            let array_path = segments.join(".");
            let idx = positional.index_for(&array_path).ok_or_else(|| {
                AppResponse::ValidationError(format!(
                    "Positional operator in '{path}' has no matching '{array_path}' element in the filter"
                ))
            })?;
            segments.push(idx.to_string());
        } else {
            segments.push(segment.to_string());
        }
    }

    Ok(segments)
}

fn empty_container(next_is_index: bool) -> Value {
    if next_is_index {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn parse_index(segment: &str, path: &str) -> StoreResult<usize> {
    segment.parse::<usize>().map_err(|_| {
        AppResponse::ValidationError(format!(
            "Segment '{segment}' of '{path}' addresses an array but is not an index"
        ))
    })
}

/// Returns the slot named by `segments`, creating intermediate containers and
/// a `null` leaf when absent. Arrays indexed past their end are padded with
/// `null`, up to [`MAX_ARRAY_GAP`] slots.
fn slot_mut<'a>(root: &'a mut Value, segments: &[String], path: &str) -> StoreResult<&'a mut Value> {
    let mut current = root;

    for (i, segment) in segments.iter().enumerate() {
        let leaf = i + 1 == segments.len();
        let next_is_index = !leaf && segments[i + 1].parse::<usize>().is_ok();

        current = match current {
            Value::Object(map) => {
                let slot = map.entry(segment.clone()).or_insert(Value::Null);
                if !leaf && slot.is_null() {
                    *slot = empty_container(next_is_index);
                }
                slot
            }
            Value::Array(items) => {
                let idx = parse_index(segment, path)?;
                if idx >= items.len() {
                    let new_len = idx
                        .checked_add(1)
                        .filter(|len| len - items.len() <= MAX_ARRAY_GAP)
                        .ok_or_else(|| {
                            AppResponse::ValidationError(format!(
                                "Index {idx} in '{path}' is too far past the end of an array of {} elements",
                                items.len()
                            ))
                        })?;
                    items.resize(new_len, Value::Null);
                }
                let slot = &mut items[idx];
                if !leaf && slot.is_null() {
                    *slot = empty_container(next_is_index);
                }
                slot
            }
            other => {
                return Err(AppResponse::ValidationError(format!(
                    "Cannot descend into {} at '{segment}' of '{path}'",
                    json_kind(other)
                )))
            }
        };
    }

    Ok(current)
}

fn existing_mut<'a>(root: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment.as_str())?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
