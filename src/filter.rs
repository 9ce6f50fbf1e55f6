//! Equality filters and exclusion projections.
//!
//! A [`Filter`] is a conjunction of `field == value` constraints. Comparison
//! is strict and shallow: strings, booleans, `null` and numbers compare by
//! value, while array or object constraint values never match anything.
//!
//! Dotted keys descend into embedded documents. When the walk reaches an
//! array and the next segment is not an index, each element is tried in
//! turn and the index of the first one that matches is recorded in
//! [`Positional`], which the update engine uses to resolve `$` in paths.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::app_response::{AppResponse, StoreResult};
use crate::collection_file::{json_kind, Document};

/// Filter key that callers written against `_id` primary keys use for `id`.
pub const LEGACY_ID_KEY: &str = "_id";
pub const ID_KEY: &str = "id";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

/// Array indices captured while matching dotted filter keys, keyed by the
/// path of the array (`"participatedUsers"`, `"lessons.2.quizzes"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Positional {
    captures: Vec<(String, usize)>,
}

impl Positional {
    pub fn index_for(&self, array_path: &str) -> Option<usize> {
        self.captures
            .iter()
            .find(|(path, _)| path == array_path)
            .map(|(_, idx)| *idx)
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

impl Filter {
    /// Matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::all().eq(ID_KEY, Value::String(id.into()))
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    /// Accepts a JSON object, or `null` for "match all".
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(AppResponse::BadRequest(format!(
                "Filter must be an object, got {}",
                json_kind(other)
            ))),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            conditions: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Returns the captured array positions when every condition holds.
    pub fn matches(&self, doc: &Document) -> Option<Positional> {
        let mut positional = Positional::default();

        for (key, expected) in &self.conditions {
            let matched = if key == LEGACY_ID_KEY {
                doc.get(ID_KEY).is_some_and(|v| strict_eq(v, expected))
            } else if key.contains('.') {
                let segments: Vec<&str> = key.split('.').collect();
                match_in_document(doc, &segments, expected, &mut positional.captures)
            } else {
                doc.get(key).is_some_and(|v| strict_eq(v, expected))
            };

            if !matched {
                return None;
            }
        }

        Some(positional)
    }

    /// Element test used by `$pull`: only documents can satisfy a filter.
    pub fn matches_value(&self, value: &Value) -> bool {
        match value {
            Value::Object(doc) => self.matches(doc).is_some(),
            _ => false,
        }
    }
}

fn match_in_document(
    doc: &Document,
    segments: &[&str],
    expected: &Value,
    captures: &mut Vec<(String, usize)>,
) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return false;
    };
    match doc.get(*head) {
        Some(next) => match_path(next, rest, expected, head, captures),
        None => false,
    }
}

fn match_path(
    current: &Value,
    segments: &[&str],
    expected: &Value,
    walked: &str,
    captures: &mut Vec<(String, usize)>,
) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return strict_eq(current, expected);
    };

    match current {
        Value::Object(map) => match map.get(*head) {
            Some(next) => match_path(next, rest, expected, &format!("{walked}.{head}"), captures),
            None => false,
        },
        Value::Array(items) => {
            if let Ok(idx) = head.parse::<usize>() {
                return match items.get(idx) {
                    Some(next) => {
                        match_path(next, rest, expected, &format!("{walked}.{head}"), captures)
                    }
                    None => false,
                };
            }

            for (idx, item) in items.iter().enumerate() {
                let mut inner = Vec::new();
                if match_path(item, segments, expected, &format!("{walked}.{idx}"), &mut inner) {
                    captures.push((walked.to_string(), idx));
                    captures.extend(inner);
                    return true;
                }
            }
            false
        }
        _ => false,
    }
}

/// Scalar equality with numbers compared numerically (`1 == 1.0`).
/// Arrays and objects are never equal to anything.
pub fn strict_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_eq(a, b),
        _ => false,
    }
}

fn numbers_eq(a: &Number, b: &Number) -> bool {
    if a == b {
        return true;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Exclusion-only projection: `{ "password": 0 }` drops `password`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    excluded: Vec<String>,
}

impl Projection {
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.excluded.push(field.into());
        self
    }

    pub fn from_json(value: &Value) -> StoreResult<Self> {
        let Value::Object(map) = value else {
            return Err(AppResponse::BadRequest(format!(
                "Projection must be an object, got {}",
                json_kind(value)
            )));
        };

        let mut projection = Self::default();
        for (field, flag) in map {
            if flag.as_f64() == Some(0.0) || flag == &Value::Bool(false) {
                projection.excluded.push(field.clone());
            } else {
                warn!("Inclusion projection on '{field}' is not supported, ignoring");
            }
        }
        Ok(projection)
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    pub fn apply(&self, doc: &mut Document) {
        for field in &self.excluded {
            doc.remove(field);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Projection>,
}

impl FindOptions {
    pub fn with_projection(projection: Projection) -> Self {
        Self {
            projection: Some(projection),
        }
    }

    /// Parses `{ "projection": { ... } }`; `null` means no options.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => {
                let projection = match map.get("projection") {
                    None | Some(Value::Null) => None,
                    Some(p) => Some(Projection::from_json(p)?),
                };
                Ok(Self { projection })
            }
            other => Err(AppResponse::BadRequest(format!(
                "Find options must be an object, got {}",
                json_kind(other)
            ))),
        }
    }
}
