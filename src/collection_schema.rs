//! Per-collection shape repair.
//!
//! Collection files carry no schema, so documents written by older versions
//! of the application (or by callers passing the wrong type) can miss fields
//! the rest of the code relies on. Each [`CollectionKind`] declares a few
//! [`FieldRule`]s that are enforced lazily: when documents are read, when
//! they are inserted, and after every update. Nothing is ever migrated on
//! disk ahead of time.
//!
//! ```rust
//! use coursify_store::collection_schema::CollectionKind;
//! use serde_json::json;
//!
//! let kind = CollectionKind::from_name("courses");
//! let mut doc = json!({"id": "c1", "title": "X"}).as_object().unwrap().clone();
//! kind.normalize(&mut doc);
//!
//! assert_eq!(doc["skills"], json!([]));
//! assert_eq!(doc["progress"], json!(0));
//! ```

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::app_response::{AppResponse, StoreResult};
use crate::collection_file::{json_kind, Document};
use crate::filter::ID_KEY;
use crate::id_gen;

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Collections the application knows about, plus a catch-all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Users,
    Courses,
    Lessons,
    Chapters,
    Quizzes,
    Reviews,
    LessonProgress,
    Generic(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    /// Must be an array; filled with `[]` when missing on read.
    List,
    /// Must be an array when present, but is left absent on read.
    OptionalList,
    Number(i64),
    Text(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRule {
    pub field: &'static str,
    pub default: FieldDefault,
}

const fn rule(field: &'static str, default: FieldDefault) -> FieldRule {
    FieldRule { field, default }
}

const COURSE_RULES: &[FieldRule] = &[
    rule("skills", FieldDefault::List),
    rule("participatedUsers", FieldDefault::List),
    rule("progress", FieldDefault::Number(0)),
    rule("lessons", FieldDefault::List),
];

const LESSON_RULES: &[FieldRule] = &[
    rule("chapters", FieldDefault::List),
    rule("quizzes", FieldDefault::List),
    rule("status", FieldDefault::Text("DRAFT")),
];

const CHAPTER_RULES: &[FieldRule] = &[rule("sections", FieldDefault::List)];

const QUIZ_RULES: &[FieldRule] = &[
    rule("questions", FieldDefault::List),
    rule("evaluations", FieldDefault::OptionalList),
];

impl FieldRule {
    fn accepts(&self, value: &Value) -> bool {
        match self.default {
            FieldDefault::List | FieldDefault::OptionalList => value.is_array(),
            FieldDefault::Number(_) => value.is_number(),
            FieldDefault::Text(_) => value.is_string(),
        }
    }

    fn default_value(&self) -> Value {
        match self.default {
            FieldDefault::List | FieldDefault::OptionalList => Value::Array(Vec::new()),
            FieldDefault::Number(n) => Value::from(n),
            FieldDefault::Text(s) => Value::from(s),
        }
    }

    fn fills_missing(&self) -> bool {
        !matches!(self.default, FieldDefault::OptionalList)
    }

    fn repair(&self, doc: &mut Document) {
        match doc.get(self.field) {
            Some(value) if self.accepts(value) => {}
            None if !self.fills_missing() => {}
            _ => {
                doc.insert(self.field.to_string(), self.default_value());
            }
        }
    }
}

impl CollectionKind {
    pub const WELL_KNOWN: [&'static str; 7] = [
        "users",
        "courses",
        "lessons",
        "chapters",
        "quizzes",
        "reviews",
        "lessonProgress",
    ];

    pub fn from_name(name: &str) -> Self {
        match name {
            "users" => CollectionKind::Users,
            "courses" => CollectionKind::Courses,
            "lessons" => CollectionKind::Lessons,
            "chapters" => CollectionKind::Chapters,
            "quizzes" => CollectionKind::Quizzes,
            "reviews" => CollectionKind::Reviews,
            "lessonProgress" => CollectionKind::LessonProgress,
            other => CollectionKind::Generic(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CollectionKind::Users => "users",
            CollectionKind::Courses => "courses",
            CollectionKind::Lessons => "lessons",
            CollectionKind::Chapters => "chapters",
            CollectionKind::Quizzes => "quizzes",
            CollectionKind::Reviews => "reviews",
            CollectionKind::LessonProgress => "lessonProgress",
            CollectionKind::Generic(name) => name,
        }
    }

    pub fn rules(&self) -> &'static [FieldRule] {
        match self {
            CollectionKind::Courses => COURSE_RULES,
            CollectionKind::Lessons => LESSON_RULES,
            CollectionKind::Chapters => CHAPTER_RULES,
            CollectionKind::Quizzes => QUIZ_RULES,
            _ => &[],
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            CollectionKind::Users => "user",
            CollectionKind::Courses => "course",
            CollectionKind::Lessons => "lesson",
            CollectionKind::Chapters => "chapter",
            CollectionKind::Quizzes => "quiz",
            CollectionKind::Reviews => "review",
            CollectionKind::LessonProgress => "progress",
            CollectionKind::Generic(_) => "doc",
        }
    }

    fn stamps_created(&self) -> bool {
        matches!(
            self,
            CollectionKind::Lessons
                | CollectionKind::Chapters
                | CollectionKind::Quizzes
                | CollectionKind::Reviews
        )
    }

    fn stamps_updated(&self) -> bool {
        self.stamps_created()
    }

    pub fn generate_id(&self) -> String {
        match self {
            CollectionKind::Users => id_gen::nanoid(),
            other => id_gen::prefixed_id(other.id_prefix()),
        }
    }

    /// Fills missing fields and replaces mistyped ones with their defaults.
    pub fn normalize(&self, doc: &mut Document) {
        for rule in self.rules() {
            rule.repair(doc);
        }
    }

    /// Shape repair for a new document: assigns an id when none is given,
    /// applies the field rules and stamps creation time where the collection
    /// tracks it. An `id` that is present but not a string is rejected.
    pub fn prepare_insert(&self, doc: &mut Document) -> StoreResult<String> {
        let id = match doc.get(ID_KEY) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            None | Some(Value::Null) | Some(Value::String(_)) => {
                let id = self.generate_id();
                doc.insert(ID_KEY.to_string(), Value::String(id.clone()));
                id
            }
            Some(other) => {
                return Err(AppResponse::ValidationError(format!(
                    "Document id must be a string, got {}",
                    json_kind(other)
                )))
            }
        };

        self.normalize(doc);

        if self.stamps_created() {
            let now = timestamp();
            if !doc.contains_key(CREATED_AT) {
                doc.insert(CREATED_AT.to_string(), Value::String(now.clone()));
            }
            if *self == CollectionKind::Lessons && !doc.contains_key(UPDATED_AT) {
                doc.insert(UPDATED_AT.to_string(), Value::String(now));
            }
        }

        Ok(id)
    }

    /// Restores ruled fields an update left mistyped, preferring the value
    /// the document had before the update, then bumps `updatedAt`.
    ///
    /// A `$set` that writes a string into a list field is silently undone
    /// here rather than rejected.
    pub fn repair_after_update(&self, previous: &Document, updated: &mut Document) {
        for rule in self.rules() {
            let still_valid = match updated.get(rule.field) {
                Some(value) => rule.accepts(value),
                None => !rule.fills_missing(),
            };
            if still_valid {
                continue;
            }

            let restored = previous
                .get(rule.field)
                .filter(|value| rule.accepts(value))
                .cloned();
            match restored {
                Some(value) => {
                    updated.insert(rule.field.to_string(), value);
                }
                None if !rule.fills_missing() && !previous.contains_key(rule.field) => {
                    updated.remove(rule.field);
                }
                None => {
                    updated.insert(rule.field.to_string(), rule.default_value());
                }
            }
        }

        if self.stamps_updated() {
            updated.insert(UPDATED_AT.to_string(), Value::String(timestamp()));
        }
    }
}

/// RFC 3339 UTC with millisecond precision, e.g. `2024-06-10T08:30:00.000Z`.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
