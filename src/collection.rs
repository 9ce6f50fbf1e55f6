//! Per-collection operation set.
//!
//! Every call loads the whole collection from disk, works on it in memory
//! and, for mutations, writes the whole collection back. Nothing is cached
//! between calls. Two read-modify-write sequences that overlap will lose one
//! of the writes; the store prevents torn files, not lost updates.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::app_response::{AppResponse, StoreResult};
use crate::collection_file::{self, json_kind, Document};
use crate::collection_schema::CollectionKind;
use crate::document_store::DocumentStore;
use crate::filter::{Filter, FindOptions};
use crate::update::Update;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
    pub inserted_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Deferred result of [`Collection::find`].
#[derive(Debug)]
pub struct FindCursor<'a> {
    collection: Collection<'a>,
    filter: Filter,
    options: FindOptions,
}

impl FindCursor<'_> {
    /// Reads the collection and returns the matching documents in file order.
    pub fn to_array(&self) -> StoreResult<Vec<Document>> {
        let docs = self.collection.load()?;
        let projection = self.options.projection.as_ref();

        Ok(docs
            .into_iter()
            .filter(|doc| self.filter.matches(doc).is_some())
            .map(|mut doc| {
                if let Some(projection) = projection {
                    projection.apply(&mut doc);
                }
                doc
            })
            .collect())
    }
}

/// Handle on one named collection, borrowed from a [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct Collection<'a> {
    store: &'a DocumentStore,
    kind: CollectionKind,
    path: PathBuf,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(store: &'a DocumentStore, kind: CollectionKind, path: PathBuf) -> Self {
        Self { store, kind, path }
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn kind(&self) -> &CollectionKind {
        &self.kind
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn load(&self) -> StoreResult<Vec<Document>> {
        let mut docs = collection_file::read_collection(&self.path, self.store.retry_policy())?;
        for doc in docs.iter_mut() {
            self.kind.normalize(doc);
        }
        Ok(docs)
    }

    fn persist(&self, docs: &[Document]) -> StoreResult<()> {
        collection_file::write_collection(&self.path, docs, self.store.config().pretty)
    }

    /// First document matching `filter`, or `None`.
    pub fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        let docs = self.load()?;
        Ok(docs.into_iter().find(|doc| filter.matches(doc).is_some()))
    }

    /// Nothing is read until [`FindCursor::to_array`] is called.
    pub fn find(&self, filter: Filter, options: FindOptions) -> FindCursor<'a> {
        FindCursor {
            collection: self.clone(),
            filter,
            options,
        }
    }

    pub fn count(&self, filter: &Filter) -> StoreResult<usize> {
        let docs = self.load()?;
        Ok(docs.iter().filter(|doc| filter.matches(doc).is_some()).count())
    }

    /// Appends a normalized copy of `doc`. A missing `id` is generated; an
    /// existing string id is trusted without a uniqueness check, any other
    /// id type is rejected.
    pub fn insert_one(&self, doc: Document) -> StoreResult<InsertOneResult> {
        let mut docs = self.load()?;
        let mut doc = doc;
        let inserted_id = self.kind.prepare_insert(&mut doc)?;

        docs.push(doc);
        self.persist(&docs)?;

        debug!("Inserted '{inserted_id}' into {}", self.name());
        Ok(InsertOneResult { inserted_id })
    }

    /// Same as [`insert_one`](Self::insert_one) for a raw JSON value, which
    /// must be an object.
    pub fn insert_json(&self, value: Value) -> StoreResult<InsertOneResult> {
        match value {
            Value::Object(doc) => self.insert_one(doc),
            other => Err(AppResponse::BadRequest(format!(
                "Only documents can be inserted, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Applies `update` to the first document matching `filter`. A miss is
    /// reported as `matched_count == 0`, not as an error, and leaves the file
    /// untouched.
    pub fn update_one(&self, filter: &Filter, update: &Update) -> StoreResult<UpdateResult> {
        let mut docs = self.load()?;

        let hit = docs
            .iter()
            .enumerate()
            .find_map(|(idx, doc)| filter.matches(doc).map(|positional| (idx, positional)));

        let Some((idx, positional)) = hit else {
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
            });
        };

        let previous = docs[idx].clone();
        let mut updated = previous.clone();
        update.apply(&mut updated, &positional)?;
        self.kind.repair_after_update(&previous, &mut updated);

        docs[idx] = updated;
        self.persist(&docs)?;

        Ok(UpdateResult {
            matched_count: 1,
            modified_count: 1,
        })
    }

    /// Removes the first document matching `filter`.
    pub fn delete_one(&self, filter: &Filter) -> StoreResult<DeleteResult> {
        let mut docs = self.load()?;

        let Some(idx) = docs.iter().position(|doc| filter.matches(doc).is_some()) else {
            return Ok(DeleteResult { deleted_count: 0 });
        };

        let removed = docs.remove(idx);
        self.persist(&docs)?;

        if let Some(id) = removed.get("id").and_then(Value::as_str) {
            info!("Deleted '{id}' from {}", self.name());
        }
        Ok(DeleteResult { deleted_count: 1 })
    }
}
