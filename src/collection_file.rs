//! Backing-file lifecycle for a single collection.
//!
//! Each collection lives in one file holding a top-level JSON array. Writers
//! never touch the live file directly: the full array goes to a unique sibling
//! temp file which is then renamed over the target, so a reader sees either
//! the old array or the new one. Readers retry briefly to ride out the window
//! where the file is missing or being replaced on platforms without atomic
//! replace.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use rand::Rng;
use serde_json::Value;

use crate::app_response::{AppResponse, StoreResult};
use crate::retry::{retry, RetryPolicy};

pub type Document = serde_json::Map<String, Value>;

const EMPTY_COLLECTION: &str = "[]";

/// Creates the parent directory and an empty-array file if either is missing.
/// Leaves an existing file untouched.
pub fn ensure_file(path: &Path) -> StoreResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(EMPTY_COLLECTION.as_bytes())?;
            file.sync_all()?;
            info!("Initialized empty collection file at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Loads every document of the collection, creating the file on first access.
pub fn read_collection(path: &Path, policy: RetryPolicy) -> StoreResult<Vec<Document>> {
    ensure_file(path)?;
    let label = format!("read {}", path.display());
    retry(policy, &label, || parse_collection(path))
}

fn parse_collection(path: &Path) -> StoreResult<Vec<Document>> {
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(AppResponse::SerializationError(format!(
                "Collection file {} holds {} instead of an array",
                path.display(),
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(doc) => Ok(doc),
            other => Err(AppResponse::SerializationError(format!(
                "Entry {i} of {} is {} instead of a document",
                path.display(),
                json_kind(&other)
            ))),
        })
        .collect()
}

/// Replaces the collection file with `docs` via temp file + rename.
pub fn write_collection(path: &Path, docs: &[Document], pretty: bool) -> StoreResult<()> {
    let content = if pretty {
        serde_json::to_string_pretty(docs)?
    } else {
        serde_json::to_string(docs)?
    };
    atomic_write(path, content.as_bytes())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let tmp = temp_sibling(path);
    let result = write_and_rename(&tmp, path, bytes);

    if let Err(e) = &result {
        warn!("Write of {} failed, original left untouched: {e}", path.display());
        if let Err(cleanup) = fs::remove_file(&tmp) {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!("Could not remove temp file {}: {cleanup}", tmp.display());
            }
        }
    } else {
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    }

    result
}

fn write_and_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, target)?;
    Ok(())
}

/// `<file>.tmp-<millis>-<random>`, unique per call.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let nonce: u32 = rand::thread_rng().gen();

    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{millis}-{nonce:08x}"));
    path.with_file_name(name)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
