//! # Coursify Store
//!
//! A document store that keeps each collection in its own JSON file and
//! answers a small document-database style API over it: `find_one`, `find`,
//! `insert_one`, `update_one` and `delete_one`, with equality filters and the
//! `$set`, `$push` and `$pull` update operators.
//!
//! ## Features
//!
//! - **One file per collection**: `<data_dir>/<name>.json`, always a JSON array
//! - **Atomic replace on write**: full rewrite to a temp sibling, then rename
//! - **Retry on read**: rides out a reader racing a writer's rename
//! - **Lazy shape repair**: list fields and defaults restored on every access
//! - **FFI surface**: C-compatible functions returning JSON envelopes
//!
//! ## Quick Start
//!
//! ```no_run
//! use coursify_store::{DocumentStore, Filter, StoreConfig, Update};
//! use serde_json::json;
//!
//! let store = DocumentStore::open(StoreConfig::new("data"))?;
//! let courses = store.collection("courses")?;
//!
//! courses.insert_json(json!({"id": "c1", "title": "Rust"}))?;
//! courses.update_one(&Filter::by_id("c1"), &Update::new().set("title", "Rust 101"))?;
//!
//! let course = courses.find_one(&Filter::by_id("c1"))?;
//! assert_eq!(course.unwrap()["skills"], json!([]));
//! # Ok::<(), coursify_store::AppResponse>(())
//! ```
//!
//! ## FFI Functions
//!
//! - [`store_open`] - Open a store rooted at a data directory
//! - [`store_connect`] - Create every well-known collection file
//! - [`collection_find_one`] / [`collection_find`] - Queries
//! - [`collection_insert_one`] / [`collection_update_one`] / [`collection_delete_one`] - Mutations
//! - [`store_close`] - Release the store handle
//! - [`free_response`] - Release a string returned by any of the above

pub mod app_response;
pub mod collection;
pub mod collection_file;
pub mod collection_schema;
pub mod config;
pub mod document_store;
pub mod filter;
pub mod id_gen;
pub mod retry;
pub mod update;

pub use crate::app_response::{AppResponse, StoreResult};
pub use crate::collection::{Collection, DeleteResult, FindCursor, InsertOneResult, UpdateResult};
pub use crate::collection_file::Document;
pub use crate::config::StoreConfig;
pub use crate::document_store::DocumentStore;
pub use crate::filter::{Filter, FindOptions, Projection};
pub use crate::update::{Update, UpdateOp};

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

/// Opens a store rooted at `data_dir`, creating the directory if needed.
///
/// Collection files are not touched until they are first used, or until
/// [`store_connect`] is called.
///
/// # Parameters
///
/// * `data_dir` - A null-terminated C string with the directory path
///
/// # Returns
///
/// A pointer to the [`DocumentStore`], or null when the path is null, not
/// UTF-8, or the directory cannot be created. Release it with [`store_close`].
///
/// # Safety
///
/// `data_dir` must be null or point to a valid null-terminated string. The
/// returned pointer is owned by the caller until passed to [`store_close`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use coursify_store::store_open;
///
/// let dir = CString::new("data").unwrap();
/// let store = store_open(dir.as_ptr());
/// assert!(!store.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn store_open(data_dir: *const c_char) -> *mut DocumentStore {
    if data_dir.is_null() {
        warn!("Null data_dir pointer passed to store_open");
        return std::ptr::null_mut();
    }

    let dir = match unsafe { CStr::from_ptr(data_dir).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in data_dir parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match DocumentStore::open(StoreConfig::new(dir)) {
        Ok(store) => {
            info!("✅ Store opened at {dir}");
            Box::into_raw(Box::new(store))
        }
        Err(e) => {
            warn!("❌ Failed to open store at {dir}: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Ensures every well-known collection file exists.
///
/// # Parameters
///
/// * `store` - Pointer returned by [`store_open`]
///
/// # Returns
///
/// A JSON `AppResponse`: `Ok` once all files exist, `DatabaseError` when one
/// cannot be created, `BadRequest` for a null store.
///
/// # Safety
///
/// `store` must be null or a live pointer from [`store_open`]. The returned
/// string must be released with [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn store_connect(store: *mut DocumentStore) -> *const c_char {
    let store = match unsafe { store.as_ref() } {
        Some(s) => s,
        None => return response_to_c_string(&null_store("store_connect")),
    };

    match store.connect() {
        Ok(()) => response_to_c_string(&AppResponse::success("Connected")),
        Err(e) => response_to_c_string(&e),
    }
}

/// Releases a store handle obtained from [`store_open`].
///
/// # Parameters
///
/// * `store` - Pointer returned by [`store_open`]
///
/// # Returns
///
/// A JSON `AppResponse`: `Ok` when the handle was dropped, `BadRequest` for
/// a null store.
///
/// # Safety
///
/// `store` must come from [`store_open`] and must not be used, or closed
/// again, afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn store_close(store: *mut DocumentStore) -> *const c_char {
    if store.is_null() {
        return response_to_c_string(&null_store("store_close"));
    }

    let store = unsafe { Box::from_raw(store) };
    store.close();
    response_to_c_string(&AppResponse::success("Store closed"))
}

/// Looks up the first document matching `filter_json`.
///
/// # Parameters
///
/// * `store` - Pointer returned by [`store_open`]
/// * `name` - Collection name, e.g. `"courses"`
/// * `filter_json` - Equality filter such as `{"id": "c1"}`; `{}` matches anything
///
/// # Returns
///
/// `Ok` with the document as JSON text, or `NotFound` when nothing matches.
/// Bad pointers give `BadRequest`, unparsable JSON `SerializationError`.
///
/// # Safety
///
/// Every pointer must be null or valid for the duration of the call. The
/// returned string must be released with [`free_response`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use coursify_store::{collection_find_one, store_open};
///
/// let dir = CString::new("data").unwrap();
/// let store = store_open(dir.as_ptr());
/// let name = CString::new("courses").unwrap();
/// let filter = CString::new(r#"{"id":"c1"}"#).unwrap();
/// let result = collection_find_one(store, name.as_ptr(), filter.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn collection_find_one(
    store: *mut DocumentStore,
    name: *const c_char,
    filter_json: *const c_char,
) -> *const c_char {
    let response = with_collection(store, name, "collection_find_one", |collection| {
        let filter = Filter::from_json(&parse_json_arg(filter_json, "filter")?)?;
        match collection.find_one(&filter)? {
            Some(doc) => ok_json(&doc),
            None => Err(AppResponse::NotFound(format!(
                "No document in '{}' matches the filter",
                collection.name()
            ))),
        }
    });
    response_to_c_string(&response)
}

/// Returns every matching document as a JSON array, in file order.
///
/// # Parameters
///
/// * `store` - Pointer returned by [`store_open`]
/// * `name` - Collection name
/// * `filter_json` - Equality filter, `{}` or `null` for all documents
/// * `options_json` - Null, or `{"projection": {"field": 0}}`
///
/// # Returns
///
/// `Ok` with a JSON array (possibly empty) of the matching documents.
///
/// # Safety
///
/// Every pointer must be null or valid for the duration of the call. The
/// returned string must be released with [`free_response`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use coursify_store::{collection_find, free_response, store_open};
///
/// let dir = CString::new("data").unwrap();
/// let store = store_open(dir.as_ptr());
/// let name = CString::new("users").unwrap();
/// let filter = CString::new(r#"{"role":"Admin"}"#).unwrap();
/// let options = CString::new(r#"{"projection":{"password":0}}"#).unwrap();
/// let result = collection_find(store, name.as_ptr(), filter.as_ptr(), options.as_ptr());
/// free_response(result);
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn collection_find(
    store: *mut DocumentStore,
    name: *const c_char,
    filter_json: *const c_char,
    options_json: *const c_char,
) -> *const c_char {
    let response = with_collection(store, name, "collection_find", |collection| {
        let filter = Filter::from_json(&parse_json_arg(filter_json, "filter")?)?;
        let options = if options_json.is_null() {
            FindOptions::default()
        } else {
            FindOptions::from_json(&parse_json_arg(options_json, "options")?)?
        };
        let docs = collection.find(filter, options).to_array()?;
        ok_json(&docs)
    });
    response_to_c_string(&response)
}

/// Inserts a document after filling the collection's defaults.
///
/// # Parameters
///
/// * `store` - Pointer returned by [`store_open`]
/// * `name` - Collection name
/// * `doc_json` - A JSON object; a missing `id` is generated
///
/// # Returns
///
/// `Ok` with `{"insertedId": "..."}`. A non-object document gives
/// `BadRequest`, a non-string `id` gives `ValidationError`.
///
/// # Safety
///
/// Every pointer must be null or valid for the duration of the call. The
/// returned string must be released with [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn collection_insert_one(
    store: *mut DocumentStore,
    name: *const c_char,
    doc_json: *const c_char,
) -> *const c_char {
    let response = with_collection(store, name, "collection_insert_one", |collection| {
        let doc = parse_json_arg(doc_json, "document")?;
        ok_json(&collection.insert_json(doc)?)
    });
    response_to_c_string(&response)
}

/// Applies `update_json` to the first document matching `filter_json`.
///
/// # Parameters
///
/// * `store` - Pointer returned by [`store_open`]
/// * `name` - Collection name
/// * `filter_json` - Equality filter; dotted keys capture the index used by `$`
/// * `update_json` - `{"$set": {..}, "$push": {..}, "$pull": {..}}`
///
/// # Returns
///
/// `Ok` with `{"matchedCount": n, "modifiedCount": n}`, where `n` is 0 when
/// nothing matched. An update that cannot be applied gives
/// `ValidationError` and leaves the file as it was.
///
/// # Safety
///
/// Every pointer must be null or valid for the duration of the call. The
/// returned string must be released with [`free_response`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use coursify_store::{collection_update_one, free_response, store_open};
///
/// let dir = CString::new("data").unwrap();
/// let store = store_open(dir.as_ptr());
/// let name = CString::new("courses").unwrap();
/// let filter = CString::new(r#"{"id":"c1","lessons.id":"l2"}"#).unwrap();
/// let update = CString::new(r#"{"$set":{"lessons.$.status":"PUBLISHED"}}"#).unwrap();
/// let result = collection_update_one(store, name.as_ptr(), filter.as_ptr(), update.as_ptr());
/// free_response(result);
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn collection_update_one(
    store: *mut DocumentStore,
    name: *const c_char,
    filter_json: *const c_char,
    update_json: *const c_char,
) -> *const c_char {
    let response = with_collection(store, name, "collection_update_one", |collection| {
        let filter = Filter::from_json(&parse_json_arg(filter_json, "filter")?)?;
        let update = Update::from_json(&parse_json_arg(update_json, "update")?)?;
        ok_json(&collection.update_one(&filter, &update)?)
    });
    response_to_c_string(&response)
}

/// Removes the first document matching `filter_json`.
///
/// # Parameters
///
/// * `store` - Pointer returned by [`store_open`]
/// * `name` - Collection name
/// * `filter_json` - Equality filter
///
/// # Returns
///
/// `Ok` with `{"deletedCount": n}`; a miss is `0` and the file is not rewritten.
///
/// # Safety
///
/// Every pointer must be null or valid for the duration of the call. The
/// returned string must be released with [`free_response`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn collection_delete_one(
    store: *mut DocumentStore,
    name: *const c_char,
    filter_json: *const c_char,
) -> *const c_char {
    let response = with_collection(store, name, "collection_delete_one", |collection| {
        let filter = Filter::from_json(&parse_json_arg(filter_json, "filter")?)?;
        ok_json(&collection.delete_one(&filter)?)
    });
    response_to_c_string(&response)
}

/// Frees a string returned by any function of this library.
///
/// # Parameters
///
/// * `ptr` - A response pointer, or null (ignored)
///
/// # Safety
///
/// `ptr` must come from this library and must not be freed twice.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr as *mut c_char));
    }
}

fn null_store(caller: &str) -> AppResponse {
    AppResponse::BadRequest(format!("Null store pointer passed to {caller}"))
}

/// Resolves the store and collection arguments shared by every collection
/// call, then runs `op` and folds its result into a single response.
fn with_collection<F>(
    store: *mut DocumentStore,
    name: *const c_char,
    caller: &str,
    op: F,
) -> AppResponse
where
    F: FnOnce(&Collection<'_>) -> StoreResult<AppResponse>,
{
    let store = match unsafe { store.as_ref() } {
        Some(s) => s,
        None => return null_store(caller),
    };

    let result = c_ptr_to_string(name, "collection name")
        .and_then(|name| store.collection(&name).and_then(|collection| op(&collection)));

    result.unwrap_or_else(|e| e)
}

fn ok_json<T: Serialize + ?Sized>(value: &T) -> StoreResult<AppResponse> {
    Ok(AppResponse::Ok(serde_json::to_string(value)?))
}

fn parse_json_arg(ptr: *const c_char, field_name: &str) -> StoreResult<Value> {
    let raw = c_ptr_to_string(ptr, field_name)?;
    serde_json::from_str(&raw).map_err(|e| {
        AppResponse::SerializationError(format!("Invalid JSON in {field_name}: {e}"))
    })
}

/// Serializes `response` into a caller-owned C string; null if that fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> StoreResult<String> {
    if ptr.is_null() {
        return Err(AppResponse::BadRequest(format!("Null {field_name} pointer")));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => Err(AppResponse::BadRequest(format!(
            "Invalid UTF-8 in {field_name}: {e}"
        ))),
    }
}
