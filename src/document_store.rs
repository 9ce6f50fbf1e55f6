use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::app_response::{AppResponse, StoreResult};
use crate::collection::Collection;
use crate::collection_file;
use crate::collection_schema::CollectionKind;
use crate::config::StoreConfig;
use crate::retry::RetryPolicy;

const FILE_EXTENSION: &str = "json";

/// Root handle over a directory of collection files.
///
/// Holds no document data; each [`Collection`] operation goes to disk.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    config: StoreConfig,
}

impl DocumentStore {
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        fs::create_dir_all(&config.data_dir).map_err(|e| {
            warn!("Cannot create data directory {}: {e}", config.data_dir.display());
            AppResponse::from(e)
        })?;

        info!("Opened document store at {}", config.data_dir.display());
        Ok(Self { config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        self.config.retry_policy()
    }

    pub fn collection_path(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(format!("{name}.{FILE_EXTENSION}"))
    }

    /// Handle on `name`; the file is created on first use, not here.
    pub fn collection(&self, name: &str) -> StoreResult<Collection<'_>> {
        validate_collection_name(name)?;
        Ok(Collection::new(
            self,
            CollectionKind::from_name(name),
            self.collection_path(name),
        ))
    }

    /// Makes sure every well-known collection has its file.
    pub fn connect(&self) -> StoreResult<()> {
        for name in CollectionKind::WELL_KNOWN {
            collection_file::ensure_file(&self.collection_path(name))?;
        }
        info!("Connected to JSON database at {}", self.config.data_dir.display());
        Ok(())
    }

    /// There is no connection to release; kept so callers can shut down
    /// symmetrically.
    pub fn close(self) {
        info!("Closed document store at {}", self.config.data_dir.display());
    }
}

fn validate_collection_name(name: &str) -> StoreResult<()> {
    if name.trim().is_empty() {
        return Err(AppResponse::BadRequest("Collection name is empty".to_string()));
    }
    if name.starts_with('.') || name.contains("..") || name.contains(['/', '\\', '\0']) {
        return Err(AppResponse::BadRequest(format!(
            "Invalid collection name '{name}'"
        )));
    }
    Ok(())
}
