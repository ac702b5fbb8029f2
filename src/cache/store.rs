//! Persistent store for configuration records
//!
//! Each record is split into two files under `<root>/liveupdate/cache/<id>/`:
//! `configuration.json` with the full payload and `metadata.json` with only the
//! expiration date.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde_json::Value;
use tracing::debug;

use super::expiration::{ExpirationPolicy, Metadata};
use super::file::{CacheError, JsonFile, Projection};
use crate::configuration::ConfigurationRecord;

/// Namespace below the cache root
const NAMESPACE: &str = "liveupdate/cache";

/// File holding the full configuration payload
const CONFIGURATION_FILE: &str = "configuration.json";

/// File holding the expiration record
const METADATA_FILE: &str = "metadata.json";

impl Projection for Value {
    fn project(record: &ConfigurationRecord) -> Option<Self> {
        Some(record.payload().clone())
    }
}

/// Reads and writes cached configuration records
#[derive(Debug, Clone)]
pub struct RecordStore {
    /// Namespace directory holding one subdirectory per id
    root: PathBuf,
    configuration: JsonFile<Value>,
    metadata: JsonFile<Metadata>,
    expiration: ExpirationPolicy,
}

impl RecordStore {
    /// Creates a store in the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/liveupdate/` on Linux, or the platform equivalent.
    /// Returns `None` if the cache directory cannot be determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "liveupdate")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a store below a custom cache root
    pub fn with_dir(cache_root: PathBuf) -> Self {
        let root = cache_root.join(NAMESPACE);
        let metadata = JsonFile::new(root.clone(), METADATA_FILE);
        Self {
            configuration: JsonFile::new(root.clone(), CONFIGURATION_FILE),
            expiration: ExpirationPolicy::new(metadata.clone()),
            metadata,
            root,
        }
    }

    /// Returns the namespace directory holding all cached ids
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Returns the directory used for `id`
    pub fn folder(&self, id: &str) -> PathBuf {
        self.configuration.folder(id)
    }

    /// Checks whether the record cached under `id` has expired
    pub fn is_expired(&self, id: &str) -> bool {
        self.expiration.is_expired(id)
    }

    /// Reads the record cached under `id`
    ///
    /// Returns `None` if nothing is cached or the payload cannot be parsed.
    pub fn read(&self, id: &str) -> Option<ConfigurationRecord> {
        let payload = self.configuration.read(id)?;
        debug!(id, "read cached configuration");
        Some(ConfigurationRecord::new(id, payload))
    }

    /// Writes `record`, replacing whatever was cached under its id
    ///
    /// The old expiration record is removed before the payload is replaced, so
    /// a concurrent reader sees the entry as expired until the new expiration
    /// record lands. A payload without `expiresAt` is stored with no expiration
    /// record and therefore always reads as expired.
    pub fn write(&self, record: &ConfigurationRecord) -> Result<(), CacheError> {
        let id = record.id();
        self.metadata.remove(id)?;
        self.configuration.write(record)?;
        if !self.metadata.write(record)? {
            debug!(id, "configuration has no expiresAt, cached without expiration");
        }
        Ok(())
    }

    /// Removes everything cached under `id`
    pub fn clear(&self, id: &str) -> Result<(), CacheError> {
        let folder = self.folder(id);
        match fs::remove_dir_all(&folder) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                path: folder,
                source,
            }),
        }
    }
}
