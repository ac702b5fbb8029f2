//! JSON files stored per configuration id
//!
//! Every cached configuration owns a directory under the cache namespace. A
//! `JsonFile<P>` is one named file inside those directories holding the
//! projection `P` of a record.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::configuration::ConfigurationRecord;

/// Disambiguates temporary files written concurrently by the same process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors that can occur when writing to the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Creating, writing, renaming or removing a cache file failed
    #[error("Cache I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The projection could not be serialized
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The part of a configuration record persisted in one cache file
pub trait Projection: Serialize + DeserializeOwned + Sized {
    /// Extracts the persisted shape, or `None` if the record has nothing to store
    fn project(record: &ConfigurationRecord) -> Option<Self>;
}

/// A named JSON file inside each configuration's cache directory
#[derive(Debug)]
pub struct JsonFile<P> {
    /// Namespace directory holding one subdirectory per id
    root: PathBuf,
    /// File name inside the id directory
    name: &'static str,
    _shape: PhantomData<fn() -> P>,
}

impl<P> Clone for JsonFile<P> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            name: self.name,
            _shape: PhantomData,
        }
    }
}

impl<P: Projection> JsonFile<P> {
    pub fn new(root: PathBuf, name: &'static str) -> Self {
        Self {
            root,
            name,
            _shape: PhantomData,
        }
    }

    /// Returns the directory holding every file for `id`
    pub fn folder(&self, id: &str) -> PathBuf {
        self.root.join(dir_name(id))
    }

    /// Returns the path of this file for `id`
    pub fn path(&self, id: &str) -> PathBuf {
        self.folder(id).join(self.name)
    }

    /// Reads and parses the file for `id`
    ///
    /// Returns `None` if the file doesn't exist or cannot be parsed. Both cases
    /// are cache misses, so they are only logged at debug level.
    pub fn read(&self, id: &str) -> Option<P> {
        let path = self.path(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %path.display(), "cache file not found");
                return None;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot read cache file");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot parse cache file");
                None
            }
        }
    }

    /// Writes the projection of `record`, replacing any previous content
    ///
    /// # Returns
    /// * `Ok(true)` if the projection was written
    /// * `Ok(false)` if the record has nothing to persist for this file
    /// * `Err` if directory creation, writing or renaming fails
    pub fn write(&self, record: &ConfigurationRecord) -> Result<bool, CacheError> {
        let Some(projection) = P::project(record) else {
            return Ok(false);
        };

        let folder = self.folder(record.id());
        fs::create_dir_all(&folder).map_err(|e| CacheError::io(&folder, e))?;

        let json = serde_json::to_string(&projection)?;
        let path = folder.join(self.name);
        let temp = folder.join(format!(
            ".{}.{}.{}.tmp",
            self.name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        replace_file(&temp, &path, &json)?;

        trace!(path = %path.display(), "cache file written");
        Ok(true)
    }

    /// Deletes the file for `id`; a missing file is not an error
    pub fn remove(&self, id: &str) -> Result<(), CacheError> {
        let path = self.path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }
}

/// Writes `contents` to `temp`, then renames it over `path`
///
/// Readers see either the previous file or the complete new one. The
/// temporary file is removed whenever either step fails.
fn replace_file(temp: &Path, path: &Path, contents: &str) -> Result<(), CacheError> {
    let result = fs::write(temp, contents)
        .map_err(|e| CacheError::io(temp, e))
        .and_then(|()| fs::rename(temp, path).map_err(|e| CacheError::io(path, e)));
    if result.is_err() {
        let _ = fs::remove_file(temp);
    }
    result
}

/// Maps a configuration id to a single, filesystem-safe directory name
///
/// Lowercase ASCII letters, digits, `-` and `_` are kept; every other byte,
/// uppercase letters included, becomes `%XX` so ids differing only in case
/// stay apart on case-insensitive filesystems.
/// The empty id maps to `%`, which no non-empty id can produce.
fn dir_name(id: &str) -> String {
    if id.is_empty() {
        return "%".to_string();
    }

    let mut name = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' || byte == b'_' {
            name.push(byte as char);
        } else {
            let _ = write!(name, "%{:02X}", byte);
        }
    }
    name
}
