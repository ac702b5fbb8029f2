//! Cache-aside configuration manager
//!
//! `ConfigurationManager` answers a configuration request from the disk cache
//! when a fresh record exists and otherwise fetches it remotely, storing the
//! result for later requests.
//!
//! There is no coordination between concurrent requests: two callers asking
//! for the same uncached id both fetch, and the last write wins.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cache::RecordStore;
use crate::configuration::ConfigurationRecord;
use crate::fetch::{FetchFailure, FetchRequest, RemoteFetch};
use crate::request::ConfigurationRequest;

/// Obtains configurations from the disk cache or the remote service
#[derive(Clone)]
pub struct ConfigurationManager {
    /// Remote fetch capability used on cache misses
    fetcher: Arc<dyn RemoteFetch>,
    /// Disk cache for obtained configurations
    store: RecordStore,
}

impl fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ConfigurationManager {
    pub fn new(fetcher: Arc<dyn RemoteFetch>, store: RecordStore) -> Self {
        Self { fetcher, store }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Obtains the configuration for `request`
    ///
    /// # Arguments
    /// * `request` - Which configuration to obtain
    /// * `use_cache` - Whether a fresh cached record may be returned
    ///
    /// # Returns
    /// * `Ok(ConfigurationRecord)` from cache or from the server
    /// * `Err(FetchFailure)` if the remote fetch failed
    ///
    /// # Behavior
    /// - With `use_cache`, a cached record that has not expired is returned
    ///   without contacting the server
    /// - Otherwise the server is asked and a successful response is cached
    /// - Failing to write the cache never fails the request
    /// - A failed fetch leaves the cache untouched and is not replaced by stale data
    pub async fn obtain(
        &self,
        request: &ConfigurationRequest,
        use_cache: bool,
    ) -> Result<ConfigurationRecord, FetchFailure> {
        let id = request.cache_id();
        let target = self.fetcher.target(request);
        debug!(%id, %target, use_cache, "obtaining configuration");

        if use_cache {
            if let Some(record) = self.cached(&id) {
                debug!(%id, "serving cached configuration");
                return Ok(record);
            }
        }

        let fetch = FetchRequest {
            id: id.clone(),
            target,
            params: request.query_params().cloned().unwrap_or_default(),
        };

        match self.fetcher.fetch(fetch).await {
            Ok(response) => {
                if response.is_none() {
                    warn!(%id, "server returned no JSON document, using an empty configuration");
                }
                let record = ConfigurationRecord::from_response(id, response);
                if let Err(e) = self.store.write(&record) {
                    error!(id = %record.id(), error = %e, "cannot cache configuration");
                }
                Ok(record)
            }
            Err(failure) => {
                warn!(%id, status = failure.status, error = %failure.error, "cannot obtain configuration from server");
                Err(failure)
            }
        }
    }

    /// Obtains a configuration in the background and reports it through callbacks
    ///
    /// Exactly one of `on_success` and `on_failure` is invoked, once, on a
    /// runtime worker rather than the calling thread. Must be called from
    /// within a tokio runtime.
    pub fn obtain_with<S, F>(
        &self,
        request: ConfigurationRequest,
        use_cache: bool,
        on_success: S,
        on_failure: F,
    ) -> JoinHandle<()>
    where
        S: FnOnce(ConfigurationRecord) + Send + 'static,
        F: FnOnce(FetchFailure) + Send + 'static,
    {
        let manager = self.clone();
        tokio::spawn(async move {
            match manager.obtain(&request, use_cache).await {
                Ok(record) => on_success(record),
                Err(failure) => on_failure(failure),
            }
        })
    }

    /// Returns the cached record for `id` if it exists and has not expired
    fn cached(&self, id: &str) -> Option<ConfigurationRecord> {
        if self.store.is_expired(id) {
            debug!(id, "cached configuration expired");
            return None;
        }
        self.store.read(id)
    }
}
