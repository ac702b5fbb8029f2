//! Configuration records obtained from the live update service
//!
//! A `ConfigurationRecord` binds a cache id to the raw JSON document returned
//! by the server. Feature flags live under `data.features` and properties under
//! `data.properties`; lookups never fail, they return `None` for anything that
//! is missing or shaped unexpectedly.

use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

/// Root section holding features and properties
pub const DATA_KEY: &str = "data";

/// Section mapping feature ids to booleans
pub const FEATURES_KEY: &str = "features";

/// Section mapping property ids to strings
pub const PROPERTIES_KEY: &str = "properties";

/// An obtained configuration, either fresh from the server or read back from cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRecord {
    /// Cache id derived from the request
    id: String,
    /// Raw document as returned by the server
    payload: Value,
}

impl ConfigurationRecord {
    /// Creates a record bound to `id`
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Creates a record from a raw server response
    ///
    /// Anything but a JSON object yields an empty object, so every lookup on
    /// the result reports absent instead of the fetch being treated as failed.
    pub fn from_response(id: impl Into<String>, response: Option<Value>) -> Self {
        let payload = match response {
            Some(value @ Value::Object(_)) => value,
            _ => Value::Object(Map::new()),
        };
        Self::new(id, payload)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the `data` section, if present
    pub fn data(&self) -> Option<&Value> {
        self.payload.get(DATA_KEY)
    }

    /// Checks whether a feature is enabled
    ///
    /// # Returns
    /// * `Some(true)` / `Some(false)` for a known feature
    /// * `None` if the feature doesn't exist or the document has no boolean for it
    pub fn is_feature_enabled(&self, feature_id: &str) -> Option<bool> {
        let enabled = self.section(FEATURES_KEY)?.get(feature_id)?.as_bool();
        if enabled.is_none() {
            debug!(id = %self.id, feature_id, "feature value is not a boolean");
        }
        enabled
    }

    /// Returns the value of a property, or `None` if it doesn't exist
    pub fn property(&self, property_id: &str) -> Option<&str> {
        let value = self.section(PROPERTIES_KEY)?.get(property_id)?.as_str();
        if value.is_none() {
            debug!(id = %self.id, property_id, "property value is not a string");
        }
        value
    }

    /// Iterates over the well-formed feature flags
    pub fn features(&self) -> impl Iterator<Item = (&str, bool)> {
        self.section(FEATURES_KEY)
            .into_iter()
            .flatten()
            .filter_map(|(key, value)| value.as_bool().map(|enabled| (key.as_str(), enabled)))
    }

    /// Iterates over the well-formed properties
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.section(PROPERTIES_KEY)
            .into_iter()
            .flatten()
            .filter_map(|(key, value)| value.as_str().map(|text| (key.as_str(), text)))
    }

    fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.data()?.get(name)?.as_object()
    }
}

impl fmt::Display for ConfigurationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigurationRecord{{id={:?}, payload={}}}", self.id, self.payload)
    }
}
