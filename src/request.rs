//! Request descriptors and their cache ids
//!
//! A configuration is requested for every segment at once, for one segment, or
//! for an arbitrary set of parameters the server matches against. The request
//! determines both the cache slot and the remote target.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Cache id used for the request without segment or parameters
pub const ALL_ID: &str = "all";

/// Errors for request input that cannot be turned into a `ConfigurationRequest`
#[derive(Debug, Error)]
pub enum RequestError {
    /// The input is not valid JSON
    #[error("Invalid JSON format for request: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The input is valid JSON but not an object
    #[error("Request must be a JSON object")]
    NotAnObject,

    /// A known field has the wrong type or an unusable value
    #[error("Invalid '{field}': expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// What configuration to obtain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigurationRequest {
    /// The configuration for all segments
    All,
    /// The configuration of a single segment
    Segment(String),
    /// The configuration matching a set of parameters
    Params(BTreeMap<String, String>),
}

impl ConfigurationRequest {
    pub fn all() -> Self {
        ConfigurationRequest::All
    }

    pub fn segment(segment_id: impl Into<String>) -> Self {
        ConfigurationRequest::Segment(segment_id.into())
    }

    pub fn params<K, V>(params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        ConfigurationRequest::Params(
            params
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Returns the parameters sent with the request, if any
    pub fn query_params(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ConfigurationRequest::Params(params) => Some(params),
            _ => None,
        }
    }

    /// Derives the cache id for this request
    ///
    /// Segments are used verbatim and `All` maps to `"all"`. Parameters are
    /// concatenated as `_<key><value>` in ascending key order, so the same set
    /// of parameters always lands in the same cache slot.
    pub fn cache_id(&self) -> String {
        match self {
            ConfigurationRequest::All => ALL_ID.to_string(),
            ConfigurationRequest::Segment(segment_id) => segment_id.clone(),
            ConfigurationRequest::Params(params) => {
                params
                    .iter()
                    .fold(String::new(), |mut id, (key, value)| {
                        id.push('_');
                        id.push_str(key);
                        id.push_str(value);
                        id
                    })
            }
        }
    }
}

/// A request together with its cache preference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObtainOptions {
    pub request: ConfigurationRequest,
    pub use_cache: bool,
}

impl ObtainOptions {
    /// Parses a JSON request such as `{"segmentId": "vip", "useClientCache": false}`
    ///
    /// Recognized fields:
    /// * `segmentId` - segment to obtain; takes precedence over `params`
    /// * `params` - object of parameters; values are converted to strings
    /// * `useClientCache` - defaults to `true`
    ///
    /// Without `segmentId` and `params` the request has an empty parameter set.
    pub fn from_json(input: &str) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_str(input)?;
        let object = value.as_object().ok_or(RequestError::NotAnObject)?;

        let use_cache = match object.get("useClientCache") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => {
                return Err(RequestError::InvalidField {
                    field: "useClientCache",
                    expected: "a boolean",
                })
            }
        };

        let request = match object.get("segmentId") {
            Some(Value::String(segment_id)) if !segment_id.is_empty() => {
                ConfigurationRequest::segment(segment_id.as_str())
            }
            None | Some(Value::Null) => ConfigurationRequest::Params(parse_params(object.get("params"))?),
            Some(_) => {
                return Err(RequestError::InvalidField {
                    field: "segmentId",
                    expected: "a non-empty string",
                })
            }
        };

        Ok(Self { request, use_cache })
    }
}

fn parse_params(value: Option<&Value>) -> Result<BTreeMap<String, String>, RequestError> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(params)) => Ok(params
            .iter()
            .map(|(key, value)| (key.clone(), param_value(value)))
            .collect()),
        Some(_) => Err(RequestError::InvalidField {
            field: "params",
            expected: "an object",
        }),
    }
}

/// Strings are kept as-is, null becomes empty and everything else its JSON text
fn param_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_id_for_all_and_segment() {
        assert_eq!(ConfigurationRequest::all().cache_id(), "all");
        assert_eq!(ConfigurationRequest::segment("vip").cache_id(), "vip");
    }

    #[test]
    fn test_cache_id_for_params_is_deterministic() {
        let first = ConfigurationRequest::params([("a", "1"), ("b", "2")]);
        let second = ConfigurationRequest::params([("b", "2"), ("a", "1")]);

        assert_eq!(first.cache_id(), "_a1_b2");
        assert_eq!(first.cache_id(), second.cache_id());
    }

    #[test]
    fn test_cache_id_for_empty_params() {
        let request = ConfigurationRequest::params(Vec::<(String, String)>::new());
        assert_eq!(request.cache_id(), "");
    }

    #[test]
    fn test_segment_and_params_do_not_collide() {
        let segment = ConfigurationRequest::segment("vip");
        let params = ConfigurationRequest::params([("tier", "vip")]);
        assert_ne!(segment.cache_id(), params.cache_id());
    }

    #[test]
    fn test_from_json_segment() {
        let options = ObtainOptions::from_json(r#"{"segmentId": "vip"}"#).unwrap();
        assert_eq!(options.request, ConfigurationRequest::segment("vip"));
        assert!(options.use_cache);
    }

    #[test]
    fn test_from_json_segment_wins_over_params() {
        let options =
            ObtainOptions::from_json(r#"{"segmentId": "vip", "params": {"a": "1"}, "useClientCache": false}"#)
                .unwrap();
        assert_eq!(options.request, ConfigurationRequest::segment("vip"));
        assert!(!options.use_cache);
    }

    #[test]
    fn test_from_json_params_are_stringified() {
        let options =
            ObtainOptions::from_json(r#"{"params": {"a": 2, "c": true, "d": null, "e": "x"}}"#).unwrap();
        assert_eq!(
            options.request,
            ConfigurationRequest::params([("a", "2"), ("c", "true"), ("d", ""), ("e", "x")])
        );
    }

    #[test]
    fn test_from_json_empty_object_is_empty_params() {
        let options = ObtainOptions::from_json("{}").unwrap();
        assert_eq!(options.request, ConfigurationRequest::Params(BTreeMap::new()));
        assert!(options.use_cache);
    }

    #[test]
    fn test_from_json_rejects_invalid_input() {
        assert!(matches!(
            ObtainOptions::from_json(""),
            Err(RequestError::InvalidJson(_))
        ));
        assert!(matches!(
            ObtainOptions::from_json("[1, 2]"),
            Err(RequestError::NotAnObject)
        ));
        assert!(matches!(
            ObtainOptions::from_json(r#"{"segmentId": 18}"#),
            Err(RequestError::InvalidField { field: "segmentId", .. })
        ));
        assert!(matches!(
            ObtainOptions::from_json(r#"{"segmentId": ""}"#),
            Err(RequestError::InvalidField { field: "segmentId", .. })
        ));
        assert!(matches!(
            ObtainOptions::from_json(r#"{"params": "a=1"}"#),
            Err(RequestError::InvalidField { field: "params", .. })
        ));
        assert!(matches!(
            ObtainOptions::from_json(r#"{"useClientCache": "yes"}"#),
            Err(RequestError::InvalidField { field: "useClientCache", .. })
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = ObtainOptions::from_json("[]").unwrap_err();
        assert!(err.to_string().contains("JSON object"));

        let err = ObtainOptions::from_json("nope").unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }
}
