//! Command-line interface parsing for the liveupdate client
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! validated `Settings`: the service endpoint, cache location and the
//! configuration request to send.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

use crate::configuration::ConfigurationRecord;
use crate::request::{ConfigurationRequest, ObtainOptions, RequestError};

/// Path segments between the server URL and the application id
const SERVICE_PATH: [&str; 2] = ["mfpliveupdate", "v1"];

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The server URL cannot be parsed or is not http(s)
    #[error("Invalid server URL: '{0}'")]
    InvalidServerUrl(String),

    /// The application id is empty
    #[error("Invalid application id: must not be empty")]
    EmptyAppId,

    /// A `--param` argument is not of the form KEY=VALUE
    #[error("Invalid parameter: '{0}'. Expected KEY=VALUE")]
    InvalidParam(String),

    /// The segment id is empty
    #[error("Invalid segment: must not be empty")]
    EmptySegment,

    /// The `--request` JSON cannot be used
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),
}

/// liveupdate - obtain feature flags and properties from a live update service
#[derive(Parser, Debug)]
#[command(name = "liveupdate")]
#[command(about = "Obtain live update configurations with a local disk cache")]
#[command(version)]
pub struct Cli {
    /// Server URL, e.g. https://example.com/mfp
    #[arg(long, value_name = "URL")]
    pub server: String,

    /// Application id the configuration belongs to
    #[arg(long, value_name = "ID")]
    pub app_id: String,

    /// Obtain the configuration of a single segment
    #[arg(long, value_name = "SEGMENT", conflicts_with_all = ["params", "request"])]
    pub segment: Option<String>,

    /// Obtain the configuration matching a parameter (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", conflicts_with = "request")]
    pub params: Vec<String>,

    /// Request as JSON, e.g. '{"segmentId": "vip", "useClientCache": false}'
    #[arg(long, value_name = "JSON")]
    pub request: Option<String>,

    /// Always ask the server, ignoring any cached configuration
    #[arg(long)]
    pub no_cache: bool,

    /// Cache root directory (defaults to the platform cache directory)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Bearer token sent with the request
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Print whether a feature is enabled (repeatable)
    #[arg(long = "feature", value_name = "ID")]
    pub features: Vec<String>,

    /// Print the value of a property (repeatable)
    #[arg(long = "property", value_name = "ID")]
    pub properties: Vec<String>,

    /// Print every feature and property of the configuration
    #[arg(long, conflicts_with_all = ["features", "properties"])]
    pub list: bool,
}

/// Validated settings derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Settings {
    /// Configuration endpoint of the application
    pub service_url: Url,
    /// Cache root override
    pub cache_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub token: Option<String>,
    pub request: ConfigurationRequest,
    pub use_cache: bool,
    /// Features to report instead of printing the whole configuration
    pub features: Vec<String>,
    /// Properties to report instead of printing the whole configuration
    pub properties: Vec<String>,
    /// Report every feature and property
    pub list: bool,
}

/// Builds the configuration endpoint `<server>/mfpliveupdate/v1/<app_id>/configuration`
pub fn service_url(server: &str, app_id: &str) -> Result<Url, CliError> {
    if app_id.is_empty() {
        return Err(CliError::EmptyAppId);
    }

    let invalid = || CliError::InvalidServerUrl(server.to_string());
    let mut url = Url::parse(server).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }

    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(SERVICE_PATH)
        .push(app_id)
        .push("configuration");
    Ok(url)
}

/// Parses a `KEY=VALUE` argument; the value may be empty or contain `=`
pub fn parse_param_arg(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidParam(s.to_string())),
    }
}

impl Settings {
    /// Creates Settings from parsed CLI arguments.
    ///
    /// The request is taken from `--request`, `--segment` or `--param`, in that
    /// order; without any of them every segment's configuration is requested.
    /// `--no-cache` overrides `useClientCache` in a JSON request.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let service_url = service_url(&cli.server, &cli.app_id)?;

        let (request, use_cache) = match (&cli.request, &cli.segment) {
            (Some(json), _) => {
                let options = ObtainOptions::from_json(json)?;
                (options.request, options.use_cache && !cli.no_cache)
            }
            (None, Some(segment)) if segment.is_empty() => return Err(CliError::EmptySegment),
            (None, Some(segment)) => (ConfigurationRequest::segment(segment.as_str()), !cli.no_cache),
            (None, None) if !cli.params.is_empty() => {
                let params = cli
                    .params
                    .iter()
                    .map(|param| parse_param_arg(param))
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                (ConfigurationRequest::Params(params), !cli.no_cache)
            }
            (None, None) => (ConfigurationRequest::all(), !cli.no_cache),
        };

        Ok(Settings {
            service_url,
            cache_dir: cli.cache_dir.clone(),
            timeout: Duration::from_secs(cli.timeout_secs),
            token: cli.token.clone(),
            request,
            use_cache,
            features: cli.features.clone(),
            properties: cli.properties.clone(),
            list: cli.list,
        })
    }
}

/// Renders an obtained configuration for the terminal
///
/// With `list` every well-formed feature and property is printed, one
/// `feature <id>: <value>` or `property <id>: <value>` line each. Without
/// requested features or properties the `data` section is printed as pretty
/// JSON. Otherwise one line is printed per request, with `absent` for unknown ids.
pub fn render_record(
    record: &ConfigurationRecord,
    list: bool,
    features: &[String],
    properties: &[String],
) -> Result<String, serde_json::Error> {
    if list {
        let features = record
            .features()
            .map(|(feature, enabled)| format!("feature {}: {}", feature, enabled));
        let properties = record
            .properties()
            .map(|(property, value)| format!("property {}: {}", property, value));
        return Ok(features.chain(properties).collect::<Vec<_>>().join("\n"));
    }

    if features.is_empty() && properties.is_empty() {
        return serde_json::to_string_pretty(record.data().unwrap_or(&Value::Null));
    }

    let mut lines = Vec::with_capacity(features.len() + properties.len());
    for feature in features {
        let value = match record.is_feature_enabled(feature) {
            Some(enabled) => enabled.to_string(),
            None => "absent".to_string(),
        };
        lines.push(format!("feature {}: {}", feature, value));
    }
    for property in properties {
        let value = record.property(property).unwrap_or("absent");
        lines.push(format!("property {}: {}", property, value));
    }
    Ok(lines.join("\n"))
}
