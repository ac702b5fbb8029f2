//! liveupdate client library
//!
//! Obtains configurations (feature flags and properties) from a live update
//! service, caching them on disk until the server-provided expiration date.

pub mod cache;
pub mod cli;
pub mod configuration;
pub mod fetch;
pub mod manager;
pub mod request;

pub use configuration::ConfigurationRecord;
pub use fetch::{FailureBody, FetchFailure, FetchRequest, HttpFetcher, RemoteFetch};
pub use manager::ConfigurationManager;
pub use request::{ConfigurationRequest, ObtainOptions};
