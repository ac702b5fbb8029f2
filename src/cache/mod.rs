//! Cache module for storing obtained configurations on disk
//!
//! Configurations are cached per request id as two files: the full payload and
//! a small expiration record. A configuration is served from cache only while
//! its expiration record says it is fresh.

mod expiration;
mod file;
mod store;

pub use expiration::{format_expires_at, parse_expires_at, ExpirationPolicy, Metadata, EXPIRES_AT_KEY};
pub use file::{CacheError, JsonFile, Projection};
pub use store::RecordStore;
