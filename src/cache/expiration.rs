//! Expiration checks for cached configurations
//!
//! The server stamps each configuration with an `expiresAt` HTTP date such as
//! `Tue, 15 Nov 1994 08:12:31 GMT`. Only that field is persisted in the small
//! metadata file so a freshness check never has to parse the full document.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::file::{JsonFile, Projection};
use crate::configuration::ConfigurationRecord;

/// Payload field holding the expiration date
pub const EXPIRES_AT_KEY: &str = "expiresAt";

/// Date and time part of `expiresAt`; the zone token follows it
const EXPIRES_AT_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";

/// `EXPIRES_AT_FORMAT` without the weekday, which is not checked when parsing
const STAMP_FORMAT: &str = "%d %b %Y %H:%M:%S";

/// Zone tokens interpreted as GMT
const GMT_ZONES: [&str; 4] = ["GMT", "UTC", "UT", "Z"];

/// Expiration record persisted next to each cached configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "expiresAt")]
    pub expires_at: String,
}

impl Projection for Metadata {
    fn project(record: &ConfigurationRecord) -> Option<Self> {
        let expires_at = record.payload().get(EXPIRES_AT_KEY)?.as_str()?;
        Some(Metadata {
            expires_at: expires_at.to_string(),
        })
    }
}

/// Decides whether a cached configuration is still fresh
///
/// Anything that prevents a reliable answer (no metadata file, unreadable
/// file, unparseable date) counts as expired, forcing a fetch.
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    metadata: JsonFile<Metadata>,
}

impl ExpirationPolicy {
    pub fn new(metadata: JsonFile<Metadata>) -> Self {
        Self { metadata }
    }

    /// Checks whether the configuration cached under `id` has expired
    pub fn is_expired(&self, id: &str) -> bool {
        self.is_expired_at(id, Utc::now())
    }

    /// Checks expiration against an explicit reference instant
    pub fn is_expired_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(metadata) = self.metadata.read(id) else {
            debug!(id, "no expiration record, treating as expired");
            return true;
        };

        match parse_expires_at(&metadata.expires_at) {
            Some(expires_at) => now > expires_at,
            None => {
                warn!(id, expires_at = %metadata.expires_at, "cannot parse expiresAt, treating as expired");
                true
            }
        }
    }

    /// Extracts the expiration record of `record`, if it carries an `expiresAt`
    pub fn record_for(record: &ConfigurationRecord) -> Option<Metadata> {
        Metadata::project(record)
    }
}

/// Parses an `expiresAt` value
///
/// The weekday is ignored, so a date whose weekday does not match still
/// parses. The zone may be `GMT`, `UTC`, `UT` or `Z`, optionally followed by
/// an offset (`GMT+02:00`), or a bare offset (`+0200`). Anything else is
/// accepted only when the whole value is valid RFC 2822.
pub fn parse_expires_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let (stamp, zone) = value.rsplit_once(' ')?;
    let stamp = match stamp.split_once(',') {
        Some((_weekday, rest)) => rest,
        None => stamp,
    };

    if let Some(offset) = zone_offset(zone) {
        let naive = NaiveDateTime::parse_from_str(stamp.trim(), STAMP_FORMAT).ok()?;
        return Some(naive.and_utc() - offset);
    }

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Offset east of GMT described by a zone token
fn zone_offset(zone: &str) -> Option<Duration> {
    if GMT_ZONES.contains(&zone) {
        return Some(Duration::zero());
    }

    let offset = ["GMT", "UTC"]
        .iter()
        .find_map(|prefix| zone.strip_prefix(prefix))
        .unwrap_or(zone);
    let (sign, digits) = match offset.as_bytes().first()? {
        b'+' => (1, &offset[1..]),
        b'-' => (-1, &offset[1..]),
        _ => return None,
    };

    if !digits.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }

    let (hours, minutes) = match digits.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    if hours.is_empty() || hours.len() > 2 || minutes.is_empty() || minutes.len() > 2 {
        return None;
    }

    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(Duration::minutes(sign * (hours * 60 + minutes)))
}

/// Formats an instant the way the server writes `expiresAt`
pub fn format_expires_at(instant: DateTime<Utc>) -> String {
    format!("{} GMT", instant.format(EXPIRES_AT_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_policy() -> (ExpirationPolicy, JsonFile<Metadata>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = JsonFile::new(temp_dir.path().to_path_buf(), "metadata.json");
        (ExpirationPolicy::new(file.clone()), file, temp_dir)
    }

    fn record_expiring(id: &str, expires_at: &str) -> ConfigurationRecord {
        ConfigurationRecord::new(id, json!({ "data": {}, "expiresAt": expires_at }))
    }

    #[test]
    fn test_parse_gmt_date() {
        let parsed = parse_expires_at("Tue, 15 Nov 1994 08:12:31 GMT").expect("Should parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_utc_alias() {
        let parsed = parse_expires_at("Tue, 15 Nov 1994 08:12:31 UTC").expect("Should parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_numeric_offset() {
        let parsed = parse_expires_at("Tue, 15 Nov 1994 10:12:31 +0200").expect("Should parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_ignores_weekday() {
        let parsed = parse_expires_at("Wed, 15 Nov 1994 08:12:31 GMT").expect("Should parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_gmt_with_offset() {
        let expected = Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap();
        assert_eq!(parse_expires_at("Tue, 15 Nov 1994 08:12:31 GMT+00:00"), Some(expected));
        assert_eq!(parse_expires_at("Tue, 15 Nov 1994 10:12:31 GMT+02:00"), Some(expected));
        assert_eq!(parse_expires_at("Tue, 15 Nov 1994 05:42:31 GMT-0230"), Some(expected));
        assert_eq!(parse_expires_at("Tue, 15 Nov 1994 10:12:31 UTC+2"), Some(expected));
    }

    #[test]
    fn test_parse_rejects_bad_offsets() {
        assert!(parse_expires_at("Tue, 15 Nov 1994 08:12:31 GMT+").is_none());
        assert!(parse_expires_at("Tue, 15 Nov 1994 08:12:31 GMT+25:00").is_none());
        assert!(parse_expires_at("Tue, 15 Nov 1994 08:12:31 GMT+02:60").is_none());
        assert!(parse_expires_at("Tue, 15 Nov 1994 08:12:31 GMT+0x:00").is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_expires_at("").is_none());
        assert!(parse_expires_at("tomorrow").is_none());
        assert!(parse_expires_at("2044-11-15T08:12:31Z").is_none());
        assert!(parse_expires_at("Tue, 45 Nov 1994 08:12:31 GMT").is_none());
    }

    #[test]
    fn test_format_matches_server_pattern() {
        let instant = Utc.with_ymd_and_hms(2024, 7, 5, 9, 3, 7).unwrap();
        assert_eq!(format_expires_at(instant), "Fri, 05 Jul 2024 09:03:07 GMT");
        assert_eq!(parse_expires_at(&format_expires_at(instant)), Some(instant));
    }

    #[test]
    fn test_record_for_extracts_expires_at() {
        let record = record_expiring("vip", "Tue, 15 Nov 1994 08:12:31 GMT");
        assert_eq!(
            ExpirationPolicy::record_for(&record),
            Some(Metadata {
                expires_at: "Tue, 15 Nov 1994 08:12:31 GMT".to_string()
            })
        );

        let without = ConfigurationRecord::new("vip", json!({ "data": {} }));
        assert_eq!(ExpirationPolicy::record_for(&without), None);
    }

    #[test]
    fn test_missing_metadata_is_expired() {
        let (policy, _file, _temp_dir) = create_test_policy();
        assert!(policy.is_expired("never-cached"));
    }

    #[test]
    fn test_future_expiration_is_fresh() {
        let (policy, file, _temp_dir) = create_test_policy();
        let expires_at = format_expires_at(Utc::now() + Duration::hours(1));
        file.write(&record_expiring("vip", &expires_at))
            .expect("Write should succeed");

        assert!(!policy.is_expired("vip"));
    }

    #[test]
    fn test_past_expiration_is_expired() {
        let (policy, file, _temp_dir) = create_test_policy();
        let expires_at = format_expires_at(Utc::now() - Duration::hours(1));
        file.write(&record_expiring("vip", &expires_at))
            .expect("Write should succeed");

        assert!(policy.is_expired("vip"));
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let (policy, file, _temp_dir) = create_test_policy();
        let instant = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        file.write(&record_expiring("vip", &format_expires_at(instant)))
            .expect("Write should succeed");

        assert!(!policy.is_expired_at("vip", instant));
        assert!(policy.is_expired_at("vip", instant + Duration::seconds(1)));
    }

    #[test]
    fn test_unparseable_metadata_is_expired() {
        let (policy, file, _temp_dir) = create_test_policy();
        file.write(&record_expiring("vip", "whenever"))
            .expect("Write should succeed");

        assert!(policy.is_expired("vip"));
    }

    #[test]
    fn test_metadata_without_field_is_expired() {
        let (policy, file, _temp_dir) = create_test_policy();
        let folder = file.folder("vip");
        fs::create_dir_all(&folder).expect("Should create folder");
        fs::write(folder.join("metadata.json"), "{}").expect("Should write file");

        assert!(policy.is_expired("vip"));
    }
}
