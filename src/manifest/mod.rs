//! Release manifest model.
//!
//! A release manifest is a JSON document published next to the update
//! artifacts. It comes in two shapes:
//!
//! ```json
//! { "version": "2.0.0", "url": "https://x/app.apk", "hash": "9f86d0..." }
//! ```
//!
//! ```json
//! [
//!   { "version": "1.1.0", "url": "https://x/app-1.1.0.zip", "hash": "...",
//!     "name": "app-1.1.0.zip", "pubTime": "2024-03-01T10:00:00" },
//!   { "version": "1.2.0", "url": "https://x/app-1.2.0.zip", "hash": "...",
//!     "name": "app-1.2.0.zip", "pubTime": "2024-05-12T08:30:00Z" }
//! ]
//! ```
//!
//! Keys are camelCase; the PascalCase spellings produced by .NET serialisers
//! (`Version`, `Url`, `Hash`, `Name`, `PubTime`) are accepted as well.
//!
//! # Publish Time Formats
//!
//! `pubTime` may be an RFC 3339 timestamp, a naive ISO-8601 date-time
//! (interpreted as UTC), `YYYY-MM-DD HH:MM:SS`, or an integer number of Unix
//! seconds.
//!
//! Declaration order carries no meaning. [`ManifestDocument::into_sorted_entries`]
//! orders entries by publish time so that the last entry is the latest release.

use crate::version::{ReleaseVersion, VersionParseError};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Ways a manifest document can be unusable.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The bytes are not valid JSON of either accepted shape.
    #[error("malformed manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is `null`.
    #[error("manifest is null")]
    Null,

    /// The document is an empty array.
    #[error("manifest lists no releases")]
    Empty,

    /// An entry has a version that is not a dotted version number.
    #[error("entry {index} has an invalid version: {source}")]
    InvalidVersion {
        /// Position of the entry in the document
        index: usize,
        /// Parse failure
        #[source]
        source: VersionParseError,
    },

    /// An entry has no download URL.
    #[error("entry {index} ({version}) has no download url")]
    MissingUrl {
        /// Position of the entry in the document
        index: usize,
        /// Version of the entry
        version: String,
    },
}

/// Raw entry exactly as it appears in the JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(alias = "Version")]
    version: String,
    #[serde(alias = "Url", default)]
    url: String,
    #[serde(alias = "Hash", default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(alias = "Name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(
        alias = "PubTime",
        default,
        deserialize_with = "deserialize_pub_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub_time: Option<DateTime<Utc>>,
}

/// Either accepted top-level shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDocument {
    Many(Vec<RawEntry>),
    Single(RawEntry),
}

/// One release listed by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseManifestEntry {
    /// Parsed release version
    pub version: ReleaseVersion,
    /// Where to download the artifact
    pub url: String,
    /// Expected content digest; `None` when the manifest omits it or leaves it blank
    pub hash: Option<String>,
    /// Artifact display/file name
    pub name: Option<String>,
    /// When the release was published
    pub pub_time: Option<DateTime<Utc>>,
}

impl ReleaseManifestEntry {
    /// Create an entry with only the required fields.
    #[must_use]
    pub fn new(version: ReleaseVersion, url: impl Into<String>) -> Self {
        Self {
            version,
            url: url.into(),
            hash: None,
            name: None,
            pub_time: None,
        }
    }

    /// Set the expected digest.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Set the artifact name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the publish time.
    #[must_use]
    pub const fn with_pub_time(mut self, pub_time: DateTime<Utc>) -> Self {
        self.pub_time = Some(pub_time);
        self
    }

    /// File name to store the artifact under.
    ///
    /// Uses the last path component of `name`, falling back to the last
    /// segment of the URL (query string removed). Returns `None` when neither
    /// yields a usable name.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        let from_name = self.name.as_deref().and_then(last_component);
        let from_url = || {
            let path = self.url.split(['?', '#']).next().unwrap_or_default();
            last_component(path)
        };
        from_name.or_else(from_url)
    }

    /// Publication order: publish time first (missing times sort first), then version.
    #[must_use]
    pub fn publication_order(&self, other: &Self) -> Ordering {
        self.pub_time.cmp(&other.pub_time).then_with(|| self.version.cmp(&other.version))
    }
}

fn last_component(path: &str) -> Option<String> {
    path.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(ToString::to_string)
}

/// A parsed manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDocument {
    entries: Vec<ReleaseManifestEntry>,
}

impl ManifestDocument {
    /// Parse a manifest from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// See [`ManifestError`]. A blank `hash` is treated as absent rather than
    /// as an error.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        let raw: Option<RawDocument> = serde_json::from_slice(bytes)?;
        let raw_entries = match raw {
            None => return Err(ManifestError::Null),
            Some(RawDocument::Single(entry)) => vec![entry],
            Some(RawDocument::Many(entries)) => entries,
        };
        if raw_entries.is_empty() {
            return Err(ManifestError::Empty);
        }

        let entries = raw_entries
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let version = ReleaseVersion::parse(&raw.version)
                    .map_err(|source| ManifestError::InvalidVersion {
                        index,
                        source,
                    })?;
                if raw.url.trim().is_empty() {
                    return Err(ManifestError::MissingUrl {
                        index,
                        version: raw.version,
                    });
                }
                Ok(ReleaseManifestEntry {
                    version,
                    url: raw.url.trim().to_string(),
                    hash: raw.hash.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()),
                    name: raw.name.filter(|n| !n.trim().is_empty()),
                    pub_time: raw.pub_time,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entries,
        })
    }

    /// Entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[ReleaseManifestEntry] {
        &self.entries
    }

    /// Entries sorted oldest to newest by [`ReleaseManifestEntry::publication_order`].
    ///
    /// The sort is stable, so fully tied entries keep declaration order.
    #[must_use]
    pub fn into_sorted_entries(self) -> Vec<ReleaseManifestEntry> {
        let mut entries = self.entries;
        entries.sort_by(ReleaseManifestEntry::publication_order);
        entries
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPubTime {
    Seconds(i64),
    Text(String),
}

fn deserialize_pub_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawPubTime> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(RawPubTime::Seconds(secs)) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("pubTime {secs} is out of range"))),
        Some(RawPubTime::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawPubTime::Text(text)) => parse_pub_time(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised pubTime '{text}'"))),
    }
}

/// Parse the textual `pubTime` formats accepted in manifests.
#[must_use]
pub fn parse_pub_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn version(s: &str) -> ReleaseVersion {
        ReleaseVersion::parse(s).unwrap()
    }

    #[test]
    fn test_single_object_shape() {
        let doc = ManifestDocument::from_slice(
            br#"{"version":"2.0.0","url":"https://x/app.apk","hash":"ABCD"}"#,
        )
        .unwrap();
        assert_eq!(doc.entries().len(), 1);
        let entry = &doc.entries()[0];
        assert_eq!(entry.version, version("2.0.0"));
        assert_eq!(entry.url, "https://x/app.apk");
        assert_eq!(entry.hash.as_deref(), Some("ABCD"));
        assert_eq!(entry.pub_time, None);
    }

    #[test]
    fn test_array_shape_with_pub_times() {
        let doc = ManifestDocument::from_slice(
            br#"[
                {"version":"1.1.0","url":"https://x/a.zip","hash":"aa","name":"a.zip","pubTime":"2024-03-01T10:00:00"},
                {"version":"1.2.0","url":"https://x/b.zip","hash":"bb","name":"b.zip","pubTime":"2024-05-12T08:30:00Z"}
            ]"#,
        )
        .unwrap();
        assert_eq!(doc.entries().len(), 2);
        assert_eq!(
            doc.entries()[0].pub_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(doc.entries()[1].name.as_deref(), Some("b.zip"));
    }

    #[test]
    fn test_pascal_case_keys() {
        let doc = ManifestDocument::from_slice(
            br#"[{"Version":"3.0.1","Url":"https://x/c.zip","Hash":"cc","Name":"c.zip","PubTime":"2023-12-24 18:00:00"}]"#,
        )
        .unwrap();
        let entry = &doc.entries()[0];
        assert_eq!(entry.version, version("3.0.1"));
        assert_eq!(entry.hash.as_deref(), Some("cc"));
        assert_eq!(entry.pub_time, Some(Utc.with_ymd_and_hms(2023, 12, 24, 18, 0, 0).unwrap()));
    }

    #[test]
    fn test_unix_seconds_pub_time() {
        let doc = ManifestDocument::from_slice(
            br#"[{"version":"1.0.0","url":"https://x/a","pubTime":1700000000}]"#,
        )
        .unwrap();
        assert_eq!(doc.entries()[0].pub_time, Utc.timestamp_opt(1_700_000_000, 0).single());
    }

    #[test]
    fn test_null_and_empty_documents_are_rejected() {
        assert!(matches!(ManifestDocument::from_slice(b"null"), Err(ManifestError::Null)));
        assert!(matches!(ManifestDocument::from_slice(b"[]"), Err(ManifestError::Empty)));
        assert!(matches!(ManifestDocument::from_slice(b"{not json"), Err(ManifestError::Json(_))));
        assert!(matches!(ManifestDocument::from_slice(b"42"), Err(ManifestError::Json(_))));
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let result = ManifestDocument::from_slice(
            br#"[{"version":"1.0.0","url":"u"},{"version":"one.two","url":"u"}]"#,
        );
        assert!(matches!(result, Err(ManifestError::InvalidVersion { index: 1, .. })));
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let result = ManifestDocument::from_slice(br#"{"version":"1.0.0"}"#);
        assert!(matches!(result, Err(ManifestError::MissingUrl { index: 0, .. })));
    }

    #[test]
    fn test_blank_hash_is_absent() {
        let doc =
            ManifestDocument::from_slice(br#"{"version":"1.0.0","url":"u","hash":"  "}"#).unwrap();
        assert_eq!(doc.entries()[0].hash, None);
    }

    #[test]
    fn test_sorted_by_pub_time_not_declaration_order() {
        let doc = ManifestDocument::from_slice(
            br#"[
                {"version":"3.0.0","url":"u3","pubTime":"2024-06-01T00:00:00Z"},
                {"version":"1.0.0","url":"u1","pubTime":"2024-01-01T00:00:00Z"},
                {"version":"2.0.0","url":"u2","pubTime":"2024-03-01T00:00:00Z"}
            ]"#,
        )
        .unwrap();
        let sorted = doc.into_sorted_entries();
        let versions: Vec<String> = sorted.iter().map(|e| e.version.to_string()).collect();
        assert_eq!(versions, ["1.0.0", "2.0.0", "3.0.0"]);
    }

    #[test]
    fn test_missing_pub_time_sorts_first() {
        let doc = ManifestDocument::from_slice(
            br#"[
                {"version":"9.0.0","url":"u9"},
                {"version":"1.0.0","url":"u1","pubTime":"2024-01-01T00:00:00Z"}
            ]"#,
        )
        .unwrap();
        let sorted = doc.into_sorted_entries();
        assert_eq!(sorted.last().unwrap().version, version("1.0.0"));
    }

    #[test]
    fn test_equal_pub_times_fall_back_to_version() {
        let doc = ManifestDocument::from_slice(
            br#"[
                {"version":"1.10.0","url":"a","pubTime":"2024-01-01T00:00:00Z"},
                {"version":"1.9.0","url":"b","pubTime":"2024-01-01T00:00:00Z"}
            ]"#,
        )
        .unwrap();
        let sorted = doc.into_sorted_entries();
        assert_eq!(sorted.last().unwrap().version, version("1.10.0"));
    }

    #[test]
    fn test_file_name_resolution() {
        let entry = ReleaseManifestEntry::new(version("1.0.0"), "https://x/dl/app-1.0.0.zip?sig=abc");
        assert_eq!(entry.file_name().as_deref(), Some("app-1.0.0.zip"));

        let named = entry.clone().with_name("nested/dir/renamed.zip");
        assert_eq!(named.file_name().as_deref(), Some("renamed.zip"));

        let hostile = ReleaseManifestEntry::new(version("1.0.0"), "https://x/").with_name("..");
        assert_eq!(hostile.file_name(), None);
    }

    #[test]
    fn test_parse_pub_time_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(parse_pub_time("2024-02-03T04:05:06Z"), Some(expected));
        assert_eq!(parse_pub_time("2024-02-03T05:05:06+01:00"), Some(expected));
        assert_eq!(parse_pub_time("2024-02-03T04:05:06"), Some(expected));
        assert_eq!(parse_pub_time("2024-02-03 04:05:06"), Some(expected));
        assert_eq!(parse_pub_time("yesterday"), None);
    }
}
