//! Version wire model and the descriptor projection held for display.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One immutable version of a document, as reported by the service.
///
/// `version_number` is assigned by the server; the client only displays it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version_id: String,
    pub version_number: u64,
    /// `None` when the service omitted the time or sent one that doesn't parse.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub original_text: Option<String>,
}

impl Version {
    /// Version content; missing text reads as empty.
    pub fn text(&self) -> &str {
        self.original_text.as_deref().unwrap_or("")
    }

    pub fn descriptor(&self) -> VersionDescriptor {
        VersionDescriptor {
            version_id: self.version_id.clone(),
            version_number: self.version_number,
            display_time: match self.uploaded_at {
                Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                None => UNKNOWN_TIME.to_string(),
            },
        }
    }
}

/// Shown in place of an upload time the service didn't provide.
pub const UNKNOWN_TIME: &str = "unknown";

/// RFC 3339, or an offset-less timestamp taken as UTC. Null and unparseable
/// values become `None` so one bad field doesn't hide the version.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    match NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Ok(Some(naive.and_utc())),
        Err(e) => {
            tracing::warn!("Ignoring unparseable upload time {:?}: {}", raw, e);
            Ok(None)
        }
    }
}

/// Read-optimized view of the latest version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub version_id: String,
    pub version_number: u64,
    pub display_time: String,
}

impl std::fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Version {} • {}", self.version_number, self.display_time)
    }
}

/// `GET` path for the latest version of a document.
pub fn latest_version_path(document_id: &str) -> String {
    format!("/api/documents/{}/versions/latest", urlencoding::encode(document_id))
}

/// `POST` path that creates a new version of a document.
pub fn versions_path(document_id: &str) -> String {
    format!("/api/documents/{}/versions", urlencoding::encode(document_id))
}
