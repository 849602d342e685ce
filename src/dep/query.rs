use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Request envelope for a blocking query: the version cursor, the wait
/// budget, and backend scoping.
///
/// A cursor of 0 means "unknown"; the backend answers immediately.
/// Any other cursor asks the backend to hold the connection open until
/// its data moves past that version or `wait_time` elapses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Opaque version cursor from the previous response (0 = none)
    pub wait_index: u64,

    /// Maximum time the backend may hold the connection open
    pub wait_time: Option<Duration>,

    /// Region to scope the query to
    pub region: Option<String>,

    /// Namespace to scope the query to
    pub namespace: Option<String>,

    /// ACL token attached to the request
    pub token: Option<String>,
}

impl QueryOptions {
    /// Returns a copy of `self` with every non-empty field of `other`
    /// overlaid on top. Neither input is mutated. Used to combine
    /// connection-level defaults with per-dependency scoping.
    pub fn merge(&self, other: &QueryOptions) -> QueryOptions {
        let mut merged = self.clone();

        if other.wait_index != 0 {
            merged.wait_index = other.wait_index;
        }
        if other.wait_time.is_some() {
            merged.wait_time = other.wait_time;
        }
        if let Some(region) = &other.region {
            if !region.is_empty() {
                merged.region = Some(region.clone());
            }
        }
        if let Some(namespace) = &other.namespace {
            if !namespace.is_empty() {
                merged.namespace = Some(namespace.clone());
            }
        }
        if let Some(token) = &other.token {
            if !token.is_empty() {
                merged.token = Some(token.clone());
            }
        }

        merged
    }

    /// Canonical query-string form for request logging,
    /// e.g. `index=42&wait=60s&region=us-east-1`.
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        if self.wait_index != 0 {
            parts.push(format!("index={}", self.wait_index));
        }
        if let Some(wait) = self.wait_time {
            parts.push(format!("wait={}s", wait.as_secs()));
        }
        if let Some(region) = &self.region {
            parts.push(format!("region={region}"));
        }
        if let Some(namespace) = &self.namespace {
            parts.push(format!("namespace={namespace}"));
        }
        parts.join("&")
    }
}

/// Response envelope of a blocking query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Backend-assigned version cursor of the returned data.
    /// Monotonically non-decreasing under normal operation; a regression
    /// signals a backend discontinuity and forces a full resync.
    pub last_index: u64,

    /// How long since the responding server was in contact with an
    /// authoritative source. Informational.
    #[serde(with = "duration_millis")]
    pub last_contact: Duration,
}

mod duration_millis {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
