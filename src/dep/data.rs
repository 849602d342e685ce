use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// One service registration in the scheduler's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomadService {
    pub id: String,
    pub name: String,
    pub node: String,
    pub address: String,
    pub port: u16,
    pub datacenter: String,
    /// Sorted, deduplicated
    pub tags: Vec<String>,
    pub job_id: String,
    pub alloc_id: String,
}

/// A stub entry from the scheduler's service listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomadServiceSnippet {
    pub name: String,
    /// Sorted, deduplicated
    pub tags: Vec<String>,
}

/// One key/value pair read from the KV store. `value` is `None` when the
/// key does not exist, which is a valid (and watchable) state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub path: String,
    pub value: Option<String>,
}

/// A leased secret issued by the secret backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretLease {
    pub lease_id: String,
    pub lease_duration_secs: u64,
    pub renewable: bool,
    pub data: HashMap<String, String>,
}

/// Result envelope covering every dependency variant's fetch result.
///
/// An explicit tagged union rather than a dynamic any-type: the set of
/// shapes the engine can deliver is closed, so downstream consumers and
/// serialized transfers enumerate it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DependencyData {
    Services(Vec<NomadService>),
    ServiceSnippets(Vec<NomadServiceSnippet>),
    Kv(KvPair),
    Secret(SecretLease),
}

impl DependencyData {
    /// Number of records carried, for trace logging.
    pub fn len(&self) -> usize {
        match self {
            DependencyData::Services(s) => s.len(),
            DependencyData::ServiceSnippets(s) => s.len(),
            DependencyData::Kv(_) | DependencyData::Secret(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
