//! The dependency contract: one remote query whose result may change
//! over time.
//!
//! Every variant (service catalog, service listing, key/value, secret
//! lease) satisfies the same shape, so the view/watcher layer never
//! special-cases backends. Identity is the `(type, canonical string)`
//! fingerprint; two shareable dependencies with equal fingerprints are
//! interchangeable and are fetched at most once concurrently.

mod data;
mod grammar;
mod kv;
mod nomad_service;
mod nomad_services;
mod query;
mod secret;

pub use data::*;
pub use kv::*;
pub use nomad_service::*;
pub use nomad_services::*;
pub use query::*;
pub use secret::*;


use async_trait::async_trait;

use crate::clients::ApiError;
use crate::clients::ClientSet;
use crate::errors::FetchError;

/// Which backend a dependency queries. Part of the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyType {
    Nomad,
    Vault,
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyType::Nomad => write!(f, "nomad"),
            DependencyType::Vault => write!(f, "vault"),
        }
    }
}

/// Identity of a dependency for sharing and registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub dep_type: DependencyType,
    pub id: String,
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// A typed, parseable description of one remote query.
///
/// `fetch` performs exactly one request attempt; retry and backoff are
/// the owning view's responsibility. `stop` must cause any in-flight or
/// future `fetch` to return [`FetchError::Stopped`] promptly, without
/// waiting out the blocking-query budget.
#[async_trait]
pub trait Dependency: std::fmt::Display + Send + Sync + 'static {
    async fn fetch(
        &self,
        clients: &ClientSet,
        opts: &QueryOptions,
    ) -> std::result::Result<(DependencyData, ResponseMetadata), FetchError>;

    /// Signal cancellation. Safe to call repeatedly and from any task.
    fn stop(&self);

    /// Whether identical instances may be served by one shared view.
    fn can_share(&self) -> bool;

    fn dep_type(&self) -> DependencyType;

    /// `(type, canonical string)` identity used for sharing and logging.
    fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            dep_type: self.dep_type(),
            id: self.to_string(),
        }
    }
}

/// Map a transport error onto the fetch taxonomy, attaching the
/// dependency's canonical string for diagnostics.
pub(crate) fn classify_api_error(
    err: ApiError,
    dependency: String,
    side_effect: bool,
) -> FetchError {
    if err.is_transient() {
        FetchError::Transient {
            dependency,
            reason: err.to_string(),
        }
    } else {
        FetchError::Permanent {
            dependency,
            reason: err.to_string(),
            side_effect,
        }
    }
}

/// Copy, sort and deduplicate a tag list so equal tag sets compare equal
/// regardless of backend ordering.
pub(crate) fn sorted_tags(tags: &[String]) -> Vec<String> {
    let mut tags = tags.to_vec();
    tags.sort();
    tags.dedup();
    tags
}
