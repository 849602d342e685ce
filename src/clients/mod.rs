//! Backend client seam.
//!
//! The engine never performs network transport itself: every dependency
//! variant calls through the trait objects bundled in [`ClientSet`]. A
//! production binary plugs in real HTTP clients built from the backend
//! configs; tests plug in mocks or scripted in-memory fakes.


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::config::NomadConfig;
use crate::config::VaultConfig;
use crate::dep::QueryOptions;
use crate::dep::ResponseMetadata;
use crate::dep::SecretLease;

/// Transport-level failure of one API call, classified so the fetch
/// layer can tell "retry quietly" from "retry loudly".
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Transient errors are expected to heal without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Connection(_) | ApiError::Timeout(_) | ApiError::Server { .. }
        )
    }
}

pub type ApiResult<T> = std::result::Result<(T, ResponseMetadata), ApiError>;

/// One service registration as returned by the scheduler API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub id: String,
    pub service_name: String,
    pub node_id: String,
    pub address: String,
    pub port: u16,
    pub datacenter: String,
    pub tags: Vec<String>,
    pub job_id: String,
    pub alloc_id: String,
}

/// One stub entry of the scheduler's service listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRegistrationStub {
    pub service_name: String,
    pub tags: Vec<String>,
}

/// Service listing grouped by namespace, as the API returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceListing {
    pub namespace: String,
    pub services: Vec<ServiceRegistrationStub>,
}

/// Scheduler backend API surface used by the dependency variants.
///
/// Every method is a single blocking-query round trip: it honors
/// `opts.wait_index` / `opts.wait_time` and returns the new cursor in
/// the response metadata. Implementations must not retry internally.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NomadApi: Send + Sync + 'static {
    /// `GET /v1/service/<name>`, optionally filtered by tag.
    async fn service_registrations<'a>(
        &self,
        name: &str,
        tag: Option<&'a str>,
        opts: &QueryOptions,
    ) -> ApiResult<Vec<ServiceRegistration>>;

    /// `GET /v1/services`: all registrations grouped by namespace.
    async fn list_services(&self, opts: &QueryOptions) -> ApiResult<Vec<ServiceListing>>;

    /// Read one item from the key/value store. `None` means the key does
    /// not exist, which is a watchable state rather than an error.
    async fn kv_get(&self, path: &str, opts: &QueryOptions) -> ApiResult<Option<String>>;
}

/// Secret backend API surface.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VaultApi: Send + Sync + 'static {
    /// Issue (or re-issue) a lease for the secret at `path`. This call
    /// has backend side effects: a credential may be created even when
    /// the response is lost, so callers must never replay it blindly.
    async fn issue_lease(&self, path: &str, opts: &QueryOptions) -> ApiResult<SecretLease>;
}

/// Bundle of connected backend clients handed to every fetch, plus the
/// connection-level query scoping derived from configuration.
#[derive(Clone)]
pub struct ClientSet {
    nomad: Arc<dyn NomadApi>,
    vault: Arc<dyn VaultApi>,
    nomad_defaults: QueryOptions,
    vault_defaults: QueryOptions,
}

impl ClientSet {
    pub fn new(
        nomad: Arc<dyn NomadApi>,
        vault: Arc<dyn VaultApi>,
        nomad_config: &NomadConfig,
        vault_config: &VaultConfig,
    ) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            nomad,
            vault,
            nomad_defaults: QueryOptions {
                region: non_empty(&nomad_config.region),
                namespace: non_empty(&nomad_config.namespace),
                token: non_empty(&nomad_config.token),
                ..Default::default()
            },
            vault_defaults: QueryOptions {
                namespace: non_empty(&vault_config.namespace),
                token: non_empty(&vault_config.token),
                ..Default::default()
            },
        }
    }

    pub fn nomad(&self) -> &dyn NomadApi {
        self.nomad.as_ref()
    }

    pub fn vault(&self) -> &dyn VaultApi {
        self.vault.as_ref()
    }

    /// Connection-level scoping for scheduler queries; merged under each
    /// dependency's own options.
    pub fn nomad_defaults(&self) -> &QueryOptions {
        &self.nomad_defaults
    }

    /// The namespace scheduler listings are filtered to.
    pub fn nomad_namespace(&self) -> &str {
        self.nomad_defaults.namespace.as_deref().unwrap_or("default")
    }

    pub fn vault_defaults(&self) -> &QueryOptions {
        &self.vault_defaults
    }
}

impl std::fmt::Debug for ClientSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSet")
            .field("nomad_defaults", &self.nomad_defaults)
            .finish_non_exhaustive()
    }
}
