use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use async_trait::async_trait;

use super::classify_api_error;
use super::Dependency;
use super::DependencyData;
use super::DependencyType;
use super::QueryOptions;
use super::ResponseMetadata;
use crate::clients::ClientSet;
use crate::errors::FetchError;
use crate::errors::ParseError;

/// A requested secret lease, `<path>` (e.g. `database/creds/readonly`).
///
/// The secret backend does not support blocking queries, and issuing a
/// lease creates a credential on the backend. So this variant:
/// - is never shared across consumers (`can_share` is false); each
///   consumer owns its own lease lifecycle;
/// - paces itself by sleeping out half the previous lease duration
///   inside `fetch` before issuing a replacement, so the view's
///   "unchanged cursor means loop immediately" rule cannot spin;
/// - marks non-retryable failures as side-effectful so they are logged
///   distinctly (a credential may exist that the caller never saw).
#[derive(Debug)]
pub struct SecretLeaseQuery {
    stop: CancellationToken,

    path: String,
    last_lease_secs: Mutex<Option<u64>>,
}

impl SecretLeaseQuery {
    pub fn new(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() {
            return Err(ParseError::MissingName {
                kind: "vault.secret",
                input: s.to_string(),
            });
        }
        if let Some(ch) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.')))
        {
            return Err(ParseError::IllegalCharacter {
                kind: "vault.secret",
                component: "path",
                ch,
                input: s.to_string(),
            });
        }
        Ok(Self {
            stop: CancellationToken::new(),
            path: s.to_string(),
            last_lease_secs: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Dependency for SecretLeaseQuery {
    async fn fetch(
        &self,
        clients: &ClientSet,
        opts: &QueryOptions,
    ) -> Result<(DependencyData, ResponseMetadata), FetchError> {
        if self.stop.is_cancelled() {
            return Err(FetchError::Stopped);
        }

        // Hold the lease until renewal is due before issuing a new one.
        let last_lease_secs = *self.last_lease_secs.lock();
        let pause = last_lease_secs.map(|secs| Duration::from_secs((secs / 2).max(1)));
        if let Some(pause) = pause {
            trace!("{self}: lease renewal due in {pause:?}");
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Err(FetchError::Stopped),
                _ = tokio::time::sleep(pause) => {}
            }
        }

        let opts = clients.vault_defaults().merge(opts);

        trace!("{self}: issuing lease for {}", self.path);

        let call = clients.vault().issue_lease(&self.path, &opts);
        let (lease, meta) = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Err(FetchError::Stopped),
            res = call => {
                res.map_err(|e| classify_api_error(e, self.to_string(), true))?
            }
        };

        trace!(
            "{self}: issued lease {} ({}s, renewable: {})",
            lease.lease_id,
            lease.lease_duration_secs,
            lease.renewable
        );

        *self.last_lease_secs.lock() = Some(lease.lease_duration_secs);

        Ok((DependencyData::Secret(lease), meta))
    }

    fn stop(&self) {
        self.stop.cancel();
    }

    fn can_share(&self) -> bool {
        false
    }

    fn dep_type(&self) -> DependencyType {
        DependencyType::Vault
    }
}

impl std::fmt::Display for SecretLeaseQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vault.secret({})", self.path)
    }
}
