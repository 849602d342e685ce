//! Scripted in-memory backends for exercising the watch engine without
//! network transport.
//!
//! Each API method pops the next [`ScriptStep`] off its queue: the step
//! first holds the call open for `hold_ms` (simulating the blocking
//! query) and then resolves. An exhausted script parks the call until
//! cancellation, like a backend whose data never changes again.

use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clients::ApiError;
use crate::clients::ApiResult;
use crate::clients::ClientSet;
use crate::clients::NomadApi;
use crate::clients::ServiceListing;
use crate::clients::ServiceRegistration;
use crate::clients::ServiceRegistrationStub;
use crate::clients::VaultApi;
use crate::config::NomadConfig;
use crate::config::Settings;
use crate::config::VaultConfig;
use crate::dep::QueryOptions;
use crate::dep::ResponseMetadata;
use crate::dep::SecretLease;

/// One scripted backend response.
pub struct ScriptStep<T> {
    pub hold_ms: u64,
    pub result: Result<(T, ResponseMetadata), ApiError>,
}

impl<T> ScriptStep<T> {
    pub fn ok(hold_ms: u64, value: T, index: u64) -> Self {
        Self {
            hold_ms,
            result: Ok((value, metadata(index))),
        }
    }

    pub fn err(hold_ms: u64, err: ApiError) -> Self {
        Self {
            hold_ms,
            result: Err(err),
        }
    }
}

async fn play<T>(
    script: &Mutex<VecDeque<ScriptStep<T>>>,
    calls: &AtomicUsize,
) -> Result<(T, ResponseMetadata), ApiError> {
    let step = script.lock().pop_front();
    match step {
        Some(step) => {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(step.hold_ms)).await;
            step.result
        }
        None => {
            // No further change scripted: park like an idle long poll.
            // Only cancellation gets the caller out of here.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ApiError::Timeout(Duration::from_secs(3600)))
        }
    }
}

#[derive(Default)]
pub struct ScriptedNomad {
    pub services: Mutex<VecDeque<ScriptStep<Vec<ServiceRegistration>>>>,
    pub listings: Mutex<VecDeque<ScriptStep<Vec<ServiceListing>>>>,
    pub kv: Mutex<VecDeque<ScriptStep<Option<String>>>>,

    pub service_calls: AtomicUsize,
    pub listing_calls: AtomicUsize,
    pub kv_calls: AtomicUsize,

    /// Options seen by each service_registrations call, oldest first.
    pub seen_opts: Mutex<Vec<QueryOptions>>,
}

impl ScriptedNomad {
    pub fn with_service_script(steps: Vec<ScriptStep<Vec<ServiceRegistration>>>) -> Arc<Self> {
        let scripted = Self::default();
        *scripted.services.lock() = steps.into();
        Arc::new(scripted)
    }
}

#[async_trait]
impl NomadApi for ScriptedNomad {
    async fn service_registrations<'a>(
        &self,
        _name: &str,
        _tag: Option<&'a str>,
        opts: &QueryOptions,
    ) -> ApiResult<Vec<ServiceRegistration>> {
        self.seen_opts.lock().push(opts.clone());
        play(&self.services, &self.service_calls).await
    }

    async fn list_services(&self, _opts: &QueryOptions) -> ApiResult<Vec<ServiceListing>> {
        play(&self.listings, &self.listing_calls).await
    }

    async fn kv_get(&self, _path: &str, _opts: &QueryOptions) -> ApiResult<Option<String>> {
        play(&self.kv, &self.kv_calls).await
    }
}

#[derive(Default)]
pub struct ScriptedVault {
    pub leases: Mutex<VecDeque<ScriptStep<SecretLease>>>,
    pub lease_calls: AtomicUsize,
}

#[async_trait]
impl VaultApi for ScriptedVault {
    async fn issue_lease(&self, _path: &str, _opts: &QueryOptions) -> ApiResult<SecretLease> {
        play(&self.leases, &self.lease_calls).await
    }
}

/// ClientSet wired to the given fakes with default backend configs.
pub fn client_set(nomad: Arc<ScriptedNomad>, vault: Arc<ScriptedVault>) -> ClientSet {
    ClientSet::new(
        nomad,
        vault,
        &NomadConfig::default(),
        &VaultConfig::default(),
    )
}

/// Settings tuned for tests: short waits, small deterministic backoff.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.watch.wait_time_secs = 1;
    settings.retry.base_delay_ms = 10;
    settings.retry.max_delay_ms = 40;
    settings.retry.jitter_fraction = 0.0;
    settings
}

pub fn metadata(index: u64) -> ResponseMetadata {
    ResponseMetadata {
        last_index: index,
        last_contact: Duration::from_millis(0),
    }
}

pub fn registration(name: &str, id: &str, tags: &[&str]) -> ServiceRegistration {
    ServiceRegistration {
        id: id.to_string(),
        service_name: name.to_string(),
        node_id: "node-1".to_string(),
        address: "10.0.0.1".to_string(),
        port: 8080,
        datacenter: "dc1".to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        job_id: "job-1".to_string(),
        alloc_id: "alloc-1".to_string(),
    }
}

pub fn stub(name: &str, tags: &[&str]) -> ServiceRegistrationStub {
    ServiceRegistrationStub {
        service_name: name.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn lease(id: &str, duration_secs: u64) -> SecretLease {
    SecretLease {
        lease_id: id.to_string(),
        lease_duration_secs: duration_secs,
        renewable: true,
        data: [("password".to_string(), "hunter2".to_string())].into(),
    }
}
