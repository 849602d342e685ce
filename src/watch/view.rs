use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::clients::ClientSet;
use crate::config::BackoffPolicy;
use crate::dep::Dependency;
use crate::dep::DependencyData;
use crate::dep::Fingerprint;
use crate::dep::QueryOptions;
use crate::dep::ResponseMetadata;
use crate::errors::FetchError;

/// Change notification emitted by a view onto the shared dispatcher
/// channel.
#[derive(Debug, Clone)]
pub(crate) struct ViewEvent {
    pub view_id: u64,
    pub fingerprint: Fingerprint,
    pub data: Arc<DependencyData>,
    pub metadata: ResponseMetadata,
}

/// The poll loop for one dependency instance (or one shared instance
/// serving several templates).
///
/// Owns the version cursor and the consecutive-failure counter. The
/// loop runs as its own tokio task until cancelled; every suspension
/// point (permit acquisition, the blocking fetch, the backoff sleep,
/// event delivery) races the cancellation token, so `stop` never waits
/// for a long-poll budget to expire.
pub(crate) struct View {
    view_id: u64,
    dependency: Arc<dyn Dependency>,
    fingerprint: Fingerprint,
    clients: ClientSet,
    backoff: BackoffPolicy,
    wait_time: Duration,
    limiter: Option<Arc<Semaphore>>,
    event_tx: mpsc::Sender<ViewEvent>,
    cancel: CancellationToken,

    /// Version cursor of the last delivered response (0 = unknown)
    last_index: u64,
    /// Consecutive failed fetches; resets on any success
    attempts: u32,
}

impl View {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        view_id: u64,
        dependency: Arc<dyn Dependency>,
        clients: ClientSet,
        backoff: BackoffPolicy,
        wait_time: Duration,
        limiter: Option<Arc<Semaphore>>,
        event_tx: mpsc::Sender<ViewEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let fingerprint = dependency.fingerprint();
        Self {
            view_id,
            dependency,
            fingerprint,
            clients,
            backoff,
            wait_time,
            limiter,
            event_tx,
            cancel,
            last_index: 0,
            attempts: 0,
        }
    }

    /// Drive the poll loop until cancellation.
    pub(crate) async fn run(mut self) {
        debug!("{}: view started", self.fingerprint);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Respect the global cap on outstanding fetches, if any.
            let permit = match &self.limiter {
                Some(sem) => {
                    let sem = sem.clone();
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        permit = sem.acquire_owned() => match permit {
                            Ok(p) => Some(p),
                            Err(_) => break,
                        },
                    }
                }
                None => None,
            };

            let opts = QueryOptions {
                wait_index: self.last_index,
                wait_time: Some(self.wait_time),
                ..Default::default()
            };

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                res = self.dependency.fetch(&self.clients, &opts) => res,
            };
            drop(permit);

            match result {
                Ok((data, metadata)) => {
                    self.attempts = 0;
                    if !self.observe(data, metadata).await {
                        break;
                    }
                }
                Err(FetchError::Stopped) => break,
                Err(err) => {
                    if !self.back_off(&err).await {
                        break;
                    }
                }
            }
        }

        // Terminal for this view: any in-flight or future fetch on the
        // dependency must now return Stopped.
        self.dependency.stop();
        debug!("{}: view stopped", self.fingerprint);
    }

    /// Classify a successful response against the cursor. Returns false
    /// when the loop must exit.
    async fn observe(&mut self, data: DependencyData, metadata: ResponseMetadata) -> bool {
        if metadata.last_index < self.last_index {
            // Backend discontinuity: the cursor moved backward (leader
            // change, snapshot restore). Resync from scratch.
            warn!(
                "{}: response index {} older than previous {}, resyncing",
                self.fingerprint, metadata.last_index, self.last_index
            );
            self.last_index = 0;
            return true;
        }

        if metadata.last_index == self.last_index {
            // The long poll timed out with no change; loop right away.
            trace!("{}: data was not updated", self.fingerprint);
            return true;
        }

        trace!(
            "{}: change observed, index {} -> {}",
            self.fingerprint,
            self.last_index,
            metadata.last_index
        );
        self.last_index = metadata.last_index;

        let event = ViewEvent {
            view_id: self.view_id,
            fingerprint: self.fingerprint.clone(),
            data: Arc::new(data),
            metadata,
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.event_tx.send(event) => sent.is_ok(),
        }
    }

    /// Sleep out the backoff delay for a failed fetch. Returns false
    /// when cancellation interrupted the sleep.
    async fn back_off(&mut self, err: &FetchError) -> bool {
        self.attempts += 1;
        let delay = jittered_delay(&self.backoff, self.attempts);

        match err {
            FetchError::Permanent { .. } => {
                if err.has_side_effect() {
                    error!(
                        "{}: {} (call may have had backend side effects), retry in {:?}",
                        self.fingerprint, err, delay
                    );
                } else {
                    error!("{}: {}, retry in {:?}", self.fingerprint, err, delay);
                }
            }
            _ => warn!(
                "{}: {} (attempt {}), retry in {:?}",
                self.fingerprint, err, self.attempts, delay
            ),
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Capped exponential delay with randomized jitter, so many views
/// failing against the same backend spread their retries out.
pub(crate) fn jittered_delay(policy: &BackoffPolicy, attempts: u32) -> Duration {
    let base = policy.delay_ms(attempts);
    if policy.jitter_fraction <= 0.0 || base == 0 {
        return Duration::from_millis(base);
    }

    let jitter = (base as f64 * policy.jitter_fraction) as i64;
    let offset = if jitter > 0 {
        rand::thread_rng().gen_range(-jitter..=jitter)
    } else {
        0
    };
    Duration::from_millis((base as i64 + offset).max(0) as u64)
}
