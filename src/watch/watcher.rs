use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::view::View;
use super::view::ViewEvent;
use crate::clients::ClientSet;
use crate::config::Settings;
use crate::dep::Dependency;
use crate::dep::DependencyData;
use crate::dep::Fingerprint;
use crate::dep::ResponseMetadata;
use crate::errors::Error;
use crate::Result;

/// Identifier of a template registered with the watcher. Opaque to the
/// engine; the renderer chooses the scheme (content hash, file path).
pub type TemplateId = String;

/// Change notification delivered to the renderer: the fetched value
/// plus every template that depends on the view that produced it.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub template_ids: Vec<TemplateId>,
    pub fingerprint: Fingerprint,
    pub data: Arc<DependencyData>,
    pub metadata: ResponseMetadata,
}

/// One live poll loop in the registry.
///
/// For a shareable dependency a single entry serves every template with
/// the same fingerprint; non-shareable dependencies get one entry (and
/// one poll loop) per attached template.
struct ViewEntry {
    view_id: u64,
    dependency: Arc<dyn Dependency>,
    shared: bool,
    templates: HashSet<TemplateId>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
    /// Most recent event from this view, replayed to late attachers so
    /// they do not wait out a full long-poll round.
    last_event: ArcSwapOption<ViewEvent>,
}

impl ViewEntry {
    fn stop(&mut self) -> Option<JoinHandle<()>> {
        self.cancel.cancel();
        self.dependency.stop();
        self.join.take()
    }
}

struct WatcherInner {
    views: DashMap<Fingerprint, Vec<ViewEntry>>,
    next_view_id: AtomicU64,
    clients: ClientSet,
    settings: Settings,
    limiter: Option<Arc<Semaphore>>,
    event_tx: mpsc::Sender<ViewEvent>,
    notify_tx: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
    /// Join handles of views stopped before shutdown; awaited during
    /// shutdown so no task outlives the watcher.
    retired: Mutex<Vec<JoinHandle<()>>>,
}

/// Registry of live views plus the dispatcher that multiplexes their
/// change notifications into a single ordered stream.
///
/// Per-view ordering is preserved: a view never emits an older index
/// after a newer one. No ordering is guaranteed across views.
pub struct Watcher {
    inner: Arc<WatcherInner>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    /// Create the watcher and spawn its dispatcher task. The returned
    /// receiver is the renderer's notification stream.
    pub fn new(clients: ClientSet, settings: Settings) -> (Self, mpsc::Receiver<WatchEvent>) {
        let (event_tx, event_rx) = mpsc::channel(settings.watch.event_queue_size);
        let (notify_tx, notify_rx) = mpsc::channel(settings.watch.notify_buffer_size);

        let limiter = match settings.watch.max_concurrent_fetches {
            0 => None,
            cap => Some(Arc::new(Semaphore::new(cap))),
        };

        let inner = Arc::new(WatcherInner {
            views: DashMap::new(),
            next_view_id: AtomicU64::new(1),
            clients,
            settings,
            limiter,
            event_tx,
            notify_tx,
            cancel: CancellationToken::new(),
            retired: Mutex::new(Vec::new()),
        });

        let dispatcher = tokio::spawn(dispatch_loop(inner.clone(), event_rx));

        (
            Self {
                inner,
                dispatcher: Mutex::new(Some(dispatcher)),
            },
            notify_rx,
        )
    }

    /// Register "template T depends on dependency D".
    ///
    /// A live shareable view with the same fingerprint absorbs the
    /// registration (and its cached last value is replayed to the new
    /// template); otherwise a new view is spawned. Returns true when a
    /// new poll loop was started.
    pub fn add(&self, template_id: impl Into<TemplateId>, dependency: Arc<dyn Dependency>) -> Result<bool> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::Watcher("add after shutdown".into()));
        }

        let template_id = template_id.into();
        let fingerprint = dependency.fingerprint();
        let shareable = dependency.can_share();

        let mut entries = self.inner.views.entry(fingerprint.clone()).or_default();

        if shareable {
            if let Some(entry) = entries.iter_mut().find(|e| e.shared) {
                let attached = entry.templates.insert(template_id.clone());
                trace!(
                    "{fingerprint}: template {template_id} attached to shared view \
                     ({} templates)",
                    entry.templates.len()
                );
                // Serve the last known value right away rather than
                // making the new consumer wait out a poll round.
                if attached {
                    if let Some(event) = entry.last_event.load_full() {
                        let replay = WatchEvent {
                            template_ids: vec![template_id],
                            fingerprint: event.fingerprint.clone(),
                            data: event.data.clone(),
                            metadata: event.metadata,
                        };
                        let _ = self.inner.notify_tx.try_send(replay);
                    }
                }
                return Ok(false);
            }
        }

        let view_id = self.inner.next_view_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.inner.cancel.child_token();
        let view = View::new(
            view_id,
            dependency.clone(),
            self.inner.clients.clone(),
            self.inner.settings.retry,
            self.inner.settings.watch.wait_time(),
            self.inner.limiter.clone(),
            self.inner.event_tx.clone(),
            cancel.clone(),
        );
        let join = tokio::spawn(view.run());

        entries.push(ViewEntry {
            view_id,
            dependency,
            shared: shareable,
            templates: HashSet::from([template_id]),
            cancel,
            join: Some(join),
            last_event: ArcSwapOption::empty(),
        });

        debug!("{fingerprint}: view {view_id} created");
        Ok(true)
    }

    /// Drop "template T depends on dependency D". When the last template
    /// detaches from a view, the view is stopped and removed from the
    /// registry. Returns true when a view was stopped.
    pub fn remove(&self, template_id: &str, dependency: &dyn Dependency) -> bool {
        let fingerprint = dependency.fingerprint();
        let mut stopped = false;

        // remove_if_mut keeps detach and stop-on-zero atomic with
        // respect to concurrent add/remove on the same fingerprint.
        self.inner.views.remove_if_mut(&fingerprint, |_, entries| {
            if let Some(pos) = entries
                .iter()
                .position(|e| e.templates.contains(template_id))
            {
                entries[pos].templates.remove(template_id);
                if entries[pos].templates.is_empty() {
                    let mut entry = entries.swap_remove(pos);
                    debug!("{fingerprint}: view {} stopped (no consumers)", entry.view_id);
                    if let Some(join) = entry.stop() {
                        self.inner.retired.lock().push(join);
                    }
                    stopped = true;
                }
            }
            entries.is_empty()
        });

        stopped
    }

    /// Stop every live view, await their tasks, and drain buffered
    /// notifications. After this returns no watcher task is running.
    pub async fn shutdown(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        debug!("watcher shutting down");

        let mut joins: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();
        for mut entries in self.inner.views.iter_mut() {
            for entry in entries.iter_mut() {
                if let Some(join) = entry.stop() {
                    joins.push(join);
                }
            }
        }
        self.inner.views.clear();
        for join in self.inner.retired.lock().drain(..) {
            joins.push(join);
        }

        while let Some(result) = joins.next().await {
            if let Err(e) = result {
                warn!("view task failed: {e:?}");
            }
        }

        // All views have exited; cancelling now lets the dispatcher
        // drain whatever is still buffered and stop.
        self.inner.cancel.cancel();
        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                warn!("dispatcher task failed: {e:?}");
            }
        }

        debug!("watcher stopped");
    }

    /// Number of live views for a fingerprint. Test/monitoring accessor.
    pub fn view_count(&self, fingerprint: &Fingerprint) -> usize {
        self.inner
            .views
            .get(fingerprint)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Number of templates attached across all views of a fingerprint.
    /// Test/monitoring accessor.
    pub fn reference_count(&self, fingerprint: &Fingerprint) -> usize {
        self.inner
            .views
            .get(fingerprint)
            .map(|entries| entries.iter().map(|e| e.templates.len()).sum())
            .unwrap_or(0)
    }

    /// Total number of live views. Test/monitoring accessor.
    pub fn total_views(&self) -> usize {
        self.inner.views.iter().map(|e| e.value().len()).sum()
    }
}

/// Single consumer of the shared view-event channel: attributes each
/// event to the templates attached to its view and forwards it to the
/// renderer stream.
async fn dispatch_loop(inner: Arc<WatcherInner>, mut event_rx: mpsc::Receiver<ViewEvent>) {
    debug!("watch dispatcher started");

    loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            maybe = event_rx.recv() => match maybe {
                Some(event) => dispatch(&inner, event).await,
                None => break,
            },
        }
    }

    // Drain anything the views emitted before they were joined.
    while let Ok(event) = event_rx.try_recv() {
        dispatch(&inner, event).await;
    }

    debug!("watch dispatcher stopped");
}

async fn dispatch(inner: &Arc<WatcherInner>, event: ViewEvent) {
    let template_ids: Vec<TemplateId> = {
        match inner.views.get_mut(&event.fingerprint) {
            Some(mut entries) => match entries.iter_mut().find(|e| e.view_id == event.view_id)
            {
                Some(entry) => {
                    entry.last_event.store(Some(Arc::new(event.clone())));
                    let mut ids: Vec<TemplateId> =
                        entry.templates.iter().cloned().collect();
                    ids.sort();
                    ids
                }
                None => Vec::new(),
            },
            None => Vec::new(),
        }
    };

    if template_ids.is_empty() {
        // View was unregistered while the event sat in the queue.
        trace!("{}: event with no consumers dropped", event.fingerprint);
        return;
    }

    trace!(
        "{}: dispatching index {} to {} template(s)",
        event.fingerprint,
        event.metadata.last_index,
        template_ids.len()
    );

    let notification = WatchEvent {
        template_ids,
        fingerprint: event.fingerprint,
        data: event.data,
        metadata: event.metadata,
    };
    let _ = inner.notify_tx.send(notification).await;
}
