//! State monitor: poll loop, push listener and change emission.
//!
//! Every facet value, whether polled or pushed, goes through
//! [`StateMonitor::observe`]: compare against the cache, update the cache and
//! notify handlers, all under one emit lock. Two sources can therefore never
//! broadcast the same change twice or reorder each other's updates.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use obsync_core::{
    ControlEvent, DynControlClient, FacetKind, SnapshotProvider, StatusSnapshot,
};
use obsync_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::StateCache;
use crate::facet::Facet;
use crate::push::{PushAction, PushBinding};

/// Where a change was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Poll,
    Push,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Push => "push",
        }
    }
}

/// A facet's value changed since it was last observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub facet: FacetKind,
    pub new_value: Value,
    /// Unix milliseconds.
    pub timestamp_ms: i64,
    pub source: ChangeSource,
}

/// Change listener.
///
/// Runs synchronously under the emit lock; it must not block and must not
/// call back into `on_change`.
pub type ChangeHandler = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Facets fetched.
    pub polled: usize,
    /// Facets whose value changed.
    pub changed: usize,
    /// Facets whose fetch failed.
    pub failed: usize,
    /// Facets left to the push path.
    pub skipped: usize,
}

struct PushSource {
    client: DynControlClient,
    bindings: Vec<PushBinding>,
    facets: HashSet<FacetKind>,
}

struct LoopHandle {
    token: CancellationToken,
    poll_task: JoinHandle<()>,
    push_task: Option<JoinHandle<()>>,
}

impl LoopHandle {
    fn is_alive(&self) -> bool {
        !self.token.is_cancelled() && !self.poll_task.is_finished()
    }
}

/// Builder for [`StateMonitor`].
#[derive(Default)]
pub struct StateMonitorBuilder {
    facets: Vec<Facet>,
    push: Option<(DynControlClient, Vec<PushBinding>)>,
}

impl StateMonitorBuilder {
    pub fn facet(mut self, facet: Facet) -> Self {
        self.facets.push(facet);
        self
    }

    pub fn facets(mut self, facets: impl IntoIterator<Item = Facet>) -> Self {
        self.facets.extend(facets);
        self
    }

    /// Attach a native change-notification source.
    pub fn push_source(mut self, client: DynControlClient, bindings: Vec<PushBinding>) -> Self {
        self.push = Some((client, bindings));
        self
    }

    pub fn build(self) -> Arc<StateMonitor> {
        let registered: HashSet<FacetKind> = self.facets.iter().map(|f| f.kind()).collect();

        let push = self.push.map(|(client, bindings)| {
            let bindings: Vec<PushBinding> = bindings
                .into_iter()
                .filter(|b| registered.contains(&b.facet))
                .collect();
            let facets = bindings.iter().map(|b| b.facet).collect();
            PushSource {
                client,
                bindings,
                facets,
            }
        });

        Arc::new(StateMonitor {
            facets: self.facets,
            cache: RwLock::new(StateCache::new()),
            emit_lock: Mutex::new(()),
            handlers: RwLock::new(Vec::new()),
            push,
            push_live: AtomicBool::new(false),
            poll_loop: Mutex::new(None),
        })
    }
}

/// Drives facets through fetch-compare-emit cycles.
pub struct StateMonitor {
    facets: Vec<Facet>,
    cache: RwLock<StateCache>,
    emit_lock: Mutex<()>,
    handlers: RwLock<Vec<ChangeHandler>>,
    push: Option<PushSource>,
    /// A push subscription is delivering events.
    push_live: AtomicBool,
    poll_loop: Mutex<Option<LoopHandle>>,
}

impl StateMonitor {
    pub fn builder() -> StateMonitorBuilder {
        StateMonitorBuilder::default()
    }

    /// Monitor with poll-only facets.
    pub fn new(facets: Vec<Facet>) -> Arc<Self> {
        Self::builder().facets(facets).build()
    }

    /// Registered facets, in polling order.
    pub fn facet_kinds(&self) -> Vec<FacetKind> {
        self.facets.iter().map(|f| f.kind()).collect()
    }

    /// Register a change listener.
    ///
    /// Listeners are invoked in registration order, once per change.
    pub fn on_change<F>(&self, handler: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push(Box::new(handler));
    }

    /// Start the poll loop (and the push listener, if a source is attached).
    ///
    /// Returns `false` if a loop is already running. A loop whose task has
    /// ended on its own (e.g. after a panic) does not count as running.
    pub fn start(self: &Arc<Self>, interval: Duration) -> bool {
        let mut guard = self.poll_loop.lock();
        if let Some(handle) = guard.as_ref() {
            if handle.is_alive() {
                debug!("State monitor already running");
                return false;
            }
            if !handle.token.is_cancelled() {
                warn!("Previous poll loop ended unexpectedly, restarting");
                handle.token.cancel();
            }
        }

        let token = CancellationToken::new();
        let poll_task = tokio::spawn(self.clone().run_poll_loop(interval, token.clone()));

        let push_task = self.push.as_ref().and_then(|push| {
            match push.client.subscribe_events() {
                Some(rx) => {
                    self.push_live.store(true, Ordering::Release);
                    Some(tokio::spawn(self.clone().run_push_loop(rx, token.clone())))
                }
                None => {
                    info!("Control client offers no push events, polling every facet");
                    None
                }
            }
        });

        info!(
            interval_ms = interval.as_millis() as u64,
            facets = self.facets.len(),
            push = push_task.is_some(),
            "State monitor started"
        );

        *guard = Some(LoopHandle {
            token,
            poll_task,
            push_task,
        });
        true
    }

    /// Stop the loop. Returns `false` if it was not running.
    ///
    /// A fetch already in flight completes, but its result is discarded.
    pub fn stop(&self) -> bool {
        let handle = self.poll_loop.lock().take();
        match handle {
            Some(handle) => {
                handle.token.cancel();
                if let Some(push_task) = handle.push_task {
                    push_task.abort();
                }
                self.push_live.store(false, Ordering::Release);
                info!("State monitor stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.poll_loop
            .lock()
            .as_ref()
            .is_some_and(LoopHandle::is_alive)
    }

    /// Whether facets covered by push bindings are currently skipped by polling.
    pub fn is_push_live(&self) -> bool {
        self.push_live.load(Ordering::Acquire)
    }

    /// Run exactly one poll cycle.
    pub async fn poll_once(&self) -> CycleReport {
        self.run_cycle(None).await
    }

    /// Last observed value of a facet.
    pub fn cached(&self, facet: FacetKind) -> Option<Value> {
        self.cache.read().get(facet).cloned()
    }

    /// Compare a freshly fetched value with the cache and emit on change.
    pub fn observe(
        &self,
        facet: FacetKind,
        value: Value,
        source: ChangeSource,
    ) -> Option<ChangeEvent> {
        let _emit = self.emit_lock.lock();

        {
            let mut cache = self.cache.write();
            if !cache.has_changed(facet, &value) {
                trace!(%facet, "Facet unchanged");
                return None;
            }
            cache.set(facet, value.clone());
        }

        let event = ChangeEvent {
            facet,
            new_value: value,
            timestamp_ms: Utc::now().timestamp_millis(),
            source,
        };
        debug!(%facet, source = source.as_str(), "Facet changed");
        Metrics::change_event(facet.as_str(), source.as_str());

        for handler in self.handlers.read().iter() {
            handler(&event);
        }
        Some(event)
    }

    async fn run_cycle(&self, token: Option<&CancellationToken>) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();
        let push_live = self.is_push_live();

        for facet in &self.facets {
            let kind = facet.kind();
            if push_live && self.is_push_bound(kind) {
                report.skipped += 1;
                continue;
            }

            report.polled += 1;
            match facet.fetch().await {
                Ok(value) => {
                    if token.is_some_and(|t| t.is_cancelled()) {
                        debug!("Monitor stopped mid-cycle, discarding results");
                        return report;
                    }
                    if self.observe(kind, value, ChangeSource::Poll).is_some() {
                        report.changed += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    debug!(facet = %kind, error = %e, "Facet fetch failed");
                    Metrics::facet_fetch_failed(kind.as_str());
                }
            }
        }

        Metrics::poll_cycle(started.elapsed().as_secs_f64() * 1000.0);
        trace!(?report, "Poll cycle complete");
        report
    }

    async fn run_poll_loop(self: Arc<Self>, period: Duration, token: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.run_cycle(Some(&token)).await;
        }
        debug!("Poll loop exited");
    }

    async fn run_push_loop(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<ControlEvent>,
        token: CancellationToken,
    ) {
        info!("Listening for push events");

        // Polling skips these facets from now on; seed them once. Events
        // arriving meanwhile queue up in `rx`.
        self.refresh_push_facets(&token).await;

        loop {
            let received = tokio::select! {
                () = token.cancelled() => break,
                received = rx.recv() => received,
            };

            match received {
                Ok(event) => self.handle_push_event(&event, &token).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Push listener lagged, refreshing push facets");
                    self.refresh_push_facets(&token).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Push event stream closed, falling back to polling");
                    break;
                }
            }
        }

        if !token.is_cancelled() {
            self.push_live.store(false, Ordering::Release);
        }
        debug!("Push loop exited");
    }

    async fn handle_push_event(&self, event: &ControlEvent, token: &CancellationToken) {
        if event.event_type == ControlEvent::IDENTIFIED {
            info!("Control session (re)established, refreshing push facets");
            self.refresh_push_facets(token).await;
            return;
        }

        let Some(push) = &self.push else {
            return;
        };

        for binding in push
            .bindings
            .iter()
            .filter(|b| b.event_type == event.event_type)
        {
            trace!(event = %event.event_type, facet = %binding.facet, "Push event");
            match binding.action {
                PushAction::Extract(extract) => match extract(&event.data) {
                    Some(value) => {
                        self.observe(binding.facet, value, ChangeSource::Push);
                    }
                    None => {
                        debug!(event = %event.event_type, "Unexpected event data, refetching");
                        self.refetch(binding.facet, token).await;
                    }
                },
                PushAction::Refetch => self.refetch(binding.facet, token).await,
            }
        }
    }

    async fn refresh_push_facets(&self, token: &CancellationToken) {
        let Some(push) = &self.push else {
            return;
        };
        for facet in self.facets.iter().filter(|f| push.facets.contains(&f.kind())) {
            self.refetch(facet.kind(), token).await;
        }
    }

    async fn refetch(&self, kind: FacetKind, token: &CancellationToken) {
        let Some(facet) = self.facets.iter().find(|f| f.kind() == kind) else {
            return;
        };
        match facet.fetch().await {
            Ok(value) if !token.is_cancelled() => {
                self.observe(kind, value, ChangeSource::Push);
            }
            Ok(_) => {}
            Err(e) => {
                debug!(facet = %kind, error = %e, "Push refetch failed");
                Metrics::facet_fetch_failed(kind.as_str());
            }
        }
    }

    fn is_push_bound(&self, kind: FacetKind) -> bool {
        self.push
            .as_ref()
            .is_some_and(|push| push.facets.contains(&kind))
    }
}

impl SnapshotProvider for StateMonitor {
    fn snapshot(&self) -> StatusSnapshot {
        self.cache.read().snapshot()
    }
}

impl std::fmt::Debug for StateMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMonitor")
            .field("facets", &self.facet_kinds())
            .field("running", &self.is_running())
            .field("push_live", &self.is_push_live())
            .finish()
    }
}
