//! Tracker lifecycle and the delivery loop.
//!
//! A [`Tracker`] owns all pipeline state for one init/destroy lifetime.
//! Every lifetime gets a generation number; listeners, timers and in-flight
//! sends carry the generation they were created under and do nothing once it
//! is no longer current.

use crate::capture::{CaptureContext, ManualFault};
use crate::config::{TrackerConfig, TrackerOptions};
use crate::error::{TrackerError, TrackerResult};
use crate::events::{EventType, HostEvent, Listener, ListenerOptions};
use crate::host::{Host, HostContext};
use crate::registry::{guarded, FaultSourceRegistry};
use crate::scheduler::{DeliveryScheduler, DeliveryState};
use crate::sources;
use fault_outbox::{
    ErrorQueue, HeaderSet, OutboxResult, PushOutcome, QueueStore, RetryController, RetryDecision,
    Transport,
};
use fault_record::{FaultKind, FaultRecord, RawFault, UserActionSnapshot};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

type Delivery = Pin<Box<dyn Future<Output = Option<OutboxResult<u16>>> + Send>>;

/// Client-side fault tracker.
///
/// Dropping a tracker detaches it from the host and persists any pending
/// records. [`Tracker::destroy`] additionally discards them.
pub struct Tracker {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<Option<Active>>,
    generation: AtomicU64,
    /// Debug flag of the most recent init, used for misuse warnings.
    debug: AtomicBool,
}

/// State of one initialized lifetime.
struct Active {
    generation: u64,
    config: TrackerConfig,
    queue: ErrorQueue,
    transport: Transport,
    retry: RetryController,
    scheduler: DeliveryScheduler,
    registry: Option<FaultSourceRegistry>,
    context: Arc<dyn HostContext>,
    last_user_action: Option<UserActionSnapshot>,
}

impl Active {
    fn build_record(&self, raw: RawFault, page_url: String, user_agent: String) -> FaultRecord {
        let mut ctx = self.config.record_context(page_url, user_agent);
        ctx.last_user_action = self.last_user_action.clone();
        FaultRecord::build(raw, &ctx)
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    /// Create an uninitialized tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(None),
                generation: AtomicU64::new(0),
                debug: AtomicBool::new(false),
            }),
        }
    }

    /// Resolve `options`, seed the queue from durable storage and attach to
    /// the host's fault channels.
    ///
    /// Fails without side effects when already initialized or when no
    /// report URL is configured.
    pub fn init(&self, options: TrackerOptions, host: Host) -> TrackerResult<()> {
        let mut state = self.inner.state.lock();
        if state.is_some() {
            if self.inner.debug.load(Ordering::Relaxed) {
                warn!("Fault tracker already initialized");
            }
            return Err(TrackerError::AlreadyInitialized);
        }

        let config = match TrackerConfig::resolve(options) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Fault tracker not initialized");
                return Err(e);
            }
        };
        let debug = config.debug;
        self.inner.debug.store(debug, Ordering::Relaxed);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut queue = ErrorQueue::new(
            config.max_queue,
            config.deduplicate,
            QueueStore::new(host.store.clone()),
        );
        let loaded = queue.load_persisted();

        let transport = Transport::new(config.transport_config(), host.http.clone());
        let retry = RetryController::new(config.retry_policy());
        let scheduler = DeliveryScheduler::new(host.runtime.clone(), config.debounce_window());

        let registry = host.events.clone().map(|target| {
            let mut registry = FaultSourceRegistry::new(target, debug);
            install_sources(&mut registry, Arc::downgrade(&self.inner), generation, debug);
            registry.chain_legacy_handler();
            registry
        });

        info!(
            endpoint = %config.report_url,
            project = %config.project,
            environment = %config.environment,
            loaded,
            durable = queue.store().is_durable(),
            sources = registry.as_ref().map_or(0, |r| r.registration_count()),
            network = transport.has_client(),
            "Fault tracker initialized"
        );

        *state = Some(Active {
            generation,
            config,
            queue,
            transport,
            retry,
            scheduler,
            registry,
            context: host.context,
            last_user_action: None,
        });
        Ok(())
    }

    /// Detach from the host and discard all pending state, including the
    /// durable copy. Returns false when the tracker was not initialized.
    ///
    /// A send already in flight completes, but its result is ignored.
    pub fn destroy(&self) -> bool {
        let destroyed = self.inner.teardown(true);
        if destroyed {
            info!("Fault tracker destroyed");
        }
        destroyed
    }

    /// Report a fault explicitly.
    ///
    /// The record is queued and delivery is debounced like any captured
    /// fault. Does nothing before init.
    pub fn capture_error(&self, fault: impl Into<ManualFault>, context: CaptureContext) {
        let fault = fault.into();
        let raw = RawFault {
            stack: fault.stack,
            source_file: context.source_file,
            line: context.line,
            column: context.column,
            extra: context.extra,
            ..RawFault::new(context.kind.unwrap_or(FaultKind::Manual), fault.message)
        };
        self.inner.capture(raw, None);
    }

    /// Start a delivery immediately, skipping the debounce window.
    ///
    /// Cancels the pending debounce timer and starts a fresh retry budget.
    pub fn flush_now(&self) {
        let mut state = self.inner.state.lock();
        let Some(active) = state.as_mut() else {
            self.inner.warn_uninitialized("flush_now");
            return;
        };

        active.scheduler.cancel_debounce();
        active.retry.reset();
        let delivery = deliver(Arc::downgrade(&self.inner), active.generation, None);
        active.scheduler.dispatch_now(async move {
            delivery.await;
        });
    }

    /// Deliver the queue now and wait for the outcome.
    ///
    /// Returns `None` when nothing was sent because the tracker is not
    /// initialized or the queue is empty. A failure is handled the same way
    /// as for a timed delivery.
    pub async fn flush(&self) -> Option<OutboxResult<u16>> {
        self.flush_with_headers(None).await
    }

    /// Like [`Tracker::flush`], with per-request header overrides applied
    /// according to the configured merge policy.
    pub async fn flush_with_headers(&self, headers: Option<HeaderSet>) -> Option<OutboxResult<u16>> {
        let (generation, guard) = {
            let mut state = self.inner.state.lock();
            let Some(active) = state.as_mut() else {
                self.inner.warn_uninitialized("flush");
                return None;
            };
            active.scheduler.cancel_debounce();
            active.retry.reset();
            (active.generation, active.scheduler.begin_send())
        };

        let result = deliver(Arc::downgrade(&self.inner), generation, headers).await;
        drop(guard);
        result
    }

    /// Copy of the pending records, oldest first.
    pub fn queue_snapshot(&self) -> Vec<FaultRecord> {
        self.inner
            .state
            .lock()
            .as_ref()
            .map(|active| active.queue.snapshot())
            .unwrap_or_default()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().is_some()
    }

    pub fn delivery_state(&self) -> DeliveryState {
        self.inner
            .state
            .lock()
            .as_ref()
            .map_or(DeliveryState::Idle, |active| active.scheduler.state())
    }

    /// Consecutive failed sends in the current burst.
    pub fn retry_count(&self) -> u32 {
        self.inner
            .state
            .lock()
            .as_ref()
            .map_or(0, |active| active.retry.retry_count())
    }

    /// Resolved configuration of the current lifetime.
    pub fn config(&self) -> Option<TrackerConfig> {
        self.inner
            .state
            .lock()
            .as_ref()
            .map(|active| active.config.clone())
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if self.inner.teardown(false) {
            debug!("Fault tracker dropped; pending records persisted");
        }
    }
}

impl Inner {
    /// Queue a fault and restart the debounce timer.
    ///
    /// `generation` is set for host-driven captures so a listener that
    /// outlived its lifetime cannot feed a later one.
    ///
    /// The host context is read without holding the state lock, so it may
    /// call back into the tracker.
    fn capture(self: &Arc<Self>, raw: RawFault, generation: Option<u64>) {
        let (current, context) = {
            let state = self.state.lock();
            let Some(active) = state.as_ref() else {
                self.warn_uninitialized("capture_error");
                return;
            };
            if generation.is_some_and(|g| g != active.generation) {
                return;
            }
            (active.generation, active.context.clone())
        };
        let page_url = context.page_url();
        let user_agent = context.user_agent();

        let mut state = self.state.lock();
        let Some(active) = state.as_mut().filter(|a| a.generation == current) else {
            return;
        };

        let record = active.build_record(raw, page_url, user_agent);
        let kind = record.kind;
        match active.queue.push(record) {
            PushOutcome::Queued => {}
            PushOutcome::QueuedWithEviction(evicted) => {
                if active.config.debug {
                    debug!(evicted = %evicted.message, "Queue full; dropped oldest fault");
                }
            }
            PushOutcome::Duplicate => {
                if active.config.debug {
                    debug!(%kind, "Duplicate fault skipped");
                }
            }
        }

        active.retry.reset();
        let delivery = deliver(Arc::downgrade(self), active.generation, None);
        active.scheduler.schedule_debounced(async move {
            delivery.await;
        });
    }

    fn record_user_action(&self, snapshot: UserActionSnapshot, generation: u64) {
        if let Some(active) = self.state.lock().as_mut() {
            if active.generation == generation {
                active.last_user_action = Some(snapshot);
            }
        }
    }

    /// End the current lifetime. `discard` also clears the durable copy;
    /// otherwise the pending queue is persisted for the next process.
    fn teardown(&self, discard: bool) -> bool {
        let Some(mut active) = self.state.lock().take() else {
            return false;
        };

        if let Some(mut registry) = active.registry.take() {
            registry.restore_legacy_handler();
            registry.unregister_all();
        }
        active.scheduler.cancel_all();
        if discard {
            active.queue.clear();
        } else {
            active.queue.persist();
        }
        true
    }

    fn warn_uninitialized(&self, operation: &'static str) {
        if self.debug.load(Ordering::Relaxed) {
            warn!(operation, "Fault tracker used before init");
        }
    }
}

/// Attach the fault channels of one lifetime to `registry`.
fn install_sources(
    registry: &mut FaultSourceRegistry,
    inner: Weak<Inner>,
    generation: u64,
    debug: bool,
) {
    let weak = inner.clone();
    let on_error: Listener = Arc::new(move |event: &HostEvent| {
        let HostEvent::Error(event) = event else {
            return;
        };
        guarded(debug, "error", || {
            let Some(raw) = sources::classify_error_event(event) else {
                return;
            };
            if let Some(inner) = weak.upgrade() {
                inner.capture(raw, Some(generation));
            }
        });
    });
    // Resource failures do not bubble, so listen in the capture phase.
    registry.register(EventType::Error, on_error, ListenerOptions { capture: true });

    let weak = inner.clone();
    let on_rejection: Listener = Arc::new(move |event: &HostEvent| {
        let HostEvent::UnhandledRejection(event) = event else {
            return;
        };
        guarded(debug, "unhandledrejection", || {
            let raw = sources::classify_rejection(event);
            if let Some(inner) = weak.upgrade() {
                inner.capture(raw, Some(generation));
            }
        });
    });
    registry.register(EventType::UnhandledRejection, on_rejection, ListenerOptions::default());

    let on_click: Listener = Arc::new(move |event: &HostEvent| {
        let HostEvent::Click(event) = event else {
            return;
        };
        guarded(debug, "click", || {
            let Some(snapshot) = sources::user_action(event) else {
                return;
            };
            if let Some(inner) = inner.upgrade() {
                inner.record_user_action(snapshot, generation);
            }
        });
    });
    registry.register(EventType::Click, on_click, ListenerOptions::default());
}

/// One delivery attempt for `generation`.
///
/// Drains the queue, sends the batch without holding any lock, then settles
/// the outcome if the lifetime is still current: success resets the retry
/// budget, failure restores the batch and either schedules a retry or
/// persists the queue once retries are exhausted.
fn deliver(inner: Weak<Inner>, generation: u64, overrides: Option<HeaderSet>) -> Delivery {
    Box::pin(async move {
        let (transport, store, max_len, batch) = {
            let strong = inner.upgrade()?;
            let mut state = strong.state.lock();
            let active = state.as_mut().filter(|a| a.generation == generation)?;
            if active.queue.is_empty() {
                return None;
            }
            (
                active.transport.clone(),
                active.queue.store().clone(),
                active.queue.max_len(),
                active.queue.drain_for_send(),
            )
        };

        let result = transport.send(&batch, overrides.as_ref()).await;

        let Some(strong) = inner.upgrade() else {
            // Tracker dropped mid-send: keep a failed batch for the next process.
            if result.is_err() {
                persist_orphaned(&store, batch, max_len);
            }
            return Some(result);
        };
        let mut state = strong.state.lock();
        let Some(active) = state.as_mut().filter(|a| a.generation == generation) else {
            return Some(result);
        };
        let debug = active.config.debug;

        match &result {
            Ok(status) => {
                active.retry.reset();
                // Records captured during the send stay durable.
                if active.queue.is_empty() {
                    active.queue.clear_persisted();
                } else {
                    active.queue.persist();
                }
                if debug {
                    debug!(status, delivered = batch.len(), "Fault batch delivered");
                }
            }
            Err(e) => {
                let failed = batch.len();
                active.queue.restore_on_failure(batch);
                match active.retry.on_failure() {
                    RetryDecision::Retry(delay) => {
                        if debug {
                            warn!(
                                error = %e,
                                failed,
                                retry = active.retry.retry_count(),
                                delay_ms = delay.as_millis() as u64,
                                "Fault delivery failed; scheduling retry"
                            );
                        }
                        let retry = deliver(Arc::downgrade(&strong), generation, None);
                        active.scheduler.schedule_retry(delay, async move {
                            retry.await;
                        });
                    }
                    RetryDecision::Exhausted => {
                        active.queue.persist();
                        if debug {
                            warn!(
                                error = %e,
                                pending = active.queue.len(),
                                "Max retries reached; queue persisted"
                            );
                        }
                    }
                }
            }
        }

        Some(result)
    })
}

fn persist_orphaned(store: &QueueStore, batch: Vec<FaultRecord>, max_len: usize) {
    let mut records = batch;
    records.extend(store.load());
    let skip = records.len().saturating_sub(max_len);
    if let Err(e) = store.persist(records.iter().skip(skip)) {
        warn!(error = %e, "Failed to persist undelivered faults");
    }
}
