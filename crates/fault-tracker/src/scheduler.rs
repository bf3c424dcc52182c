//! Debounce and retry timers for delivery.
//!
//! Timers run as tasks on the host runtime. When a timer fires it spawns the
//! delivery as its own task, so cancelling timers never interrupts a send
//! that has already started.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Where the delivery pipeline currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    /// A debounce timer is pending.
    Scheduled,
    /// At least one send is in flight.
    Sending,
    /// A retry timer is pending after a failed send.
    BackingOff,
}

/// Marks one send as in flight for as long as it lives.
pub(crate) struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct DeliveryScheduler {
    runtime: Handle,
    debounce: Duration,
    debounce_timer: Option<JoinHandle<()>>,
    retry_timers: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl DeliveryScheduler {
    pub(crate) fn new(runtime: Handle, debounce: Duration) -> Self {
        Self {
            runtime,
            debounce,
            debounce_timer: None,
            retry_timers: Vec::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the debounce timer with a fresh one running `delivery` when
    /// it expires. At most one debounce timer exists at a time.
    pub(crate) fn schedule_debounced<F>(&mut self, delivery: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel_debounce();
        self.debounce_timer = Some(self.spawn_timer(self.debounce, delivery));
    }

    pub(crate) fn cancel_debounce(&mut self) {
        if let Some(timer) = self.debounce_timer.take() {
            timer.abort();
        }
    }

    /// Run `delivery` once after `delay`.
    ///
    /// Retry timers are independent of the debounce timer; a later capture
    /// does not cancel them.
    pub(crate) fn schedule_retry<F>(&mut self, delay: Duration, delivery: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.retry_timers.retain(|timer| !timer.is_finished());
        let timer = self.spawn_timer(delay, delivery);
        self.retry_timers.push(timer);
    }

    /// Start `delivery` right away, outside any timer.
    pub(crate) fn dispatch_now<F>(&mut self, delivery: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.begin_send();
        self.runtime.spawn(async move {
            let _guard = guard;
            delivery.await;
        });
    }

    /// Mark a send the caller drives itself.
    pub(crate) fn begin_send(&self) -> InFlightGuard {
        InFlightGuard::new(self.in_flight.clone())
    }

    /// Abort every pending timer. Sends already in flight keep running.
    pub(crate) fn cancel_all(&mut self) {
        self.cancel_debounce();
        for timer in self.retry_timers.drain(..) {
            timer.abort();
        }
    }

    pub(crate) fn state(&self) -> DeliveryState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            DeliveryState::Sending
        } else if self.retry_timers.iter().any(|t| !t.is_finished()) {
            DeliveryState::BackingOff
        } else if self
            .debounce_timer
            .as_ref()
            .is_some_and(|t| !t.is_finished())
        {
            DeliveryState::Scheduled
        } else {
            DeliveryState::Idle
        }
    }

    fn spawn_timer<F>(&self, delay: Duration, delivery: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = self.runtime.clone();
        let in_flight = self.in_flight.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Counted before the timer task finishes so the state never
            // reads Idle between the two tasks.
            let guard = InFlightGuard::new(in_flight);
            runtime.spawn(async move {
                let _guard = guard;
                delivery.await;
            });
        })
    }
}

impl Drop for DeliveryScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
