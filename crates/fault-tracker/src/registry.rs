//! Idempotent registration of fault sources on the host.

use crate::events::{listener_id, EventTarget, EventType, LegacyHandler, Listener, ListenerOptions};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Run a fault-source callback without letting a panic reach the host.
pub(crate) fn guarded(debug: bool, source: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() && debug {
        warn!(source, "Fault source handler failed");
    }
}

struct Registration {
    event_type: EventType,
    listener: Listener,
    options: ListenerOptions,
}

/// Tracks every listener this tracker installed so teardown can reverse
/// them exactly.
pub struct FaultSourceRegistry {
    target: Arc<EventTarget>,
    registrations: Vec<Registration>,
    keys: HashSet<(EventType, usize)>,
    /// Legacy slot value before chaining; `Some(None)` means it was never set.
    saved_legacy: Option<Option<LegacyHandler>>,
    debug: bool,
}

impl FaultSourceRegistry {
    pub fn new(target: Arc<EventTarget>, debug: bool) -> Self {
        Self {
            target,
            registrations: Vec::new(),
            keys: HashSet::new(),
            saved_legacy: None,
            debug,
        }
    }

    /// Register `handler` for `event_type`.
    ///
    /// A second registration of the same handler for the same type is a
    /// no-op. Returns whether the handler was newly installed.
    pub fn register(&mut self, event_type: EventType, handler: Listener, options: ListenerOptions) -> bool {
        let key = (event_type, listener_id(&handler));
        if !self.keys.insert(key) {
            return false;
        }

        self.target.add_listener(event_type, handler.clone(), options);
        self.registrations.push(Registration {
            event_type,
            listener: handler,
            options,
        });
        if self.debug {
            debug!(?event_type, "Registered fault source");
        }
        true
    }

    /// Remove every registered listener. Returns how many were removed.
    pub fn unregister_all(&mut self) -> usize {
        let count = self.registrations.len();
        for reg in self.registrations.drain(..) {
            self.target
                .remove_listener(reg.event_type, &reg.listener, reg.options);
        }
        self.keys.clear();
        count
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Wrap the host's legacy error slot so any existing handler keeps
    /// running. Capture itself goes through the listener channel.
    pub fn chain_legacy_handler(&mut self) {
        if self.saved_legacy.is_some() {
            return;
        }

        let previous = self.target.legacy_handler();
        let chained = previous.clone();
        let debug = self.debug;
        let wrapper: LegacyHandler = Arc::new(move |event| {
            if let Some(handler) = &chained {
                guarded(debug, "legacy", || handler(event));
            }
        });

        self.target.set_legacy_handler(Some(wrapper));
        self.saved_legacy = Some(previous);
    }

    /// Put the legacy slot back to its exact pre-chaining value.
    pub fn restore_legacy_handler(&mut self) {
        if let Some(previous) = self.saved_legacy.take() {
            self.target.set_legacy_handler(previous);
        }
    }
}

impl Drop for FaultSourceRegistry {
    fn drop(&mut self) {
        self.restore_legacy_handler();
        self.unregister_all();
    }
}
