//! Host global fault channels.
//!
//! [`EventTarget`] models the host's global event surface: a multi-listener
//! channel keyed by [`EventType`], plus a legacy single-slot error handler
//! that hosts commonly install directly.

use fault_record::ElementInfo;
use parking_lot::Mutex;
use std::sync::Arc;

/// Channels a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Script faults and resource-load failures.
    Error,
    /// Asynchronous rejections nobody handled.
    UnhandledRejection,
    /// Pointer interactions.
    Click,
}

/// Error object attached to a fault or rejection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorValue {
    pub message: Option<String>,
    pub stack: Option<String>,
}

/// Element whose load failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTarget {
    pub tag_name: String,
    pub src: Option<String>,
    pub href: Option<String>,
}

impl ResourceTarget {
    /// The URL that failed to load, if any.
    pub fn url(&self) -> Option<&str> {
        self.src
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.href.as_deref().filter(|s| !s.is_empty()))
    }
}

/// A runtime fault or resource failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorEvent {
    pub message: String,
    pub filename: Option<String>,
    pub lineno: Option<u32>,
    pub colno: Option<u32>,
    /// Present for script faults.
    pub error: Option<ErrorValue>,
    /// Present for resource-load failures.
    pub target: Option<ResourceTarget>,
}

/// Why an asynchronous operation was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    Error(ErrorValue),
    Value(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RejectionEvent {
    pub reason: Option<RejectionReason>,
}

/// A pointer interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointerEvent {
    /// 0 is the primary button.
    pub button: u16,
    pub target: Option<ElementInfo>,
}

impl PointerEvent {
    pub fn is_primary(&self) -> bool {
        self.button == 0
    }
}

/// Event dispatched through an [`EventTarget`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Error(ErrorEvent),
    UnhandledRejection(RejectionEvent),
    Click(PointerEvent),
}

impl HostEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            HostEvent::Error(_) => EventType::Error,
            HostEvent::UnhandledRejection(_) => EventType::UnhandledRejection,
            HostEvent::Click(_) => EventType::Click,
        }
    }
}

/// Multi-listener callback. Identity is the `Arc` allocation.
pub type Listener = Arc<dyn Fn(&HostEvent) + Send + Sync>;

/// Legacy single-slot error handler.
pub type LegacyHandler = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Run before non-capture listeners.
    pub capture: bool,
}

/// Address of a listener's allocation, used as its identity.
pub(crate) fn listener_id(listener: &Listener) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

struct Entry {
    event_type: EventType,
    listener: Listener,
    options: ListenerOptions,
}

/// The host's global fault surface.
#[derive(Default)]
pub struct EventTarget {
    listeners: Mutex<Vec<Entry>>,
    legacy: Mutex<Option<LegacyHandler>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Re-adding the same listener with the same type and
    /// capture flag is a no-op.
    pub fn add_listener(&self, event_type: EventType, listener: Listener, options: ListenerOptions) {
        let id = listener_id(&listener);
        let mut listeners = self.listeners.lock();
        let exists = listeners.iter().any(|e| {
            e.event_type == event_type
                && e.options.capture == options.capture
                && listener_id(&e.listener) == id
        });
        if !exists {
            listeners.push(Entry {
                event_type,
                listener,
                options,
            });
        }
    }

    /// Remove a listener, returning whether it was registered.
    pub fn remove_listener(
        &self,
        event_type: EventType,
        listener: &Listener,
        options: ListenerOptions,
    ) -> bool {
        let id = listener_id(listener);
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|e| {
            !(e.event_type == event_type
                && e.options.capture == options.capture
                && listener_id(&e.listener) == id)
        });
        listeners.len() != before
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn legacy_handler(&self) -> Option<LegacyHandler> {
        self.legacy.lock().clone()
    }

    pub fn set_legacy_handler(&self, handler: Option<LegacyHandler>) {
        *self.legacy.lock() = handler;
    }

    /// Deliver an event to its listeners, capture listeners first.
    ///
    /// Error events are also handed to the legacy slot afterwards. No lock is
    /// held while callbacks run, so listeners may add or remove listeners.
    pub fn dispatch(&self, event: &HostEvent) {
        let event_type = event.event_type();
        let mut targets: Vec<(bool, Listener)> = self
            .listeners
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .map(|e| (e.options.capture, e.listener.clone()))
            .collect();
        // Stable sort keeps registration order within each phase.
        targets.sort_by_key(|(capture, _)| !*capture);

        for (_, listener) in targets {
            listener(event);
        }

        if let HostEvent::Error(error) = event {
            if let Some(handler) = self.legacy_handler() {
                handler(error);
            }
        }
    }
}
