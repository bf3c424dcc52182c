//! # Fault Tracker
//!
//! Captures uncaught faults in a hosted application and delivers them to a
//! remote collector with at-least-once semantics.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐    ┌─────────────┐    ┌───────────┐    ┌───────────┐
//! │ EventTarget    │───▶│ ErrorQueue  │───▶│ Scheduler │───▶│ Transport │
//! │ (host faults)  │    │ + durable   │    │ debounce  │    │ POST JSON │
//! └────────────────┘    │   store     │    └─────▲─────┘    └─────┬─────┘
//!                       └──────▲──────┘          │ retry          │
//!                              └─────────────────┴────────────────┘
//!                                     restore on failure
//! ```
//!
//! - Faults are captured through listeners registered on the host
//!   [`EventTarget`], or reported manually with [`Tracker::capture_error`].
//! - Each capture restarts a single debounce timer, so bursts are delivered
//!   as one batch.
//! - Failed sends put the batch back in front of the queue and retry with
//!   exponential backoff until the retry ceiling, after which the queue stays
//!   persisted for the next process lifetime.
//!
//! ## Example
//!
//! ```ignore
//! use fault_tracker::{Host, Tracker, TrackerOptions};
//!
//! let tracker = Tracker::new();
//! tracker.init(
//!     TrackerOptions {
//!         report_url: Some("https://collector.example/errors".into()),
//!         ..Default::default()
//!     },
//!     Host::new(tokio::runtime::Handle::current()).with_http(http).with_store(store),
//! )?;
//!
//! tracker.capture_error("payment widget failed", Default::default());
//! ```

mod capture;
mod config;
mod error;
mod events;
mod host;
mod registry;
mod scheduler;
mod sources;
mod tracker;

pub use capture::{CaptureContext, ManualFault};
pub use config::{
    TrackerConfig, TrackerOptions, DEFAULT_BASE_RETRY_DELAY_MS, DEFAULT_DEBOUNCE_MS,
    DEFAULT_MAX_QUEUE, DEFAULT_MAX_RETRIES, MIN_DEBOUNCE_MS,
};
pub use error::{TrackerError, TrackerResult};
pub use events::{
    ErrorEvent, ErrorValue, EventTarget, EventType, HostEvent, LegacyHandler, Listener,
    ListenerOptions, PointerEvent, RejectionEvent, RejectionReason, ResourceTarget,
};
pub use host::{Host, HostContext, StaticContext};
pub use registry::FaultSourceRegistry;
pub use scheduler::DeliveryState;
pub use tracker::Tracker;

pub use fault_outbox::{
    DurableStore, HeaderSet, HttpClient, MemoryStore, OutboxError, OutboxResult, ReqwestClient,
    SqliteStore,
};
pub use fault_record::{ElementInfo, FaultKind, FaultRecord, UserActionSnapshot};
