//! Outbox for reliable fault delivery.
//!
//! This crate provides:
//! - ErrorQueue: bounded, optionally deduplicating queue mirrored to a durable store
//! - DurableStore: host key/value persistence (in-memory and SQLite backends)
//! - Transport: single-POST HTTP delivery with configurable headers
//! - RetryController: exponential backoff with a retry ceiling

mod error;
mod queue;
mod retry;
mod store;
mod transport;

pub use error::{OutboxError, OutboxResult};
pub use queue::{ErrorQueue, PushOutcome};
pub use retry::{backoff_delay, RetryController, RetryDecision, RetryPolicy, MAX_RETRY_DELAY};
pub use store::{DurableStore, MemoryStore, QueueStore, SqliteStore, PERSIST_KEY};
pub use transport::{
    build_headers, canonical_header_name, HeaderSet, HttpClient, ReqwestClient, Transport,
    TransportConfig,
};
