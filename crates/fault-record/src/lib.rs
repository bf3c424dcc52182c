//! Fault record model for the fault tracker.
//!
//! This crate provides:
//! - FaultRecord: one captured fault, immutable once queued
//! - UserActionSnapshot: the most recent user interaction, copied into records
//! - Fingerprinting used for queue deduplication
//! - Field trimming with an explicit truncation marker

mod fingerprint;
mod record;
mod trim;

pub use fingerprint::fingerprint;
pub use record::{
    ElementInfo, FaultKind, FaultRecord, RawFault, RecordContext, UserActionSnapshot,
};
pub use trim::{trim_field, trim_optional, DEFAULT_MAX_FIELD_LEN, TRIM_MARKER, USER_ACTION_TEXT_MAX};
