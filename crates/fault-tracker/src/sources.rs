//! Classification of host events into fault data.

use crate::events::{ErrorEvent, PointerEvent, RejectionEvent, RejectionReason};
use fault_record::{FaultKind, RawFault, UserActionSnapshot};
use serde_json::json;

const RESOURCE_MESSAGE: &str = "resource error";
const REJECTION_FALLBACK: &str = "unhandledrejection";

/// Turn an error event into fault data.
///
/// Events whose target carries a source URL are resource-load failures.
/// Events carrying an error object are script faults. Anything else is
/// ignored.
pub(crate) fn classify_error_event(event: &ErrorEvent) -> Option<RawFault> {
    if let Some(target) = &event.target {
        if let Some(url) = target.url() {
            return Some(RawFault {
                source_file: Some(url.to_string()),
                extra: Some(json!({ "tag": target.tag_name })),
                ..RawFault::new(FaultKind::Resource, RESOURCE_MESSAGE)
            });
        }
    }

    let error = event.error.as_ref()?;
    let message = if event.message.is_empty() {
        error.message.clone().unwrap_or_default()
    } else {
        event.message.clone()
    };

    Some(RawFault {
        stack: error.stack.clone(),
        source_file: event.filename.clone(),
        line: event.lineno,
        column: event.colno,
        ..RawFault::new(FaultKind::Runtime, message)
    })
}

/// Turn an unhandled rejection into fault data.
pub(crate) fn classify_rejection(event: &RejectionEvent) -> RawFault {
    match &event.reason {
        Some(RejectionReason::Error(error)) => RawFault {
            stack: error.stack.clone(),
            ..RawFault::new(
                FaultKind::Rejection,
                error
                    .message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Error".to_string()),
            )
        },
        Some(RejectionReason::Value(value)) => {
            RawFault::new(FaultKind::Rejection, stringify_reason(value))
        }
        None => RawFault::new(FaultKind::Rejection, REJECTION_FALLBACK),
    }
}

fn stringify_reason(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => REJECTION_FALLBACK.to_string(),
        serde_json::Value::String(s) if s.is_empty() => REJECTION_FALLBACK.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Snapshot a primary-button interaction.
pub(crate) fn user_action(event: &PointerEvent) -> Option<UserActionSnapshot> {
    if !event.is_primary() {
        return None;
    }
    event.target.as_ref().map(UserActionSnapshot::from_element)
}
