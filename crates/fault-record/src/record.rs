//! Fault record types.

use crate::trim::{trim_field, trim_optional, DEFAULT_MAX_FIELD_LEN, USER_ACTION_TEXT_MAX};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Category of a captured fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    /// Uncaught script fault.
    Runtime,
    /// Resource that failed to load.
    Resource,
    /// Unhandled asynchronous rejection.
    Rejection,
    /// Reported explicitly by the host.
    Manual,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Runtime => "runtime",
            FaultKind::Resource => "resource",
            FaultKind::Rejection => "rejection",
            FaultKind::Manual => "manual",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FaultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "runtime" => Ok(FaultKind::Runtime),
            "resource" => Ok(FaultKind::Resource),
            "rejection" => Ok(FaultKind::Rejection),
            "manual" => Ok(FaultKind::Manual),
            other => Err(format!("unknown fault kind: {}", other)),
        }
    }
}

/// Element that received a user interaction, as described by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    pub tag_name: String,
    pub id: Option<String>,
    pub class_name: Option<String>,
    pub text_content: Option<String>,
}

/// The most recent primary pointer interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionSnapshot {
    /// Upper-cased tag name.
    pub tag: String,
    pub id: Option<String>,
    pub class_list: Option<String>,
    /// Text content, trimmed to [`USER_ACTION_TEXT_MAX`] characters.
    pub text: String,
}

impl UserActionSnapshot {
    /// Snapshot an interaction target.
    ///
    /// Empty id and class strings are treated as absent.
    pub fn from_element(element: &ElementInfo) -> Self {
        Self {
            tag: element.tag_name.to_uppercase(),
            id: element.id.clone().filter(|s| !s.is_empty()),
            class_list: element.class_name.clone().filter(|s| !s.is_empty()),
            text: trim_field(
                element.text_content.as_deref().unwrap_or(""),
                USER_ACTION_TEXT_MAX,
            ),
        }
    }

    /// Copy with every field bounded to `max` characters.
    pub fn bounded(&self, max: usize) -> Self {
        Self {
            tag: trim_field(&self.tag, max),
            id: trim_optional(self.id.as_deref(), max),
            class_list: trim_optional(self.class_list.as_deref(), max),
            text: trim_field(&self.text, max),
        }
    }
}

/// Fault data before the capture-time context is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFault {
    pub kind: FaultKind,
    pub message: String,
    pub stack: Option<String>,
    pub source_file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub extra: Option<serde_json::Value>,
}

impl RawFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
            source_file: None,
            line: None,
            column: None,
            extra: None,
        }
    }
}

/// Capture-time context copied into every record.
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub project: String,
    pub version: String,
    pub environment: String,
    pub page_url: String,
    pub user_agent: String,
    pub last_user_action: Option<UserActionSnapshot>,
    /// Maximum characters kept per string field.
    pub max_field_len: usize,
}

impl Default for RecordContext {
    fn default() -> Self {
        Self {
            project: "default".to_string(),
            version: "1.0.0".to_string(),
            environment: "prod".to_string(),
            page_url: String::new(),
            user_agent: String::new(),
            last_user_action: None,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}

/// One captured fault queued for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRecord {
    pub kind: FaultKind,
    pub message: String,
    pub stack: Option<String>,
    pub source_file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub extra: Option<serde_json::Value>,
    pub project: String,
    pub version: String,
    pub environment: String,
    pub page_url: String,
    pub user_agent: String,
    pub captured_at_millis: i64,
    pub last_user_action: Option<UserActionSnapshot>,
}

impl FaultRecord {
    /// Build a record stamped with the current wall-clock time.
    pub fn build(raw: RawFault, ctx: &RecordContext) -> Self {
        Self::build_at(raw, ctx, Utc::now().timestamp_millis())
    }

    /// Build a record with an explicit capture time.
    ///
    /// Every string field is bounded to `ctx.max_field_len` here; the record
    /// is not modified afterwards.
    pub fn build_at(raw: RawFault, ctx: &RecordContext, captured_at_millis: i64) -> Self {
        let max = ctx.max_field_len;
        Self {
            kind: raw.kind,
            message: trim_field(&raw.message, max),
            stack: trim_optional(raw.stack.as_deref(), max).filter(|s| !s.is_empty()),
            source_file: trim_optional(raw.source_file.as_deref(), max),
            line: raw.line,
            column: raw.column,
            extra: raw.extra,
            project: trim_field(&ctx.project, max),
            version: trim_field(&ctx.version, max),
            environment: trim_field(&ctx.environment, max),
            page_url: trim_field(&ctx.page_url, max),
            user_agent: trim_field(&ctx.user_agent, max),
            captured_at_millis,
            last_user_action: ctx.last_user_action.as_ref().map(|s| s.bounded(max)),
        }
    }
}
