//! Tracker configuration.
//!
//! [`TrackerOptions`] is what callers supply, every field optional.
//! [`TrackerConfig`] is the resolved, immutable form used for one lifetime.

use crate::error::{TrackerError, TrackerResult};
use fault_outbox::{HeaderSet, RetryPolicy, TransportConfig};
use fault_record::{RecordContext, DEFAULT_MAX_FIELD_LEN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
/// Shortest debounce window the scheduler will use.
pub const MIN_DEBOUNCE_MS: u64 = 50;
pub const DEFAULT_MAX_QUEUE: usize = 50;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_RETRY_DELAY_MS: u64 = 1000;

const DEFAULT_PROJECT: &str = "default";
const DEFAULT_VERSION: &str = "1.0.0";
const DEFAULT_ENVIRONMENT: &str = "prod";

const ENV_REPORT_URL: &str = "FAULT_TRACKER_REPORT_URL";
const ENV_DEBUG: &str = "FAULT_TRACKER_DEBUG";

/// User-supplied options. Unset fields take their defaults at resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerOptions {
    pub report_url: Option<String>,
    pub project: Option<String>,
    pub version: Option<String>,
    pub environment: Option<String>,
    /// Debounce window in milliseconds.
    pub debounce: Option<u64>,
    pub max_queue: Option<usize>,
    pub debug: Option<bool>,
    pub deduplicate: Option<bool>,
    pub fetch_headers: Option<HeaderSet>,
    pub fetch_headers_merge: Option<bool>,
    pub max_retries: Option<u32>,
    /// Base retry delay in milliseconds.
    pub base_retry_delay: Option<u64>,
    pub max_field_length: Option<usize>,
}

impl TrackerOptions {
    /// Load options from a JSON file.
    pub fn load_from_file(path: &Path) -> TrackerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let options = serde_json::from_str(&content)?;
        Ok(options)
    }

    /// Overlay options from environment variables.
    pub fn apply_env(mut self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok());
        self
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_REPORT_URL).filter(|v| !v.is_empty()) {
            self.report_url = Some(url);
        }
        if let Some(value) = lookup(ENV_DEBUG) {
            self.debug = Some(matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ));
        }
    }

    /// Fill unset fields from `other`.
    pub fn or(self, other: TrackerOptions) -> Self {
        Self {
            report_url: self.report_url.or(other.report_url),
            project: self.project.or(other.project),
            version: self.version.or(other.version),
            environment: self.environment.or(other.environment),
            debounce: self.debounce.or(other.debounce),
            max_queue: self.max_queue.or(other.max_queue),
            debug: self.debug.or(other.debug),
            deduplicate: self.deduplicate.or(other.deduplicate),
            fetch_headers: self.fetch_headers.or(other.fetch_headers),
            fetch_headers_merge: self.fetch_headers_merge.or(other.fetch_headers_merge),
            max_retries: self.max_retries.or(other.max_retries),
            base_retry_delay: self.base_retry_delay.or(other.base_retry_delay),
            max_field_length: self.max_field_length.or(other.max_field_length),
        }
    }
}

/// Resolved configuration, fixed for one init/destroy lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub report_url: String,
    pub project: String,
    pub version: String,
    pub environment: String,
    pub debounce: Duration,
    pub max_queue: usize,
    pub debug: bool,
    pub deduplicate: bool,
    pub fetch_headers: HeaderSet,
    pub fetch_headers_merge: bool,
    pub max_retries: u32,
    pub base_retry_delay: Duration,
    pub max_field_length: usize,
}

impl TrackerConfig {
    /// Merge `options` over the defaults.
    ///
    /// User headers are layered over `Content-Type: application/json`,
    /// matching names case-insensitively.
    pub fn resolve(options: TrackerOptions) -> TrackerResult<Self> {
        let report_url = options
            .report_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(TrackerError::MissingReportUrl)?;

        let mut fetch_headers = HeaderSet::new();
        fetch_headers.insert("Content-Type".to_string(), "application/json".to_string());
        for (name, value) in options.fetch_headers.unwrap_or_default() {
            fetch_headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
            fetch_headers.insert(name, value);
        }

        Ok(Self {
            report_url,
            project: options.project.unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            version: options.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            environment: options
                .environment
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            debounce: Duration::from_millis(options.debounce.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            max_queue: options.max_queue.unwrap_or(DEFAULT_MAX_QUEUE).max(1),
            debug: options.debug.unwrap_or(false),
            deduplicate: options.deduplicate.unwrap_or(false),
            fetch_headers,
            fetch_headers_merge: options.fetch_headers_merge.unwrap_or(true),
            max_retries: options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            base_retry_delay: Duration::from_millis(
                options.base_retry_delay.unwrap_or(DEFAULT_BASE_RETRY_DELAY_MS),
            ),
            max_field_length: options.max_field_length.unwrap_or(DEFAULT_MAX_FIELD_LEN),
        })
    }

    /// The debounce window actually used, never below [`MIN_DEBOUNCE_MS`].
    pub fn debounce_window(&self) -> Duration {
        self.debounce.max(Duration::from_millis(MIN_DEBOUNCE_MS))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.base_retry_delay,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            endpoint: self.report_url.clone(),
            headers: self.fetch_headers.clone(),
            merge_headers: self.fetch_headers_merge,
            debug: self.debug,
        }
    }

    pub(crate) fn record_context(&self, page_url: String, user_agent: String) -> RecordContext {
        RecordContext {
            project: self.project.clone(),
            version: self.version.clone(),
            environment: self.environment.clone(),
            page_url,
            user_agent,
            last_user_action: None,
            max_field_len: self.max_field_length,
        }
    }
}
