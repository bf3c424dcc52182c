//! Capabilities the host hands the tracker at init.

use crate::events::EventTarget;
use fault_outbox::{DurableStore, HttpClient};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Ambient page information copied into every record.
pub trait HostContext: Send + Sync {
    fn page_url(&self) -> String;
    fn user_agent(&self) -> String;
}

/// Fixed context values.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    pub page_url: String,
    pub user_agent: String,
}

impl StaticContext {
    pub fn new(page_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            user_agent: user_agent.into(),
        }
    }
}

impl HostContext for StaticContext {
    fn page_url(&self) -> String {
        self.page_url.clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }
}

/// The host environment a tracker runs in.
///
/// Every capability except the runtime is optional. Without `http` every
/// send fails and goes through retry. Without `store` the queue only lives in
/// memory. Without `events` only manual captures are recorded.
#[derive(Clone)]
pub struct Host {
    pub(crate) runtime: Handle,
    pub(crate) http: Option<Arc<dyn HttpClient>>,
    pub(crate) store: Option<Arc<dyn DurableStore>>,
    pub(crate) events: Option<Arc<EventTarget>>,
    pub(crate) context: Arc<dyn HostContext>,
}

impl Host {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            http: None,
            store: None,
            events: None,
            context: Arc::new(StaticContext::default()),
        }
    }

    /// Host bound to the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, events: Arc<EventTarget>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_context(mut self, context: Arc<dyn HostContext>) -> Self {
        self.context = context;
        self
    }
}
