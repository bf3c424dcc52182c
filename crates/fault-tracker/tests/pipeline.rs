//! End-to-end capture and delivery scenarios.

use async_trait::async_trait;
use fault_outbox::PERSIST_KEY;
use fault_tracker::{
    DeliveryState, DurableStore, ElementInfo, ErrorEvent, ErrorValue, EventTarget, EventType,
    FaultKind, FaultRecord, HeaderSet, Host, HostEvent, HttpClient, LegacyHandler, MemoryStore,
    OutboxResult, PointerEvent, RejectionEvent, RejectionReason, ResourceTarget, SqliteStore,
    StaticContext, Tracker, TrackerError, TrackerOptions,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct RecordingClient {
    status: u16,
    batches: Mutex<Vec<Vec<FaultRecord>>>,
}

impl RecordingClient {
    fn new(status: u16) -> Arc<Self> {
        Arc::new(Self {
            status,
            batches: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> usize {
        self.batches.lock().len()
    }

    fn messages(&self, attempt: usize) -> Vec<String> {
        self.batches.lock()[attempt]
            .iter()
            .map(|r| r.message.clone())
            .collect()
    }
}

#[async_trait]
impl HttpClient for RecordingClient {
    async fn post(&self, _url: &str, _headers: &HeaderSet, body: Vec<u8>) -> OutboxResult<u16> {
        let batch: Vec<FaultRecord> = serde_json::from_slice(&body)?;
        self.batches.lock().push(batch);
        Ok(self.status)
    }
}

fn options() -> TrackerOptions {
    TrackerOptions {
        report_url: Some("https://collector.test/errors".into()),
        ..Default::default()
    }
}

fn host(client: &Arc<RecordingClient>, store: &Arc<MemoryStore>) -> Host {
    Host::current()
        .with_http(client.clone())
        .with_store(store.clone())
        .with_context(Arc::new(StaticContext::new("https://app.test/", "agent/1.0")))
}

fn persisted(store: &dyn DurableStore) -> Option<Vec<FaultRecord>> {
    store
        .get(PERSIST_KEY)
        .unwrap()
        .map(|json| serde_json::from_str(&json).unwrap())
}

#[tokio::test(start_paused = true)]
async fn burst_is_delivered_as_one_ordered_batch() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker.init(options(), host(&client, &store)).unwrap();

    for i in 0..5 {
        tracker.capture_error(format!("fault {i}"), Default::default());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(client.attempts(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.attempts(), 1);
    assert_eq!(
        client.messages(0),
        vec!["fault 0", "fault 1", "fault 2", "fault 3", "fault 4"]
    );
}

#[tokio::test(start_paused = true)]
async fn dedup_then_overflow_keeps_newest() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker
        .init(
            TrackerOptions {
                max_queue: Some(2),
                deduplicate: Some(true),
                ..options()
            },
            host(&client, &store),
        )
        .unwrap();

    for message in ["A", "A", "B", "C"] {
        tracker.capture_error(message, Default::default());
    }

    let queued: Vec<String> = tracker
        .queue_snapshot()
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert_eq!(queued, vec!["B", "C"]);
    assert_eq!(persisted(store.as_ref()).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_faults_are_kept_by_default() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker.init(options(), host(&client, &store)).unwrap();
    assert!(!tracker.config().unwrap().deduplicate);

    tracker.capture_error("A", Default::default());
    tracker.capture_error("A", Default::default());
    assert_eq!(tracker.queue_snapshot().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_ceiling_stops_after_three_attempts() {
    let client = RecordingClient::new(500);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker
        .init(
            TrackerOptions {
                max_retries: Some(2),
                base_retry_delay: Some(100),
                ..options()
            },
            host(&client, &store),
        )
        .unwrap();

    tracker.capture_error("unreachable collector", Default::default());

    // Debounce at 200ms, retries 100ms and 200ms later.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(client.attempts(), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.attempts(), 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.attempts(), 3);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(client.attempts(), 3);
    assert_eq!(tracker.delivery_state(), DeliveryState::Idle);
    assert_eq!(tracker.queue_snapshot().len(), 1);

    let saved = persisted(store.as_ref()).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].message, "unreachable collector");
}

#[tokio::test(start_paused = true)]
async fn new_capture_after_exhaustion_restarts_cycle() {
    let client = RecordingClient::new(500);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker
        .init(
            TrackerOptions {
                max_retries: Some(0),
                ..options()
            },
            host(&client, &store),
        )
        .unwrap();

    tracker.capture_error("first", Default::default());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.attempts(), 1);

    tracker.capture_error("second", Default::default());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.attempts(), 2);
    assert_eq!(client.messages(1), vec!["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn missing_transport_goes_through_retry() {
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker
        .init(
            TrackerOptions {
                max_retries: Some(1),
                base_retry_delay: Some(100),
                ..options()
            },
            Host::current().with_store(store.clone()),
        )
        .unwrap();

    tracker.capture_error("offline", Default::default());
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(tracker.retry_count(), 1);
    assert_eq!(tracker.delivery_state(), DeliveryState::BackingOff);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(tracker.retry_count(), 2);
    assert_eq!(persisted(store.as_ref()).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn success_clears_queue_and_durable_copy() {
    let client = RecordingClient::new(204);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker.init(options(), host(&client, &store)).unwrap();

    tracker.capture_error("delivered", Default::default());
    assert!(persisted(store.as_ref()).is_some());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.attempts(), 1);
    assert!(tracker.queue_snapshot().is_empty());
    assert!(persisted(store.as_ref()).is_none());

    tracker.destroy();
    tracker.init(options(), host(&client, &store)).unwrap();
    assert!(tracker.queue_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn destroy_then_capture_is_noop() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker.init(options(), host(&client, &store)).unwrap();

    tracker.capture_error("pending", Default::default());
    assert!(tracker.destroy());
    assert!(!tracker.destroy());
    assert!(persisted(store.as_ref()).is_none());

    tracker.capture_error("after destroy", Default::default());
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(tracker.queue_snapshot().is_empty());
    assert_eq!(client.attempts(), 0);
    assert_eq!(tracker.delivery_state(), DeliveryState::Idle);
}

#[tokio::test(start_paused = true)]
async fn persisted_queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.sqlite");
    let client = RecordingClient::new(200);

    {
        let tracker = Tracker::new();
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        tracker
            .init(options(), Host::current().with_http(client.clone()).with_store(store))
            .unwrap();
        tracker.capture_error("before restart", Default::default());
    }
    assert_eq!(client.attempts(), 0);

    let tracker = Tracker::new();
    let store = Arc::new(SqliteStore::open(&path).unwrap());
    tracker
        .init(
            options(),
            Host::current().with_http(client.clone()).with_store(store),
        )
        .unwrap();
    assert_eq!(tracker.queue_snapshot().len(), 1);

    tracker.capture_error("after restart", Default::default());
    let result = tracker.flush().await;
    assert!(matches!(result, Some(Ok(200))));
    assert_eq!(client.messages(0), vec!["before restart", "after restart"]);
}

#[tokio::test(start_paused = true)]
async fn missing_report_url_leaves_tracker_inert() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();

    let result = tracker.init(TrackerOptions::default(), host(&client, &store));
    assert!(matches!(result, Err(TrackerError::MissingReportUrl)));
    assert!(!tracker.is_initialized());

    tracker.capture_error("ignored", Default::default());
    tracker.flush_now();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(client.attempts(), 0);
    assert!(tracker.queue_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn double_init_keeps_first_configuration() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let tracker = Tracker::new();
    tracker
        .init(
            TrackerOptions {
                project: Some("first".into()),
                ..options()
            },
            host(&client, &store),
        )
        .unwrap();

    let second = tracker.init(
        TrackerOptions {
            project: Some("second".into()),
            ..options()
        },
        host(&client, &store),
    );
    assert!(matches!(second, Err(TrackerError::AlreadyInitialized)));
    assert_eq!(tracker.config().unwrap().project, "first");
}

#[tokio::test(start_paused = true)]
async fn host_faults_are_classified_and_queued() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventTarget::new());
    let tracker = Tracker::new();
    tracker
        .init(options(), host(&client, &store).with_events(events.clone()))
        .unwrap();

    events.dispatch(&HostEvent::Error(ErrorEvent {
        message: "x is undefined".into(),
        filename: Some("https://app.test/main.js".into()),
        lineno: Some(3),
        colno: Some(7),
        error: Some(ErrorValue {
            message: Some("x is undefined".into()),
            stack: Some("at main.js:3:7".into()),
        }),
        target: None,
    }));
    events.dispatch(&HostEvent::Error(ErrorEvent {
        target: Some(ResourceTarget {
            tag_name: "SCRIPT".into(),
            src: Some("https://cdn.test/lib.js".into()),
            href: None,
        }),
        ..Default::default()
    }));
    events.dispatch(&HostEvent::UnhandledRejection(RejectionEvent {
        reason: Some(RejectionReason::Value(serde_json::json!("timeout"))),
    }));

    let queued = tracker.queue_snapshot();
    let kinds: Vec<FaultKind> = queued.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![FaultKind::Runtime, FaultKind::Resource, FaultKind::Rejection]
    );
    assert_eq!(queued[0].line, Some(3));
    assert_eq!(queued[1].source_file.as_deref(), Some("https://cdn.test/lib.js"));
    assert_eq!(queued[2].message, "timeout");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.attempts(), 1);
    assert_eq!(client.batches.lock()[0].len(), 3);
}

#[tokio::test(start_paused = true)]
async fn last_click_is_attached_to_records() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventTarget::new());
    let tracker = Tracker::new();
    tracker
        .init(options(), host(&client, &store).with_events(events.clone()))
        .unwrap();

    let button = |id: &str| ElementInfo {
        tag_name: "button".into(),
        id: Some(id.into()),
        class_name: Some("btn primary".into()),
        text_content: Some("Submit order".into()),
    };
    events.dispatch(&HostEvent::Click(PointerEvent {
        button: 0,
        target: Some(button("submit")),
    }));
    events.dispatch(&HostEvent::Click(PointerEvent {
        button: 2,
        target: Some(button("context-menu")),
    }));

    tracker.capture_error("submit failed", Default::default());

    let action = tracker.queue_snapshot()[0].last_user_action.clone().unwrap();
    assert_eq!(action.tag, "BUTTON");
    assert_eq!(action.id.as_deref(), Some("submit"));
    assert_eq!(action.class_list.as_deref(), Some("btn primary"));
    assert_eq!(action.text, "Submit order");
}

#[tokio::test(start_paused = true)]
async fn legacy_handler_is_chained_and_restored() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventTarget::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let original: LegacyHandler = Arc::new(move |_: &ErrorEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    events.set_legacy_handler(Some(original.clone()));

    let tracker = Tracker::new();
    tracker
        .init(options(), host(&client, &store).with_events(events.clone()))
        .unwrap();
    assert!(!Arc::ptr_eq(&events.legacy_handler().unwrap(), &original));

    events.dispatch(&HostEvent::Error(ErrorEvent {
        message: "boom".into(),
        error: Some(ErrorValue::default()),
        ..Default::default()
    }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.queue_snapshot().len(), 1);

    tracker.destroy();
    assert!(Arc::ptr_eq(&events.legacy_handler().unwrap(), &original));
}

#[tokio::test(start_paused = true)]
async fn unset_legacy_slot_is_restored_unset() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventTarget::new());

    let tracker = Tracker::new();
    tracker
        .init(options(), host(&client, &store).with_events(events.clone()))
        .unwrap();
    assert!(events.legacy_handler().is_some());

    tracker.destroy();
    assert!(events.legacy_handler().is_none());
}

#[tokio::test(start_paused = true)]
async fn reinit_registers_each_source_once() {
    let client = RecordingClient::new(200);
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventTarget::new());
    let tracker = Tracker::new();

    for _ in 0..3 {
        tracker
            .init(options(), host(&client, &store).with_events(events.clone()))
            .unwrap();
        assert_eq!(events.listener_count(EventType::Error), 1);
        assert_eq!(events.listener_count(EventType::UnhandledRejection), 1);
        assert_eq!(events.listener_count(EventType::Click), 1);
        tracker.destroy();
    }

    assert_eq!(events.listener_count(EventType::Error), 0);
    events.dispatch(&HostEvent::Error(ErrorEvent {
        error: Some(ErrorValue::default()),
        ..Default::default()
    }));
    assert!(tracker.queue_snapshot().is_empty());
}
