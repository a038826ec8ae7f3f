use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing_log_shipper::{DeliveryItem, DeliveryQueue, DispatchError, Dispatcher, Payload};

/// Records every delivery with the virtual time it happened at.
struct Recording {
    start: Instant,
    sent: Mutex<Vec<(Duration, String)>>,
    probes: AtomicUsize,
    available: AtomicBool,
}

impl Recording {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            sent: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        })
    }

    fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    fn times(&self) -> Vec<Duration> {
        self.sent.lock().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl Dispatcher for Recording {
    async fn send(&self, item: &DeliveryItem) -> Result<(), DispatchError> {
        let message = item.payload["message"].as_str().unwrap_or_default().to_string();
        if message.starts_with("bad") {
            return Err("collector rejected log".into());
        }
        self.sent.lock().push((self.start.elapsed(), message));
        Ok(())
    }

    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }
}

fn item(message: &str) -> DeliveryItem {
    let mut payload = Payload::new();
    payload.insert("message".into(), Value::from(message));
    DeliveryItem::new("project-1", payload)
}

fn queue(rate: i64, dispatcher: &Arc<Recording>) -> DeliveryQueue {
    DeliveryQueue::new(rate, dispatcher.clone(), Handle::current())
}

#[tokio::test(start_paused = true)]
async fn delivers_in_order_one_per_interval() {
    let dispatcher = Recording::new();
    let queue = queue(60, &dispatcher);

    for m in ["a", "b", "c"] {
        queue.enqueue(item(m));
    }
    queue.drain().await;

    assert_eq!(dispatcher.messages(), ["a", "b", "c"]);
    let times = dispatcher.times();
    assert!(times[0] >= Duration::from_secs(1));
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(1), "{:?}", times);
    }
    assert_eq!(queue.status().dispatched, 3);
    assert_eq!(dispatcher.probes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unlimited_rate_drains_without_waiting() {
    let dispatcher = Recording::new();
    let queue = queue(0, &dispatcher);

    for m in ["a", "b", "c", "d"] {
        queue.enqueue(item(m));
    }
    queue.drain().await;

    assert_eq!(dispatcher.messages(), ["a", "b", "c", "d"]);
    assert!(dispatcher
        .times()
        .iter()
        .all(|t| *t < Duration::from_millis(10)));
    assert_eq!(queue.status().rate_per_minute, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_probe_opens_breaker_until_reset() {
    let dispatcher = Recording::new();
    dispatcher.available.store(false, Ordering::SeqCst);
    let queue = queue(0, &dispatcher);

    for m in ["a", "b", "c"] {
        queue.enqueue(item(m));
    }
    queue.drain().await;

    let status = queue.status();
    assert_eq!(status.pending, 0);
    assert_eq!(status.dropped, 3);
    assert_eq!(status.dispatched, 0);

    // closed breaker: dropped on enqueue, no second probe
    queue.enqueue(item("d"));
    queue.drain().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(queue.status().dropped, 4);
    assert_eq!(dispatcher.probes.load(Ordering::SeqCst), 1);

    dispatcher.available.store(true, Ordering::SeqCst);
    queue.reset_availability();
    queue.enqueue(item("e"));
    queue.drain().await;

    assert_eq!(dispatcher.messages(), ["e"]);
    assert_eq!(dispatcher.probes.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_dispatch_is_dropped_and_queue_moves_on() {
    let dispatcher = Recording::new();
    let queue = queue(600, &dispatcher);

    for m in ["ok-1", "bad", "ok-2"] {
        queue.enqueue(item(m));
    }
    queue.drain().await;

    assert_eq!(dispatcher.messages(), ["ok-1", "ok-2"]);
    let status = queue.status();
    assert_eq!(status.failed, 1);
    assert_eq!(status.dispatched, 2);
}

#[tokio::test(start_paused = true)]
async fn status_estimates_wait_and_clear_discards() {
    let dispatcher = Recording::new();
    let queue = queue(120, &dispatcher);

    for m in ["a", "b", "c", "d"] {
        queue.enqueue(item(m));
    }
    let status = queue.status();
    assert_eq!(status.pending, 4);
    assert_eq!(status.estimated_ms, 2000);
    assert_eq!(status.rate_per_minute, 120);

    queue.clear();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(queue.status().pending, 0);
    assert!(dispatcher.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn raising_the_rate_restarts_the_schedule() {
    let dispatcher = Recording::new();
    let queue = queue(1, &dispatcher);

    queue.enqueue(item("a"));
    queue.enqueue(item("b"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(dispatcher.messages().is_empty());

    queue.update_rate_limit(-1);
    queue.drain().await;

    assert_eq!(dispatcher.messages(), ["a", "b"]);
    assert!(dispatcher.times().iter().all(|t| *t < Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn tick_stops_when_empty_and_restarts_on_enqueue() {
    let dispatcher = Recording::new();
    let queue = queue(60, &dispatcher);

    queue.enqueue(item("a"));
    queue.drain().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    queue.enqueue(item("b"));
    queue.drain().await;

    let times = dispatcher.times();
    assert_eq!(dispatcher.messages(), ["a", "b"]);
    assert!(times[1] - times[0] >= Duration::from_secs(31));
}

/// First health check hangs until released and then reports the collector
/// down; every later check reports it up.
struct SlowFirstHealthCheck {
    release: tokio::sync::Notify,
    probes: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Dispatcher for SlowFirstHealthCheck {
    async fn send(&self, item: &DeliveryItem) -> Result<(), DispatchError> {
        let message = item.payload["message"].as_str().unwrap_or_default();
        self.sent.lock().push(message.to_string());
        Ok(())
    }

    async fn probe(&self) -> bool {
        if self.probes.fetch_add(1, Ordering::SeqCst) == 0 {
            self.release.notified().await;
            return false;
        }
        true
    }
}

#[tokio::test(start_paused = true)]
async fn reset_during_health_check_discards_its_result() {
    let dispatcher = Arc::new(SlowFirstHealthCheck {
        release: tokio::sync::Notify::new(),
        probes: AtomicUsize::new(0),
        sent: Mutex::new(Vec::new()),
    });
    let queue = DeliveryQueue::new(0, dispatcher.clone(), Handle::current());

    queue.enqueue(item("a"));
    while dispatcher.probes.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    queue.reset_availability();
    dispatcher.release.notify_one();
    queue.drain().await;

    assert_eq!(dispatcher.probes.load(Ordering::SeqCst), 2);
    assert_eq!(*dispatcher.sent.lock(), ["a"]);
    let status = queue.status();
    assert_eq!(status.dispatched, 1);
    assert_eq!(status.dropped, 0);

    // the fresh result is cached
    queue.enqueue(item("b"));
    queue.drain().await;
    assert_eq!(dispatcher.probes.load(Ordering::SeqCst), 2);
}
