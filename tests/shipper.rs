use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_log_shipper::{
    DeliveryItem, DispatchError, Dispatcher, Level, LogRecord, Metadata, Options, Payload,
    Shipper, ShipperError, TransportKind,
};

#[derive(Default)]
struct Collector {
    items: Mutex<Vec<DeliveryItem>>,
    base_urls: Mutex<Vec<String>>,
    probes: AtomicUsize,
}

#[async_trait]
impl Dispatcher for Collector {
    async fn send(&self, item: &DeliveryItem) -> Result<(), DispatchError> {
        self.items.lock().push(item.clone());
        Ok(())
    }

    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn set_base_url(&self, base_url: &str) {
        self.base_urls.lock().push(base_url.to_string());
    }
}

fn options() -> Options {
    Options::new()
        .transport(TransportKind::Console, false)
        .default_target("project-1")
        .rate_limit(0)
}

fn shipper(options: Options) -> (Shipper, Arc<Collector>) {
    let collector = Arc::new(Collector::default());
    let shipper = Shipper::with_dispatcher(options, collector.clone()).unwrap();
    (shipper, collector)
}

#[tokio::test]
async fn standard_payload_reaches_the_collector() {
    let (shipper, collector) = shipper(
        options().default_metadata(Metadata::new().with_service("billing").with_ip("")),
    );

    shipper
        .error(
            LogRecord::new("payment failed")
                .with_tags(["stripe"])
                .with_metadata(Metadata::new().with_user("u-7"))
                .with_field("order_id", 991)
                .with_timestamp("2024-05-01T10:00:00.000Z"),
        )
        .unwrap();
    shipper.wait_for_delivery_queue().await;

    let items = collector.items.lock();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].target, "project-1");
    assert_eq!(
        Value::Object(items[0].payload.clone()),
        json!({
            "level": "ERROR",
            "message": "payment failed",
            "tags": ["stripe"],
            "timestamp": "2024-05-01T10:00:00.000Z",
            "metadata": { "ip": "unknown", "service": "billing", "user": "u-7" },
            "order_id": 991
        })
    );
}

#[tokio::test]
async fn disabled_level_never_reaches_the_template() {
    let renders = Arc::new(AtomicUsize::new(0));
    let counter = renders.clone();
    let (shipper, collector) = shipper(
        options()
            .template("counting", move |level: Level, record: &LogRecord| {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut payload = Payload::new();
                payload.insert("lvl".into(), level.as_str().into());
                payload.insert("msg".into(), record.message.clone().into());
                payload
            })
            .active_template("counting"),
    );

    shipper.set_level_enabled(Level::Debug, false);
    shipper.debug("hidden").unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    shipper.info("shown").unwrap();
    shipper.wait_for_delivery_queue().await;

    assert_eq!(renders.load(Ordering::SeqCst), 1);
    let items = collector.items.lock();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].payload["lvl"], "INFO");
    assert_eq!(items[0].payload["msg"], "shown");
}

#[tokio::test]
async fn per_record_template_and_target_override_defaults() {
    let (shipper, collector) = shipper(options().template(
        "bare",
        |_: Level, record: &LogRecord| {
            let mut payload = Payload::new();
            payload.insert("text".into(), record.message.clone().into());
            payload
        },
    ));

    shipper
        .warning(LogRecord::new("one").with_template("bare").with_target("project-2"))
        .unwrap();
    shipper.warning("two").unwrap();
    shipper.wait_for_delivery_queue().await;

    let items = collector.items.lock();
    assert_eq!(items[0].target, "project-2");
    assert_eq!(Value::Object(items[0].payload.clone()), json!({ "text": "one" }));
    assert_eq!(items[1].target, "project-1");
    assert_eq!(items[1].payload["level"], "WARNING");
    assert_eq!(shipper.active_template(), "default");
}

#[tokio::test]
async fn unknown_template_is_an_error_and_nothing_is_sent() {
    let (shipper, collector) = shipper(options());

    let err = shipper
        .critical(LogRecord::new("x").with_template("missing"))
        .unwrap_err();
    assert!(matches!(err, ShipperError::TemplateNotFound(ref name) if name == "missing"));
    assert!(shipper.set_active_template("missing").is_err());

    shipper.wait_for_delivery_queue().await;
    assert!(collector.items.lock().is_empty());
    assert_eq!(shipper.delivery_status().pending, 0);
}

#[tokio::test]
async fn new_collector_url_is_probed_again() {
    let (shipper, collector) = shipper(options().collector_url("http://first:3000"));

    shipper.info("a").unwrap();
    shipper.wait_for_delivery_queue().await;
    assert_eq!(collector.probes.load(Ordering::SeqCst), 1);

    shipper
        .configure(Options::new().collector_url("http://second:3000"))
        .unwrap();
    shipper.info("b").unwrap();
    shipper.wait_for_delivery_queue().await;

    assert_eq!(collector.probes.load(Ordering::SeqCst), 2);
    assert_eq!(
        collector.base_urls.lock().last().map(String::as_str),
        Some("http://second:3000")
    );

    // same URL again does not reset availability
    shipper
        .configure(Options::new().collector_url("http://second:3000"))
        .unwrap();
    shipper.info("c").unwrap();
    shipper.wait_for_delivery_queue().await;
    assert_eq!(collector.probes.load(Ordering::SeqCst), 2);
    assert_eq!(collector.items.lock().len(), 3);
}

#[tokio::test]
async fn console_renderer_follows_its_transport_flag() {
    let lines = Arc::new(AtomicUsize::new(0));
    let counter = lines.clone();
    let (shipper, _collector) = shipper(
        options()
            .transport(TransportKind::Remote, false)
            .transport(TransportKind::Console, true)
            .console(move |level, record| {
                counter.fetch_add(1, Ordering::SeqCst);
                format!("{} {}", level, record.message)
            }),
    );

    shipper.info("printed").unwrap();
    shipper.set_transport_enabled(TransportKind::Console, false);
    shipper.info("silent").unwrap();

    assert_eq!(lines.load(Ordering::SeqCst), 1);
    assert!(!shipper.is_transport_enabled(TransportKind::Console));
}

#[tokio::test]
async fn remote_toggle_and_rate_limit_are_reflected_in_status() {
    let (shipper, collector) = shipper(options().rate_limit(6));

    shipper.info("queued").unwrap();
    shipper.info("queued too").unwrap();
    let status = shipper.delivery_status();
    assert_eq!(status.pending, 2);
    assert_eq!(status.rate_per_minute, 6);
    assert_eq!(status.estimated_ms, 20_000);

    shipper.set_transport_enabled(TransportKind::Remote, false);
    shipper.set_rate_limit(30);
    let status = shipper.delivery_status();
    assert_eq!(status.pending, 0);
    assert_eq!(status.rate_per_minute, 30);

    shipper.info("not queued").unwrap();
    assert_eq!(shipper.delivery_status().pending, 0);
    assert!(collector.items.lock().is_empty());
}

#[cfg(feature = "http")]
#[tokio::test]
async fn caller_built_collector_keeps_its_address() {
    use tracing_log_shipper::{HttpCollector, HttpCollectorConfig};

    let collector = Arc::new(
        HttpCollector::new(HttpCollectorConfig {
            base_url: "http://prod-collector:9000/".to_string(),
            timeout: None,
        })
        .unwrap(),
    );
    let shipper = Shipper::with_dispatcher(options(), collector.clone()).unwrap();
    assert_eq!(collector.base_url(), "http://prod-collector:9000");

    // an address given explicitly, even the default one, is applied
    shipper
        .configure(Options::new().collector_url("http://localhost:3000"))
        .unwrap();
    assert_eq!(collector.base_url(), "http://localhost:3000");
}

#[tokio::test]
async fn dispatcher_address_untouched_without_collector_url() {
    let (_shipper, collector) = shipper(options());
    assert!(collector.base_urls.lock().is_empty());
}
