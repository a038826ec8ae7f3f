//! Caller-facing entry point: level gating, templating and fan-out to the
//! console, the delivery queue and the journal queue.

use crate::config::{Config, ConsoleRenderer, LevelSwitches, Options, TransportKind};
use crate::delivery::{normalize_rate, DeliveryQueue, DeliveryStatus};
use crate::dispatch::{DeliveryItem, Dispatcher};
use crate::error::{Result, ShipperError};
use crate::journal::{JournalItem, JournalOptions, JournalQueue, JournalStatus};
use crate::record::{now_iso, Level, LogRecord, Metadata};
use crate::template::{ResolvedTemplate, Template, TemplateRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::warn;

struct State {
    config: Config,
    templates: TemplateRegistry,
    delivery: Option<Arc<DeliveryQueue>>,
    journal: Option<Arc<JournalQueue>>,
}

/// Where one record goes, captured under the lock and acted on after it.
struct Route {
    template: ResolvedTemplate,
    console: Option<ConsoleRenderer>,
    delivery: Option<Arc<DeliveryQueue>>,
    default_target: Option<String>,
    journal: Option<Arc<JournalQueue>>,
}

/// Telemetry client owned by the host application.
///
/// Create one per process and share it (`Arc<Shipper>`) with call sites.
/// `log` never blocks on I/O: delivery and journaling happen on the Tokio
/// runtime that was current when the shipper was created.
///
/// The delivery queue exists while the remote transport is enabled and the
/// journal queue while the journal transport is enabled. Disabling either
/// transport discards whatever that queue still holds.
pub struct Shipper {
    state: Mutex<State>,
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Handle,
}

impl Shipper {
    /// Create a shipper posting to the collector's HTTP API.
    #[cfg(feature = "http")]
    pub fn new(options: Options) -> Result<Self> {
        use crate::http::{HttpCollector, HttpCollectorConfig};

        let config = HttpCollectorConfig {
            base_url: options
                .collector_url
                .clone()
                .unwrap_or_else(|| crate::config::DEFAULT_COLLECTOR_URL.to_string()),
            timeout: None,
        };
        let collector = HttpCollector::new(config)
            .map_err(|e| ShipperError::config("collector_url", e.to_string()))?;
        Self::with_dispatcher(options, Arc::new(collector))
    }

    /// Create a shipper delivering through a custom [`Dispatcher`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_dispatcher(options: Options, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| ShipperError::NoRuntime(e.to_string()))?;
        let shipper = Self {
            state: Mutex::new(State {
                config: Config::default(),
                templates: TemplateRegistry::new(Metadata::new().with_ip("unknown")),
                delivery: None,
                journal: None,
            }),
            dispatcher,
            runtime,
        };
        shipper.configure(options)?;
        Ok(shipper)
    }

    /// Merge `options` into the live configuration.
    ///
    /// Fails without changing anything if `active_template` names a template
    /// that is neither registered nor part of `options`.
    pub fn configure(&self, options: Options) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(active) = &options.active_template {
            let known = state.templates.contains(active)
                || options.templates.iter().any(|(name, _)| name == active);
            if !known {
                return Err(ShipperError::TemplateNotFound(active.clone()));
            }
        }

        if let Some(url) = options.collector_url {
            if state.config.collector_url.as_deref() != Some(url.as_str()) {
                self.dispatcher.set_base_url(&url);
                state.config.collector_url = Some(url);
                if let Some(delivery) = &state.delivery {
                    delivery.reset_availability();
                }
            }
        }
        if let Some(rate) = options.rate_limit {
            state.config.rate_per_minute = normalize_rate(rate);
            if let Some(delivery) = &state.delivery {
                delivery.update_rate_limit(rate);
            }
        }
        if let Some(target) = options.default_target {
            state.config.default_target = Some(target);
        }
        if let Some(metadata) = options.default_metadata {
            state.templates.set_default_metadata(metadata);
        }
        if let Some(environment) = options.environment {
            state.config.levels = LevelSwitches::for_environment(Some(&environment));
        }
        if let Some(console) = options.console {
            state.config.console = console;
        }
        for (name, template) in options.templates {
            state.templates.register(name, template);
        }
        if let Some(active) = options.active_template {
            state.templates.set_active(&active)?;
        }
        if let Some(transports) = options.transports {
            if let Some(remote) = transports.remote {
                state.config.transports.remote = remote;
            }
            if let Some(console) = transports.console {
                state.config.transports.console = console;
            }
            if let Some(journal) = transports.journal {
                state.config.transports.journal = journal;
                state.config.journal.enabled = journal;
            }
        }
        // an explicit journal `enabled` wins over the transport flag
        if let Some(patch) = options.journal {
            state.config.journal.apply(&patch);
            state.config.transports.journal = state.config.journal.enabled;
            if let Some(journal) = &state.journal {
                journal.update_options(&patch);
            }
        }

        self.sync_queues(state);
        Ok(())
    }

    /// Create queues for newly enabled transports and drop the queues of
    /// disabled ones.
    fn sync_queues(&self, state: &mut State) {
        if state.config.transports.remote {
            if state.delivery.is_none() {
                state.delivery = Some(Arc::new(DeliveryQueue::new(
                    i64::from(state.config.rate_per_minute),
                    Arc::clone(&self.dispatcher),
                    self.runtime.clone(),
                )));
            }
        } else if let Some(delivery) = state.delivery.take() {
            let pending = delivery.status().pending;
            delivery.clear();
            if pending > 0 {
                warn!(pending, "remote transport disabled, discarding undelivered logs");
            }
        }

        if state.config.journal.enabled {
            if state.journal.is_none() {
                state.journal = Some(Arc::new(JournalQueue::new(
                    state.config.journal.clone(),
                    self.runtime.clone(),
                )));
            }
        } else if let Some(journal) = state.journal.take() {
            let pending = journal.status().pending;
            journal.clear();
            if pending > 0 {
                warn!(pending, "journal transport disabled, discarding unflushed logs");
            }
        }
    }

    pub fn set_level_enabled(&self, level: Level, enabled: bool) {
        self.state.lock().config.levels.set(level, enabled);
    }

    pub fn is_level_enabled(&self, level: Level) -> bool {
        self.state.lock().config.levels.is_enabled(level)
    }

    /// Register `template` under `name`, replacing any template of that name.
    pub fn register_template<T: Template + 'static>(&self, name: impl Into<String>, template: T) {
        self.state.lock().templates.register(name, Arc::new(template));
    }

    pub fn set_active_template(&self, name: &str) -> Result<()> {
        self.state.lock().templates.set_active(name)
    }

    pub fn active_template(&self) -> String {
        self.state.lock().templates.active().to_string()
    }

    pub fn set_transport_enabled(&self, kind: TransportKind, enabled: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.config.transports.set(kind, enabled);
        if kind == TransportKind::Journal {
            state.config.journal.enabled = enabled;
        }
        self.sync_queues(state);
    }

    pub fn is_transport_enabled(&self, kind: TransportKind) -> bool {
        self.state.lock().config.transports.is_enabled(kind)
    }

    pub fn journal_options(&self) -> JournalOptions {
        self.state.lock().config.journal.clone()
    }

    /// Render `record` and hand it to every enabled transport.
    ///
    /// A disabled level is dropped silently. The only error is an unknown
    /// template; transport failures are reported through `tracing`.
    pub fn log(&self, level: Level, record: impl Into<LogRecord>) -> Result<()> {
        let record = record.into();
        let Some(route) = self.route(level, &record)? else {
            return Ok(());
        };

        let payload = route.template.render(level, &record);
        let timestamp = payload
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(now_iso);

        if let Some(console) = route.console {
            println!("{}", console(level, &record));
        }

        if let Some(delivery) = route.delivery {
            match record.target.clone().or(route.default_target) {
                Some(target) => delivery.enqueue(DeliveryItem::new(target, payload.clone())),
                None => warn!(
                    %level,
                    "no delivery target configured, log not sent to the collector"
                ),
            }
        }

        if let Some(journal) = route.journal {
            journal.enqueue(JournalItem {
                level,
                payload,
                record,
                timestamp,
            });
        }
        Ok(())
    }

    fn route(&self, level: Level, record: &LogRecord) -> Result<Option<Route>> {
        let state = self.state.lock();
        if !state.config.levels.is_enabled(level) {
            return Ok(None);
        }
        let template = state.templates.resolve(record.template.as_deref())?;
        let transports = state.config.transports;
        Ok(Some(Route {
            template,
            console: transports
                .console
                .then(|| Arc::clone(&state.config.console)),
            delivery: state.delivery.clone().filter(|_| transports.remote),
            default_target: state.config.default_target.clone(),
            journal: state.journal.clone().filter(|_| transports.journal),
        }))
    }

    pub fn debug(&self, record: impl Into<LogRecord>) -> Result<()> {
        self.log(Level::Debug, record)
    }

    pub fn info(&self, record: impl Into<LogRecord>) -> Result<()> {
        self.log(Level::Info, record)
    }

    pub fn warning(&self, record: impl Into<LogRecord>) -> Result<()> {
        self.log(Level::Warning, record)
    }

    pub fn error(&self, record: impl Into<LogRecord>) -> Result<()> {
        self.log(Level::Error, record)
    }

    pub fn critical(&self, record: impl Into<LogRecord>) -> Result<()> {
        self.log(Level::Critical, record)
    }

    /// Delivery queue snapshot; all zeros but the rate while remote is off.
    pub fn delivery_status(&self) -> DeliveryStatus {
        let state = self.state.lock();
        match &state.delivery {
            Some(delivery) => delivery.status(),
            None => DeliveryStatus {
                rate_per_minute: state.config.rate_per_minute,
                ..DeliveryStatus::default()
            },
        }
    }

    /// Journal queue snapshot, `None` while the journal is off.
    pub fn journal_status(&self) -> Option<JournalStatus> {
        self.state.lock().journal.as_ref().map(|journal| journal.status())
    }

    pub fn clear_delivery_queue(&self) {
        if let Some(delivery) = &self.state.lock().delivery {
            delivery.clear();
        }
    }

    pub fn clear_journal_queue(&self) {
        if let Some(journal) = &self.state.lock().journal {
            journal.clear();
        }
    }

    /// Run one journal write cycle now.
    pub async fn flush_journal(&self) -> Result<()> {
        let journal = self.state.lock().journal.clone();
        match journal {
            Some(journal) => journal.flush().await,
            None => Ok(()),
        }
    }

    /// Change the remote rate limit; `<= 0` means unlimited.
    pub fn set_rate_limit(&self, rate_per_minute: i64) {
        let mut state = self.state.lock();
        state.config.rate_per_minute = normalize_rate(rate_per_minute);
        if let Some(delivery) = &state.delivery {
            delivery.update_rate_limit(rate_per_minute);
        }
    }

    /// Wait until the delivery queue is empty and idle.
    pub async fn wait_for_delivery_queue(&self) {
        let delivery = self.state.lock().delivery.clone();
        if let Some(delivery) = delivery {
            delivery.drain().await;
        }
    }
}
