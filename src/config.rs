use crate::journal::{JournalOptions, JournalOptionsPatch};
use crate::record::{now_iso, Level, LogRecord, Metadata};
use crate::template::Template;
use std::fmt;
use std::sync::Arc;

/// Default collector base address.
pub const DEFAULT_COLLECTOR_URL: &str = "http://localhost:3000";

/// Default remote rate limit in messages per minute.
pub const DEFAULT_RATE_LIMIT: i64 = 120;

/// Environment name under which `DEBUG` starts disabled.
pub const PRODUCTION: &str = "production";

/// Renders a record for the console transport.
pub type ConsoleRenderer = Arc<dyn Fn(Level, &LogRecord) -> String + Send + Sync>;

/// Transport a record can be fanned out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Remote,
    Console,
    Journal,
}

/// Which transports are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transports {
    pub remote: bool,
    pub console: bool,
    pub journal: bool,
}

impl Default for Transports {
    fn default() -> Self {
        Self {
            remote: true,
            console: true,
            journal: false,
        }
    }
}

impl Transports {
    pub fn is_enabled(&self, kind: TransportKind) -> bool {
        match kind {
            TransportKind::Remote => self.remote,
            TransportKind::Console => self.console,
            TransportKind::Journal => self.journal,
        }
    }

    pub fn set(&mut self, kind: TransportKind, enabled: bool) {
        match kind {
            TransportKind::Remote => self.remote = enabled,
            TransportKind::Console => self.console = enabled,
            TransportKind::Journal => self.journal = enabled,
        }
    }
}

/// Partial [`Transports`]; `None` keeps the current flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportsPatch {
    pub remote: Option<bool>,
    pub console: Option<bool>,
    pub journal: Option<bool>,
}

/// Per-level on/off switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSwitches([bool; 5]);

impl Default for LevelSwitches {
    fn default() -> Self {
        Self([true; 5])
    }
}

impl LevelSwitches {
    /// Everything on, except `DEBUG` in production.
    pub fn for_environment(environment: Option<&str>) -> Self {
        let mut switches = Self::default();
        if environment == Some(PRODUCTION) {
            switches.set(Level::Debug, false);
        }
        switches
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        self.0[level as usize]
    }

    pub fn set(&mut self, level: Level, enabled: bool) {
        self.0[level as usize] = enabled;
    }
}

/// Runtime configuration for a [`Shipper`](crate::shipper::Shipper).
///
/// Every field is optional; [`Shipper::configure`](crate::shipper::Shipper::configure)
/// only touches the fields that are set.
#[derive(Clone, Default)]
pub struct Options {
    /// Collector base address, e.g. `http://127.0.0.1:3000`.
    pub collector_url: Option<String>,
    /// Messages per minute; `<= 0` means unlimited.
    pub rate_limit: Option<i64>,
    /// Target used when a record does not name its own.
    pub default_target: Option<String>,
    pub transports: Option<TransportsPatch>,
    /// Templates to register (or replace) by name.
    pub templates: Vec<(String, Arc<dyn Template>)>,
    pub active_template: Option<String>,
    pub console: Option<ConsoleRenderer>,
    pub journal: Option<JournalOptionsPatch>,
    /// Setting this resets every per-level switch to its default.
    pub environment: Option<String>,
    pub default_metadata: Option<Metadata>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collector_url(mut self, url: impl Into<String>) -> Self {
        self.collector_url = Some(url.into());
        self
    }

    pub fn rate_limit(mut self, per_minute: i64) -> Self {
        self.rate_limit = Some(per_minute);
        self
    }

    pub fn default_target(mut self, target: impl Into<String>) -> Self {
        self.default_target = Some(target.into());
        self
    }

    pub fn transport(mut self, kind: TransportKind, enabled: bool) -> Self {
        let patch = self.transports.get_or_insert_with(TransportsPatch::default);
        match kind {
            TransportKind::Remote => patch.remote = Some(enabled),
            TransportKind::Console => patch.console = Some(enabled),
            TransportKind::Journal => patch.journal = Some(enabled),
        }
        self
    }

    pub fn template<T: Template + 'static>(mut self, name: impl Into<String>, template: T) -> Self {
        self.templates.push((name.into(), Arc::new(template)));
        self
    }

    pub fn active_template(mut self, name: impl Into<String>) -> Self {
        self.active_template = Some(name.into());
        self
    }

    pub fn console<F>(mut self, render: F) -> Self
    where
        F: Fn(Level, &LogRecord) -> String + Send + Sync + 'static,
    {
        self.console = Some(Arc::new(render));
        self
    }

    pub fn journal(mut self, patch: JournalOptionsPatch) -> Self {
        self.journal = Some(patch);
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn default_metadata(mut self, metadata: Metadata) -> Self {
        self.default_metadata = Some(metadata);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let templates: Vec<&str> = self.templates.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Options")
            .field("collector_url", &self.collector_url)
            .field("rate_limit", &self.rate_limit)
            .field("default_target", &self.default_target)
            .field("transports", &self.transports)
            .field("templates", &templates)
            .field("active_template", &self.active_template)
            .field("console", &self.console.as_ref().map(|_| "<fn>"))
            .field("journal", &self.journal)
            .field("environment", &self.environment)
            .field("default_metadata", &self.default_metadata)
            .finish()
    }
}

/// Fully resolved configuration owned by the shipper.
#[derive(Clone)]
pub(crate) struct Config {
    /// Last address pushed to the dispatcher; `None` leaves the dispatcher's own.
    pub collector_url: Option<String>,
    pub rate_per_minute: u32,
    pub default_target: Option<String>,
    pub transports: Transports,
    pub levels: LevelSwitches,
    pub journal: JournalOptions,
    pub console: ConsoleRenderer,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collector_url: None,
            rate_per_minute: crate::delivery::normalize_rate(DEFAULT_RATE_LIMIT),
            default_target: None,
            transports: Transports::default(),
            levels: LevelSwitches::default(),
            journal: JournalOptions::default(),
            console: Arc::new(default_console),
        }
    }
}

/// `<timestamp> <LEVEL padded to 8> [tags] <message>`
pub fn default_console(level: Level, record: &LogRecord) -> String {
    let tags = if record.tags.is_empty() {
        String::new()
    } else {
        format!("[{}]", record.tags.join(", "))
    };
    format!("{} {:<8} {} {}", now_iso(), level.as_str(), tags, record.message)
        .trim()
        .to_string()
}
