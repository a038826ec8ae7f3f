//! Named templates turning a raw [`LogRecord`] into a canonical [`Payload`].

use crate::error::{Result, ShipperError};
use crate::record::{now_iso, Level, LogRecord, Metadata, Payload};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Name under which the built-in standard template is registered.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Tag used by the standard template when a record carries none.
pub const DEFAULT_TAG: &str = "MAIN";

const CANONICAL_KEYS: [&str; 5] = ["level", "message", "tags", "timestamp", "metadata"];

/// Pure transformation from (severity, raw record) to canonical payload.
///
/// Implemented for every `Fn(Level, &LogRecord) -> Payload`, so closures can
/// be registered directly.
pub trait Template: Send + Sync {
    fn render(&self, level: Level, record: &LogRecord) -> Payload;
}

impl<F> Template for F
where
    F: Fn(Level, &LogRecord) -> Payload + Send + Sync,
{
    fn render(&self, level: Level, record: &LogRecord) -> Payload {
        self(level, record)
    }
}

#[derive(Clone)]
enum Entry {
    Standard,
    Custom(Arc<dyn Template>),
}

/// Template resolved out of the registry, ready to render without holding
/// any lock on the registry.
#[derive(Clone)]
pub enum ResolvedTemplate {
    Standard(Metadata),
    Custom(Arc<dyn Template>),
}

impl ResolvedTemplate {
    pub fn render(&self, level: Level, record: &LogRecord) -> Payload {
        match self {
            ResolvedTemplate::Standard(defaults) => render_standard(defaults, level, record),
            ResolvedTemplate::Custom(template) => template.render(level, record),
        }
    }
}

/// Registry of named templates plus the active selection.
///
/// Templates are only ever added or replaced, never removed.
#[derive(Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, Entry>,
    active: String,
    default_metadata: Metadata,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new(Metadata::default())
    }
}

impl TemplateRegistry {
    pub fn new(default_metadata: Metadata) -> Self {
        let mut templates = HashMap::new();
        templates.insert(DEFAULT_TEMPLATE.to_string(), Entry::Standard);
        Self {
            templates,
            active: DEFAULT_TEMPLATE.to_string(),
            default_metadata,
        }
    }

    pub fn register(&mut self, name: impl Into<String>, template: Arc<dyn Template>) {
        self.templates.insert(name.into(), Entry::Custom(template));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if !self.contains(name) {
            return Err(ShipperError::TemplateNotFound(name.to_string()));
        }
        self.active = name.to_string();
        Ok(())
    }

    pub fn default_metadata(&self) -> &Metadata {
        &self.default_metadata
    }

    pub fn set_default_metadata(&mut self, metadata: Metadata) {
        self.default_metadata = metadata;
    }

    /// Look up `name`, or the active template when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<ResolvedTemplate> {
        let name = name.unwrap_or(&self.active);
        match self.templates.get(name) {
            Some(Entry::Standard) => Ok(ResolvedTemplate::Standard(self.default_metadata.clone())),
            Some(Entry::Custom(template)) => Ok(ResolvedTemplate::Custom(Arc::clone(template))),
            None => Err(ShipperError::TemplateNotFound(name.to_string())),
        }
    }
}

/// Built-in template: level, message, tags, timestamp and merged metadata,
/// followed by the record's extra fields.
fn render_standard(defaults: &Metadata, level: Level, record: &LogRecord) -> Payload {
    let mut metadata = defaults.to_map();
    if let Some(own) = &record.metadata {
        metadata.extend(own.to_map());
    }
    let has_ip = match metadata.get("ip") {
        Some(Value::String(ip)) => !ip.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    if !has_ip {
        metadata.insert("ip".to_string(), Value::from("unknown"));
    }

    let tags: Vec<Value> = if record.tags.is_empty() {
        vec![Value::from(DEFAULT_TAG)]
    } else {
        record.tags.iter().map(|t| Value::from(t.as_str())).collect()
    };

    let mut payload = Payload::new();
    payload.insert("level".to_string(), Value::from(level.as_str()));
    payload.insert("message".to_string(), Value::from(record.message.as_str()));
    payload.insert("tags".to_string(), Value::Array(tags));
    payload.insert(
        "timestamp".to_string(),
        Value::from(record.timestamp.clone().unwrap_or_else(now_iso)),
    );
    payload.insert("metadata".to_string(), Value::Object(metadata));

    for (key, value) in &record.fields {
        if !CANONICAL_KEYS.contains(&key.as_str()) {
            payload.insert(key.clone(), value.clone());
        }
    }
    payload
}
