use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Canonical, transport-ready representation of a record as produced by a
/// [`Template`](crate::template::Template).
pub type Payload = Map<String, Value>;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARNING" | "WARN" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" => Ok(Level::Critical),
            _ => Err(format!("invalid log level: '{}'", s)),
        }
    }
}

/// Metadata attached to a record.
///
/// The well-known keys are typed; anything else lands in `fields` and is
/// flattened next to them when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ip.is_none()
            && self.service.is_none()
            && self.user.is_none()
            && self.extra.is_none()
            && self.fields.is_empty()
    }

    /// Flatten into a plain JSON object.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.fields.clone();
        if let Some(ip) = &self.ip {
            map.insert("ip".to_string(), Value::from(ip.as_str()));
        }
        if let Some(service) = &self.service {
            map.insert("service".to_string(), Value::from(service.as_str()));
        }
        if let Some(user) = &self.user {
            map.insert("user".to_string(), Value::from(user.as_str()));
        }
        if let Some(extra) = &self.extra {
            map.insert("extra".to_string(), Value::Object(extra.clone()));
        }
        map
    }
}

/// Raw record handed to [`Shipper::log`](crate::shipper::Shipper::log).
///
/// Severity travels next to the record rather than inside it so the same
/// record can be logged at several levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogRecord {
    pub message: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Extra top-level fields carried into the payload by the standard template.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Explicit ISO-8601 timestamp; render time is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip)]
    pub template: Option<String>,
    #[serde(skip)]
    pub target: Option<String>,
}

impl LogRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Render this record with the named template instead of the active one.
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    /// Deliver this record to the given target instead of the default one.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

impl From<&str> for LogRecord {
    fn from(message: &str) -> Self {
        LogRecord::new(message)
    }
}

impl From<String> for LogRecord {
    fn from(message: String) -> Self {
        LogRecord::new(message)
    }
}

/// Current time as ISO-8601 UTC with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parses_aliases_and_orders() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("Critical".parse::<Level>().unwrap(), Level::Critical);
        assert!("verbose".parse::<Level>().is_err());
        assert!(Level::Debug < Level::Critical);
        assert_eq!(serde_json::to_value(Level::Warning).unwrap(), "WARNING");
    }

    #[test]
    fn metadata_flattens_custom_keys() {
        let meta = Metadata::new()
            .with_ip("10.0.0.1")
            .with_extra("attempt", 3)
            .with_field("region", "eu-west");

        let map = meta.to_map();
        assert_eq!(map["ip"], "10.0.0.1");
        assert_eq!(map["region"], "eu-west");
        assert_eq!(map["extra"]["attempt"], 3);
        assert_eq!(serde_json::to_value(&meta).unwrap(), Value::Object(map));
    }

    #[test]
    fn now_iso_is_utc_millis() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        // 2024-01-01T00:00:00.000Z
        assert_eq!(ts.len(), 24);
    }
}
