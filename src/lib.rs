//! Embedded telemetry client: structured log records go out to a
//! rate-limited remote collector, the console and a rotating local journal.
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> tracing_log_shipper::Result<()> {
//! use tracing_log_shipper::{LogRecord, Options, Shipper};
//!
//! let shipper = Shipper::new(
//!     Options::new()
//!         .collector_url("http://127.0.0.1:3000")
//!         .default_target("0b5c6d1e-project")
//!         .rate_limit(60),
//! )?;
//! shipper.error(LogRecord::new("payment failed").with_tag("billing"))?;
//! shipper.wait_for_delivery_queue().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod init;
pub mod journal;
mod journal_file;
pub mod layer;
pub mod noop_dispatch;
pub mod record;
pub mod schedule;
pub mod shipper;
pub mod template;

#[cfg(feature = "http")]
pub mod http;

pub use config::{Options, TransportKind, TransportsPatch};
pub use delivery::{DeliveryQueue, DeliveryStatus};
pub use dispatch::{DeliveryItem, Dispatcher};
pub use error::{DispatchError, Result, ShipperError};
pub use journal::{JournalFormat, JournalOptions, JournalOptionsPatch, JournalQueue, JournalStatus};
pub use record::{Level, LogRecord, Metadata, Payload};
pub use shipper::Shipper;
pub use template::{Template, TemplateRegistry};

#[cfg(feature = "http")]
pub use http::{HttpCollector, HttpCollectorConfig};
