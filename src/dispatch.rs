use crate::error::DispatchError;
use crate::record::Payload;
use async_trait::async_trait;
use serde::Serialize;

/// One element of the delivery queue: a rendered payload and the collector
/// target (project identifier) it belongs to.
///
/// Serializes to the collector wire body `{"uuid": .., "log": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryItem {
    #[serde(rename = "uuid")]
    pub target: String,
    #[serde(rename = "log")]
    pub payload: Payload,
}

impl DeliveryItem {
    pub fn new(target: impl Into<String>, payload: Payload) -> Self {
        Self {
            target: target.into(),
            payload,
        }
    }
}

/// Asynchronous transport to the remote collector.
///
/// The delivery queue calls these methods from its own background task and
/// never on the caller's thread. At most one call is in flight at a time.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver a single item.
    ///
    /// **Returns**
    /// - `Ok(())` if the collector accepted the item.
    /// - `Err(..)` on transport errors or a non-success status. The queue
    ///   logs the error and drops the item; there is no retry.
    async fn send(&self, item: &DeliveryItem) -> Result<(), DispatchError>;

    /// Check whether the collector is reachable.
    ///
    /// Called before the first delivery and again after every availability
    /// reset. Returning `false` opens the circuit breaker: the whole backlog
    /// is dropped and nothing is sent until the next reset.
    ///
    /// Default implementation reports the collector as always available.
    async fn probe(&self) -> bool {
        true
    }

    /// Point the transport at a new collector base address.
    ///
    /// Default implementation ignores the address, for transports that are
    /// not addressed by URL.
    fn set_base_url(&self, _base_url: &str) {}
}
