use crate::dispatch::{DeliveryItem, Dispatcher};
use crate::error::DispatchError;
use async_trait::async_trait;

/// Collector stand-in that reports success for every item and every health
/// check.
///
/// Pair it with the remote transport disabled for journal-only setups, or
/// use it where the crate is built without `http`.
#[derive(Clone, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl Dispatcher for NoopDispatcher {
    async fn send(&self, _item: &DeliveryItem) -> Result<(), DispatchError> {
        Ok(())
    }
}
