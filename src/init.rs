use crate::error::{Result, ShipperError};
use crate::layer::ShipperLayer;
use crate::record::Level;
use crate::shipper::Shipper;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the tracing bridge.
///
/// **Fields**
/// - `min_level`: lowest severity forwarded to the shipper.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed next to [`ShipperLayer`] so events are also printed.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::Info,
            enable_stdout: false,
        }
    }
}

/// Install a global `tracing` subscriber that forwards events to `shipper`.
///
/// **Effects**
///
/// A [`Registry`] combined with [`ShipperLayer`] becomes the global default
/// subscriber. Fails with [`ShipperError::Subscriber`] if one is already
/// installed.
pub fn init_tracing_with_config(shipper: Arc<Shipper>, config: LayerConfig) -> Result<()> {
    let layer = ShipperLayer::new(shipper, config.min_level);

    // the two subscriber shapes have different types
    let installed = if config.enable_stdout {
        let subscriber = Registry::default()
            .with(layer)
            .with(tracing_subscriber::fmt::layer());
        tracing::subscriber::set_global_default(subscriber)
    } else {
        tracing::subscriber::set_global_default(Registry::default().with(layer))
    };
    installed.map_err(|e| ShipperError::Subscriber(e.to_string()))
}

/// [`init_tracing_with_config`] with [`LayerConfig::default`].
pub fn init_tracing(shipper: Arc<Shipper>) -> Result<()> {
    init_tracing_with_config(shipper, LayerConfig::default())
}
