use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_log_shipper::init::{init_tracing_with_config, LayerConfig};
use tracing_log_shipper::{Level, Options, Shipper, TransportKind};

/// Forward ordinary `tracing` events to the collector.
#[tokio::main]
async fn main() -> tracing_log_shipper::Result<()> {
    let shipper = Arc::new(Shipper::new(
        Options::new()
            .collector_url("http://127.0.0.1:3000")
            .default_target("demo-project")
            .transport(TransportKind::Console, false)
            .rate_limit(0),
    )?);

    init_tracing_with_config(
        Arc::clone(&shipper),
        LayerConfig {
            min_level: Level::Warning,
            enable_stdout: true,
        },
    )?;

    info!("not forwarded, below the bridge threshold");
    warn!(queue = "emails", depth = 1200u64, "backlog growing");
    error!(user_id = 42, reason = "invalid password", "authentication failed");

    shipper.wait_for_delivery_queue().await;
    Ok(())
}
