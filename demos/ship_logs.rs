use std::time::Instant;
use tracing_log_shipper::env::{env_or, LOG_SHIPPER_COLLECTOR_URL_ENV, LOG_SHIPPER_TARGET_ENV};
use tracing_log_shipper::{LogRecord, Metadata, Options, Shipper, TransportKind};

#[tokio::main]
async fn main() -> tracing_log_shipper::Result<()> {
    tracing_subscriber::fmt().init();

    let shipper = Shipper::new(
        Options::from_env()?
            .collector_url(env_or(LOG_SHIPPER_COLLECTOR_URL_ENV, "http://127.0.0.1:3000"))
            .default_target(env_or(LOG_SHIPPER_TARGET_ENV, "demo-project"))
            .default_metadata(Metadata::new().with_service("checkout"))
            .transport(TransportKind::Console, true)
            .rate_limit(600),
    )?;

    shipper.info("checkout service started")?;
    for order in 0..5 {
        shipper.error(
            LogRecord::new("payment declined")
                .with_tags(["billing", "stripe"])
                .with_metadata(Metadata::new().with_user("u-42").with_field("order", order)),
        )?;
    }

    let status = shipper.delivery_status();
    println!(
        "{} logs queued, roughly {} ms until delivered",
        status.pending, status.estimated_ms
    );

    let start = Instant::now();
    shipper.wait_for_delivery_queue().await;
    let status = shipper.delivery_status();
    println!(
        "queue drained in {:?}: {} delivered, {} failed, {} dropped",
        start.elapsed(),
        status.dispatched,
        status.failed,
        status.dropped
    );
    Ok(())
}
