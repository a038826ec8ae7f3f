use std::sync::Arc;
use std::time::Duration;
use tracing_log_shipper::noop_dispatch::NoopDispatcher;
use tracing_log_shipper::{
    JournalFormat, JournalOptionsPatch, Level, LogRecord, Options, Payload, Shipper, TransportKind,
};

/// Journal-only setup: nothing leaves the machine, records are rendered with
/// a custom template and appended to a CSV file that rotates at 4 KiB.
#[tokio::main]
async fn main() -> tracing_log_shipper::Result<()> {
    tracing_subscriber::fmt().init();

    let options = Options::new()
        .transport(TransportKind::Remote, false)
        .transport(TransportKind::Console, false)
        .template("compact", |level: Level, record: &LogRecord| {
            let mut payload = Payload::new();
            payload.insert("lvl".into(), level.as_str().into());
            payload.insert("msg".into(), record.message.clone().into());
            payload
        })
        .active_template("compact")
        .journal(JournalOptionsPatch {
            enabled: Some(true),
            format: Some(JournalFormat::Csv),
            path: Some("logs/journal_demo.csv".into()),
            batch_size: Some(20),
            max_file_bytes: Some(4 * 1024),
            flush_interval: Some(Duration::from_millis(200)),
        });
    let shipper = Shipper::with_dispatcher(options, Arc::new(NoopDispatcher))?;

    for i in 0..200 {
        shipper.warning(format!("disk usage at {}%", 50 + i % 50))?;
    }
    while shipper.journal_status().is_some_and(|s| s.pending > 0) {
        shipper.flush_journal().await?;
    }

    if let Some(status) = shipper.journal_status() {
        println!("journal now writing to {}", status.file_path.display());
    }
    Ok(())
}
