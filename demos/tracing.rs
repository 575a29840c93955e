use {logsink::FileSinkBuilder, tracing_subscriber::util::SubscriberInitExt};

/// Uses the sink as the writer behind a non-blocking tracing subscriber.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = FileSinkBuilder::new("./logs", "tracing")
        .max_size(5)
        .max_backups(3)
        .roll_every_day(true)
        .build()?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(sink);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .finish()
        .try_init()?;

    tracing::info!("This is an info message");
    tracing::warn!("This is a warning message");
    tracing::error!("This is an error message");

    Ok(())
}
