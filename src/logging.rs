use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "venue_extractor.log";

/// Initializes logging to the console and to a daily-rotated JSON file.
pub fn init_logging() -> anyhow::Result<()> {
    fs::create_dir_all(LOG_DIR)?;

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("venue_extractor=info"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    // The writer flushes on drop; keep it alive for the whole process.
    std::mem::forget(guard);
    Ok(())
}
