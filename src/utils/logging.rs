use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::config::LogSettings;

/// Map a configured level name onto a `tracing::Level`.
///
/// Unknown names fall back to INFO.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Build a fmt subscriber that drops events below `level` and routes them to
/// one of two sinks: WARN and ERROR go to `err`, everything else to `out`.
pub fn subscriber<O, E>(level: Level, out: O, err: E) -> impl Subscriber + Send + Sync + 'static
where
    O: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    E: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .with_writer(err.with_max_level(Level::WARN).or_else(out))
        .finish()
}

/// Install the process-wide subscriber writing to stdout/stderr.
///
/// Only the first call installs anything; later calls are ignored so tests
/// and embedders can call this more than once without panicking.
pub fn init(settings: &LogSettings) {
    let level = parse_level(&settings.level);
    let _ = tracing::subscriber::set_global_default(subscriber(
        level,
        std::io::stdout,
        std::io::stderr,
    ));
}
