//! Host-process log wiring (§5, ambient stack). A thin, opinionated default
//! hosts can call from `main`; library code elsewhere only ever emits
//! `tracing` events and never touches a subscriber.

use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _};

/// Installs a global subscriber writing to stderr, filtered by
/// `RUST_LOG` (defaulting to `info`). The returned guard must be held for
/// the life of the process; dropping it stops the non-blocking writer.
pub fn init() -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true);

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::registry()
        .with(layer.with_writer(writer).with_filter(filter))
        .init();

    guard
}
