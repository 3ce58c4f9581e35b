//! Logging bootstrap for the emulator

/// Initialize the global tracing subscriber.
///
/// Filter defaults to `info` and can be overridden with `RUST_LOG`.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
