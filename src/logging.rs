use tracing_subscriber::EnvFilter;

/// Initialise tracing output. The level string accepts anything an
/// `EnvFilter` does, so both `debug` and
/// `logsieve=debug,tokio=warn` work.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
