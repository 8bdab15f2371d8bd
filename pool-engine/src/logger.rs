use tracing_subscriber::EnvFilter;

/// This function configures the logging format. The loglevel is also
/// processed here i.e `RUST_LOG=pool_engine=TRACE` will print all trace!()
/// and higher messages to the console.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
