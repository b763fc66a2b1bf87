//! Process-wide log subscriber for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! embedding program's choice.

/// Install a stderr subscriber. `RUST_LOG` wins over the configured level.
#[cfg(feature = "cli")]
pub fn init(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
