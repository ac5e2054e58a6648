/// Initializes the global `tracing` subscriber. `RUST_LOG` overrides
/// `log_level` when set. `json` switches to newline-delimited JSON output for
/// log aggregators; plain text otherwise.
pub fn init(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
