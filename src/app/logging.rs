use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise `debug_mode` from the config picks the level.
pub fn init_logging(debug_mode: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug_mode)));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

fn default_directive(debug_mode: bool) -> &'static str {
    if debug_mode {
        "debug"
    } else {
        "info"
    }
}
