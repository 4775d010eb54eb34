pub mod app;

use tracing::warn;
use uuid::Uuid;

use app::cli::{execute, parse_args};
use app::config::{load_config, AppConfig};
use app::logging::init_logging;
use app::state::AppState;

/// CLI entry point. Returns the process exit code: 0 on success, 1 when the
/// command failed, 2 on a usage error.
pub fn run() -> i32 {
    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{message}");
            return 2;
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let (config, load_error) = match load_config(&trace_id) {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    };
    init_logging(config.debug_mode);
    if let Some(err) = load_error {
        warn!(trace_id = %err.trace_id, error = %err.error, "config unavailable, using defaults");
    }

    let state = AppState::new();
    execute(cli, &config, &state)
}
