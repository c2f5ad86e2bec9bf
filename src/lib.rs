pub mod config;
pub mod inference_service;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Filter comes from `RUST_LOG`, else `config::default_log_filter()`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("{} v{} tracing initialized", config::APP_NAME, config::APP_VERSION);
    }
}
