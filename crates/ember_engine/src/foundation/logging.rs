//! Logging setup

pub use log::{debug, error, info, trace, warn};

/// Install `env_logger` as the global logger
///
/// `RUST_LOG` takes precedence over `default_filter`. Calling this more than
/// once leaves the first logger in place.
pub fn init(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let result = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();

    if result.is_ok() {
        log::debug!("Logging initialized (default filter {:?})", default_filter);
    }
}
