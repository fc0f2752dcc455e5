use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Initializes the global `tracing` subscriber exactly once, preferring
/// `RUST_LOG` if set and otherwise falling back to the configured
/// level. Call this at the very top of `main`, before any other
/// collaborator is constructed.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let subscriber = fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Json => {
            let _ = subscriber.json().try_init();
        }
        LogFormat::Pretty => {
            let _ = subscriber.try_init();
        }
    }
}
