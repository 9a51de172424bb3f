//! Structured logging setup.
//!
//! Installs a `tracing` subscriber that writes to **stderr**, so stdout stays
//! free for the machine-readable run summary. `RUST_LOG` takes precedence
//! over the configured level when set.

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSettings;

static INIT: Once = Once::new();

/// Parses a log level, defaulting to INFO for unknown input.
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Initializes the global subscriber. Later calls are ignored.
pub fn init(settings: &LoggingSettings) {
    let level = parse_level(&settings.level);
    let use_json = settings.json;

    INIT.call_once(|| {
        let filter = match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
            _ => EnvFilter::new(format!(
                "{},h2=warn,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
                level.to_string().to_lowercase()
            )),
        };

        let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

        if use_json {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init();
        }
    });
}
