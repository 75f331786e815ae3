//! Logging setup for Switchboard
//!
//! Installs a `tracing-subscriber` registry; library crates only emit events.

use switchboard_config::{LogConfig, LogFormat};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber
///
/// `filter_override` (e.g. from the command line) wins over the configured
/// filter. An unparseable directive falls back to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: &LogConfig, filter_override: Option<&str>) -> anyhow::Result<()> {
    let filter = build_filter(filter_override.unwrap_or(&config.filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => registry.with(fmt_layer).try_init(),
        LogFormat::Json => registry.with(fmt_layer.json()).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    tracing::debug!(format = ?config.format, "logging initialized");

    Ok(())
}

fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directive_falls_back_to_info() {
        assert_eq!(build_filter("switchboard=verbose").to_string(), "info");
    }

    #[test]
    fn valid_directive_is_kept() {
        assert_eq!(build_filter("warn").to_string(), "warn");
    }

    #[test]
    fn second_init_is_an_error() {
        let config = LogConfig::default();
        let first = init(&config, Some("off"));
        assert!(first.is_ok());
        assert!(init(&config, None).is_err());
    }
}
