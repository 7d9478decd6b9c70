//! Subscriber setup for applications embedding the room client.

use pmoconfig::Config;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Registry, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured minimum level is
/// used. With console logging disabled only the filter is installed.
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &Config) -> anyhow::Result<()> {
    let level = config
        .get_log_min_level()
        .ok()
        .and_then(|l| string_to_level(&l))
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = Registry::default().with(filter);
    if config.get_log_enable_console().unwrap_or(true) {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true),
            )
            .try_init()?;
    } else {
        subscriber.try_init()?;
    }
    Ok(())
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_level() {
        assert_eq!(string_to_level(" debug "), Some(Level::DEBUG));
        assert_eq!(string_to_level("Warn"), Some(Level::WARN));
        assert_eq!(string_to_level("verbose"), None);
    }

    #[test]
    fn test_second_init_fails() {
        let config = Config::from_yaml_str("host:\n  logger:\n    enable_console: false\n").unwrap();
        let first = init_logging(&config);
        // Another test may have installed a subscriber first.
        if first.is_ok() {
            assert!(init_logging(&config).is_err());
        }
    }
}
