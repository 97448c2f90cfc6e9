//! Tracing subscriber setup for hosts of the service
//!
//! `RUST_LOG` wins when it is set; otherwise the configured level applies.

use selection_config::LoggingSettings;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Filter for the configured level alone
pub fn level_filter(settings: &LoggingSettings) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(&settings.level)
}

/// Install a global fmt subscriber
///
/// Fails if the configured level does not parse or a subscriber is already
/// installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(settings)?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_configured_level_sets_filter() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
        };
        let filter = level_filter(&settings).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_per_target_directives_are_accepted() {
        let settings = LoggingSettings {
            level: "info,token_selection=debug".to_string(),
        };
        let filter = level_filter(&settings).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_default_level_is_info() {
        let filter = level_filter(&LoggingSettings::default()).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }
}
