//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over `application.log_level`. Logs go to
//! stderr so reports printed on stdout stay clean.

use crate::config::{ApplicationConfig, LogFormat};
use crate::error::{AppResult, SweepError};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Fails if one is already installed or the
/// configured level is not a valid filter directive.
pub fn init(app: &ApplicationConfig) -> AppResult<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_for(app)?)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match app.log_format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| SweepError::Configuration(format!("cannot install logger: {e}")))
}

/// Filter for `app`, honouring `RUST_LOG` when it is set.
pub fn filter_for(app: &ApplicationConfig) -> AppResult<EnvFilter> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    filter(env.as_deref(), &app.log_level)
}

/// A parseable `env` directive wins; otherwise `level` must parse.
pub fn filter(env: Option<&str>, level: &str) -> AppResult<EnvFilter> {
    if let Some(filter) = env.and_then(|directives| EnvFilter::try_new(directives).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| SweepError::Configuration(format!("invalid log level '{level}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn env_directive_wins_over_configured_level() {
        let filter = filter(Some("debug"), "warn").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn configured_level_used_without_env() {
        let filter = filter(None, "warn").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn unparseable_env_falls_back_to_level() {
        let filter = filter(Some("spectral_sweep=loudest"), "error").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
    }

    #[test]
    fn invalid_level_is_rejected() {
        let err = filter(None, "spectral_sweep=loudest").unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    #[serial]
    fn rust_log_overrides_application_config() {
        let app = ApplicationConfig {
            log_level: "warn".to_string(),
            ..ApplicationConfig::default()
        };
        let previous = std::env::var(EnvFilter::DEFAULT_ENV).ok();

        std::env::set_var(EnvFilter::DEFAULT_ENV, "trace");
        let overridden = filter_for(&app);
        std::env::remove_var(EnvFilter::DEFAULT_ENV);
        let configured = filter_for(&app);

        if let Some(value) = previous {
            std::env::set_var(EnvFilter::DEFAULT_ENV, value);
        }
        assert_eq!(
            overridden.unwrap().max_level_hint(),
            Some(LevelFilter::TRACE)
        );
        assert_eq!(
            configured.unwrap().max_level_hint(),
            Some(LevelFilter::WARN)
        );
    }
}
