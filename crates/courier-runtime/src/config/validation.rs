//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, DispatcherConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_dispatcher_config(&config.dispatcher)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates dispatch loop settings.
fn validate_dispatcher_config(config: &DispatcherConfig) -> ConfigResult<()> {
    if config.error_summary_len == 0 {
        return Err(ConfigError::validation(
            "Error summary length must be greater than 0",
        ));
    }

    if config.poll_retry_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Poll retry delay must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::validation(
            "File output requires logging.file_path",
        ));
    }

    for module in config.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid module name in logging filters: '{module}'"
            )));
        }
    }

    Ok(())
}
