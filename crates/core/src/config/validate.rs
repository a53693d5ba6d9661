use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Orchestrator timeout and attempt budget are non-zero
/// - Backoff parameters describe a non-shrinking, bounded delay
/// - Tool timeout, sweep interval and inbox poll interval are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let orchestrator = &config.orchestrator;
    if orchestrator.timeout_ms == 0 {
        return Err(invalid("orchestrator.timeout_ms cannot be 0"));
    }

    let retry = &orchestrator.retry;
    if retry.max_attempts == 0 {
        return Err(invalid("orchestrator.retry.max_attempts cannot be 0"));
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        return Err(invalid(
            "orchestrator.retry.backoff_multiplier must be a finite number >= 1",
        ));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(invalid(
            "orchestrator.retry.max_delay_ms cannot be smaller than initial_delay_ms",
        ));
    }

    if config.converters.tool_timeout_secs == 0 {
        return Err(invalid("converters.tool_timeout_secs cannot be 0"));
    }

    if config.sweep.interval_secs == 0 {
        return Err(invalid("sweep.interval_secs cannot be 0"));
    }

    if config.storage.poll_interval_ms == 0 {
        return Err(invalid("storage.poll_interval_ms cannot be 0"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
