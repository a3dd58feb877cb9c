use crate::config::AuthConfig;
use crate::{Result, SyncError};

/// Authorize a manual sync trigger against the configured API key.
///
/// An unset key locks the operation rather than opening it to everyone.
#[inline]
pub fn verify_api_key(config: &AuthConfig, provided: &str) -> Result<()> {
    if config.api_key.is_empty() {
        return Err(SyncError::Unauthorized(
            "No API key configured; manual triggers are disabled".to_string(),
        ));
    }

    if provided == config.api_key {
        Ok(())
    } else {
        Err(SyncError::Unauthorized("Invalid API key".to_string()))
    }
}

/// Authorize a scheduled update trigger by its bearer authorization value.
#[inline]
pub fn verify_cron_secret(config: &AuthConfig, authorization: &str) -> Result<()> {
    if config.cron_secret.is_empty() {
        return Err(SyncError::Unauthorized(
            "No cron secret configured; scheduled triggers are disabled".to_string(),
        ));
    }

    let expected = format!("Bearer {}", config.cron_secret);
    if authorization == expected {
        Ok(())
    } else {
        Err(SyncError::Unauthorized(
            "Invalid cron authorization".to_string(),
        ))
    }
}
