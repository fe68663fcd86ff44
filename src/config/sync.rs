//! Profile sync settings loaded from environment variables.
//!
//! Reads `SESSION_RETRY_DELAY_MS`, the pause before the single session lookup retry made
//! by profile sync. Defaults to one second when unset.

use crate::errors::{Error, Result};
use std::time::Duration;

/// Retry delay used when `SESSION_RETRY_DELAY_MS` is not set.
pub const DEFAULT_SESSION_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Settings for pushing profiles to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Pause before looking up the session a second time
    pub session_retry_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            session_retry_delay: DEFAULT_SESSION_RETRY_DELAY,
        }
    }
}

/// Parses a retry delay in milliseconds, using the default for `None`.
///
/// # Errors
/// Returns [`Error::Config`] if the value is not a whole number of milliseconds.
pub fn parse_retry_delay(raw: Option<&str>) -> Result<Duration> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_SESSION_RETRY_DELAY);
    };
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| Error::Config {
            message: format!("SESSION_RETRY_DELAY_MS must be milliseconds, got '{raw}': {e}"),
        })
}

/// Loads [`SyncSettings`] from the environment.
///
/// # Errors
/// Returns [`Error::Config`] if `SESSION_RETRY_DELAY_MS` is set but malformed.
pub fn load_sync_settings() -> Result<SyncSettings> {
    let raw = std::env::var("SESSION_RETRY_DELAY_MS").ok();
    Ok(SyncSettings {
        session_retry_delay: parse_retry_delay(raw.as_deref())?,
    })
}
