//! Environment-backed runtime configuration for `room-feed`.

use std::{env, time::Duration};

use mtx_client::{ClientConfig, SyncEngineConfig};
use thiserror::Error;

const DEVICE_DISPLAY_NAME: &str = "room-feed";

/// Runtime configuration used by the feed binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Validated homeserver and client tuning.
    pub client: ClientConfig,
    /// User ID or localpart used for the password login.
    pub user: String,
    pub password: String,
    /// Optional long-poll timeout override.
    pub sync_timeout: Option<Duration>,
    /// Optional filter (JSON or filter ID) sent with every sync.
    pub filter: Option<String>,
    /// Continuation token to resume from instead of an initial sync.
    pub since: Option<String>,
}

impl FeedConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let homeserver = required_trimmed_env("ROOM_FEED_HOMESERVER", &mut lookup)?;
        let user = required_trimmed_env("ROOM_FEED_USER", &mut lookup)?;
        let password = lookup("ROOM_FEED_PASSWORD")
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing {
                key: "ROOM_FEED_PASSWORD",
            })?;

        let client = ClientConfig::new(&homeserver)
            .map_err(|err| ConfigError::InvalidValue {
                key: "ROOM_FEED_HOMESERVER",
                value: homeserver.clone(),
                reason: err.to_string(),
            })?
            .with_device_display_name(DEVICE_DISPLAY_NAME);

        let sync_timeout = parse_optional_u64("ROOM_FEED_SYNC_TIMEOUT_MS", &mut lookup)?
            .map(Duration::from_millis);
        let filter = optional_trimmed_env("ROOM_FEED_FILTER", &mut lookup);
        let since = optional_trimmed_env("ROOM_FEED_SINCE", &mut lookup);

        Ok(Self {
            client,
            user,
            password,
            sync_timeout,
            filter,
            since,
        })
    }

    pub fn sync_config(&self) -> SyncEngineConfig {
        let defaults = SyncEngineConfig::default();
        SyncEngineConfig {
            long_poll_timeout: self.sync_timeout.unwrap_or(defaults.long_poll_timeout),
            filter: self.filter.clone(),
            ..defaults
        }
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: &'static str },
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    optional_trimmed_env(key, lookup).ok_or(ConfigError::Missing { key })
}

fn parse_optional_u64<F>(key: &'static str, lookup: &mut F) -> Result<Option<u64>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
