//! Server configuration.
//!
//! Values come from `AGORA__`-prefixed environment variables, with `__`
//! between nested keys and durations in milliseconds:
//!
//! | Variable | Field |
//! |---|---|
//! | `AGORA__BIND_ADDR` | [`ServerConfig::bind_addr`] |
//! | `AGORA__HANDSHAKE_TIMEOUT_MS` | [`ServerConfig::handshake_timeout`] |
//! | `AGORA__BROADCAST__OUTBOUND_CAPACITY` | [`BroadcastConfig::outbound_capacity`] |
//! | `AGORA__BROADCAST__SEND_TIMEOUT_MS` | [`BroadcastConfig::send_timeout`] |
//! | `AGORA__BROADCAST__IDLE_TIMEOUT_MS` | [`BroadcastConfig::idle_timeout`] |
//!
//! Anything unset keeps its default.

use std::time::Duration;

use agora_broadcast::{BroadcastConfig, duration_ms};
use serde::{Deserialize, Serialize};

use crate::AgoraError;

/// Prefix of every environment variable the server reads.
pub const ENV_PREFIX: &str = "AGORA";

/// Separates the prefix and nested keys, e.g. `AGORA__BROADCAST__SEND_TIMEOUT_MS`.
pub const ENV_SEPARATOR: &str = "__";

/// Everything the server needs besides a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: String,

    /// How long a subscription request may spend being validated before
    /// it is turned away.
    #[serde(rename = "handshake_timeout_ms", with = "duration_ms")]
    pub handshake_timeout: Duration,

    /// Per-subscriber delivery limits.
    pub broadcast: BroadcastConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            handshake_timeout: Duration::from_secs(5),
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads the config from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    ///
    /// # Errors
    /// [`AgoraError::Config`] if a variable is set but does not parse.
    pub fn from_env() -> Result<Self, AgoraError> {
        Self::load(Self::environment())
    }

    fn environment() -> ::config::Environment {
        ::config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
    }

    fn load(source: ::config::Environment) -> Result<Self, AgoraError> {
        let mut config: Self = ::config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;

        config.broadcast = config.broadcast.validated();
        Ok(config)
    }
}
