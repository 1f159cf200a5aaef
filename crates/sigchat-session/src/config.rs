//! Session configuration loaded from environment variables.
//!
//! Every setting has a default, so a session can be created with zero
//! configuration.

use sigchat_shared::constants::DEFAULT_DEVICE_ID;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Device id written at installation.
    /// Env: `SIGCHAT_DEVICE_ID`
    /// Default: `0`
    pub device_id: u32,

    /// Message keys kept for out-of-order delivery, per session state.
    /// Env: `SIGCHAT_MAX_SKIPPED_KEYS`
    /// Default: `1000`
    pub max_skipped_keys: usize,

    /// Superseded session states kept per peer so that crossed session
    /// setups still decrypt.
    /// Env: `SIGCHAT_MAX_ARCHIVED_STATES`
    /// Default: `5`
    pub max_archived_states: usize,

    /// Hash iterations per safety-number half.
    /// Env: `SIGCHAT_SAFETY_NUMBER_ITERATIONS`
    /// Default: `5200`
    pub safety_number_iterations: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            max_skipped_keys: 1000,
            max_archived_states: 5,
            safety_number_iterations: 5200,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = parse_var("SIGCHAT_DEVICE_ID") {
            config.device_id = n;
        }

        if let Some(n) = parse_var("SIGCHAT_MAX_SKIPPED_KEYS") {
            config.max_skipped_keys = n;
        }

        if let Some(n) = parse_var("SIGCHAT_MAX_ARCHIVED_STATES") {
            config.max_archived_states = n;
        }

        if let Some(n) = parse_var::<u32>("SIGCHAT_SAFETY_NUMBER_ITERATIONS") {
            if n == 0 {
                tracing::warn!("SIGCHAT_SAFETY_NUMBER_ITERATIONS must be positive, using default");
            } else {
                config.safety_number_iterations = n;
            }
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(var = name, value = %value, "Invalid value, using default");
            None
        }
    }
}
