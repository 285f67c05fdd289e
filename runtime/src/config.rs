//! Runtime configuration, separate from domain policy.
//!
//! Covers the transport-facing knobs: topic names and channel sizing. Domain
//! policy (field whitelists, display, slugs) lives in
//! [`live_users_core::DomainConfig`].

use std::env;

/// Runtime configuration for the service.
#[derive(Clone, Debug)]
pub struct Config {
    /// Topic carrying user-aggregate events.
    pub user_topic: String,
    /// Topic carrying cross-service session notifications.
    pub session_topic: String,
    /// Buffer size of the aggregate change channel, per subscriber.
    pub change_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_topic: live_users_core::event::USER_TOPIC.to_string(),
            session_topic: live_users_core::event::SESSION_TOPIC.to_string(),
            change_capacity: 256,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// Recognized variables: `USERS_USER_TOPIC`, `USERS_SESSION_TOPIC`,
    /// `USERS_CHANGE_CAPACITY`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_topic: env::var("USERS_USER_TOPIC").unwrap_or(defaults.user_topic),
            session_topic: env::var("USERS_SESSION_TOPIC").unwrap_or(defaults.session_topic),
            change_capacity: env::var("USERS_CHANGE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.change_capacity),
        }
    }
}
