//! Payment Agent configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default agent URL for payment application registration.
pub const DEFAULT_REGISTER_URL: &str = "https://web-payments.io/register";
/// Default agent URL for payment mediation.
pub const DEFAULT_MEDIATOR_URL: &str = "https://web-payments.io/mediator";

/// Top-level configuration, usually read from `~/.payagent/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent URL used by `registerApp`.
    pub register_url: String,
    /// Agent URL used by `request`, `acknowledge` and `getPendingRequest`.
    pub mediator_url: String,
    /// Give up on a pending receive after this many seconds. Unset means wait
    /// forever: a counterpart that never replies leaves the flow pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_timeout_secs: Option<u64>,
    /// Popup window dimensions.
    pub popup: PopupConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            register_url: DEFAULT_REGISTER_URL.to_string(),
            mediator_url: DEFAULT_MEDIATOR_URL.to_string(),
            receive_timeout_secs: None,
            popup: PopupConfig::default(),
        }
    }
}

impl AgentConfig {
    /// The receive timeout as a duration, if configured.
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_secs.map(Duration::from_secs)
    }
}

/// Size of the visible agent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}
