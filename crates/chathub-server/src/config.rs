//! Server configuration.

use chathub_settings::{ChatHubSettings, DuplicatePolicy, HubSettings};

use crate::websocket::liveness::LivenessPolicy;

/// Runtime limits for the connection hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Ping/pong and write-deadline timing.
    pub liveness: LivenessPolicy,
    /// What to do when an identity connects twice.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&HubSettings::default())
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        Self {
            send_queue_capacity: settings.send_queue_capacity,
            max_message_size: settings.max_message_size,
            liveness: LivenessPolicy::from(settings),
            duplicate_policy: settings.duplicate_policy,
        }
    }
}

/// Configuration for the HTTP listener and the hub behind it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Hub limits.
    pub hub: HubConfig,
}

impl ServerConfig {
    /// Listener and hub settings from the loaded settings tree.
    pub fn from_settings(settings: &ChatHubSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            hub: HubConfig::from(&settings.hub),
        }
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            hub: HubConfig::default(),
        }
    }
}
