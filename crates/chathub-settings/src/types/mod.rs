//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial: missing fields keep their compiled default.

mod hub;
mod server;

pub use hub::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Root settings type.
///
/// Loaded from `~/.chathub/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values. Example:
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "hub": { "sendQueueCapacity": 512, "duplicatePolicy": "rejectSecond" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatHubSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Connection hub limits and policies.
    pub hub: HubSettings,
    /// Token validation settings.
    pub auth: AuthSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl ChatHubSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.hub.validate()
    }
}
