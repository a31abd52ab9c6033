//! Connection hub limits and policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// What the registry does when a second connection arrives for an identity
/// that already has a live one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    /// Tear down the existing connection and register the new one.
    #[default]
    Supersede,
    /// Keep the existing connection and refuse the new one.
    RejectSecond,
}

impl DuplicatePolicy {
    /// Parse the settings-file spelling (case-insensitive, `-`/`_` tolerant).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().replace(['-', '_'], "").as_str() {
            "supersede" => Some(Self::Supersede),
            "rejectsecond" | "reject" => Some(Self::RejectSecond),
            _ => None,
        }
    }
}

/// Per-connection limits and liveness timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// How long a connection may go without a pong before it is dropped.
    pub pong_wait_ms: u64,
    /// Interval between server pings. Unset means 9/10 of `pong_wait_ms`;
    /// an explicit value must be below it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_ms: Option<u64>,
    /// Deadline for a single transport write.
    pub write_wait_ms: u64,
    /// Duplicate-identity registration policy.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            max_message_size: 512,
            pong_wait_ms: 60_000,
            ping_interval_ms: None,
            write_wait_ms: 10_000,
            duplicate_policy: DuplicatePolicy::Supersede,
        }
    }
}

impl HubSettings {
    /// Pong wait as a [`Duration`].
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Effective ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.resolved_ping_ms())
    }

    fn resolved_ping_ms(&self) -> u64 {
        self.ping_interval_ms
            .unwrap_or_else(|| self.pong_wait_ms.saturating_mul(9) / 10)
    }

    /// Write deadline as a [`Duration`].
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    /// Reject zero limits and a ping interval that would not beat the peer's
    /// pong wait.
    pub fn validate(&self) -> Result<()> {
        if self.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "sendQueueCapacity must be > 0".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "maxMessageSize must be > 0".into(),
            ));
        }
        if self.write_wait_ms == 0 {
            return Err(SettingsError::InvalidValue("writeWaitMs must be > 0".into()));
        }
        let ping = self.resolved_ping_ms();
        if ping == 0 || ping >= self.pong_wait_ms {
            return Err(SettingsError::InvalidValue(format!(
                "pingIntervalMs ({ping}) must be > 0 and < pongWaitMs ({})",
                self.pong_wait_ms
            )));
        }
        Ok(())
    }
}
