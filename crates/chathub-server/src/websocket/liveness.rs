//! Ping/pong liveness timing.
//!
//! The write loop sends a Ping every `ping_interval`; the read loop gives up
//! once `pong_wait` passes without a Pong. `ping_interval` must be shorter
//! than `pong_wait` so a healthy peer always answers in time.

use std::time::Duration;

use chathub_settings::HubSettings;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Liveness and write-deadline timing for one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LivenessPolicy {
    /// Interval between server Pings.
    pub ping_interval: Duration,
    /// Longest allowed silence since the last Pong.
    pub pong_wait: Duration,
    /// Deadline for a single transport write (including its flush).
    pub write_wait: Duration,
}

impl LivenessPolicy {
    /// Policy with the ping interval at 9/10 of `pong_wait`.
    pub fn from_pong_wait(pong_wait: Duration, write_wait: Duration) -> Self {
        Self {
            ping_interval: pong_wait * 9 / 10,
            pong_wait,
            write_wait,
        }
    }

    /// When the read side should give up, given the last Pong.
    pub fn read_deadline(&self, last_pong: Instant) -> Instant {
        last_pong + self.pong_wait
    }

    /// Whether `now` is at or past the read deadline.
    pub fn is_expired(&self, last_pong: Instant, now: Instant) -> bool {
        now >= self.read_deadline(last_pong)
    }

    /// Ping timer whose first tick fires one interval from now.
    ///
    /// Missed ticks are delayed rather than bursted, so a stalled writer
    /// sends one Ping when it recovers.
    pub fn ping_ticker(&self) -> Interval {
        let period = self.ping_interval.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self::from_pong_wait(Duration::from_secs(60), Duration::from_secs(10))
    }
}

impl From<&HubSettings> for LivenessPolicy {
    fn from(settings: &HubSettings) -> Self {
        Self {
            ping_interval: settings.ping_interval(),
            pong_wait: settings.pong_wait(),
            write_wait: settings.write_wait(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing() {
        let policy = LivenessPolicy::default();
        assert_eq!(policy.pong_wait, Duration::from_secs(60));
        assert_eq!(policy.ping_interval, Duration::from_secs(54));
        assert_eq!(policy.write_wait, Duration::from_secs(10));
        assert!(policy.ping_interval < policy.pong_wait);
    }

    #[test]
    fn from_settings_matches_defaults() {
        let policy = LivenessPolicy::from(&HubSettings::default());
        assert_eq!(policy, LivenessPolicy::default());
    }

    #[tokio::test(start_paused = true)]
    async fn read_deadline_tracks_last_pong() {
        let policy = LivenessPolicy::from_pong_wait(Duration::from_secs(10), Duration::from_secs(1));
        let start = Instant::now();
        assert_eq!(policy.read_deadline(start), start + Duration::from_secs(10));
        assert!(!policy.is_expired(start, start + Duration::from_secs(9)));
        assert!(policy.is_expired(start, start + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn ping_ticker_skips_immediate_tick() {
        let policy = LivenessPolicy::from_pong_wait(Duration::from_secs(10), Duration::from_secs(1));
        let start = Instant::now();
        let mut ticker = policy.ping_ticker();
        let first = ticker.tick().await;
        assert_eq!(first - start, Duration::from_secs(9));
        let second = ticker.tick().await;
        assert_eq!(second - first, Duration::from_secs(9));
    }
}
