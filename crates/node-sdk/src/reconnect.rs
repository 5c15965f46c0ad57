//! Reconnect policy: fixed delay, bounded attempts.
//!
//! Deliberately not exponential. The control plane prefers a node that
//! checks back a handful of times at a steady cadence and then stays away
//! until the host re-initializes it.

use std::time::Duration;

use forager_domain::config::ConnectionConfig;

/// Controls how the connection manager retries after an involuntary close.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay between attempts.
    pub delay: Duration,
    /// Consecutive failures before giving up. `0` means unlimited.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.reconnect_delay_ms),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Whether the given attempt number (0-indexed) exceeds the max.
    pub fn should_give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.delay, Duration::from_secs(5));
        assert_eq!(p.max_attempts, 5);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let p = ReconnectPolicy::default();
        assert!(!p.should_give_up(0));
        assert!(!p.should_give_up(4));
        assert!(p.should_give_up(5));
        assert!(p.should_give_up(6));
    }

    #[test]
    fn zero_max_attempts_never_gives_up() {
        let p = ReconnectPolicy {
            delay: Duration::from_secs(5),
            max_attempts: 0,
        };
        assert!(!p.should_give_up(1_000_000));
    }

    #[test]
    fn from_config_picks_up_overrides() {
        let config = ConnectionConfig {
            reconnect_delay_ms: 250,
            max_reconnect_attempts: 2,
            ..ConnectionConfig::default()
        };
        let p = ReconnectPolicy::from_config(&config);
        assert_eq!(p.delay, Duration::from_millis(250));
        assert_eq!(p.max_attempts, 2);
    }
}
