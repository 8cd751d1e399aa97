//! Alert Throttle
//!
//! Per-zone cooldown for voice notifications. The siren is never gated
//! here; only the voice channel is throttled so one lingering violation
//! cannot ring a supervisor every sampling tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Observable throttle state for a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleStatus {
    /// No cooldown armed; the next violation dispatches
    Idle,
    /// Inside the cooldown window; dispatches are suppressed
    Cooldown,
}

/// Decision for one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Caller should dispatch; the cooldown is armed as of now
    Dispatch,
    /// Suppressed, with the remaining window time
    Suppressed { remaining: Duration },
}

/// Per-zone voice alert throttle. State lives in memory only and resets
/// with the process.
pub struct AlertThrottle {
    window: Duration,
    /// zone -> last dispatch attempt
    last_attempt: RwLock<HashMap<String, Instant>>,
}

impl AlertThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_attempt: RwLock::new(HashMap::new()),
        }
    }

    /// Test-and-arm in one critical section, so two concurrent frames for
    /// the same zone can never both pass.
    ///
    /// The stamp is taken at the attempt, not at confirmed delivery: a
    /// failed call must not re-open the window while the channel is
    /// degraded. Expiry is evaluated lazily right here; there is no
    /// background timer.
    pub async fn try_acquire(&self, zone: &str) -> ThrottleDecision {
        let now = Instant::now();
        let mut last = self.last_attempt.write().await;
        match last.get(zone) {
            Some(&stamp) if now.duration_since(stamp) < self.window => {
                ThrottleDecision::Suppressed {
                    remaining: self.window - now.duration_since(stamp),
                }
            }
            _ => {
                last.insert(zone.to_string(), now);
                ThrottleDecision::Dispatch
            }
        }
    }

    /// Current state for a zone, without mutating it
    pub async fn status(&self, zone: &str) -> ThrottleStatus {
        let last = self.last_attempt.read().await;
        match last.get(zone) {
            Some(&stamp) if stamp.elapsed() < self.window => ThrottleStatus::Cooldown,
            _ => ThrottleStatus::Idle,
        }
    }
}
