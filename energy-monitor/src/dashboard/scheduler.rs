use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

/// What happens to ticks that fall due while the previous invocation is
/// still running. Invocations never overlap either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrunPolicy {
    /// Drop the missed ticks and resume on the regular schedule.
    Skip,
    /// Fire once as soon as possible, then a full period after that.
    Delay,
}

/// A repeating timer that can be switched off.
///
/// Callers await [`tick`](RepeatingTimer::tick) and run their job inline, so
/// one timer never runs two jobs at once.
pub struct RepeatingTimer {
    interval: Interval,
    enabled: bool,
}

impl RepeatingTimer {
    /// The first tick completes immediately.
    pub fn new(period: Duration, policy: OverrunPolicy) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(match policy {
            OverrunPolicy::Skip => MissedTickBehavior::Skip,
            OverrunPolicy::Delay => MissedTickBehavior::Delay,
        });
        Self {
            interval,
            enabled: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-enabling restarts the period from now.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.interval.reset();
        }
        self.enabled = enabled;
    }

    /// Completes at the next tick. Never completes while disabled.
    pub async fn tick(&mut self) {
        if self.enabled {
            self.interval.tick().await;
        } else {
            std::future::pending::<()>().await;
        }
    }
}
