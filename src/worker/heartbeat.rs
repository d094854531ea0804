use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::scheduler::{Job, JobStatus};

/// What a heartbeat tick did to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Countdown still running with this much time left
    Counting(Duration),
    /// Countdown reached zero and the completion signal was fired
    Expired,
    /// Job is no longer running; the executor should stop
    Stopped,
}

/// Record one heartbeat against `job`: stamp liveness and step the countdown.
///
/// The countdown clamps at zero. Must be called with the registry's write
/// guard held.
pub fn apply_heartbeat(job: &mut Job, interval: Duration, now: DateTime<Utc>) -> HeartbeatOutcome {
    if job.status() != JobStatus::Running {
        return HeartbeatOutcome::Stopped;
    }

    job.last_heartbeat_at = Some(now);
    job.heartbeat_count += 1;
    job.remaining = job.remaining.saturating_sub(interval);

    if job.remaining.is_zero() {
        job.completion().fire();
        HeartbeatOutcome::Expired
    } else {
        HeartbeatOutcome::Counting(job.remaining)
    }
}

/// Ticker for executor heartbeats. The first tick fires one full period
/// after creation, not immediately.
pub struct HeartbeatTicker {
    interval: Interval,
    period: Duration,
}

impl HeartbeatTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
