//! Position-polling timer
//!
//! The engine arms and disarms the timer from synchronous code; the event
//! loop awaits [`PollTimer::tick`]. The underlying tokio interval is only
//! built on the first tick after arming, so arming never needs a runtime.

use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};

/// Bounds applied to every period; tokio intervals reject zero and
/// `Instant` arithmetic overflows on huge values
const MIN_PERIOD: Duration = Duration::from_millis(1);
const MAX_PERIOD: Duration = Duration::from_secs(3600);

fn bounded(period: Duration) -> Duration {
    period.clamp(MIN_PERIOD, MAX_PERIOD)
}

/// Restartable periodic timer that never fires while stopped
#[derive(Debug)]
pub struct PollTimer {
    period: Duration,
    armed: bool,
    interval: Option<Interval>,
}

impl PollTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period: bounded(period),
            armed: false,
            interval: None,
        }
    }

    /// Arm the timer, discarding any schedule already running
    pub fn start(&mut self) {
        self.armed = true;
        self.interval = None;
    }

    pub fn stop(&mut self) {
        self.armed = false;
        self.interval = None;
    }

    pub fn is_active(&self) -> bool {
        self.armed
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Change the period; takes effect on the next start
    pub fn set_period(&mut self, period: Duration) {
        self.period = bounded(period);
    }

    /// Wait for the next tick
    ///
    /// Pends forever while stopped. The first tick comes one full period
    /// after the timer was armed (or first polled), not immediately.
    pub async fn tick(&mut self) {
        if !self.armed {
            std::future::pending::<()>().await;
        }
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
    }
}
