//! The two timed tasks driving a session: the detection ticker and the
//! motion hold timer. Both are owned and controlled by the session loop, so
//! start/stop/suspend/resume behave deterministically.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, Interval, Sleep};

/// Fixed-cadence ticker for detection cycles.
///
/// Suspending drops the underlying interval entirely — no ticks are
/// produced, and [`DetectionTicker::tick`] stays pending. Resuming creates a
/// fresh interval, so the first tick after resume comes one full period
/// later.
pub struct DetectionTicker {
    period: Duration,
    interval: Option<Interval>,
}

impl DetectionTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: Some(schedule(period)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub fn suspend(&mut self) {
        self.interval = None;
    }

    pub fn resume(&mut self) {
        if self.interval.is_none() {
            self.interval = Some(schedule(self.period));
        }
    }

    /// Completes at the next tick; pending forever while suspended.
    pub async fn tick(&mut self) -> Instant {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await,
            None => pending().await,
        }
    }
}

fn schedule(period: Duration) -> Interval {
    // First tick one full period from now, not immediately
    interval_at(Instant::now() + period, period)
}

/// Cancelable one-shot timer for the motion hold delay.
///
/// Re-arming replaces any pending deadline; canceling leaves the timer
/// pending forever until armed again.
pub struct HoldTimer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl HoldTimer {
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(sleep(Duration::ZERO)),
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn arm(&mut self, delay: Duration) {
        self.sleep.as_mut().reset(Instant::now() + delay);
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    /// Completes when the armed delay elapses; pending forever while
    /// disarmed. Disarms itself on expiry.
    pub async fn expired(&mut self) {
        if !self.armed {
            return pending().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_at_the_period() {
        let mut ticker = DetectionTicker::new(Duration::from_millis(100));
        let start = Instant::now();
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_ticker_stays_pending() {
        let mut ticker = DetectionTicker::new(Duration::from_millis(100));
        ticker.suspend();
        assert!(!ticker.is_running());
        let result = timeout(Duration::from_secs(5), ticker.tick()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_starts_a_fresh_period() {
        let mut ticker = DetectionTicker::new(Duration::from_millis(100));
        ticker.suspend();
        tokio::time::advance(Duration::from_secs(3)).await;
        ticker.resume();
        let resumed = Instant::now();
        ticker.tick().await;
        assert_eq!(resumed.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn hold_fires_after_delay() {
        let mut hold = HoldTimer::new();
        hold.arm(Duration::from_millis(2000));
        let start = Instant::now();
        hold.expired().await;
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
        assert!(!hold.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_hold_stays_pending() {
        let mut hold = HoldTimer::new();
        let result = timeout(Duration::from_secs(5), hold.expired()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_pushes_the_deadline_out() {
        let mut hold = HoldTimer::new();
        let start = Instant::now();
        hold.arm(Duration::from_millis(2000));
        tokio::time::advance(Duration::from_millis(1500)).await;
        hold.arm(Duration::from_millis(2000));
        hold.expired().await;
        assert_eq!(start.elapsed(), Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms_a_pending_hold() {
        let mut hold = HoldTimer::new();
        hold.arm(Duration::from_millis(2000));
        hold.cancel();
        let result = timeout(Duration::from_secs(5), hold.expired()).await;
        assert!(result.is_err());
    }
}
