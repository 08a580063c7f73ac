use tokio::time::Instant;

/// Measures how many detection cycles actually complete per second.
///
/// Cycles can be skipped (capture failures) or stop entirely (suspension),
/// so the reported rate is the real achieved cadence, not the configured one.
pub struct FrameRateCounter {
    cycles: u32,
    window_start: Instant,
}

impl FrameRateCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            cycles: 0,
            window_start: now,
        }
    }

    /// Record one completed cycle. Returns the cycle count once a full
    /// second has elapsed since the last report, then starts a new window.
    pub fn record_cycle(&mut self, now: Instant) -> Option<u32> {
        self.cycles += 1;
        if now.duration_since(self.window_start).as_millis() >= 1000 {
            let fps = self.cycles;
            self.cycles = 0;
            self.window_start = now;
            Some(fps)
        } else {
            None
        }
    }
}
