use tokio::time::Instant;

/// Whether the detector currently considers the scene to be in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Active,
}

/// What the session must do after feeding one scored cycle into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// First qualifying frame: announce motion, play the alert, arm the hold
    /// timer.
    MotionStarted,
    /// Still qualifying while active: re-arm the hold timer, nothing else.
    MotionExtended,
    /// Below threshold: leave state and timers alone.
    NoChange,
}

/// Threshold-driven Idle/Active tracker.
///
/// Timing lives outside: the session owns the hold timer and calls
/// [`MotionTracker::on_hold_expired`] when it fires. Non-qualifying cycles
/// never touch the timer, so a pending hold keeps running through them.
pub struct MotionTracker {
    state: MotionState,
    last_motion: Option<Instant>,
}

impl MotionTracker {
    pub fn new() -> Self {
        Self {
            state: MotionState::Idle,
            last_motion: None,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Time of the last qualifying frame, if any.
    pub fn last_motion(&self) -> Option<Instant> {
        self.last_motion
    }

    pub fn on_cycle(&mut self, qualifying: bool, now: Instant) -> CycleOutcome {
        if !qualifying {
            return CycleOutcome::NoChange;
        }
        self.last_motion = Some(now);
        match self.state {
            MotionState::Idle => {
                self.state = MotionState::Active;
                CycleOutcome::MotionStarted
            }
            MotionState::Active => CycleOutcome::MotionExtended,
        }
    }

    /// The hold delay elapsed with no qualifying frame re-arming it.
    /// Returns `true` if this actually ended a motion period.
    pub fn on_hold_expired(&mut self) -> bool {
        if self.state == MotionState::Active {
            self.state = MotionState::Idle;
            true
        } else {
            false
        }
    }

    /// Force the tracker back to idle (session stop). Returns `true` if a
    /// motion period was cut short.
    pub fn reset(&mut self) -> bool {
        self.last_motion = None;
        if self.state == MotionState::Active {
            self.state = MotionState::Idle;
            true
        } else {
            false
        }
    }
}

impl Default for MotionTracker {
    fn default() -> Self {
        Self::new()
    }
}
