use tokio::sync::broadcast;

/// Everything the detection session tells the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// Session opened; actual resolution granted by the camera.
    SessionStarted { width: u32, height: u32 },
    /// Per-cycle intensity reading, 0–100.
    Level {
        motion_level: f64,
        scaled_changed_pixels: u32,
    },
    /// The scene started moving.
    MotionStarted,
    /// The scene has been still for the full hold delay.
    MotionEnded,
    /// Achieved detection rate, reported roughly once per second.
    FrameRate { fps: u32 },
    /// Session stopped; all detection state has been reset.
    SessionStopped,
}

/// Broadcast fan-out for detector events.
///
/// Observers subscribe independently; publishing with no subscribers is a
/// no-op, and a slow subscriber only lags itself.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DetectorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: DetectorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DetectorEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_each_see_every_event() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(DetectorEvent::MotionStarted);
        bus.publish(DetectorEvent::MotionEnded);

        assert_eq!(a.recv().await.unwrap(), DetectorEvent::MotionStarted);
        assert_eq!(a.recv().await.unwrap(), DetectorEvent::MotionEnded);
        assert_eq!(b.recv().await.unwrap(), DetectorEvent::MotionStarted);
        assert_eq!(b.recv().await.unwrap(), DetectorEvent::MotionEnded);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.publish(DetectorEvent::FrameRate { fps: 10 });
    }
}
