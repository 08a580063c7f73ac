use crate::alert::SoundAlert;
use crate::events::{DetectorEvent, EventBus};
use crate::overlay;
use crate::sampler::{FrameSource, SampleError};
use crate::sched::{DetectionTicker, HoldTimer};
use crate::scorer;
use crate::settings::Settings;
use crate::state::{CycleOutcome, MotionTracker};
use crate::stats::FrameRateCounter;
use motion_watch_common::frame::PixelFrame;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cadence of detection cycles.
pub const DETECTION_INTERVAL: Duration = Duration::from_millis(100);
/// How long motion status is held after the last qualifying frame.
pub const MOTION_HOLD: Duration = Duration::from_millis(2000);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not read the first frame: {0}")]
    FirstFrame(#[from] SampleError),
}

enum SessionCommand {
    Suspend,
    Resume,
    Stop,
}

/// Control handle for a running detection session.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Halt detection cycles without touching detector state. The hold
    /// timer, if armed, keeps running.
    pub async fn suspend(&self) {
        let _ = self.commands.send(SessionCommand::Suspend).await;
    }

    /// Restart detection cycles after a suspension.
    pub async fn resume(&self) {
        let _ = self.commands.send(SessionCommand::Resume).await;
    }

    /// Stop the session, release the capture source and wait for the
    /// session task to finish winding down.
    pub async fn stop(self) {
        let _ = self.commands.send(SessionCommand::Stop).await;
        let _ = self.task.await;
    }
}

/// Start a detection session over the given frame source.
///
/// The source must already have a frame available: its decoded dimensions
/// become the fixed session resolution. Detection begins on the next tick.
pub fn start<S: FrameSource>(
    mut source: S,
    settings: Settings,
    events: EventBus,
    alert: SoundAlert,
) -> Result<SessionHandle, SessionError> {
    let (width, height) = source.probe_resolution()?;
    info!(width, height, "detection session started");
    events.publish(DetectorEvent::SessionStarted { width, height });

    let (commands, command_rx) = mpsc::channel(16);
    let task = tokio::spawn(async move {
        let session = DetectorSession {
            source: Some(Box::new(source)),
            canvas: PixelFrame::new(width, height),
            reference: None,
            tracker: MotionTracker::new(),
            ticker: DetectionTicker::new(DETECTION_INTERVAL),
            hold: HoldTimer::new(),
            frame_rate: FrameRateCounter::new(Instant::now()),
            settings,
            events,
            alert,
            commands: command_rx,
        };
        session.run().await;
    });

    Ok(SessionHandle { commands, task })
}

enum Wake {
    Tick,
    HoldExpired,
    Command(Option<SessionCommand>),
}

struct DetectorSession {
    /// `None` only after shutdown; dropping the source releases the camera.
    source: Option<Box<dyn FrameSource>>,
    /// The shared drawing surface: the sampler writes it, the overlay marks
    /// it up afterwards.
    canvas: PixelFrame,
    /// Baseline for the next comparison. `None` until the first frame of a
    /// session has been sampled.
    reference: Option<PixelFrame>,
    tracker: MotionTracker,
    ticker: DetectionTicker,
    hold: HoldTimer,
    frame_rate: FrameRateCounter,
    settings: Settings,
    events: EventBus,
    alert: SoundAlert,
    commands: mpsc::Receiver<SessionCommand>,
}

impl DetectorSession {
    async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                _ = self.ticker.tick() => Wake::Tick,
                _ = self.hold.expired() => Wake::HoldExpired,
                cmd = self.commands.recv() => Wake::Command(cmd),
            };

            match wake {
                Wake::Tick => self.run_cycle(),
                Wake::HoldExpired => {
                    if self.tracker.on_hold_expired() {
                        info!("motion ended");
                        self.events.publish(DetectorEvent::MotionEnded);
                    }
                }
                Wake::Command(Some(SessionCommand::Suspend)) => {
                    if self.ticker.is_running() {
                        info!("detection suspended");
                        self.ticker.suspend();
                    }
                }
                Wake::Command(Some(SessionCommand::Resume)) => {
                    if !self.ticker.is_running() {
                        info!("detection resumed");
                        self.ticker.resume();
                    }
                }
                // A dropped handle stops the session like an explicit stop
                Wake::Command(Some(SessionCommand::Stop)) | Wake::Command(None) => {
                    self.shutdown();
                    return;
                }
            }
        }
    }

    /// One detection cycle: sample, score, transition, re-baseline.
    fn run_cycle(&mut self) {
        // Settings are read fresh every cycle so live changes apply
        // immediately; nothing below re-reads them.
        let settings = self.settings.get();

        let Some(source) = self.source.as_mut() else {
            return;
        };
        if let Err(e) = source.sample_into(&mut self.canvas) {
            warn!(error = %e, "frame capture failed, skipping cycle");
            return;
        }

        // First cycle of a session: no baseline to compare against yet
        let Some(reference) = self.reference.take() else {
            debug!("first frame, installing reference");
            self.reference = Some(self.canvas.clone());
            return;
        };

        let now = Instant::now();
        if let Some(fps) = self.frame_rate.record_cycle(now) {
            debug!(fps, "detection rate");
            self.events.publish(DetectorEvent::FrameRate { fps });
        }

        let score = scorer::diff_frames(&self.canvas, &reference, settings.sensitivity);
        let level = scorer::motion_level(score.scaled_changed_pixels, settings.min_pixels);

        // The next baseline is the clean frame, captured before the overlay
        // marks up the canvas
        let next_reference = self.canvas.clone();
        overlay::highlight_changes(&mut self.canvas, &score.changed);

        debug!(
            scaled = score.scaled_changed_pixels,
            level = format!("{level:.0}"),
            "cycle scored"
        );
        self.events.publish(DetectorEvent::Level {
            motion_level: level,
            scaled_changed_pixels: score.scaled_changed_pixels,
        });

        let qualifying = score.scaled_changed_pixels > settings.min_pixels;
        match self.tracker.on_cycle(qualifying, now) {
            CycleOutcome::MotionStarted => {
                info!(
                    scaled = score.scaled_changed_pixels,
                    min_pixels = settings.min_pixels,
                    "motion detected"
                );
                self.events.publish(DetectorEvent::MotionStarted);
                if settings.sound_enabled {
                    self.alert.play();
                }
                self.hold.arm(MOTION_HOLD);
            }
            CycleOutcome::MotionExtended => {
                self.hold.arm(MOTION_HOLD);
            }
            CycleOutcome::NoChange => {}
        }

        self.reference = Some(next_reference);
    }

    /// Synchronous teardown: cancel both timers, release the capture
    /// source, reset all derived state.
    fn shutdown(&mut self) {
        self.ticker.suspend();
        self.hold.cancel();
        if self.tracker.reset() {
            self.events.publish(DetectorEvent::MotionEnded);
        }
        self.reference = None;
        self.canvas.clear();
        self.source = None;
        self.events.publish(DetectorEvent::SessionStopped);
        info!("detection session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_watch_common::config::AlertConfig;
    use tokio::time::timeout;

    /// Plays back a fixed frame sequence, repeating the last frame forever.
    struct ScriptedSource {
        frames: Vec<PixelFrame>,
        cursor: usize,
    }

    impl ScriptedSource {
        fn new(frames: Vec<PixelFrame>) -> Self {
            assert!(!frames.is_empty());
            Self { frames, cursor: 0 }
        }
    }

    impl FrameSource for ScriptedSource {
        fn probe_resolution(&mut self) -> Result<(u32, u32), SampleError> {
            Ok((self.frames[0].width(), self.frames[0].height()))
        }

        fn sample_into(&mut self, canvas: &mut PixelFrame) -> Result<(), SampleError> {
            let frame = &self.frames[self.cursor.min(self.frames.len() - 1)];
            canvas.data.copy_from_slice(&frame.data);
            self.cursor += 1;
            Ok(())
        }
    }

    fn filled(rgb: u8) -> PixelFrame {
        let mut frame = PixelFrame::new(32, 24);
        frame.fill_rgb(rgb, rgb, rgb);
        frame
    }

    fn test_settings() -> Settings {
        Settings::new(crate::settings::DetectionSettings {
            sensitivity: 50,
            // A full 32x24 flip scores 768, comfortably above this
            min_pixels: 100,
            sound_enabled: false,
        })
    }

    fn silent_alert() -> SoundAlert {
        SoundAlert::from_config(&AlertConfig {
            player: "true".into(),
            sound_file: "/dev/null".into(),
        })
    }

    async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<DetectorEvent>) -> DetectorEvent {
        timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("no event before timeout")
            .expect("event channel closed")
    }

    /// Wait for the next transition event, skipping level/rate chatter.
    async fn next_transition(
        rx: &mut tokio::sync::broadcast::Receiver<DetectorEvent>,
    ) -> DetectorEvent {
        loop {
            match next_event(rx).await {
                DetectorEvent::Level { .. } | DetectorEvent::FrameRate { .. } => continue,
                other => return other,
            }
        }
    }

    /// Wait for the next level reading, skipping rate chatter.
    async fn next_level(rx: &mut tokio::sync::broadcast::Receiver<DetectorEvent>) -> u32 {
        loop {
            match next_event(rx).await {
                DetectorEvent::Level {
                    scaled_changed_pixels,
                    ..
                } => return scaled_changed_pixels,
                DetectorEvent::FrameRate { .. } => continue,
                other => panic!("expected a level event, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_cycle_never_triggers_motion() {
        // The very first cycle only installs the reference frame: a bright
        // first frame produces no score and no motion event.
        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let source = ScriptedSource::new(vec![filled(255)]);
        let handle = start(source, test_settings(), events, silent_alert()).unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            DetectorEvent::SessionStarted {
                width: 32,
                height: 24
            }
        ));

        // The first scored cycle compares frame 2 against frame 1 — both
        // white — so the score is zero and nothing fires.
        assert_eq!(next_level(&mut rx).await, 0);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn motion_starts_once_and_ends_after_the_hold() {
        let events = EventBus::new(256);
        let mut rx = events.subscribe();
        // black baseline, a flip to white (qualifying), two identical white
        // frames, then a flip back to black (qualifying again, re-arming
        // the hold), and stillness from there on
        let source = ScriptedSource::new(vec![
            filled(0),
            filled(255),
            filled(255),
            filled(255),
            filled(0),
        ]);
        let handle = start(source, test_settings(), events, silent_alert()).unwrap();

        assert!(matches!(
            next_transition(&mut rx).await,
            DetectorEvent::SessionStarted { .. }
        ));

        assert_eq!(next_transition(&mut rx).await, DetectorEvent::MotionStarted);
        let started_at = Instant::now();

        // Exactly one ended event follows, and no second start
        assert_eq!(next_transition(&mut rx).await, DetectorEvent::MotionEnded);
        let held_for = started_at.elapsed();

        // The hold runs 2s from the last qualifying frame, which came three
        // cycles (300ms) after the first
        assert!(held_for >= MOTION_HOLD, "held for only {held_for:?}");
        assert!(held_for <= MOTION_HOLD + Duration::from_millis(500));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn still_frames_keep_the_state_idle() {
        let events = EventBus::new(256);
        let mut rx = events.subscribe();
        let source = ScriptedSource::new(vec![filled(128)]);
        let handle = start(source, test_settings(), events, silent_alert()).unwrap();

        assert!(matches!(
            next_transition(&mut rx).await,
            DetectorEvent::SessionStarted { .. }
        ));

        // A second of identical frames: zero scores, no transitions
        for _ in 0..8 {
            assert_eq!(next_level(&mut rx).await, 0);
        }

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn suspension_stops_cycles_and_preserves_state() {
        let events = EventBus::new(256);
        let mut rx = events.subscribe();
        let source = ScriptedSource::new(vec![filled(64)]);
        let handle = start(source, test_settings(), events, silent_alert()).unwrap();

        assert!(matches!(
            next_transition(&mut rx).await,
            DetectorEvent::SessionStarted { .. }
        ));
        assert_eq!(next_level(&mut rx).await, 0);

        handle.suspend().await;
        // At most one in-flight cycle can still land; after that, silence
        tokio::time::sleep(Duration::from_millis(300)).await;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(
                event,
                DetectorEvent::Level { .. } | DetectorEvent::FrameRate { .. }
            ));
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());

        // Resume: identical frames, so scores come back but never a motion
        // start — the reference frame survived the suspension
        handle.resume().await;
        assert_eq!(next_level(&mut rx).await, 0);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hold_keeps_running_through_a_suspension() {
        let events = EventBus::new(256);
        let mut rx = events.subscribe();
        let source = ScriptedSource::new(vec![filled(0), filled(255)]);
        let handle = start(source, test_settings(), events, silent_alert()).unwrap();

        assert!(matches!(
            next_transition(&mut rx).await,
            DetectorEvent::SessionStarted { .. }
        ));
        assert_eq!(next_transition(&mut rx).await, DetectorEvent::MotionStarted);

        // Suspend immediately: no cycles re-arm the hold, but the pending
        // reversion still fires on schedule
        handle.suspend().await;
        assert_eq!(next_transition(&mut rx).await, DetectorEvent::MotionEnded);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_motion_forces_idle() {
        let events = EventBus::new(256);
        let mut rx = events.subscribe();
        let source = ScriptedSource::new(vec![filled(0), filled(255)]);
        let handle = start(source, test_settings(), events, silent_alert()).unwrap();

        assert!(matches!(
            next_transition(&mut rx).await,
            DetectorEvent::SessionStarted { .. }
        ));
        assert_eq!(next_transition(&mut rx).await, DetectorEvent::MotionStarted);

        handle.stop().await;

        // Forced back to idle before the stop confirmation
        assert_eq!(next_transition(&mut rx).await, DetectorEvent::MotionEnded);
        assert_eq!(next_transition(&mut rx).await, DetectorEvent::SessionStopped);
    }

    #[tokio::test(start_paused = true)]
    async fn settings_changes_apply_mid_session() {
        let events = EventBus::new(512);
        let mut rx = events.subscribe();
        // black baseline, a qualifying flip to gray, a stretch of identical
        // gray frames, then a flip to white at cycle 11
        let mut frames = vec![filled(0)];
        frames.extend(std::iter::repeat_with(|| filled(128)).take(9));
        frames.push(filled(255));
        let source = ScriptedSource::new(frames);

        let settings = test_settings();
        let handle = start(source, settings.clone(), events, silent_alert()).unwrap();

        assert!(matches!(
            next_transition(&mut rx).await,
            DetectorEvent::SessionStarted { .. }
        ));
        assert_eq!(next_transition(&mut rx).await, DetectorEvent::MotionStarted);

        // Raise the motion threshold far beyond what a full-frame flip can
        // score; the white flip at cycle 11 must not start motion
        settings.set_min_pixels(1_000_000);

        // The hold from the gray flip expires, and the later white flip
        // produces a score but no new start
        assert_eq!(next_transition(&mut rx).await, DetectorEvent::MotionEnded);
        tokio::time::sleep(Duration::from_secs(1)).await;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, DetectorEvent::MotionStarted));
        }

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn frame_rate_is_reported() {
        let events = EventBus::new(512);
        let mut rx = events.subscribe();
        let source = ScriptedSource::new(vec![filled(32)]);
        let handle = start(source, test_settings(), events, silent_alert()).unwrap();

        let mut fps = None;
        for _ in 0..40 {
            if let DetectorEvent::FrameRate { fps: f } = next_event(&mut rx).await {
                fps = Some(f);
                break;
            }
        }
        // 100ms cadence; the bootstrap cycle is never counted, so the first
        // window holds one cycle less than a full second's worth
        let fps = fps.expect("no frame rate report within four seconds");
        assert!((9..=10).contains(&fps), "unexpected rate {fps}");

        handle.stop().await;
    }
}
