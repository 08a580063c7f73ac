use motion_watch_common::config::DetectionConfig;
use parking_lot::RwLock;
use std::sync::Arc;

/// The three live-tunable detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionSettings {
    /// Per-pixel channel-difference threshold (0–765 meaningful range).
    pub sensitivity: u32,
    /// Scaled changed-pixel count above which the frame is in motion.
    pub min_pixels: u32,
    /// Play the alert sound on each motion start.
    pub sound_enabled: bool,
}

/// Clonable handle to the shared settings.
///
/// The session reads a fresh copy at the start of every cycle, so a change
/// made here takes effect on the very next cycle — no snapshotting.
#[derive(Clone)]
pub struct Settings {
    inner: Arc<RwLock<DetectionSettings>>,
}

impl Settings {
    pub fn new(initial: DetectionSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(DetectionSettings {
            sensitivity: config.sensitivity,
            min_pixels: config.min_pixels,
            sound_enabled: config.sound_enabled,
        })
    }

    pub fn get(&self) -> DetectionSettings {
        *self.inner.read()
    }

    pub fn set_sensitivity(&self, sensitivity: u32) {
        self.inner.write().sensitivity = sensitivity;
    }

    pub fn set_min_pixels(&self, min_pixels: u32) {
        self.inner.write().min_pixels = min_pixels;
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.inner.write().sound_enabled = enabled;
    }
}
