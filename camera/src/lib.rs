//! HTTP camera capture source.
//!
//! A [`Camera`] owns a background ingest task that keeps the most recent
//! frame from the device available in a watch slot. The detector pulls
//! whatever frame is current at each detection tick; it never blocks on the
//! stream itself.

mod mjpeg;

use motion_watch_common::config::CameraConfig;
use motion_watch_common::frame::JpegFrame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("unknown camera mode '{0}', expected 'mjpeg' or 'polling'")]
    UnknownMode(String),
    #[error("invalid poll rate {0} fps")]
    InvalidPollRate(f64),
    #[error("no frame received within {0}s")]
    ConnectTimeout(u64),
    #[error("camera ingest ended before the first frame arrived")]
    Closed,
}

/// A live camera connection with the latest frame always at hand.
#[derive(Debug)]
pub struct Camera {
    frames: watch::Receiver<Option<Arc<JpegFrame>>>,
    ingest: JoinHandle<()>,
}

impl Camera {
    /// Connect to the camera and wait for the first frame.
    ///
    /// The preferred resolution and quality are passed as query parameters;
    /// the device is free to deliver a different size, and whatever the first
    /// frame decodes to becomes the session resolution. If no frame arrives
    /// within `connect_timeout_secs` the connection is torn down and an error
    /// returned — the caller decides whether to re-initiate.
    pub async fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let (tx, rx) = watch::channel(None);

        let ingest = match config.mode.as_str() {
            "mjpeg" => {
                let url = format!(
                    "{}?width={}&height={}&quality={}",
                    config.url, config.ideal_width, config.ideal_height, config.quality
                );
                tokio::spawn(mjpeg::run_stream_ingest(url, tx))
            }
            "polling" => {
                if !(config.poll_fps > 0.0) {
                    return Err(CameraError::InvalidPollRate(config.poll_fps));
                }
                let url = format!(
                    "{}?width={}&height={}&quality={}",
                    config.url.replace("/stream", "/frame"),
                    config.ideal_width,
                    config.ideal_height,
                    config.quality
                );
                let interval = Duration::from_secs_f64(1.0 / config.poll_fps);
                tokio::spawn(mjpeg::run_polling_ingest(url, interval, tx))
            }
            other => return Err(CameraError::UnknownMode(other.to_string())),
        };

        let mut first = rx.clone();
        let wait = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            first.wait_for(|f| f.is_some()),
        );
        match wait.await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => {
                ingest.abort();
                return Err(CameraError::Closed);
            }
            Err(_) => {
                ingest.abort();
                return Err(CameraError::ConnectTimeout(config.connect_timeout_secs));
            }
        }

        debug!("camera delivered its first frame");
        Ok(Self { frames: rx, ingest })
    }

    /// The most recently ingested frame, if any.
    pub fn latest(&self) -> Option<Arc<JpegFrame>> {
        self.frames.borrow().clone()
    }
}

impl Drop for Camera {
    // Releases the capture source: the ingest task holds the HTTP connection.
    fn drop(&mut self) {
        self.ingest.abort();
    }
}
