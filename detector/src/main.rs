mod alert;
mod events;
mod overlay;
mod sampler;
mod sched;
mod scorer;
mod session;
mod settings;
mod state;
mod stats;

use events::{DetectorEvent, EventBus};
use motion_watch_camera::Camera;
use motion_watch_common::config::Config;
use sampler::CameraSampler;
use session::SessionHandle;
use settings::Settings;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        url = config.camera.url,
        mode = config.camera.mode,
        sensitivity = config.detection.sensitivity,
        min_pixels = config.detection.min_pixels,
        sound_enabled = config.detection.sound_enabled,
        "starting motion-watch detector"
    );

    if config.detection.sound_enabled {
        alert::check_player_available(&config.alert).await;
    }

    let camera = match Camera::open(&config.camera).await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "camera unavailable, detection not started");
            std::process::exit(1);
        }
    };

    let settings = Settings::from_config(&config.detection);
    let events = EventBus::new(64);

    // Status display: renders detector events the way the user sees them
    let display_rx = events.subscribe();
    tokio::spawn(run_status_display(display_rx));

    let handle = match session::start(
        CameraSampler::new(camera),
        settings,
        events,
        alert::SoundAlert::from_config(&config.alert),
    ) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "camera unavailable, detection not started");
            std::process::exit(1);
        }
    };

    run_control_loop(&handle).await;
    handle.stop().await;
}

/// Block until shutdown is requested, mapping host signals onto the session
/// lifecycle: SIGUSR1 suspends detection, SIGUSR2 resumes it, Ctrl-C stops.
#[cfg(unix)]
async fn run_control_loop(handle: &SessionHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut suspend = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "could not install SIGUSR1 handler, suspend unavailable");
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            return;
        }
    };
    let mut resume = match signal(SignalKind::user_defined2()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "could not install SIGUSR2 handler, resume unavailable");
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                return;
            }
            _ = suspend.recv() => {
                info!("visibility lost, suspending detection");
                handle.suspend().await;
            }
            _ = resume.recv() => {
                info!("visibility regained, resuming detection");
                handle.resume().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn run_control_loop(_handle: &SessionHandle) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

async fn run_status_display(mut rx: broadcast::Receiver<DetectorEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match rx.recv().await {
            Ok(DetectorEvent::SessionStarted { width, height }) => {
                info!("RESOLUTION: {width}x{height}");
            }
            Ok(DetectorEvent::MotionStarted) => {
                info!("MOTION DETECTED");
            }
            Ok(DetectorEvent::MotionEnded) => {
                info!("NO MOTION");
            }
            Ok(DetectorEvent::FrameRate { fps }) => {
                info!("FPS: {fps}");
            }
            Ok(DetectorEvent::Level {
                motion_level,
                scaled_changed_pixels,
            }) => {
                debug!(
                    scaled = scaled_changed_pixels,
                    "LEVEL: {motion_level:.0}%"
                );
            }
            Ok(DetectorEvent::SessionStopped) => {
                info!("NO MOTION");
                return;
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "status display fell behind, events dropped");
            }
            Err(RecvError::Closed) => return,
        }
    }
}
