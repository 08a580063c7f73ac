use motion_watch_common::config::AlertConfig;
use tokio::process::Command;
use tracing::{debug, warn};

/// Plays the alert sound by spawning the configured player command.
///
/// Strictly fire-and-forget: the session triggers it once per motion start
/// and never waits on or learns about the outcome. Spawn and playback
/// failures are logged and swallowed.
#[derive(Clone)]
pub struct SoundAlert {
    player: String,
    sound_file: String,
}

impl SoundAlert {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            player: config.player.clone(),
            sound_file: config.sound_file.clone(),
        }
    }

    pub fn play(&self) {
        let player = self.player.clone();
        let sound_file = self.sound_file.clone();
        tokio::spawn(async move {
            let result = Command::new(&player)
                .arg(&sound_file)
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .await;
            match result {
                Ok(status) if status.success() => {
                    debug!(player, sound_file, "alert sound played");
                }
                Ok(status) => {
                    warn!(player, sound_file, %status, "alert player exited with error");
                }
                Err(e) => {
                    warn!(player, sound_file, error = %e, "could not spawn alert player");
                }
            }
        });
    }
}

/// Probe the configured player once at startup. Logs a warning if it is
/// missing so the first motion event is not the moment the user finds out.
pub async fn check_player_available(config: &AlertConfig) {
    match Command::new(&config.player).arg("--version").output().await {
        Ok(out) if out.status.success() => {
            debug!(player = config.player, "alert player is available");
        }
        Ok(_) => {
            warn!(
                player = config.player,
                "alert player returned non-zero for --version; alerts may be silent"
            );
        }
        Err(e) => {
            warn!(
                player = config.player,
                error = %e,
                "alert player not found on PATH; motion alerts will be silent"
            );
        }
    }
}
