//! Fire-and-forget playback through the room speaker.
//!
//! [`PlaybackManager::play`] returns as soon as the player process is running. A task on
//! the blocking pool waits for it, drops the artifact (unlinking the WAV) and logs the
//! outcome. Overlapping plays are independent.

use crate::artifact::AudioArtifact;
use crate::error::{VoiceError, VoiceResult};
use pangool_core::PlaybackConfig;
use std::process::{Command, Stdio};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How a background playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed { code: Option<i32>, stderr: String },
}

/// Handle on a running playback. Dropping it detaches; the artifact is still cleaned up.
#[derive(Debug)]
pub struct PlaybackHandle {
    task: JoinHandle<PlaybackOutcome>,
}

impl PlaybackHandle {
    /// Wait until the player has exited and the artifact is gone.
    pub async fn finished(self) -> VoiceResult<PlaybackOutcome> {
        self.task
            .await
            .map_err(|e| VoiceError::Playback(format!("playback task failed: {}", e)))
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackManager {
    player_bin: String,
}

impl PlaybackManager {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            player_bin: config.player_bin.clone(),
        }
    }

    /// Start playing `artifact` and take ownership of it. Must be called inside a tokio runtime.
    pub fn play(&self, artifact: AudioArtifact) -> VoiceResult<PlaybackHandle> {
        if !artifact.exists() {
            warn!(
                target: "pangool::playback",
                path = %artifact.path().display(),
                "Audio file missing, nothing to play"
            );
            return Err(VoiceError::Playback(format!(
                "audio file {} does not exist",
                artifact.path().display()
            )));
        }

        let child = Command::new(&self.player_bin)
            .arg(artifact.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    target: "pangool::playback",
                    player = %self.player_bin,
                    "Player could not be started: {}",
                    e
                );
                return Err(VoiceError::Playback(format!(
                    "{} could not be started: {}",
                    self.player_bin, e
                )));
            }
        };

        info!(
            target: "pangool::playback",
            pid = child.id(),
            path = %artifact.path().display(),
            "Playback started"
        );

        let task = tokio::task::spawn_blocking(move || {
            let waited = child.wait_with_output();
            drop(artifact);
            match waited {
                Ok(output) if output.status.success() => {
                    info!(target: "pangool::playback", "Playback finished");
                    PlaybackOutcome::Completed
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    warn!(
                        target: "pangool::playback",
                        code = ?output.status.code(),
                        "Player failed: {}",
                        stderr
                    );
                    PlaybackOutcome::Failed {
                        code: output.status.code(),
                        stderr,
                    }
                }
                Err(e) => {
                    warn!(target: "pangool::playback", "Waiting for player failed: {}", e);
                    PlaybackOutcome::Failed {
                        code: None,
                        stderr: e.to_string(),
                    }
                }
            }
        });

        Ok(PlaybackHandle { task })
    }
}
