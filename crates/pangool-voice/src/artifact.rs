//! Owned audio files that remove themselves.
//!
//! An [`AudioArtifact`] is the only handle to a synthesized WAV on disk. Whoever holds it
//! owns the file; dropping it unlinks the path, so early returns, failed strategies and
//! finished playback all release storage the same way.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct AudioArtifact {
    path: PathBuf,
}

impl AudioArtifact {
    /// Take ownership of `path`. The file does not have to exist yet.
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Size on disk, 0 when missing.
    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Remove any partial contents while keeping ownership of the path.
    pub fn clear(&self) {
        remove_quietly(&self.path);
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(target: "pangool::tts", path = %path.display(), "Removed audio file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            target: "pangool::tts",
            path = %path.display(),
            "Could not remove audio file: {}",
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_unlinks_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        fs::write(&path, b"RIFF").unwrap();

        let artifact = AudioArtifact::adopt(&path);
        assert!(artifact.exists());
        assert_eq!(artifact.size_bytes(), 4);
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn drop_of_never_written_path_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = AudioArtifact::adopt(dir.path().join("never.wav"));
        assert!(!artifact.exists());
        assert_eq!(artifact.size_bytes(), 0);
    }

    #[test]
    fn clear_keeps_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.wav");
        fs::write(&path, b"half").unwrap();

        let artifact = AudioArtifact::adopt(&path);
        artifact.clear();
        assert!(!artifact.exists());
        fs::write(&path, b"whole").unwrap();
        drop(artifact);
        assert!(!path.exists());
    }
}
