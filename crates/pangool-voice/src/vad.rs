//! Voice Activity Detection using WebRTC VAD
//!
//! Strips silence out of a recording before it reaches Whisper, which otherwise tends to
//! hallucinate phrases over room noise.

use crate::error::{VoiceError, VoiceResult};
use tracing::debug;
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Frames kept on either side of detected speech so word edges are not clipped.
const PADDING_FRAMES: usize = 10;

/// Configuration for VAD detection
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Sample rate (must be 8000, 16000, 32000, or 48000 Hz for WebRTC VAD)
    pub sample_rate: u32,

    /// Detection mode (0-3, where 3 is most aggressive)
    pub mode: u8,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 3,
        }
    }
}

/// Voice Activity Detector using WebRTC VAD
pub struct VadDetector {
    vad: Vad,
    chunk_size: usize,
}

impl VadDetector {
    pub fn new(config: VadConfig) -> VoiceResult<Self> {
        let sample_rate = match config.sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => {
                return Err(VoiceError::VadInit(format!(
                    "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
                    other
                )))
            }
        };
        let mode = match config.mode {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => return Err(VoiceError::VadInit(format!("VAD mode must be 0-3, got {}", other))),
        };

        // WebRTC VAD takes 10, 20 or 30 ms frames; 30 ms at 16 kHz is 480 samples
        let chunk_size = (config.sample_rate as usize * 30) / 1000;

        let mut vad = Vad::new();
        vad.set_mode(mode);
        vad.set_sample_rate(sample_rate);

        Ok(Self { vad, chunk_size })
    }

    /// Classify one frame of exactly [`chunk_size`](Self::chunk_size) samples.
    pub fn is_speech(&mut self, frame: &[f32]) -> VoiceResult<bool> {
        if frame.len() != self.chunk_size {
            return Err(VoiceError::VadProcessing(format!(
                "Expected {} samples, got {}",
                self.chunk_size,
                frame.len()
            )));
        }
        let frame_i16: Vec<i16> = frame
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        self.vad
            .is_voice_segment(&frame_i16)
            .map_err(|e| VoiceError::VadProcessing(format!("VAD processing failed: {:?}", e)))
    }

    /// Keep only frames near detected speech. A trailing partial frame is dropped.
    pub fn retain_speech(&mut self, samples: &[f32]) -> VoiceResult<Vec<f32>> {
        let frames: Vec<&[f32]> = samples.chunks_exact(self.chunk_size).collect();
        let mut flags = Vec::with_capacity(frames.len());
        for frame in &frames {
            flags.push(self.is_speech(frame)?);
        }

        let mut keep = vec![false; frames.len()];
        for (i, _) in flags.iter().enumerate().filter(|(_, speech)| **speech) {
            let start = i.saturating_sub(PADDING_FRAMES);
            let end = (i + PADDING_FRAMES + 1).min(frames.len());
            keep[start..end].iter_mut().for_each(|k| *k = true);
        }

        let kept: Vec<f32> = frames
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .flat_map(|(frame, _)| frame.iter().copied())
            .collect();
        debug!(
            target: "pangool::stt",
            frames = frames.len(),
            speech_frames = flags.iter().filter(|s| **s).count(),
            kept_samples = kept.len(),
            "VAD filter"
        );
        Ok(kept)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
