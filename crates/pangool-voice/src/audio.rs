//! WAV decoding into the 16 kHz mono f32 PCM that Whisper and WebRTC VAD expect.

use crate::error::{VoiceError, VoiceResult};
use hound::{SampleFormat, WavReader};
use std::io::Read;
use std::path::Path;

/// Sample rate of everything handed to the speech engine.
pub const ENGINE_SAMPLE_RATE: u32 = 16_000;

/// Whether `bytes` start with a RIFF/WAVE header. Anything else needs conversion first.
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode a WAV file, down-mix to mono and resample to [`ENGINE_SAMPLE_RATE`].
pub fn decode_wav_file(path: &Path) -> VoiceResult<Vec<f32>> {
    decode_wav(WavReader::open(path)?)
}

pub fn decode_wav<R: Read>(reader: WavReader<R>) -> VoiceResult<Vec<f32>> {
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(VoiceError::Decode(format!(
                    "unsupported bit depth {}",
                    spec.bits_per_sample
                )));
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    let mono = downmix(&interleaved, spec.channels);
    Ok(resample_linear(&mono, spec.sample_rate, ENGINE_SAMPLE_RATE))
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler. Good enough for speech recognition input.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len = ((samples.len() as u64 * u64::from(to_rate)) / u64::from(from_rate)) as usize;
    let step = f64::from(from_rate) / f64::from(to_rate);
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}
