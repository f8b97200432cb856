use crate::audio::Audio;
use crate::audio::track::PitchPoint;
use anyhow::{Context, Result, anyhow};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs;
use std::path::Path;
use tracing::debug;

fn ensure_wav(path: &Path) -> Result<()> {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("wav") => Ok(()),
        _ => Err(anyhow!(
            "Unsupported file format for {:?}; only .wav is supported.",
            path
        )),
    }
}

/// Loads a WAV file as mono `f32` audio. Integer samples are scaled to
/// [-1, 1] and multichannel files are downmixed by averaging.
pub fn load_audio_from_path<P: AsRef<Path>>(path: P) -> Result<Audio> {
    let path = path.as_ref();
    ensure_wav(path)?;
    let reader =
        WavReader::open(path).with_context(|| format!("failed to open WAV file {:?}", path))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(anyhow!("WAV file {:?} reports 0 channels", path));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("failed to decode samples from {:?}", path))?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("failed to decode samples from {:?}", path))?
        }
    };

    let n_channels = spec.channels as usize;
    if interleaved.len() % n_channels != 0 {
        return Err(anyhow!(
            "Sample count {} is not divisible by channel count {} for file {:?}",
            interleaved.len(),
            n_channels,
            path
        ));
    }
    debug!(
        sample_rate = spec.sample_rate,
        n_channels,
        bits = spec.bits_per_sample,
        n_samples = interleaved.len() / n_channels,
        "Loaded WAV file"
    );
    Ok(Audio::from_interleaved(
        spec.sample_rate,
        &interleaved,
        n_channels,
    ))
}

/// Saves mono audio as a 16-bit PCM WAV file, clamping to [-1, 1].
pub fn save_audio_to_path<P: AsRef<Path>>(audio: &Audio, path: P) -> Result<()> {
    let path = path.as_ref();
    ensure_wav(path)?;
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create WAV file {:?}", path))?;
    for &sample in audio.samples() {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    debug!(n_samples = audio.len(), "Saved WAV file to {:?}", path);
    Ok(())
}

/// Writes a pitch curve as a pretty-printed JSON array. Unvoiced frames are
/// written as `null`.
pub fn save_pitch_curve_to_path<P: AsRef<Path>>(curve: &[PitchPoint], path: P) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(curve).context("failed to serialise pitch curve")?;
    fs::write(path, json).with_context(|| format!("failed to write pitch curve {:?}", path))?;
    debug!(n_frames = curve.len(), "Saved pitch curve to {:?}", path);
    Ok(())
}
