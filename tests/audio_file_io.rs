//! Integration tests for WAV loading and saving and pitch curve export.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use melodytune::audio::track::{FrequencyTrack, PitchPoint, pitch_curve};
use melodytune::audio::{Audio, file};

fn output_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("tests");
    p.push("out");
    fs::create_dir_all(&p).expect("failed to create tests/out directory");
    p.push(name);
    p
}

fn sine(n_samples: usize, sample_rate: u32) -> Vec<f32> {
    (0..n_samples)
        .map(|n| 0.8 * (2.0 * std::f32::consts::PI * 440.0 * n as f32 / sample_rate as f32).sin())
        .collect()
}

#[test]
fn round_trip_save_and_load_wav() -> anyhow::Result<()> {
    let sample_rate = 44100;
    let audio = Audio::new(sample_rate, sine(441, sample_rate));

    let path = output_path("round_trip.wav");
    file::save_audio_to_path(&audio, &path)?;
    let reloaded = file::load_audio_from_path(&path)?;

    assert_eq!(reloaded.sample_rate(), sample_rate);
    assert_eq!(reloaded.len(), audio.len());
    for (a, b) in audio.samples().iter().zip(reloaded.samples()) {
        assert!((a - b).abs() < 1e-3, "sample drifted: {} vs {}", a, b);
    }
    Ok(())
}

#[test]
fn saving_clamps_out_of_range_samples() -> anyhow::Result<()> {
    let audio = Audio::new(8000, vec![2.0, -3.0, 0.25]);
    let path = output_path("clamped.wav");
    file::save_audio_to_path(&audio, &path)?;
    let reloaded = file::load_audio_from_path(&path)?;
    let samples = reloaded.samples();
    assert!((samples[0] - 1.0).abs() < 1e-3);
    assert!((samples[1] + 1.0).abs() < 1e-3);
    assert!((samples[2] - 0.25).abs() < 1e-3);
    Ok(())
}

#[test]
fn stereo_float_file_is_downmixed() -> anyhow::Result<()> {
    let path = output_path("stereo_float.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 16000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for (l, r) in [(1.0_f32, 0.0_f32), (0.5, -0.5), (0.2, 0.4)] {
        writer.write_sample(l)?;
        writer.write_sample(r)?;
    }
    writer.finalize()?;

    let audio = file::load_audio_from_path(&path)?;
    assert_eq!(audio.sample_rate(), 16000);
    assert_eq!(audio.len(), 3);
    let expected = [0.5, 0.0, 0.3];
    for (got, want) in audio.samples().iter().zip(expected) {
        assert!((got - want).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn loading_nonexistent_file_returns_error() {
    let bogus = output_path("this_file_should_not_exist_12345.wav");
    assert!(!bogus.exists());
    assert!(file::load_audio_from_path(&bogus).is_err());
}

#[test]
fn loading_invalid_file_returns_error() -> anyhow::Result<()> {
    let path = output_path("not_audio.wav");
    {
        let mut f = fs::File::create(&path)?;
        writeln!(f, "this is not an audio file")?;
    }
    assert!(file::load_audio_from_path(&path).is_err());
    Ok(())
}

#[test]
fn non_wav_extension_is_rejected() {
    let audio = Audio::new(8000, vec![0.0; 10]);
    assert!(file::save_audio_to_path(&audio, output_path("clip.mp3")).is_err());
    assert!(file::load_audio_from_path(output_path("clip.flac")).is_err());
}

#[test]
fn pitch_curve_json_keeps_unvoiced_frames_as_null() -> anyhow::Result<()> {
    let original = FrequencyTrack::new(vec![Some(220.0), None, Some(233.0)]);
    let corrected = FrequencyTrack::new(vec![Some(220.0), None, Some(246.94)]);
    let curve = pitch_curve(&original, &corrected, 22050, 512);

    let path = output_path("pitch_curve.json");
    file::save_pitch_curve_to_path(&curve, &path)?;
    let text = fs::read_to_string(&path)?;
    assert!(text.contains("null"), "unvoiced frame should be null: {}", text);

    let reloaded: Vec<PitchPoint> = serde_json::from_str(&text)?;
    assert_eq!(reloaded.len(), 3);
    for (got, want) in reloaded.iter().zip(&curve) {
        assert!((got.time_secs - want.time_secs).abs() < 1e-6);
        assert_eq!(got.original_hz.is_some(), want.original_hz.is_some());
        assert_eq!(got.corrected_hz.is_some(), want.corrected_hz.is_some());
    }
    assert_eq!(reloaded[1].original_hz, None);
    assert!((reloaded[2].corrected_hz.unwrap_or(0.0) - 246.94).abs() < 1e-3);
    Ok(())
}
