use crate::audio::Audio;
use crate::audio::autotune::PitchShifter;
use crate::audio::autotune::policy::CorrectionPolicy;
use crate::audio::autotune::quantize::deviation;
use crate::audio::scales::{ScaleTemplate, frequency_to_midi_note};
use crate::audio::track::FrequencyTrack;
use crate::error::CorrectionError;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Shifts smaller than this many semitones are not worth resynthesising.
const MIN_SHIFT_SEMITONES: f32 = 1e-6;

/// Copies the overlapping prefix of `shifted` into `block`. Samples past the
/// end of a short result keep their current value.
fn write_prefix(block: &mut [f32], shifted: &[f32]) {
    if shifted.len() != block.len() {
        warn!(
            expected = block.len(),
            got = shifted.len(),
            "Pitch shifter returned a mis-sized segment, copying the overlap only"
        );
    }
    let n = shifted.len().min(block.len());
    block[..n].copy_from_slice(&shifted[..n]);
}

/// Result of [`resynthesize_blockwise`].
#[derive(Debug, Clone, PartialEq)]
pub struct BlockwiseOutput {
    pub audio: Audio,
    /// Number of hop-sized blocks that were sent through the shifter.
    pub shifted_blocks: usize,
}

/// Semitone shift to apply to frame `hz`'s block, or `None` when the block
/// should pass through untouched.
fn block_shift(hz: f32, template: &ScaleTemplate, policy: &CorrectionPolicy) -> Option<f32> {
    let delta = deviation(template, frequency_to_midi_note(hz));
    if delta.abs() <= policy.tolerance_semitones() {
        return None;
    }
    let shift = delta * policy.intensity();
    (shift.abs() >= MIN_SHIFT_SEMITONES).then_some(shift)
}

/// Re-pitches only the blocks whose frame deviates from `template` by more
/// than the policy's tolerance.
///
/// Block `i` spans samples `[i * hop_length, min(len, (i + 1) * hop_length))`
/// and belongs to frame `i` of `track`. Blocks are disjoint, so they are
/// processed in parallel, each writing only its own slice of the output. The
/// output always has the input's length.
pub fn resynthesize_blockwise<S: PitchShifter + ?Sized>(
    audio: &Audio,
    track: &FrequencyTrack,
    template: &ScaleTemplate,
    hop_length: usize,
    policy: &CorrectionPolicy,
    shifter: &S,
) -> Result<BlockwiseOutput, CorrectionError> {
    if hop_length == 0 {
        return Err(CorrectionError::invalid("hop length must be positive"));
    }
    let sample_rate = audio.sample_rate();
    let input = audio.samples();
    let mut output = input.to_vec();

    let shifted_blocks = output
        .par_chunks_mut(hop_length)
        .enumerate()
        .map(|(i, block)| {
            let Some(shift) = track
                .get(i)
                .and_then(|hz| block_shift(hz, template, policy))
            else {
                return false;
            };
            let start = i * hop_length;
            let source = &input[start..start + block.len()];
            let shifted = shifter.shift(source, sample_rate, shift);
            write_prefix(block, &shifted);
            true
        })
        .filter(|&shifted| shifted)
        .count();

    let n_blocks = input.len().div_ceil(hop_length);
    info!(
        shifted_blocks,
        n_blocks,
        scale = template.name(),
        "Blockwise resynthesis complete"
    );
    Ok(BlockwiseOutput {
        audio: Audio::new(sample_rate, output),
        shifted_blocks,
    })
}

/// Shifts the whole clip by one semitone amount.
pub fn apply_global_shift<S: PitchShifter + ?Sized>(
    audio: &Audio,
    semitones: f32,
    shifter: &S,
) -> Audio {
    let mut output = audio.samples().to_vec();
    if semitones.abs() < MIN_SHIFT_SEMITONES || !semitones.is_finite() {
        debug!(semitones, "Global shift is negligible, copying input");
        return Audio::new(audio.sample_rate(), output);
    }
    let shifted = shifter.shift(audio.samples(), audio.sample_rate(), semitones);
    write_prefix(&mut output, &shifted);
    info!(semitones, n_samples = output.len(), "Applied global shift");
    Audio::new(audio.sample_rate(), output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::autotune::policy::CorrectionMode;
    use crate::audio::scales::{ScaleCatalog, midi_note_to_frequency};
    use std::sync::Mutex;

    /// Records every call. Output is filled with `fill` and is `len_delta`
    /// samples longer than the input.
    struct RecordingShifter {
        calls: Mutex<Vec<(usize, f32)>>,
        fill: f32,
        len_delta: isize,
    }

    impl RecordingShifter {
        fn new(fill: f32, len_delta: isize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fill,
                len_delta,
            }
        }

        fn calls(&self) -> Vec<(usize, f32)> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort_by(|a, b| a.partial_cmp(b).unwrap());
            calls
        }
    }

    impl PitchShifter for RecordingShifter {
        fn shift(&self, segment: &[f32], _sample_rate: u32, semitones: f32) -> Vec<f32> {
            self.calls.lock().unwrap().push((segment.len(), semitones));
            let len = (segment.len() as isize + self.len_delta).max(0) as usize;
            vec![self.fill; len]
        }
    }

    fn c_major() -> ScaleTemplate {
        ScaleCatalog::default()
            .get("Do Mayor (C Major)")
            .cloned()
            .unwrap()
    }

    fn midi_track(notes: &[Option<f32>]) -> FrequencyTrack {
        notes
            .iter()
            .map(|n| n.map(midi_note_to_frequency))
            .collect()
    }

    fn ramp(len: usize) -> Audio {
        Audio::new(8000, (0..len).map(|i| i as f32).collect())
    }

    #[test]
    fn test_zero_hop_is_rejected() {
        let shifter = RecordingShifter::new(0.0, 0);
        let result = resynthesize_blockwise(
            &ramp(10),
            &FrequencyTrack::default(),
            &c_major(),
            0,
            &CorrectionPolicy::default(),
            &shifter,
        );
        assert!(matches!(result, Err(CorrectionError::InvalidConfig(_))));
    }

    #[test]
    fn test_only_off_scale_blocks_are_shifted() {
        let audio = ramp(40);
        let track = midi_track(&[Some(60.0), Some(60.5), None, Some(61.4)]);
        let policy = CorrectionPolicy::new(1.0, 0.2, CorrectionMode::VibratoPreserving).unwrap();
        let shifter = RecordingShifter::new(-1.0, 0);

        let out =
            resynthesize_blockwise(&audio, &track, &c_major(), 10, &policy, &shifter).unwrap();
        assert_eq!(out.shifted_blocks, 2);
        let samples = out.audio.samples();
        assert_eq!(&samples[0..10], &audio.samples()[0..10]);
        assert!(samples[10..20].iter().all(|&v| v == -1.0));
        assert_eq!(&samples[20..30], &audio.samples()[20..30]);
        assert!(samples[30..40].iter().all(|&v| v == -1.0));

        let calls = shifter.calls();
        assert_eq!(calls.len(), 2);
        let shifts: Vec<f32> = calls.iter().map(|c| c.1).collect();
        assert!(shifts.iter().any(|s| (s + 0.5).abs() < 1e-3));
        assert!(shifts.iter().any(|s| (s - 0.6).abs() < 1e-3));
    }

    #[test]
    fn test_shift_is_scaled_by_intensity() {
        let audio = ramp(10);
        let track = midi_track(&[Some(61.4)]);
        let policy = CorrectionPolicy::new(0.5, 0.0, CorrectionMode::FullBlend).unwrap();
        let shifter = RecordingShifter::new(0.0, 0);
        resynthesize_blockwise(&audio, &track, &c_major(), 10, &policy, &shifter).unwrap();
        let calls = shifter.calls();
        assert_eq!(calls.len(), 1);
        assert!((calls[0].1 - 0.3).abs() < 1e-3);
    }

    #[test]
    fn test_within_tolerance_audio_is_untouched() {
        let audio = ramp(30);
        let track = midi_track(&[Some(60.1), Some(63.9), Some(67.15)]);
        let policy = CorrectionPolicy::new(1.0, 0.2, CorrectionMode::VibratoPreserving).unwrap();
        let shifter = RecordingShifter::new(99.0, 0);
        let out =
            resynthesize_blockwise(&audio, &track, &c_major(), 10, &policy, &shifter).unwrap();
        assert_eq!(out.shifted_blocks, 0);
        assert_eq!(out.audio, audio);
        assert!(shifter.calls().is_empty());
    }

    #[test]
    fn test_zero_intensity_never_calls_shifter() {
        let audio = ramp(20);
        let track = midi_track(&[Some(61.4), Some(62.6)]);
        let policy = CorrectionPolicy::new(0.0, 0.0, CorrectionMode::FullBlend).unwrap();
        let shifter = RecordingShifter::new(5.0, 0);
        let out =
            resynthesize_blockwise(&audio, &track, &c_major(), 10, &policy, &shifter).unwrap();
        assert_eq!(out.audio, audio);
        assert!(shifter.calls().is_empty());
    }

    #[test]
    fn test_length_preserved_when_not_multiple_of_hop() {
        let audio = ramp(25);
        let track = midi_track(&[Some(61.4), Some(61.4), Some(61.4), Some(61.4)]);
        let policy = CorrectionPolicy::new(1.0, 0.0, CorrectionMode::FullBlend).unwrap();
        let shifter = RecordingShifter::new(7.0, 0);
        let out =
            resynthesize_blockwise(&audio, &track, &c_major(), 10, &policy, &shifter).unwrap();
        assert_eq!(out.audio.len(), 25);
        // the fourth frame starts past the end of the buffer and is ignored
        assert_eq!(out.shifted_blocks, 3);
        assert_eq!(shifter.calls().iter().map(|c| c.0).collect::<Vec<_>>(), vec![5, 10, 10]);
        assert!(out.audio.samples().iter().all(|&v| v == 7.0));
    }

    #[test]
    fn test_long_shifter_output_is_truncated() {
        let audio = ramp(15);
        let track = midi_track(&[Some(61.4), Some(61.4)]);
        let policy = CorrectionPolicy::default();
        let shifter = RecordingShifter::new(3.0, 4);
        let out =
            resynthesize_blockwise(&audio, &track, &c_major(), 10, &policy, &shifter).unwrap();
        assert_eq!(out.audio.len(), 15);
        assert!(out.audio.samples().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_short_shifter_output_keeps_block_tail() {
        let audio = ramp(10);
        let track = midi_track(&[Some(61.4)]);
        let shifter = RecordingShifter::new(-2.0, -3);
        let out = resynthesize_blockwise(
            &audio,
            &track,
            &c_major(),
            10,
            &CorrectionPolicy::default(),
            &shifter,
        )
        .unwrap();
        let samples = out.audio.samples();
        assert!(samples[..7].iter().all(|&v| v == -2.0));
        assert_eq!(&samples[7..], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_frames_past_track_end_leave_audio_alone() {
        let audio = ramp(30);
        let track = midi_track(&[Some(61.4)]);
        let shifter = RecordingShifter::new(1.0, 0);
        let out = resynthesize_blockwise(
            &audio,
            &track,
            &c_major(),
            10,
            &CorrectionPolicy::default(),
            &shifter,
        )
        .unwrap();
        assert_eq!(out.shifted_blocks, 1);
        assert_eq!(&out.audio.samples()[10..], &audio.samples()[10..]);
    }

    #[test]
    fn test_global_shift_uses_whole_clip() {
        let audio = ramp(12);
        let shifter = RecordingShifter::new(0.5, -2);
        let out = apply_global_shift(&audio, 1.25, &shifter);
        assert_eq!(shifter.calls(), vec![(12, 1.25)]);
        assert_eq!(out.len(), 12);
        assert!(out.samples()[..10].iter().all(|&v| v == 0.5));
        assert_eq!(&out.samples()[10..], &[10.0, 11.0]);
    }

    #[test]
    fn test_negligible_global_shift_copies_input() {
        let audio = ramp(12);
        let shifter = RecordingShifter::new(0.5, 0);
        let out = apply_global_shift(&audio, 0.0, &shifter);
        assert_eq!(out, audio);
        assert!(shifter.calls().is_empty());
    }
}
