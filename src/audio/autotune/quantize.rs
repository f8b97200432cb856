use crate::audio::autotune::policy::{CorrectionMode, CorrectionPolicy};
use crate::audio::scales::{ScaleTemplate, frequency_to_midi_note, midi_note_to_frequency};
use crate::audio::track::FrequencyTrack;
use tracing::debug;

/// Deviations smaller than this (in semitones) are Hz/MIDI conversion noise
/// and count as being exactly on the note.
pub const PITCH_EPSILON: f32 = 1e-4;

/// Signed semitone distance from `midi` to the nearest note of `template`.
pub(crate) fn deviation(template: &ScaleTemplate, midi: f32) -> f32 {
    let delta = template.nearest(midi) - midi;
    if delta.abs() < PITCH_EPSILON {
        0.0
    } else {
        delta
    }
}

/// Corrected frequency for one voiced frame. Returns `hz` itself whenever no
/// correction applies, so identity cases are exact.
fn correct_frame(hz: f32, template: &ScaleTemplate, policy: &CorrectionPolicy) -> f32 {
    let midi = frequency_to_midi_note(hz);
    let delta = deviation(template, midi);
    if policy.mode() == CorrectionMode::VibratoPreserving
        && delta.abs() <= policy.tolerance_semitones()
    {
        return hz;
    }
    let step = delta * policy.intensity();
    if step == 0.0 {
        return hz;
    }
    midi_note_to_frequency(midi + step)
}

/// Maps every voiced frame toward the nearest note of `template` under
/// `policy`. Unvoiced frames stay unvoiced; the result has the same length
/// as `track`.
pub fn quantize(
    track: &FrequencyTrack,
    template: &ScaleTemplate,
    policy: &CorrectionPolicy,
) -> FrequencyTrack {
    let corrected: FrequencyTrack = track
        .frames()
        .iter()
        .map(|frame| frame.map(|hz| correct_frame(hz, template, policy)))
        .collect();
    debug!(
        n_frames = corrected.len(),
        voiced = corrected.voiced_count(),
        scale = template.name(),
        intensity = policy.intensity(),
        tolerance = policy.tolerance_semitones(),
        mode = ?policy.mode(),
        "Quantized frequency track"
    );
    corrected
}

/// Mean semitone shift between two aligned tracks, over the frames voiced in
/// both. Returns `0.0` when no such frame exists.
pub fn estimate_global_shift(original: &FrequencyTrack, corrected: &FrequencyTrack) -> f32 {
    let (sum, count) = original
        .frames()
        .iter()
        .zip(corrected.frames())
        .filter_map(|(o, c)| match (o, c) {
            (Some(o), Some(c)) => Some(12.0 * (c / o).log2()),
            _ => None,
        })
        .fold((0.0_f64, 0_usize), |(sum, n), shift| {
            (sum + shift as f64, n + 1)
        });
    if count == 0 {
        debug!("No paired voiced frames, global shift is zero");
        return 0.0;
    }
    let shift = (sum / count as f64) as f32;
    debug!(paired = count, shift, "Estimated global shift");
    shift
}
