use crate::audio::autotune::pyin::Pyin;
use crate::audio::autotune::{MAX_F0, MIN_F0, PitchShifter, PitchTracker};
use crate::audio::track::FrequencyTrack;
use tracing::debug;

/// Time-domain PSOLA shifter for short segments.
///
/// The segment is analysed with its own pitch tracker to place one mark per
/// glottal period. Grains two periods wide are then re-laid at `period /
/// ratio` spacing and overlap-added, which changes pitch but not duration.
/// Segments without any voiced frame are returned unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Psola {
    tracker: Pyin,
    fmin: f32,
    fmax: f32,
}

impl Default for Psola {
    fn default() -> Self {
        Self {
            tracker: Pyin::default(),
            fmin: MIN_F0,
            fmax: MAX_F0,
        }
    }
}

impl Psola {
    pub fn new(tracker: Pyin, fmin: f32, fmax: f32) -> Self {
        Self {
            tracker,
            fmin,
            fmax,
        }
    }
}

impl PitchShifter for Psola {
    fn shift(&self, segment: &[f32], sample_rate: u32, semitones: f32) -> Vec<f32> {
        if segment.is_empty() || semitones == 0.0 || !semitones.is_finite() {
            return segment.to_vec();
        }
        let ratio = 2f32.powf(semitones / 12.0);

        // The lag search has to fit in half a frame, which bounds fmin for
        // short segments.
        let frame_length = self.tracker.frame_length().min(segment.len());
        let fmin = self
            .fmin
            .max(2.0 * sample_rate as f32 / frame_length.max(1) as f32);
        if fmin >= self.fmax {
            debug!(
                n_samples = segment.len(),
                "Segment too short to track pitch, leaving it unchanged"
            );
            return segment.to_vec();
        }
        let hop = (frame_length / 4).max(1);
        let track = self.tracker.with_frame_length(frame_length).analyze(
            segment,
            sample_rate,
            fmin,
            self.fmax,
            hop,
        );

        let marks = find_pitch_marks(&track, sample_rate, hop, segment.len());
        if marks.is_empty() {
            debug!(
                n_samples = segment.len(),
                "No voiced frames in segment, leaving it unchanged"
            );
            return segment.to_vec();
        }
        debug!(
            n_samples = segment.len(),
            n_marks = marks.len(),
            semitones,
            "PSOLA shifting segment"
        );
        overlap_add(segment, &marks, ratio)
    }
}

/// A pitch mark: sample position plus the local period in samples.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PitchMark {
    position: usize,
    period: f32,
}

/// Walks every voiced frame's span one period at a time. Frames are centred
/// on `i * hop`, so frame `i` owns `[i*hop - hop/2, i*hop + hop/2)`.
fn find_pitch_marks(
    track: &FrequencyTrack,
    sample_rate: u32,
    hop: usize,
    n_samples: usize,
) -> Vec<PitchMark> {
    let mut marks = Vec::new();
    let mut pos = 0.0_f32;
    for (i, f0) in track.voiced() {
        let period = sample_rate as f32 / f0;
        let span_start = (i * hop).saturating_sub(hop / 2);
        let span_end = (i * hop + hop - hop / 2).min(n_samples);
        if pos < span_start as f32 {
            pos = span_start as f32;
        }
        while pos < span_end as f32 {
            marks.push(PitchMark {
                position: pos.round() as usize,
                period,
            });
            pos += period;
        }
    }
    marks
}

fn hann(k: usize, len: usize) -> f32 {
    let x = std::f32::consts::PI * k as f32 / len as f32;
    x.sin().powi(2)
}

/// Re-lays grains from the analysis marks at the shifted spacing. Samples no
/// grain reaches keep their original value; the output has exactly
/// `segment.len()` samples.
fn overlap_add(segment: &[f32], marks: &[PitchMark], ratio: f32) -> Vec<f32> {
    let n = segment.len();
    let mut output = vec![0.0_f32; n];
    let mut weight = vec![0.0_f32; n];

    let first = marks[0].position as f32;
    let last = marks[marks.len() - 1].position as f32;
    let mut t = first;
    while t <= last {
        // nearest analysis mark to the synthesis position
        let idx = marks.partition_point(|m| (m.position as f32) < t);
        let mark = match (idx.checked_sub(1).map(|i| marks[i]), marks.get(idx)) {
            (Some(before), Some(&after)) => {
                if t - before.position as f32 <= after.position as f32 - t {
                    before
                } else {
                    after
                }
            }
            (Some(before), None) => before,
            (None, Some(&after)) => after,
            (None, None) => break,
        };

        let half = (mark.period.round() as usize).max(1);
        let grain_len = 2 * half;
        let src_start = mark.position as isize - half as isize;
        let dst_start = t.round() as isize - half as isize;
        for k in 0..grain_len {
            let src = src_start + k as isize;
            let dst = dst_start + k as isize;
            if src < 0 || dst < 0 || src as usize >= n || dst as usize >= n {
                continue;
            }
            let w = hann(k, grain_len);
            output[dst as usize] += segment[src as usize] * w;
            weight[dst as usize] += w;
        }
        t += (mark.period / ratio).max(1.0);
    }

    for ((out, w), original) in output.iter_mut().zip(&weight).zip(segment) {
        if *w > 1e-3 {
            *out /= *w;
        } else {
            *out = *original;
        }
    }
    output
}
