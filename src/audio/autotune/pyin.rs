use crate::audio::autotune::{FRAME_LENGTH, PitchTracker, YIN_SIGMA, YIN_THRESHOLD};
use crate::audio::track::FrequencyTrack;
use tracing::debug;

/// Candidates scoring at or below this are treated as unvoiced.
const VOICING_THRESHOLD: f32 = 0.5;

/// YIN pitch tracker with a continuity prior between neighbouring frames.
///
/// Frame `i` is centred on sample `i * hop_length` and zero padded at the
/// clip edges, so a clip of `n` samples yields `n / hop_length + 1` frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pyin {
    frame_length: usize,
    threshold: f32,
    sigma: f32,
}

impl Default for Pyin {
    fn default() -> Self {
        Self {
            frame_length: FRAME_LENGTH,
            threshold: YIN_THRESHOLD,
            sigma: YIN_SIGMA,
        }
    }
}

impl Pyin {
    pub fn new(frame_length: usize, threshold: f32, sigma: f32) -> Self {
        Self {
            frame_length,
            threshold,
            sigma,
        }
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn with_frame_length(self, frame_length: usize) -> Self {
        Self {
            frame_length,
            ..self
        }
    }
}

impl PitchTracker for Pyin {
    fn analyze(
        &self,
        samples: &[f32],
        sample_rate: u32,
        fmin: f32,
        fmax: f32,
        hop_length: usize,
    ) -> FrequencyTrack {
        if samples.is_empty() || hop_length == 0 || fmin <= 0.0 || fmax <= fmin {
            return FrequencyTrack::default();
        }
        let n_frames = samples.len() / hop_length + 1;
        let min_lag = ((sample_rate as f32 / fmax).floor() as usize).max(1);
        let max_lag = (sample_rate as f32 / fmin).ceil() as usize;
        debug!(
            frame_length = self.frame_length,
            hop_length,
            fmin,
            fmax,
            min_lag,
            max_lag,
            threshold = self.threshold,
            sigma = self.sigma,
            n_frames,
            "PYIN parameters"
        );

        if max_lag <= min_lag + 2 || max_lag >= self.frame_length {
            debug!("Lag range does not fit in the analysis frame, every frame is unvoiced");
            return FrequencyTrack::new(vec![None; n_frames]);
        }

        let silence_rms_threshold = frame_rms(samples) * 0.02 + 1e-6;
        let mut frames = Vec::with_capacity(n_frames);
        let mut previous_f0: Option<f32> = None;
        for i in 0..n_frames {
            let frame = centred_frame(samples, i * hop_length, self.frame_length);
            if frame_rms(&frame) < silence_rms_threshold {
                frames.push(None);
                previous_f0 = None;
                continue;
            }

            let d = difference_function(&frame, max_lag);
            let cmnd = cumulative_mean_normalized_difference(&d);
            let f0 = first_dip(&cmnd, self.threshold, min_lag, max_lag)
                .map(|(tau, prob)| (sample_rate as f32 / tau, prob))
                .filter(|&(f0, prob)| {
                    continuity_score(f0, prob, previous_f0, self.sigma) > VOICING_THRESHOLD
                })
                .map(|(f0, _)| f0)
                .filter(|&f0| f0 >= fmin * 0.8 && f0 <= fmax * 1.2);
            previous_f0 = f0;
            frames.push(f0);
        }

        let track = FrequencyTrack::new(frames);
        debug!(
            n_frames = track.len(),
            voiced = track.voiced_count(),
            "Completed PYIN analysis"
        );
        track
    }
}

/// `frame_length` samples centred on `centre`, zero outside the signal.
fn centred_frame(signal: &[f32], centre: usize, frame_length: usize) -> Vec<f32> {
    let start = centre as isize - (frame_length / 2) as isize;
    (0..frame_length)
        .map(|k| {
            let idx = start + k as isize;
            if idx < 0 {
                0.0
            } else {
                signal.get(idx as usize).copied().unwrap_or(0.0)
            }
        })
        .collect()
}

/// RMS energy of a frame, used for the silence gate.
fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|x| x * x).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

fn difference_function(frame: &[f32], max_lag: usize) -> Vec<f32> {
    let n = frame.len();
    let mut d = vec![0.0; max_lag];
    for (tau, slot) in d.iter_mut().enumerate().take(max_lag.min(n)).skip(1) {
        *slot = frame[..n - tau]
            .iter()
            .zip(&frame[tau..])
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
    }
    d
}

fn cumulative_mean_normalized_difference(d: &[f32]) -> Vec<f32> {
    let mut cmnd = vec![1.0; d.len()];
    let mut running_sum = 0.0;
    for tau in 1..d.len() {
        running_sum += d[tau];
        cmnd[tau] = if running_sum > 0.0 {
            d[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }
    cmnd
}

fn parabolic_interp(cmnd: &[f32], tau: usize) -> f32 {
    let x0 = cmnd[tau - 1];
    let x1 = cmnd[tau];
    let x2 = cmnd[tau + 1];
    let denom = 2.0 * (2.0 * x1 - x2 - x0);
    if denom.abs() < 1e-9 {
        tau as f32
    } else {
        tau as f32 + (x2 - x0) / denom
    }
}

/// First local minimum of the CMND below `threshold`, as a refined lag and a
/// probability-like confidence.
fn first_dip(cmnd: &[f32], threshold: f32, min_lag: usize, max_lag: usize) -> Option<(f32, f32)> {
    let upper = max_lag.min(cmnd.len()).saturating_sub(1);
    ((min_lag + 1).max(1)..upper)
        .find(|&tau| {
            let v = cmnd[tau];
            v < threshold && v < cmnd[tau - 1] && v <= cmnd[tau + 1]
        })
        .map(|tau| {
            let refined = parabolic_interp(cmnd, tau);
            (refined, (1.0 - cmnd[tau]).clamp(0.0, 1.0))
        })
}

/// Confidence weighted by how far `f0` jumps from the previous voiced frame.
/// Jumps beyond the octave guard score zero.
fn continuity_score(f0: f32, prob: f32, previous_f0: Option<f32>, sigma: f32) -> f32 {
    match previous_f0 {
        Some(pf0) if pf0 > 0.0 && f0 > 0.0 => {
            let ratio = f0 / pf0;
            if !(0.7..=1.5).contains(&ratio) {
                return 0.0;
            }
            let octave_distance = ratio.log2();
            prob * (-0.5 * octave_distance * octave_distance / (sigma * sigma)).exp()
        }
        _ => prob,
    }
}
