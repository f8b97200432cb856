use serde::{Deserialize, Serialize};

/// Per-frame fundamental frequency estimates for one clip.
///
/// Frame `i` sits at sample `i * hop_length`. `None` marks an unvoiced frame.
/// The same type carries corrected tracks, which stay aligned index-for-index
/// with the track they were derived from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrequencyTrack {
    frames: Vec<Option<f32>>,
}

impl FrequencyTrack {
    /// Non-finite and non-positive frequencies are stored as unvoiced.
    pub fn new(frames: Vec<Option<f32>>) -> Self {
        let frames = frames
            .into_iter()
            .map(|f| f.filter(|hz| hz.is_finite() && *hz > 0.0))
            .collect();
        Self { frames }
    }

    /// Builds a track from raw Hz values where `0.0` (or NaN) means unvoiced.
    pub fn from_hz(hz: &[f32]) -> Self {
        Self::new(hz.iter().map(|&f| Some(f)).collect())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Option<f32>] {
        &self.frames
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.frames.get(index).copied().flatten()
    }

    /// `(frame index, Hz)` for every voiced frame, in track order.
    pub fn voiced(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.frames
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.map(|hz| (i, hz)))
    }

    pub fn voiced_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    pub fn is_unvoiced(&self) -> bool {
        self.frames.iter().all(Option::is_none)
    }

    /// Frame start times in seconds.
    pub fn times(&self, sample_rate: u32, hop_length: usize) -> Vec<f32> {
        (0..self.frames.len())
            .map(|i| (i * hop_length) as f32 / sample_rate as f32)
            .collect()
    }
}

/// One row of an original-versus-corrected pitch curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchPoint {
    pub time_secs: f32,
    pub original_hz: Option<f32>,
    pub corrected_hz: Option<f32>,
}

/// Pairs two aligned tracks frame by frame with their timestamps. The curve
/// is as long as the longer track; missing frames read as unvoiced.
pub fn pitch_curve(
    original: &FrequencyTrack,
    corrected: &FrequencyTrack,
    sample_rate: u32,
    hop_length: usize,
) -> Vec<PitchPoint> {
    let longer = if corrected.len() > original.len() {
        corrected
    } else {
        original
    };
    longer
        .times(sample_rate, hop_length)
        .into_iter()
        .enumerate()
        .map(|(i, time_secs)| PitchPoint {
            time_secs,
            original_hz: original.get(i),
            corrected_hz: corrected.get(i),
        })
        .collect()
}

impl FromIterator<Option<f32>> for FrequencyTrack {
    fn from_iter<I: IntoIterator<Item = Option<f32>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
