pub mod autotune;
pub mod file;
pub mod scales;
pub mod track;

use tracing::debug;

/// Mono audio samples at a fixed sample rate.
///
/// The correction stages only ever read an `Audio` and hand back a new one of
/// the same length; the input is never modified in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Audio {
    sample_rate: u32,
    samples: Vec<f32>,
}

impl Audio {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// Builds a mono buffer from interleaved multichannel samples by averaging
    /// the channels of each frame. A trailing partial frame is dropped.
    pub fn from_interleaved(sample_rate: u32, interleaved: &[f32], n_channels: usize) -> Self {
        if n_channels <= 1 {
            return Self::new(sample_rate, interleaved.to_vec());
        }
        let samples: Vec<f32> = interleaved
            .chunks_exact(n_channels)
            .map(|frame| frame.iter().sum::<f32>() / n_channels as f32)
            .collect();
        debug!(
            n_channels,
            n_samples = samples.len(),
            "Downmixed interleaved audio to mono"
        );
        Self::new(sample_rate, samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Clip duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}
