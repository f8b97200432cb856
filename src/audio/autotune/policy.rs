use crate::error::CorrectionError;

pub const DEFAULT_INTENSITY: f32 = 1.0;
pub const DEFAULT_TOLERANCE_SEMITONES: f32 = 0.25;

/// How the quantizer treats frames that are already close to a scale note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrectionMode {
    /// Every voiced frame is pulled toward its nearest note.
    #[default]
    FullBlend,
    /// Frames within the tolerance band are left alone so vibrato survives.
    VibratoPreserving,
}

/// Validated correction parameters. The only way to build one is through
/// [`CorrectionPolicy::new`], so out-of-range values never reach frame
/// processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionPolicy {
    intensity: f32,
    tolerance_semitones: f32,
    mode: CorrectionMode,
}

impl CorrectionPolicy {
    pub fn new(
        intensity: f32,
        tolerance_semitones: f32,
        mode: CorrectionMode,
    ) -> Result<Self, CorrectionError> {
        if !intensity.is_finite() || !(0.0..=1.0).contains(&intensity) {
            return Err(CorrectionError::invalid(format!(
                "intensity must be within [0, 1], got {}",
                intensity
            )));
        }
        if !tolerance_semitones.is_finite() || tolerance_semitones < 0.0 {
            return Err(CorrectionError::invalid(format!(
                "tolerance must be a non-negative number of semitones, got {}",
                tolerance_semitones
            )));
        }
        Ok(Self {
            intensity,
            tolerance_semitones,
            mode,
        })
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn tolerance_semitones(&self) -> f32 {
        self.tolerance_semitones
    }

    pub fn mode(&self) -> CorrectionMode {
        self.mode
    }
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            intensity: DEFAULT_INTENSITY,
            tolerance_semitones: DEFAULT_TOLERANCE_SEMITONES,
            mode: CorrectionMode::FullBlend,
        }
    }
}
