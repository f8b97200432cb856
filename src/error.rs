use thiserror::Error;

/// Minimum number of voiced frames needed before a scale can be inferred.
pub const MIN_VOICED_FRAMES: usize = 3;

/// Failures of the correction core. All of them are terminal for the clip
/// being processed: no partial output is produced once one is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrectionError {
    #[error(
        "not enough voiced frames to identify a scale (found {voiced}, need at least {MIN_VOICED_FRAMES})"
    )]
    InsufficientData { voiced: usize },

    #[error("no pitch detected in the recording")]
    NoPitchDetected,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CorrectionError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CorrectionError::InvalidConfig(msg.into())
    }
}
