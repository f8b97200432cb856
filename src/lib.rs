//! Scale detection and pitch correction for monophonic vocal recordings.
//!
//! The entry point for most callers is [`audio::autotune::Autotune`], which
//! runs pitch tracking, scale estimation, quantization and resynthesis over a
//! whole clip. The individual stages are exposed as free functions so they can
//! be driven with a different tracker or shifter.

pub mod audio;
pub mod error;

pub use error::CorrectionError;
