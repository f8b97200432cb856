use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use melodytune::CorrectionError;
use melodytune::audio::autotune::{
    Autotune, AutotuneConfig, CorrectionMode, CorrectionPolicy, CorrectionReport, HOP_LENGTH,
    MAX_F0, MIN_F0, Resynthesis, ScaleSelection,
    policy::{DEFAULT_INTENSITY, DEFAULT_TOLERANCE_SEMITONES},
};
use melodytune::audio::file;
use melodytune::audio::scales::ScaleCatalog;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "melodytune")]
#[command(about = "Detect the scale of a vocal take and pull its pitch into key")]
struct Cli {
    /// Input WAV file
    #[arg(required_unless_present = "list_scales")]
    input: Option<PathBuf>,

    /// Output WAV file (defaults to <input>_melodytune.wav)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How strongly pitches are pulled toward the scale, 0 to 1
    #[arg(short, long, default_value_t = DEFAULT_INTENSITY)]
    intensity: f32,

    /// Deviation in semitones left alone to keep vibrato
    #[arg(short, long, default_value_t = DEFAULT_TOLERANCE_SEMITONES)]
    tolerance: f32,

    #[arg(long, value_enum, default_value_t = ModeArg::Full)]
    mode: ModeArg,

    #[arg(long, value_enum, default_value_t = ResynthesisArg::Global)]
    resynthesis: ResynthesisArg,

    /// Correct against this scale instead of detecting one
    /// (catalog name or key such as "A minor")
    #[arg(short, long)]
    scale: Option<String>,

    /// Samples per analysis frame
    #[arg(long, default_value_t = HOP_LENGTH)]
    hop: usize,

    /// Lowest pitch to track, in Hz
    #[arg(long, default_value_t = MIN_F0)]
    fmin: f32,

    /// Highest pitch to track, in Hz
    #[arg(long, default_value_t = MAX_F0)]
    fmax: f32,

    /// Also write the original and corrected pitch per frame as JSON
    #[arg(long)]
    pitch_json: Option<PathBuf>,

    /// Give up if processing takes longer than this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the scale catalog and exit
    #[arg(long)]
    list_scales: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Correct every voiced frame
    Full,
    /// Leave frames within the tolerance alone
    Vibrato,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResynthesisArg {
    /// One average shift over the whole clip
    Global,
    /// Shift only the blocks that are off the scale
    Blockwise,
}

impl Cli {
    fn config(&self) -> Result<AutotuneConfig, CorrectionError> {
        let mode = match self.mode {
            ModeArg::Full => CorrectionMode::FullBlend,
            ModeArg::Vibrato => CorrectionMode::VibratoPreserving,
        };
        let resynthesis = match self.resynthesis {
            ResynthesisArg::Global => Resynthesis::Global,
            ResynthesisArg::Blockwise => Resynthesis::Blockwise,
        };
        Ok(AutotuneConfig {
            policy: CorrectionPolicy::new(self.intensity, self.tolerance, mode)?,
            hop_length: self.hop,
            fmin: self.fmin,
            fmax: self.fmax,
            resynthesis,
            scale: self
                .scale
                .clone()
                .map_or(ScaleSelection::Auto, ScaleSelection::Named),
        })
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "melodytune=debug"
    } else {
        "melodytune=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{}_melodytune.wav", stem))
}

/// User-facing text for each correction failure.
fn describe(err: &CorrectionError) -> String {
    match err {
        CorrectionError::NoPitchDetected => {
            "No pitch was detected in the file. Try a clearer or longer recording.".to_string()
        }
        CorrectionError::InsufficientData { voiced } => format!(
            "Only {} voiced frames were detected, not enough to identify a scale. \
             Try a longer recording or pass --scale.",
            voiced
        ),
        CorrectionError::InvalidConfig(msg) => format!("Invalid settings: {}", msg),
    }
}

fn print_report(report: &CorrectionReport, output: &Path) {
    println!("Scale: {}", report.scale.name());
    println!(
        "Voiced frames: {} of {}",
        report.original.voiced_count(),
        report.original.len()
    );
    match report.global_shift {
        Some(shift) => println!("Applied shift: {:+.3} semitones", shift),
        None => println!("Re-pitched blocks: {}", report.shifted_blocks),
    }
    println!("Saved: {}", output.display());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list_scales {
        for template in ScaleCatalog::default().iter() {
            let notes: Vec<String> = template.notes().iter().map(|n| n.to_string()).collect();
            println!("{}: {}", template.name(), notes.join(" "));
        }
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .ok_or_else(|| anyhow!("an input file is required"))?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input));

    let config = cli.config().map_err(|e| anyhow!(describe(&e)))?;
    let autotune = Autotune::new(config).map_err(|e| anyhow!(describe(&e)))?;

    let audio = file::load_audio_from_path(&input)?;
    info!(
        path = %input.display(),
        sample_rate = audio.sample_rate(),
        duration_secs = audio.duration_secs(),
        "Loaded input"
    );

    let job = tokio::task::spawn_blocking(move || autotune.process(&audio));
    let joined = match cli.timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), job).await {
            Ok(joined) => joined,
            Err(_) => {
                error!(secs, "Processing did not finish in time");
                eprintln!("Processing did not finish within {} seconds.", secs);
                // the blocking task cannot be cancelled and the runtime would
                // wait for it on shutdown
                std::process::exit(1);
            }
        },
        None => job.await,
    };
    let report = joined
        .context("correction task panicked")?
        .map_err(|e| anyhow!(describe(&e)))?;
    debug!(
        n_frames = report.corrected.len(),
        voiced = report.corrected.voiced_count(),
        "Correction report ready"
    );

    file::save_audio_to_path(&report.audio, &output)?;
    if let Some(path) = &cli.pitch_json {
        file::save_pitch_curve_to_path(&report.pitch_curve(cli.hop), path)?;
        info!(path = %path.display(), "Saved pitch curve");
    }
    print_report(&report, &output);
    Ok(())
}
