use clap::Args;
use serde::Deserialize;
use sonicframe_core::{Modulation, PhyConfig, PhyError, RepetitionMode, ScoringMethod, ToneDetection};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("invalid config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Phy(#[from] PhyError),

    #[error("unsupported WAV format: {0}")]
    UnsupportedWav(String),

    #[error("capture is {actual} Hz but the session expects {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("invalid bit pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no frame was accepted ({0} preamble(s) found)")]
    NoFrameAccepted(usize),
}

impl CliError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Session parameters as they appear in a JSON config file
///
/// Every field is optional; missing fields keep the built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub sample_rate: Option<u32>,
    pub freq_zero: Option<f32>,
    pub freq_one: Option<f32>,
    pub bit_rate: Option<f32>,
    pub preamble_samples: Option<usize>,
    pub payload_bits: Option<usize>,
    pub crc_polynomial: Option<u8>,
    pub repetition: Option<String>,
    pub modulation: Option<String>,
    pub ofdm_fft_size: Option<usize>,
    pub ofdm_subcarriers: Option<usize>,
    pub ofdm_cyclic_prefix: Option<usize>,
    pub scoring: Option<String>,
    pub detection_threshold: Option<f32>,
    pub confirm_window: Option<usize>,
    pub tone_detection: Option<String>,
    pub fine_alignment: Option<bool>,
    pub chirp_start: Option<f32>,
    pub chirp_end: Option<f32>,
    pub leading_silence: Option<usize>,
    pub trailing_silence: Option<usize>,
    pub output_peak: Option<f32>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
        serde_json::from_str(&text).map_err(|source| CliError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(self, config: &mut PhyConfig) -> Result<(), CliError> {
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if self.freq_zero.is_some() || self.freq_one.is_some() {
            let zero = self.freq_zero.unwrap_or(config.freq_zero);
            let one = self.freq_one.unwrap_or(config.freq_one);
            *config = config.clone().with_tones(zero, one);
        }
        if let Some(rate) = self.bit_rate {
            config.bit_rate = rate;
        }
        if let Some(samples) = self.preamble_samples {
            config.preamble_samples = samples;
        }
        if let Some(bits) = self.payload_bits {
            config.payload_bits = bits;
        }
        if let Some(poly) = self.crc_polynomial {
            config.crc_polynomial = poly;
        }
        if let Some(mode) = self.repetition {
            config.repetition = mode.parse()?;
        }
        if let Some(modulation) = self.modulation {
            config.modulation = modulation.parse()?;
        }
        if let Some(size) = self.ofdm_fft_size {
            config.ofdm.fft_size = size;
        }
        if let Some(count) = self.ofdm_subcarriers {
            config.ofdm.num_subcarriers = count;
        }
        if let Some(cp) = self.ofdm_cyclic_prefix {
            config.ofdm.cyclic_prefix = cp;
        }
        if let Some(scoring) = self.scoring {
            config.scoring = scoring.parse()?;
        }
        if let Some(threshold) = self.detection_threshold {
            config.detection_threshold = threshold;
        }
        if let Some(window) = self.confirm_window {
            config.confirm_window = window;
        }
        if let Some(detector) = self.tone_detection {
            config.tone_detection = detector.parse()?;
        }
        if let Some(enabled) = self.fine_alignment {
            config.fine_alignment = enabled;
        }
        // After the tones, which reset the sweep
        if let Some(freq) = self.chirp_start {
            config.chirp_start = freq;
        }
        if let Some(freq) = self.chirp_end {
            config.chirp_end = freq;
        }
        if let Some(samples) = self.leading_silence {
            config.leading_silence = samples;
        }
        if let Some(samples) = self.trailing_silence {
            config.trailing_silence = samples;
        }
        if let Some(peak) = self.output_peak {
            config.output_peak = peak;
        }
        Ok(())
    }
}

/// Session flags shared by every command that builds a frame or listens for one
#[derive(Debug, Clone, Default, Args)]
pub struct PhyArgs {
    /// JSON file with session parameters (flags override it)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Tone for a 0 bit in Hz (default: 2000)
    #[arg(long)]
    pub f0: Option<f32>,

    /// Tone for a 1 bit in Hz (default: 4000)
    #[arg(long)]
    pub f1: Option<f32>,

    /// Bits per second (default: 1000)
    #[arg(long)]
    pub bit_rate: Option<f32>,

    /// Payload bits per frame, excluding the CRC
    #[arg(short = 'n', long)]
    pub payload_bits: Option<usize>,

    /// Data modulation: fsk or ofdm
    #[arg(short, long)]
    pub modulation: Option<Modulation>,

    /// Frame repetition (payload and CRC): none or triple
    #[arg(short, long)]
    pub repetition: Option<RepetitionMode>,

    /// CRC-8 generator polynomial, decimal or 0x-prefixed hex (default: 0xD7)
    #[arg(long, value_parser = parse_polynomial)]
    pub crc_poly: Option<u8>,

    /// Preamble score needed to start a detection (default: 0.5)
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Samples to wait for a better peak before confirming (default: preamble length)
    #[arg(long)]
    pub confirm_window: Option<usize>,

    /// Window scoring: normalized or dot-product
    #[arg(long)]
    pub scoring: Option<ScoringMethod>,

    /// FSK tone detector: goertzel, matched-filter, quadrature or voting
    #[arg(short, long)]
    pub detector: Option<ToneDetection>,

    /// Search a half-bit neighbourhood for the best FSK bit alignment
    #[arg(long)]
    pub fine_align: bool,
}

impl PhyArgs {
    /// Defaults, then the config file, then explicit flags
    pub fn resolve(&self) -> Result<PhyConfig, CliError> {
        let mut config = PhyConfig::default();
        if let Some(path) = &self.config {
            ConfigFile::load(path)?.apply(&mut config)?;
        }

        if self.f0.is_some() || self.f1.is_some() {
            let zero = self.f0.unwrap_or(config.freq_zero);
            let one = self.f1.unwrap_or(config.freq_one);
            config = config.with_tones(zero, one);
        }
        if let Some(rate) = self.bit_rate {
            config.bit_rate = rate;
        }
        if let Some(bits) = self.payload_bits {
            config.payload_bits = bits;
        }
        if let Some(modulation) = self.modulation {
            config.modulation = modulation;
        }
        if let Some(mode) = self.repetition {
            config.repetition = mode;
        }
        if let Some(poly) = self.crc_poly {
            config.crc_polynomial = poly;
        }
        if let Some(threshold) = self.threshold {
            config.detection_threshold = threshold;
        }
        if let Some(window) = self.confirm_window {
            config.confirm_window = window;
        }
        if let Some(scoring) = self.scoring {
            config.scoring = scoring;
        }
        if let Some(detector) = self.detector {
            config.tone_detection = detector;
        }
        if self.fine_align {
            config.fine_alignment = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_polynomial(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid polynomial '{}': {}", s, e))
}
