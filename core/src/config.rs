use crate::error::{PhyError, Result};
use crate::redundancy::RepetitionMode;
use std::fmt;
use std::str::FromStr;

/// Modulation used for the data region that follows the preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    /// Binary continuous-phase FSK, one tone per bit
    #[default]
    Fsk,
    /// BPSK on FFT subcarriers with a cyclic prefix
    Ofdm,
}

/// How a preamble-length window is scored against the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringMethod {
    /// Normalized cross-correlation, bounded to [-1, 1] and independent of gain
    #[default]
    Normalized,
    /// Raw matched-filter output divided by the template energy
    DotProduct,
}

/// Per-bit tone detection strategy for FSK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToneDetection {
    #[default]
    Goertzel,
    MatchedFilter,
    Quadrature,
    /// Majority of the three detectors above
    Voting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfdmConfig {
    pub fft_size: usize,
    pub num_subcarriers: usize,
    pub cyclic_prefix: usize,
}

impl OfdmConfig {
    pub fn symbol_samples(&self) -> usize {
        self.fft_size + self.cyclic_prefix
    }
}

impl Default for OfdmConfig {
    fn default() -> Self {
        Self {
            fft_size: crate::OFDM_FFT_SIZE,
            num_subcarriers: crate::OFDM_SUBCARRIERS,
            cyclic_prefix: crate::OFDM_CYCLIC_PREFIX,
        }
    }
}

/// Session parameters shared by the transmitter and the receiver
///
/// Both sides must agree on every field; a mismatch is not detected as such and only
/// shows up as checksum failures.
#[derive(Debug, Clone, PartialEq)]
pub struct PhyConfig {
    pub sample_rate: u32,
    /// Tone for a 0 bit (Hz)
    pub freq_zero: f32,
    /// Tone for a 1 bit (Hz)
    pub freq_one: f32,
    pub bit_rate: f32,

    pub preamble_samples: usize,
    pub chirp_start: f32,
    pub chirp_end: f32,

    /// Source payload bits per frame, before repetition coding
    pub payload_bits: usize,
    pub crc_polynomial: u8,
    pub repetition: RepetitionMode,

    pub modulation: Modulation,
    pub ofdm: OfdmConfig,

    pub leading_silence: usize,
    pub trailing_silence: usize,
    /// Peak amplitude of the generated waveform after normalization
    pub output_peak: f32,

    pub scoring: ScoringMethod,
    pub detection_threshold: f32,
    /// Samples the score must stay below the held peak before the peak is confirmed
    pub confirm_window: usize,
    pub tone_detection: ToneDetection,
    pub fine_alignment: bool,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::SAMPLE_RATE,
            freq_zero: crate::FREQ_ZERO,
            freq_one: crate::FREQ_ONE,
            bit_rate: crate::BIT_RATE,
            preamble_samples: crate::PREAMBLE_SAMPLES,
            chirp_start: crate::FREQ_ZERO - crate::CHIRP_MARGIN,
            chirp_end: crate::FREQ_ONE + crate::CHIRP_MARGIN,
            payload_bits: 1000,
            crc_polynomial: crate::CRC_POLYNOMIAL,
            repetition: RepetitionMode::None,
            modulation: Modulation::Fsk,
            ofdm: OfdmConfig::default(),
            leading_silence: crate::LEADING_SILENCE_SAMPLES,
            trailing_silence: crate::TRAILING_SILENCE_SAMPLES,
            output_peak: crate::OUTPUT_PEAK,
            scoring: ScoringMethod::Normalized,
            detection_threshold: crate::DETECTION_THRESHOLD,
            confirm_window: crate::CONFIRM_WINDOW,
            tone_detection: ToneDetection::Goertzel,
            fine_alignment: false,
        }
    }
}

impl PhyConfig {
    pub fn with_payload_bits(mut self, payload_bits: usize) -> Self {
        self.payload_bits = payload_bits;
        self
    }

    pub fn with_modulation(mut self, modulation: Modulation) -> Self {
        self.modulation = modulation;
        self
    }

    pub fn with_repetition(mut self, repetition: RepetitionMode) -> Self {
        self.repetition = repetition;
        self
    }

    /// Sets the data tones and moves the sweep band to stay 1 kHz outside them.
    pub fn with_tones(mut self, freq_zero: f32, freq_one: f32) -> Self {
        self.freq_zero = freq_zero;
        self.freq_one = freq_one;
        self.chirp_start = freq_zero.min(freq_one) - crate::CHIRP_MARGIN;
        self.chirp_end = freq_zero.max(freq_one) + crate::CHIRP_MARGIN;
        self
    }

    pub fn samples_per_bit(&self) -> usize {
        if self.bit_rate <= 0.0 {
            return 0;
        }
        (self.sample_rate as f32 / self.bit_rate).round() as usize
    }

    /// Payload plus CRC trailer, before repetition coding
    pub fn source_frame_bits(&self) -> usize {
        self.payload_bits + crate::CRC_BITS
    }

    /// Bits on the air: the whole source frame, repeated
    pub fn total_frame_bits(&self) -> usize {
        self.source_frame_bits() * self.repetition.factor()
    }

    pub fn ofdm_symbol_count(&self) -> usize {
        self.total_frame_bits().div_ceil(self.ofdm.num_subcarriers.max(1))
    }

    /// Length of the data region that follows the preamble
    pub fn total_frame_data_samples(&self) -> usize {
        match self.modulation {
            Modulation::Fsk => self.total_frame_bits() * self.samples_per_bit(),
            Modulation::Ofdm => self.ofdm_symbol_count() * self.ofdm.symbol_samples(),
        }
    }

    /// Samples from the first preamble sample to the end of the data region
    pub fn frame_samples(&self) -> usize {
        self.preamble_samples + self.total_frame_data_samples()
    }

    pub fn validate(&self) -> Result<()> {
        let nyquist = self.sample_rate as f32 / 2.0;

        if self.sample_rate == 0 {
            return Err(invalid("sample rate must be positive"));
        }
        if !(self.bit_rate > 0.0) || self.samples_per_bit() == 0 {
            return Err(invalid(format!(
                "bit rate {} leaves no samples per bit at {} Hz",
                self.bit_rate, self.sample_rate
            )));
        }
        if self.preamble_samples < 2 {
            return Err(invalid("preamble must be at least 2 samples"));
        }
        for (name, freq) in [
            ("freq_zero", self.freq_zero),
            ("freq_one", self.freq_one),
            ("chirp_start", self.chirp_start),
            ("chirp_end", self.chirp_end),
        ] {
            if !(freq > 0.0 && freq < nyquist) {
                return Err(invalid(format!(
                    "{} = {} Hz is outside (0, {}) Hz",
                    name, freq, nyquist
                )));
            }
        }
        if self.freq_zero == self.freq_one {
            return Err(invalid("the two FSK tones must differ"));
        }
        if self.payload_bits == 0 {
            return Err(invalid("payload must carry at least one bit"));
        }
        if self.crc_polynomial & 1 == 0 {
            return Err(invalid(format!(
                "CRC polynomial {:#04x} must have a non-zero constant term",
                self.crc_polynomial
            )));
        }
        if !(self.output_peak > 0.0 && self.output_peak <= 1.0) {
            return Err(invalid("output peak must be in (0, 1]"));
        }
        if !self.detection_threshold.is_finite() {
            return Err(invalid("detection threshold must be finite"));
        }
        if self.confirm_window == 0 {
            return Err(invalid("confirmation window must be at least one sample"));
        }
        if self.modulation == Modulation::Ofdm {
            let ofdm = &self.ofdm;
            if ofdm.fft_size < 4 {
                return Err(invalid("OFDM FFT size must be at least 4"));
            }
            if ofdm.num_subcarriers == 0 || ofdm.num_subcarriers > ofdm.fft_size / 2 {
                return Err(invalid(format!(
                    "OFDM subcarriers must be in 1..={} for FFT size {}",
                    ofdm.fft_size / 2,
                    ofdm.fft_size
                )));
            }
            if ofdm.cyclic_prefix >= ofdm.fft_size {
                return Err(invalid("cyclic prefix must be shorter than the FFT size"));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> PhyError {
    PhyError::InvalidConfig(message.into())
}

impl FromStr for Modulation {
    type Err = PhyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fsk" => Ok(Modulation::Fsk),
            "ofdm" => Ok(Modulation::Ofdm),
            other => Err(invalid(format!("unknown modulation '{}' (fsk, ofdm)", other))),
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Modulation::Fsk => "fsk",
            Modulation::Ofdm => "ofdm",
        })
    }
}

impl FromStr for ScoringMethod {
    type Err = PhyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normalized" | "ncc" => Ok(ScoringMethod::Normalized),
            "dot" | "dot-product" => Ok(ScoringMethod::DotProduct),
            other => Err(invalid(format!(
                "unknown scoring method '{}' (normalized, dot-product)",
                other
            ))),
        }
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScoringMethod::Normalized => "normalized",
            ScoringMethod::DotProduct => "dot-product",
        })
    }
}

impl FromStr for ToneDetection {
    type Err = PhyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "goertzel" => Ok(ToneDetection::Goertzel),
            "matched" | "matched-filter" => Ok(ToneDetection::MatchedFilter),
            "quadrature" | "iq" => Ok(ToneDetection::Quadrature),
            "voting" | "vote" => Ok(ToneDetection::Voting),
            other => Err(invalid(format!(
                "unknown tone detector '{}' (goertzel, matched-filter, quadrature, voting)",
                other
            ))),
        }
    }
}

impl fmt::Display for ToneDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToneDetection::Goertzel => "goertzel",
            ToneDetection::MatchedFilter => "matched-filter",
            ToneDetection::Quadrature => "quadrature",
            ToneDetection::Voting => "voting",
        })
    }
}
