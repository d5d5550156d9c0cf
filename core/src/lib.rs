//! Acoustic physical layer for short bit frames
//!
//! A frame is a continuous-phase chirp preamble followed by a fixed-length data region
//! (FSK tones or OFDM symbols) carrying the payload and a CRC-8 trailer. The receiver
//! slides a normalized correlation over the incoming stream, confirms the peak, slices
//! the data region, demodulates it and checks the CRC.

pub mod config;
pub mod decoder;
pub mod dsp;
pub mod encoder;
pub mod error;
pub mod fft_correlation;
pub mod framing;
pub mod fsk;
pub mod ofdm;
pub mod redundancy;
pub mod sync;

pub use config::{Modulation, OfdmConfig, PhyConfig, ScoringMethod, ToneDetection};
pub use decoder::{Decoder, FrameReport, Receiver, ReceiverState};
pub use encoder::Encoder;
pub use error::{PhyError, Result};
pub use fft_correlation::{correlation_trace, fft_correlate_1d, normalized_correlation_trace, Mode};
pub use framing::{format_bits, parse_bit_string, FrameValidator, ValidatedFrame};
pub use fsk::{BitDecision, DemodulatedFrame, Demodulator, SignalQuality};
pub use redundancy::RepetitionMode;
pub use sync::{PeakDetector, PreambleTemplate, SynchronizationEvent, Synchronizer};

// Signal configuration
pub const SAMPLE_RATE: u32 = 44100;
pub const FREQ_ZERO: f32 = 2000.0; // Hz
pub const FREQ_ONE: f32 = 4000.0; // Hz
pub const BIT_RATE: f32 = 1000.0; // bits per second

// Preamble configuration
pub const PREAMBLE_SAMPLES: usize = 440; // ~10ms at 44.1kHz
pub const CHIRP_MARGIN: f32 = 1000.0; // Hz beyond the data tones on each side
pub const PREAMBLE_AMPLITUDE: f32 = 0.5;

// Detection configuration
pub const DETECTION_THRESHOLD: f32 = 0.5;
pub const CONFIRM_WINDOW: usize = PREAMBLE_SAMPLES;

// Frame configuration
pub const CRC_BITS: usize = 8;
pub const CRC_POLYNOMIAL: u8 = 0xD7;
pub const LEADING_SILENCE_SAMPLES: usize = SAMPLE_RATE as usize / 2; // 0.5s
pub const TRAILING_SILENCE_SAMPLES: usize = SAMPLE_RATE as usize / 10; // 0.1s
pub const OUTPUT_PEAK: f32 = 0.9; // headroom below full scale

// OFDM configuration
pub const OFDM_FFT_SIZE: usize = 64;
pub const OFDM_SUBCARRIERS: usize = 32;
pub const OFDM_CYCLIC_PREFIX: usize = 16;
