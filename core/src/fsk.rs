use crate::config::{PhyConfig, ToneDetection};
use crate::dsp::{dot, goertzel_magnitude, raised_cosine_window, Oscillator};
use crate::error::{PhyError, Result};

// Binary continuous-phase FSK
//
// Each bit is one tone held for `samples_per_bit` samples: `freq_zero` for 0 and
// `freq_one` for 1. The oscillator phase runs on across bit boundaries (and from the
// preamble into the first bit), so the waveform has no discontinuities. A bit is
// decided as 1 when the `freq_one` response is larger than the `freq_zero` response.

/// Bits whose response ratio falls below this count as weak
pub const WEAK_CONFIDENCE: f32 = 1.5;

/// Upper bound on a reported response ratio
const CONFIDENCE_CAP: f32 = 1000.0;

/// Larger response over the smaller one, capped
pub fn response_ratio(a: f32, b: f32) -> f32 {
    let (high, low) = if a >= b { (a.abs(), b.abs()) } else { (b.abs(), a.abs()) };
    if low <= f32::EPSILON * high.max(1.0) {
        return CONFIDENCE_CAP;
    }
    (high / low).min(CONFIDENCE_CAP)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAgreement {
    Unanimous,
    Majority,
}

/// Per-bit decision with the evidence behind it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitDecision {
    pub bit: bool,
    /// Response for a 0 bit (vote count when voting)
    pub zero: f32,
    /// Response for a 1 bit (vote count when voting)
    pub one: f32,
    pub confidence: f32,
    pub agreement: Option<VoteAgreement>,
}

impl BitDecision {
    pub fn from_responses(zero: f32, one: f32) -> Self {
        Self {
            bit: one > zero,
            zero,
            one,
            confidence: response_ratio(zero, one),
            agreement: None,
        }
    }

    pub fn is_weak(&self) -> bool {
        self.confidence < WEAK_CONFIDENCE
    }
}

/// Aggregate decision statistics for one frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalQuality {
    pub mean_confidence: f32,
    pub min_confidence: f32,
    pub weak_bits: usize,
    pub unanimous_votes: usize,
    pub majority_votes: usize,
}

impl SignalQuality {
    pub fn from_decisions(decisions: &[BitDecision]) -> Self {
        if decisions.is_empty() {
            return Self::default();
        }

        let mut quality = Self {
            min_confidence: f32::MAX,
            ..Self::default()
        };
        let mut total = 0.0;
        for decision in decisions {
            total += decision.confidence;
            quality.min_confidence = quality.min_confidence.min(decision.confidence);
            if decision.is_weak() {
                quality.weak_bits += 1;
            }
            match decision.agreement {
                Some(VoteAgreement::Unanimous) => quality.unanimous_votes += 1,
                Some(VoteAgreement::Majority) => quality.majority_votes += 1,
                None => {}
            }
        }
        quality.mean_confidence = total / decisions.len() as f32;
        quality
    }
}

/// Demodulator output for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct DemodulatedFrame {
    pub bits: Vec<bool>,
    pub decisions: Vec<BitDecision>,
    pub quality: SignalQuality,
}

impl DemodulatedFrame {
    pub fn from_decisions(decisions: Vec<BitDecision>) -> Self {
        let quality = SignalQuality::from_decisions(&decisions);
        Self {
            bits: decisions.iter().map(|d| d.bit).collect(),
            decisions,
            quality,
        }
    }
}

/// Turns a frame's data region into bits
pub trait Demodulator: Send {
    /// Samples needed to carry `bit_count` bits
    fn samples_for(&self, bit_count: usize) -> usize;

    fn demodulate(&mut self, samples: &[f32], bit_count: usize) -> Result<DemodulatedFrame>;
}

/// Per-bit tone detection strategy
pub trait ToneDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Responses at the 0 and 1 tones for one bit window
    fn responses(&self, window: &[f32]) -> (f32, f32);

    fn decide(&self, window: &[f32]) -> BitDecision {
        let (zero, one) = self.responses(window);
        BitDecision::from_responses(zero, one)
    }
}

/// In-phase and quadrature reference waveforms for one tone
#[derive(Debug, Clone)]
pub struct ToneReference {
    pub frequency: f32,
    in_phase: Vec<f32>,
    quadrature: Vec<f32>,
}

impl ToneReference {
    pub fn new(frequency: f32, num_samples: usize, sample_rate: f32) -> Self {
        let step = std::f32::consts::TAU * frequency / sample_rate;
        let (in_phase, quadrature) = (0..num_samples)
            .map(|i| {
                let phase = step * i as f32;
                (phase.sin(), phase.cos())
            })
            .unzip();
        Self {
            frequency,
            in_phase,
            quadrature,
        }
    }

    pub fn len(&self) -> usize {
        self.in_phase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_phase.is_empty()
    }

    /// Correlation magnitude, insensitive to the tone's phase
    pub fn response(&self, window: &[f32]) -> f32 {
        let i = dot(&self.in_phase, window);
        let q = dot(&self.quadrature, window);
        (i * i + q * q).sqrt()
    }
}

pub struct GoertzelDetector {
    freq_zero: f32,
    freq_one: f32,
    sample_rate: f32,
}

impl GoertzelDetector {
    pub fn new(config: &PhyConfig) -> Self {
        Self {
            freq_zero: config.freq_zero,
            freq_one: config.freq_one,
            sample_rate: config.sample_rate as f32,
        }
    }
}

impl ToneDetector for GoertzelDetector {
    fn name(&self) -> &'static str {
        "goertzel"
    }

    fn responses(&self, window: &[f32]) -> (f32, f32) {
        (
            goertzel_magnitude(window, self.freq_zero, self.sample_rate),
            goertzel_magnitude(window, self.freq_one, self.sample_rate),
        )
    }
}

/// Correlates each bit against precomputed tone references
pub struct MatchedFilterDetector {
    zero: ToneReference,
    one: ToneReference,
}

impl MatchedFilterDetector {
    pub fn new(config: &PhyConfig) -> Self {
        let spb = config.samples_per_bit();
        let sample_rate = config.sample_rate as f32;
        Self {
            zero: ToneReference::new(config.freq_zero, spb, sample_rate),
            one: ToneReference::new(config.freq_one, spb, sample_rate),
        }
    }
}

impl ToneDetector for MatchedFilterDetector {
    fn name(&self) -> &'static str {
        "matched-filter"
    }

    fn responses(&self, window: &[f32]) -> (f32, f32) {
        (self.zero.response(window), self.one.response(window))
    }
}

/// I/Q mixing against a local oscillator over a tapered window
pub struct QuadratureDetector {
    freq_zero: f32,
    freq_one: f32,
    sample_rate: f32,
    taper: Vec<f32>,
}

impl QuadratureDetector {
    pub fn new(config: &PhyConfig) -> Self {
        let spb = config.samples_per_bit();
        Self {
            freq_zero: config.freq_zero,
            freq_one: config.freq_one,
            sample_rate: config.sample_rate as f32,
            taper: raised_cosine_window(spb, spb / 4),
        }
    }

    fn mix(&self, window: &[f32], freq: f32) -> f32 {
        let step = std::f32::consts::TAU * freq / self.sample_rate;
        let (mut i, mut q) = (0.0f32, 0.0f32);
        for (n, (&x, &w)) in window.iter().zip(&self.taper).enumerate() {
            let phase = step * n as f32;
            let value = x * w;
            i += value * phase.cos();
            q += value * phase.sin();
        }
        (i * i + q * q).sqrt()
    }
}

impl ToneDetector for QuadratureDetector {
    fn name(&self) -> &'static str {
        "quadrature"
    }

    fn responses(&self, window: &[f32]) -> (f32, f32) {
        (self.mix(window, self.freq_zero), self.mix(window, self.freq_one))
    }
}

/// Two-of-three vote over the Goertzel, matched-filter and quadrature detectors
pub struct VotingDetector {
    detectors: [Box<dyn ToneDetector>; 3],
}

impl VotingDetector {
    pub fn new(config: &PhyConfig) -> Self {
        Self {
            detectors: [
                Box::new(GoertzelDetector::new(config)),
                Box::new(MatchedFilterDetector::new(config)),
                Box::new(QuadratureDetector::new(config)),
            ],
        }
    }
}

impl ToneDetector for VotingDetector {
    fn name(&self) -> &'static str {
        "voting"
    }

    fn responses(&self, window: &[f32]) -> (f32, f32) {
        let ones = self
            .detectors
            .iter()
            .filter(|d| d.decide(window).bit)
            .count() as f32;
        (3.0 - ones, ones)
    }

    fn decide(&self, window: &[f32]) -> BitDecision {
        let votes: Vec<BitDecision> = self.detectors.iter().map(|d| d.decide(window)).collect();
        let ones = votes.iter().filter(|v| v.bit).count();
        let bit = ones >= 2;
        let agreement = if ones == 0 || ones == votes.len() {
            VoteAgreement::Unanimous
        } else {
            VoteAgreement::Majority
        };
        // Confidence comes from the primary (Goertzel) detector
        let confidence = votes.first().map_or(0.0, |v| v.confidence);

        BitDecision {
            bit,
            zero: (votes.len() - ones) as f32,
            one: ones as f32,
            confidence,
            agreement: Some(agreement),
        }
    }
}

pub fn detector_for(config: &PhyConfig) -> Box<dyn ToneDetector> {
    match config.tone_detection {
        ToneDetection::Goertzel => Box::new(GoertzelDetector::new(config)),
        ToneDetection::MatchedFilter => Box::new(MatchedFilterDetector::new(config)),
        ToneDetection::Quadrature => Box::new(QuadratureDetector::new(config)),
        ToneDetection::Voting => Box::new(VotingDetector::new(config)),
    }
}

/// Continuous-phase FSK modulator
pub struct FskModulator {
    freq_zero: f32,
    freq_one: f32,
    samples_per_bit: usize,
}

impl FskModulator {
    pub fn new(config: &PhyConfig) -> Self {
        Self {
            freq_zero: config.freq_zero,
            freq_one: config.freq_one,
            samples_per_bit: config.samples_per_bit(),
        }
    }

    /// Appends the tones for `bits` to `output`, continuing from the oscillator's phase.
    pub fn modulate_into(&self, bits: &[bool], oscillator: &mut Oscillator, output: &mut Vec<f32>) {
        output.reserve(bits.len() * self.samples_per_bit);
        for &bit in bits {
            let freq = if bit { self.freq_one } else { self.freq_zero };
            for _ in 0..self.samples_per_bit {
                output.push(oscillator.sample_then_step(freq));
            }
        }
    }
}

pub struct FskDemodulator {
    samples_per_bit: usize,
    detector: Box<dyn ToneDetector>,
}

impl FskDemodulator {
    pub fn new(config: &PhyConfig) -> Self {
        Self::with_detector(config.samples_per_bit(), detector_for(config))
    }

    pub fn with_detector(samples_per_bit: usize, detector: Box<dyn ToneDetector>) -> Self {
        Self {
            samples_per_bit,
            detector,
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }
}

impl Demodulator for FskDemodulator {
    fn samples_for(&self, bit_count: usize) -> usize {
        bit_count * self.samples_per_bit
    }

    fn demodulate(&mut self, samples: &[f32], bit_count: usize) -> Result<DemodulatedFrame> {
        let needed = self.samples_for(bit_count);
        if samples.len() < needed {
            return Err(PhyError::InsufficientSamples {
                start: 0,
                needed,
                available: samples.len(),
            });
        }

        let decisions = samples[..needed]
            .chunks_exact(self.samples_per_bit)
            .map(|window| self.detector.decide(window))
            .collect();
        Ok(DemodulatedFrame::from_decisions(decisions))
    }
}
