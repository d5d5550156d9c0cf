use crate::config::{PhyConfig, ScoringMethod};
use crate::dsp::{dot, energy, goertzel_magnitude, Oscillator};

/// Energy below which a window is treated as silence and scores zero
const MIN_WINDOW_ENERGY: f32 = 1e-9;

/// A shifted alignment must beat the nominal one by this much to be taken
const FINE_ALIGNMENT_MARGIN: f32 = 0.01;

/// Generates the up-then-down frequency sweep used as the frame preamble
///
/// The instantaneous frequency ramps linearly from `start_freq` to `end_freq` over the
/// first half and back down over the second half. Phase is integrated sample by sample,
/// so the sweep is continuous. The returned oscillator carries the final phase for
/// whatever follows the preamble.
pub fn generate_preamble(
    num_samples: usize,
    start_freq: f32,
    end_freq: f32,
    sample_rate: f32,
    amplitude: f32,
) -> (Vec<f32>, Oscillator) {
    let mut oscillator = Oscillator::new(sample_rate);
    let half = num_samples / 2;
    let half_span = num_samples as f32 / 2.0;

    let samples = (0..num_samples)
        .map(|i| {
            let freq = if i < half {
                start_freq + (end_freq - start_freq) * i as f32 / half_span
            } else {
                end_freq + (start_freq - end_freq) * (i as f32 - half_span) / half_span
            };
            oscillator.step_then_sample(freq) * amplitude
        })
        .collect();

    (samples, oscillator)
}

/// Unit-amplitude preamble with its energy precomputed
#[derive(Debug, Clone)]
pub struct PreambleTemplate {
    samples: Vec<f32>,
    energy: f32,
}

impl PreambleTemplate {
    pub fn new(config: &PhyConfig) -> Self {
        let (samples, _) = generate_preamble(
            config.preamble_samples,
            config.chirp_start,
            config.chirp_end,
            config.sample_rate as f32,
            1.0,
        );
        Self::from_samples(samples)
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        let energy = energy(&samples);
        Self { samples, energy }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Scores one preamble-length window against the template
pub trait CorrelationScorer: Send + Sync {
    fn score(&self, template: &PreambleTemplate, window: &[f32]) -> f32;
}

/// Normalized cross-correlation: 1.0 for a scaled copy of the template
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedCorrelation;

impl CorrelationScorer for NormalizedCorrelation {
    fn score(&self, template: &PreambleTemplate, window: &[f32]) -> f32 {
        let mut cross = 0.0f32;
        let mut window_energy = 0.0f32;
        for (t, w) in template.samples().iter().zip(window) {
            cross += t * w;
            window_energy += w * w;
        }

        if window_energy < MIN_WINDOW_ENERGY || template.energy() < MIN_WINDOW_ENERGY {
            return 0.0;
        }
        (cross / (window_energy * template.energy()).sqrt()).clamp(-1.0, 1.0)
    }
}

/// Matched-filter output scaled by the template energy; depends on the input gain
#[derive(Debug, Clone, Copy, Default)]
pub struct DotProductCorrelation;

impl CorrelationScorer for DotProductCorrelation {
    fn score(&self, template: &PreambleTemplate, window: &[f32]) -> f32 {
        if template.energy() < MIN_WINDOW_ENERGY {
            return 0.0;
        }
        dot(template.samples(), window) / template.energy()
    }
}

pub fn scorer_for(method: ScoringMethod) -> Box<dyn CorrelationScorer> {
    match method {
        ScoringMethod::Normalized => Box::new(NormalizedCorrelation),
        ScoringMethod::DotProduct => Box::new(DotProductCorrelation),
    }
}

/// A confirmed preamble location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynchronizationEvent {
    /// Stream index of the first preamble sample
    pub sample_index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorState {
    /// No score above the threshold is being held.
    Searching,
    /// Holding the best score seen so far until it goes unbeaten for the confirmation window.
    Confirming { peak: SynchronizationEvent },
}

/// Peak-hold confirmation over a score sequence
///
/// A candidate is any score above the threshold that beats the held peak. The held
/// peak is emitted once the window start has moved more than `confirm_window` samples
/// past it, after which the detector starts searching again.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    threshold: f32,
    confirm_window: usize,
    state: DetectorState,
}

impl PeakDetector {
    pub fn new(threshold: f32, confirm_window: usize) -> Self {
        Self {
            threshold,
            confirm_window,
            state: DetectorState::Searching,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Searching;
    }

    /// Hands back a held candidate without waiting for its window to close.
    ///
    /// Used at end of stream, where no later score can displace the peak.
    pub fn flush(&mut self) -> Option<SynchronizationEvent> {
        match std::mem::replace(&mut self.state, DetectorState::Searching) {
            DetectorState::Confirming { peak } => Some(peak),
            DetectorState::Searching => None,
        }
    }

    /// Feeds the score of the window starting at `sample_index`.
    ///
    /// Indices are expected to increase; an index at or before the held peak never
    /// confirms it.
    pub fn observe(&mut self, sample_index: usize, score: f32) -> Option<SynchronizationEvent> {
        let beats_peak = match self.state {
            DetectorState::Searching => true,
            DetectorState::Confirming { peak } => score > peak.score,
        };

        if score > self.threshold && beats_peak {
            self.state = DetectorState::Confirming {
                peak: SynchronizationEvent {
                    sample_index,
                    score,
                },
            };
            return None;
        }

        if let DetectorState::Confirming { peak } = self.state {
            if sample_index.saturating_sub(peak.sample_index) > self.confirm_window {
                self.state = DetectorState::Searching;
                return Some(peak);
            }
        }
        None
    }
}

/// Streaming preamble synchronizer
///
/// Keeps the last `preamble_samples` samples in a mirrored ring buffer (every sample is
/// written twice, `len` apart), so the current window is always one contiguous slice
/// and scoring never allocates.
pub struct Synchronizer {
    template: PreambleTemplate,
    scorer: Box<dyn CorrelationScorer>,
    detector: PeakDetector,
    ring: Vec<f32>,
    head: usize,
    processed: usize,
    last_score: f32,
}

impl Synchronizer {
    pub fn new(config: &PhyConfig) -> Self {
        Self::with_scorer(
            PreambleTemplate::new(config),
            scorer_for(config.scoring),
            PeakDetector::new(config.detection_threshold, config.confirm_window),
        )
    }

    pub fn with_scorer(
        template: PreambleTemplate,
        scorer: Box<dyn CorrelationScorer>,
        detector: PeakDetector,
    ) -> Self {
        let len = template.len();
        Self {
            template,
            scorer,
            detector,
            ring: vec![0.0; 2 * len],
            head: 0,
            processed: 0,
            last_score: 0.0,
        }
    }

    pub fn template(&self) -> &PreambleTemplate {
        &self.template
    }

    /// Samples consumed since construction or the last reset
    pub fn samples_processed(&self) -> usize {
        self.processed
    }

    /// Score of the most recent full window (0.0 before the first one)
    pub fn last_score(&self) -> f32 {
        self.last_score
    }

    pub fn detector_state(&self) -> DetectorState {
        self.detector.state()
    }

    /// Ends the stream: a candidate still waiting for confirmation is emitted as is.
    pub fn flush(&mut self) -> Option<SynchronizationEvent> {
        self.detector.flush()
    }

    pub fn reset(&mut self) {
        self.ring.iter_mut().for_each(|x| *x = 0.0);
        self.head = 0;
        self.processed = 0;
        self.last_score = 0.0;
        self.detector.reset();
    }

    pub fn process_sample(&mut self, sample: f32) -> Option<SynchronizationEvent> {
        self.push_and_score(sample)
            .and_then(|(start, score)| self.detector.observe(start, score))
    }

    pub fn process_block(&mut self, samples: &[f32]) -> Vec<SynchronizationEvent> {
        self.process_block_with(samples, |_, _| {})
    }

    /// Like `process_block`, also handing every `(window_start, score)` pair to `observer`.
    pub fn process_block_with<F>(&mut self, samples: &[f32], mut observer: F) -> Vec<SynchronizationEvent>
    where
        F: FnMut(usize, f32),
    {
        let mut events = Vec::new();
        for &sample in samples {
            if let Some((start, score)) = self.push_and_score(sample) {
                observer(start, score);
                if let Some(event) = self.detector.observe(start, score) {
                    events.push(event);
                }
            }
        }
        events
    }

    fn push_and_score(&mut self, sample: f32) -> Option<(usize, f32)> {
        let len = self.template.len();
        if len == 0 {
            return None;
        }

        self.ring[self.head] = sample;
        self.ring[self.head + len] = sample;
        self.head = (self.head + 1) % len;
        self.processed += 1;

        if self.processed < len {
            return None;
        }

        let window = &self.ring[self.head..self.head + len];
        let score = self.scorer.score(&self.template, window);
        self.last_score = score;
        Some((self.processed - len, score))
    }
}

/// Picks the data start around `nominal` that makes the first bit's tone clearest.
///
/// Offsets in `[-samples_per_bit/2, samples_per_bit/2)` are scored by
/// `|m0 - m1| / max(m0, m1)` over one bit. Offsets are tried nearest-first and a
/// farther one has to win by a margin, so ties stay at the nominal start. Candidates
/// whose bit window would leave `stream` are skipped.
pub fn refine_data_start(stream: &[f32], nominal: usize, config: &PhyConfig) -> usize {
    let spb = config.samples_per_bit();
    let radius = (spb / 2) as isize;
    let sample_rate = config.sample_rate as f32;

    let score_at = |start: usize| -> Option<f32> {
        let window = stream.get(start..start + spb)?;
        let m0 = goertzel_magnitude(window, config.freq_zero, sample_rate);
        let m1 = goertzel_magnitude(window, config.freq_one, sample_rate);
        let strongest = m0.max(m1);
        if strongest <= 0.0 {
            return Some(0.0);
        }
        Some((m0 - m1).abs() / strongest)
    };

    let mut best_start = nominal;
    let mut best_score = score_at(nominal).unwrap_or(f32::MIN);

    for distance in 1..=radius {
        for offset in [-distance, distance] {
            if offset >= radius {
                continue;
            }
            let Some(start) = nominal.checked_add_signed(offset) else {
                continue;
            };
            if let Some(score) = score_at(start) {
                if score > best_score + FINE_ALIGNMENT_MARGIN {
                    best_score = score;
                    best_start = start;
                }
            }
        }
    }

    best_start
}
