use crate::config::{Modulation, PhyConfig};
use crate::error::{PhyError, Result};
use crate::framing::{FrameValidator, ValidatedFrame};
use crate::fsk::{DemodulatedFrame, Demodulator, FskDemodulator};
use crate::ofdm::OfdmDemodulator;
use crate::sync::{refine_data_start, SynchronizationEvent, Synchronizer};
use log::{debug, info, trace, warn};
use std::collections::VecDeque;

/// Where the receiver is in its scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReceiverState {
    /// No samples seen yet
    Idle,
    /// Scoring windows, no confirmed preamble waiting for data
    Searching,
    /// A preamble is confirmed and its data region is still arriving
    Synced { sync: SynchronizationEvent },
}

/// Everything the receiver learned about one confirmed preamble
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub sync: SynchronizationEvent,
    /// Stream index of the first data sample actually used
    pub frame_start: usize,
    /// `frame_start` minus the nominal start right after the preamble
    pub alignment_offset: isize,
    /// Present whenever the data region was complete
    pub demodulated: Option<DemodulatedFrame>,
    pub outcome: Result<ValidatedFrame>,
}

impl FrameReport {
    pub fn is_accepted(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn payload(&self) -> Option<&[bool]> {
        self.outcome.as_ref().ok().map(|frame| frame.payload.as_slice())
    }
}

/// Incremental receive session
///
/// Samples can be pushed in blocks of any size. Every confirmed preamble produces exactly
/// one `FrameReport` once its data region has arrived (or at `finish`, if the stream ends
/// first). Only the samples that a pending or future frame can still need are kept.
pub struct Receiver {
    config: PhyConfig,
    synchronizer: Synchronizer,
    demodulator: Box<dyn Demodulator>,
    validator: FrameValidator,
    history: VecDeque<f32>,
    history_start: usize,
    pending: VecDeque<SynchronizationEvent>,
    holdoff_until: usize,
    frame_data_samples: usize,
    alignment_radius: usize,
}

impl Receiver {
    pub fn new(config: PhyConfig) -> Result<Self> {
        config.validate()?;

        let demodulator: Box<dyn Demodulator> = match config.modulation {
            Modulation::Fsk => Box::new(FskDemodulator::new(&config)),
            Modulation::Ofdm => Box::new(OfdmDemodulator::new(&config)?),
        };
        // Fine alignment scores FSK tones, so it only applies to FSK frames
        let alignment_radius = if config.fine_alignment && config.modulation == Modulation::Fsk {
            config.samples_per_bit() / 2
        } else {
            0
        };

        Ok(Self {
            synchronizer: Synchronizer::new(&config),
            validator: FrameValidator::new(&config),
            demodulator,
            history: VecDeque::new(),
            history_start: 0,
            pending: VecDeque::new(),
            holdoff_until: 0,
            frame_data_samples: config.total_frame_data_samples(),
            alignment_radius,
            config,
        })
    }

    pub fn config(&self) -> &PhyConfig {
        &self.config
    }

    pub fn state(&self) -> ReceiverState {
        if self.synchronizer.samples_processed() == 0 {
            ReceiverState::Idle
        } else if let Some(&sync) = self.pending.front() {
            ReceiverState::Synced { sync }
        } else {
            ReceiverState::Searching
        }
    }

    pub fn samples_processed(&self) -> usize {
        self.synchronizer.samples_processed()
    }

    /// Correlation score of the most recent window
    pub fn last_score(&self) -> f32 {
        self.synchronizer.last_score()
    }

    /// Samples currently held for pending or future frames
    pub fn buffered_samples(&self) -> usize {
        self.history.len()
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<FrameReport> {
        self.push_with(samples, |_, _| {})
    }

    /// Like `push`, also handing every `(window_start, score)` pair to `observer`.
    pub fn push_with<F>(&mut self, samples: &[f32], observer: F) -> Vec<FrameReport>
    where
        F: FnMut(usize, f32),
    {
        self.history.extend(samples.iter().copied());
        for event in self.synchronizer.process_block_with(samples, observer) {
            self.on_synchronized(event);
        }

        let mut reports = Vec::new();
        self.drain_ready(false, &mut reports);
        self.trim_history();
        reports
    }

    /// Ends the stream: frames still waiting for data are reported as truncated.
    ///
    /// A preamble candidate whose confirmation window is still open is taken as
    /// confirmed, since nothing after the end can outscore it.
    pub fn finish(&mut self) -> Vec<FrameReport> {
        if let Some(event) = self.synchronizer.flush() {
            self.on_synchronized(event);
        }
        let mut reports = Vec::new();
        self.drain_ready(true, &mut reports);
        reports
    }

    pub fn reset(&mut self) {
        self.synchronizer.reset();
        self.history.clear();
        self.history_start = 0;
        self.pending.clear();
        self.holdoff_until = 0;
    }

    fn stream_end(&self) -> usize {
        self.history_start + self.history.len()
    }

    fn on_synchronized(&mut self, sync: SynchronizationEvent) {
        if sync.sample_index < self.holdoff_until {
            debug!(
                "Ignoring preamble at sample {} inside the previous frame (ends at {})",
                sync.sample_index, self.holdoff_until
            );
            return;
        }

        info!(
            "Preamble detected at sample {} ({:.3}s), score {:.3}",
            sync.sample_index,
            sync.sample_index as f32 / self.config.sample_rate as f32,
            sync.score
        );
        self.holdoff_until = sync.sample_index + self.config.frame_samples();
        self.pending.push_back(sync);
    }

    fn drain_ready(&mut self, at_end: bool, reports: &mut Vec<FrameReport>) {
        while let Some(&sync) = self.pending.front() {
            let nominal = sync.sample_index + self.config.preamble_samples;
            let needed_end = nominal + self.frame_data_samples + self.alignment_radius;
            if needed_end > self.stream_end() && !at_end {
                break;
            }
            self.pending.pop_front();
            reports.push(self.extract(sync, nominal));
        }
    }

    fn extract(&mut self, sync: SynchronizationEvent, nominal: usize) -> FrameReport {
        let end = self.stream_end();
        let history_start = self.history_start;
        let stream = self.history.make_contiguous();

        let frame_start = match nominal.checked_sub(history_start) {
            Some(relative) if self.alignment_radius > 0 => {
                refine_data_start(stream, relative, &self.config) + history_start
            }
            _ => nominal,
        };
        let alignment_offset = frame_start as isize - nominal as isize;
        if alignment_offset != 0 {
            trace!("Fine alignment moved frame start by {} samples", alignment_offset);
        }

        let data_end = frame_start + self.frame_data_samples;
        if frame_start < history_start || data_end > end {
            let available = end.saturating_sub(frame_start);
            warn!(
                "Frame at sample {} truncated: {} of {} data samples available",
                frame_start, available, self.frame_data_samples
            );
            return FrameReport {
                sync,
                frame_start,
                alignment_offset,
                demodulated: None,
                outcome: Err(PhyError::InsufficientSamples {
                    start: frame_start,
                    needed: self.frame_data_samples,
                    available,
                }),
            };
        }

        let window = &stream[frame_start - history_start..data_end - history_start];
        let (demodulated, outcome) =
            match self.demodulator.demodulate(window, self.validator.frame_bits()) {
                Ok(frame) => {
                    let outcome = self.validator.validate(&frame.bits);
                    (Some(frame), outcome)
                }
                Err(e) => (None, Err(e)),
            };

        match (&outcome, &demodulated) {
            (Ok(frame), Some(demod)) => info!(
                "Frame at sample {} accepted: {} payload bits, mean confidence {:.2}, {} weak bits, {} repaired groups",
                frame_start,
                frame.payload.len(),
                demod.quality.mean_confidence,
                demod.quality.weak_bits,
                frame.repaired_groups
            ),
            (Err(e), _) => warn!("Frame at sample {} rejected: {}", frame_start, e),
            _ => {}
        }

        FrameReport {
            sync,
            frame_start,
            alignment_offset,
            demodulated,
            outcome,
        }
    }

    fn trim_history(&mut self) {
        // A preamble not yet confirmed starts at most `confirm_window` samples before the
        // current window, so its data cannot begin earlier than this.
        let lookback = self.config.preamble_samples + self.config.confirm_window + self.alignment_radius + 1;
        let mut keep_from = self.stream_end().saturating_sub(lookback);
        if let Some(sync) = self.pending.front() {
            let data_start = (sync.sample_index + self.config.preamble_samples)
                .saturating_sub(self.alignment_radius);
            keep_from = keep_from.min(data_start);
        }

        let excess = keep_from.saturating_sub(self.history_start).min(self.history.len());
        self.history.drain(..excess);
        self.history_start += excess;
    }
}

/// Batch front end over `Receiver` for a complete capture
pub struct Decoder {
    config: PhyConfig,
}

impl Decoder {
    pub fn new(config: PhyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Reports for every preamble found in `samples`
    ///
    /// Returns `SynchronizationFailure` when no preamble is confirmed at all.
    pub fn decode_all(&self, samples: &[f32]) -> Result<Vec<FrameReport>> {
        let mut receiver = Receiver::new(self.config.clone())?;
        let mut reports = receiver.push(samples);
        reports.extend(receiver.finish());

        if reports.is_empty() {
            return Err(PhyError::SynchronizationFailure);
        }
        Ok(reports)
    }

    /// Payload of the first accepted frame, or the first frame's error
    pub fn decode(&self, samples: &[f32]) -> Result<Vec<bool>> {
        let mut first_error = None;
        for report in self.decode_all(samples)? {
            match report.outcome {
                Ok(frame) => return Ok(frame.payload),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(PhyError::SynchronizationFailure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::framing::parse_bit_string;

    fn encode(config: &PhyConfig, payload: &[bool]) -> Vec<f32> {
        Encoder::new(config.clone()).unwrap().encode(payload).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let payload = parse_bit_string("10110010");
        let config = PhyConfig::default().with_payload_bits(payload.len());
        let samples = encode(&config, &payload);

        let mut receiver = Receiver::new(config.clone()).unwrap();
        assert_eq!(receiver.state(), ReceiverState::Idle);

        receiver.push(&samples[..1000]);
        assert_eq!(receiver.state(), ReceiverState::Searching);

        // Preamble confirmed, data region not complete yet
        let split = config.leading_silence + config.preamble_samples + config.confirm_window + 100;
        assert!(receiver.push(&samples[1000..split]).is_empty());
        match receiver.state() {
            ReceiverState::Synced { sync } => assert_eq!(sync.sample_index, config.leading_silence),
            other => panic!("expected Synced, got {:?}", other),
        }

        let reports = receiver.push(&samples[split..]);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].payload(), Some(payload.as_slice()));
        assert_eq!(receiver.state(), ReceiverState::Searching);
    }

    #[test]
    fn test_history_stays_bounded() {
        let payload = vec![true; 64];
        let config = PhyConfig::default().with_payload_bits(64);
        let mut samples = encode(&config, &payload);
        samples.extend(vec![0.0; 50_000]);

        let mut receiver = Receiver::new(config.clone()).unwrap();
        let mut accepted = 0;
        for block in samples.chunks(1024) {
            accepted += receiver.push(block).iter().filter(|r| r.is_accepted()).count();
            assert!(receiver.buffered_samples() <= config.frame_samples() + 2 * config.preamble_samples + 2048);
        }
        assert_eq!(accepted, 1);
    }

    #[test]
    fn test_truncated_capture_reported_at_finish() {
        let payload = vec![false; 100];
        let config = PhyConfig::default().with_payload_bits(100);
        let samples = encode(&config, &payload);
        let cut = config.leading_silence + config.preamble_samples + config.confirm_window + 500;

        let mut receiver = Receiver::new(config.clone()).unwrap();
        assert!(receiver.push(&samples[..cut]).is_empty());
        let reports = receiver.finish();
        assert_eq!(reports.len(), 1);
        match &reports[0].outcome {
            Err(PhyError::InsufficientSamples { start, needed, available }) => {
                assert_eq!(*start, config.leading_silence + config.preamble_samples);
                assert_eq!(*needed, config.total_frame_data_samples());
                assert_eq!(*available, cut - start);
            }
            other => panic!("expected InsufficientSamples, got {:?}", other),
        }
        assert!(reports[0].demodulated.is_none());
    }

    #[test]
    fn test_capture_cut_inside_confirmation_window() {
        let payload = vec![true; 32];
        let config = PhyConfig::default().with_payload_bits(32);
        let samples = encode(&config, &payload);
        let cut = config.leading_silence + config.preamble_samples + 100;

        let mut receiver = Receiver::new(config.clone()).unwrap();
        assert!(receiver.push(&samples[..cut]).is_empty());
        assert_eq!(receiver.state(), ReceiverState::Searching);

        let reports = receiver.finish();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sync.sample_index, config.leading_silence);
        assert!(matches!(
            reports[0].outcome,
            Err(PhyError::InsufficientSamples { .. })
        ));

        let decoder = Decoder::new(config).unwrap();
        assert!(matches!(
            decoder.decode(&samples[..cut]),
            Err(PhyError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn test_decoder_reports_sync_failure_on_silence() {
        let decoder = Decoder::new(PhyConfig::default()).unwrap();
        assert_eq!(
            decoder.decode(&vec![0.0; 20_000]).unwrap_err(),
            PhyError::SynchronizationFailure
        );
    }

    #[test]
    fn test_fine_alignment_keeps_clean_frames() {
        let payload = parse_bit_string("1010110011110000");
        let config = PhyConfig {
            fine_alignment: true,
            ..PhyConfig::default().with_payload_bits(payload.len())
        };
        let samples = encode(&config, &payload);
        let reports = Decoder::new(config).unwrap().decode_all(&samples).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].alignment_offset, 0);
        assert_eq!(reports[0].payload(), Some(payload.as_slice()));
    }
}
