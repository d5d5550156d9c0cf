use crate::config::{Modulation, PhyConfig};
use crate::dsp::peak_amplitude;
use crate::error::Result;
use crate::framing::build_frame_bits;
use crate::fsk::FskModulator;
use crate::ofdm::OfdmModulator;
use crate::sync::generate_preamble;
use crate::PREAMBLE_AMPLITUDE;
use log::{debug, info};

/// Floor for the peak used in normalization, so silence is not blown up
const MIN_NORMALIZATION_PEAK: f32 = 0.01;

enum DataModulator {
    Fsk(FskModulator),
    Ofdm(OfdmModulator),
}

/// Waveform generator: silence, preamble, modulated frame bits, silence
///
/// The output is normalized so that its largest sample equals `output_peak`.
pub struct Encoder {
    config: PhyConfig,
    modulator: DataModulator,
}

impl Encoder {
    pub fn new(config: PhyConfig) -> Result<Self> {
        config.validate()?;
        let modulator = match config.modulation {
            Modulation::Fsk => DataModulator::Fsk(FskModulator::new(&config)),
            Modulation::Ofdm => DataModulator::Ofdm(OfdmModulator::new(&config)?),
        };
        Ok(Self { config, modulator })
    }

    pub fn config(&self) -> &PhyConfig {
        &self.config
    }

    /// Encode payload bits into audio samples
    ///
    /// The payload must be exactly `payload_bits` long. The CRC-8 trailer (and the
    /// repetition code, if configured) is added here.
    pub fn encode(&self, payload: &[bool]) -> Result<Vec<f32>> {
        let frame_bits = build_frame_bits(payload, &self.config)?;
        let config = &self.config;

        let mut samples = Vec::with_capacity(
            config.leading_silence + config.frame_samples() + config.trailing_silence,
        );
        samples.resize(config.leading_silence, 0.0);

        let (preamble, mut oscillator) = generate_preamble(
            config.preamble_samples,
            config.chirp_start,
            config.chirp_end,
            config.sample_rate as f32,
            PREAMBLE_AMPLITUDE,
        );
        samples.extend_from_slice(&preamble);

        match &self.modulator {
            DataModulator::Fsk(modulator) => {
                modulator.modulate_into(&frame_bits, &mut oscillator, &mut samples)
            }
            DataModulator::Ofdm(modulator) => samples.extend(modulator.modulate(&frame_bits)?),
        }

        samples.resize(samples.len() + config.trailing_silence, 0.0);

        let gain = config.output_peak / peak_amplitude(&samples).max(MIN_NORMALIZATION_PEAK);
        samples.iter_mut().for_each(|s| *s *= gain);

        debug!(
            "frame layout: silence={} preamble={} data={} trailing={} gain={:.3}",
            config.leading_silence,
            config.preamble_samples,
            config.total_frame_data_samples(),
            config.trailing_silence,
            gain
        );
        info!(
            "Encoded {} payload bits ({} on air, {}) into {} samples",
            payload.len(),
            frame_bits.len(),
            config.modulation,
            samples.len()
        );

        Ok(samples)
    }
}
