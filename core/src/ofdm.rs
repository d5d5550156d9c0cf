use crate::config::{OfdmConfig, PhyConfig};
use crate::error::{PhyError, Result};
use crate::fsk::{response_ratio, BitDecision, DemodulatedFrame, Demodulator};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// OFDM with a cyclic prefix
///
/// Each symbol carries one BPSK bit per subcarrier on FFT bins `1..=num_subcarriers`
/// (DC and every other bin stay zero). The real part of the inverse FFT is sent,
/// preceded by a copy of its last `cyclic_prefix` samples:
///
/// [CP: last 16 samples] [symbol: 64 samples]   (defaults, 80 samples per symbol)
pub struct OfdmModulator {
    ifft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    num_subcarriers: usize,
    cp_len: usize,
}

pub struct OfdmDemodulator {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    num_subcarriers: usize,
    cp_len: usize,
    buffer: Vec<Complex<f32>>,
}

fn check_layout(config: &OfdmConfig) -> Result<()> {
    if config.fft_size == 0 || config.num_subcarriers == 0 || config.num_subcarriers > config.fft_size / 2 {
        return Err(PhyError::InvalidConfig(format!(
            "{} subcarriers do not fit an FFT of size {}",
            config.num_subcarriers, config.fft_size
        )));
    }
    if config.cyclic_prefix >= config.fft_size {
        return Err(PhyError::InvalidConfig(
            "cyclic prefix must be shorter than the FFT size".to_string(),
        ));
    }
    Ok(())
}

impl OfdmModulator {
    pub fn new(config: &PhyConfig) -> Result<Self> {
        Self::with_layout(&config.ofdm)
    }

    pub fn with_layout(layout: &OfdmConfig) -> Result<Self> {
        check_layout(layout)?;
        let mut planner = FftPlanner::new();
        Ok(Self {
            ifft: planner.plan_fft_inverse(layout.fft_size),
            fft_size: layout.fft_size,
            num_subcarriers: layout.num_subcarriers,
            cp_len: layout.cyclic_prefix,
        })
    }

    pub fn symbol_samples(&self) -> usize {
        self.cp_len + self.fft_size
    }

    /// Modulates up to `num_subcarriers` bits into one symbol with its cyclic prefix.
    pub fn modulate_symbol(&self, bits: &[bool]) -> Result<Vec<f32>> {
        if bits.len() > self.num_subcarriers {
            return Err(PhyError::InvalidInputSize {
                expected: self.num_subcarriers,
                actual: bits.len(),
            });
        }

        let mut spectrum = vec![Complex::new(0.0, 0.0); self.fft_size];
        for (i, &bit) in bits.iter().enumerate() {
            spectrum[i + 1] = Complex::new(if bit { 1.0 } else { -1.0 }, 0.0);
        }

        self.ifft.process(&mut spectrum);

        let scale = 1.0 / self.fft_size as f32;
        let symbol: Vec<f32> = spectrum.iter().map(|c| c.re * scale).collect();

        let mut output = Vec::with_capacity(self.symbol_samples());
        output.extend_from_slice(&symbol[self.fft_size - self.cp_len..]);
        output.extend_from_slice(&symbol);
        Ok(output)
    }

    /// Modulates a bit stream; a short final group leaves its upper subcarriers empty.
    pub fn modulate(&self, bits: &[bool]) -> Result<Vec<f32>> {
        let mut output = Vec::with_capacity(bits.len().div_ceil(self.num_subcarriers) * self.symbol_samples());
        for chunk in bits.chunks(self.num_subcarriers) {
            output.extend(self.modulate_symbol(chunk)?);
        }
        Ok(output)
    }
}

impl OfdmDemodulator {
    pub fn new(config: &PhyConfig) -> Result<Self> {
        Self::with_layout(&config.ofdm)
    }

    pub fn with_layout(layout: &OfdmConfig) -> Result<Self> {
        check_layout(layout)?;
        let mut planner = FftPlanner::new();
        Ok(Self {
            fft: planner.plan_fft_forward(layout.fft_size),
            fft_size: layout.fft_size,
            num_subcarriers: layout.num_subcarriers,
            cp_len: layout.cyclic_prefix,
            buffer: vec![Complex::new(0.0, 0.0); layout.fft_size],
        })
    }

    pub fn symbol_samples(&self) -> usize {
        self.cp_len + self.fft_size
    }

    /// Strips the cyclic prefix and decides every subcarrier of one symbol.
    pub fn demodulate_symbol(&mut self, samples: &[f32]) -> Result<Vec<BitDecision>> {
        if samples.len() < self.symbol_samples() {
            return Err(PhyError::InsufficientSamples {
                start: 0,
                needed: self.symbol_samples(),
                available: samples.len(),
            });
        }

        let body = &samples[self.cp_len..self.cp_len + self.fft_size];
        for (slot, &sample) in self.buffer.iter_mut().zip(body) {
            *slot = Complex::new(sample, 0.0);
        }
        self.fft.process(&mut self.buffer);

        Ok(self.buffer[1..=self.num_subcarriers]
            .iter()
            .map(|bin| BitDecision {
                bit: bin.re > 0.0,
                zero: (-bin.re).max(0.0),
                one: bin.re.max(0.0),
                confidence: response_ratio(bin.re, bin.im),
                agreement: None,
            })
            .collect())
    }
}

impl Demodulator for OfdmDemodulator {
    fn samples_for(&self, bit_count: usize) -> usize {
        bit_count.div_ceil(self.num_subcarriers) * self.symbol_samples()
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

        let symbol_len = self.symbol_samples();
        let mut decisions = Vec::with_capacity(bit_count + self.num_subcarriers);
        for symbol in samples[..needed].chunks_exact(symbol_len) {
            decisions.extend(self.demodulate_symbol(symbol)?);
        }
        decisions.truncate(bit_count);
        Ok(DemodulatedFrame::from_decisions(decisions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Modulation;

    fn config() -> PhyConfig {
        PhyConfig::default().with_modulation(Modulation::Ofdm)
    }

    #[test]
    fn test_symbol_has_cyclic_prefix() {
        let modulator = OfdmModulator::new(&config()).unwrap();
        let bits: Vec<bool> = (0..32).map(|i| i % 3 == 0).collect();
        let symbol = modulator.modulate_symbol(&bits).unwrap();
        assert_eq!(symbol.len(), 80);
        // CP equals the tail of the symbol body
        for i in 0..16 {
            assert!((symbol[i] - symbol[64 + i]).abs() < 1e-7);
        }
    }

    #[test]
    fn test_symbol_roundtrip() {
        let config = config();
        let modulator = OfdmModulator::new(&config).unwrap();
        let mut demodulator = OfdmDemodulator::new(&config).unwrap();
        let bits: Vec<bool> = (0..32).map(|i| (i * 7) % 5 < 2).collect();

        let samples = modulator.modulate_symbol(&bits).unwrap();
        let decisions = demodulator.demodulate_symbol(&samples).unwrap();
        let decoded: Vec<bool> = decisions.iter().map(|d| d.bit).collect();
        assert_eq!(decoded, bits);
    }

    #[test]
    fn test_partial_final_symbol_roundtrip() {
        let config = config();
        let modulator = OfdmModulator::new(&config).unwrap();
        let mut demodulator = OfdmDemodulator::new(&config).unwrap();
        let bits: Vec<bool> = (0..45).map(|i| i % 2 == 0 || i % 7 == 0).collect();

        let samples = modulator.modulate(&bits).unwrap();
        assert_eq!(samples.len(), 2 * 80);
        let frame = demodulator.demodulate(&samples, bits.len()).unwrap();
        assert_eq!(frame.bits, bits);
        assert_eq!(frame.decisions.len(), 45);
    }

    #[test]
    fn test_too_many_bits_for_one_symbol() {
        let modulator = OfdmModulator::new(&config()).unwrap();
        assert!(matches!(
            modulator.modulate_symbol(&[true; 33]),
            Err(PhyError::InvalidInputSize { expected: 32, actual: 33 })
        ));
    }

    #[test]
    fn test_truncated_symbol_is_insufficient() {
        let mut demodulator = OfdmDemodulator::new(&config()).unwrap();
        assert!(matches!(
            demodulator.demodulate(&[0.0; 100], 40),
            Err(PhyError::InsufficientSamples { needed: 160, .. })
        ));
    }

    #[test]
    fn test_layout_checked() {
        let layout = OfdmConfig {
            fft_size: 64,
            num_subcarriers: 33,
            cyclic_prefix: 16,
        };
        assert!(OfdmModulator::with_layout(&layout).is_err());
        let layout = OfdmConfig {
            fft_size: 64,
            num_subcarriers: 32,
            cyclic_prefix: 64,
        };
        assert!(OfdmDemodulator::with_layout(&layout).is_err());
    }
}
