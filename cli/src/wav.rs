use crate::config::CliError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Write mono 16-bit PCM, clamping to [-1.0, 1.0]
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), CliError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Block reader over a WAV capture, yielding the first channel as f32
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    spec: WavSpec,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<Self, CliError> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) | (SampleFormat::Float, 32) => {}
            (format, bits) => {
                return Err(CliError::UnsupportedWav(format!(
                    "{:?} with {} bits per sample (expected 16-bit PCM or 32-bit float)",
                    format, bits
                )))
            }
        }
        Ok(Self { reader, spec })
    }

    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    /// Length of the capture in frames
    pub fn duration(&self) -> u32 {
        self.reader.duration()
    }

    /// Fill `block` with up to `block.len()` samples; returns how many were read
    pub fn read_block(&mut self, block: &mut [f32]) -> Result<usize, CliError> {
        let channels = self.spec.channels.max(1) as usize;
        let mut filled = 0;

        match self.spec.sample_format {
            SampleFormat::Int => {
                let mut samples = self.reader.samples::<i16>();
                'frames: while filled < block.len() {
                    for channel in 0..channels {
                        match samples.next() {
                            Some(sample) => {
                                if channel == 0 {
                                    block[filled] = sample? as f32 / 32768.0;
                                }
                            }
                            None => break 'frames,
                        }
                    }
                    filled += 1;
                }
            }
            SampleFormat::Float => {
                let mut samples = self.reader.samples::<f32>();
                'frames: while filled < block.len() {
                    for channel in 0..channels {
                        match samples.next() {
                            Some(sample) => {
                                if channel == 0 {
                                    block[filled] = sample?;
                                }
                            }
                            None => break 'frames,
                        }
                    }
                    filled += 1;
                }
            }
        }

        Ok(filled)
    }

    pub fn read_all(mut self) -> Result<Vec<f32>, CliError> {
        let mut samples = vec![0.0; self.duration() as usize];
        let read = self.read_block(&mut samples)?;
        samples.truncate(read);
        Ok(samples)
    }
}
