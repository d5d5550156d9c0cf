//! Offline exports for inspecting a capture: correlation trace, per-bit decisions and an
//! annotated copy of the audio.

use crate::config::CliError;
use sonicframe_core::{FrameReport, Modulation, PhyConfig};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Samples per boundary click in the beep track
pub const CLICK_SAMPLES: usize = 5;
const CLICK_AMPLITUDE: f32 = 0.8;

/// Streaming `sample,score` CSV writer
///
/// Write errors are held until `finish` so it can be fed from a per-window callback.
pub struct TraceWriter {
    path: PathBuf,
    out: BufWriter<File>,
    error: Option<std::io::Error>,
    rows: usize,
}

impl TraceWriter {
    pub fn create(path: &Path) -> Result<Self, CliError> {
        let file = File::create(path).map_err(|e| CliError::io(path, e))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "sample,score").map_err(|e| CliError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
            error: None,
            rows: 0,
        })
    }

    pub fn record(&mut self, sample_index: usize, score: f32) {
        if self.error.is_some() {
            return;
        }
        match writeln!(self.out, "{},{:.6}", sample_index, score) {
            Ok(()) => self.rows += 1,
            Err(e) => self.error = Some(e),
        }
    }

    /// Flush and return the number of rows written
    pub fn finish(mut self) -> Result<usize, CliError> {
        if let Some(e) = self.error.take() {
            return Err(CliError::io(&self.path, e));
        }
        self.out.flush().map_err(|e| CliError::io(&self.path, e))?;
        Ok(self.rows)
    }
}

/// Write a whole trace (window start `offset + i`) in one go
pub fn write_trace(path: &Path, scores: &[f32], offset: usize) -> Result<usize, CliError> {
    let mut writer = TraceWriter::create(path)?;
    for (i, &score) in scores.iter().enumerate() {
        writer.record(offset + i, score);
    }
    writer.finish()
}

/// One row per demodulated bit of every frame that had a complete data region
pub fn write_bit_table(path: &Path, reports: &[FrameReport]) -> Result<usize, CliError> {
    let io = |e| CliError::io(path, e);
    let mut out = BufWriter::new(File::create(path).map_err(io)?);
    writeln!(out, "frame,bit_index,bit,zero,one,confidence,agreement").map_err(io)?;

    let mut rows = 0;
    for (frame, report) in reports.iter().enumerate() {
        let Some(demodulated) = &report.demodulated else {
            continue;
        };
        for (index, decision) in demodulated.decisions.iter().enumerate() {
            let agreement = match decision.agreement {
                Some(agreement) => format!("{:?}", agreement).to_lowercase(),
                None => String::new(),
            };
            writeln!(
                out,
                "{},{},{},{:.6},{:.6},{:.3},{}",
                frame,
                index,
                u8::from(decision.bit),
                decision.zero,
                decision.one,
                decision.confidence,
                agreement
            )
            .map_err(io)?;
            rows += 1;
        }
    }

    out.flush().map_err(io)?;
    Ok(rows)
}

/// Copy of the capture with a short click at every bit (or OFDM symbol) boundary
///
/// Boundaries start at each report's `frame_start`, so fine alignment is visible.
pub fn beep_track(samples: &[f32], reports: &[FrameReport], config: &PhyConfig) -> Vec<f32> {
    let mut track = samples.to_vec();
    let (unit, count) = match config.modulation {
        Modulation::Fsk => (config.samples_per_bit(), config.total_frame_bits()),
        Modulation::Ofdm => (config.ofdm.symbol_samples(), config.ofdm_symbol_count()),
    };

    for report in reports {
        for boundary in 0..=count {
            let start = report.frame_start + boundary * unit;
            if start >= track.len() {
                break;
            }
            let end = (start + CLICK_SAMPLES).min(track.len());
            track[start..end].iter_mut().for_each(|s| *s = CLICK_AMPLITUDE);
        }
    }
    track
}
