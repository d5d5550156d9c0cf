//! FFT-based correlation over whole buffers
//!
//! The streaming synchronizer scores one window per sample. For offline work (correlation
//! traces, cross-checking the streaming scores) the same normalized score can be computed
//! for every window of a buffer at once: one FFT cross-correlation for the numerators and a
//! prefix sum of squared samples for the window energies.
//!
//! # Indexing
//!
//! - **Full**: length `N + M - 1`; a window starting at `signal[i]` maps to index `i + M - 1`.
//! - **Valid**: length `N - M + 1` (empty if `M > N`); index `i` is the window starting at `signal[i]`.

use crate::config::ScoringMethod;
use crate::error::{PhyError, Result};
use crate::sync::PreambleTemplate;
use realfft::RealFftPlanner;

/// Energy below which a window is treated as silence and scores zero
const MIN_WINDOW_ENERGY: f64 = 1e-9;

/// Output size of `fft_correlate_1d`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every lag with any overlap
    Full,
    /// Only lags where the template lies completely inside the signal
    Valid,
}

/// Cross-correlate `template` against `signal` via FFT
///
/// Returns an empty vector if either input is empty, or for `Mode::Valid` when the
/// signal is shorter than the template.
pub fn fft_correlate_1d(signal: &[f32], template: &[f32], mode: Mode) -> Result<Vec<f32>> {
    if signal.is_empty() || template.is_empty() {
        return Ok(Vec::new());
    }
    if mode == Mode::Valid && signal.len() < template.len() {
        return Ok(Vec::new());
    }

    let full_len = signal.len() + template.len() - 1;
    let n = full_len.next_power_of_two();

    let mut planner = RealFftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let transform = |mut buffer: Vec<f32>| {
        let mut spectrum = forward.make_output_vec();
        forward
            .process(&mut buffer, &mut spectrum)
            .map_err(|e| PhyError::FftError(format!("forward transform of {} points: {:?}", n, e)))?;
        Ok::<_, PhyError>(spectrum)
    };

    // Correlation is convolution with the time-reversed template
    let mut product = transform(zero_padded(signal.iter().copied(), n))?;
    let kernel = transform(zero_padded(template.iter().rev().copied(), n))?;
    product.iter_mut().zip(&kernel).for_each(|(a, b)| *a *= *b);

    let mut lags = inverse.make_output_vec();
    inverse
        .process(&mut product, &mut lags)
        .map_err(|e| PhyError::FftError(format!("inverse transform of {} points: {:?}", n, e)))?;
    let scale = 1.0 / n as f32;

    let range = match mode {
        Mode::Full => 0..full_len,
        Mode::Valid => template.len() - 1..signal.len(),
    };
    Ok(lags[range].iter().map(|x| x * scale).collect())
}

fn zero_padded(values: impl Iterator<Item = f32>, n: usize) -> Vec<f32> {
    let mut buffer: Vec<f32> = values.collect();
    buffer.resize(n, 0.0);
    buffer
}

/// Normalized correlation score of every full window of `signal` against the template
///
/// Index `i` holds the score of the window starting at `signal[i]`, the same value the
/// streaming synchronizer reports for that window with normalized scoring.
pub fn normalized_correlation_trace(signal: &[f32], template: &PreambleTemplate) -> Result<Vec<f32>> {
    let m = template.len();
    let raw = fft_correlate_1d(signal, template.samples(), Mode::Valid)?;
    if raw.is_empty() {
        return Ok(raw);
    }

    let mut sq_prefix = vec![0.0f64; signal.len() + 1];
    for (k, &s) in signal.iter().enumerate() {
        sq_prefix[k + 1] = sq_prefix[k] + (s as f64) * (s as f64);
    }

    let template_energy = template.energy() as f64;
    Ok(raw
        .iter()
        .enumerate()
        .map(|(i, &cross)| {
            let window_energy = sq_prefix[i + m] - sq_prefix[i];
            if window_energy < MIN_WINDOW_ENERGY || template_energy < MIN_WINDOW_ENERGY {
                return 0.0;
            }
            ((cross as f64) / (window_energy * template_energy).sqrt()).clamp(-1.0, 1.0) as f32
        })
        .collect())
}

/// Score of every full window of `signal` under the given scoring method
///
/// Matches what a streaming synchronizer configured with `method` reports per window.
pub fn correlation_trace(signal: &[f32], template: &PreambleTemplate, method: ScoringMethod) -> Result<Vec<f32>> {
    match method {
        ScoringMethod::Normalized => normalized_correlation_trace(signal, template),
        ScoringMethod::DotProduct => {
            let energy = template.energy();
            let raw = fft_correlate_1d(signal, template.samples(), Mode::Valid)?;
            if (energy as f64) < MIN_WINDOW_ENERGY {
                return Ok(vec![0.0; raw.len()]);
            }
            Ok(raw.into_iter().map(|cross| cross / energy).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhyConfig;
    use crate::sync::Synchronizer;

    #[test]
    fn test_fft_correlate_lengths() {
        let signal = vec![1.0; 100];
        let template = vec![1.0; 10];
        assert_eq!(fft_correlate_1d(&signal, &template, Mode::Full).unwrap().len(), 109);
        assert_eq!(fft_correlate_1d(&signal, &template, Mode::Valid).unwrap().len(), 91);
        assert!(fft_correlate_1d(&[1.0, 2.0], &template, Mode::Valid).unwrap().is_empty());
        assert!(fft_correlate_1d(&[], &template, Mode::Full).unwrap().is_empty());
    }

    #[test]
    fn test_fft_correlate_full_impulse() {
        let signal = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let template = vec![1.0, 0.0, 0.0];
        let result = fft_correlate_1d(&signal, &template, Mode::Full).unwrap();

        assert_eq!(result.len(), 7);
        for (i, expected) in [1.0, 2.0, 3.0, 4.0, 5.0].iter().enumerate() {
            assert!((result[i + 2] - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn test_fft_correlate_valid_matches_direct() {
        let signal: Vec<f32> = (0..50).map(|i| ((i * 37) % 11) as f32 - 5.0).collect();
        let template = vec![0.5, -1.0, 2.0, 0.25];
        let result = fft_correlate_1d(&signal, &template, Mode::Valid).unwrap();

        for (i, value) in result.iter().enumerate() {
            let direct: f32 = template.iter().zip(&signal[i..]).map(|(t, s)| t * s).sum();
            assert!((value - direct).abs() < 1e-3, "index {}: {} vs {}", i, value, direct);
        }
    }

    #[test]
    fn test_trace_matches_streaming_scores() {
        let config = PhyConfig::default();
        let mut sync = Synchronizer::new(&config);
        let template = sync.template().clone();

        let mut signal = vec![0.0; 300];
        signal.extend(template.samples().iter().map(|s| s * 0.4));
        signal.extend((0..500).map(|i| (i as f32 * 0.37).sin() * 0.2));

        let trace = normalized_correlation_trace(&signal, &template).unwrap();
        let mut streamed = vec![0.0; trace.len()];
        sync.process_block_with(&signal, |start, score| streamed[start] = score);

        assert_eq!(trace.len(), signal.len() - template.len() + 1);
        for (i, (a, b)) in trace.iter().zip(&streamed).enumerate() {
            assert!((a - b).abs() < 1e-3, "window {}: trace={} streamed={}", i, a, b);
        }

        let (peak, _) = trace
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &s)| if s > best.1 { (i, s) } else { best });
        assert_eq!(peak, 300);
    }

    #[test]
    fn test_dot_product_trace_matches_streaming_scores() {
        let config = PhyConfig {
            scoring: ScoringMethod::DotProduct,
            ..PhyConfig::default()
        };
        let mut sync = Synchronizer::new(&config);
        let template = sync.template().clone();

        let mut signal = vec![0.0; 200];
        signal.extend(template.samples().iter().map(|s| s * 0.25));
        signal.extend((0..400).map(|i| (i as f32 * 0.21).cos() * 0.1));

        let trace = correlation_trace(&signal, &template, ScoringMethod::DotProduct).unwrap();
        let mut streamed = vec![0.0; trace.len()];
        sync.process_block_with(&signal, |start, score| streamed[start] = score);

        for (i, (a, b)) in trace.iter().zip(&streamed).enumerate() {
            assert!((a - b).abs() < 1e-3, "window {}: trace={} streamed={}", i, a, b);
        }
        // Dot-product scores keep the amplitude; a normalized trace would read 1.0 here
        assert!((trace[200] - 0.25).abs() < 1e-3, "peak {}", trace[200]);

        let normalized = correlation_trace(&signal, &template, ScoringMethod::Normalized).unwrap();
        assert!((normalized[200] - 1.0).abs() < 1e-3);
    }
}
