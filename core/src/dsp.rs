//! Small signal-processing helpers shared by the modulators and detectors

use std::f32::consts::{PI, TAU};

/// Continuous-phase sine oscillator
///
/// The phase is kept wrapped to `[0, 2π)` so long transmissions do not lose precision.
#[derive(Debug, Clone, Copy)]
pub struct Oscillator {
    phase: f32,
    sample_rate: f32,
}

impl Oscillator {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Advances by one sample at `freq`, then returns the sine of the new phase.
    pub fn step_then_sample(&mut self, freq: f32) -> f32 {
        self.advance(freq);
        self.phase.sin()
    }

    /// Returns the sine of the current phase, then advances by one sample at `freq`.
    pub fn sample_then_step(&mut self, freq: f32) -> f32 {
        let value = self.phase.sin();
        self.advance(freq);
        value
    }

    fn advance(&mut self, freq: f32) {
        self.phase = (self.phase + TAU * freq / self.sample_rate).rem_euclid(TAU);
    }
}

pub fn energy(samples: &[f32]) -> f32 {
    samples.iter().map(|x| x * x).sum()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}

/// Goertzel magnitude at the DFT bin nearest `freq`
pub fn goertzel_magnitude(samples: &[f32], freq: f32, sample_rate: f32) -> f32 {
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }

    let k = (0.5 + (n as f32 * freq / sample_rate)) as usize;
    let omega = 2.0 * PI * k as f32 / n as f32;
    let coeff = 2.0 * omega.cos();

    let mut q1 = 0.0;
    let mut q2 = 0.0;
    for &sample in samples {
        let q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }

    let real = q1 - q2 * omega.cos();
    let imag = q2 * omega.sin();
    (real * real + imag * imag).sqrt()
}

/// Window that ramps both edges over `taper_len` samples with a sine-squared profile.
pub fn raised_cosine_window(len: usize, taper_len: usize) -> Vec<f32> {
    let taper = taper_len.min(len / 2);
    let mut window = vec![1.0; len];
    for i in 0..taper {
        let progress = i as f32 / taper as f32;
        let value = (PI * progress / 2.0).sin().powi(2);
        window[i] = value;
        window[len - 1 - i] = value;
    }
    window
}
