//! Optional FFT-backed spectrum tap (feature `fft`), grounded on the
//! teacher's `analysis/features/fft.rs` `FftProcessor` (Hann window +
//! `rustfft` magnitude spectrum), adapted here to the complex baseband
//! samples flowing through this pipeline rather than real audio.
//!
//! Spec.md §1: "FFT plans — used by one optional filter node; the core
//! does not require them." This node is a terminal `Sink<Complex<i16>>`
//! that keeps the most recent magnitude spectrum available for a GUI or
//! diagnostic collaborator to poll; it has no `Source` side.

use std::sync::Mutex;

use rustfft::num_complex::Complex as RCplx;
use rustfft::FftPlanner;

use crate::buffer::typed::Buffer;
use crate::complex::Complex;
use crate::config::Config;
use crate::error::{ConfigError, RuntimeError};
use crate::node::Sink;
use crate::types::Type;

/// Computes a Hann-windowed magnitude spectrum over the most recent `size`
/// complex samples seen, zero-padding short buffers.
pub struct FftSpectrum {
    size: usize,
    window: Vec<f32>,
    planner: Mutex<FftPlanner<f32>>,
    latest: Mutex<Vec<f32>>,
}

impl FftSpectrum {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let window = (0..size)
            .map(|i| {
                if size == 1 {
                    1.0
                } else {
                    0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size as f32 - 1.0)).cos())
                }
            })
            .collect();
        FftSpectrum {
            size,
            window,
            planner: Mutex::new(FftPlanner::new()),
            latest: Mutex::new(Vec::new()),
        }
    }

    /// The last computed magnitude spectrum, `size` bins wide (complex FFT,
    /// not folded to positive frequencies only, since baseband input can
    /// carry energy on both sides of DC).
    pub fn latest_spectrum(&self) -> Vec<f32> {
        self.latest.lock().expect("fft spectrum lock poisoned").clone()
    }

    fn compute(&self, samples: &[Complex<i16>]) -> Vec<f32> {
        let mut buffer: Vec<RCplx<f32>> = Vec::with_capacity(self.size);
        for (i, s) in samples.iter().take(self.size).enumerate() {
            let w = self.window[i];
            buffer.push(RCplx::new(s.re as f32 * w, s.im as f32 * w));
        }
        while buffer.len() < self.size {
            buffer.push(RCplx::new(0.0, 0.0));
        }
        let fft = self.planner.lock().expect("fft planner lock poisoned").plan_fft_forward(self.size);
        fft.process(&mut buffer);
        buffer.iter().map(|c| c.norm()).collect()
    }
}

impl Sink<Complex<i16>> for FftSpectrum {
    fn process(&self, buf: Buffer<Complex<i16>>, _allow_overwrite: bool) -> Result<(), RuntimeError> {
        let samples = buf.to_vec();
        if samples.is_empty() {
            return Ok(());
        }
        let spectrum = self.compute(&samples);
        *self.latest.lock().expect("fft spectrum lock poisoned") = spectrum;
        Ok(())
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        if !cfg.has_type() {
            return Ok(());
        }
        if cfg.type_id != Type::CS16 {
            return Err(ConfigError::TypeMismatch {
                expected: crate::types::type_name(Type::CS16).to_string(),
                got: crate::types::type_name(cfg.type_id).to_string(),
            });
        }
        log::debug!("configured FftSpectrum: size={}", self.size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_input_peaks_at_bin_zero() {
        let fft = FftSpectrum::new(16);
        let samples: Vec<Complex<i16>> = (0..16).map(|_| Complex::new(1000, 0)).collect();
        let buf = Buffer::from_values(&samples);
        fft.process(buf, false).unwrap();
        let spectrum = fft.latest_spectrum();
        assert_eq!(spectrum.len(), 16);
        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_bin, 0);
    }

    #[test]
    fn short_buffer_is_zero_padded() {
        let fft = FftSpectrum::new(8);
        let buf = Buffer::from_values(&[Complex::new(500i16, 0)]);
        fft.process(buf, false).unwrap();
        assert_eq!(fft.latest_spectrum().len(), 8);
    }
}
