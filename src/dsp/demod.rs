//! AM/USB/FM demodulators and FM de-emphasis (spec §4.I, SPEC_FULL §4.K/4.L),
//! grounded on `original_source/src/demod.hh` and `src/math.hh`.

use std::sync::Mutex;

use crate::buffer::typed::Buffer;
use crate::complex::Complex;
use crate::config::Config;
use crate::error::{ConfigError, RuntimeError};
use crate::node::{Sink, Source};
use crate::types::Type;

/// Piecewise-linear integer `atan2` approximation, 12-bit angle units
/// (`pi` == 4096). Ported from `original_source/src/math.hh`'s
/// `fast_atan2<int16_t, int16_t>` specialisation — the only one the pipeline
/// needs since FM demodulation always accumulates in the `i16` super-scalar.
pub fn fast_atan2(a: i32, b: i32) -> i16 {
    const PI4: i32 = 1 << 12;
    const PI34: i32 = 3 * (1 << 12);
    if a == 0 && b == 0 {
        return 0;
    }
    let aabs = a.abs();
    let angle = if b >= 0 {
        PI4 - PI4 * (b - aabs) / (b + aabs)
    } else {
        PI34 - PI4 * (b + aabs) / (aabs - b)
    };
    (if a >= 0 { angle } else { -angle }) as i16
}

/// `out[n] = sqrt(re[n]^2 + im[n]^2)`, saturating to `i16::MAX`.
pub struct AmDemod {
    buffer: Mutex<Buffer<i16>>,
    source: Source<i16>,
}

impl AmDemod {
    pub fn new(queue: std::sync::Arc<crate::queue::Queue>) -> Self {
        AmDemod {
            buffer: Mutex::new(Buffer::new(0)),
            source: Source::new(queue),
        }
    }

    pub fn source(&self) -> &Source<i16> {
        &self.source
    }
}

impl Sink<Complex<i16>> for AmDemod {
    fn process(&self, buf: Buffer<Complex<i16>>, allow_overwrite: bool) -> Result<(), RuntimeError> {
        let out = self.buffer.lock().expect("amdemod lock poisoned");
        if !allow_overwrite && !out.is_unused() {
            log::warn!("AmDemod: output buffer still in use, dropping input");
            return Ok(());
        }
        let samples = buf.to_vec();
        let demodulated: Vec<i16> = samples
            .iter()
            .map(|s| {
                let mag = ((s.re as f64).powi(2) + (s.im as f64).powi(2)).sqrt();
                mag.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
            })
            .collect();
        out.write_values(&demodulated);
        self.source.send(out.head(demodulated.len()), true)?;
        Ok(())
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        if !cfg.has_type() || !cfg.has_buffer_size() {
            return Ok(());
        }
        if cfg.type_id != Type::CS16 {
            return Err(ConfigError::TypeMismatch {
                expected: crate::types::type_name(Type::CS16).to_string(),
                got: crate::types::type_name(cfg.type_id).to_string(),
            });
        }
        *self.buffer.lock().expect("amdemod lock poisoned") = Buffer::new(cfg.buffer_size);
        self.source
            .set_config(Config::new(Type::S16, cfg.sample_rate_hz, cfg.buffer_size, cfg.num_buffers.max(1)))
    }
}

/// `out[n] = (re[n] + im[n]) / 2` — upper side-band demodulation.
pub struct UsbDemod {
    buffer: Mutex<Buffer<i16>>,
    source: Source<i16>,
}

impl UsbDemod {
    pub fn new(queue: std::sync::Arc<crate::queue::Queue>) -> Self {
        UsbDemod {
            buffer: Mutex::new(Buffer::new(0)),
            source: Source::new(queue),
        }
    }

    pub fn source(&self) -> &Source<i16> {
        &self.source
    }
}

impl Sink<Complex<i16>> for UsbDemod {
    fn process(&self, buf: Buffer<Complex<i16>>, allow_overwrite: bool) -> Result<(), RuntimeError> {
        let out = self.buffer.lock().expect("usbdemod lock poisoned");
        if !allow_overwrite && !out.is_unused() {
            log::warn!("UsbDemod: output buffer still in use, dropping input");
            return Ok(());
        }
        let samples = buf.to_vec();
        let demodulated: Vec<i16> = samples
            .iter()
            .map(|s| ((s.re as i32 + s.im as i32) / 2) as i16)
            .collect();
        out.write_values(&demodulated);
        self.source.send(out.head(demodulated.len()), true)?;
        Ok(())
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        if !cfg.has_type() || !cfg.has_buffer_size() {
            return Ok(());
        }
        if cfg.type_id != Type::CS16 {
            return Err(ConfigError::TypeMismatch {
                expected: crate::types::type_name(Type::CS16).to_string(),
                got: crate::types::type_name(cfg.type_id).to_string(),
            });
        }
        *self.buffer.lock().expect("usbdemod lock poisoned") = Buffer::new(cfg.buffer_size);
        self.source
            .set_config(Config::new(Type::S16, cfg.sample_rate_hz, cfg.buffer_size, 1))
    }
}

/// Instantaneous phase difference between consecutive complex samples via
/// `fast_atan2`, scaled to 12-bit angle units. Phase-continuous across
/// `process` calls by retaining the last input sample.
pub struct FmDemod {
    buffer: Mutex<Buffer<i16>>,
    last_value: Mutex<Complex<i16>>,
    source: Source<i16>,
}

impl FmDemod {
    pub fn new(queue: std::sync::Arc<crate::queue::Queue>) -> Self {
        FmDemod {
            buffer: Mutex::new(Buffer::new(0)),
            last_value: Mutex::new(Complex::default()),
            source: Source::new(queue),
        }
    }

    pub fn source(&self) -> &Source<i16> {
        &self.source
    }

    fn demodulate(&self, samples: &[Complex<i16>]) -> Vec<i16> {
        let mut last = *self.last_value.lock().expect("fmdemod lock poisoned");
        let mut out = Vec::with_capacity(samples.len());
        for &s in samples {
            let a = ((s.re as i32 * last.re as i32) / 2 + (s.im as i32 * last.im as i32) / 2) >> 16;
            let b = ((s.im as i32 * last.re as i32) / 2 - (s.re as i32 * last.im as i32) / 2) >> 16;
            last = s;
            out.push(fast_atan2(a, b));
        }
        *self.last_value.lock().expect("fmdemod lock poisoned") = last;
        out
    }
}

impl Sink<Complex<i16>> for FmDemod {
    fn process(&self, buf: Buffer<Complex<i16>>, allow_overwrite: bool) -> Result<(), RuntimeError> {
        if buf.is_empty() {
            return Ok(());
        }
        let samples = buf.to_vec();

        // In-place is valid iff sizeof(complex input) >= sizeof(output),
        // which holds for cs16 -> s16 (4 bytes -> 2 bytes).
        if allow_overwrite {
            let demodulated = self.demodulate(&samples);
            let out: Buffer<i16> = buf.as_type();
            out.write_values(&demodulated);
            self.source.send(out.head(demodulated.len()), true)?;
            return Ok(());
        }

        let out = self.buffer.lock().expect("fmdemod lock poisoned");
        if !out.is_unused() {
            log::warn!("FmDemod: output buffer still in use, dropping input");
            return Ok(());
        }
        let demodulated = self.demodulate(&samples);
        out.write_values(&demodulated);
        self.source.send(out.head(demodulated.len()), true)?;
        Ok(())
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        if !cfg.has_type() || !cfg.has_buffer_size() {
            return Ok(());
        }
        if cfg.type_id != Type::CS16 {
            return Err(ConfigError::TypeMismatch {
                expected: crate::types::type_name(Type::CS16).to_string(),
                got: crate::types::type_name(cfg.type_id).to_string(),
            });
        }
        *self.buffer.lock().expect("fmdemod lock poisoned") = Buffer::new(cfg.buffer_size);
        *self.last_value.lock().expect("fmdemod lock poisoned") = Complex::default();
        self.source
            .set_config(Config::new(Type::S16, cfg.sample_rate_hz, cfg.buffer_size, 1))
    }
}

/// Single-pole de-emphasis IIR, time constant 75 microseconds. A disabled
/// node is a pure passthrough.
pub struct FmDeemph {
    enabled: std::sync::atomic::AtomicBool,
    alpha: Mutex<i32>,
    avg: Mutex<i16>,
    buffer: Mutex<Buffer<i16>>,
    source: Source<i16>,
}

impl FmDeemph {
    pub fn new(queue: std::sync::Arc<crate::queue::Queue>, enabled: bool) -> Self {
        FmDeemph {
            enabled: std::sync::atomic::AtomicBool::new(enabled),
            alpha: Mutex::new(0),
            avg: Mutex::new(0),
            buffer: Mutex::new(Buffer::new(0)),
            source: Source::new(queue),
        }
    }

    pub fn source(&self) -> &Source<i16> {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn enable(&self, enabled: bool) {
        self.enabled.store(enabled, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Sink<i16> for FmDeemph {
    fn process(&self, buf: Buffer<i16>, allow_overwrite: bool) -> Result<(), RuntimeError> {
        if !self.is_enabled() {
            self.source.send(buf, allow_overwrite)?;
            return Ok(());
        }

        let samples = buf.to_vec();
        let mut alpha = *self.alpha.lock().expect("deemph lock poisoned");
        if alpha == 0 {
            alpha = 1;
        }
        let mut avg = *self.avg.lock().expect("deemph lock poisoned");
        let mut filtered = Vec::with_capacity(samples.len());
        for s in samples {
            let diff = s as i32 - avg as i32;
            if diff > 0 {
                avg = (avg as i32 + (diff + alpha / 2) / alpha) as i16;
            } else {
                avg = (avg as i32 + (diff - alpha / 2) / alpha) as i16;
            }
            filtered.push(avg);
        }
        *self.avg.lock().expect("deemph lock poisoned") = avg;

        if allow_overwrite {
            buf.write_values(&filtered);
            self.source.send(buf, true)?;
        } else {
            let out = self.buffer.lock().expect("deemph lock poisoned");
            out.write_values(&filtered);
            self.source.send(out.head(filtered.len()), false)?;
        }
        Ok(())
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        if !cfg.has_type() || !cfg.has_sample_rate() || !cfg.has_buffer_size() {
            return Ok(());
        }
        if cfg.type_id != Type::S16 {
            return Err(ConfigError::TypeMismatch {
                expected: crate::types::type_name(Type::S16).to_string(),
                got: crate::types::type_name(cfg.type_id).to_string(),
            });
        }
        let alpha = (1.0 / (1.0 - (-1.0 / (cfg.sample_rate_hz * 75e-6)).exp())).round() as i32;
        *self.alpha.lock().expect("deemph lock poisoned") = alpha;
        *self.avg.lock().expect("deemph lock poisoned") = 0;
        *self.buffer.lock().expect("deemph lock poisoned") = Buffer::new(cfg.buffer_size);
        self.source
            .set_config(Config::new(cfg.type_id, cfg.sample_rate_hz, cfg.buffer_size, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_atan2_zero_is_zero() {
        assert_eq!(fast_atan2(0, 0), 0);
    }

    #[test]
    fn fm_on_constant_tone_has_stable_mean() {
        // Scenario S6.
        let queue = crate::queue::Queue::new();
        let demod = FmDemod::new(queue);
        demod.config(Config::new(Type::CS16, 48000.0, 1024, 1)).unwrap();

        let n = 1024usize;
        let freq_frac = 0.1;
        let amplitude = 16384.0;
        let samples: Vec<Complex<i16>> = (0..n)
            .map(|k| {
                let phase = 2.0 * std::f64::consts::PI * freq_frac * k as f64;
                Complex::new(
                    (amplitude * phase.cos()).round() as i16,
                    (amplitude * phase.sin()).round() as i16,
                )
            })
            .collect();
        let buf = Buffer::from_values(&samples);
        demod.process(buf, false).unwrap();

        // First sample depends on the zero-valued "last" state; the steady
        // tail should cluster tightly around the expected 12-bit angle.
        let expected = (freq_frac * 2.0 * std::f64::consts::PI / std::f64::consts::PI) * 4096.0;
        let out = demod.buffer.lock().unwrap();
        let values = out.to_vec();
        let tail = &values[values.len() - 100..];
        let mean: f64 = tail.iter().map(|&v| v as f64).sum::<f64>() / tail.len() as f64;
        assert!((mean - expected).abs() < 50.0, "mean={mean} expected={expected}");
    }

    #[test]
    fn deemph_disabled_is_passthrough() {
        let queue = crate::queue::Queue::new();
        let deemph = FmDeemph::new(queue, false);
        deemph.config(Config::new(Type::S16, 48000.0, 4, 1)).unwrap();
        let buf = Buffer::from_values(&[1i16, 2, 3, 4]);
        deemph.process(buf, true).unwrap();
    }
}
