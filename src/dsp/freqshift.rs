//! Fixed-point NCO frequency shift (spec §4.G), grounded on
//! `original_source/src/freqshift.hh`.

use crate::complex::Complex;
use crate::types::TypeTraits;

const LUT_SIZE: usize = 128;

/// Multiplies a complex super-scalar sample by `exp(-j*2*pi*F/Fs*n)` using an
/// integer LUT and a fractional phase accumulator. Shared base for
/// `IqBaseBand`; not a `Sink`/`Source` on its own.
pub struct FreqShiftBase<S: TypeTraits> {
    freq_shift: f64,
    sample_rate: f64,
    lut_inc: u64,
    lut_count: u64,
    lut: Vec<Complex<S::SScalar>>,
}

impl<S: TypeTraits> FreqShiftBase<S> {
    pub fn new(freq_shift: f64, sample_rate: f64) -> Self {
        let scale = (1u64 << S::SHIFT) as f64;
        let lut = (0..LUT_SIZE)
            .map(|k| {
                let phase = -(2.0 * std::f64::consts::PI * k as f64) / LUT_SIZE as f64;
                let c = Complex::from_polar(scale, phase);
                Complex::new(S::SScalar::from(c.re.round() as i32), S::SScalar::from(c.im.round() as i32))
            })
            .collect();
        let mut fs = FreqShiftBase {
            freq_shift,
            sample_rate,
            lut_inc: 0,
            lut_count: 0,
            lut,
        };
        fs.update_lut_incr();
        fs
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, fs: f64) {
        self.sample_rate = fs;
        self.update_lut_incr();
    }

    pub fn frequency_shift(&self) -> f64 {
        self.freq_shift
    }

    pub fn set_frequency_shift(&mut self, f: f64) {
        self.freq_shift = f;
        self.update_lut_incr();
    }

    /// Applies the shift to one super-scalar complex sample and advances the
    /// phase accumulator. A no-op (identity) when `lut_inc == 0`.
    pub fn apply(&mut self, value: Complex<S::SScalar>) -> Complex<S::SScalar> {
        if self.lut_inc == 0 {
            return value;
        }
        let mut idx = (self.lut_count >> 8) as usize;
        if self.freq_shift < 0.0 {
            idx = LUT_SIZE - idx - 1;
        }
        let shifted = (self.lut[idx] * value).shr(S::SHIFT);

        self.lut_count += self.lut_inc;
        let modulus = (LUT_SIZE as u64) << 8;
        while self.lut_count >= modulus {
            self.lut_count -= modulus;
        }
        shifted
    }

    fn update_lut_incr(&mut self) {
        self.lut_inc = ((LUT_SIZE as f64) * 256.0 * self.freq_shift.abs() / self.sample_rate) as u64;
        self.lut_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_shift_bypasses_multiplier() {
        let mut shift = FreqShiftBase::<i16>::new(0.0, 48000.0);
        let v = Complex::new(100i32, -50i32);
        assert_eq!(shift.apply(v), v);
    }

    #[test]
    fn nonzero_shift_advances_phase() {
        let mut shift = FreqShiftBase::<i16>::new(1000.0, 48000.0);
        let v = Complex::new(1000i32, 0i32);
        let out1 = shift.apply(v);
        let out2 = shift.apply(v);
        // Different LUT phase at each call implies differing outputs in general.
        assert_ne!(out1, out2);
    }

    #[test]
    fn negative_shift_mirrors_lut_index() {
        let mut pos = FreqShiftBase::<i16>::new(1000.0, 48000.0);
        let mut neg = FreqShiftBase::<i16>::new(-1000.0, 48000.0);
        let v = Complex::new(1000i32, 0i32);
        let a = pos.apply(v);
        let b = neg.apply(v);
        assert_ne!(a, b);
    }
}
