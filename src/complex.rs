//! A minimal complex number type for integer and floating-point scalars.
//!
//! `std::complex` isn't in the standard library and pulling in `num-complex`
//! wasn't warranted for the handful of operations the DSP kernels need
//! (add, sub, conjugate multiply, scale), so this is hand-rolled — same
//! call as the core buffer/refcount machinery, kept dependency-free because
//! the operations are this small.

use std::ops::{Add, Mul, Neg, Shr, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Complex { re, im }
    }
}

impl<T: Copy + Neg<Output = T>> Complex<T> {
    pub fn conj(self) -> Self {
        Complex {
            re: self.re,
            im: -self.im,
        }
    }
}

impl<T: Copy + Add<Output = T>> Add for Complex<T> {
    type Output = Complex<T>;
    fn add(self, rhs: Self) -> Self {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl<T: Copy + Sub<Output = T>> Sub for Complex<T> {
    type Output = Complex<T>;
    fn sub(self, rhs: Self) -> Self {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl<T: Copy + Add<Output = T> + Sub<Output = T> + Mul<Output = T>> Mul for Complex<T> {
    type Output = Complex<T>;
    fn mul(self, rhs: Self) -> Self {
        Complex::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl<T: Copy + Shr<u32, Output = T>> Complex<T> {
    pub fn shr(self, bits: u32) -> Self {
        Complex::new(self.re >> bits, self.im >> bits)
    }
}

impl Complex<f64> {
    pub fn from_polar(magnitude: f64, phase: f64) -> Self {
        Complex::new(magnitude * phase.cos(), magnitude * phase.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjugate_multiply() {
        let a = Complex::new(3i64, 4i64);
        let b = a.conj();
        let prod = a * b;
        // a * conj(a) == |a|^2 + 0i
        assert_eq!(prod, Complex::new(25, 0));
    }
}
