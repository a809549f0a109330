//! `Buffer<T>` — a `RawBuffer` reinterpreted as an array of `T`.

use crate::buffer::raw::RawBuffer;
use crate::complex::Complex;

/// A scalar that can be packed to/from a fixed-width native-endian byte
/// representation. Implemented for every numeric type the pipeline moves
/// and for `Complex<T>` of each.
pub trait Sample: Copy + Default {
    const SIZE: usize;
    fn from_bytes(bytes: &[u8]) -> Self;
    fn to_bytes(self, out: &mut [u8]);
}

macro_rules! impl_sample_primitive {
    ($t:ty) => {
        impl Sample for $t {
            const SIZE: usize = std::mem::size_of::<$t>();
            fn from_bytes(bytes: &[u8]) -> Self {
                let mut arr = [0u8; std::mem::size_of::<$t>()];
                arr.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_ne_bytes(arr)
            }
            fn to_bytes(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

impl_sample_primitive!(u8);
impl_sample_primitive!(i8);
impl_sample_primitive!(u16);
impl_sample_primitive!(i16);
impl_sample_primitive!(u32);
impl_sample_primitive!(i32);
impl_sample_primitive!(f32);
impl_sample_primitive!(f64);

impl<T: Sample> Sample for Complex<T> {
    const SIZE: usize = 2 * T::SIZE;

    fn from_bytes(bytes: &[u8]) -> Self {
        Complex::new(T::from_bytes(&bytes[..T::SIZE]), T::from_bytes(&bytes[T::SIZE..]))
    }

    fn to_bytes(self, out: &mut [u8]) {
        self.re.to_bytes(&mut out[..T::SIZE]);
        self.im.to_bytes(&mut out[T::SIZE..]);
    }
}

/// A typed view over a `RawBuffer`. Two `Buffer<T>`s may reinterpret the
/// same underlying storage with different `T` (`as_type`) — used to view
/// an interleaved I/Q integer stream as a complex stream and back.
#[derive(Clone)]
pub struct Buffer<T> {
    raw: RawBuffer,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Sample> Buffer<T> {
    /// Allocates a new buffer of `n` elements, zero-initialised.
    pub fn new(n: usize) -> Self {
        Buffer {
            raw: RawBuffer::new(n * T::SIZE),
            _marker: std::marker::PhantomData,
        }
    }

    /// Allocates and fills from `values`.
    pub fn from_values(values: &[T]) -> Self {
        let buf = Buffer::new(values.len());
        buf.write_values(values);
        buf
    }

    /// Reinterprets an existing `RawBuffer` as `Buffer<T>`; length becomes
    /// `byte_length / size_of::<T>()`.
    pub fn from_raw(raw: RawBuffer) -> Self {
        Buffer {
            raw,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn into_raw(self) -> RawBuffer {
        self.raw
    }

    pub fn raw(&self) -> &RawBuffer {
        &self.raw
    }

    pub fn len(&self) -> usize {
        if T::SIZE == 0 {
            0
        } else {
            self.raw.len() / T::SIZE
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_unused(&self) -> bool {
        self.raw.is_unused()
    }

    pub fn get(&self, index: usize) -> T {
        self.raw.with_bytes(|bytes| {
            let start = index * T::SIZE;
            T::from_bytes(&bytes[start..start + T::SIZE])
        })
    }

    pub fn set(&self, index: usize, value: T) {
        self.raw.with_bytes_mut(|bytes| {
            let start = index * T::SIZE;
            value.to_bytes(&mut bytes[start..start + T::SIZE]);
        });
    }

    /// Decodes every element; convenient for whole-buffer DSP kernels that
    /// read the full contents once per call rather than locking per sample.
    pub fn to_vec(&self) -> Vec<T> {
        self.raw.with_bytes(|bytes| {
            bytes.chunks_exact(T::SIZE).map(T::from_bytes).collect()
        })
    }

    /// Encodes `values` into this buffer's storage, starting at element 0.
    /// Panics if `values.len() > self.len()`.
    pub fn write_values(&self, values: &[T]) {
        assert!(values.len() <= self.len());
        self.raw.with_bytes_mut(|bytes| {
            for (chunk, v) in bytes.chunks_exact_mut(T::SIZE).zip(values) {
                v.to_bytes(chunk);
            }
        });
    }

    /// A subview sharing storage; see `RawBuffer::sub`.
    pub fn sub(&self, offset: usize, len: usize) -> Buffer<T> {
        Buffer::from_raw(self.raw.sub(offset * T::SIZE, len * T::SIZE))
    }

    pub fn head(&self, n: usize) -> Buffer<T> {
        self.sub(0, n.min(self.len()))
    }

    pub fn tail(&self, n: usize) -> Buffer<T> {
        let n = n.min(self.len());
        self.sub(self.len() - n, n)
    }

    /// Reinterprets this buffer's storage as a different element type.
    pub fn as_type<U: Sample>(&self) -> Buffer<U> {
        Buffer::from_raw(self.raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_values() {
        let buf = Buffer::<i16>::from_values(&[1, -2, 3]);
        assert_eq!(buf.to_vec(), vec![1, -2, 3]);
        assert_eq!(buf.get(1), -2);
    }

    #[test]
    fn sub_of_sub_equals_direct_sub() {
        let buf = Buffer::<i16>::from_values(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let lhs = buf.sub(0, 5).sub(0, 2);
        let rhs = buf.sub(0, 2);
        assert_eq!(lhs.to_vec(), rhs.to_vec());
    }

    #[test]
    fn reinterpret_cast_length() {
        // Invariant 3: byte length L reinterpreted as Buffer<B> has L/sizeof(B).
        let buf = Buffer::<i16>::new(8); // 16 bytes
        let reinterpreted: Buffer<Complex<i16>> = buf.as_type();
        assert_eq!(reinterpreted.len(), 4);
    }

    #[test]
    fn complex_round_trip() {
        let buf = Buffer::<Complex<i16>>::from_values(&[Complex::new(1, 2), Complex::new(-3, 4)]);
        assert_eq!(buf.get(0), Complex::new(1, 2));
        assert_eq!(buf.get(1), Complex::new(-3, 4));
    }
}
