//! Numeric type identifiers and their fixed-point traits.

use std::fmt;

/// Runtime type tag carried by every `Config` and associated with every
/// typed `Sink`/`Source` at instantiation. Numeric values match the
/// wire/diagnostic codes in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Undefined = 0,
    U8 = 1,
    S8 = 2,
    U16 = 3,
    S16 = 4,
    F32 = 5,
    F64 = 6,
    CU8 = 7,
    CS8 = 8,
    CU16 = 9,
    CS16 = 10,
    CF32 = 11,
    CF64 = 12,
}

impl Type {
    pub fn is_complex(self) -> bool {
        matches!(
            self,
            Type::CU8 | Type::CS8 | Type::CU16 | Type::CS16 | Type::CF32 | Type::CF64
        )
    }

    pub fn is_defined(self) -> bool {
        !matches!(self, Type::Undefined)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Undefined => "undefined",
            Type::U8 => "u8",
            Type::S8 => "s8",
            Type::U16 => "u16",
            Type::S16 => "s16",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::CU8 => "cu8",
            Type::CS8 => "cs8",
            Type::CU16 => "cu16",
            Type::CS16 => "cs16",
            Type::CF32 => "cf32",
            Type::CF64 => "cf64",
        };
        f.write_str(name)
    }
}

/// Static per-scalar fixed-point traits: scale factor, shift exponent such
/// that `scale == 1 << shift` where applicable, the matching `Type` tag, and
/// the wider "super-scalar" accumulator type used for overflow-free DSP
/// math (see `original_source/src/traits.hh`/`traits.cc`).
pub trait TypeTraits: Copy + Default {
    /// Wider accumulator type paired with this scalar.
    type SScalar: Copy
        + Default
        + std::ops::Add<Output = Self::SScalar>
        + std::ops::Sub<Output = Self::SScalar>
        + std::ops::Mul<Output = Self::SScalar>
        + std::ops::Shr<u32, Output = Self::SScalar>
        + std::ops::Shl<u32, Output = Self::SScalar>
        + Into<i64>
        + From<i32>;

    const SCALE: f64;
    const SHIFT: u32;
    const TYPE_ID: Type;
}

impl TypeTraits for u8 {
    type SScalar = i16;
    const SCALE: f64 = 127.0;
    const SHIFT: u32 = 8;
    const TYPE_ID: Type = Type::U8;
}

impl TypeTraits for i8 {
    type SScalar = i16;
    const SCALE: f64 = 127.0;
    const SHIFT: u32 = 8;
    const TYPE_ID: Type = Type::S8;
}

impl TypeTraits for u16 {
    type SScalar = i32;
    const SCALE: f64 = 32767.0;
    const SHIFT: u32 = 16;
    const TYPE_ID: Type = Type::U16;
}

impl TypeTraits for i16 {
    type SScalar = i32;
    const SCALE: f64 = 32767.0;
    const SHIFT: u32 = 16;
    const TYPE_ID: Type = Type::S16;
}

impl TypeTraits for f32 {
    type SScalar = i32;
    const SCALE: f64 = 1.0;
    const SHIFT: u32 = 0;
    const TYPE_ID: Type = Type::F32;
}

impl TypeTraits for f64 {
    type SScalar = i64;
    const SCALE: f64 = 1.0;
    const SHIFT: u32 = 0;
    const TYPE_ID: Type = Type::F64;
}

/// Returns the human-readable name for a `Type`, used in logs and
/// cross-node diagnostics (spec §6).
pub fn type_name(t: Type) -> &'static str {
    match t {
        Type::Undefined => "undefined",
        Type::U8 => "u8",
        Type::S8 => "s8",
        Type::U16 => "u16",
        Type::S16 => "s16",
        Type::F32 => "f32",
        Type::F64 => "f64",
        Type::CU8 => "cu8",
        Type::CS8 => "cs8",
        Type::CU16 => "cu16",
        Type::CS16 => "cs16",
        Type::CF32 => "cf32",
        Type::CF64 => "cf64",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_table_matches_spec() {
        assert_eq!(u8::SCALE, 127.0);
        assert_eq!(u8::SHIFT, 8);
        assert_eq!(i16::SCALE, 32767.0);
        assert_eq!(i16::SHIFT, 16);
        assert_eq!(f32::SCALE, 1.0);
        assert_eq!(f32::SHIFT, 0);
    }

    #[test]
    fn complex_classification() {
        assert!(Type::CS16.is_complex());
        assert!(!Type::S16.is_complex());
        assert!(!Type::Undefined.is_defined());
    }

    #[test]
    fn display_matches_type_name() {
        assert_eq!(Type::CS16.to_string(), "cs16");
        assert_eq!(type_name(Type::CS16), "cs16");
    }
}
