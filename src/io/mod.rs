//! File-format collaborators at the pipeline boundary (spec.md §6).

pub mod wav;

pub use wav::{WavFormat, WavReader, WavWriter};
