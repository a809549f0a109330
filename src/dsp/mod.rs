//! DSP nodes: the I/Q baseband stage, FM demodulator, and their
//! supporting/companion building blocks.

pub mod ask;
pub mod autocast;
pub mod baseband;
pub mod bitstream;
pub mod combine;
pub mod demod;
#[cfg(feature = "fft")]
pub mod fft;
pub mod freqshift;

pub use ask::AskDetector;
pub use autocast::AutoCast;
pub use baseband::IqBaseBand;
pub use bitstream::BitStream;
pub use combine::{CombineSink, Interleave};
pub use demod::{AmDemod, FmDeemph, FmDemod, UsbDemod};
#[cfg(feature = "fft")]
pub use fft::FftSpectrum;
pub use freqshift::FreqShiftBase;
