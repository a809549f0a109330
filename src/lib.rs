// sdrkit - software-defined-radio signal processing pipeline runtime
// Typed node/source/sink graph, central scheduling queue, I/Q baseband
// stage, FM demodulator.

pub mod blocking;
pub mod buffer;
pub mod complex;
pub mod config;
pub mod config_file;
pub mod dsp;
pub mod error;
pub mod io;
pub mod node;
pub mod proxy;
pub mod queue;
pub mod types;

/// Initializes the process-wide logger. Safe to call more than once; only
/// the first call has any effect.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
