//! On/off-keying (ASK) slicer (SPEC_FULL §4.N), grounded on
//! `original_source/src/fsk.hh`'s `ASKDetector<Scalar>`.

use std::sync::Mutex;

use crate::buffer::typed::Buffer;
use crate::config::Config;
use crate::error::{ConfigError, RuntimeError};
use crate::node::{Sink, Source};
use crate::types::Type;

/// Maps each `i16` input sample to a `u8` 0/1 symbol via a sign test,
/// with optional polarity inversion.
pub struct AskDetector {
    invert: bool,
    buffer: Mutex<Buffer<u8>>,
    source: Source<u8>,
}

impl AskDetector {
    pub fn new(queue: std::sync::Arc<crate::queue::Queue>, invert: bool) -> Self {
        AskDetector {
            invert,
            buffer: Mutex::new(Buffer::new(0)),
            source: Source::new(queue),
        }
    }

    pub fn source(&self) -> &Source<u8> {
        &self.source
    }
}

impl Sink<i16> for AskDetector {
    fn process(&self, buf: Buffer<i16>, _allow_overwrite: bool) -> Result<(), RuntimeError> {
        let out = self.buffer.lock().expect("ask detector lock poisoned");
        let symbols: Vec<u8> = buf
            .to_vec()
            .into_iter()
            .map(|v| ((v > 0) ^ self.invert) as u8)
            .collect();
        out.write_values(&symbols);
        self.source.send(out.head(symbols.len()), false)?;
        Ok(())
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        if !cfg.has_type() || !cfg.has_sample_rate() {
            return Ok(());
        }
        if cfg.type_id != Type::S16 {
            return Err(ConfigError::TypeMismatch {
                expected: crate::types::type_name(Type::S16).to_string(),
                got: crate::types::type_name(cfg.type_id).to_string(),
            });
        }
        *self.buffer.lock().expect("ask detector lock poisoned") = Buffer::new(cfg.buffer_size);
        log::debug!(
            "configured AskDetector: invert={} symbol_rate={} Hz",
            self.invert,
            cfg.sample_rate_hz
        );
        self.source
            .set_config(Config::new(Type::U8, cfg.sample_rate_hz, cfg.buffer_size, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_on_sign() {
        let queue = crate::queue::Queue::new();
        let ask = AskDetector::new(queue, false);
        ask.config(Config::new(Type::S16, 1200.0, 4, 1)).unwrap();
        let buf = Buffer::from_values(&[5i16, -5, 0, 1]);
        ask.process(buf, false).unwrap();
        let out = ask.buffer.lock().unwrap();
        assert_eq!(out.to_vec(), vec![1, 0, 0, 1]);
    }

    #[test]
    fn invert_flips_polarity() {
        let queue = crate::queue::Queue::new();
        let ask = AskDetector::new(queue, true);
        ask.config(Config::new(Type::S16, 1200.0, 4, 1)).unwrap();
        let buf = Buffer::from_values(&[5i16, -5]);
        ask.process(buf, false).unwrap();
        let out = ask.buffer.lock().unwrap();
        assert_eq!(out.to_vec(), vec![0, 1]);
    }

    #[test]
    fn rejects_non_s16_config() {
        let queue = crate::queue::Queue::new();
        let ask = AskDetector::new(queue, false);
        assert!(ask.config(Config::new(Type::U8, 1200.0, 4, 1)).is_err());
    }
}
