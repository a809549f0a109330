//! The per-node configuration protocol value.

use crate::types::Type;

/// Immutable configuration tuple propagated from sources to sinks.
///
/// Every field is optional: zero/`Type::Undefined` means "not yet known".
/// This is deliberately distinct from the app-level `PipelineConfig` in
/// `config_file` — this type is the wire-level protocol value flowing
/// through the graph at connect/reconfigure time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub type_id: Type,
    pub sample_rate_hz: f64,
    pub buffer_size: usize,
    pub num_buffers: usize,
}

impl Config {
    pub const UNDEFINED: Config = Config {
        type_id: Type::Undefined,
        sample_rate_hz: 0.0,
        buffer_size: 0,
        num_buffers: 0,
    };

    pub fn new(type_id: Type, sample_rate_hz: f64, buffer_size: usize, num_buffers: usize) -> Self {
        Config {
            type_id,
            sample_rate_hz,
            buffer_size,
            num_buffers,
        }
    }

    pub fn has_type(&self) -> bool {
        self.type_id.is_defined()
    }

    pub fn has_sample_rate(&self) -> bool {
        self.sample_rate_hz > 0.0
    }

    pub fn has_buffer_size(&self) -> bool {
        self.buffer_size > 0
    }

    pub fn has_num_buffers(&self) -> bool {
        self.num_buffers > 0
    }

    /// Returns a copy with `type_id` replaced, leaving other fields as-is.
    pub fn with_type(mut self, type_id: Type) -> Self {
        self.type_id = type_id;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate_hz: f64) -> Self {
        self.sample_rate_hz = sample_rate_hz;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::UNDEFINED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_has_nothing_set() {
        let c = Config::UNDEFINED;
        assert!(!c.has_type());
        assert!(!c.has_sample_rate());
        assert!(!c.has_buffer_size());
        assert!(!c.has_num_buffers());
    }

    #[test]
    fn equality_is_componentwise() {
        let a = Config::new(Type::S16, 48000.0, 1024, 4);
        let b = Config::new(Type::S16, 48000.0, 1024, 4);
        let c = Config::new(Type::S16, 44100.0, 1024, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn builder_methods_compose() {
        let c = Config::UNDEFINED
            .with_type(Type::CS16)
            .with_sample_rate(96000.0)
            .with_buffer_size(2048);
        assert!(c.has_type());
        assert!(c.has_sample_rate());
        assert!(c.has_buffer_size());
        assert!(!c.has_num_buffers());
    }
}
