//! App-level pipeline configuration persistence, grounded on the teacher's
//! `config.rs` (`AppConfig`/`OnsetDetectionConfig`/... and its
//! `load_from_file` fallback-to-defaults-with-a-logged-warning pattern).
//!
//! Distinct from [`crate::config::Config`]: that type is the wire-level
//! protocol value a `Source` propagates to its sinks at connect/reconfigure
//! time; `PipelineConfig` is what a user edits on disk to describe how to
//! wire up and parameterise a graph before it is ever run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::dsp::bitstream::Mode as BitstreamRuntimeMode;

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub baseband: BasebandConfig,
    pub demod: DemodConfig,
    pub bitstream: BitstreamConfig,
    pub ask: AskConfig,
    pub buffers: BufferConfig,
}

/// `IqBaseBand` node parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasebandConfig {
    /// Center frequency to shift to DC, in Hz.
    pub center_frequency_hz: f64,
    /// Frequency offset of the shift itself; usually equal to `center_frequency_hz`.
    pub shift_frequency_hz: f64,
    /// Band-pass width of the FIR kernel, in Hz.
    pub filter_width_hz: f64,
    /// FIR kernel order (tap count).
    pub filter_order: usize,
    /// Integer decimation factor. Ignored when `output_rate_hz` is set.
    pub sub_sample: usize,
    /// Desired output sample rate; when > 0, `sub_sample` is derived at
    /// configure time instead of used directly (spec §4.H).
    pub output_rate_hz: f64,
}

impl Default for BasebandConfig {
    fn default() -> Self {
        BasebandConfig {
            center_frequency_hz: 0.0,
            shift_frequency_hz: 0.0,
            filter_width_hz: 12_500.0,
            filter_order: 64,
            sub_sample: 1,
            output_rate_hz: 0.0,
        }
    }
}

/// Which demodulator the graph wires after the baseband stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemodKind {
    Am,
    Usb,
    Fm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemodConfig {
    pub kind: DemodKind,
    /// Only meaningful when `kind == Fm`; wires an `FmDeemph` after `FmDemod`.
    pub fm_deemphasis: bool,
}

impl Default for DemodConfig {
    fn default() -> Self {
        DemodConfig {
            kind: DemodKind::Fm,
            fm_deemphasis: true,
        }
    }
}

/// Serde-friendly mirror of [`crate::dsp::bitstream::Mode`] (that enum has
/// no serde derive of its own — it belongs to the DSP layer, not the
/// configuration layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitstreamMode {
    Normal,
    Transition,
}

impl BitstreamMode {
    pub fn to_runtime(self) -> BitstreamRuntimeMode {
        match self {
            BitstreamMode::Normal => BitstreamRuntimeMode::Normal,
            BitstreamMode::Transition => BitstreamRuntimeMode::Transition,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitstreamConfig {
    pub baud: f64,
    pub mode: BitstreamMode,
}

impl Default for BitstreamConfig {
    fn default() -> Self {
        BitstreamConfig {
            baud: 1200.0,
            mode: BitstreamMode::Normal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskConfig {
    pub invert: bool,
}

impl Default for AskConfig {
    fn default() -> Self {
        AskConfig { invert: false }
    }
}

/// Buffer pool sizing (spec §4.B `BufferSet`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    pub buffer_pool_size: usize,
    pub buffer_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            buffer_pool_size: 64,
            buffer_size: 2048,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            baseband: BasebandConfig::default(),
            demod: DemodConfig::default(),
            bitstream: BitstreamConfig::default(),
            ask: AskConfig::default(),
            buffers: BufferConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads from a JSON file, falling back to defaults (with a logged
    /// warning) if the file is missing or malformed — never a hard error,
    /// since a missing config file is the common case on first run.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("loaded pipeline config from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "failed to parse pipeline config {:?}: {err}. Using defaults.",
                        path.as_ref()
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "failed to read pipeline config {:?}: {err}. Using defaults.",
                    path.as_ref()
                );
                Self::default()
            }
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .expect("PipelineConfig serialization is infallible");
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.baseband.filter_width_hz, 12_500.0);
        assert_eq!(config.baseband.filter_order, 64);
        assert_eq!(config.demod.kind, DemodKind::Fm);
        assert!(config.demod.fm_deemphasis);
        assert_eq!(config.bitstream.baud, 1200.0);
        assert_eq!(config.buffers.buffer_size, 2048);
    }

    #[test]
    fn json_roundtrip_preserves_values() {
        let mut config = PipelineConfig::default();
        config.baseband.center_frequency_hz = 100_000.0;
        config.demod.kind = DemodKind::Usb;
        config.bitstream.mode = BitstreamMode::Transition;

        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.baseband.center_frequency_hz, 100_000.0);
        assert_eq!(parsed.demod.kind, DemodKind::Usb);
        assert_eq!(parsed.bitstream.mode, BitstreamMode::Transition);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = PipelineConfig::load_from_file("/nonexistent/path/to/config.json");
        assert_eq!(config.baseband.filter_order, BasebandConfig::default().filter_order);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not valid json").unwrap();
        let config = PipelineConfig::load_from_file(&path);
        assert_eq!(config.bitstream.baud, BitstreamConfig::default().baud);
    }
}
