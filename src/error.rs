//! Structured errors for the pipeline runtime.
//!
//! `ConfigError` and `RuntimeError` share a small `ErrorCode` trait so both
//! can be logged and reported uniformly, the same shape the rest of this
//! codebase's ancestry uses for its own domain errors.

use log::error;
use std::fmt;

/// Gives an error type a numeric code alongside its message.
pub trait ErrorCode {
    fn code(&self) -> i32;
    fn message(&self) -> String;
}

/// Reserved error code ranges, see `ErrorCode::code`.
pub struct ConfigErrorCodes;

impl ConfigErrorCodes {
    pub const TYPE_MISMATCH: i32 = 2001;
    pub const UNSUPPORTED_TYPE: i32 = 2002;
    pub const UNSUPPORTED_SAMPLE_RATE: i32 = 2003;
    pub const UNSUPPORTED_BIT_DEPTH: i32 = 2004;
    pub const NO_CAST_AVAILABLE: i32 = 2005;
    pub const INCOMPLETE: i32 = 2006;
}

pub struct RuntimeErrorCodes;

impl RuntimeErrorCodes {
    pub const BUFFER_IN_USE: i32 = 3001;
    pub const INDEX_OUT_OF_RANGE: i32 = 3002;
    pub const UNSUPPORTED_FILE_LAYOUT: i32 = 3003;
    pub const IO_FAILURE: i32 = 3004;
    pub const SINK_PANIC: i32 = 3005;
}

/// Raised synchronously from `config()` when a sink rejects an upstream
/// `Config`; aborts graph assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Upstream type does not match what this node requires.
    TypeMismatch { expected: String, got: String },
    /// This node has no support for the given type at all.
    UnsupportedType { type_name: String },
    /// Sample rate is outside what this node can handle.
    UnsupportedSampleRate { sample_rate_hz: f64 },
    /// Bit depth implied by the type is not supported by a file-format sink.
    UnsupportedBitDepth { bits: u32, channels: u32 },
    /// AutoCast has no conversion function for this (input, output) pair.
    NoCastAvailable { from: String, to: String },
    /// Config is missing required fields (type/sample_rate/buffer_size).
    Incomplete { missing: &'static str },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::TypeMismatch { .. } => ConfigErrorCodes::TYPE_MISMATCH,
            ConfigError::UnsupportedType { .. } => ConfigErrorCodes::UNSUPPORTED_TYPE,
            ConfigError::UnsupportedSampleRate { .. } => {
                ConfigErrorCodes::UNSUPPORTED_SAMPLE_RATE
            }
            ConfigError::UnsupportedBitDepth { .. } => ConfigErrorCodes::UNSUPPORTED_BIT_DEPTH,
            ConfigError::NoCastAvailable { .. } => ConfigErrorCodes::NO_CAST_AVAILABLE,
            ConfigError::Incomplete { .. } => ConfigErrorCodes::INCOMPLETE,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::TypeMismatch { expected, got } => {
                format!("expected type {expected}, got {got}")
            }
            ConfigError::UnsupportedType { type_name } => {
                format!("type {type_name} is not supported by this node")
            }
            ConfigError::UnsupportedSampleRate { sample_rate_hz } => {
                format!("sample rate {sample_rate_hz} Hz is not supported")
            }
            ConfigError::UnsupportedBitDepth { bits, channels } => {
                format!("{bits}-bit / {channels}ch is not a supported PCM layout")
            }
            ConfigError::NoCastAvailable { from, to } => {
                format!("no conversion available from {from} to {to}")
            }
            ConfigError::Incomplete { missing } => {
                format!("config is missing required field: {missing}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for ConfigError {}

/// Raised during a `process` call for malformed input or a resource that
/// could not be acquired (file I/O, out-of-range access in debug builds).
#[derive(Debug)]
pub enum RuntimeError {
    /// Output buffer from a previous send is still in use; caller should
    /// drop the current data rather than block.
    BufferInUse { node: &'static str },
    /// Debug-build bounds check failure.
    IndexOutOfRange { index: usize, len: usize },
    /// A file-format sink/source encountered a layout it cannot parse.
    UnsupportedFileLayout { reason: String },
    /// Wraps an underlying I/O failure.
    Io(std::io::Error),
    /// A direct or queued sink panicked while handling a buffer.
    SinkPanic { reason: String },
}

impl ErrorCode for RuntimeError {
    fn code(&self) -> i32 {
        match self {
            RuntimeError::BufferInUse { .. } => RuntimeErrorCodes::BUFFER_IN_USE,
            RuntimeError::IndexOutOfRange { .. } => RuntimeErrorCodes::INDEX_OUT_OF_RANGE,
            RuntimeError::UnsupportedFileLayout { .. } => {
                RuntimeErrorCodes::UNSUPPORTED_FILE_LAYOUT
            }
            RuntimeError::Io(_) => RuntimeErrorCodes::IO_FAILURE,
            RuntimeError::SinkPanic { .. } => RuntimeErrorCodes::SINK_PANIC,
        }
    }

    fn message(&self) -> String {
        match self {
            RuntimeError::BufferInUse { node } => {
                format!("{node}: output buffer still in use, dropping input")
            }
            RuntimeError::IndexOutOfRange { index, len } => {
                format!("index {index} out of range for length {len}")
            }
            RuntimeError::UnsupportedFileLayout { reason } => reason.clone(),
            RuntimeError::Io(err) => err.to_string(),
            RuntimeError::SinkPanic { reason } => format!("sink panicked: {reason}"),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for RuntimeError {}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::Io(err)
    }
}

/// Logs a `ConfigError` at warn level with a component tag (graph assembly
/// is expected to recover by fixing the graph, not crashing).
pub fn log_config_error(err: &ConfigError, component: &str) {
    log::warn!(
        "config rejected in {component}: code={} message={}",
        err.code(),
        err.message()
    );
}

/// Logs a `RuntimeError` at error level; called by the Queue worker before
/// it stops the session (spec: "a failing sink ends the session rather
/// than crashing the process").
pub fn log_runtime_error(err: &RuntimeError, component: &str) {
    error!(
        "runtime error in {component}: code={} message={}",
        err.code(),
        err.message()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_codes() {
        assert_eq!(
            ConfigError::TypeMismatch {
                expected: "s16".into(),
                got: "u8".into()
            }
            .code(),
            ConfigErrorCodes::TYPE_MISMATCH
        );
        assert_eq!(
            ConfigError::Incomplete { missing: "type" }.code(),
            ConfigErrorCodes::INCOMPLETE
        );
    }

    #[test]
    fn runtime_error_from_io() {
        let io_err = std::io::Error::other("disk full");
        let err: RuntimeError = io_err.into();
        assert_eq!(err.code(), RuntimeErrorCodes::IO_FAILURE);
        assert!(err.message().contains("disk full"));
    }

    #[test]
    fn display_includes_code() {
        let err = ConfigError::UnsupportedSampleRate {
            sample_rate_hz: 44100.0,
        };
        let text = format!("{err}");
        assert!(text.contains("2003"));
    }

    #[test]
    fn logging_does_not_panic() {
        log_config_error(
            &ConfigError::UnsupportedType {
                type_name: "f64".into(),
            },
            "test",
        );
        log_runtime_error(&RuntimeError::BufferInUse { node: "test" }, "test");
    }
}
