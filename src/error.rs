//! Error types for the mixing core: API-boundary validation errors,
//! allocation failure, and device disconnect, with no allocation on the
//! validation-error path.

use thiserror::Error;

/// Error returned at the API boundary. Never observed by the mixer thread:
/// a call that would produce one of these leaves engine state unchanged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid enum value for {0}")]
    InvalidEnum(&'static str),
    #[error("invalid value {value} for parameter {param}")]
    InvalidValue { param: &'static str, value: f64 },
    #[error("invalid name: {0}")]
    InvalidName(&'static str),
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
    #[error("out of memory")]
    OutOfMemory,
    #[error("device disconnected")]
    DeviceDisconnected,
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Error parsing an HRTF dataset file (binary little-endian layout).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HrtfLoadError {
    #[error("truncated dataset: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("bad magic bytes")]
    BadMagic,
    #[error("unsupported elevation count {0} (expected 19)")]
    UnsupportedElevationCount(u8),
    #[error("unsupported HRIR count {0} (expected 828)")]
    UnsupportedHrirCount(u16),
    #[error("unsupported HRIR size {0} (expected 128)")]
    UnsupportedHrirSize(u16),
    #[error("elevation offset table does not match the canonical layout")]
    BadElevationOffsets,
    #[error("delay {0} exceeds the 127-sample maximum")]
    DelayOutOfRange(u8),
}

/// Error parsing the `section/key = value` configuration text format.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("line {line}: expected `section/key = value`, got {text:?}")]
    Malformed { line: usize, text: String },
    #[error("line {line}: key outside any [section]")]
    KeyOutsideSection { line: usize },
    #[error("line {line}: invalid value {value:?} for {key}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

/// Error parsing the ambisonic decoder configuration text format.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecoderConfigError {
    #[error("line {0}: malformed speaker entry")]
    MalformedSpeaker(usize),
    #[error("matrix row {row} has {got} columns, expected {expected}")]
    MatrixShape {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[error("matrix has no rows")]
    EmptyMatrix,
}
