//! Real-time 3D spatial audio mixing core: a pull-driven render graph in
//! the spirit of OpenAL/OpenAL Soft, built from small stateful DSP
//! components (biquad filters, a fractional resampler, ambisonic panning
//! and decode, HRTF convolution, and a handful of send effects) driven by
//! a lock-free parameter handover between API callers and the mixer.
//!
//! The mixer thread never allocates on the hot path and never blocks on
//! a mutex held by an API caller; API callers publish snapshots of
//! listener/source/slot state through [`handover::Handover`] and the
//! mixer picks up the latest snapshot once per render slice.

pub mod ambisonic;
pub mod biquad;
pub mod buffer;
pub mod config;
pub mod device;
pub mod effects;
pub mod error;
pub mod format;
pub mod handover;
pub mod hrtf;
pub mod listener;
pub mod math;
pub mod mixer;
pub mod panner;
pub mod resampler;
pub mod source;
pub mod voice;

pub use device::{Device, RenderMode};
pub use error::{ConfigError, DecoderConfigError, EngineError, EngineResult, HrtfLoadError};
pub use listener::ListenerProps;
pub use mixer::Mixer;
pub use source::{Source, SourceProps};

/// Sample rate assumed when no device config overrides it.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
