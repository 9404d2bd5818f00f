//! Source: an emitter owning a buffer queue and spatial, filtering, and
//! send-routing properties.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::biquad::{BiquadCoefs, FilterKind};
use crate::buffer::{Buffer, QueueEntry};
use crate::panner::DistanceModel;
use crate::resampler::ResamplerKind;

pub const NSENDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Direct-path or send-path filter: gain plus a two-band (HF/LF) shelf
/// description, matching OpenAL's `AL_DIRECT_FILTER`/`AL_*_SEND_FILTER`
/// parameter set.
#[derive(Debug, Clone, Copy)]
pub struct PathFilter {
    pub gain: f32,
    pub gain_hf: f32,
    pub hf_reference: f32,
    pub gain_lf: f32,
    pub lf_reference: f32,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            gain: 1.0,
            gain_hf: 1.0,
            hf_reference: 5000.0,
            gain_lf: 1.0,
            lf_reference: 250.0,
        }
    }
}

impl PathFilter {
    /// Derive the low-shelf and high-shelf biquad coefficients this filter
    /// implies, at the given sample rate.
    pub fn to_biquads(&self, sample_rate: f32) -> (BiquadCoefs, BiquadCoefs) {
        let lf = (self.lf_reference / sample_rate).clamp(1.0e-4, 0.49);
        let hf = (self.hf_reference / sample_rate).clamp(1.0e-4, 0.49);
        let low_shelf = BiquadCoefs::set_params(
            FilterKind::LowShelf,
            self.gain_lf,
            lf,
            BiquadCoefs::rcp_q_from_slope(self.gain_lf, 1.0),
        );
        let high_shelf = BiquadCoefs::set_params(
            FilterKind::HighShelf,
            self.gain_hf,
            hf,
            BiquadCoefs::rcp_q_from_slope(self.gain_hf, 1.0),
        );
        (low_shelf, high_shelf)
    }
}

/// One auxiliary send: target effect slot plus its own filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendRoute {
    pub target_slot: Option<u32>,
    pub filter: PathFilter,
}

bitflags_lite::bitflags! {
    pub struct SourceFlags: u8 {
        const RELATIVE_TO_LISTENER = 1 << 0;
        const LOOPING = 1 << 1;
        const DIRECT_CHANNELS = 1 << 2;
        const SPATIALIZE = 1 << 3;
    }
}

/// Source properties, published via [`crate::handover::Handover`].
#[derive(Debug, Clone)]
pub struct SourceProps {
    pub pitch: f32,
    pub gain: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub direction: [f32; 3],
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,
    pub cone_outer_gain: f32,
    /// Angular spread of the source's emission, radians: widens the
    /// spherical-harmonic order weighting on the speaker path and blends
    /// toward a diffuse response on the HRTF path.
    pub spread: f32,
    pub reference_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
    pub direct_filter: PathFilter,
    pub sends: [SendRoute; NSENDS],
    pub flags: SourceFlags,
    pub resampler: ResamplerKind,
    pub distance_model_override: Option<DistanceModel>,
}

impl Default for SourceProps {
    fn default() -> Self {
        Self {
            pitch: 1.0,
            gain: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            position: [0.0, 0.0, 0.0],
            velocity: [0.0, 0.0, 0.0],
            direction: [0.0, 0.0, 0.0],
            inner_cone_angle: std::f32::consts::TAU,
            outer_cone_angle: std::f32::consts::TAU,
            cone_outer_gain: 0.0,
            spread: 0.0,
            reference_distance: 1.0,
            max_distance: f32::MAX,
            rolloff_factor: 1.0,
            direct_filter: PathFilter::default(),
            sends: [SendRoute::default(); NSENDS],
            flags: SourceFlags::SPATIALIZE,
            resampler: ResamplerKind::Cubic,
            distance_model_override: None,
        }
    }
}

/// The API-thread-owned source object: identity, playback state, and
/// buffer queue. Mixer-side counterpart is [`crate::voice::Voice`].
pub struct Source {
    pub id: u32,
    pub state: SourceState,
    pub queue: VecDeque<QueueEntry>,
    pub generation: u64,
    /// Sample-accurate offset into the currently-playing buffer: integer
    /// frame index plus sub-sample fraction (FRACTIONONE units).
    pub offset_frames: usize,
    pub offset_frac: u32,
}

impl Source {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: SourceState::Initial,
            queue: VecDeque::new(),
            generation: 0,
            offset_frames: 0,
            offset_frac: 0,
        }
    }

    pub fn queue_buffer(&mut self, buffer: Arc<Buffer>) {
        self.queue.push_back(QueueEntry { buffer });
    }

    /// Remove every queued buffer not currently being read, per OpenAL's
    /// "unqueue processed buffers" semantics (leaves the actively-playing
    /// entry, if any, untouched).
    pub fn unqueue_processed(&mut self, processed_count: usize) -> Vec<QueueEntry> {
        let mut out = Vec::with_capacity(processed_count);
        for _ in 0..processed_count.min(self.queue.len()) {
            if let Some(entry) = self.queue.pop_front() {
                out.push(entry);
            }
        }
        out
    }
}

mod bitflags_lite {
    //! Minimal `bitflags!`-shaped macro, used instead of pulling in the
    //! `bitflags` crate for a single four-flag set.
    macro_rules! bitflags {
        (
            pub struct $name:ident: $ty:ty {
                $(const $flag:ident = $value:expr;)*
            }
        ) => {
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
            pub struct $name($ty);

            impl $name {
                $(pub const $flag: $name = $name($value);)*

                pub const fn empty() -> Self {
                    $name(0)
                }

                #[inline]
                pub const fn contains(self, other: $name) -> bool {
                    (self.0 & other.0) == other.0
                }

                #[inline]
                pub fn insert(&mut self, other: $name) {
                    self.0 |= other.0;
                }

                #[inline]
                pub fn remove(&mut self, other: $name) {
                    self.0 &= !other.0;
                }

                #[inline]
                pub fn set(&mut self, other: $name, value: bool) {
                    if value {
                        self.insert(other);
                    } else {
                        self.remove(other);
                    }
                }
            }

            impl std::ops::BitOr for $name {
                type Output = $name;
                fn bitor(self, rhs: $name) -> $name {
                    $name(self.0 | rhs.0)
                }
            }
        };
    }
    pub(crate) use bitflags;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_roundtrip() {
        let mut f = SourceFlags::empty();
        assert!(!f.contains(SourceFlags::LOOPING));
        f.insert(SourceFlags::LOOPING);
        assert!(f.contains(SourceFlags::LOOPING));
        f.remove(SourceFlags::LOOPING);
        assert!(!f.contains(SourceFlags::LOOPING));
    }

    #[test]
    fn unqueue_processed_respects_queue_length() {
        let mut source = Source::new(1);
        let buf = Buffer::new(crate::buffer::BufferChannels::Mono, 44100, vec![vec![0.0; 10]]);
        source.queue_buffer(buf.clone());
        source.queue_buffer(buf);
        let removed = source.unqueue_processed(5);
        assert_eq!(removed.len(), 2);
        assert!(source.queue.is_empty());
    }
}
