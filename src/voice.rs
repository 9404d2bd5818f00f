//! Voice (C6): mixer-side per-source render state and the per-slice
//! processing pipeline. Where `source.rs` is the API-thread-owned
//! description of a source, `Voice` is what the mixer actually steps:
//! resampler cursor, filter history, current/target gains for smooth
//! ramping, and the generation it last observed.

use std::sync::Arc;

use crate::biquad::{BiquadCoefs, BiquadState};
use crate::buffer::Buffer;
use crate::device::Device;
use crate::handover::GenerationCounter;
use crate::hrtf::HrtfVoiceState;
use crate::listener::ListenerProps;
use crate::panner;
use crate::resampler::{ResamplerKind, ResamplerState, FRACTIONONE};
use crate::source::{SourceFlags, SourceProps, NSENDS};

/// History samples kept before the read cursor so interpolating kernels
/// (up to BSinc24) always have enough lookback without special-casing the
/// start of a buffer queue entry.
pub const VOICE_HISTORY: usize = 24;

/// Smoothly ramp a per-channel gain vector over a slice rather than
/// stepping it, avoiding zipper noise on parameter changes.
#[derive(Debug, Clone)]
pub struct GainRamp {
    current: Vec<f32>,
    target: Vec<f32>,
}

impl GainRamp {
    pub fn new(channels: usize) -> Self {
        Self {
            current: vec![0.0; channels],
            target: vec![0.0; channels],
        }
    }

    pub fn set_target(&mut self, target: &[f32]) {
        self.target.clear();
        self.target.extend_from_slice(target);
        if self.current.len() != self.target.len() {
            self.current.resize(self.target.len(), 0.0);
        }
    }

    /// Fill `out[channel][frame]` with the per-frame gain, linearly
    /// interpolating current -> target across the slice and leaving
    /// `current` at `target` once done.
    pub fn ramp_into(&mut self, n_frames: usize, out: &mut [Vec<f32>]) {
        for (ch, (cur, tgt)) in self.current.iter_mut().zip(self.target.iter()).enumerate() {
            let start = *cur;
            let end = *tgt;
            let row = &mut out[ch];
            if n_frames == 0 {
                continue;
            }
            for (i, slot) in row.iter_mut().take(n_frames).enumerate() {
                let t = (i + 1) as f32 / n_frames as f32;
                *slot = crate::math::lerp(start, end, t);
            }
            *cur = end;
        }
    }
}

/// Per-send filter + gain-ramp state.
pub struct SendState {
    pub low_shelf: BiquadCoefs,
    pub high_shelf: BiquadCoefs,
    pub low_state: BiquadState,
    pub high_state: BiquadState,
    pub gains: GainRamp,
}

impl SendState {
    pub fn new(channels: usize) -> Self {
        Self {
            low_shelf: BiquadCoefs::IDENTITY,
            high_shelf: BiquadCoefs::IDENTITY,
            low_state: BiquadState::new(),
            high_state: BiquadState::new(),
            gains: GainRamp::new(channels),
        }
    }
}

/// Per-voice render state, one per active source.
pub struct Voice {
    pub source_id: u32,
    pub buffer: Option<Arc<Buffer>>,
    pub looping: bool,
    /// Per-source-channel replay window, one row per channel of the
    /// currently playing buffer; resized in [`Voice::start`].
    pub history: Vec<Vec<f32>>,
    pub cursor_frame: usize,
    pub cursor_frac: u32,
    pub resampler: ResamplerState,
    pub direct_low: BiquadCoefs,
    pub direct_high: BiquadCoefs,
    pub direct_low_state: BiquadState,
    pub direct_high_state: BiquadState,
    pub direct_gains: GainRamp,
    pub sends: [SendState; NSENDS],
    pub hrtf: Option<HrtfVoiceState>,
    pub last_generation: u64,
    pub done: bool,
}

impl Voice {
    pub fn new(source_id: u32, output_channels: usize) -> Self {
        Self {
            source_id,
            buffer: None,
            looping: false,
            history: Vec::new(),
            cursor_frame: 0,
            cursor_frac: 0,
            resampler: ResamplerState::new(ResamplerKind::Cubic),
            direct_low: BiquadCoefs::IDENTITY,
            direct_high: BiquadCoefs::IDENTITY,
            direct_low_state: BiquadState::new(),
            direct_high_state: BiquadState::new(),
            direct_gains: GainRamp::new(output_channels),
            sends: std::array::from_fn(|_| SendState::new(output_channels)),
            hrtf: None,
            last_generation: 0,
            done: false,
        }
    }

    pub fn start(&mut self, buffer: Arc<Buffer>, looping: bool) {
        let channels = buffer.data.len().max(1);
        self.buffer = Some(buffer);
        self.looping = looping;
        self.cursor_frame = 0;
        self.cursor_frac = 0;
        self.done = false;
        self.history = vec![vec![0.0; VOICE_HISTORY * 2]; channels];
    }

    /// Derive the spatialization gains and filters for this slice from the
    /// current source/listener properties, then advance the playback
    /// cursor and accumulate resampled, filtered samples into the dry and
    /// wet buses. Returns the number of frames actually produced (may be
    /// less than `n_frames` if the buffer queue runs dry and the source
    /// is not looping).
    pub fn process_slice(
        &mut self,
        props: &SourceProps,
        listener: &ListenerProps,
        device: &Device,
        generation_counter: &GenerationCounter,
        dry_bus: &mut [Vec<f32>],
        wet_buses: &mut [Vec<Vec<f32>>],
        n_frames: usize,
    ) -> usize {
        let Some(buffer) = self.buffer.clone() else {
            return 0;
        };
        if buffer.data.is_empty() {
            return 0;
        }

        self.last_generation = generation_counter.current();

        let direct_channels = props.flags.contains(SourceFlags::DIRECT_CHANNELS);
        let spatialize = props.flags.contains(SourceFlags::SPATIALIZE) && !direct_channels;
        let binaural = spatialize && matches!(device.render_mode, crate::device::RenderMode::Binaural);

        if binaural && self.hrtf.is_none() {
            self.hrtf = Some(HrtfVoiceState::new());
        }

        // AL_SOURCE_RELATIVE: position/velocity/direction are offsets from
        // the listener rather than world-absolute.
        let world_position = if props.flags.contains(SourceFlags::RELATIVE_TO_LISTENER) {
            crate::math::add3(listener.position, props.position)
        } else {
            props.position
        };

        let rel = crate::math::sub3(world_position, listener.position);
        let distance = crate::math::length3(rel);
        let local = listener.world_to_listener(world_position);

        let distance_model = props.distance_model_override.unwrap_or(listener.distance_model);
        let atten = distance_model.attenuation(
            distance,
            props.reference_distance,
            props.max_distance,
            props.rolloff_factor,
        );
        let cone = if props.direction == [0.0; 3] {
            1.0
        } else {
            panner::cone_gain(
                crate::math::scale3(rel, -1.0),
                props.direction,
                props.inner_cone_angle,
                props.outer_cone_angle,
                props.cone_outer_gain,
            )
        };
        let gain = (props.gain * atten * cone * listener.gain).clamp(props.min_gain, props.max_gain);

        let pitch = panner::doppler_pitch(
            props.pitch,
            listener.velocity,
            props.velocity,
            crate::math::scale3(rel, -1.0),
            listener.speed_of_sound_units_per_second(),
            listener.doppler_factor,
            0.0,
        );

        // Direct-path gains: speaker/ambisonic decode matrix times the
        // spherical-harmonic panning coefficients, or straight HRTF query.
        // Direct-channels sources skip this entirely (routed verbatim below)
        // and a SPATIALIZE=false source falls back to flat equal-gain
        // distribution regardless of the device's render mode.
        if direct_channels {
            // no panning target; channels are routed 1:1 below.
        } else if binaural {
            if let (Some(hrtf), Some(table)) = (self.hrtf.as_mut(), device.hrtf.as_ref()) {
                let azimuth = local[0].atan2(-local[2]).to_degrees();
                let elevation = (local[1] / distance.max(1.0e-6)).asin().to_degrees();
                let response = table.query(elevation, azimuth, gain, props.spread);
                hrtf.set_target(response, n_frames);
            }
        } else if spatialize && matches!(device.render_mode, crate::device::RenderMode::Speakers) {
            // The dry bus holds ambisonic channels, not speaker feeds;
            // the device's `AmbisonicDecoder` (C4) turns this into
            // speaker signals once per slice, after all voices mix in.
            let mut coefs = panner::spherical_harmonics(local);
            panner::apply_spread(&mut coefs, props.spread);
            let gains: Vec<f32> = coefs[..dry_bus.len().min(coefs.len())]
                .iter()
                .map(|c| c * gain)
                .collect();
            self.direct_gains.set_target(&gains);
        } else if matches!(device.render_mode, crate::device::RenderMode::Speakers) {
            // Non-spatialized in ambisonic mode: feed only the omnidirectional
            // W channel so the source lands equally on every speaker rather
            // than picking up a spurious direction from the X/Y/Z channels.
            let mut gains = vec![0.0; dry_bus.len()];
            if let Some(w) = gains.first_mut() {
                *w = gain;
            }
            self.direct_gains.set_target(&gains);
        } else {
            let gains = vec![gain; dry_bus.len()];
            self.direct_gains.set_target(&gains);
        }

        for (send, routing) in self.sends.iter_mut().zip(props.sends.iter()) {
            if routing.target_slot.is_some() {
                send.gains.set_target(&vec![gain * routing.filter.gain; wet_buses.first().map(|b| b.len()).unwrap_or(0)]);
            } else {
                send.gains.set_target(&vec![0.0; wet_buses.first().map(|b| b.len()).unwrap_or(0)]);
            }
        }

        let increment = ((pitch as f64) * (buffer.rate as f64) / (device.sample_rate as f64)
            * FRACTIONONE as f64) as u32;

        let source_channel_count = buffer.data.len();
        if self.history.len() != source_channel_count {
            self.history = vec![vec![0.0; VOICE_HISTORY * 2]; source_channel_count];
        }

        let mut channels = Vec::with_capacity(source_channel_count);
        let mut advance_frames = 0usize;
        let mut next_cursor_frac = self.cursor_frac;
        for (c, channel_data) in buffer.data.iter().enumerate() {
            let mut out = vec![0.0f32; n_frames];
            let history_len = self.history[c].len();
            let padded: Vec<f32> = self.history[c]
                .iter()
                .copied()
                .chain(channel_data[self.cursor_frame.min(channel_data.len())..].iter().copied())
                .collect();
            self.resampler
                .resample(&padded, history_len, self.cursor_frac, increment, &mut out);

            if c == 0 {
                let total_frac = self.cursor_frac as u64 + increment as u64 * n_frames as u64;
                advance_frames = (total_frac >> crate::resampler::FRACTIONBITS) as usize;
                next_cursor_frac = (total_frac & crate::resampler::FRACTIONMASK as u64) as u32;
            }

            let hist_start = padded.len().saturating_sub(history_len);
            for (i, slot) in self.history[c].iter_mut().enumerate() {
                let idx = hist_start + i;
                *slot = padded.get(idx).copied().unwrap_or(0.0);
            }
            channels.push(out);
        }
        self.cursor_frac = next_cursor_frac;

        let remaining = buffer.loop_end.saturating_sub(self.cursor_frame);
        if advance_frames >= remaining {
            if self.looping {
                self.cursor_frame = buffer.loop_start
                    + (advance_frames - remaining) % buffer.loop_end.max(buffer.loop_start + 1);
            } else {
                self.cursor_frame = buffer.loop_end;
                self.done = true;
            }
        } else {
            self.cursor_frame += advance_frames;
        }
        let produced = n_frames;

        let mut mono = channels[0].clone();

        if direct_channels {
            // Direct-channels bypasses the mono direct-path shelf filters:
            // each source channel is routed to its output channel verbatim,
            // and those filters model a single spatialized voice's
            // coloration, not a per-channel one.
            let lfe_index = device.output_layout.lfe_index();
            let source_has_lfe = lfe_index.map(|idx| source_channel_count > idx).unwrap_or(false);
            let routes = panner::direct_channel_route(
                source_channel_count,
                dry_bus.len(),
                source_has_lfe,
                lfe_index,
            );
            for (c, route) in routes.iter().enumerate() {
                if let Some(out_ch) = route {
                    if *out_ch < dry_bus.len() {
                        let bus_row = &mut dry_bus[*out_ch];
                        for i in 0..n_frames.min(bus_row.len()) {
                            bus_row[i] += channels[c][i] * gain;
                        }
                    }
                }
            }
        } else {
            self.direct_low_state.process(&self.direct_low, &mut mono);
            self.direct_high_state.process(&self.direct_high, &mut mono);

            if binaural {
                if let Some(hrtf) = self.hrtf.as_mut() {
                    let mut left = vec![0.0f32; n_frames];
                    let mut right = vec![0.0f32; n_frames];
                    hrtf.process_block(&mono[..n_frames], &mut left, &mut right);
                    if dry_bus.len() >= 2 {
                        for i in 0..n_frames.min(dry_bus[0].len()) {
                            dry_bus[0][i] += left[i];
                        }
                        for i in 0..n_frames.min(dry_bus[1].len()) {
                            dry_bus[1][i] += right[i];
                        }
                    }
                }
            } else {
                let mut direct_gain_curve = vec![vec![0.0f32; n_frames]; dry_bus.len()];
                self.direct_gains.ramp_into(n_frames, &mut direct_gain_curve);
                for (ch, bus_row) in dry_bus.iter_mut().enumerate() {
                    if ch >= direct_gain_curve.len() {
                        break;
                    }
                    for i in 0..n_frames.min(bus_row.len()) {
                        bus_row[i] += mono[i] * direct_gain_curve[ch][i];
                    }
                }
            }
        }

        for (send, wet_bus) in self.sends.iter_mut().zip(wet_buses.iter_mut()) {
            let mut send_samples = mono.clone();
            send.low_state.process(&send.low_shelf, &mut send_samples);
            send.high_state.process(&send.high_shelf, &mut send_samples);
            let mut send_gain_curve = vec![vec![0.0f32; n_frames]; wet_bus.len()];
            send.gains.ramp_into(n_frames, &mut send_gain_curve);
            for (ch, bus_row) in wet_bus.iter_mut().enumerate() {
                if ch >= send_gain_curve.len() {
                    break;
                }
                for i in 0..n_frames.min(bus_row.len()) {
                    bus_row[i] += send_samples[i] * send_gain_curve[ch][i];
                }
            }
        }

        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferChannels;

    fn silent_listener() -> ListenerProps {
        ListenerProps::default()
    }

    #[test]
    fn gain_ramp_reaches_target_at_end_of_slice() {
        let mut ramp = GainRamp::new(1);
        ramp.set_target(&[1.0]);
        let mut out = vec![vec![0.0; 16]];
        ramp.ramp_into(16, &mut out);
        assert!((out[0][15] - 1.0).abs() < 1.0e-5);
    }

    #[test]
    fn new_voice_produces_nothing_without_a_buffer() {
        let mut voice = Voice::new(1, 2);
        let props = SourceProps::default();
        let listener = silent_listener();
        let device = Device::new(
            44100,
            crate::format::ChannelLayout::Stereo,
            crate::format::SampleType::F32,
            crate::device::RenderMode::StereoBasic,
            0,
        );
        let counter = GenerationCounter::new();
        let mut dry = vec![vec![0.0; 64]; 2];
        let mut wet: Vec<Vec<Vec<f32>>> = vec![];
        let n = voice.process_slice(&props, &listener, &device, &counter, &mut dry, &mut wet, 64);
        assert_eq!(n, 0);
    }

    #[test]
    fn playing_voice_writes_into_dry_bus() {
        let mut voice = Voice::new(1, 2);
        let buf = Buffer::new(BufferChannels::Mono, 44100, vec![vec![1.0; 256]]);
        voice.start(buf, false);
        let props = SourceProps::default();
        let listener = silent_listener();
        let device = Device::new(
            44100,
            crate::format::ChannelLayout::Stereo,
            crate::format::SampleType::F32,
            crate::device::RenderMode::StereoBasic,
            0,
        );
        let counter = GenerationCounter::new();
        let mut dry = vec![vec![0.0; 64]; 2];
        let mut wet: Vec<Vec<Vec<f32>>> = vec![];
        let n = voice.process_slice(&props, &listener, &device, &counter, &mut dry, &mut wet, 64);
        assert_eq!(n, 64);
        assert!(dry[0].iter().any(|&s| s.abs() > 0.0));
    }
}
