//! Mixer loop (C8): the per-render-call slice driver. Pulls pending
//! parameter updates, zeroes buses, steps every active voice, runs the
//! effect slots, decodes to the device's output representation, and
//! converts to the output sample type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::device::{Device, RenderMode, MAX_SLICE_FRAMES};
use crate::effects::{EffectSlot, SlotTarget};
use crate::format::{Ditherer, SampleType};
use crate::handover::{GenerationCounter, Handover};
use crate::hrtf::AmbisonicHrtfDecoder;
use crate::listener::ListenerProps;
use crate::source::SourceProps;
use crate::voice::Voice;
use log::trace;

/// One active voice plus the handover cell it reads its properties from.
pub struct VoiceSlot {
    pub voice: Voice,
    pub props: Arc<Handover<SourceProps>>,
}

/// The render engine: owns the device, every active voice, and the
/// effect slots their sends can target.
pub struct Mixer {
    pub device: Device,
    pub listener: Arc<Handover<ListenerProps>>,
    pub voices: HashMap<u32, VoiceSlot>,
    pub slots: Vec<EffectSlot>,
    pub generation_counter: GenerationCounter,
    pub ambisonic_hrtf: Option<AmbisonicHrtfDecoder>,
    /// Oldest generation any live voice still observed as of the last
    /// slice. Retired `Handover` publications older than this are safe to
    /// reclaim; callers that maintain a `ReclamationQueue` per entity
    /// should pass this value to its `reclaim`.
    pub reclamation_watermark: u64,
}

impl Mixer {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            listener: Arc::new(Handover::new(ListenerProps::default())),
            voices: HashMap::new(),
            slots: Vec::new(),
            generation_counter: GenerationCounter::new(),
            ambisonic_hrtf: None,
            reclamation_watermark: 0,
        }
    }

    pub fn add_voice(&mut self, source_id: u32, props: Arc<Handover<SourceProps>>) {
        let channels = self.device.dry_bus.channels;
        self.voices.insert(source_id, VoiceSlot { voice: Voice::new(source_id, channels), props });
    }

    pub fn remove_voice(&mut self, source_id: u32) {
        self.voices.remove(&source_id);
    }

    /// Append an effect slot, running its `device_update` against the
    /// device's current sample rate and dry bus channel count.
    pub fn add_slot(&mut self, mut slot: EffectSlot) -> usize {
        slot.device_update(self.device.sample_rate as f32, self.device.dry_bus.channels);
        self.slots.push(slot);
        self.slots.len() - 1
    }

    /// Slot processing order: a topological sort over `target` edges so an
    /// upstream slot (one that targets another slot) always processes
    /// before its target reads the result. Falls back to index order for
    /// any slot left unresolved by a cycle (cycles are expected to be
    /// rejected before reaching the mixer).
    fn slot_processing_order(&self) -> Vec<usize> {
        let n = self.slots.len();
        let mut indegree = vec![0usize; n];
        for slot in &self.slots {
            if let SlotTarget::Slot(t) = slot.target {
                if t < n {
                    indegree[t] += 1;
                }
            }
        }
        let mut queue: std::collections::VecDeque<usize> =
            (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        while let Some(i) = queue.pop_front() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            if let SlotTarget::Slot(t) = self.slots[i].target {
                if t < n {
                    indegree[t] = indegree[t].saturating_sub(1);
                    if indegree[t] == 0 {
                        queue.push_back(t);
                    }
                }
            }
        }
        for i in 0..n {
            if !visited[i] {
                order.push(i);
            }
        }
        order
    }

    /// Render exactly `total_frames` frames into `out` (interleaved,
    /// `device.output_layout.channel_count()` channels), internally slicing
    /// into `MAX_SLICE_FRAMES`-sized chunks so gain ramps and effect state
    /// stay well-behaved regardless of the caller's requested block size.
    pub fn render(&mut self, total_frames: usize, out: &mut [f32]) {
        let channels = self.device.output_layout.channel_count();
        let mut dither = Ditherer::new(0x9E37_79B9);
        let mut produced = 0usize;

        while produced < total_frames {
            let n = (total_frames - produced).min(MAX_SLICE_FRAMES);
            let listener = self.listener.acquire();

            self.device.dry_bus.clear();
            for wet in self.device.wet_buses.iter_mut() {
                wet.clear();
            }

            let dry_channels = self.device.dry_bus.channels;
            let mut dry_rows = vec![vec![0.0f32; n]; dry_channels];
            let mut wet_rows: Vec<Vec<Vec<f32>>> = self
                .device
                .wet_buses
                .iter()
                .map(|b| vec![vec![0.0f32; n]; b.channels])
                .collect();

            let mut min_generation = self.generation_counter.current();
            for slot in self.voices.values_mut() {
                let props = slot.props.acquire();
                slot.voice.process_slice(
                    &props,
                    &listener,
                    &self.device,
                    &self.generation_counter,
                    &mut dry_rows,
                    &mut wet_rows,
                    n,
                );
                min_generation = min_generation.min(slot.voice.last_generation);
            }

            for slot_idx in self.slot_processing_order() {
                let sample_rate = self.device.sample_rate as f32;
                let (target, dry_pan, processed) = {
                    let Some(wet) = wet_rows.get_mut(slot_idx) else { continue };
                    let slot = &mut self.slots[slot_idx];
                    for row in wet.iter_mut() {
                        slot.process(row, sample_rate);
                    }
                    (slot.target, slot.dry_pan.clone(), wet.clone())
                };
                match target {
                    SlotTarget::MainOutput => {
                        for (ch, row) in processed.iter().enumerate() {
                            if ch < dry_rows.len() {
                                let pan = dry_pan.get(ch).copied().unwrap_or(1.0);
                                for (d, w) in dry_rows[ch].iter_mut().zip(row.iter()) {
                                    *d += *w * pan;
                                }
                            }
                        }
                    }
                    SlotTarget::Slot(target_idx) => {
                        if let Some(target_wet) = wet_rows.get_mut(target_idx) {
                            for (ch, row) in processed.iter().enumerate() {
                                if ch < target_wet.len() {
                                    let pan = dry_pan.get(ch).copied().unwrap_or(1.0);
                                    for (d, w) in target_wet[ch].iter_mut().zip(row.iter()) {
                                        *d += *w * pan;
                                    }
                                }
                            }
                        }
                    }
                }
            }

            let output_rows = match self.device.render_mode {
                RenderMode::Speakers => {
                    let speaker_count = self
                        .device
                        .ambisonic_decoder
                        .as_ref()
                        .map(|d| d.speaker_count())
                        .unwrap_or(channels);
                    let mut speakers = vec![vec![0.0f32; n]; speaker_count];
                    if let Some(decoder) = self.device.ambisonic_decoder.as_mut() {
                        decoder.decode(&dry_rows, &mut speakers, n);
                    }
                    speakers
                }
                RenderMode::Binaural | RenderMode::StereoBasic => dry_rows,
            };

            for frame in 0..n {
                for ch in 0..channels {
                    let sample = output_rows.get(ch).and_then(|row| row.get(frame)).copied().unwrap_or(0.0);
                    let out_idx = (produced + frame) * channels + ch;
                    if out_idx < out.len() {
                        out[out_idx] = match self.device.sample_type {
                            SampleType::F32 => sample,
                            other => crate::format::quantize(sample, other, &mut dither) as f32,
                        };
                    }
                }
            }

            let before = self.voices.len();
            self.voices.retain(|_, slot| !slot.voice.done);
            if self.voices.len() != before {
                trace!("mixer: {} voice(s) finished and were reaped", before - self.voices.len());
            }
            self.reclamation_watermark = min_generation;
            produced += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, BufferChannels};
    use crate::format::ChannelLayout;

    #[test]
    fn render_with_no_voices_is_silent() {
        let device = Device::new(44100, ChannelLayout::Stereo, SampleType::F32, RenderMode::StereoBasic, 0);
        let mut mixer = Mixer::new(device);
        let mut out = vec![1.0f32; 2 * 256];
        mixer.render(256, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn render_with_one_voice_produces_nonzero_output() {
        let device = Device::new(44100, ChannelLayout::Stereo, SampleType::F32, RenderMode::StereoBasic, 0);
        let mut mixer = Mixer::new(device);
        let props = Arc::new(Handover::new(SourceProps::default()));
        mixer.add_voice(1, props);
        let buf = Buffer::new(BufferChannels::Mono, 44100, vec![vec![1.0; 4096]]);
        mixer.voices.get_mut(&1).unwrap().voice.start(buf, false);

        let mut out = vec![0.0f32; 2 * 512];
        mixer.render(512, &mut out);
        assert!(out.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn finished_nonlooping_voice_is_removed_after_render() {
        let device = Device::new(44100, ChannelLayout::Stereo, SampleType::F32, RenderMode::StereoBasic, 0);
        let mut mixer = Mixer::new(device);
        let props = Arc::new(Handover::new(SourceProps::default()));
        mixer.add_voice(1, props);
        let buf = Buffer::new(BufferChannels::Mono, 44100, vec![vec![1.0; 64]]);
        mixer.voices.get_mut(&1).unwrap().voice.start(buf, false);

        let mut out = vec![0.0f32; 2 * 1024];
        mixer.render(1024, &mut out);
        assert!(!mixer.voices.contains_key(&1));
    }

    #[test]
    fn slot_dry_pan_steers_its_output_toward_one_channel() {
        use crate::effects::{EffectKind, EffectSlot};

        let device = Device::new(44100, ChannelLayout::Stereo, SampleType::F32, RenderMode::StereoBasic, 1);
        let mut mixer = Mixer::new(device);
        let slot_idx = mixer.add_slot(EffectSlot::new(EffectKind::None));
        mixer.slots[slot_idx].dry_pan = vec![1.0, 0.0];

        let mut props = SourceProps::default();
        props.sends[0].target_slot = Some(0);
        let props = Arc::new(Handover::new(props));
        mixer.add_voice(1, props);
        let buf = Buffer::new(BufferChannels::Mono, 44100, vec![vec![1.0; 4096]]);
        mixer.voices.get_mut(&1).unwrap().voice.start(buf, false);

        let mut out = vec![0.0f32; 2 * 512];
        mixer.render(512, &mut out);
        let left_energy: f32 = out.iter().step_by(2).map(|s| s * s).sum();
        let right_energy: f32 = out.iter().skip(1).step_by(2).map(|s| s * s).sum();
        assert!(left_energy > right_energy);
    }
}
