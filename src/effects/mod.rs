//! Effect slot (C7): auxiliary send targets, each running exactly one
//! effect, processed after every voice has summed into its wet bus.

mod autowah;
mod chorus;
mod compressor;
mod distortion;
mod echo;
mod equalizer;
mod frequency_shifter;
mod pitch_shifter;
mod reverb;

pub use autowah::Autowah;
pub use chorus::Chorus;
pub use compressor::Compressor;
pub use distortion::Distortion;
pub use echo::Echo;
pub use equalizer::Equalizer;
pub use frequency_shifter::FrequencyShifter;
pub use pitch_shifter::PitchShifter;
pub use reverb::Reverb;

/// Common interface every effect type implements, dispatched from
/// `EffectSlot` through a tagged sum rather than a trait object so the
/// mixer loop never allocates or indirects through a vtable per slice.
pub trait Effect {
    /// Allocate/zero sample-rate-dependent buffers and refresh any cached
    /// coefficients that depend on it. Called when the slot is first
    /// assigned an effect of this type and whenever the device's sample
    /// rate changes.
    fn device_update(&mut self, sample_rate: f32);
    /// Recompute per-parameter coefficients from newly published
    /// properties without disturbing the effect's running state (delay
    /// line contents, envelope followers, ...).
    fn update(&mut self, params: &EffectParams);
    /// Process one slice in place. Input and output share the same buffer;
    /// effects that need separate wet/dry mixing do so internally.
    fn process(&mut self, buf: &mut [f32], sample_rate: f32);
    fn reset(&mut self);
}

/// Per-parameter band settings, used by [`EffectParams::Equalizer`].
#[derive(Debug, Clone, Copy)]
pub struct EqBandParams {
    pub gain: f32,
    pub frequency: f32,
    pub rcp_q: f32,
}

/// The published, effect-type-specific tunables for a slot, handed to
/// `Effect::update` on every property publish. Mirrors `EffectKind`'s
/// variants but carries only the user-settable fields, not internal state.
#[derive(Debug, Clone)]
pub enum EffectParams {
    None,
    Reverb { decay: f32, damping: f32, wet_gain: f32, diffusion: f32 },
    Echo { delay_seconds: f32, lr_delay_seconds: f32, damping: f32, feedback: f32, spread: f32 },
    Chorus { rate_hz: f32, depth: f32, feedback: f32 },
    Equalizer { bands: [EqBandParams; 4] },
    Compressor { threshold_db: f32, ratio: f32, attack_seconds: f32, release_seconds: f32, knee_db: f32 },
    Autowah { resonance: f32, attack_seconds: f32, release_seconds: f32, peak_gain: f32 },
    Distortion { drive: f32, edge: f32, center_frequency: f32 },
    FrequencyShifter { shift_hz: f32 },
    PitchShifter { semitones: f32 },
}

/// One of the built-in effect types, selected per effect slot.
pub enum EffectKind {
    Reverb(Reverb),
    Echo(Echo),
    Chorus(Chorus),
    Equalizer(Equalizer),
    Compressor(Compressor),
    Autowah(Autowah),
    Distortion(Distortion),
    FrequencyShifter(FrequencyShifter),
    PitchShifter(PitchShifter),
    None,
}

impl EffectKind {
    pub fn process(&mut self, buf: &mut [f32], sample_rate: f32) {
        match self {
            EffectKind::Reverb(e) => e.process(buf, sample_rate),
            EffectKind::Echo(e) => e.process(buf, sample_rate),
            EffectKind::Chorus(e) => e.process(buf, sample_rate),
            EffectKind::Equalizer(e) => e.process(buf, sample_rate),
            EffectKind::Compressor(e) => e.process(buf, sample_rate),
            EffectKind::Autowah(e) => e.process(buf, sample_rate),
            EffectKind::Distortion(e) => e.process(buf, sample_rate),
            EffectKind::FrequencyShifter(e) => e.process(buf, sample_rate),
            EffectKind::PitchShifter(e) => e.process(buf, sample_rate),
            EffectKind::None => {}
        }
    }

    pub fn reset(&mut self) {
        match self {
            EffectKind::Reverb(e) => e.reset(),
            EffectKind::Echo(e) => e.reset(),
            EffectKind::Chorus(e) => e.reset(),
            EffectKind::Equalizer(e) => e.reset(),
            EffectKind::Compressor(e) => e.reset(),
            EffectKind::Autowah(e) => e.reset(),
            EffectKind::Distortion(e) => e.reset(),
            EffectKind::FrequencyShifter(e) => e.reset(),
            EffectKind::PitchShifter(e) => e.reset(),
            EffectKind::None => {}
        }
    }

    pub fn device_update(&mut self, sample_rate: f32) {
        match self {
            EffectKind::Reverb(e) => e.device_update(sample_rate),
            EffectKind::Echo(e) => e.device_update(sample_rate),
            EffectKind::Chorus(e) => e.device_update(sample_rate),
            EffectKind::Equalizer(e) => e.device_update(sample_rate),
            EffectKind::Compressor(e) => e.device_update(sample_rate),
            EffectKind::Autowah(e) => e.device_update(sample_rate),
            EffectKind::Distortion(e) => e.device_update(sample_rate),
            EffectKind::FrequencyShifter(e) => e.device_update(sample_rate),
            EffectKind::PitchShifter(e) => e.device_update(sample_rate),
            EffectKind::None => {}
        }
    }

    pub fn update(&mut self, params: &EffectParams) {
        match self {
            EffectKind::Reverb(e) => e.update(params),
            EffectKind::Echo(e) => e.update(params),
            EffectKind::Chorus(e) => e.update(params),
            EffectKind::Equalizer(e) => e.update(params),
            EffectKind::Compressor(e) => e.update(params),
            EffectKind::Autowah(e) => e.update(params),
            EffectKind::Distortion(e) => e.update(params),
            EffectKind::FrequencyShifter(e) => e.update(params),
            EffectKind::PitchShifter(e) => e.update(params),
            EffectKind::None => {}
        }
    }
}

/// Where a slot's processed output is routed once it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTarget {
    MainOutput,
    Slot(usize),
}

/// One auxiliary effect slot: an effect instance, its published
/// properties, the output gain and dry-pan vector applied after
/// processing, and where the result is routed (main output or another
/// slot, per-slot cycles are rejected by the caller before this point).
pub struct EffectSlot {
    pub effect: EffectKind,
    pub props: EffectParams,
    pub gain: f32,
    pub target: SlotTarget,
    /// Per-dry-channel pan gain applied to this slot's output before it is
    /// summed into its target bus.
    pub dry_pan: Vec<f32>,
}

impl EffectSlot {
    pub fn new(effect: EffectKind) -> Self {
        Self {
            effect,
            props: EffectParams::None,
            gain: 1.0,
            target: SlotTarget::MainOutput,
            dry_pan: Vec::new(),
        }
    }

    /// Allocate/zero sample-rate-dependent state and size the dry-pan
    /// vector to the device's channel count. Call on slot creation,
    /// effect-type change, or a sample-rate change.
    pub fn device_update(&mut self, sample_rate: f32, dry_channels: usize) {
        self.effect.device_update(sample_rate);
        self.dry_pan.resize(dry_channels, 1.0);
    }

    /// Publish new effect properties and a dry-pan vector, recomputing the
    /// effect's per-parameter coefficients without touching its state.
    pub fn update(&mut self, props: EffectParams, dry_pan: &[f32]) {
        self.effect.update(&props);
        self.props = props;
        if dry_pan.len() == self.dry_pan.len() {
            self.dry_pan.copy_from_slice(dry_pan);
        }
    }

    pub fn process(&mut self, buf: &mut [f32], sample_rate: f32) {
        self.effect.process(buf, sample_rate);
        for s in buf.iter_mut() {
            *s *= self.gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_effect_is_transparent() {
        let mut slot = EffectSlot::new(EffectKind::None);
        let mut buf = vec![0.1, -0.2, 0.3];
        let input = buf.clone();
        slot.process(&mut buf, 44100.0);
        assert_eq!(buf, input);
    }

    #[test]
    fn device_update_sizes_the_dry_pan_vector() {
        let mut slot = EffectSlot::new(EffectKind::Echo(Echo::new(44100.0, 0.1, 0.0, 0.2, 0.3)));
        slot.device_update(44100.0, 4);
        assert_eq!(slot.dry_pan, vec![1.0; 4]);
    }

    #[test]
    fn update_applies_echo_params_without_reallocating_its_delay_line() {
        let mut slot = EffectSlot::new(EffectKind::Echo(Echo::new(44100.0, 0.1, 0.0, 0.0, 0.5)));
        slot.device_update(44100.0, 1);
        let buffer_len_before = match &slot.effect {
            EffectKind::Echo(e) => e.buffer_len(),
            _ => unreachable!(),
        };

        slot.update(
            EffectParams::Echo { delay_seconds: 0.2, lr_delay_seconds: 0.0, damping: 0.0, feedback: 0.5, spread: 0.0 },
            &[1.0],
        );
        match &slot.effect {
            EffectKind::Echo(e) => {
                assert!((e.delay_seconds - 0.2).abs() < 1.0e-6);
                assert_eq!(e.buffer_len(), buffer_len_before);
            }
            _ => panic!("expected Echo"),
        }
    }
}
