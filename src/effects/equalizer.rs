//! 4-band equalizer: low shelf, two peaking bands, high shelf, cascaded in
//! series, reusing the C1 biquad coefficient derivation.

use super::{Effect, EffectParams};
use crate::biquad::{BiquadCoefs, BiquadState, FilterKind};

pub struct Band {
    pub kind: FilterKind,
    pub frequency: f32,
    pub gain: f32,
    pub rcp_q: f32,
}

pub struct Equalizer {
    bands: [Band; 4],
    states: [BiquadState; 4],
    coefs: [BiquadCoefs; 4],
    sample_rate: f32,
}

impl Equalizer {
    pub fn new(sample_rate: f32) -> Self {
        let bands = [
            Band { kind: FilterKind::LowShelf, frequency: 200.0, gain: 1.0, rcp_q: 1.0 },
            Band { kind: FilterKind::Peaking, frequency: 1000.0, gain: 1.0, rcp_q: 1.0 },
            Band { kind: FilterKind::Peaking, frequency: 4000.0, gain: 1.0, rcp_q: 1.0 },
            Band { kind: FilterKind::HighShelf, frequency: 8000.0, gain: 1.0, rcp_q: 1.0 },
        ];
        let mut eq = Self {
            bands,
            states: std::array::from_fn(|_| BiquadState::new()),
            coefs: [BiquadCoefs::IDENTITY; 4],
            sample_rate,
        };
        eq.recompute();
        eq
    }

    pub fn set_band(&mut self, index: usize, gain: f32, frequency: f32, rcp_q: f32) {
        self.bands[index].gain = gain;
        self.bands[index].frequency = frequency;
        self.bands[index].rcp_q = rcp_q;
        self.recompute_band(index);
    }

    fn recompute_band(&mut self, index: usize) {
        let band = &self.bands[index];
        let f = (band.frequency / self.sample_rate).clamp(1.0e-4, 0.4999);
        self.coefs[index] = BiquadCoefs::set_params(band.kind, band.gain, f, band.rcp_q);
    }

    fn recompute(&mut self) {
        for i in 0..4 {
            self.recompute_band(i);
        }
    }
}

impl Effect for Equalizer {
    fn device_update(&mut self, sample_rate: f32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.recompute();
    }

    fn update(&mut self, params: &EffectParams) {
        if let EffectParams::Equalizer { bands } = params {
            for (i, band) in bands.iter().enumerate() {
                self.set_band(i, band.gain, band.frequency, band.rcp_q);
            }
        }
    }

    fn process(&mut self, buf: &mut [f32], _sample_rate: f32) {
        for (state, coef) in self.states.iter_mut().zip(self.coefs.iter()) {
            state.process(coef, buf);
        }
    }

    fn reset(&mut self) {
        for state in self.states.iter_mut() {
            state.clear();
        }
    }
}
