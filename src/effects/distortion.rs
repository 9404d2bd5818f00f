//! Distortion: pre-gain, tanh waveshaping, and a post-shaping bandpass to
//! tame the harmonic spray into a usable tone-shaping range.

use super::{Effect, EffectParams};
use crate::biquad::{BiquadCoefs, BiquadState, FilterKind};

pub struct Distortion {
    pub drive: f32,
    pub edge: f32,
    pub center_frequency: f32,
    filter_state: BiquadState,
    filter_coefs: BiquadCoefs,
    sample_rate: f32,
}

impl Distortion {
    pub fn new(sample_rate: f32, drive: f32, edge: f32, center_frequency: f32) -> Self {
        let mut dist = Self {
            drive,
            edge,
            center_frequency,
            filter_state: BiquadState::new(),
            filter_coefs: BiquadCoefs::IDENTITY,
            sample_rate,
        };
        dist.recompute_filter();
        dist
    }

    fn recompute_filter(&mut self) {
        let f = (self.center_frequency / self.sample_rate).clamp(1.0e-4, 0.4999);
        self.filter_coefs = BiquadCoefs::set_params(FilterKind::BandPass, 1.0, f, BiquadCoefs::rcp_q_from_bandwidth(f, 1.0));
    }
}

impl Effect for Distortion {
    fn device_update(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recompute_filter();
    }

    fn update(&mut self, params: &EffectParams) {
        if let EffectParams::Distortion { drive, edge, center_frequency } = *params {
            self.drive = drive;
            self.edge = edge;
            self.center_frequency = center_frequency;
            self.recompute_filter();
        }
    }

    fn process(&mut self, buf: &mut [f32], _sample_rate: f32) {
        let gain = 1.0 + self.drive * 20.0;
        for sample in buf.iter_mut() {
            let driven = *sample * gain;
            let shaped = driven.tanh();
            *sample = crate::math::lerp(driven.clamp(-1.0, 1.0), shaped, self.edge.clamp(0.0, 1.0));
        }
        self.filter_state.process(&self.filter_coefs, buf);
    }

    fn reset(&mut self) {
        self.filter_state.clear();
    }
}
