//! Autowah: an envelope follower driving a swept bandpass center
//! frequency, i.e. an envelope-controlled wah pedal.

use super::{Effect, EffectParams};
use crate::biquad::{BiquadCoefs, BiquadState, FilterKind};

pub struct Autowah {
    pub resonance: f32,
    pub attack_seconds: f32,
    pub release_seconds: f32,
    pub peak_gain: f32,
    pub base_frequency: f32,
    pub sweep_range_hz: f32,
    envelope: f32,
    state: BiquadState,
}

impl Autowah {
    pub fn new(resonance: f32, attack_seconds: f32, release_seconds: f32, peak_gain: f32) -> Self {
        Self {
            resonance,
            attack_seconds,
            release_seconds,
            peak_gain,
            base_frequency: 300.0,
            sweep_range_hz: 3000.0,
            envelope: 0.0,
            state: BiquadState::new(),
        }
    }

    #[inline]
    fn alpha(tau: f32, sample_rate: f32) -> f32 {
        (-1.0 / (sample_rate * tau.max(1.0e-6))).exp()
    }
}

impl Effect for Autowah {
    fn device_update(&mut self, _sample_rate: f32) {}

    fn update(&mut self, params: &EffectParams) {
        if let EffectParams::Autowah { resonance, attack_seconds, release_seconds, peak_gain } = *params {
            self.resonance = resonance;
            self.attack_seconds = attack_seconds;
            self.release_seconds = release_seconds;
            self.peak_gain = peak_gain;
        }
    }

    fn process(&mut self, buf: &mut [f32], sample_rate: f32) {
        let attack_alpha = Self::alpha(self.attack_seconds, sample_rate);
        let release_alpha = Self::alpha(self.release_seconds, sample_rate);
        for sample in buf.iter_mut() {
            let rectified = sample.abs() * self.peak_gain;
            let alpha = if rectified > self.envelope { attack_alpha } else { release_alpha };
            self.envelope = alpha * self.envelope + (1.0 - alpha) * rectified;

            let center = self.base_frequency + self.envelope.min(1.0) * self.sweep_range_hz;
            let f = (center / sample_rate).clamp(1.0e-4, 0.4999);
            let rcp_q = BiquadCoefs::rcp_q_from_bandwidth(f, (1.0 / self.resonance.max(0.01)).max(0.1));
            let coefs = BiquadCoefs::set_params(FilterKind::BandPass, 1.0, f, rcp_q);
            *sample = self.state.process_one(&coefs, *sample);
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn louder_input_produces_larger_envelope() {
        let mut wah = Autowah::new(2.0, 0.01, 0.1, 1.0);
        let mut quiet = vec![0.05_f32; 500];
        wah.process(&mut quiet, 44100.0);
        let quiet_envelope = wah.envelope;
        wah.reset();
        let mut loud = vec![0.8_f32; 500];
        wah.process(&mut loud, 44100.0);
        assert!(wah.envelope > quiet_envelope);
    }

    #[test]
    fn output_stays_finite() {
        let mut wah = Autowah::new(3.0, 0.005, 0.05, 1.0);
        let mut buf: Vec<f32> = (0..1000).map(|i| ((i as f32) * 0.03).sin() * 0.5).collect();
        wah.process(&mut buf, 44100.0);
        assert!(buf.iter().all(|s| s.is_finite()));
    }
}
