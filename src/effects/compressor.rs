//! Compressor: RMS envelope follower with independent attack/release time
//! constants and a soft-knee gain-reduction curve above threshold.

use super::{Effect, EffectParams};

pub struct Compressor {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_seconds: f32,
    pub release_seconds: f32,
    pub knee_db: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(threshold_db: f32, ratio: f32, attack_seconds: f32, release_seconds: f32) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            attack_seconds,
            release_seconds,
            knee_db: 6.0,
            envelope: 0.0,
        }
    }

    /// Per-sample envelope follower coefficient for a given time constant
    /// `tau`, alpha = exp(-1 / (fs * tau)).
    #[inline]
    fn alpha(tau: f32, sample_rate: f32) -> f32 {
        (-1.0 / (sample_rate * tau.max(1.0e-6))).exp()
    }

    fn gain_for_level_db(&self, level_db: f32) -> f32 {
        let knee = self.knee_db.max(0.0);
        let over = level_db - self.threshold_db;
        let reduction_db = if over <= -knee * 0.5 {
            0.0
        } else if over >= knee * 0.5 {
            over - over / self.ratio
        } else {
            let t = (over + knee * 0.5) / knee.max(1.0e-6);
            let soft_over = t * t * knee * 0.5;
            soft_over - soft_over / self.ratio
        };
        crate::math::db_amp(-reduction_db)
    }
}

impl Effect for Compressor {
    fn device_update(&mut self, _sample_rate: f32) {}

    fn update(&mut self, params: &EffectParams) {
        if let EffectParams::Compressor { threshold_db, ratio, attack_seconds, release_seconds, knee_db } = *params {
            self.threshold_db = threshold_db;
            self.ratio = ratio.max(1.0);
            self.attack_seconds = attack_seconds;
            self.release_seconds = release_seconds;
            self.knee_db = knee_db;
        }
    }

    fn process(&mut self, buf: &mut [f32], sample_rate: f32) {
        let attack_alpha = Self::alpha(self.attack_seconds, sample_rate);
        let release_alpha = Self::alpha(self.release_seconds, sample_rate);
        for sample in buf.iter_mut() {
            let rectified = sample.abs();
            let target = rectified * rectified;
            let alpha = if target > self.envelope { attack_alpha } else { release_alpha };
            self.envelope = alpha * self.envelope + (1.0 - alpha) * target;
            let rms = self.envelope.sqrt();
            let level_db = crate::math::amp_db(rms.max(1.0e-8));
            let gain = self.gain_for_level_db(level_db);
            *sample *= gain;
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_signal_is_attenuated_below_ratio() {
        let mut comp = Compressor::new(-12.0, 4.0, 0.001, 0.05);
        let mut buf = vec![0.9_f32; 4000];
        comp.process(&mut buf, 44100.0);
        assert!(buf.last().unwrap().abs() < 0.9);
    }

    #[test]
    fn quiet_signal_passes_near_unity() {
        let mut comp = Compressor::new(-12.0, 4.0, 0.001, 0.05);
        let mut buf = vec![0.01_f32; 2000];
        comp.process(&mut buf, 44100.0);
        assert!((buf.last().unwrap() - 0.01).abs() < 0.005);
    }
}
