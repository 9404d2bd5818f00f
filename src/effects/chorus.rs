//! Chorus / flanger: a single modulated delay line, LFO-swept between a
//! short (flanger-like) and longer (chorus-like) delay depending on
//! configured depth, mixed with the dry signal.

use super::{Effect, EffectParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
}

pub struct Chorus {
    pub waveform: Waveform,
    pub rate_hz: f32,
    pub depth: f32,
    pub feedback: f32,
    pub base_delay_seconds: f32,
    sample_rate: f32,
    buffer: Vec<f32>,
    write_pos: usize,
    phase: f32,
}

impl Chorus {
    pub fn new(sample_rate: f32, base_delay_seconds: f32, depth_seconds: f32) -> Self {
        let len = ((base_delay_seconds + depth_seconds) * sample_rate) as usize + 4;
        Self {
            waveform: Waveform::Triangle,
            rate_hz: 1.5,
            depth: depth_seconds,
            feedback: 0.0,
            base_delay_seconds,
            sample_rate,
            buffer: vec![0.0; len.max(4)],
            write_pos: 0,
            phase: 0.0,
        }
    }

    fn lfo(&self) -> f32 {
        match self.waveform {
            Waveform::Sine => (std::f32::consts::TAU * self.phase).sin(),
            Waveform::Triangle => {
                let t = self.phase.fract();
                4.0 * (t - (t + 0.5).floor()).abs() - 1.0
            }
        }
    }
}

impl Effect for Chorus {
    fn device_update(&mut self, sample_rate: f32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        let len = ((self.base_delay_seconds + self.depth) * sample_rate) as usize + 4;
        self.buffer = vec![0.0; len.max(4)];
        self.write_pos = 0;
        self.phase = 0.0;
    }

    fn update(&mut self, params: &EffectParams) {
        if let EffectParams::Chorus { rate_hz, depth, feedback } = *params {
            self.rate_hz = rate_hz;
            self.depth = depth;
            self.feedback = feedback;
        }
    }

    fn process(&mut self, buf: &mut [f32], sample_rate: f32) {
        let phase_inc = self.rate_hz / sample_rate;
        for sample in buf.iter_mut() {
            let lfo = self.lfo();
            self.phase = (self.phase + phase_inc).fract();

            let delay_seconds = self.base_delay_seconds + self.depth * 0.5 * (lfo + 1.0);
            let delay_samples = delay_seconds * sample_rate;
            let read_pos_f = self.write_pos as f32 - delay_samples;
            let len = self.buffer.len() as f32;
            let read_pos_f = ((read_pos_f % len) + len) % len;
            let i0 = read_pos_f.floor() as usize % self.buffer.len();
            let i1 = (i0 + 1) % self.buffer.len();
            let frac = read_pos_f.fract();
            let delayed = crate::math::lerp(self.buffer[i0], self.buffer[i1], frac);

            self.buffer[self.write_pos] = *sample + delayed * self.feedback;
            self.write_pos = (self.write_pos + 1) % self.buffer.len();
            *sample = (*sample + delayed) * 0.5;
        }
    }

    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stays_bounded_for_full_scale_input() {
        let mut chorus = Chorus::new(44100.0, 0.015, 0.005);
        let mut buf: Vec<f32> = (0..2000).map(|i| ((i as f32) * 0.05).sin()).collect();
        chorus.process(&mut buf, 44100.0);
        assert!(buf.iter().all(|s| s.abs() <= 1.5));
    }

    #[test]
    fn reset_clears_delay_buffer() {
        let mut chorus = Chorus::new(44100.0, 0.015, 0.005);
        let mut buf = vec![1.0f32; 100];
        chorus.process(&mut buf, 44100.0);
        chorus.reset();
        assert!(chorus.buffer.iter().all(|&s| s == 0.0));
    }
}
