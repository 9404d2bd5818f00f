//! Reverb: an 8-line feedback delay network with diffusion allpasses and a
//! per-line damping lowpass in the feedback path, the classic Schroeder/
//! Moorer-family topology.

use super::{Effect, EffectParams};
use crate::math::flush_denormal;

const LINES: usize = 8;
/// Prime-ish relatively-coprime delay lengths in samples at 44.1kHz,
/// scaled at runtime to the actual sample rate.
const BASE_DELAYS_MS: [f32; LINES] = [29.7, 37.1, 41.3, 43.7, 47.9, 53.3, 59.1, 61.7];
const ALLPASS_MS: [f32; 4] = [5.0, 1.7, 3.3, 2.1];

struct DelayLine {
    buffer: Vec<f32>,
    pos: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn read(&self) -> f32 {
        self.buffer[self.pos]
    }

    #[inline]
    fn write_advance(&mut self, value: f32) {
        self.buffer[self.pos] = value;
        self.pos = (self.pos + 1) % self.buffer.len();
    }
}

struct Allpass {
    line: DelayLine,
    gain: f32,
}

impl Allpass {
    fn new(len: usize, gain: f32) -> Self {
        Self {
            line: DelayLine::new(len),
            gain,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let delayed = self.line.read();
        let y = -self.gain * x + delayed;
        self.line.write_advance(x + self.gain * y);
        y
    }
}

pub struct Reverb {
    pub decay: f32,
    pub damping: f32,
    pub wet_gain: f32,
    pub diffusion: f32,
    lines: Vec<DelayLine>,
    damp_state: Vec<f32>,
    allpasses: Vec<Allpass>,
    sample_rate: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32, decay: f32, damping: f32, wet_gain: f32) -> Self {
        let lines = BASE_DELAYS_MS
            .iter()
            .map(|&ms| DelayLine::new(((ms / 1000.0) * sample_rate) as usize + 1))
            .collect();
        let allpasses = ALLPASS_MS
            .iter()
            .map(|&ms| Allpass::new(((ms / 1000.0) * sample_rate) as usize + 1, 0.6))
            .collect();
        Self {
            decay,
            damping,
            wet_gain,
            diffusion: 0.6,
            lines,
            damp_state: vec![0.0; LINES],
            allpasses,
            sample_rate,
        }
    }
}

impl Effect for Reverb {
    fn device_update(&mut self, sample_rate: f32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.lines = BASE_DELAYS_MS
            .iter()
            .map(|&ms| DelayLine::new(((ms / 1000.0) * sample_rate) as usize + 1))
            .collect();
        self.allpasses = ALLPASS_MS
            .iter()
            .map(|&ms| Allpass::new(((ms / 1000.0) * sample_rate) as usize + 1, 0.6))
            .collect();
        self.damp_state = vec![0.0; LINES];
    }

    fn update(&mut self, params: &EffectParams) {
        if let EffectParams::Reverb { decay, damping, wet_gain, diffusion } = *params {
            self.decay = decay;
            self.damping = damping;
            self.wet_gain = wet_gain;
            self.diffusion = diffusion;
        }
    }

    fn process(&mut self, buf: &mut [f32], _sample_rate: f32) {
        for sample in buf.iter_mut() {
            let mut diffused = *sample;
            for ap in self.allpasses.iter_mut() {
                diffused = ap.process(diffused);
            }

            let mut sum = 0.0f32;
            for line in &self.lines {
                sum += line.read();
            }
            let feedback_input = diffused + sum / LINES as f32 * 0.2;

            let mut out = 0.0f32;
            for (i, line) in self.lines.iter_mut().enumerate() {
                let delayed = line.read();
                out += delayed;
                self.damp_state[i] =
                    flush_denormal(self.damp_state[i] + (1.0 - self.damping) * (delayed - self.damp_state[i]));
                line.write_advance(flush_denormal(feedback_input * self.decay + self.damp_state[i] * (1.0 - self.damping)));
            }
            *sample = *sample * (1.0 - self.wet_gain) + (out / LINES as f32) * self.wet_gain;
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.buffer.iter_mut().for_each(|s| *s = 0.0);
        }
        self.damp_state.iter_mut().for_each(|s| *s = 0.0);
        for ap in &mut self.allpasses {
            ap.line.buffer.iter_mut().for_each(|s| *s = 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_response_decays_without_blowing_up() {
        let mut reverb = Reverb::new(44100.0, 0.5, 0.3, 0.5);
        let mut buf = vec![0.0f32; 4410];
        buf[0] = 1.0;
        reverb.process(&mut buf, 44100.0);
        assert!(buf.iter().all(|s| s.is_finite()));
        let tail_energy: f32 = buf[4000..].iter().map(|x| x * x).sum();
        let head_energy: f32 = buf[..100].iter().map(|x| x * x).sum();
        assert!(tail_energy < head_energy * 100.0);
    }

    #[test]
    fn reset_silences_tail() {
        let mut reverb = Reverb::new(44100.0, 0.5, 0.3, 0.5);
        let mut buf = vec![0.0f32; 1000];
        buf[0] = 1.0;
        reverb.process(&mut buf, 44100.0);
        reverb.reset();
        let mut silence = vec![0.0f32; 1000];
        reverb.process(&mut silence, 44100.0);
        let energy: f32 = silence.iter().map(|x| x * x).sum();
        assert!(energy < 1.0e-6);
    }
}
