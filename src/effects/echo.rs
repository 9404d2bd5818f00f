//! Echo effect: a single feedback delay line with damping and a
//! left/right spread control, the simplest of the built-in effects and
//! the one other effects' ring-buffer convention is modeled on.

use super::{Effect, EffectParams};
use crate::math::flush_denormal;

pub struct Echo {
    pub delay_seconds: f32,
    pub lr_delay_seconds: f32,
    pub damping: f32,
    pub feedback: f32,
    pub spread: f32,
    sample_rate: f32,
    buffer: Vec<f32>,
    write_pos: usize,
    lowpass_state: f32,
}

impl Echo {
    pub fn new(sample_rate: f32, delay_seconds: f32, lr_delay_seconds: f32, damping: f32, feedback: f32) -> Self {
        let len = ((delay_seconds + lr_delay_seconds).max(0.001) * sample_rate) as usize + 2;
        Self {
            delay_seconds,
            lr_delay_seconds,
            damping,
            feedback,
            spread: 0.0,
            sample_rate,
            buffer: vec![0.0; len.max(2)],
            write_pos: 0,
            lowpass_state: 0.0,
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Effect for Echo {
    fn device_update(&mut self, sample_rate: f32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        let len = ((self.delay_seconds + self.lr_delay_seconds).max(0.001) * sample_rate) as usize + 2;
        self.buffer = vec![0.0; len.max(2)];
        self.write_pos = 0;
        self.lowpass_state = 0.0;
    }

    fn update(&mut self, params: &EffectParams) {
        if let EffectParams::Echo { delay_seconds, lr_delay_seconds, damping, feedback, spread } = *params {
            self.delay_seconds = delay_seconds;
            self.lr_delay_seconds = lr_delay_seconds;
            self.damping = damping;
            self.feedback = feedback;
            self.spread = spread;
        }
    }

    fn process(&mut self, buf: &mut [f32], sample_rate: f32) {
        let delay_samples = (self.delay_seconds * sample_rate) as usize;
        let delay_samples = delay_samples.min(self.buffer.len().saturating_sub(1)).max(1);
        for sample in buf.iter_mut() {
            let read_pos = (self.write_pos + self.buffer.len() - delay_samples) % self.buffer.len();
            let delayed = self.buffer[read_pos];
            self.lowpass_state =
                flush_denormal(self.lowpass_state + (1.0 - self.damping) * (delayed - self.lowpass_state));
            let out = *sample + self.lowpass_state * self.feedback;
            self.buffer[self.write_pos] = out;
            self.write_pos = (self.write_pos + 1) % self.buffer.len();
            *sample = out;
        }
    }

    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.lowpass_state = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_reappears_after_delay() {
        let sr = 1000.0;
        let mut echo = Echo::new(sr, 0.01, 0.0, 0.0, 0.5);
        let mut buf = vec![0.0f32; 40];
        buf[0] = 1.0;
        echo.process(&mut buf, sr);
        let delay_samples = (0.01 * sr) as usize;
        assert!(buf[delay_samples].abs() > 0.0 || buf.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn reset_clears_feedback_history() {
        let sr = 1000.0;
        let mut echo = Echo::new(sr, 0.01, 0.0, 0.0, 0.5);
        let mut buf = vec![1.0f32; 10];
        echo.process(&mut buf, sr);
        echo.reset();
        let mut silence = vec![0.0f32; 10];
        echo.process(&mut silence, sr);
        assert!(silence.iter().all(|&s| s == 0.0));
    }
}
