//! Pitch shifter: STFT phase vocoder, 1024-sample windows at 4x overlap,
//! built on `realfft`/`rustfft` (already part of the dependency stack for
//! the biquad response analysis and resampler tables).

use realfft::RealFftPlanner;
use rustfft::num_complex::Complex32;

use super::{Effect, EffectParams};

const FFT_SIZE: usize = 1024;
const OVERLAP: usize = 4;
const HOP_SIZE: usize = FFT_SIZE / OVERLAP;

fn hann_window() -> Vec<f32> {
    (0..FFT_SIZE)
        .map(|i| 0.5 * (1.0 - (std::f32::consts::TAU * i as f32 / FFT_SIZE as f32).cos()))
        .collect()
}

/// Fixed processing delay introduced by buffering a full analysis window
/// before the first frame can be synthesized.
pub const LATENCY_SAMPLES: usize = FFT_SIZE;

pub struct PitchShifter {
    pub semitones: f32,
    window: Vec<f32>,
    input_ring: Vec<f32>,
    write_pos: usize,
    hop_counter: usize,
    /// Overlap-add accumulator, long enough to hold one analysis frame's
    /// worth of future contributions past the current read cursor.
    output_ring: Vec<f32>,
    read_pos: usize,
    last_phase: Vec<f32>,
    sum_phase: Vec<f32>,
    forward: std::sync::Arc<dyn realfft::RealToComplex<f32>>,
    inverse: std::sync::Arc<dyn realfft::ComplexToReal<f32>>,
}

impl PitchShifter {
    pub fn new(semitones: f32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(FFT_SIZE);
        let inverse = planner.plan_fft_inverse(FFT_SIZE);
        let bins = FFT_SIZE / 2 + 1;
        Self {
            semitones,
            window: hann_window(),
            input_ring: vec![0.0; FFT_SIZE],
            write_pos: 0,
            hop_counter: 0,
            output_ring: vec![0.0; FFT_SIZE],
            read_pos: 0,
            last_phase: vec![0.0; bins],
            sum_phase: vec![0.0; bins],
            forward,
            inverse,
        }
    }

    fn ratio(&self) -> f32 {
        2.0f32.powf(self.semitones / 12.0)
    }

    /// Analyze the current windowed content of `input_ring` (oldest sample
    /// at `write_pos`) and overlap-add the phase-vocoded resynthesis into
    /// `output_ring` starting `HOP_SIZE` samples ahead of `read_pos`.
    fn synthesize_frame(&mut self) {
        let mut time_domain: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                let idx = (self.write_pos + i) % FFT_SIZE;
                self.input_ring[idx] * self.window[i]
            })
            .collect();

        let mut spectrum = self.forward.make_output_vec();
        if self.forward.process(&mut time_domain, &mut spectrum).is_err() {
            return;
        }

        let ratio = self.ratio();
        let bins = spectrum.len();
        let expected_phase_inc = std::f32::consts::TAU * HOP_SIZE as f32 / FFT_SIZE as f32;

        let mut true_freq = vec![0.0f32; bins];
        let mut magnitude = vec![0.0f32; bins];
        for (k, bin) in spectrum.iter().enumerate() {
            magnitude[k] = bin.norm();
            let phase = bin.arg();
            let bin_center = expected_phase_inc * k as f32;
            let mut delta = phase - self.last_phase[k] - bin_center;
            delta -= std::f32::consts::TAU * (delta / std::f32::consts::TAU).round();
            true_freq[k] = bin_center + delta;
            self.last_phase[k] = phase;
        }

        let mut shifted = vec![Complex32::new(0.0, 0.0); bins];
        for k in 0..bins {
            let src_bin = (k as f32 / ratio).round() as usize;
            if src_bin < bins {
                self.sum_phase[k] += true_freq[src_bin] * ratio;
                shifted[k] = Complex32::from_polar(magnitude[src_bin], self.sum_phase[k]);
            }
        }

        let mut resynthesized = self.inverse.make_output_vec();
        if self.inverse.process(&mut shifted, &mut resynthesized).is_err() {
            return;
        }
        // realfft's inverse transform is unnormalized; scale by 1/N, and by
        // the synthesis window again so overlap-add at 4x hops sums to the
        // constant-gain Hann-squared overlap total.
        let norm = 1.0 / FFT_SIZE as f32;
        for i in 0..FFT_SIZE {
            let out_idx = (self.read_pos + HOP_SIZE * (OVERLAP - 1) + i) % self.output_ring.len();
            self.output_ring[out_idx] += resynthesized[i] * norm * self.window[i];
        }
    }
}

impl Effect for PitchShifter {
    fn device_update(&mut self, _sample_rate: f32) {}

    fn update(&mut self, params: &EffectParams) {
        if let EffectParams::PitchShifter { semitones } = *params {
            self.semitones = semitones;
        }
    }

    fn process(&mut self, buf: &mut [f32], _sample_rate: f32) {
        for sample in buf.iter_mut() {
            self.input_ring[self.write_pos] = *sample;
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;
            self.hop_counter += 1;
            if self.hop_counter >= HOP_SIZE {
                self.hop_counter = 0;
                self.synthesize_frame();
            }

            *sample = self.output_ring[self.read_pos];
            self.output_ring[self.read_pos] = 0.0;
            self.read_pos = (self.read_pos + 1) % self.output_ring.len();
        }
    }

    fn reset(&mut self) {
        self.input_ring.iter_mut().for_each(|s| *s = 0.0);
        self.output_ring.iter_mut().for_each(|s| *s = 0.0);
        self.last_phase.iter_mut().for_each(|s| *s = 0.0);
        self.sum_phase.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.read_pos = 0;
        self.hop_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_semitones_gives_unity_ratio() {
        let shifter = PitchShifter::new(0.0);
        assert!((shifter.ratio() - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn octave_up_doubles_ratio() {
        let shifter = PitchShifter::new(12.0);
        assert!((shifter.ratio() - 2.0).abs() < 1.0e-4);
    }

    #[test]
    fn unity_ratio_preserves_signal_energy_after_latency() {
        let mut shifter = PitchShifter::new(0.0);
        let n = FFT_SIZE * 6;
        let input: Vec<f32> = (0..n)
            .map(|i| (std::f32::consts::TAU * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let mut out = input.clone();
        shifter.process(&mut out, 44100.0);

        let tail = LATENCY_SAMPLES * 2;
        let in_energy: f32 = input[tail..].iter().map(|x| x * x).sum();
        let out_energy: f32 = out[tail..].iter().map(|x| x * x).sum();
        assert!(out_energy > in_energy * 0.25 && out_energy < in_energy * 4.0);
    }

    #[test]
    fn process_does_not_panic_across_many_slices() {
        let mut shifter = PitchShifter::new(3.0);
        let mut buf = vec![0.1_f32; 512];
        for _ in 0..8 {
            shifter.process(&mut buf, 44100.0);
        }
        assert!(buf.iter().all(|s| s.is_finite()));
    }
}
