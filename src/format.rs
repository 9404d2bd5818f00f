//! Device format converter (C9).
//!
//! Channel remap to the device's speaker layout, rate conversion reusing
//! the C2 resampler kernels (stateful per direction, zero-padded before the
//! first slice), and quantization to the device sample type with
//! triangular-PDF dither and saturating, round-to-nearest-even rounding.

use crate::resampler::{ResamplerKind, ResamplerState, MAX_RESAMPLE_PADDING};

/// Device sample storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    S8,
    S16,
    S32,
    F32,
}

impl SampleType {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::U8 | SampleType::S8 => 1,
            SampleType::S16 => 2,
            SampleType::S32 | SampleType::F32 => 4,
        }
    }
}

/// WFX speaker channel layout, in canonical wire order
/// (L R C LFE Bl Br Sl Sr).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Quad,
    Surround51,
    Surround51Rear,
    Surround51Side,
    Surround61,
    Surround71,
    AmbisonicFirstOrder,
    BinauralStereo,
}

impl ChannelLayout {
    pub fn channel_count(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo | ChannelLayout::BinauralStereo => 2,
            ChannelLayout::Quad => 4,
            ChannelLayout::Surround51
            | ChannelLayout::Surround51Rear
            | ChannelLayout::Surround51Side => 6,
            ChannelLayout::Surround61 => 7,
            ChannelLayout::Surround71 => 8,
            ChannelLayout::AmbisonicFirstOrder => 4,
        }
    }

    /// Index of the LFE channel in this layout's canonical wire order, if any.
    pub fn lfe_index(self) -> Option<usize> {
        match self {
            ChannelLayout::Surround51
            | ChannelLayout::Surround51Rear
            | ChannelLayout::Surround51Side
            | ChannelLayout::Surround61
            | ChannelLayout::Surround71 => Some(3),
            _ => None,
        }
    }
}

/// ITU-style downmix coefficient matrices (row = output channel, column =
/// input channel), used to remap between standard speaker layouts.
pub fn downmix_matrix(from: ChannelLayout, to: ChannelLayout) -> Option<Vec<Vec<f32>>> {
    const ITU_CENTER: f32 = std::f32::consts::FRAC_1_SQRT_2;
    match (from, to) {
        (ChannelLayout::Mono, ChannelLayout::Stereo) => Some(vec![vec![1.0], vec![1.0]]),
        (ChannelLayout::Stereo, ChannelLayout::Mono) => {
            Some(vec![vec![0.707_106_8, 0.707_106_8]])
        }
        (ChannelLayout::Quad, ChannelLayout::Stereo) => Some(vec![
            vec![1.0, 0.0, 0.707_106_8, 0.0],
            vec![0.0, 1.0, 0.0, 0.707_106_8],
        ]),
        (ChannelLayout::Surround51, ChannelLayout::Stereo) => Some(vec![
            vec![1.0, 0.0, ITU_CENTER, 0.0, 0.707_106_8, 0.0],
            vec![0.0, 1.0, ITU_CENTER, 0.0, 0.0, 0.707_106_8],
        ]),
        (ChannelLayout::Surround71, ChannelLayout::Stereo) => Some(vec![
            vec![
                1.0,
                0.0,
                ITU_CENTER,
                0.0,
                0.707_106_8,
                0.0,
                0.707_106_8,
                0.0,
            ],
            vec![
                0.0,
                1.0,
                ITU_CENTER,
                0.0,
                0.0,
                0.707_106_8,
                0.0,
                0.707_106_8,
            ],
        ]),
        (a, b) if a == b => {
            let n = a.channel_count();
            Some((0..n).map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect()).collect())
        }
        _ => None,
    }
}

/// Stateful rate converter, one per direction, reusing the C2 kernels.
pub struct RateConverter {
    resampler: ResamplerState,
    history: Vec<f32>,
    frac: u32,
}

impl RateConverter {
    pub fn new(kind: ResamplerKind) -> Self {
        Self {
            resampler: ResamplerState::new(kind),
            history: vec![0.0; MAX_RESAMPLE_PADDING * 2],
            frac: 0,
        }
    }

    /// Convert `src` (at the source rate) to `dst.len()` samples at the
    /// target rate, where `increment` (1/FRACTIONONE units) encodes the
    /// rate ratio. Padding before the first slice is zero-filled, matching
    /// the resampler's history convention.
    pub fn convert(&mut self, src: &[f32], increment: u32, dst: &mut [f32]) {
        let hist_len = self.history.len();
        let padded: Vec<f32> = self
            .history
            .iter()
            .copied()
            .chain(src.iter().copied())
            .collect();
        // The cursor starts at the boundary between history and fresh
        // input, i.e. index `hist_len` in `padded`.
        self.resampler.resample(&padded, hist_len, self.frac, increment, dst);

        let total_frac = self.frac as u64 + increment as u64 * dst.len() as u64;
        self.frac = (total_frac & (crate::resampler::FRACTIONMASK as u64)) as u32;
        let consumed = (total_frac >> crate::resampler::FRACTIONBITS) as usize;

        // Carry forward the last `hist_len` samples actually consumed (or
        // read as padding) so the next call's history lines up.
        let end = hist_len + consumed.min(src.len());
        let start = end.saturating_sub(hist_len);
        for (i, slot) in self.history.iter_mut().enumerate() {
            let idx = start + i;
            *slot = padded.get(idx).copied().unwrap_or(0.0);
        }
    }
}

/// Triangular-PDF dither generator (sum of two uniform deviates), reused
/// across quantization calls so successive samples get decorrelated noise.
pub struct Ditherer {
    state: u32,
}

impl Ditherer {
    pub fn new(seed: u32) -> Self {
        Self { state: seed | 1 }
    }

    #[inline]
    fn next_uniform(&mut self) -> f32 {
        // xorshift32.
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 5;
        (self.state as f32 / u32::MAX as f32) - 0.5
    }

    #[inline]
    pub fn next_triangular(&mut self) -> f32 {
        self.next_uniform() + self.next_uniform()
    }
}

/// Quantize an f32 sample in `[-1, 1]` to the target sample type, with
/// saturating clip and truncating round-to-nearest-even, adding half-range
/// bias for unsigned types.
pub fn quantize(sample: f32, sample_type: SampleType, dither: &mut Ditherer) -> i64 {
    let dithered = match sample_type {
        SampleType::S16 => sample + dither.next_triangular() / 32768.0,
        SampleType::S32 => sample + dither.next_triangular() / (i32::MAX as f32),
        SampleType::S8 | SampleType::U8 => sample + dither.next_triangular() / 128.0,
        SampleType::F32 => sample,
    };
    let clamped = dithered.clamp(-1.0, 1.0);
    match sample_type {
        SampleType::F32 => clamped.to_bits() as i64,
        SampleType::S16 => round_even(clamped * 32767.0) as i64,
        SampleType::S32 => round_even(clamped * (i32::MAX as f32)) as i64,
        SampleType::S8 => round_even(clamped * 127.0) as i64,
        SampleType::U8 => (round_even(clamped * 127.0) as i64) + 128,
    }
}

#[inline]
fn round_even(x: f32) -> f32 {
    // Round-half-to-even ("banker's rounding"), matching f32::round_ties_even
    // semantics without requiring a newer Rust edition.
    let floor = x.floor();
    let diff = x - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_to_s16_roundtrip_within_tolerance() {
        let mut dither = Ditherer::new(1);
        for &s in &[-1.0_f32, -0.5, 0.0, 0.25, 0.999] {
            let q = quantize(s, SampleType::S16, &mut dither);
            let back = q as f32 / 32767.0;
            // Dither adds sub-LSB noise, so allow a slightly wider window
            // than the bare 1/32767 quantization step.
            assert!((back - s).abs() < 2.0 / 32767.0, "{s} -> {back}");
        }
    }

    #[test]
    fn clipping_saturates() {
        let mut dither = Ditherer::new(2);
        let q = quantize(5.0, SampleType::S16, &mut dither);
        assert_eq!(q, 32767);
        let q = quantize(-5.0, SampleType::S16, &mut dither);
        assert_eq!(q, -32767);
    }

    #[test]
    fn mono_to_stereo_is_equal_gain_duplicate() {
        let matrix = downmix_matrix(ChannelLayout::Mono, ChannelLayout::Stereo).unwrap();
        assert_eq!(matrix[0][0], 1.0);
        assert_eq!(matrix[1][0], 1.0);
    }

    #[test]
    fn round_even_ties_go_to_even() {
        assert_eq!(round_even(0.5), 0.0);
        assert_eq!(round_even(1.5), 2.0);
        assert_eq!(round_even(2.5), 2.0);
    }
}
