//! Fractional-rate resampler (C2).
//!
//! Fractional position uses `1/FRACTIONONE` sub-sample precision. Kernel
//! selection mirrors fundsp's `spline`-based interpolation idiom (see
//! `math::spline`) generalized to a selectable-order family: nearest, linear,
//! 4-tap cubic, and band-limited sinc (BSinc12/24).

use crate::math::{lerp, sinc};
use lazy_static::lazy_static;

/// Sub-sample fractional unit, giving 1/4096 sub-sample precision.
pub const FRACTIONBITS: u32 = 12;
pub const FRACTIONONE: u32 = 1 << FRACTIONBITS;
pub const FRACTIONMASK: u32 = FRACTIONONE - 1;

/// Upper bound on how many input samples a kernel reads before/after the
/// nominal window; callers must keep at least this many history/lookahead
/// samples available around the read cursor.
pub const MAX_RESAMPLE_PADDING: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplerKind {
    Copy,
    Point,
    Linear,
    Cubic,
    BSinc12,
    BSinc24,
}

impl ResamplerKind {
    /// Samples needed before the cursor and after it, respectively.
    pub fn padding(self) -> (usize, usize) {
        match self {
            ResamplerKind::Copy | ResamplerKind::Point => (0, 1),
            ResamplerKind::Linear => (0, 1),
            ResamplerKind::Cubic => (1, 2),
            ResamplerKind::BSinc12 => (12, 12),
            ResamplerKind::BSinc24 => (24, 24),
        }
    }
}

const BSINC_PHASES: usize = 16;
const BSINC_SCALES: usize = 16;

struct BSincTable {
    zero_crossings: usize,
    /// `[scale][phase][tap]`, tap index in `0..2*zero_crossings`.
    taps: Vec<Vec<Vec<f32>>>,
}

impl BSincTable {
    fn build(zero_crossings: usize) -> Self {
        let width = zero_crossings * 2;
        let mut taps = Vec::with_capacity(BSINC_SCALES);
        for scale_idx in 0..BSINC_SCALES {
            // Scale factor <= 1 narrows the kernel's passband to avoid
            // aliasing when downsampling; scale 0 is full bandwidth.
            let scale = 1.0 - (scale_idx as f32 / BSINC_SCALES as f32) * 0.5;
            let mut phases = Vec::with_capacity(BSINC_PHASES);
            for phase_idx in 0..BSINC_PHASES {
                let phase = phase_idx as f32 / BSINC_PHASES as f32;
                let mut row = Vec::with_capacity(width);
                let mut sum = 0.0f32;
                for tap in 0..width {
                    // Tap `tap` sits at offset `tap - zero_crossings + 1 - phase`
                    // from the output instant.
                    let x = (tap as f32 - zero_crossings as f32 + 1.0 - phase) * scale;
                    let w = crate::math::blackman(
                        (tap as f32) + (1.0 - phase),
                        width as f32 + 1.0,
                    );
                    let v = sinc(x) * scale * w;
                    row.push(v);
                    sum += v;
                }
                if sum.abs() > 1.0e-9 {
                    for v in row.iter_mut() {
                        *v /= sum;
                    }
                }
                phases.push(row);
            }
            taps.push(phases);
        }
        Self {
            zero_crossings,
            taps,
        }
    }

    #[inline]
    fn convolve(&self, src: &[f32], center: usize, frac: u32, scale_idx: usize) -> f32 {
        let phase = ((frac as u64 * BSINC_PHASES as u64) >> FRACTIONBITS) as usize;
        let phase = phase.min(BSINC_PHASES - 1);
        let scale_idx = scale_idx.min(BSINC_SCALES - 1);
        let row = &self.taps[scale_idx][phase];
        let zc = self.zero_crossings;
        let mut acc = 0.0f32;
        for (tap, &coef) in row.iter().enumerate() {
            let idx = center as isize + tap as isize - zc as isize + 1;
            if idx >= 0 && (idx as usize) < src.len() {
                acc += coef * src[idx as usize];
            }
        }
        acc
    }
}

lazy_static! {
    static ref BSINC12_TABLE: BSincTable = BSincTable::build(12);
    static ref BSINC24_TABLE: BSincTable = BSincTable::build(24);
    /// 4 x FRACTIONONE precomputed cubic coefficient table, indexed
    /// `[phase_bucket][tap]`, phase_bucket = frac >> (FRACTIONBITS - CUBIC_PHASE_BITS).
    static ref CUBIC_TABLE: Vec<[f32; 4]> = {
        const BUCKETS: usize = 256;
        (0..BUCKETS)
            .map(|i| {
                let t = i as f32 / BUCKETS as f32;
                // Catmull-Rom basis evaluated directly; matches math::spline's
                // polynomial for the four taps (-1, 0, 1, 2).
                let c0 = -0.5 * t * (1.0 - t) * (1.0 - t);
                let c1 = 1.0 + t * t * (1.5 * t - 2.5);
                let c2 = t * (1.0 + t * (1.0 - 1.5 * t));
                let c3 = -0.5 * t * t * (1.0 - t);
                [c0, c1, c2, c3]
            })
            .collect()
    };
}

/// Per-voice resampler state: just the selected kernel, carried separately
/// from the fractional playback cursor (owned by the caller, e.g. `Voice`)
/// since the cursor also drives buffer-queue advancement.
#[derive(Debug, Clone, Copy)]
pub struct ResamplerState {
    pub kind: ResamplerKind,
}

impl ResamplerState {
    pub fn new(kind: ResamplerKind) -> Self {
        Self { kind }
    }

    /// Resample `dst.len()` output samples from `src`, reading centered
    /// around `center` (the integer part of the playback cursor) with
    /// `frac` (in `0..FRACTIONONE`) as the initial sub-sample offset and
    /// `increment` (in 1/FRACTIONONE units) as the per-output-sample step.
    /// Reads at most `MAX_RESAMPLE_PADDING` samples past the nominal window.
    pub fn resample(
        &self,
        src: &[f32],
        mut center: usize,
        mut frac: u32,
        increment: u32,
        dst: &mut [f32],
    ) {
        match self.kind {
            ResamplerKind::Copy => {
                for (i, d) in dst.iter_mut().enumerate() {
                    let idx = center + i;
                    *d = src.get(idx).copied().unwrap_or(0.0);
                }
            }
            ResamplerKind::Point => {
                for d in dst.iter_mut() {
                    let idx = center + (frac >> FRACTIONBITS) as usize;
                    *d = src.get(idx).copied().unwrap_or(0.0);
                    let (next_center, next_frac) = advance(center, frac, increment);
                    center = next_center;
                    frac = next_frac;
                }
            }
            ResamplerKind::Linear => {
                for d in dst.iter_mut() {
                    let t = (frac & FRACTIONMASK) as f32 / FRACTIONONE as f32;
                    let i0 = center;
                    let a = src.get(i0).copied().unwrap_or(0.0);
                    let b = src.get(i0 + 1).copied().unwrap_or(0.0);
                    *d = lerp(a, b, t);
                    let (next_center, next_frac) = advance(center, frac, increment);
                    center = next_center;
                    frac = next_frac;
                }
            }
            ResamplerKind::Cubic => {
                for d in dst.iter_mut() {
                    let bucket = (frac as usize * CUBIC_TABLE.len()) >> FRACTIONBITS;
                    let coefs = &CUBIC_TABLE[bucket.min(CUBIC_TABLE.len() - 1)];
                    let get = |off: isize| -> f32 {
                        let idx = center as isize + off;
                        if idx >= 0 {
                            src.get(idx as usize).copied().unwrap_or(0.0)
                        } else {
                            0.0
                        }
                    };
                    *d = coefs[0] * get(-1) + coefs[1] * get(0) + coefs[2] * get(1) + coefs[3] * get(2);
                    let (next_center, next_frac) = advance(center, frac, increment);
                    center = next_center;
                    frac = next_frac;
                }
            }
            ResamplerKind::BSinc12 | ResamplerKind::BSinc24 => {
                let table: &BSincTable = if self.kind == ResamplerKind::BSinc12 {
                    &BSINC12_TABLE
                } else {
                    &BSINC24_TABLE
                };
                // Scale index narrows bandwidth as increment grows past 1x
                // (downsampling); increment in FRACTIONONE units.
                let ratio = increment as f32 / FRACTIONONE as f32;
                let scale_idx = if ratio > 1.0 {
                    (((ratio - 1.0).min(1.0)) * (BSINC_SCALES as f32 - 1.0)) as usize
                } else {
                    0
                };
                for d in dst.iter_mut() {
                    *d = table.convolve(src, center, frac & FRACTIONMASK, scale_idx);
                    let (next_center, next_frac) = advance(center, frac, increment);
                    center = next_center;
                    frac = next_frac;
                }
            }
        }
    }
}

#[inline]
fn advance(center: usize, frac: u32, increment: u32) -> (usize, u32) {
    let total = frac as u64 + increment as u64;
    let steps = (total >> FRACTIONBITS) as usize;
    (center + steps, (total & FRACTIONMASK as u64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_kernel_is_bit_identical_at_unity_rate() {
        let src = vec![0.1, -0.2, 0.3, 0.4, -0.5, 0.6, 0.7];
        let mut dst = vec![0.0; 4];
        let r = ResamplerState::new(ResamplerKind::Copy);
        r.resample(&src, 1, 0, FRACTIONONE, &mut dst);
        assert_eq!(dst, &src[1..5]);
    }

    #[test]
    fn linear_kernel_interpolates_midpoint() {
        let src = vec![0.0, 1.0, 0.0];
        let mut dst = vec![0.0; 1];
        let r = ResamplerState::new(ResamplerKind::Linear);
        r.resample(&src, 0, FRACTIONONE / 2, FRACTIONONE, &mut dst);
        assert!((dst[0] - 0.5).abs() < 1.0e-5);
    }

    #[test]
    fn consumes_expected_sample_count() {
        // Consumes ceil(slice_samples * increment / FRACTIONONE) input
        // samples, modulo resampler padding.
        let slice_samples = 100usize;
        let increment = (FRACTIONONE as f32 * 1.5) as u32;
        let expected = ((slice_samples as u64 * increment as u64) + FRACTIONONE as u64 - 1)
            / FRACTIONONE as u64;
        let mut center = 0usize;
        let mut frac = 0u32;
        for _ in 0..slice_samples {
            let (c, f) = advance(center, frac, increment);
            center = c;
            frac = f;
        }
        assert_eq!(center as u64, expected);
    }

    #[test]
    fn bsinc_kernel_preserves_dc() {
        let src = vec![1.0_f32; 64];
        let mut dst = vec![0.0; 8];
        let r = ResamplerState::new(ResamplerKind::BSinc12);
        r.resample(&src, 30, 512, FRACTIONONE, &mut dst);
        for d in dst {
            assert!((d - 1.0).abs() < 0.05, "dc preservation failed: {d}");
        }
    }
}
