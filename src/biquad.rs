//! Biquad filters (C1).
//!
//! Direct-form-I IIR, transfer function
//! `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`,
//! coefficients from the "Audio EQ Cookbook" forms. State is the minimal
//! `{x1, x2, y1, y2}` history, matching fundsp's `Biquad` node layout.

use crate::math::*;

/// Filter response shape passed to [`BiquadCoefs::set_params`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowShelf,
    HighShelf,
    Peaking,
    LowPass,
    HighPass,
    BandPass,
}

/// Biquad coefficients in normalized direct-form-I (a0 folded to 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoefs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefs {
    pub const IDENTITY: BiquadCoefs = BiquadCoefs {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Compute 1/Q from a shelf slope. `slope` in `(0, 1]`; `gain` is the
    /// linear (non-shelf-halved) gain the shelf will apply.
    pub fn rcp_q_from_slope(gain: f32, slope: f32) -> f32 {
        let slope = slope.max(1.0e-6);
        let a = gain.max(1.0e-6).sqrt();
        ((a + 1.0 / a) * (1.0 / slope - 1.0) + 2.0).sqrt()
    }

    /// Compute 1/Q from a bandwidth in octaves, for Peaking/BandPass.
    pub fn rcp_q_from_bandwidth(f: f32, bandwidth_octaves: f32) -> f32 {
        let w0 = std::f32::consts::TAU * f;
        2.0 * (std::f32::consts::LN_2 / 2.0 * bandwidth_octaves * w0 / w0.sin()).sinh()
    }

    /// Cookbook coefficient derivation.
    ///
    /// - `kind`: filter shape.
    /// - `gain`: linear gain. For shelves the gain applies at the reference
    ///   frequency; the cookbook form folds `sqrt(gain)` internally so the
    ///   *caller-specified* gain is the actual shelf-band gain, not the
    ///   `gain^0.5`-substituted form found in some other cookbook variants.
    /// - `f`: normalized frequency `fref / fs` in `(0, 0.5)`.
    /// - `rcp_q`: `1/Q`.
    pub fn set_params(kind: FilterKind, gain: f32, f: f32, rcp_q: f32) -> BiquadCoefs {
        let f = clamp(1.0e-6, 0.4999, f);
        let w0 = std::f32::consts::TAU * f;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 * rcp_q * 0.5;

        match kind {
            FilterKind::LowPass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 * 0.5;
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                normalize(b0, b1, b2, a0, a1, a2)
            }
            FilterKind::HighPass => {
                let b0 = (1.0 + cos_w0) * 0.5;
                let b1 = -(1.0 + cos_w0);
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                normalize(b0, b1, b2, a0, a1, a2)
            }
            FilterKind::BandPass => {
                let b0 = alpha;
                let b1 = 0.0;
                let b2 = -alpha;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                normalize(b0, b1, b2, a0, a1, a2)
            }
            FilterKind::Peaking => {
                let a_gain = gain.max(1.0e-6).sqrt();
                let b0 = 1.0 + alpha * a_gain;
                let b1 = -2.0 * cos_w0;
                let b2 = 1.0 - alpha * a_gain;
                let a0 = 1.0 + alpha / a_gain;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha / a_gain;
                normalize(b0, b1, b2, a0, a1, a2)
            }
            FilterKind::LowShelf => {
                let a_gain = gain.max(1.0e-6).sqrt();
                let two_sqrt_a_alpha = 2.0 * a_gain.sqrt() * alpha;
                let b0 = a_gain * ((a_gain + 1.0) - (a_gain - 1.0) * cos_w0 + two_sqrt_a_alpha);
                let b1 = 2.0 * a_gain * ((a_gain - 1.0) - (a_gain + 1.0) * cos_w0);
                let b2 = a_gain * ((a_gain + 1.0) - (a_gain - 1.0) * cos_w0 - two_sqrt_a_alpha);
                let a0 = (a_gain + 1.0) + (a_gain - 1.0) * cos_w0 + two_sqrt_a_alpha;
                let a1 = -2.0 * ((a_gain - 1.0) + (a_gain + 1.0) * cos_w0);
                let a2 = (a_gain + 1.0) + (a_gain - 1.0) * cos_w0 - two_sqrt_a_alpha;
                normalize(b0, b1, b2, a0, a1, a2)
            }
            FilterKind::HighShelf => {
                let a_gain = gain.max(1.0e-6).sqrt();
                let two_sqrt_a_alpha = 2.0 * a_gain.sqrt() * alpha;
                let b0 = a_gain * ((a_gain + 1.0) + (a_gain - 1.0) * cos_w0 + two_sqrt_a_alpha);
                let b1 = -2.0 * a_gain * ((a_gain - 1.0) + (a_gain + 1.0) * cos_w0);
                let b2 = a_gain * ((a_gain + 1.0) + (a_gain - 1.0) * cos_w0 - two_sqrt_a_alpha);
                let a0 = (a_gain + 1.0) - (a_gain - 1.0) * cos_w0 + two_sqrt_a_alpha;
                let a1 = 2.0 * ((a_gain - 1.0) - (a_gain + 1.0) * cos_w0);
                let a2 = (a_gain + 1.0) - (a_gain - 1.0) * cos_w0 - two_sqrt_a_alpha;
                normalize(b0, b1, b2, a0, a1, a2)
            }
        }
    }

    /// Continuous-time-equivalent frequency response at `omega` (fraction
    /// of sampling rate), used by transparency tests.
    pub fn response(&self, omega: f64) -> num_complex::Complex64 {
        use num_complex::Complex64;
        let z1 = Complex64::from_polar(1.0, -std::f64::consts::TAU * omega);
        let z2 = z1 * z1;
        let re = |x: f32| Complex64::new(x as f64, 0.0);
        (re(self.b0) + re(self.b1) * z1 + re(self.b2) * z2)
            / (Complex64::new(1.0, 0.0) + re(self.a1) * z1 + re(self.a2) * z2)
    }
}

#[inline]
fn normalize(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> BiquadCoefs {
    let rcp_a0 = 1.0 / a0;
    BiquadCoefs {
        b0: b0 * rcp_a0,
        b1: b1 * rcp_a0,
        b2: b2 * rcp_a0,
        a1: a1 * rcp_a0,
        a2: a2 * rcp_a0,
    }
}

/// Per-channel biquad state. `process`/`process_one` implement
/// `y[n] = b0 x[n] + b1 x[n-1] + b2 x[n-2] - a1 y[n-1] - a2 y[n-2]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn process_one(&mut self, coefs: &BiquadCoefs, x0: f32) -> f32 {
        let y0 = flush_denormal(
            coefs.b0 * x0 + coefs.b1 * self.x1 + coefs.b2 * self.x2
                - coefs.a1 * self.y1
                - coefs.a2 * self.y2,
        );
        self.x2 = self.x1;
        self.x1 = x0;
        self.y2 = self.y1;
        self.y1 = y0;
        y0
    }

    /// Process a block in place.
    pub fn process(&mut self, coefs: &BiquadCoefs, buf: &mut [f32]) {
        for s in buf.iter_mut() {
            *s = self.process_one(coefs, *s);
        }
    }

    /// Passthrough mode: update history as if the filter ran at unity gain
    /// but pass the input straight through, so a disabled filter's state
    /// stays "hot" and switching it back on does not click.
    pub fn process_passthrough(&mut self, buf: &[f32]) {
        for &x0 in buf {
            self.x2 = self.x1;
            self.x1 = x0;
            self.y2 = self.y1;
            self.y1 = x0;
        }
    }
}
