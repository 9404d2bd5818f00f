//! Ambisonic decoder (C4).
//!
//! Converts an ACN-ordered, N3D-normalized ambisonic bus (up to order 3, 16
//! channels) to a target speaker layout via matrix multiply, with an
//! optional dual-band mode: a second-order Linkwitz-Riley splitter per
//! ambisonic channel, each band decoded by its own matrix and summed.

use crate::biquad::{BiquadCoefs, BiquadState, FilterKind};
use crate::error::DecoderConfigError;
use crate::panner::{ambisonic_channels, MAX_AMBISONIC_CHANNELS};

/// A decode matrix: `speakers` rows by `ambisonic_channels` columns,
/// row-major, matching the layout consumed by `panner::pan_to_gains`.
#[derive(Debug, Clone)]
pub struct DecodeMatrix {
    pub speakers: usize,
    pub ambisonic_channels: usize,
    pub coefficients: Vec<f32>,
}

impl DecodeMatrix {
    pub fn identity_mono(ambisonic_channels: usize) -> Self {
        let mut coefficients = vec![0.0; ambisonic_channels];
        coefficients[0] = 1.0;
        Self {
            speakers: 1,
            ambisonic_channels,
            coefficients,
        }
    }

    #[inline]
    fn row(&self, speaker: usize) -> &[f32] {
        let n = self.ambisonic_channels;
        &self.coefficients[speaker * n..speaker * n + n]
    }
}

/// Per-ambisonic-channel Linkwitz-Riley crossover splitter: two cascaded
/// second-order Butterworth sections (applied twice) forming the low and
/// high bands used by dual-band decode.
#[derive(Debug, Clone)]
struct LinkwitzRiley {
    low_a: BiquadState,
    low_b: BiquadState,
    high_a: BiquadState,
    high_b: BiquadState,
}

impl LinkwitzRiley {
    fn new() -> Self {
        Self {
            low_a: BiquadState::new(),
            low_b: BiquadState::new(),
            high_a: BiquadState::new(),
            high_b: BiquadState::new(),
        }
    }

    fn split(&mut self, lp: &BiquadCoefs, hp: &BiquadCoefs, x: f32) -> (f32, f32) {
        let low = self.low_b.process_one(lp, self.low_a.process_one(lp, x));
        let high = self.high_b.process_one(hp, self.high_a.process_one(hp, x));
        (low, high)
    }
}

/// Speaker decode configuration: single-band or dual-band (with crossover).
#[derive(Debug, Clone)]
pub enum DecoderMode {
    SingleBand { matrix: DecodeMatrix },
    DualBand {
        low_matrix: DecodeMatrix,
        high_matrix: DecodeMatrix,
        crossover_hz: f32,
    },
}

/// Stateful ambisonic decoder, owned per-device.
pub struct AmbisonicDecoder {
    mode: DecoderMode,
    sample_rate: f32,
    lp_coefs: BiquadCoefs,
    hp_coefs: BiquadCoefs,
    splitters: Vec<LinkwitzRiley>,
}

impl AmbisonicDecoder {
    pub fn new(mode: DecoderMode, sample_rate: f32) -> Self {
        let (lp_coefs, hp_coefs, n_channels) = match &mode {
            DecoderMode::SingleBand { matrix } => {
                (BiquadCoefs::IDENTITY, BiquadCoefs::IDENTITY, matrix.ambisonic_channels)
            }
            DecoderMode::DualBand {
                crossover_hz,
                low_matrix,
                ..
            } => {
                let f = (crossover_hz / sample_rate).clamp(1.0e-4, 0.49);
                let rcp_q = BiquadCoefs::rcp_q_from_bandwidth(f, 1.0);
                (
                    BiquadCoefs::set_params(FilterKind::LowPass, 1.0, f, rcp_q),
                    BiquadCoefs::set_params(FilterKind::HighPass, 1.0, f, rcp_q),
                    low_matrix.ambisonic_channels,
                )
            }
        };
        Self {
            mode,
            sample_rate,
            lp_coefs,
            hp_coefs,
            splitters: (0..n_channels).map(|_| LinkwitzRiley::new()).collect(),
        }
    }

    pub fn speaker_count(&self) -> usize {
        match &self.mode {
            DecoderMode::SingleBand { matrix } => matrix.speakers,
            DecoderMode::DualBand { low_matrix, .. } => low_matrix.speakers,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn matrix(&self) -> &DecodeMatrix {
        match &self.mode {
            DecoderMode::SingleBand { matrix } => matrix,
            DecoderMode::DualBand { low_matrix, .. } => low_matrix,
        }
    }

    /// Per-speaker gains for a panned direction, computed directly from
    /// this decoder's own matrix (and therefore its own ambisonic order),
    /// rather than requiring the caller to guess the order.
    pub fn speaker_gains(&self, direction: [f32; 3], spread: f32, gain: f32) -> Vec<f32> {
        let matrix = self.matrix();
        let order = ((matrix.ambisonic_channels as f32).sqrt() as usize).saturating_sub(1);
        crate::panner::pan_to_gains(direction, spread, gain, order, &matrix.coefficients, matrix.speakers)
    }

    /// Decode `n` frames from an ambisonic bus (channel-major: `bus[ch]` is
    /// a slice of `n` samples) into a speaker-channel-major output bus.
    pub fn decode(&mut self, bus: &[Vec<f32>], out: &mut [Vec<f32>], n: usize) {
        match &self.mode {
            DecoderMode::SingleBand { matrix } => {
                for speaker in 0..matrix.speakers {
                    let row = matrix.row(speaker);
                    let dst = &mut out[speaker];
                    for i in 0..n {
                        let mut acc = 0.0f32;
                        for (ch, coef) in row.iter().enumerate() {
                            acc += coef * bus[ch][i];
                        }
                        dst[i] = acc;
                    }
                }
            }
            DecoderMode::DualBand {
                low_matrix,
                high_matrix,
                ..
            } => {
                let n_channels = low_matrix.ambisonic_channels;
                let mut low_bus = vec![vec![0.0f32; n]; n_channels];
                let mut high_bus = vec![vec![0.0f32; n]; n_channels];
                for ch in 0..n_channels {
                    let splitter = &mut self.splitters[ch];
                    for i in 0..n {
                        let (lo, hi) = splitter.split(&self.lp_coefs, &self.hp_coefs, bus[ch][i]);
                        low_bus[ch][i] = lo;
                        high_bus[ch][i] = hi;
                    }
                }
                for speaker in 0..low_matrix.speakers {
                    let low_row = low_matrix.row(speaker);
                    let high_row = high_matrix.row(speaker);
                    let dst = &mut out[speaker];
                    for i in 0..n {
                        let mut acc = 0.0f32;
                        for ch in 0..n_channels {
                            acc += low_row[ch] * low_bus[ch][i] + high_row[ch] * high_bus[ch][i];
                        }
                        dst[i] = acc;
                    }
                }
            }
        }
    }
}

/// Order-dependent upsample constants scaling W/X/Y/Z when adapting
/// first-order ambisonic content to a higher-order decoder
/// (`sqrt(1.5)`, `sqrt(2)`, `sqrt(1.8)`, `sqrt(5/3)`, ...).
pub fn upsample_first_order_to(target_order: usize) -> [f32; 4] {
    match target_order {
        1 => [1.0, 1.0, 1.0, 1.0],
        2 => [1.5f32.sqrt(), 2.0f32.sqrt(), 2.0f32.sqrt(), 2.0f32.sqrt()],
        3 => [1.8f32.sqrt(), (5.0f32 / 3.0).sqrt(), (5.0f32 / 3.0).sqrt(), (5.0f32 / 3.0).sqrt()],
        _ => [1.0, 1.0, 1.0, 1.0],
    }
}

/// Parse the ambisonic decoder configuration text format:
/// speaker positions (azimuth, elevation in degrees) followed by an `N x M`
/// whitespace-separated float matrix, with optional dual-band directives.
pub fn parse_decoder_config(text: &str) -> Result<DecoderMode, DecoderConfigError> {
    let mut speakers: Vec<(f32, f32)> = Vec::new();
    let mut matrix_rows: Vec<Vec<f32>> = Vec::new();
    let mut dual_band = false;
    let mut crossover_hz = 400.0f32;
    let mut in_matrix = false;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("dual-band") {
            dual_band = true;
            if let Some(hz) = rest.trim().strip_prefix("crossover=") {
                crossover_hz = hz.trim().parse().unwrap_or(crossover_hz);
            }
            continue;
        }
        if line.starts_with("matrix") {
            in_matrix = true;
            continue;
        }
        if !in_matrix {
            let mut parts = line.split_whitespace();
            let az: f32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or(DecoderConfigError::MalformedSpeaker(line_no))?;
            let el: f32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or(DecoderConfigError::MalformedSpeaker(line_no))?;
            speakers.push((az, el));
        } else {
            let row: Vec<f32> = line
                .split_whitespace()
                .map(|s| s.parse::<f32>())
                .collect::<Result<_, _>>()
                .map_err(|_| DecoderConfigError::MalformedSpeaker(line_no))?;
            matrix_rows.push(row);
        }
    }

    if matrix_rows.is_empty() {
        return Err(DecoderConfigError::EmptyMatrix);
    }
    let n = matrix_rows[0].len();
    for (row_idx, row) in matrix_rows.iter().enumerate() {
        if row.len() != n {
            return Err(DecoderConfigError::MatrixShape {
                row: row_idx,
                got: row.len(),
                expected: n,
            });
        }
    }

    let matrix = DecodeMatrix {
        speakers: matrix_rows.len(),
        ambisonic_channels: n,
        coefficients: matrix_rows.into_iter().flatten().collect(),
    };

    if dual_band {
        Ok(DecoderMode::DualBand {
            low_matrix: matrix.clone(),
            high_matrix: matrix,
            crossover_hz,
        })
    } else {
        Ok(DecoderMode::SingleBand { matrix })
    }
}

const _: () = assert!(MAX_AMBISONIC_CHANNELS == ambisonic_channels(3));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_band_mono_decode_passes_w_through() {
        let matrix = DecodeMatrix::identity_mono(4);
        let mut decoder = AmbisonicDecoder::new(DecoderMode::SingleBand { matrix }, 48000.0);
        let bus = vec![
            vec![1.0, 0.5, -0.5],
            vec![0.0; 3],
            vec![0.0; 3],
            vec![0.0; 3],
        ];
        let mut out = vec![vec![0.0; 3]];
        decoder.decode(&bus, &mut out, 3);
        assert_eq!(out[0], vec![1.0, 0.5, -0.5]);
    }

    #[test]
    fn dual_band_sums_to_single_band_on_flat_matrices() {
        let n = 4;
        let mut coefficients = vec![0.0; n * 2];
        coefficients[0] = 1.0;
        coefficients[n] = 0.0;
        let low = DecodeMatrix {
            speakers: 2,
            ambisonic_channels: n,
            coefficients: coefficients.clone(),
        };
        let high = DecodeMatrix {
            speakers: 2,
            ambisonic_channels: n,
            coefficients,
        };
        let mut decoder = AmbisonicDecoder::new(
            DecoderMode::DualBand {
                low_matrix: low,
                high_matrix: high,
                crossover_hz: 500.0,
            },
            48000.0,
        );
        let bus = vec![vec![0.3; 16], vec![0.0; 16], vec![0.0; 16], vec![0.0; 16]];
        let mut out = vec![vec![0.0; 16], vec![0.0; 16]];
        decoder.decode(&bus, &mut out, 16);
        // Energy should survive the split+recombine (not be silenced).
        let energy: f32 = out[0].iter().map(|x| x * x).sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn parses_text_config() {
        let text = "0 0\n90 0\nmatrix\n1.0 0.0 0.0 0.0\n0.0 1.0 0.0 0.0\n";
        let mode = parse_decoder_config(text).unwrap();
        match mode {
            DecoderMode::SingleBand { matrix } => {
                assert_eq!(matrix.speakers, 2);
                assert_eq!(matrix.ambisonic_channels, 4);
            }
            _ => panic!("expected single band"),
        }
    }

    #[test]
    fn rejects_ragged_matrix() {
        let text = "0 0\nmatrix\n1.0 0.0\n1.0\n";
        assert!(parse_decoder_config(text).is_err());
    }
}
