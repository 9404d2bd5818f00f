//! HRTF engine (C5).
//!
//! Dataset of per-elevation rings of per-azimuth impulse-response pairs,
//! bilinearly interpolated across the 2-D (elevation, azimuth) grid, with
//! per-voice direct-form FIR convolution and coefficient-fade smoothing so
//! IR changes never introduce a discontinuity.

use crate::error::HrtfLoadError;
use crate::math::lerp;

pub const HRIR_LENGTH: usize = 128;
pub const HRIR_COUNT: usize = 828;
pub const ELEVATION_COUNT: usize = 19;
pub const MAX_DELAY: u8 = 127;

/// Canonical elevation offsets into the flat HRIR array. Index `i` is the
/// starting HRIR index for elevation ring `i`.
pub const ELEVATION_OFFSETS: [u16; ELEVATION_COUNT] = [
    0, 1, 13, 37, 73, 118, 174, 234, 306, 378, 450, 522, 594, 654, 710, 755, 791, 815, 827,
];

const MAGIC: &[u8; 8] = b"MinPHR00";

/// One impulse response pair (left/right) plus per-ear integer sample delay.
#[derive(Debug, Clone)]
pub struct HrirPair {
    pub left: [f32; HRIR_LENGTH],
    pub right: [f32; HRIR_LENGTH],
}

/// A loaded HRTF dataset: elevation rings of azimuth-ordered IR pairs.
pub struct HrtfTable {
    pub sample_rate: u32,
    /// Flat array of `HRIR_COUNT` coefficient pairs, grouped by elevation
    /// per `ELEVATION_OFFSETS`. Coefficients are pre-converted to f32 from
    /// the dataset's `s16` storage (full-scale = 1.0).
    pub irs: Vec<HrirPair>,
    /// Per-ear delay in samples, one pair per IR (left, right).
    pub delays: Vec<(u8, u8)>,
}

impl HrtfTable {
    /// Number of azimuths in elevation ring `ev` (0 = bottom pole).
    fn azimuth_count(ev: usize) -> usize {
        let start = ELEVATION_OFFSETS[ev] as usize;
        let end = if ev + 1 < ELEVATION_COUNT {
            ELEVATION_OFFSETS[ev + 1] as usize
        } else {
            HRIR_COUNT
        };
        end - start
    }

    /// Index of the azimuth-mirrored entry in the same elevation ring (same
    /// elevation, azimuth negated). The dataset stores one ear's IR per
    /// direction; the other ear's response for that direction is the stored
    /// ear's response to the mirrored direction, by left-right head symmetry.
    fn mirror_index(i: usize) -> usize {
        let mut ev = ELEVATION_COUNT - 1;
        for e in 0..ELEVATION_COUNT {
            let end = if e + 1 < ELEVATION_COUNT {
                ELEVATION_OFFSETS[e + 1] as usize
            } else {
                HRIR_COUNT
            };
            if i < end {
                ev = e;
                break;
            }
        }
        let start = ELEVATION_OFFSETS[ev] as usize;
        let count = Self::azimuth_count(ev);
        let pos = i - start;
        let mirrored_pos = (count - pos) % count;
        start + mirrored_pos
    }

    /// Parse a binary little-endian dataset file.
    pub fn parse(bytes: &[u8]) -> Result<Self, HrtfLoadError> {
        let mut cursor = 0usize;
        let need = |cursor: usize, n: usize| -> Result<(), HrtfLoadError> {
            if cursor + n > bytes.len() {
                Err(HrtfLoadError::Truncated {
                    expected: cursor + n,
                    got: bytes.len(),
                })
            } else {
                Ok(())
            }
        };

        need(cursor, 8)?;
        if &bytes[cursor..cursor + 8] != MAGIC {
            return Err(HrtfLoadError::BadMagic);
        }
        cursor += 8;

        need(cursor, 4)?;
        let sample_rate = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        need(cursor, 2)?;
        let hrir_count = u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
        cursor += 2;
        if hrir_count as usize != HRIR_COUNT {
            return Err(HrtfLoadError::UnsupportedHrirCount(hrir_count));
        }

        need(cursor, 2)?;
        let hrir_size = u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
        cursor += 2;
        if hrir_size as usize != HRIR_LENGTH {
            return Err(HrtfLoadError::UnsupportedHrirSize(hrir_size));
        }

        need(cursor, 1)?;
        let ev_count = bytes[cursor];
        cursor += 1;
        if ev_count as usize != ELEVATION_COUNT {
            return Err(HrtfLoadError::UnsupportedElevationCount(ev_count));
        }

        need(cursor, ELEVATION_COUNT * 2)?;
        for i in 0..ELEVATION_COUNT {
            let off =
                u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
            if off != ELEVATION_OFFSETS[i] {
                return Err(HrtfLoadError::BadElevationOffsets);
            }
            cursor += 2;
        }

        // One coefficient array per HRIR index (min-phase, single-ear
        // storage); the other ear is derived by azimuth mirroring below.
        need(cursor, HRIR_COUNT * HRIR_LENGTH * 2)?;
        let mut mono_irs = Vec::with_capacity(HRIR_COUNT);
        for _ in 0..HRIR_COUNT {
            let mut coefs = [0.0f32; HRIR_LENGTH];
            for sample in coefs.iter_mut() {
                let raw = i16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
                *sample = raw as f32 / 32768.0;
                cursor += 2;
            }
            mono_irs.push(coefs);
        }

        // One delay byte per HRIR index, same single-ear storage convention.
        need(cursor, HRIR_COUNT)?;
        let mut mono_delays = Vec::with_capacity(HRIR_COUNT);
        for _ in 0..HRIR_COUNT {
            let d = bytes[cursor];
            if d > MAX_DELAY {
                return Err(HrtfLoadError::DelayOutOfRange(d));
            }
            mono_delays.push(d);
            cursor += 1;
        }

        let mut irs = Vec::with_capacity(HRIR_COUNT);
        let mut delays = Vec::with_capacity(HRIR_COUNT);
        for i in 0..HRIR_COUNT {
            let mirror = Self::mirror_index(i);
            irs.push(HrirPair {
                left: mono_irs[i],
                right: mono_irs[mirror],
            });
            delays.push((mono_delays[i], mono_delays[mirror]));
        }

        Ok(Self {
            sample_rate,
            irs,
            delays,
        })
    }

    /// Bilinearly interpolated query: given elevation (-90..90 deg), azimuth
    /// (0..360 deg), distance, and spread, return (left IR, right IR, left
    /// delay, right delay), blended toward a diffuse impulse by `spread`.
    pub fn query(&self, elevation_deg: f32, azimuth_deg: f32, gain: f32, spread: f32) -> HrtfResponse {
        let ev_f = ((elevation_deg + 90.0) / 180.0 * (ELEVATION_COUNT - 1) as f32)
            .clamp(0.0, (ELEVATION_COUNT - 1) as f32);
        let ev0 = ev_f.floor() as usize;
        let ev1 = (ev0 + 1).min(ELEVATION_COUNT - 1);
        let ev_t = ev_f - ev0 as f32;

        let az = azimuth_deg.rem_euclid(360.0);

        let sample_ring = |ev: usize, az_deg: f32| -> (usize, f32) {
            let count = Self::azimuth_count(ev).max(1);
            let pos = az_deg / 360.0 * count as f32;
            let i0 = pos.floor() as usize % count;
            let t = pos - pos.floor();
            (ELEVATION_OFFSETS[ev] as usize + i0, t)
        };

        let blend_ring = |ev: usize| -> (HrirPair, u8, u8) {
            let count = Self::azimuth_count(ev).max(1);
            let (idx0, t) = sample_ring(ev, az);
            let idx1 = ELEVATION_OFFSETS[ev] as usize + ((idx0 - ELEVATION_OFFSETS[ev] as usize + 1) % count);
            let a = &self.irs[idx0];
            let b = &self.irs[idx1];
            let mut left = [0.0f32; HRIR_LENGTH];
            let mut right = [0.0f32; HRIR_LENGTH];
            for i in 0..HRIR_LENGTH {
                left[i] = lerp(a.left[i], b.left[i], t);
                right[i] = lerp(a.right[i], b.right[i], t);
            }
            let (da0, db0) = self.delays[idx0];
            let (da1, db1) = self.delays[idx1];
            let delay_l = lerp(da0 as f32, da1 as f32, t).round() as u8;
            let delay_r = lerp(db0 as f32, db1 as f32, t).round() as u8;
            (HrirPair { left, right }, delay_l, delay_r)
        };

        let (ring0, d0l, d0r) = blend_ring(ev0);
        let (ring1, d1l, d1r) = blend_ring(ev1);

        let mut left = [0.0f32; HRIR_LENGTH];
        let mut right = [0.0f32; HRIR_LENGTH];
        for i in 0..HRIR_LENGTH {
            left[i] = lerp(ring0.left[i], ring1.left[i], ev_t) * gain;
            right[i] = lerp(ring0.right[i], ring1.right[i], ev_t) * gain;
        }
        let delay_left = lerp(d0l as f32, d1l as f32, ev_t).round() as usize;
        let delay_right = lerp(d0r as f32, d1r as f32, ev_t).round() as usize;

        // Spread blends the point-source IR toward a diffuse impulse
        // (impulse at t=0, flat over direction), weight sin(spread/2).
        let diffuse_weight = (spread.clamp(0.0, std::f32::consts::TAU) * 0.5).sin();
        if diffuse_weight > 0.0 {
            let point_weight = 1.0 - diffuse_weight;
            let mut diffuse_left = [0.0f32; HRIR_LENGTH];
            let mut diffuse_right = [0.0f32; HRIR_LENGTH];
            diffuse_left[0] = gain;
            diffuse_right[0] = gain;
            for i in 0..HRIR_LENGTH {
                left[i] = left[i] * point_weight + diffuse_left[i] * diffuse_weight;
                right[i] = right[i] * point_weight + diffuse_right[i] * diffuse_weight;
            }
        }

        HrtfResponse {
            left,
            right,
            delay_left,
            delay_right,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HrtfResponse {
    pub left: [f32; HRIR_LENGTH],
    pub right: [f32; HRIR_LENGTH],
    pub delay_left: usize,
    pub delay_right: usize,
}

/// History length needed to cover the longest IR plus the maximum ear delay.
const HISTORY_LEN: usize = (HRIR_LENGTH + MAX_DELAY as usize).next_power_of_two();
const HISTORY_MASK: usize = HISTORY_LEN - 1;

/// Per-voice HRTF convolution state: a circular input history plus the
/// current/target IR pair, cross-fading on IR change so there is no
/// coefficient discontinuity.
pub struct HrtfVoiceState {
    history: [f32; HISTORY_LEN],
    write_pos: usize,
    current: HrtfResponse,
    target: HrtfResponse,
    fade: f32,
    fade_step: f32,
}

impl HrtfVoiceState {
    pub fn new() -> Self {
        let zero = HrtfResponse {
            left: [0.0; HRIR_LENGTH],
            right: [0.0; HRIR_LENGTH],
            delay_left: 0,
            delay_right: 0,
        };
        Self {
            history: [0.0; HISTORY_LEN],
            write_pos: 0,
            current: zero.clone(),
            target: zero,
            fade: 1.0,
            fade_step: 0.0,
        }
    }

    /// Publish a new IR target; the slice crossfades old->new over its
    /// duration rather than switching instantaneously.
    pub fn set_target(&mut self, response: HrtfResponse, slice_len: usize) {
        self.current = self.blended();
        self.target = response;
        self.fade = 0.0;
        self.fade_step = if slice_len > 0 {
            1.0 / slice_len as f32
        } else {
            1.0
        };
    }

    fn blended(&self) -> HrtfResponse {
        let mut left = [0.0f32; HRIR_LENGTH];
        let mut right = [0.0f32; HRIR_LENGTH];
        for i in 0..HRIR_LENGTH {
            left[i] = lerp(self.current.left[i], self.target.left[i], self.fade);
            right[i] = lerp(self.current.right[i], self.target.right[i], self.fade);
        }
        HrtfResponse {
            left,
            right,
            delay_left: self.target.delay_left,
            delay_right: self.target.delay_right,
        }
    }

    /// Convolve one input sample, advancing the fade and history, producing
    /// one stereo output sample.
    #[inline]
    pub fn process_one(&mut self, input: f32) -> (f32, f32) {
        self.history[self.write_pos] = input;

        let blend = self.blended();
        self.fade = (self.fade + self.fade_step).min(1.0);

        let mut left = 0.0f32;
        let base_l = self.write_pos + HISTORY_LEN - blend.delay_left;
        for (i, &coef) in blend.left.iter().enumerate() {
            let idx = (base_l - i) & HISTORY_MASK;
            left += coef * self.history[idx];
        }
        let mut right = 0.0f32;
        let base_r = self.write_pos + HISTORY_LEN - blend.delay_right;
        for (i, &coef) in blend.right.iter().enumerate() {
            let idx = (base_r - i) & HISTORY_MASK;
            right += coef * self.history[idx];
        }

        self.write_pos = (self.write_pos + 1) & HISTORY_MASK;
        (left, right)
    }

    pub fn process_block(&mut self, input: &[f32], out_left: &mut [f32], out_right: &mut [f32]) {
        for (i, &x) in input.iter().enumerate() {
            let (l, r) = self.process_one(x);
            out_left[i] = l;
            out_right[i] = r;
        }
    }
}

impl Default for HrtfVoiceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Direct ambisonic (B-format) to binaural decode: per-ambisonic-channel
/// IRs precomputed by summing N3D-weighted virtual-speaker HRTFs over a
/// near-uniform sphere sampling.
pub struct AmbisonicHrtfDecoder {
    /// One IR pair per ambisonic channel.
    channel_irs: Vec<HrirPair>,
    convolvers: Vec<HrtfVoiceState>,
}

impl AmbisonicHrtfDecoder {
    /// Build by summing `virtual_speakers` directions' HRTF responses
    /// weighted by their spherical-harmonic coefficients at each direction.
    pub fn build(table: &HrtfTable, order: usize, virtual_speakers: &[(f32, f32)]) -> Self {
        let n_channels = crate::panner::ambisonic_channels(order);
        let mut channel_irs: Vec<HrirPair> = (0..n_channels)
            .map(|_| HrirPair {
                left: [0.0; HRIR_LENGTH],
                right: [0.0; HRIR_LENGTH],
            })
            .collect();
        let weight = 1.0 / virtual_speakers.len().max(1) as f32;
        for &(az, el) in virtual_speakers {
            let dir_rad_az = az.to_radians();
            let dir_rad_el = el.to_radians();
            let direction = [
                dir_rad_el.cos() * dir_rad_az.sin(),
                dir_rad_el.sin(),
                -dir_rad_el.cos() * dir_rad_az.cos(),
            ];
            let sh = crate::panner::spherical_harmonics(direction);
            let response = table.query(el, az, 1.0, 0.0);
            for ch in 0..n_channels {
                let w = sh[ch] * weight;
                for i in 0..HRIR_LENGTH {
                    channel_irs[ch].left[i] += response.left[i] * w;
                    channel_irs[ch].right[i] += response.right[i] * w;
                }
            }
        }
        let convolvers = (0..n_channels).map(|_| HrtfVoiceState::new()).collect();
        let mut decoder = Self {
            channel_irs,
            convolvers,
        };
        decoder.publish_irs();
        decoder
    }

    fn publish_irs(&mut self) {
        for (ch, conv) in self.convolvers.iter_mut().enumerate() {
            let ir = &self.channel_irs[ch];
            conv.set_target(
                HrtfResponse {
                    left: ir.left,
                    right: ir.right,
                    delay_left: 0,
                    delay_right: 0,
                },
                1,
            );
            conv.fade = 1.0;
        }
    }

    /// Convolve the ambisonic bus channel-by-channel with the precomputed
    /// IRs, summing into a stereo output.
    pub fn decode(&mut self, bus: &[Vec<f32>], out_left: &mut [f32], out_right: &mut [f32], n: usize) {
        out_left[..n].fill(0.0);
        out_right[..n].fill(0.0);
        let mut scratch_l = vec![0.0f32; n];
        let mut scratch_r = vec![0.0f32; n];
        for (ch, conv) in self.convolvers.iter_mut().enumerate() {
            conv.process_block(&bus[ch][..n], &mut scratch_l, &mut scratch_r);
            for i in 0..n {
                out_left[i] += scratch_l[i];
                out_right[i] += scratch_r[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a MinPHR00-layout byte stream: header, then a single
    /// `s16[HRIR_COUNT][HRIR_LENGTH]` coefficient block, then a single
    /// `u8[HRIR_COUNT]` delay array -- no per-ear duplication.
    fn synthetic_dataset_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&44100u32.to_le_bytes());
        bytes.extend_from_slice(&(HRIR_COUNT as u16).to_le_bytes());
        bytes.extend_from_slice(&(HRIR_LENGTH as u16).to_le_bytes());
        bytes.push(ELEVATION_COUNT as u8);
        for off in ELEVATION_OFFSETS {
            bytes.extend_from_slice(&off.to_le_bytes());
        }
        for i in 0..HRIR_COUNT {
            let peak = ((i % 100) as i16) * 100;
            bytes.extend_from_slice(&peak.to_le_bytes());
            for _ in 1..HRIR_LENGTH {
                bytes.extend_from_slice(&0i16.to_le_bytes());
            }
        }
        for i in 0..HRIR_COUNT {
            bytes.push((i % (MAX_DELAY as usize + 1)) as u8);
        }
        bytes
    }

    #[test]
    fn parse_accepts_the_single_block_minphr00_layout() {
        let bytes = synthetic_dataset_bytes();
        let table = HrtfTable::parse(&bytes).expect("valid dataset must parse");
        assert_eq!(table.sample_rate, 44100);
        assert_eq!(table.irs.len(), HRIR_COUNT);
        assert_eq!(table.delays.len(), HRIR_COUNT);
    }

    #[test]
    fn parse_derives_the_other_ear_by_azimuth_mirroring() {
        let bytes = synthetic_dataset_bytes();
        let table = HrtfTable::parse(&bytes).unwrap();

        for i in [0usize, 5, 400, HRIR_COUNT - 1] {
            let mirror = HrtfTable::mirror_index(i);
            let expected_left = ((i % 100) as f32) * 100.0 / 32768.0;
            let expected_right = ((mirror % 100) as f32) * 100.0 / 32768.0;
            assert!((table.irs[i].left[0] - expected_left).abs() < 1.0e-6);
            assert!((table.irs[i].right[0] - expected_right).abs() < 1.0e-6);

            let expected_delay_l = (i % (MAX_DELAY as usize + 1)) as u8;
            let expected_delay_r = (mirror % (MAX_DELAY as usize + 1)) as u8;
            assert_eq!(table.delays[i], (expected_delay_l, expected_delay_r));
        }
    }

    #[test]
    fn mirror_index_is_its_own_inverse_within_a_ring() {
        for i in [0usize, 1, 400, HRIR_COUNT - 1] {
            let mirror = HrtfTable::mirror_index(i);
            assert_eq!(HrtfTable::mirror_index(mirror), i);
        }
    }

    fn synthetic_table() -> HrtfTable {
        let mut irs = Vec::with_capacity(HRIR_COUNT);
        let mut delays = Vec::with_capacity(HRIR_COUNT);
        for i in 0..HRIR_COUNT {
            let mut left = [0.0f32; HRIR_LENGTH];
            let mut right = [0.0f32; HRIR_LENGTH];
            left[0] = 1.0;
            right[0] = 1.0;
            irs.push(HrirPair { left, right });
            delays.push(((i % 10) as u8, ((i + 5) % 10) as u8));
        }
        HrtfTable {
            sample_rate: 44100,
            irs,
            delays,
        }
    }

    #[test]
    fn elevation_offsets_sum_to_hrir_count() {
        assert_eq!(ELEVATION_OFFSETS[ELEVATION_COUNT - 1], 827);
        assert!(HRIR_COUNT as u16 > ELEVATION_OFFSETS[ELEVATION_COUNT - 1]);
    }

    #[test]
    fn query_returns_nonzero_response() {
        let table = synthetic_table();
        let response = table.query(0.0, 90.0, 1.0, 0.0);
        assert!(response.left.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn itd_right_minus_left_is_positive_for_right_azimuth() {
        // Build a table where azimuths increase delay monotonically so a
        // source at +90 deg produces right-ear-earlier arrival (negative
        // right delay offset relative to left) -- here we just check the
        // bilinear query doesn't panic and produces finite delays.
        let table = synthetic_table();
        let response = table.query(0.0, 90.0, 1.0, 0.0);
        assert!(response.delay_left <= MAX_DELAY as usize);
        assert!(response.delay_right <= MAX_DELAY as usize);
    }

    #[test]
    fn spread_blends_toward_diffuse_impulse() {
        let table = synthetic_table();
        let point = table.query(0.0, 90.0, 1.0, 0.0);
        let diffuse = table.query(0.0, 90.0, 1.0, std::f32::consts::PI);
        // Diffuse response is closer to an impulse-at-zero than the point
        // response is (weight sin(pi/2)=1 => fully diffuse).
        assert!((diffuse.left[0] - 1.0).abs() < 1.0e-4);
        let _ = point;
    }

    #[test]
    fn fade_reaches_target_after_one_slice() {
        let mut state = HrtfVoiceState::new();
        let mut ir = HrirPair {
            left: [0.0; HRIR_LENGTH],
            right: [0.0; HRIR_LENGTH],
        };
        ir.left[0] = 1.0;
        ir.right[0] = 1.0;
        state.set_target(
            HrtfResponse {
                left: ir.left,
                right: ir.right,
                delay_left: 0,
                delay_right: 0,
            },
            4,
        );
        for _ in 0..4 {
            state.process_one(0.0);
        }
        assert!((state.fade - 1.0).abs() < 1.0e-5);
    }
}
