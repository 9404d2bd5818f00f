//! Device: the owning context for a render session — output format,
//! render buses, and the HRTF/ambisonic decode configuration shared by
//! every voice.

use std::sync::Arc;

use crate::ambisonic::AmbisonicDecoder;
use crate::error::ConfigError;
use crate::format::{ChannelLayout, RateConverter, SampleType};
use crate::hrtf::HrtfTable;
use crate::resampler::ResamplerKind;

/// Maximum frames processed in one internal mixer slice; render calls
/// larger than this are served in multiple slices so per-slice gain ramps
/// stay short enough to sound smooth.
pub const MAX_SLICE_FRAMES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Speaker-feed output via an ambisonic decode matrix.
    Speakers,
    /// Binaural output via HRTF convolution.
    Binaural,
    /// No spatialization; sources route straight to output channels.
    StereoBasic,
}

/// Render buses owned by the device: dry (direct) path and one per
/// auxiliary effect slot feed into the mixer's wet accumulator before
/// decode/format conversion. Follows fundsp's `Buffer` pattern (`buffer.rs`):
/// own one `Vec<f32>` per channel and hand out borrowed row-slices via
/// `rsor::Slice` rather than reallocating each slice.
pub struct Buses {
    rows: Vec<Vec<f32>>,
    slice: rsor::Slice<[f32]>,
    pub channels: usize,
}

impl Buses {
    pub fn new(channels: usize) -> Self {
        Self {
            rows: (0..channels).map(|_| vec![0.0; MAX_SLICE_FRAMES]).collect(),
            slice: rsor::Slice::new(),
            channels,
        }
    }

    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.iter_mut().for_each(|s| *s = 0.0);
        }
    }

    #[inline]
    pub fn channel_refs(&mut self) -> &[&[f32]] {
        self.slice.from_refs(&self.rows)
    }

    #[inline]
    pub fn channel_muts(&mut self) -> &mut [&mut [f32]] {
        self.slice.from_muts(&mut self.rows)
    }
}

pub struct Device {
    pub sample_rate: u32,
    pub output_layout: ChannelLayout,
    pub sample_type: SampleType,
    pub render_mode: RenderMode,
    pub update_size: usize,
    pub ring_depth: usize,
    pub dry_bus: Buses,
    pub wet_buses: Vec<Buses>,
    pub ambisonic_decoder: Option<AmbisonicDecoder>,
    pub hrtf: Option<Arc<HrtfTable>>,
    pub output_converter: RateConverter,
}

impl Device {
    pub fn new(
        sample_rate: u32,
        output_layout: ChannelLayout,
        sample_type: SampleType,
        render_mode: RenderMode,
        n_aux_slots: usize,
    ) -> Self {
        let ambisonic_channels = crate::panner::ambisonic_channels(crate::panner::MAX_AMBISONIC_ORDER);
        let dry_channels = match render_mode {
            RenderMode::Speakers => ambisonic_channels,
            RenderMode::Binaural => 2,
            RenderMode::StereoBasic => output_layout.channel_count(),
        };
        log::debug!(
            "device: {}Hz, {:?}, {:?} render mode, dry bus {} channels, {} aux sends",
            sample_rate, output_layout, render_mode, dry_channels, n_aux_slots
        );
        Self {
            sample_rate,
            output_layout,
            sample_type,
            render_mode,
            update_size: MAX_SLICE_FRAMES,
            ring_depth: 4,
            dry_bus: Buses::new(dry_channels),
            wet_buses: (0..n_aux_slots).map(|_| Buses::new(dry_channels)).collect(),
            ambisonic_decoder: None,
            hrtf: None,
            output_converter: RateConverter::new(ResamplerKind::Cubic),
        }
    }

    pub fn attach_hrtf(&mut self, table: Arc<HrtfTable>) {
        self.hrtf = Some(table);
    }

    pub fn attach_ambisonic_decoder(&mut self, decoder: AmbisonicDecoder) {
        self.ambisonic_decoder = Some(decoder);
    }

    /// Parse a `section/key = value` device config block (output rate,
    /// layout, sample type, update size, ring depth).
    pub fn parse_config(text: &str) -> Result<DeviceConfig, ConfigError> {
        let mut cfg = DeviceConfig::default();
        let mut section = String::new();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_lowercase();
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Malformed {
                line: lineno + 1,
                text: line.to_string(),
            })?;
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if section != "device" {
                return Err(ConfigError::KeyOutsideSection { line: lineno + 1 });
            }
            let invalid = |key: String| ConfigError::InvalidValue {
                line: lineno + 1,
                key,
                value: value.to_string(),
            };
            match key.as_str() {
                "sample_rate" => {
                    cfg.sample_rate = value.parse().map_err(|_| invalid(key.clone()))?;
                }
                "update_size" => {
                    cfg.update_size = value.parse().map_err(|_| invalid(key.clone()))?;
                }
                "ring_depth" => {
                    cfg.ring_depth = value.parse().map_err(|_| invalid(key.clone()))?;
                }
                _ => log::warn!("device config: ignoring unrecognized key {key:?} on line {}", lineno + 1),
            }
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub update_size: usize,
    pub ring_depth: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            update_size: MAX_SLICE_FRAMES,
            ring_depth: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_device_sizes_dry_bus_for_binaural() {
        let device = Device::new(48000, ChannelLayout::Stereo, SampleType::F32, RenderMode::Binaural, 2);
        assert_eq!(device.dry_bus.channels, 2);
        assert_eq!(device.wet_buses.len(), 2);
    }

    #[test]
    fn new_device_sizes_dry_bus_for_speakers_to_ambisonic_channel_count() {
        let device = Device::new(48000, ChannelLayout::Surround51, SampleType::S16, RenderMode::Speakers, 1);
        assert_eq!(device.dry_bus.channels, 16);
    }

    #[test]
    fn parse_config_reads_known_keys() {
        let text = "[device]\nsample_rate = 48000\nupdate_size = 512\n";
        let cfg = Device::parse_config(text).unwrap();
        assert_eq!(cfg.sample_rate, 48000);
        assert_eq!(cfg.update_size, 512);
    }

    #[test]
    fn parse_config_rejects_key_outside_section() {
        let text = "sample_rate = 48000\n";
        assert!(Device::parse_config(text).is_err());
    }
}
