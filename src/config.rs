//! Engine-wide configuration: a hand-rolled `[section]` / `key = value`
//! text format (not a general-purpose TOML/INI crate — the format is
//! small and bespoke enough that a dependency would outweigh 30 lines of
//! parsing), covering device setup and the default HRTF/decoder asset
//! paths.

use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub device: crate::device::DeviceConfig,
    pub hrtf_path: Option<String>,
    pub decoder_path: Option<String>,
    pub default_resampler: Option<String>,
}

/// Parse the full engine configuration text: a `[device]` section (handled
/// by [`crate::device::Device::parse_config`]) plus an `[assets]` section
/// naming the HRTF dataset and ambisonic decoder config files.
pub fn parse_engine_config(text: &str) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();
    let mut section = String::new();
    let mut device_lines = String::new();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_lowercase();
            if section == "device" {
                device_lines.push_str("[device]\n");
            }
            continue;
        }
        match section.as_str() {
            "device" => {
                device_lines.push_str(raw_line);
                device_lines.push('\n');
            }
            "assets" => {
                let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Malformed {
                    line: lineno + 1,
                    text: line.to_string(),
                })?;
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();
                match key.as_str() {
                    "hrtf" => config.hrtf_path = Some(value),
                    "decoder" => config.decoder_path = Some(value),
                    "resampler" => config.default_resampler = Some(value),
                    _ => log::warn!("engine config: ignoring unrecognized key {key:?} on line {}", lineno + 1),
                }
            }
            _ => return Err(ConfigError::KeyOutsideSection { line: lineno + 1 }),
        }
    }

    if !device_lines.is_empty() {
        config.device = crate::device::Device::parse_config(&device_lines)?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_and_assets_sections() {
        let text = "\
[device]
sample_rate = 48000

[assets]
hrtf = data/default.mhr
decoder = data/5_1.cfg
";
        let config = parse_engine_config(text).unwrap();
        assert_eq!(config.device.sample_rate, 48000);
        assert_eq!(config.hrtf_path.as_deref(), Some("data/default.mhr"));
        assert_eq!(config.decoder_path.as_deref(), Some("data/5_1.cfg"));
    }

    #[test]
    fn ignores_unknown_asset_key() {
        let text = "[assets]\nbogus = value\nhrtf = data/default.mhr\n";
        let config = parse_engine_config(text).unwrap();
        assert_eq!(config.hrtf_path.as_deref(), Some("data/default.mhr"));
    }
}
