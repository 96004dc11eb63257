use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::sound::mixer::{SampleFormatCode, Volume};

/// Options for a mixing run, set via config file or CLI
#[derive(Debug, Clone, PartialEq)]
pub struct MixerOptions {
    pub frequency: u32,
    pub format: SampleFormatCode,
    pub channels: u8,
    pub buffer_ms: u32,
    /// Master mix volume
    pub volume: Volume,
    /// Stop after this long; `None` plays until every source ends
    pub duration_ms: Option<u32>,
    /// Render to this WAV file instead of the output device
    pub output: Option<PathBuf>,
    pub tones: Vec<ToneOptions>,
    pub sources: Vec<PathBuf>,
    /// Divide the mix by the number of live sources
    pub normalize: bool,
    pub looping: bool,
}

/// A generated tone: sine at `hz`, `amplitude` of full scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneOptions {
    pub hz: f32,
    pub amplitude: f32,
}

impl Default for MixerOptions {
    fn default() -> Self {
        Self {
            frequency: 44100,
            format: SampleFormatCode::S16Native,
            channels: 2,
            buffer_ms: 20,
            volume: Volume::UNITY,
            duration_ms: None,
            output: None,
            tones: Vec::new(),
            sources: Vec::new(),
            normalize: false,
            looping: false,
        }
    }
}

/// Load options from a `key = value` file. Without a path, the defaults.
///
/// Blank lines and lines starting with `#` are skipped. Unknown keys are
/// an error.
pub fn load_config(path: Option<&Path>) -> Result<MixerOptions> {
    let mut opts = MixerOptions::default();
    let Some(path) = path else {
        return Ok(opts);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("{}:{}: expected key = value", path.display(), number + 1))?;
        apply_setting(&mut opts, key.trim(), value.trim())
            .with_context(|| format!("{}:{}", path.display(), number + 1))?;
    }
    Ok(opts)
}

fn apply_setting(opts: &mut MixerOptions, key: &str, value: &str) -> Result<()> {
    match key {
        "frequency" => opts.frequency = parse_frequency(value)?,
        "format" => opts.format = parse_format(value)?,
        "channels" => opts.channels = parse_channels(value)?,
        "buffer_ms" => opts.buffer_ms = parse_buffer_ms(value)?,
        "volume" => opts.volume = parse_volume(value)?,
        "duration_ms" => {
            opts.duration_ms = Some(value.parse().context("Invalid duration value")?)
        }
        "output" => opts.output = Some(PathBuf::from(value)),
        "tone" => opts.tones.push(parse_tone(value)?),
        "source" => opts.sources.push(PathBuf::from(value)),
        "normalize" => opts.normalize = parse_bool(value)?,
        "loop" => opts.looping = parse_bool(value)?,
        _ => anyhow::bail!("Unknown setting '{}'", key),
    }
    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    match s {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid boolean '{}'", s),
    }
}

/// Parse an encoding name (u8, s8, s16, s16le, s16be, s32)
pub fn parse_format(s: &str) -> Result<SampleFormatCode> {
    match s.to_ascii_lowercase().as_str() {
        "u8" => Ok(SampleFormatCode::U8),
        "s8" => Ok(SampleFormatCode::S8),
        "s16" | "s16sys" => Ok(SampleFormatCode::S16Native),
        "s16le" | "s16lsb" => Ok(SampleFormatCode::S16Lsb),
        "s16be" | "s16msb" => Ok(SampleFormatCode::S16Msb),
        "s32" => Ok(SampleFormatCode::S32),
        _ => anyhow::bail!("Unknown sample format '{}' (u8, s8, s16, s16le, s16be, s32)", s),
    }
}

/// Parse a volume percentage (0-100) to fixed point
pub fn parse_volume(s: &str) -> Result<Volume> {
    let percent: u32 = s.parse().context("Invalid volume value")?;
    if percent > 100 {
        anyhow::bail!("Volume must be between 0 and 100");
    }
    Ok(Volume::from_percent(percent))
}

/// Parse a sample rate in Hz
pub fn parse_frequency(s: &str) -> Result<u32> {
    let hz: u32 = s.parse().context("Invalid frequency value")?;
    if !(1000..=384_000).contains(&hz) {
        anyhow::bail!("Frequency out of range (1000 to 384000 Hz)");
    }
    Ok(hz)
}

pub fn parse_channels(s: &str) -> Result<u8> {
    let channels: u8 = s.parse().context("Invalid channel count")?;
    if channels == 0 {
        anyhow::bail!("Channel count must be positive");
    }
    Ok(channels)
}

pub fn parse_buffer_ms(s: &str) -> Result<u32> {
    let ms: u32 = s.parse().context("Invalid buffer length")?;
    if ms == 0 || ms > 1000 {
        anyhow::bail!("Buffer length out of range (1 to 1000 ms)");
    }
    Ok(ms)
}

/// Parse a tone as "HZ" or "HZ:AMPLITUDE" (amplitude 0.0-1.0, default 0.5)
pub fn parse_tone(s: &str) -> Result<ToneOptions> {
    let (hz, amplitude) = match s.split_once(':') {
        Some((hz, amp)) => (hz, Some(amp)),
        None => (s, None),
    };
    let hz: f32 = hz.trim().parse().context("Invalid tone frequency")?;
    if !(hz > 0.0) {
        anyhow::bail!("Tone frequency must be positive");
    }
    let amplitude = match amplitude {
        Some(a) => a.trim().parse().context("Invalid tone amplitude")?,
        None => 0.5,
    };
    if !(0.0..=1.0).contains(&amplitude) {
        anyhow::bail!("Tone amplitude out of range (0.0 to 1.0)");
    }
    Ok(ToneOptions { hz, amplitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("S16").unwrap(), SampleFormatCode::S16Native);
        assert_eq!(parse_format("s16be").unwrap(), SampleFormatCode::S16Msb);
        assert_eq!(parse_format("u8").unwrap(), SampleFormatCode::U8);
        assert!(parse_format("f32").is_err());
    }

    #[test]
    fn test_parse_volume() {
        assert_eq!(parse_volume("0").unwrap(), Volume::SILENT);
        assert_eq!(parse_volume("50").unwrap(), Volume::HALF);
        assert_eq!(parse_volume("100").unwrap(), Volume::UNITY);
        assert!(parse_volume("150").is_err());
        assert!(parse_volume("-10").is_err());
    }

    #[test]
    fn test_parse_frequency() {
        assert_eq!(parse_frequency("44100").unwrap(), 44100);
        assert!(parse_frequency("10").is_err());
        assert!(parse_frequency("fast").is_err());
    }

    #[test]
    fn test_parse_tone() {
        assert_eq!(
            parse_tone("440").unwrap(),
            ToneOptions { hz: 440.0, amplitude: 0.5 }
        );
        assert_eq!(
            parse_tone("220:0.25").unwrap(),
            ToneOptions { hz: 220.0, amplitude: 0.25 }
        );
        assert!(parse_tone("0").is_err());
        assert!(parse_tone("440:2").is_err());
        assert!(parse_tone("abc").is_err());
    }

    #[test]
    fn test_options_default() {
        let opts = MixerOptions::default();
        assert_eq!(opts.frequency, 44100);
        assert_eq!(opts.format, SampleFormatCode::S16Native);
        assert_eq!(opts.channels, 2);
        assert_eq!(opts.buffer_ms, 20);
        assert_eq!(opts.volume, Volume::UNITY);
        assert!(opts.sources.is_empty());
        assert_eq!(load_config(None).unwrap(), opts);
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# mixer settings").unwrap();
        writeln!(file, "frequency = 22050").unwrap();
        writeln!(file, "format = s8").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "channels=1").unwrap();
        writeln!(file, "volume = 50").unwrap();
        writeln!(file, "tone = 440:0.1").unwrap();
        writeln!(file, "normalize = yes").unwrap();
        file.flush().unwrap();

        let opts = load_config(Some(file.path())).unwrap();
        assert_eq!(opts.frequency, 22050);
        assert_eq!(opts.format, SampleFormatCode::S8);
        assert_eq!(opts.channels, 1);
        assert_eq!(opts.volume, Volume::HALF);
        assert_eq!(opts.tones, vec![ToneOptions { hz: 440.0, amplitude: 0.1 }]);
        assert!(opts.normalize);
        assert_eq!(opts.buffer_ms, 20);
    }

    #[test]
    fn test_load_config_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "speed = 11").unwrap();
        file.flush().unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown setting 'speed'"));

        assert!(load_config(Some(Path::new("/nonexistent/glmix.cfg"))).is_err());
    }
}
