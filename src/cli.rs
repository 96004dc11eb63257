use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{
    parse_buffer_ms, parse_channels, parse_format, parse_frequency, parse_tone, parse_volume,
    MixerOptions,
};
use crate::logging::LogLevel;

/// glmix - mix audio files and generated tones through the mixer engine
#[derive(Parser, Debug)]
#[command(name = "glmix")]
#[command(version)]
#[command(about = "Mix audio files and tones to the sound card or a WAV file", long_about = None)]
pub struct Cli {
    /// Audio files to mix (Ogg Vorbis or WAV)
    #[arg(value_name = "FILE")]
    pub sources: Vec<PathBuf>,

    /// Output frequency in Hz (default: the first file's rate, else 44100)
    #[arg(short = 'r', long, value_name = "HZ")]
    pub freq: Option<String>,

    /// Output encoding (u8, s8, s16, s16le, s16be, s32)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Output channels
    #[arg(short, long, value_name = "N")]
    pub channels: Option<String>,

    /// Period length in milliseconds
    #[arg(short, long = "buffer-ms", value_name = "MS")]
    pub buffer_ms: Option<String>,

    /// Master volume (0-100)
    #[arg(short, long, value_name = "VOLUME")]
    pub volume: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Render into a WAV file instead of playing
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Stop after this many milliseconds
    #[arg(short, long = "duration-ms", value_name = "MS")]
    pub duration_ms: Option<String>,

    /// Add a sine tone as HZ or HZ:AMPLITUDE (can be specified multiple times)
    #[arg(short, long, value_name = "TONE")]
    pub tone: Vec<String>,

    /// Divide the mix by the number of live sources
    #[arg(short, long)]
    pub normalize: bool,

    /// Loop every source
    #[arg(short = 'L', long = "loop")]
    pub looping: bool,

    /// Log level (nothing, error, warning, info, debug, all)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Merge CLI arguments into the options struct
    pub fn merge_into_options(&self, mut opts: MixerOptions) -> Result<MixerOptions> {
        if let Some(ref freq) = self.freq {
            opts.frequency = parse_frequency(freq).context("Invalid --freq")?;
        }
        if let Some(ref format) = self.format {
            opts.format = parse_format(format)?;
        }
        if let Some(ref channels) = self.channels {
            opts.channels = parse_channels(channels).context("Invalid --channels")?;
        }
        if let Some(ref ms) = self.buffer_ms {
            opts.buffer_ms = parse_buffer_ms(ms).context("Invalid --buffer-ms")?;
        }
        if let Some(ref vol) = self.volume {
            opts.volume = parse_volume(vol).context("Invalid --volume")?;
        }
        if let Some(ref output) = self.output {
            opts.output = Some(output.clone());
        }
        if let Some(ref ms) = self.duration_ms {
            opts.duration_ms = Some(ms.parse().context("Invalid --duration-ms")?);
        }
        for tone in &self.tone {
            opts.tones.push(parse_tone(tone)?);
        }
        opts.sources.extend(self.sources.iter().cloned());
        if self.normalize {
            opts.normalize = true;
        }
        if self.looping {
            opts.looping = true;
        }
        Ok(opts)
    }

    /// Requested log level, defaulting to warnings
    pub fn log_level(&self) -> Result<LogLevel> {
        match self.log_level {
            Some(ref name) => LogLevel::from_name(name)
                .with_context(|| format!("Unknown log level '{}'", name)),
            None => Ok(LogLevel::Warning),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::mixer::{SampleFormatCode, Volume};

    #[test]
    fn test_cli_parse_basic() {
        let cli = Cli::parse_from(["glmix", "--freq", "22050", "-f", "u8", "a.ogg", "b.wav"]);
        assert_eq!(cli.freq.as_deref(), Some("22050"));
        assert_eq!(cli.sources, vec![PathBuf::from("a.ogg"), PathBuf::from("b.wav")]);
    }

    #[test]
    fn test_merge_overrides_config() {
        let cli = Cli::parse_from([
            "glmix", "-r", "48000", "-c", "1", "-v", "50", "-t", "440", "-t", "880:0.2", "-n",
            "--duration-ms", "250", "-o", "out.wav",
        ]);
        let opts = cli.merge_into_options(MixerOptions::default()).unwrap();
        assert_eq!(opts.frequency, 48000);
        assert_eq!(opts.channels, 1);
        assert_eq!(opts.volume, Volume::HALF);
        assert_eq!(opts.tones.len(), 2);
        assert_eq!(opts.duration_ms, Some(250));
        assert_eq!(opts.output, Some(PathBuf::from("out.wav")));
        assert!(opts.normalize);
        assert_eq!(opts.format, SampleFormatCode::S16Native);
    }

    #[test]
    fn test_merge_rejects_bad_values() {
        let cli = Cli::parse_from(["glmix", "-v", "200"]);
        assert!(cli.merge_into_options(MixerOptions::default()).is_err());
        let cli = Cli::parse_from(["glmix", "-f", "float"]);
        assert!(cli.merge_into_options(MixerOptions::default()).is_err());
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::parse_from(["glmix", "--log-level", "debug"]);
        assert_eq!(cli.log_level().unwrap(), LogLevel::Debug);
        let cli = Cli::parse_from(["glmix"]);
        assert_eq!(cli.log_level().unwrap(), LogLevel::Warning);
    }
}
