use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use gamelib_mixer::cli::Cli;
use gamelib_mixer::config::{self, MixerOptions};
use gamelib_mixer::logging;
use gamelib_mixer::sound::mixer::{
    negotiate, AudioDevice, CpalDevice, DeviceFormat, FormatRequest, MixSession, MixStack,
    NullDevice, SampleFormat, SourceStream, Volume,
};
use gamelib_mixer::sound::{
    decode_all, open_decoder, write_wav, MemoryDecoder, PcmBuffer, ToneDecoder,
};
use gamelib_mixer::{log_error, log_info};

/// Used when only endless sources (tones, loops) are given without a duration
const DEFAULT_DURATION_MS: u32 = 2000;

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(err) => {
            log_error!("{:#}", err);
            eprintln!("glmix: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::log_init(cli.log_level()?);

    let options = config::load_config(cli.config.as_deref())?;
    let mut options = cli.merge_into_options(options)?;

    // Decode everything up front; the audio thread only copies from memory
    let mut clips = Vec::with_capacity(options.sources.len());
    for path in &options.sources {
        clips.push(load_clip(path)?);
    }
    if cli.freq.is_none() {
        if let Some(first) = clips.first() {
            options.frequency = first.frequency;
        }
    }

    let request = FormatRequest::new(
        options.frequency,
        options.format,
        options.channels,
        options.buffer_ms,
    );
    match options.output.clone() {
        Some(path) => {
            let device = NullDevice::new();
            let handle = device.handle();
            let (mut session, format) =
                start_session(Box::new(device), request, &options, &clips)?;
            let frames = total_frames(&options, &clips, &format);
            let total_bytes = frames * format.sample.frame_size();
            let mut data = Vec::with_capacity(total_bytes);
            while data.len() < total_bytes {
                if !handle.pump_into(&mut data) {
                    anyhow::bail!("Mixer stopped before the render finished");
                }
            }
            data.truncate(total_bytes);
            session.quit();

            write_wav(&path, format.sample, format.frequency, &data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log_info!("Wrote {} frames to {}", frames, path.display());
        }
        None => {
            let (mut session, format) =
                start_session(Box::new(CpalDevice::new()), request, &options, &clips)?;
            let frames = total_frames(&options, &clips, &format);
            let ms = frames as u64 * 1000 / format.frequency as u64;
            // Let the last period drain before stopping
            let drain = Duration::from_secs_f64(format.period_ms() / 1000.0);
            std::thread::sleep(Duration::from_millis(ms) + drain);
            session.quit();
        }
    }
    Ok(())
}

/// Negotiate with `device`, build the mix for that format and start it
fn start_session(
    device: Box<dyn AudioDevice>,
    request: FormatRequest,
    options: &MixerOptions,
    clips: &[Arc<PcmBuffer>],
) -> Result<(MixSession, DeviceFormat)> {
    let format = negotiate(&request, &device.capabilities()).context("No usable output format")?;
    log_info!(
        "Output: {:?} {}Hz {}ch, {} frames per period",
        format.code(),
        format.frequency,
        format.channels(),
        format.period_frames
    );
    let stack = build_stack(options, clips, &format)?;

    let mut session = MixSession::new(device);
    session
        .init_with_volume(request, stack, (), options.volume)
        .context("Failed to start the mixer")?;
    let active = session.format()?;
    if active != format {
        anyhow::bail!("Output device changed format during startup");
    }
    Ok((session, format))
}

fn load_clip(path: &Path) -> Result<Arc<PcmBuffer>> {
    let mut decoder =
        open_decoder(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let pcm = decode_all(&mut *decoder)
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    decoder.close();
    log_info!(
        "Loaded {}: {} frames at {}Hz",
        path.display(),
        pcm.frames(),
        pcm.frequency
    );
    Ok(Arc::new(pcm))
}

fn build_stack(
    options: &MixerOptions,
    clips: &[Arc<PcmBuffer>],
    format: &DeviceFormat,
) -> Result<MixStack> {
    let mut stack = MixStack::new(options.normalize);
    for (clip, path) in clips.iter().zip(&options.sources) {
        let stream = SourceStream::new(
            Box::new(MemoryDecoder::new(Arc::clone(clip))),
            format,
            Volume::UNITY,
            options.looping,
        )
        .with_context(|| {
            format!(
                "{} ({}Hz, {}ch) cannot be mixed into {}Hz {}ch output",
                path.display(),
                clip.frequency,
                clip.format.channels,
                format.frequency,
                format.channels()
            )
        })?;
        stack.push(stream);
    }

    let tone_format = SampleFormat::from_code(format.code(), format.channels())?;
    for tone in &options.tones {
        let decoder = ToneDecoder::sine(tone.hz, tone.amplitude, tone_format, format.frequency);
        stack.push(SourceStream::new(
            Box::new(decoder),
            format,
            Volume::UNITY,
            false,
        )?);
    }
    Ok(stack)
}

/// Frames to produce: the requested duration, else the longest finite clip
fn total_frames(options: &MixerOptions, clips: &[Arc<PcmBuffer>], format: &DeviceFormat) -> usize {
    let endless = options.looping || !options.tones.is_empty() || clips.is_empty();
    let ms = match options.duration_ms {
        Some(ms) => ms,
        None if endless => DEFAULT_DURATION_MS,
        None => return clips.iter().map(|c| c.frames()).max().unwrap_or(0),
    };
    (format.frequency as u64 * ms as u64 / 1000) as usize
}
