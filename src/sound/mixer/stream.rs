// stream.rs - Decoder-backed sources mixed once per period

//! Source streams pull PCM from a [`SoundDecoder`] and add it into the
//! accumulator with [`convert_mix`]. All buffers are sized when the stream is
//! created, so mixing a period never allocates.

use crate::sound::decoder::{DecodeError, SoundDecoder};
use crate::sound::mixer::convert::convert_mix;
use crate::sound::mixer::format::{DeviceFormat, SampleFormat};
use crate::sound::mixer::mix::divide_accumulator;
use crate::sound::mixer::session::FillCallback;
use crate::sound::mixer::types::{MixResult, MixerError, Volume};

/// One decoder feeding the mix
pub struct SourceStream {
    decoder: Box<dyn SoundDecoder>,
    source: SampleFormat,
    /// Output channel count
    channels: usize,
    /// Raw PCM for up to one period
    staging: Vec<u8>,
    /// Decoded mono frames, only used when spreading to several channels
    spread: Vec<i32>,
    volume: Volume,
    looping: bool,
    finished: bool,
}

impl SourceStream {
    /// Wrap `decoder` for output in `device` format.
    ///
    /// The decoder must run at the device frequency. Its channel count must
    /// match the device, or be mono, in which case every channel gets the
    /// same signal.
    pub fn new(
        decoder: Box<dyn SoundDecoder>,
        device: &DeviceFormat,
        volume: Volume,
        looping: bool,
    ) -> MixResult<Self> {
        let source = decoder.format();
        if decoder.frequency() != device.frequency {
            log::warn!(
                "{} source runs at {}Hz, device at {}Hz",
                decoder.name(),
                decoder.frequency(),
                device.frequency
            );
            return Err(MixerError::InvalidFormat);
        }
        let channels = device.channels() as usize;
        let spreading = source.channels == 1 && channels > 1;
        if source.channels as usize != channels && !spreading {
            return Err(MixerError::InvalidFormat);
        }

        let frames = device.period_frames as usize;
        Ok(SourceStream {
            decoder,
            source,
            channels,
            staging: vec![0; frames * source.frame_size()],
            spread: if spreading { vec![0; frames] } else { Vec::new() },
            volume,
            looping,
            finished: false,
        })
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn set_volume(&mut self, volume: Volume) {
        self.volume = volume;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Staging capacity in frames
    fn chunk_frames(&self) -> usize {
        self.staging.len() / self.source.frame_size()
    }

    /// Add up to `frames` frames of this source into `acc` at `volume`.
    ///
    /// Returns false once the source is exhausted (and not looping) or its
    /// decoder failed. A short source leaves the rest of `acc` untouched.
    pub fn mix_into(&mut self, acc: &mut [i32], frames: u32, volume: Volume) -> bool {
        if self.finished {
            return false;
        }
        let frames = (frames as usize).min(acc.len() / self.channels);
        let frame_size = self.source.frame_size();
        let mut done = 0;
        let mut rewound = false;

        while done < frames {
            let want = (frames - done).min(self.chunk_frames());
            let read = self.decoder.read(&mut self.staging[..want * frame_size]);
            let got = match read {
                Ok(bytes) if bytes >= frame_size => bytes / frame_size,
                Ok(_) | Err(DecodeError::EndOfStream) => {
                    // A looping source that yields nothing right after a
                    // rewind is empty
                    if self.looping && !rewound && self.decoder.seek(0).is_ok() {
                        rewound = true;
                        continue;
                    }
                    self.finished = true;
                    break;
                }
                Err(err) => {
                    log::warn!("{} source stopped: {}", self.decoder.name(), err);
                    self.finished = true;
                    break;
                }
            };
            rewound = false;

            let offset = done * self.channels;
            let mixed = if self.spread.is_empty() {
                convert_mix(
                    &mut acc[offset..],
                    &self.staging,
                    got * self.channels,
                    self.source.code,
                    volume,
                )
            } else {
                self.spread_into(&mut acc[offset..], got, volume)
            };
            if let Err(err) = mixed {
                log::warn!("{} source stopped: {}", self.decoder.name(), err);
                self.finished = true;
                break;
            }
            done += got;
        }
        !self.finished
    }

    /// Mix `frames` mono frames from staging into every output channel
    fn spread_into(&mut self, acc: &mut [i32], frames: usize, volume: Volume) -> MixResult<()> {
        let mono = &mut self.spread[..frames];
        mono.fill(0);
        convert_mix(mono, &self.staging, frames, self.source.code, volume)?;
        for (frame, &value) in acc.chunks_exact_mut(self.channels).zip(mono.iter()) {
            for cell in frame {
                *cell = cell.wrapping_add(value);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("decoder", &self.decoder.name())
            .field("source", &self.source)
            .field("volume", &self.volume)
            .field("looping", &self.looping)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Fill callback mixing a fixed set of streams.
///
/// With `normalize` set, the accumulator is divided by the number of streams
/// that contributed to the period, so N full-scale sources cannot clip.
#[derive(Debug, Default)]
pub struct MixStack {
    streams: Vec<SourceStream>,
    normalize: bool,
}

impl MixStack {
    pub fn new(normalize: bool) -> Self {
        MixStack {
            streams: Vec::new(),
            normalize,
        }
    }

    pub fn push(&mut self, stream: SourceStream) {
        self.streams.push(stream);
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Streams that have not yet run out
    pub fn active(&self) -> usize {
        self.streams.iter().filter(|s| !s.is_finished()).count()
    }

    /// Mix one period of every live stream into `acc`
    pub fn mix_period(&mut self, acc: &mut [i32], frames: u32) {
        let mut contributed = 0;
        for stream in self.streams.iter_mut() {
            if stream.is_finished() {
                continue;
            }
            let volume = stream.volume();
            stream.mix_into(acc, frames, volume);
            contributed += 1;
        }

        if self.normalize && contributed > 1 {
            let samples = acc.len();
            if let Err(err) = divide_accumulator(acc, samples, contributed) {
                log::error!("normalizing mix failed: {}", err);
            }
        }
    }
}

impl<C> FillCallback<C> for MixStack {
    fn fill(&mut self, accumulator: &mut [i32], frames: u32, _context: &C) {
        self.mix_period(accumulator, frames);
    }
}
