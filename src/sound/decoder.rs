//! PCM source trait
//!
//! Defines the pull interface decoders expose to the mixer: open (a
//! constructor on each decoder), read, seek and close. Decoders hand out raw
//! PCM in one of the engine's sample formats and never resample.

use std::sync::Arc;

use crate::sound::mixer::format::SampleFormat;

/// Error type for decoder operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
    /// Invalid or corrupted audio data
    #[error("Invalid audio data: {0}")]
    InvalidData(String),
    /// Audio encoding the engine cannot take
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
    /// Decoder was closed
    #[error("Decoder not open")]
    NotOpen,
    /// No more PCM data
    #[error("End of stream")]
    EndOfStream,
    /// Seek failed
    #[error("Seek failed: {0}")]
    SeekFailed(String),
}

/// Result type for decoder operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A pull source of raw PCM frames.
///
/// `read` fills whole frames only. Implementations used inside a fill
/// callback must not block or allocate in `read`.
pub trait SoundDecoder: Send {
    /// Returns the decoder name (e.g., "Ogg Vorbis", "WAV")
    fn name(&self) -> &'static str;

    /// Encoding and channel layout of the PCM this decoder produces
    fn format(&self) -> SampleFormat;

    /// Returns the sample frequency in Hz
    fn frequency(&self) -> u32;

    /// Decode into `buf`, returning the number of bytes written.
    ///
    /// Returns `EndOfStream` once no frame can be produced.
    fn read(&mut self, buf: &mut [u8]) -> DecodeResult<usize>;

    /// Seek to a frame position, returning the position reached
    fn seek(&mut self, frame: u32) -> DecodeResult<u32>;

    /// Current frame position
    fn tell(&self) -> u32;

    /// Total length in frames, when known
    fn length_frames(&self) -> Option<u32> {
        None
    }

    /// Release the underlying stream. Further reads return `NotOpen`.
    fn close(&mut self);
}

/// Fully decoded PCM held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    pub format: SampleFormat,
    pub frequency: u32,
    pub data: Vec<u8>,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        self.data.len() / self.format.frame_size()
    }
}

/// Drain a decoder into memory. Meant for load time, off the audio thread.
pub fn decode_all(decoder: &mut dyn SoundDecoder) -> DecodeResult<PcmBuffer> {
    let format = decoder.format();
    let mut data = Vec::new();
    let mut chunk = vec![0u8; format.frame_size() * 4096];
    loop {
        match decoder.read(&mut chunk) {
            Ok(0) | Err(DecodeError::EndOfStream) => break,
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(e) => return Err(e),
        }
    }
    Ok(PcmBuffer {
        format,
        frequency: decoder.frequency(),
        data,
    })
}

/// Reads PCM out of a shared in-memory buffer without allocating
pub struct MemoryDecoder {
    pcm: Option<Arc<PcmBuffer>>,
    format: SampleFormat,
    frequency: u32,
    /// Byte offset of the next frame
    pos: usize,
}

impl MemoryDecoder {
    pub fn new(pcm: Arc<PcmBuffer>) -> Self {
        MemoryDecoder {
            format: pcm.format,
            frequency: pcm.frequency,
            pcm: Some(pcm),
            pos: 0,
        }
    }
}

impl SoundDecoder for MemoryDecoder {
    fn name(&self) -> &'static str {
        "Memory"
    }

    fn format(&self) -> SampleFormat {
        self.format
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn read(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        let pcm = self.pcm.as_ref().ok_or(DecodeError::NotOpen)?;
        let frame_size = self.format.frame_size();
        let available = pcm.data.len().saturating_sub(self.pos);
        let n = available.min(buf.len()) / frame_size * frame_size;
        if n == 0 {
            return Err(DecodeError::EndOfStream);
        }
        buf[..n].copy_from_slice(&pcm.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, frame: u32) -> DecodeResult<u32> {
        let pcm = self.pcm.as_ref().ok_or(DecodeError::NotOpen)?;
        let frame = (frame as usize).min(pcm.frames());
        self.pos = frame * self.format.frame_size();
        Ok(frame as u32)
    }

    fn tell(&self) -> u32 {
        (self.pos / self.format.frame_size()) as u32
    }

    fn length_frames(&self) -> Option<u32> {
        self.pcm.as_ref().map(|p| p.frames() as u32)
    }

    fn close(&mut self) {
        self.pcm = None;
        self.pos = 0;
    }
}
