//! Ogg Vorbis decoder implementation
//!
//! Uses the `lewton` crate for pure Rust Ogg Vorbis decoding. Output is
//! signed 16-bit PCM in host byte order.

use std::io::Cursor;
use std::path::Path;

use lewton::inside_ogg::OggStreamReader;

use super::decoder::{DecodeError, DecodeResult, SoundDecoder};
use crate::sound::mixer::format::{SampleFormat, SampleFormatCode};

type Reader = OggStreamReader<Cursor<Vec<u8>>>;

/// Ogg Vorbis decoder using lewton
pub struct OggDecoder {
    reader: Option<Reader>,
    /// Encoded stream, kept for rewinding
    data: Vec<u8>,
    format: SampleFormat,
    frequency: u32,
    /// Decoded interleaved samples of the current packet
    packet: Vec<i16>,
    /// Next unread sample in `packet`
    packet_pos: usize,
    /// Frame position of the next sample handed out
    current_frame: u64,
}

fn open_reader(data: Vec<u8>) -> DecodeResult<Reader> {
    OggStreamReader::new(Cursor::new(data))
        .map_err(|e| DecodeError::InvalidData(format!("Failed to open Ogg stream: {:?}", e)))
}

impl OggDecoder {
    /// Open an Ogg Vorbis file
    pub fn open(path: &Path) -> DecodeResult<Self> {
        let data = std::fs::read(path)
            .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;
        Self::open_from_bytes(data)
    }

    /// Open an Ogg Vorbis stream held in memory
    pub fn open_from_bytes(data: Vec<u8>) -> DecodeResult<Self> {
        let reader = open_reader(data.clone())?;
        let channels = reader.ident_hdr.audio_channels;
        let frequency = reader.ident_hdr.audio_sample_rate;
        let format = SampleFormat::from_code(SampleFormatCode::S16Native, channels)
            .map_err(|_| DecodeError::UnsupportedFormat(format!("{} channels", channels)))?;

        log::debug!("opened Ogg stream: {}Hz, {} channels", frequency, channels);

        Ok(OggDecoder {
            reader: Some(reader),
            data,
            format,
            frequency,
            packet: Vec::new(),
            packet_pos: 0,
            current_frame: 0,
        })
    }

    /// Decode the next packet. Returns false at end of stream.
    fn next_packet(&mut self) -> DecodeResult<bool> {
        let reader = self.reader.as_mut().ok_or(DecodeError::NotOpen)?;
        match reader.read_dec_packet_itl() {
            Ok(Some(samples)) => {
                self.packet = samples;
                self.packet_pos = 0;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DecodeError::InvalidData(format!("Ogg decode error: {:?}", e))),
        }
    }

    fn rewind(&mut self) -> DecodeResult<()> {
        if self.reader.is_none() {
            return Err(DecodeError::NotOpen);
        }
        self.reader = Some(
            open_reader(self.data.clone())
                .map_err(|e| DecodeError::SeekFailed(format!("Failed to rewind: {}", e)))?,
        );
        self.packet.clear();
        self.packet_pos = 0;
        self.current_frame = 0;
        Ok(())
    }
}

impl SoundDecoder for OggDecoder {
    fn name(&self) -> &'static str {
        "Ogg Vorbis"
    }

    fn format(&self) -> SampleFormat {
        self.format
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn read(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        if self.reader.is_none() {
            return Err(DecodeError::NotOpen);
        }

        let channels = self.format.channels as usize;
        let frame_size = self.format.frame_size();
        let capacity = buf.len() / frame_size * frame_size;
        let mut written = 0;

        while written < capacity {
            if self.packet_pos >= self.packet.len() && !self.next_packet()? {
                break;
            }
            let samples = (self.packet.len() - self.packet_pos).min((capacity - written) / 2);
            for (i, sample) in self.packet[self.packet_pos..self.packet_pos + samples]
                .iter()
                .enumerate()
            {
                let offset = written + i * 2;
                buf[offset..offset + 2].copy_from_slice(&sample.to_ne_bytes());
            }
            self.packet_pos += samples;
            written += samples * 2;
            self.current_frame += (samples / channels) as u64;
        }

        if written == 0 {
            return Err(DecodeError::EndOfStream);
        }
        Ok(written)
    }

    fn seek(&mut self, frame: u32) -> DecodeResult<u32> {
        // lewton has no sample-accurate seek; rewind and decode forward
        let target = frame as u64;
        if target <= self.current_frame {
            self.rewind()?;
        }

        let channels = self.format.channels as u64;
        while self.current_frame < target {
            let buffered = (self.packet.len() - self.packet_pos) as u64 / channels;
            if buffered == 0 {
                if !self.next_packet()? {
                    break;
                }
                continue;
            }
            let skip = buffered.min(target - self.current_frame);
            self.packet_pos += (skip * channels) as usize;
            self.current_frame += skip;
        }
        Ok(self.current_frame as u32)
    }

    fn tell(&self) -> u32 {
        self.current_frame as u32
    }

    fn close(&mut self) {
        self.reader = None;
        self.data = Vec::new();
        self.packet.clear();
        self.packet_pos = 0;
        self.current_frame = 0;
    }
}
