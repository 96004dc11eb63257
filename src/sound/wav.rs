//! WAV container support
//!
//! Reading goes through [`WavDecoder`], writing through [`write_wav`]. Both use
//! `hound` and only handle integer PCM at 8, 16 or 32 bits.

use std::io::{self, Cursor};
use std::path::Path;

use super::decoder::{DecodeError, DecodeResult, SoundDecoder};
use crate::sound::mixer::convert::decode_sample;
use crate::sound::mixer::format::{SampleFormat, SampleFormatCode};

type Reader = hound::WavReader<Cursor<Vec<u8>>>;

/// WAV decoder
pub struct WavDecoder {
    reader: Option<Reader>,
    format: SampleFormat,
    frequency: u32,
    total_frames: u32,
    current_frame: u32,
}

fn wav_error(e: hound::Error) -> DecodeError {
    match e {
        hound::Error::IoError(io) => DecodeError::IoError(io.to_string()),
        hound::Error::Unsupported => DecodeError::UnsupportedFormat("WAV encoding".to_string()),
        other => DecodeError::InvalidData(other.to_string()),
    }
}

impl WavDecoder {
    /// Open a WAV file
    pub fn open(path: &Path) -> DecodeResult<Self> {
        let data = std::fs::read(path)
            .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;
        Self::open_from_bytes(data)
    }

    /// Open a WAV stream held in memory
    pub fn open_from_bytes(data: Vec<u8>) -> DecodeResult<Self> {
        let reader = hound::WavReader::new(Cursor::new(data)).map_err(wav_error)?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(DecodeError::UnsupportedFormat("floating-point WAV".to_string()));
        }
        let code = match spec.bits_per_sample {
            8 => SampleFormatCode::S8,
            16 => SampleFormatCode::S16Native,
            32 => SampleFormatCode::S32,
            bits => {
                return Err(DecodeError::UnsupportedFormat(format!("{}-bit WAV", bits)));
            }
        };
        let channels = u8::try_from(spec.channels)
            .map_err(|_| DecodeError::UnsupportedFormat(format!("{} channels", spec.channels)))?;
        let format = SampleFormat::from_code(code, channels)
            .map_err(|_| DecodeError::UnsupportedFormat(format!("{} channels", spec.channels)))?;

        Ok(WavDecoder {
            total_frames: reader.duration(),
            reader: Some(reader),
            format,
            frequency: spec.sample_rate,
            current_frame: 0,
        })
    }
}

impl SoundDecoder for WavDecoder {
    fn name(&self) -> &'static str {
        "WAV"
    }

    fn format(&self) -> SampleFormat {
        self.format
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn read(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        let reader = self.reader.as_mut().ok_or(DecodeError::NotOpen)?;
        let frame_size = self.format.frame_size();
        let remaining = (self.total_frames - self.current_frame) as usize;
        let frames = (buf.len() / frame_size).min(remaining);
        if frames == 0 {
            return Err(DecodeError::EndOfStream);
        }

        let samples = frames * self.format.channels as usize;
        let code = self.format.code;
        let bps = code.bytes_per_sample();
        for (i, sample) in reader.samples::<i32>().take(samples).enumerate() {
            let value = sample.map_err(wav_error)?;
            let out = &mut buf[i * bps..(i + 1) * bps];
            match code {
                SampleFormatCode::S8 => out[0] = value as i8 as u8,
                SampleFormatCode::S32 => out.copy_from_slice(&value.to_le_bytes()),
                _ => out.copy_from_slice(&(value as i16).to_ne_bytes()),
            }
        }
        self.current_frame += frames as u32;
        Ok(frames * frame_size)
    }

    fn seek(&mut self, frame: u32) -> DecodeResult<u32> {
        let reader = self.reader.as_mut().ok_or(DecodeError::NotOpen)?;
        let frame = frame.min(self.total_frames);
        reader
            .seek(frame)
            .map_err(|e| DecodeError::SeekFailed(e.to_string()))?;
        self.current_frame = frame;
        Ok(frame)
    }

    fn tell(&self) -> u32 {
        self.current_frame
    }

    fn length_frames(&self) -> Option<u32> {
        Some(self.total_frames)
    }

    fn close(&mut self) {
        self.reader = None;
        self.current_frame = 0;
    }
}

/// Write raw PCM in `format` to a WAV file.
///
/// Big-endian and unsigned input is converted to what the container stores.
/// `data` must hold whole samples.
pub fn write_wav(
    path: &Path,
    format: SampleFormat,
    frequency: u32,
    data: &[u8],
) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: format.channels as u16,
        sample_rate: frequency,
        bits_per_sample: format.bits() as u16,
        sample_format: hound::SampleFormat::Int,
    };
    let code = format.code;
    let bps = code.bytes_per_sample();
    if data.len() % bps != 0 {
        return Err(hound::Error::IoError(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} bytes is not a whole number of {:?} samples", data.len(), code),
        )));
    }
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in data.chunks_exact(bps) {
        let value = decode_sample(sample, 0, code)
            .map_err(|e| hound::Error::IoError(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        match code.bits() {
            8 => writer.write_sample(value as i8)?,
            16 => writer.write_sample(value as i16)?,
            _ => writer.write_sample(value)?,
        }
    }
    writer.finalize()
}
