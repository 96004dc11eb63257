//! Generated test signals
//!
//! A [`ToneDecoder`] synthesizes a sine wave or a constant level directly in
//! any supported encoding. It neither blocks nor allocates in `read`, so it
//! can be pulled from inside a fill callback.

use std::f32::consts::TAU;

use super::decoder::{DecodeError, DecodeResult, SoundDecoder};
use crate::sound::mixer::convert::encode_sample;
use crate::sound::mixer::format::SampleFormat;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Waveform {
    Sine { hz: f32 },
    Constant,
}

/// Sine or constant signal generator
pub struct ToneDecoder {
    waveform: Waveform,
    /// Peak value in the encoding's own scale
    amplitude: i32,
    format: SampleFormat,
    frequency: u32,
    /// Length in frames; `None` runs forever
    length: Option<u32>,
    /// Wide so endless tones keep their phase past `u32::MAX` frames
    frame: u64,
    open: bool,
}

impl ToneDecoder {
    /// Sine of `hz` at `amplitude` (0.0..=1.0 of full scale)
    pub fn sine(hz: f32, amplitude: f32, format: SampleFormat, frequency: u32) -> Self {
        let peak = (format.code.max_value() as f32 * amplitude.clamp(0.0, 1.0)) as i32;
        ToneDecoder {
            waveform: Waveform::Sine { hz },
            amplitude: peak,
            format,
            frequency,
            length: None,
            frame: 0,
            open: true,
        }
    }

    /// Every sample holds `value`, saturated to the encoding
    pub fn constant(value: i32, format: SampleFormat, frequency: u32) -> Self {
        ToneDecoder {
            waveform: Waveform::Constant,
            amplitude: value,
            format,
            frequency,
            length: None,
            frame: 0,
            open: true,
        }
    }

    /// Stop after `frames` frames
    pub fn with_length(mut self, frames: u32) -> Self {
        self.length = Some(frames);
        self
    }

    fn value_at(&self, frame: u64) -> i32 {
        match self.waveform {
            Waveform::Constant => self.amplitude,
            Waveform::Sine { hz } => {
                let phase = (frame as f64 * hz as f64 / self.frequency as f64).fract() as f32;
                (self.amplitude as f32 * (phase * TAU).sin()) as i32
            }
        }
    }
}

impl SoundDecoder for ToneDecoder {
    fn name(&self) -> &'static str {
        "Tone"
    }

    fn format(&self) -> SampleFormat {
        self.format
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn read(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        if !self.open {
            return Err(DecodeError::NotOpen);
        }
        let frame_size = self.format.frame_size();
        let mut frames = buf.len() / frame_size;
        if let Some(length) = self.length {
            frames = frames.min((length as u64).saturating_sub(self.frame) as usize);
        }
        if frames == 0 {
            return Err(DecodeError::EndOfStream);
        }

        let bps = self.format.code.bytes_per_sample();
        let channels = self.format.channels as usize;
        for f in 0..frames {
            let value = self.value_at(self.frame + f as u64);
            for ch in 0..channels {
                let offset = (f * channels + ch) * bps;
                encode_sample(value, self.format.code, &mut buf[offset..offset + bps])
                    .map_err(|e| DecodeError::InvalidData(e.to_string()))?;
            }
        }
        self.frame += frames as u64;
        Ok(frames * frame_size)
    }

    fn seek(&mut self, frame: u32) -> DecodeResult<u32> {
        if !self.open {
            return Err(DecodeError::NotOpen);
        }
        let frame = match self.length {
            Some(length) => frame.min(length),
            None => frame,
        };
        self.frame = frame as u64;
        Ok(frame)
    }

    fn tell(&self) -> u32 {
        self.frame.min(u32::MAX as u64) as u32
    }

    fn length_frames(&self) -> Option<u32> {
        self.length
    }

    fn close(&mut self) {
        self.open = false;
    }
}
