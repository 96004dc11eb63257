// convert.rs - Conversion between storage formats and the accumulator

//! Sample conversion between narrow storage encodings and the wide
//! accumulator.
//!
//! Samples keep their native scale in the accumulator: an 8-bit sample of 100
//! becomes 100, a 16-bit sample of -3000 becomes -3000. Unsigned 8-bit data is
//! bias-corrected (128 is silence) on the way in and re-biased on the way out.

use crate::sound::mixer::format::{ByteOrder, SampleFormatCode};
use crate::sound::mixer::types::{MixResult, MixerError, Volume};

/// Storage layout after resolving the native byte-order alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    U8,
    S8,
    S16Le,
    S16Be,
    S32Le,
}

fn layout(format: SampleFormatCode) -> MixResult<Layout> {
    match (format.bits(), format.is_signed(), format.byte_order().resolve()) {
        (8, false, _) => Ok(Layout::U8),
        (8, true, _) => Ok(Layout::S8),
        (16, true, ByteOrder::Little) => Ok(Layout::S16Le),
        (16, true, ByteOrder::Big) => Ok(Layout::S16Be),
        (32, true, ByteOrder::Little) => Ok(Layout::S32Le),
        _ => Err(MixerError::InvalidFormat),
    }
}

/// Byte length of `samples` samples, or `InvalidArgument` on overflow
fn byte_len(samples: usize, format: SampleFormatCode) -> MixResult<usize> {
    samples
        .checked_mul(format.bytes_per_sample())
        .ok_or(MixerError::InvalidArgument)
}

#[inline]
fn add_scaled(dest: &mut [i32], decoded: impl Iterator<Item = i32>, volume: Volume) {
    if volume.is_unity() {
        for (d, s) in dest.iter_mut().zip(decoded) {
            *d = d.wrapping_add(s);
        }
    } else {
        for (d, s) in dest.iter_mut().zip(decoded) {
            *d = d.wrapping_add(volume.apply(s));
        }
    }
}

/// Decode `samples` narrow samples from `src`, scale them by `volume` and add
/// them into `dest`.
///
/// Both buffers may be longer than needed; only the first `samples` entries
/// are touched. To mix at an offset, slice `dest`.
pub fn convert_mix(
    dest: &mut [i32],
    src: &[u8],
    samples: usize,
    format: SampleFormatCode,
    volume: Volume,
) -> MixResult<()> {
    let layout = layout(format)?;
    let dest = dest.get_mut(..samples).ok_or(MixerError::InvalidArgument)?;
    let src = src
        .get(..byte_len(samples, format)?)
        .ok_or(MixerError::InvalidArgument)?;

    if volume.is_silent() {
        return Ok(());
    }

    match layout {
        Layout::U8 => add_scaled(dest, src.iter().map(|&b| b as i32 - 128), volume),
        Layout::S8 => add_scaled(dest, src.iter().map(|&b| b as i8 as i32), volume),
        Layout::S16Le => add_scaled(
            dest,
            src.chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32),
            volume,
        ),
        Layout::S16Be => add_scaled(
            dest,
            src.chunks_exact(2)
                .map(|c| i16::from_be_bytes([c[0], c[1]]) as i32),
            volume,
        ),
        Layout::S32Le => add_scaled(
            dest,
            src.chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            volume,
        ),
    }
    Ok(())
}

/// Write `samples` accumulator values into `dest` in `format`, saturating
/// anything outside the encoding's range.
pub fn convert_acc(
    dest: &mut [u8],
    src: &[i32],
    samples: usize,
    format: SampleFormatCode,
) -> MixResult<()> {
    let layout = layout(format)?;
    let src = src.get(..samples).ok_or(MixerError::InvalidArgument)?;
    let dest = dest
        .get_mut(..byte_len(samples, format)?)
        .ok_or(MixerError::InvalidArgument)?;

    match layout {
        Layout::U8 => {
            for (d, &s) in dest.iter_mut().zip(src) {
                *d = (s.clamp(i8::MIN as i32, i8::MAX as i32) + 128) as u8;
            }
        }
        Layout::S8 => {
            for (d, &s) in dest.iter_mut().zip(src) {
                *d = s.clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8;
            }
        }
        Layout::S16Le => {
            for (d, &s) in dest.chunks_exact_mut(2).zip(src) {
                d.copy_from_slice(&clamp_i16(s).to_le_bytes());
            }
        }
        Layout::S16Be => {
            for (d, &s) in dest.chunks_exact_mut(2).zip(src) {
                d.copy_from_slice(&clamp_i16(s).to_be_bytes());
            }
        }
        Layout::S32Le => {
            for (d, &s) in dest.chunks_exact_mut(4).zip(src) {
                d.copy_from_slice(&s.to_le_bytes());
            }
        }
    }
    Ok(())
}

#[inline]
fn clamp_i16(s: i32) -> i16 {
    s.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encode a single value in `format`, saturating. Used to build test and
/// tone buffers outside the hot path.
pub fn encode_sample(value: i32, format: SampleFormatCode, out: &mut [u8]) -> MixResult<()> {
    convert_acc(out, &[value], 1, format)
}

/// Decode the sample at `index` of a buffer in `format`
pub fn decode_sample(data: &[u8], index: usize, format: SampleFormatCode) -> MixResult<i32> {
    let bps = format.bytes_per_sample();
    let start = index.checked_mul(bps).ok_or(MixerError::InvalidArgument)?;
    let end = start.checked_add(bps).ok_or(MixerError::InvalidArgument)?;
    let bytes = data.get(start..end).ok_or(MixerError::InvalidArgument)?;
    let mut out = [0i32; 1];
    convert_mix(&mut out, bytes, 1, format, Volume::UNITY)?;
    Ok(out[0])
}
