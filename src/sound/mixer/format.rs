// format.rs - Sample format descriptors and device format negotiation

//! Sample format descriptors and format negotiation.
//!
//! Format codes use the SDL audio format layout so existing callers can pass
//! their values straight through: the low byte holds the bit depth, `0x8000`
//! marks signed samples and `0x1000` marks big-endian storage.

use crate::sound::mixer::types::{MixResult, MixerError};

const FORMAT_BITS_MASK: u16 = 0x00FF;
const FORMAT_SIGNED: u16 = 0x8000;
const FORMAT_BIG_ENDIAN: u16 = 0x1000;

/// Raw code of unsigned 8-bit samples
pub const AUDIO_U8: u16 = 0x0008;
/// Raw code of signed 8-bit samples
pub const AUDIO_S8: u16 = 0x8008;
/// Raw code of signed 16-bit little-endian samples
pub const AUDIO_S16LSB: u16 = 0x8010;
/// Raw code of signed 16-bit big-endian samples
pub const AUDIO_S16MSB: u16 = 0x9010;
/// Raw code of signed 32-bit samples
pub const AUDIO_S32: u16 = 0x8020;

/// Largest accumulator a session allocates, in cells (16 MiB of `i32`)
pub const MAX_PERIOD_SAMPLES: u64 = 1 << 22;

/// Raw code of signed 16-bit samples in host byte order
#[cfg(target_endian = "little")]
pub const AUDIO_S16SYS: u16 = AUDIO_S16LSB;
#[cfg(target_endian = "big")]
pub const AUDIO_S16SYS: u16 = AUDIO_S16MSB;

/// Byte order of multi-byte samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
    /// Whatever the host uses
    Native,
}

impl ByteOrder {
    /// Resolve `Native` to the concrete host order
    pub fn resolve(self) -> ByteOrder {
        match self {
            ByteOrder::Native if cfg!(target_endian = "big") => ByteOrder::Big,
            ByteOrder::Native => ByteOrder::Little,
            other => other,
        }
    }
}

/// The enumerated sample encodings the engine converts to and from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormatCode {
    U8,
    S8,
    S16Lsb,
    S16Msb,
    /// Signed 16-bit in host byte order; an alias of `S16Lsb` or `S16Msb`
    S16Native,
    /// Signed 32-bit, little-endian
    S32,
}

impl SampleFormatCode {
    pub const ALL: [SampleFormatCode; 6] = [
        SampleFormatCode::U8,
        SampleFormatCode::S8,
        SampleFormatCode::S16Lsb,
        SampleFormatCode::S16Msb,
        SampleFormatCode::S16Native,
        SampleFormatCode::S32,
    ];

    /// Parse a raw format code
    pub fn from_code(code: u16) -> MixResult<Self> {
        match code {
            AUDIO_U8 => Ok(SampleFormatCode::U8),
            AUDIO_S8 => Ok(SampleFormatCode::S8),
            AUDIO_S16LSB => Ok(SampleFormatCode::S16Lsb),
            AUDIO_S16MSB => Ok(SampleFormatCode::S16Msb),
            AUDIO_S32 => Ok(SampleFormatCode::S32),
            _ => Err(MixerError::InvalidFormat),
        }
    }

    /// Raw format code; `S16Native` reports the host's concrete code
    pub fn code(self) -> u16 {
        match self {
            SampleFormatCode::U8 => AUDIO_U8,
            SampleFormatCode::S8 => AUDIO_S8,
            SampleFormatCode::S16Lsb => AUDIO_S16LSB,
            SampleFormatCode::S16Msb => AUDIO_S16MSB,
            SampleFormatCode::S16Native => AUDIO_S16SYS,
            SampleFormatCode::S32 => AUDIO_S32,
        }
    }

    /// Look up an encoding from its descriptor fields
    pub fn from_parts(bits: u8, signed: bool, byte_order: ByteOrder) -> MixResult<Self> {
        match (bits, signed, byte_order) {
            (8, false, _) => Ok(SampleFormatCode::U8),
            (8, true, _) => Ok(SampleFormatCode::S8),
            (16, true, ByteOrder::Little) => Ok(SampleFormatCode::S16Lsb),
            (16, true, ByteOrder::Big) => Ok(SampleFormatCode::S16Msb),
            (16, true, ByteOrder::Native) => Ok(SampleFormatCode::S16Native),
            (32, true, ByteOrder::Little) => Ok(SampleFormatCode::S32),
            (32, true, ByteOrder::Native) if cfg!(target_endian = "little") => {
                Ok(SampleFormatCode::S32)
            }
            _ => Err(MixerError::InvalidFormat),
        }
    }

    /// Replace the native alias with the concrete host encoding
    pub fn resolve(self) -> SampleFormatCode {
        match self {
            SampleFormatCode::S16Native => match ByteOrder::Native.resolve() {
                ByteOrder::Big => SampleFormatCode::S16Msb,
                _ => SampleFormatCode::S16Lsb,
            },
            other => other,
        }
    }

    pub fn bits(self) -> u8 {
        (self.code() & FORMAT_BITS_MASK) as u8
    }

    pub fn bytes_per_sample(self) -> usize {
        self.bits() as usize / 8
    }

    pub fn is_signed(self) -> bool {
        self.code() & FORMAT_SIGNED != 0
    }

    pub fn byte_order(self) -> ByteOrder {
        match self {
            SampleFormatCode::S16Native => ByteOrder::Native,
            other if other.code() & FORMAT_BIG_ENDIAN != 0 => ByteOrder::Big,
            _ => ByteOrder::Little,
        }
    }

    /// Smallest value a sample of this encoding represents, after bias removal
    pub fn min_value(self) -> i32 {
        match self.bits() {
            8 => i8::MIN as i32,
            16 => i16::MIN as i32,
            _ => i32::MIN,
        }
    }

    /// Largest value a sample of this encoding represents, after bias removal
    pub fn max_value(self) -> i32 {
        match self.bits() {
            8 => i8::MAX as i32,
            16 => i16::MAX as i32,
            _ => i32::MAX,
        }
    }

    /// Two codes describing the same storage layout
    pub fn same_layout(self, other: SampleFormatCode) -> bool {
        self.resolve() == other.resolve()
    }
}

/// Encoding plus channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    pub code: SampleFormatCode,
    pub channels: u8,
}

impl SampleFormat {
    /// Validate a descriptor. Rejects unsupported encodings and zero channels.
    pub fn new(bits: u8, signed: bool, byte_order: ByteOrder, channels: u8) -> MixResult<Self> {
        let code = SampleFormatCode::from_parts(bits, signed, byte_order)?;
        SampleFormat::from_code(code, channels)
    }

    pub fn from_code(code: SampleFormatCode, channels: u8) -> MixResult<Self> {
        if channels == 0 {
            return Err(MixerError::InvalidFormat);
        }
        Ok(SampleFormat { code, channels })
    }

    pub fn bits(&self) -> u8 {
        self.code.bits()
    }

    pub fn is_signed(&self) -> bool {
        self.code.is_signed()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.code.byte_order()
    }

    /// Bytes in one frame (one sample per channel)
    pub fn frame_size(&self) -> usize {
        self.code.bytes_per_sample() * self.channels as usize
    }
}

/// Negotiated output format. Immutable for the life of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub sample: SampleFormat,
    pub frequency: u32,
    pub period_frames: u32,
}

impl DeviceFormat {
    pub fn code(&self) -> SampleFormatCode {
        self.sample.code
    }

    pub fn channels(&self) -> u8 {
        self.sample.channels
    }

    /// Accumulator cells per period
    pub fn period_samples(&self) -> usize {
        (self.period_frames as usize).saturating_mul(self.sample.channels as usize)
    }

    /// Output bytes per period
    pub fn buffer_bytes(&self) -> usize {
        (self.period_frames as usize).saturating_mul(self.sample.frame_size())
    }

    /// Checks the period stays within [`MAX_PERIOD_SAMPLES`] and its byte
    /// size fits a `u32`.
    pub fn validate_period(&self) -> MixResult<()> {
        let samples = (self.period_frames as u64)
            .checked_mul(self.sample.channels as u64)
            .ok_or(MixerError::InvalidFormat)?;
        let bytes = samples
            .checked_mul(self.sample.code.bytes_per_sample() as u64)
            .ok_or(MixerError::InvalidFormat)?;
        if samples > MAX_PERIOD_SAMPLES || bytes > u32::MAX as u64 {
            return Err(MixerError::InvalidFormat);
        }
        Ok(())
    }

    /// Wall-clock length of one period in milliseconds
    pub fn period_ms(&self) -> f64 {
        self.period_frames as f64 * 1000.0 / self.frequency as f64
    }
}

/// What the caller asks for at init time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRequest {
    pub frequency: u32,
    pub format: SampleFormatCode,
    pub channels: u8,
    pub buffer_ms: u32,
}

impl FormatRequest {
    pub fn new(frequency: u32, format: SampleFormatCode, channels: u8, buffer_ms: u32) -> Self {
        FormatRequest {
            frequency,
            format,
            channels,
            buffer_ms,
        }
    }
}

/// What a device can play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Supported encodings, in order of preference
    pub encodings: Vec<SampleFormatCode>,
    pub min_frequency: u32,
    pub max_frequency: u32,
    pub max_channels: u8,
    /// Period length must be a multiple of this many frames
    pub period_granularity: u32,
}

impl DeviceCapabilities {
    /// A device accepting every encoding, rate and channel layout
    pub fn unrestricted() -> Self {
        DeviceCapabilities {
            encodings: SampleFormatCode::ALL.to_vec(),
            min_frequency: 1,
            max_frequency: u32::MAX,
            max_channels: u8::MAX,
            period_granularity: 1,
        }
    }

    pub fn supports(&self, code: SampleFormatCode) -> bool {
        self.encodings.iter().any(|c| c.same_layout(code))
    }

    fn closest_encoding(&self, wanted: SampleFormatCode) -> Option<SampleFormatCode> {
        if self.supports(wanted) {
            return Some(wanted);
        }
        self.find(|c| c.bits() == wanted.bits() && c.is_signed() == wanted.is_signed())
            .or_else(|| self.find(|c| c.bits() == wanted.bits()))
            .or_else(|| self.find(|c| c.same_layout(SampleFormatCode::S16Native)))
            .or_else(|| self.encodings.first().copied())
    }

    fn find(&self, pred: impl Fn(SampleFormatCode) -> bool) -> Option<SampleFormatCode> {
        self.encodings.iter().copied().find(|c| pred(*c))
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        DeviceCapabilities::unrestricted()
    }
}

/// Frames per period for a buffer duration, rounded to `granularity`, never zero
pub fn period_frames_for(frequency: u32, buffer_ms: u32, granularity: u32) -> u32 {
    let granularity = granularity.max(1) as u64;
    let frames = (frequency as u64 * buffer_ms as u64 + 500) / 1000;
    let rounded = (frames + granularity / 2) / granularity * granularity;
    rounded.max(granularity).min(u32::MAX as u64) as u32
}

/// Pick the device format closest to `request` among the device's capabilities.
pub fn negotiate(request: &FormatRequest, caps: &DeviceCapabilities) -> MixResult<DeviceFormat> {
    if request.frequency == 0 || request.channels == 0 || request.buffer_ms == 0 {
        return Err(MixerError::InvalidFormat);
    }
    if caps.max_channels == 0 || caps.max_frequency == 0 || caps.min_frequency > caps.max_frequency {
        return Err(MixerError::DeviceUnavailable);
    }

    let code = caps
        .closest_encoding(request.format)
        .ok_or(MixerError::DeviceUnavailable)?;
    let frequency = request
        .frequency
        .clamp(caps.min_frequency.max(1), caps.max_frequency);
    let channels = request.channels.min(caps.max_channels);
    let period_frames = period_frames_for(frequency, request.buffer_ms, caps.period_granularity);

    if code != request.format || frequency != request.frequency || channels != request.channels {
        log::debug!(
            "negotiated {:?}/{}Hz/{}ch from request {:?}/{}Hz/{}ch",
            code,
            frequency,
            channels,
            request.format,
            request.frequency,
            request.channels
        );
    }

    let format = DeviceFormat {
        sample: SampleFormat::from_code(code, channels)?,
        frequency,
        period_frames,
    };
    if let Err(err) = format.validate_period() {
        log::debug!(
            "period of {} frames x {}ch exceeds {} cells",
            period_frames,
            channels,
            MAX_PERIOD_SAMPLES
        );
        return Err(err);
    }
    Ok(format)
}
