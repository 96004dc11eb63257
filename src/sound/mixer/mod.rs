// mod.rs - Audio mixer module

//! Integer PCM mixing engine.
//!
//! A caller-supplied fill routine composes each device period into a wide
//! signed accumulator; the engine then applies the master volume and
//! saturates the result into the negotiated output encoding.
//!
//! # Architecture
//!
//! - `types` - Fixed-point volume and error codes
//! - `format` - Sample encodings and device format negotiation
//! - `convert` - Narrow storage formats to and from the accumulator
//! - `mix` - Accumulator primitives (copy, scale, mix, divide)
//! - `session` - Device session and the per-period render cycle
//! - `device` - Output devices (null, cpal)
//! - `stream` - Decoder-backed sources
//! - `ffi` - C ABI
//!
//! # Example
//!
//! ```rust,ignore
//! use gamelib_mixer::sound::mixer::{
//!     CpalDevice, FormatRequest, MixSession, SampleFormatCode,
//! };
//!
//! let mut session = MixSession::new(Box::new(CpalDevice::new()));
//! let request = FormatRequest::new(44100, SampleFormatCode::S16Native, 2, 20);
//! session.init(request, |acc: &mut [i32], _frames: u32, _: &()| acc.fill(0), ())?;
//!
//! // ... mix ...
//!
//! session.quit();
//! ```

pub mod convert;
pub mod device;
pub mod ffi;
pub mod format;
pub mod mix;
pub mod session;
pub mod stream;
pub mod types;

pub use types::{AtomicVolume, MixResult, MixerError, Volume, VOLUME_SHIFT, VOLUME_UNITY};

pub use format::{
    negotiate, period_frames_for, ByteOrder, DeviceCapabilities, DeviceFormat, FormatRequest,
    SampleFormat, SampleFormatCode, AUDIO_S16LSB, AUDIO_S16MSB, AUDIO_S16SYS, AUDIO_S32, AUDIO_S8,
    AUDIO_U8, MAX_PERIOD_SAMPLES,
};

pub use convert::{convert_acc, convert_mix};
pub use device::{AudioDevice, CpalDevice, NullDevice, NullDeviceHandle};
pub use mix::{copy, divide_accumulator, mix, volume_scale, Accumulator};
pub use session::{FillCallback, MixSession, PeriodRenderer, SessionState, VolumeHandle};
pub use stream::{MixStack, SourceStream};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        assert_eq!(MixerError::NotInitialized.code(), -5);
        assert_eq!(SampleFormatCode::S16Native.bits(), 16);
        assert_eq!(Volume::default(), Volume::UNITY);
    }
}
