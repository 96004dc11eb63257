// ffi.rs - C ABI for the mixer

//! C-callable entry points over the mixer.
//!
//! The C side sees a single process-wide session, created by `glm_init` on
//! the default output device and torn down by `glm_quit`. Every function that
//! can fail returns 0 on success or one of the negative [`MixerError`] codes.
//! Raw format codes are validated here.
//!
//! The mix volume lives in its own process-wide cell, so the volume accessors
//! never wait on the session lock and are safe to call from the fill routine.

use std::sync::OnceLock;

use libc::{c_int, c_uint, c_void};
use parking_lot::Mutex;

use crate::sound::mixer::convert::{convert_acc, convert_mix};
use crate::sound::mixer::device::{AudioDevice, CpalDevice};
use crate::sound::mixer::format::{FormatRequest, SampleFormatCode};
use crate::sound::mixer::mix::{copy, divide_accumulator, mix, volume_scale};
use crate::sound::mixer::session::{MixSession, VolumeHandle};
use crate::sound::mixer::types::{MixResult, MixerError, Volume};

/// Fill routine: interleaved accumulator, frame count, caller context
pub type GlmMixCallback = Option<unsafe extern "C" fn(*mut i32, c_uint, *mut c_void)>;

static SESSION: Mutex<Option<MixSession>> = Mutex::new(None);

static MIX_VOLUME: OnceLock<VolumeHandle> = OnceLock::new();

fn mix_volume() -> &'static VolumeHandle {
    MIX_VOLUME.get_or_init(VolumeHandle::default)
}

/// Opaque caller context handed back to the fill routine
struct CallbackContext(*mut c_void);

// The pointer is only ever passed back to the C callback, which is
// responsible for its thread safety.
unsafe impl Send for CallbackContext {}

fn status(result: MixResult<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

fn format_code(raw: u16) -> MixResult<SampleFormatCode> {
    SampleFormatCode::from_code(raw)
}

/// Borrow `samples` accumulator cells behind `ptr`
///
/// # Safety
/// `ptr` must be null or valid for `samples` reads and writes.
unsafe fn acc_mut<'a>(ptr: *mut i32, samples: c_uint) -> MixResult<&'a mut [i32]> {
    if ptr.is_null() {
        return Err(MixerError::InvalidArgument);
    }
    Ok(std::slice::from_raw_parts_mut(ptr, samples as usize))
}

unsafe fn acc_ref<'a>(ptr: *const i32, samples: c_uint) -> MixResult<&'a [i32]> {
    if ptr.is_null() {
        return Err(MixerError::InvalidArgument);
    }
    Ok(std::slice::from_raw_parts(ptr, samples as usize))
}

unsafe fn bytes_mut<'a>(
    ptr: *mut c_void,
    samples: c_uint,
    format: SampleFormatCode,
) -> MixResult<&'a mut [u8]> {
    if ptr.is_null() {
        return Err(MixerError::InvalidArgument);
    }
    let len = (samples as usize)
        .checked_mul(format.bytes_per_sample())
        .ok_or(MixerError::InvalidArgument)?;
    Ok(std::slice::from_raw_parts_mut(ptr as *mut u8, len))
}

unsafe fn bytes_ref<'a>(
    ptr: *const c_void,
    samples: c_uint,
    format: SampleFormatCode,
) -> MixResult<&'a [u8]> {
    if ptr.is_null() {
        return Err(MixerError::InvalidArgument);
    }
    let len = (samples as usize)
        .checked_mul(format.bytes_per_sample())
        .ok_or(MixerError::InvalidArgument)?;
    Ok(std::slice::from_raw_parts(ptr as *const u8, len))
}

fn init_session(
    device: Box<dyn AudioDevice>,
    frequency: c_uint,
    format: u16,
    channels: u8,
    buffer_ms: c_uint,
    callback: GlmMixCallback,
    context: *mut c_void,
) -> MixResult<()> {
    let code = format_code(format)?;
    let callback = callback.ok_or(MixerError::InvalidArgument)?;

    // Stop the old session outside the lock; its callback may still call in
    let previous = SESSION.lock().take();
    drop(previous);

    let fill = move |acc: &mut [i32], frames: u32, ctx: &CallbackContext| unsafe {
        callback(acc.as_mut_ptr(), frames, ctx.0)
    };
    let mut session = MixSession::with_volume(device, mix_volume().clone());
    session.init(
        FormatRequest::new(frequency, code, channels, buffer_ms),
        fill,
        CallbackContext(context),
    )?;
    // A concurrent glm_init may have won the race; stop its session unlocked
    let replaced = SESSION.lock().replace(session);
    drop(replaced);
    Ok(())
}

/// Open the default output device and start mixing.
///
/// # Safety
/// `callback` is invoked from the audio thread with `context` until
/// `glm_quit` returns; both must stay valid for that long.
#[no_mangle]
pub unsafe extern "C" fn glm_init(
    frequency: c_uint,
    format: u16,
    channels: u8,
    buffer_ms: c_uint,
    callback: GlmMixCallback,
    context: *mut c_void,
) -> c_int {
    let result = init_session(
        Box::new(CpalDevice::new()),
        frequency,
        format,
        channels,
        buffer_ms,
        callback,
        context,
    );
    if let Err(err) = result {
        log::warn!("glm_init failed: {}", err);
    }
    status(result)
}

/// Report the negotiated format. Any out-pointer may be null.
///
/// # Safety
/// Non-null pointers must be valid for a write.
#[no_mangle]
pub unsafe extern "C" fn glm_get_format(
    frequency: *mut c_uint,
    format: *mut u16,
    channels: *mut u8,
    buffer_bytes: *mut c_uint,
) -> c_int {
    let negotiated = match SESSION.lock().as_ref().map(|s| s.format()) {
        Some(Ok(negotiated)) => negotiated,
        Some(Err(err)) => return err.code(),
        None => return MixerError::NotInitialized.code(),
    };
    if !frequency.is_null() {
        *frequency = negotiated.frequency;
    }
    if !format.is_null() {
        *format = negotiated.code().code();
    }
    if !channels.is_null() {
        *channels = negotiated.channels();
    }
    if !buffer_bytes.is_null() {
        match c_uint::try_from(negotiated.buffer_bytes()) {
            Ok(bytes) => *buffer_bytes = bytes,
            Err(_) => return MixerError::InvalidFormat.code(),
        }
    }
    0
}

/// Stop the device. No fill call starts after this returns.
#[no_mangle]
pub extern "C" fn glm_quit() {
    let session = SESSION.lock().take();
    if let Some(mut session) = session {
        session.quit();
    }
}

/// Current mix volume. Reset to unity by every `glm_init`.
#[no_mangle]
pub extern "C" fn glm_get_mix_volume() -> c_uint {
    mix_volume().get().raw()
}

/// Set the mix volume, saturating above unity (65536)
#[no_mangle]
pub extern "C" fn glm_set_mix_volume(volume: c_uint) {
    mix_volume().set(Volume::new(volume));
}

/// # Safety
/// `dest` and `src` must each hold `samples` cells.
#[no_mangle]
pub unsafe extern "C" fn glm_copy(dest: *mut i32, src: *const i32, samples: c_uint) -> c_int {
    status(acc_mut(dest, samples).and_then(|d| copy(d, acc_ref(src, samples)?, samples as usize)))
}

/// # Safety
/// `buffer` must hold `samples` cells.
#[no_mangle]
pub unsafe extern "C" fn glm_volume_scale(
    buffer: *mut i32,
    samples: c_uint,
    volume: c_uint,
) -> c_int {
    status(
        acc_mut(buffer, samples)
            .and_then(|b| volume_scale(b, samples as usize, Volume::new(volume))),
    )
}

/// # Safety
/// `dest` and `src` must each hold `samples` cells.
#[no_mangle]
pub unsafe extern "C" fn glm_mix(
    dest: *mut i32,
    src: *const i32,
    samples: c_uint,
    volume: c_uint,
) -> c_int {
    status(acc_mut(dest, samples).and_then(|d| {
        mix(d, acc_ref(src, samples)?, samples as usize, Volume::new(volume))
    }))
}

/// # Safety
/// `dest` must hold `samples` samples of `format`, `src` `samples` cells.
#[no_mangle]
pub unsafe extern "C" fn glm_convert_acc(
    dest: *mut c_void,
    src: *const i32,
    samples: c_uint,
    format: u16,
) -> c_int {
    status(format_code(format).and_then(|code| {
        convert_acc(
            bytes_mut(dest, samples, code)?,
            acc_ref(src, samples)?,
            samples as usize,
            code,
        )
    }))
}

/// # Safety
/// `dest` must hold `samples` cells, `src` `samples` samples of `format`.
#[no_mangle]
pub unsafe extern "C" fn glm_convert_mix(
    dest: *mut i32,
    src: *const c_void,
    samples: c_uint,
    format: u16,
    volume: c_uint,
) -> c_int {
    status(format_code(format).and_then(|code| {
        convert_mix(
            acc_mut(dest, samples)?,
            bytes_ref(src, samples, code)?,
            samples as usize,
            code,
            Volume::new(volume),
        )
    }))
}

/// # Safety
/// `buffer` must hold `samples` cells.
#[no_mangle]
pub unsafe extern "C" fn glm_divide_accumulator(
    buffer: *mut i32,
    samples: c_uint,
    divisor: i32,
) -> c_int {
    status(acc_mut(buffer, samples).and_then(|b| divide_accumulator(b, samples as usize, divisor)))
}
