// session.rs - Device session and the per-period render cycle

//! Device session: negotiated format, accumulator, mix volume and the
//! fill-scale-convert cycle run once per device period.
//!
//! The session moves through `Uninitialized -> Active -> Stopped`. While
//! active, the device owns a [`PeriodRenderer`] and calls
//! [`PeriodRenderer::render_period`] from its own thread. Only the mix volume
//! and the state flag cross threads, each as a single atomic word.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::sound::mixer::convert::convert_acc;
use crate::sound::mixer::device::AudioDevice;
use crate::sound::mixer::format::{negotiate, DeviceFormat, FormatRequest, SampleFormatCode};
use crate::sound::mixer::mix::{volume_scale, Accumulator};
use crate::sound::mixer::types::{AtomicVolume, MixResult, MixerError, Volume};

/// Caller-supplied routine that composes one period into the accumulator.
///
/// Runs on the device thread: it must not block, lock, or allocate. The
/// accumulator arrives zeroed and holds `frames * channels` interleaved cells.
pub trait FillCallback<C>: Send {
    fn fill(&mut self, accumulator: &mut [i32], frames: u32, context: &C);
}

impl<C, F> FillCallback<C> for F
where
    F: FnMut(&mut [i32], u32, &C) + Send,
{
    fn fill(&mut self, accumulator: &mut [i32], frames: u32, context: &C) {
        self(accumulator, frames, context)
    }
}

/// Session lifecycle
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized = 0,
    Active = 1,
    Stopped = 2,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Active,
            2 => SessionState::Stopped,
            _ => SessionState::Uninitialized,
        }
    }
}

/// Cloneable handle to a mix volume cell, for control threads.
///
/// Several sessions may share one cell, see [`MixSession::with_volume`].
#[derive(Debug, Clone, Default)]
pub struct VolumeHandle(Arc<AtomicVolume>);

impl VolumeHandle {
    pub fn new(volume: Volume) -> Self {
        VolumeHandle(Arc::new(AtomicVolume::new(volume)))
    }

    pub fn get(&self) -> Volume {
        self.0.load()
    }

    pub fn set(&self, volume: Volume) {
        self.0.store(volume);
    }
}

/// State visible from outside the audio thread
#[derive(Debug)]
struct SessionShared {
    volume: VolumeHandle,
    state: AtomicU8,
}

impl SessionShared {
    fn new(volume: VolumeHandle) -> Self {
        SessionShared {
            volume,
            state: AtomicU8::new(SessionState::Uninitialized as u8),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

type ErasedFill = Box<dyn FnMut(&mut [i32], u32) + Send>;

/// Everything the device thread needs to produce one period of output.
///
/// Buffers are sized at construction; rendering never allocates.
pub struct PeriodRenderer {
    format: DeviceFormat,
    accumulator: Accumulator,
    staging: Vec<u8>,
    fill: ErasedFill,
    shared: Arc<SessionShared>,
    failed_periods: u64,
}

impl PeriodRenderer {
    fn new(format: DeviceFormat, fill: ErasedFill, shared: Arc<SessionShared>) -> Self {
        PeriodRenderer {
            format,
            accumulator: Accumulator::new(format.period_samples()),
            staging: vec![0; format.buffer_bytes()],
            fill,
            shared,
            failed_periods: 0,
        }
    }

    pub fn format(&self) -> &DeviceFormat {
        &self.format
    }

    /// Periods whose fill callback panicked and were replaced by silence
    pub fn failed_periods(&self) -> u64 {
        self.failed_periods
    }

    /// Run one fill-scale-convert cycle and return the output period.
    ///
    /// Once the session has left the active state this only emits silence.
    pub fn render_period(&mut self) -> &[u8] {
        if self.shared.state() != SessionState::Active {
            write_silence(&mut self.staging, self.format.code());
            return &self.staging;
        }

        self.accumulator.clear();
        let frames = self.format.period_frames;
        let filled = panic::catch_unwind(AssertUnwindSafe(|| {
            (self.fill)(self.accumulator.as_mut_slice(), frames)
        }));
        if filled.is_err() {
            self.failed_periods += 1;
            self.accumulator.clear();
            log::error!("mix fill callback panicked; emitting a silent period");
        }

        let samples = self.format.period_samples();
        let volume = self.shared.volume.get();
        let converted = volume_scale(self.accumulator.as_mut_slice(), samples, volume).and_then(
            |()| convert_acc(&mut self.staging, self.accumulator.as_slice(), samples, self.format.code()),
        );
        if converted.is_err() {
            write_silence(&mut self.staging, self.format.code());
        }
        &self.staging
    }

    /// The most recently rendered period
    pub fn last_period(&self) -> &[u8] {
        &self.staging
    }

    /// Render one period and copy it into `out`. Returns the bytes written.
    pub fn render_into(&mut self, out: &mut [u8]) -> usize {
        let period = self.render_period();
        let n = period.len().min(out.len());
        out[..n].copy_from_slice(&period[..n]);
        n
    }
}

impl std::fmt::Debug for PeriodRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodRenderer")
            .field("format", &self.format)
            .field("failed_periods", &self.failed_periods)
            .finish_non_exhaustive()
    }
}

/// Fill `buf` with the encoding's silence
pub fn write_silence(buf: &mut [u8], code: SampleFormatCode) {
    match code {
        SampleFormatCode::U8 => buf.fill(0x80),
        _ => buf.fill(0),
    }
}

/// A mixing session bound to one output device
pub struct MixSession {
    device: Box<dyn AudioDevice>,
    format: Option<DeviceFormat>,
    shared: Arc<SessionShared>,
}

impl MixSession {
    /// Create an uninitialized session on `device`
    pub fn new(device: Box<dyn AudioDevice>) -> Self {
        MixSession::with_volume(device, VolumeHandle::default())
    }

    /// Create a session whose mix volume lives in `volume`
    pub fn with_volume(device: Box<dyn AudioDevice>, volume: VolumeHandle) -> Self {
        MixSession {
            device,
            format: None,
            shared: Arc::new(SessionShared::new(volume)),
        }
    }

    /// Negotiate a format, allocate buffers and start the device at unity
    /// volume.
    ///
    /// An active session is shut down first. On failure nothing is kept and
    /// the session is left uninitialized.
    pub fn init<C, F>(&mut self, request: FormatRequest, fill: F, context: C) -> MixResult<()>
    where
        C: Send + 'static,
        F: FillCallback<C> + 'static,
    {
        self.init_with_volume(request, fill, context, Volume::UNITY)
    }

    /// Like [`MixSession::init`], with the mix volume set to `volume` before
    /// the first period runs
    pub fn init_with_volume<C, F>(
        &mut self,
        request: FormatRequest,
        fill: F,
        context: C,
        volume: Volume,
    ) -> MixResult<()>
    where
        C: Send + 'static,
        F: FillCallback<C> + 'static,
    {
        if self.state() == SessionState::Active {
            self.quit();
        }

        let format = match negotiate(&request, &self.device.capabilities()) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("mixer format negotiation failed: {}", err);
                self.shared.set_state(SessionState::Uninitialized);
                return Err(err);
            }
        };

        let mut fill = fill;
        let erased: ErasedFill = Box::new(move |acc: &mut [i32], frames: u32| {
            fill.fill(acc, frames, &context)
        });

        self.shared.volume.set(volume);
        self.shared.set_state(SessionState::Active);
        let renderer = PeriodRenderer::new(format, erased, Arc::clone(&self.shared));
        if let Err(err) = self.device.start(&format, renderer) {
            log::warn!("mixer device start failed: {}", err);
            self.shared.set_state(SessionState::Uninitialized);
            return Err(err);
        }

        log::debug!(
            "mixer active: {:?} {}Hz {}ch, {} frames/period ({} bytes)",
            format.code(),
            format.frequency,
            format.channels(),
            format.period_frames,
            format.buffer_bytes()
        );
        self.format = Some(format);
        Ok(())
    }

    /// Negotiated output format; only valid while active
    pub fn format(&self) -> MixResult<DeviceFormat> {
        match (self.state(), self.format) {
            (SessionState::Active, Some(format)) => Ok(format),
            _ => Err(MixerError::NotInitialized),
        }
    }

    /// Stop the device and release the session buffers.
    ///
    /// Once this returns no further period starts. Calling it on a session
    /// that is not active does nothing.
    pub fn quit(&mut self) {
        if self.state() != SessionState::Active {
            return;
        }
        self.shared.set_state(SessionState::Stopped);
        self.device.stop();
        self.format = None;
        log::debug!("mixer stopped");
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn volume(&self) -> Volume {
        self.shared.volume.get()
    }

    pub fn set_volume(&self, volume: Volume) {
        self.shared.volume.set(volume);
    }

    pub fn volume_handle(&self) -> VolumeHandle {
        self.shared.volume.clone()
    }
}

impl Drop for MixSession {
    fn drop(&mut self) {
        self.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::mixer::convert::{convert_mix, decode_sample, encode_sample};
    use crate::sound::mixer::device::{NullDevice, NullDeviceHandle};
    use crate::sound::mixer::format::DeviceCapabilities;

    fn session() -> (MixSession, NullDeviceHandle) {
        let device = NullDevice::new();
        let handle = device.handle();
        (MixSession::new(Box::new(device)), handle)
    }

    fn constant_fill(value: i16) -> impl FnMut(&mut [i32], u32, &()) + Send {
        let mut src = [0u8; 2];
        encode_sample(value as i32, SampleFormatCode::S16Native, &mut src).unwrap();
        move |acc: &mut [i32], _frames: u32, _: &()| {
            for cell in acc.chunks_mut(1) {
                convert_mix(cell, &src, 1, SampleFormatCode::S16Native, Volume::UNITY).unwrap();
            }
        }
    }

    #[test]
    fn test_lifecycle() {
        let (mut session, handle) = session();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.format(), Err(MixerError::NotInitialized));

        let request = FormatRequest::new(44100, SampleFormatCode::S16Native, 2, 20);
        session.init(request, constant_fill(0), ()).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(handle.is_running());
        let format = session.format().unwrap();
        assert_eq!(format.period_frames, 882);
        assert_eq!(format.buffer_bytes(), 882 * 2 * 2);

        session.quit();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!handle.is_running());
        assert_eq!(session.format(), Err(MixerError::NotInitialized));
        assert!(handle.pump().is_none());

        session.quit();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_period_output_decodes_to_constant() {
        let (mut session, handle) = session();
        let request = FormatRequest::new(44100, SampleFormatCode::S16Native, 2, 20);
        session.init(request, constant_fill(1234), ()).unwrap();

        let out = handle.pump().unwrap();
        assert_eq!(out.len(), 882 * 4);
        for i in 0..882 * 2 {
            assert_eq!(decode_sample(&out, i, SampleFormatCode::S16Native), Ok(1234));
        }
    }

    #[test]
    fn test_mix_volume_applies() {
        let (mut session, handle) = session();
        let request = FormatRequest::new(8000, SampleFormatCode::S16Lsb, 1, 10);
        session.init(request, constant_fill(1000), ()).unwrap();
        assert_eq!(session.volume(), Volume::UNITY);

        let volume = session.volume_handle();
        volume.set(Volume::HALF);
        assert_eq!(session.volume(), Volume::HALF);
        let out = handle.pump().unwrap();
        assert_eq!(decode_sample(&out, 0, SampleFormatCode::S16Lsb), Ok(500));

        session.set_volume(Volume::SILENT);
        let out = handle.pump().unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_init_with_volume_applies_from_first_period() {
        let volume = VolumeHandle::new(Volume::SILENT);
        let device = NullDevice::new();
        let handle = device.handle();
        let mut session = MixSession::with_volume(Box::new(device), volume.clone());
        let request = FormatRequest::new(8000, SampleFormatCode::S16Lsb, 1, 10);
        session
            .init_with_volume(request, constant_fill(1000), (), Volume::HALF)
            .unwrap();
        assert_eq!(volume.get(), Volume::HALF);
        let out = handle.pump().unwrap();
        assert_eq!(decode_sample(&out, 0, SampleFormatCode::S16Lsb), Ok(500));

        // The shared cell drives the running session
        volume.set(Volume::UNITY);
        let out = handle.pump().unwrap();
        assert_eq!(decode_sample(&out, 0, SampleFormatCode::S16Lsb), Ok(1000));
    }

    #[test]
    fn test_init_rejects_oversized_period() {
        let (mut session, handle) = session();
        let request = FormatRequest::new(44100, SampleFormatCode::S16Lsb, 2, 100_000_000);
        assert_eq!(
            session.init(request, constant_fill(0), ()),
            Err(MixerError::InvalidFormat)
        );
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!handle.is_running());
    }

    #[test]
    fn test_context_reaches_callback() {
        let (mut session, handle) = session();
        let request = FormatRequest::new(1000, SampleFormatCode::S8, 1, 4);
        let fill = |acc: &mut [i32], frames: u32, ctx: &i32| {
            assert_eq!(frames, 4);
            acc.fill(*ctx);
        };
        session.init(request, fill, 42).unwrap();
        assert_eq!(handle.pump().unwrap(), vec![42u8; 4]);
    }

    #[test]
    fn test_accumulator_cleared_each_period() {
        let (mut session, handle) = session();
        let request = FormatRequest::new(1000, SampleFormatCode::S8, 1, 2);
        let fill = |acc: &mut [i32], _: u32, _: &()| {
            for s in acc.iter_mut() {
                *s += 5;
            }
        };
        session.init(request, fill, ()).unwrap();
        assert_eq!(handle.pump().unwrap(), vec![5u8; 2]);
        assert_eq!(handle.pump().unwrap(), vec![5u8; 2]);
    }

    #[test]
    fn test_panicking_fill_emits_silence() {
        let (mut session, handle) = session();
        let request = FormatRequest::new(1000, SampleFormatCode::U8, 1, 3);
        let mut calls = 0;
        let fill = move |acc: &mut [i32], _: u32, _: &()| {
            calls += 1;
            acc.fill(i32::MAX);
            if calls == 1 {
                panic!("bad source");
            }
        };
        session.init(request, fill, ()).unwrap();
        assert_eq!(handle.pump().unwrap(), vec![0x80; 3]);
        // Next period recovers
        assert_eq!(handle.pump().unwrap(), vec![0xFF; 3]);
        assert_eq!(handle.failed_periods(), Some(1));
    }

    #[test]
    fn test_init_failure_keeps_nothing() {
        let device = NullDevice::with_capabilities(DeviceCapabilities {
            encodings: Vec::new(),
            ..DeviceCapabilities::unrestricted()
        });
        let handle = device.handle();
        let mut session = MixSession::new(Box::new(device));
        let request = FormatRequest::new(44100, SampleFormatCode::S16Lsb, 2, 20);
        assert_eq!(
            session.init(request, constant_fill(0), ()),
            Err(MixerError::DeviceUnavailable)
        );
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!handle.is_running());

        let mut session = MixSession::new(Box::new(NullDevice::unavailable()));
        assert_eq!(
            session.init(request, constant_fill(0), ()),
            Err(MixerError::DeviceUnavailable)
        );
        assert_eq!(session.state(), SessionState::Uninitialized);

        let bad = FormatRequest::new(0, SampleFormatCode::S16Lsb, 2, 20);
        let (mut session, _) = self::session();
        assert_eq!(session.init(bad, constant_fill(0), ()), Err(MixerError::InvalidFormat));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_reinit_replaces_active_session() {
        let (mut session, handle) = session();
        session
            .init(FormatRequest::new(1000, SampleFormatCode::S8, 1, 2), constant_fill(1), ())
            .unwrap();
        session.set_volume(Volume::HALF);
        session
            .init(FormatRequest::new(2000, SampleFormatCode::S8, 2, 2), constant_fill(2), ())
            .unwrap();
        assert_eq!(session.volume(), Volume::UNITY);
        let format = session.format().unwrap();
        assert_eq!(format.channels(), 2);
        assert_eq!(handle.pump().unwrap(), vec![2u8; 8]);
    }

    #[test]
    fn test_stopped_renderer_is_silent() {
        let shared = Arc::new(SessionShared::new(VolumeHandle::default()));
        let format = negotiate(
            &FormatRequest::new(1000, SampleFormatCode::U8, 1, 2),
            &DeviceCapabilities::unrestricted(),
        )
        .unwrap();
        let mut renderer = PeriodRenderer::new(
            format,
            Box::new(|acc: &mut [i32], _: u32| acc.fill(50)),
            Arc::clone(&shared),
        );
        assert_eq!(renderer.render_period(), &[0x80, 0x80]);
        shared.set_state(SessionState::Active);
        assert_eq!(renderer.render_period(), &[178, 178]);
        shared.set_state(SessionState::Stopped);
        let mut out = [0u8; 4];
        assert_eq!(renderer.render_into(&mut out), 2);
        assert_eq!(out, [0x80, 0x80, 0, 0]);
    }
}
