// device.rs - Output devices that drive the period cycle

//! Output devices.
//!
//! A device is the scheduling environment the session is handed: it reports
//! what it can play, takes ownership of a [`PeriodRenderer`] on start, calls
//! it from its own thread once per period, and gives it back up on stop.
//! After `stop` returns the renderer has been dropped, so no further period
//! can begin.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;

use crate::sound::mixer::format::{DeviceCapabilities, DeviceFormat, SampleFormatCode};
use crate::sound::mixer::session::PeriodRenderer;
use crate::sound::mixer::types::{MixResult, MixerError};

/// Scheduling environment for a mixing session
pub trait AudioDevice: Send {
    /// Encodings, rates and channel layouts the device accepts
    fn capabilities(&self) -> DeviceCapabilities;

    /// Begin calling `renderer` once per period in `format`
    fn start(&mut self, format: &DeviceFormat, renderer: PeriodRenderer) -> MixResult<()>;

    /// Stop the period cycle and drop the renderer. Blocks until any period
    /// in progress has finished.
    fn stop(&mut self);
}

// ============================================================================
// Null device
// ============================================================================

type RendererSlot = Arc<Mutex<Option<PeriodRenderer>>>;

/// Device with no clock of its own; periods run when [`NullDeviceHandle::pump`]
/// is called. Used for offline rendering and tests.
pub struct NullDevice {
    caps: DeviceCapabilities,
    fail_start: bool,
    slot: RendererSlot,
}

impl NullDevice {
    pub fn new() -> Self {
        NullDevice::with_capabilities(DeviceCapabilities::unrestricted())
    }

    pub fn with_capabilities(caps: DeviceCapabilities) -> Self {
        NullDevice {
            caps,
            fail_start: false,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// A device whose start always fails
    pub fn unavailable() -> Self {
        NullDevice {
            fail_start: true,
            ..NullDevice::new()
        }
    }

    pub fn handle(&self) -> NullDeviceHandle {
        NullDeviceHandle {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        NullDevice::new()
    }
}

impl AudioDevice for NullDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.caps.clone()
    }

    fn start(&mut self, _format: &DeviceFormat, renderer: PeriodRenderer) -> MixResult<()> {
        if self.fail_start {
            return Err(MixerError::DeviceUnavailable);
        }
        *self.slot.lock() = Some(renderer);
        Ok(())
    }

    fn stop(&mut self) {
        self.slot.lock().take();
    }
}

/// Pumps periods out of a [`NullDevice`]
#[derive(Clone)]
pub struct NullDeviceHandle {
    slot: RendererSlot,
}

impl NullDeviceHandle {
    pub fn is_running(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn format(&self) -> Option<DeviceFormat> {
        self.slot.lock().as_ref().map(|r| *r.format())
    }

    /// Run one period and append its bytes to `out`. Returns false when the
    /// device is stopped.
    pub fn pump_into(&self, out: &mut Vec<u8>) -> bool {
        match self.slot.lock().as_mut() {
            Some(renderer) => {
                out.extend_from_slice(renderer.render_period());
                true
            }
            None => false,
        }
    }

    /// Run one period and return its bytes
    pub fn pump(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        self.pump_into(&mut out).then_some(out)
    }

    pub fn failed_periods(&self) -> Option<u64> {
        self.slot.lock().as_ref().map(|r| r.failed_periods())
    }
}

// ============================================================================
// Period pump
// ============================================================================

/// Adapts fixed-size periods to device callbacks of arbitrary length.
///
/// Keeps a cursor into the last rendered period and renders the next one
/// only when it has been fully handed out.
pub struct PeriodPump {
    renderer: PeriodRenderer,
    pos: usize,
}

impl PeriodPump {
    pub fn new(renderer: PeriodRenderer) -> Self {
        let pos = renderer.format().buffer_bytes();
        PeriodPump { renderer, pos }
    }

    /// Fill `out` completely, rendering as many periods as needed
    pub fn fill(&mut self, out: &mut [u8]) {
        let mut written = 0;
        while written < out.len() {
            if self.pos >= self.renderer.last_period().len() {
                self.renderer.render_period();
                self.pos = 0;
                if self.renderer.last_period().is_empty() {
                    out[written..].fill(0);
                    return;
                }
            }
            let period = self.renderer.last_period();
            let n = (period.len() - self.pos).min(out.len() - written);
            out[written..written + n].copy_from_slice(&period[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
    }
}

// ============================================================================
// cpal device
// ============================================================================

fn code_for(format: cpal::SampleFormat) -> Option<SampleFormatCode> {
    match format {
        cpal::SampleFormat::U8 => Some(SampleFormatCode::U8),
        cpal::SampleFormat::I8 => Some(SampleFormatCode::S8),
        cpal::SampleFormat::I16 => Some(SampleFormatCode::S16Native),
        cpal::SampleFormat::I32 if cfg!(target_endian = "little") => Some(SampleFormatCode::S32),
        _ => None,
    }
}

fn cpal_format(code: SampleFormatCode) -> Option<cpal::SampleFormat> {
    match code {
        SampleFormatCode::U8 => Some(cpal::SampleFormat::U8),
        SampleFormatCode::S8 => Some(cpal::SampleFormat::I8),
        c if c.same_layout(SampleFormatCode::S16Native) => Some(cpal::SampleFormat::I16),
        SampleFormatCode::S32 if cfg!(target_endian = "little") => Some(cpal::SampleFormat::I32),
        _ => None,
    }
}

struct StreamWorker {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

/// The host's default output device, driven through cpal.
///
/// cpal streams are not `Send`, so the stream lives on a small host thread
/// that builds it, keeps it playing and drops it on stop. The period cycle
/// itself runs on cpal's callback thread.
pub struct CpalDevice {
    worker: Option<StreamWorker>,
}

impl CpalDevice {
    pub fn new() -> Self {
        CpalDevice { worker: None }
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        CpalDevice::new()
    }
}

impl AudioDevice for CpalDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        let empty = DeviceCapabilities {
            encodings: Vec::new(),
            min_frequency: 0,
            max_frequency: 0,
            max_channels: 0,
            period_granularity: 1,
        };

        let host = cpal::default_host();
        let Some(device) = host.default_output_device() else {
            log::warn!("no default audio output device");
            return empty;
        };
        let configs = match device.supported_output_configs() {
            Ok(configs) => configs,
            Err(err) => {
                log::warn!("failed to query output configs: {}", err);
                return empty;
            }
        };

        let mut caps = DeviceCapabilities {
            min_frequency: u32::MAX,
            ..empty
        };
        for range in configs {
            let Some(code) = code_for(range.sample_format()) else {
                continue;
            };
            if !caps.encodings.contains(&code) {
                caps.encodings.push(code);
            }
            caps.min_frequency = caps.min_frequency.min(range.min_sample_rate().0);
            caps.max_frequency = caps.max_frequency.max(range.max_sample_rate().0);
            caps.max_channels = caps.max_channels.max(range.channels().min(u8::MAX as u16) as u8);
        }
        // Prefer 16-bit when the device offers it
        caps.encodings
            .sort_by_key(|c| !c.same_layout(SampleFormatCode::S16Native));
        if caps.encodings.is_empty() {
            caps.min_frequency = 0;
        }
        caps
    }

    fn start(&mut self, format: &DeviceFormat, renderer: PeriodRenderer) -> MixResult<()> {
        self.stop();

        let sample_format = cpal_format(format.code()).ok_or(MixerError::InvalidFormat)?;
        let config = cpal::StreamConfig {
            channels: format.channels() as u16,
            sample_rate: cpal::SampleRate(format.frequency),
            buffer_size: cpal::BufferSize::Default,
        };

        let (ready_tx, ready_rx) = bounded::<MixResult<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("glm-output".into())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    let _ = ready_tx.send(Err(MixerError::DeviceUnavailable));
                    return;
                };

                let mut pump = PeriodPump::new(renderer);
                let stream = device.build_output_stream_raw(
                    &config,
                    sample_format,
                    move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                        pump.fill(data.bytes_mut());
                    },
                    |err| log::error!("audio stream error: {}", err),
                    None,
                );
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        log::error!("failed to build audio stream: {}", err);
                        let _ = ready_tx.send(Err(MixerError::DeviceUnavailable));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    log::error!("failed to start audio stream: {}", err);
                    let _ = ready_tx.send(Err(MixerError::DeviceUnavailable));
                    return;
                }

                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|_| MixerError::DeviceUnavailable)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(StreamWorker { stop_tx, thread });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(MixerError::DeviceUnavailable)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.thread.join().is_err() {
                log::error!("audio output thread panicked");
            }
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
