// types.rs - Core types for the mixing engine

//! Core types shared by the mixing engine.
//!
//! Error codes, the fixed-point [`Volume`] and the atomic cell the session
//! uses to share it with the audio thread.

use std::sync::atomic::{AtomicU32, Ordering};

/// Fixed-point shift applied after every volume multiply
pub const VOLUME_SHIFT: u32 = 16;

/// Raw value of unity gain (1.0)
pub const VOLUME_UNITY: u32 = 1 << VOLUME_SHIFT;

/// Engine error kinds.
///
/// Every kind maps to a small negative code for the C ABI; zero means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MixerError {
    /// Unsupported or self-contradictory format request
    #[error("unsupported or invalid sample format")]
    InvalidFormat,
    /// Negotiation or device setup failed
    #[error("audio device unavailable")]
    DeviceUnavailable,
    /// A buffer or length precondition was violated
    #[error("invalid argument")]
    InvalidArgument,
    /// Zero divisor passed to the divider
    #[error("division by zero")]
    DivideByZero,
    /// Operation requires an active session
    #[error("mixer not initialized")]
    NotInitialized,
}

impl MixerError {
    /// Error code returned through the C ABI
    pub fn code(self) -> i32 {
        match self {
            MixerError::InvalidFormat => -1,
            MixerError::DeviceUnavailable => -2,
            MixerError::InvalidArgument => -3,
            MixerError::DivideByZero => -4,
            MixerError::NotInitialized => -5,
        }
    }

    /// Map a C ABI code back to an error. Non-negative codes are not errors.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(MixerError::InvalidFormat),
            -2 => Some(MixerError::DeviceUnavailable),
            -3 => Some(MixerError::InvalidArgument),
            -4 => Some(MixerError::DivideByZero),
            -5 => Some(MixerError::NotInitialized),
            _ => None,
        }
    }
}

/// Result alias for engine operations
pub type MixResult<T> = Result<T, MixerError>;

/// Fixed-point gain in `[0, 65536]`, where 65536 is unity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Volume(u32);

impl Volume {
    pub const SILENT: Volume = Volume(0);
    pub const HALF: Volume = Volume(VOLUME_UNITY / 2);
    pub const UNITY: Volume = Volume(VOLUME_UNITY);

    /// Build a volume from a raw fixed-point value, saturating at unity
    pub fn new(raw: u32) -> Self {
        Volume(raw.min(VOLUME_UNITY))
    }

    /// Volume from a 0-100 percentage, saturating at 100
    pub fn from_percent(percent: u32) -> Self {
        Volume::new(percent.min(100) * VOLUME_UNITY / 100)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_unity(self) -> bool {
        self.0 == VOLUME_UNITY
    }

    pub fn is_silent(self) -> bool {
        self.0 == 0
    }

    /// Scale a single wide sample: `(sample * volume) >> 16`.
    ///
    /// The product is formed in 64 bits; the shift is arithmetic, so negative
    /// results round toward negative infinity.
    #[inline]
    pub fn apply(self, sample: i32) -> i32 {
        ((sample as i64 * self.0 as i64) >> VOLUME_SHIFT) as i32
    }
}

impl Default for Volume {
    fn default() -> Self {
        Volume::UNITY
    }
}

/// Volume cell shared between a control thread and the audio thread.
///
/// Single word, so loads and stores never tear.
#[derive(Debug)]
pub struct AtomicVolume(AtomicU32);

impl AtomicVolume {
    pub const fn new(volume: Volume) -> Self {
        AtomicVolume(AtomicU32::new(volume.0))
    }

    pub fn load(&self) -> Volume {
        Volume(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, volume: Volume) {
        self.0.store(volume.raw(), Ordering::Release);
    }
}

impl Default for AtomicVolume {
    fn default() -> Self {
        AtomicVolume::new(Volume::UNITY)
    }
}
