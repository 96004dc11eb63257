// mix.rs - Accumulator and mixing primitives

//! The wide accumulator and the arithmetic run on it every period.
//!
//! All gain uses the same fixed-point rule: multiply by the raw volume in 64
//! bits, then shift right by 16. Summation wraps instead of saturating;
//! clamping happens once, when the accumulator is converted to the output
//! encoding.
//!
//! Mixing several sources is commutative up to rounding: each scaled term is
//! floored independently, so different orders can disagree by at most one
//! unit per source, never by magnitude.

use crate::sound::mixer::types::{MixResult, MixerError, Volume};

/// Owned buffer of 32-bit intermediate samples for one period.
///
/// Sized once and reused; nothing here reallocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    samples: Vec<i32>,
}

impl Accumulator {
    /// Allocate a zeroed accumulator of `len` samples
    pub fn new(len: usize) -> Self {
        Accumulator {
            samples: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Zero every cell
    pub fn clear(&mut self) {
        self.samples.fill(0);
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.samples
    }
}

/// Copy `samples` cells from `src` into `dest`
pub fn copy(dest: &mut [i32], src: &[i32], samples: usize) -> MixResult<()> {
    let dest = dest.get_mut(..samples).ok_or(MixerError::InvalidArgument)?;
    let src = src.get(..samples).ok_or(MixerError::InvalidArgument)?;
    dest.copy_from_slice(src);
    Ok(())
}

/// Scale the first `samples` cells in place by `volume`
pub fn volume_scale(buffer: &mut [i32], samples: usize, volume: Volume) -> MixResult<()> {
    let buffer = buffer.get_mut(..samples).ok_or(MixerError::InvalidArgument)?;
    if volume.is_unity() {
        return Ok(());
    }
    if volume.is_silent() {
        buffer.fill(0);
        return Ok(());
    }
    for s in buffer.iter_mut() {
        *s = volume.apply(*s);
    }
    Ok(())
}

/// `dest[i] += (src[i] * volume) >> 16` for the first `samples` cells
pub fn mix(dest: &mut [i32], src: &[i32], samples: usize, volume: Volume) -> MixResult<()> {
    let dest = dest.get_mut(..samples).ok_or(MixerError::InvalidArgument)?;
    let src = src.get(..samples).ok_or(MixerError::InvalidArgument)?;
    if volume.is_unity() {
        for (d, &s) in dest.iter_mut().zip(src) {
            *d = d.wrapping_add(s);
        }
    } else if !volume.is_silent() {
        for (d, &s) in dest.iter_mut().zip(src) {
            *d = d.wrapping_add(volume.apply(s));
        }
    }
    Ok(())
}

/// Divide the first `samples` cells by `divisor`, truncating toward zero.
///
/// A zero divisor fails before anything is written.
pub fn divide_accumulator(buffer: &mut [i32], samples: usize, divisor: i32) -> MixResult<()> {
    if divisor == 0 {
        return Err(MixerError::DivideByZero);
    }
    let buffer = buffer.get_mut(..samples).ok_or(MixerError::InvalidArgument)?;
    if divisor == 1 {
        return Ok(());
    }
    for s in buffer.iter_mut() {
        *s = s.wrapping_div(divisor);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accumulator_clear() {
        let mut acc = Accumulator::new(4);
        assert_eq!(acc.len(), 4);
        acc.as_mut_slice().copy_from_slice(&[1, -2, 3, -4]);
        acc.clear();
        assert_eq!(acc.as_slice(), &[0, 0, 0, 0]);
        assert!(Accumulator::new(0).is_empty());
    }

    #[test]
    fn test_copy() {
        let mut dest = [0i32; 4];
        copy(&mut dest, &[1, 2, 3, 4], 3).unwrap();
        assert_eq!(dest, [1, 2, 3, 0]);
        assert_eq!(copy(&mut dest, &[1], 2), Err(MixerError::InvalidArgument));
    }

    #[test]
    fn test_volume_scale_empty() {
        let mut buf: [i32; 0] = [];
        volume_scale(&mut buf, 0, Volume::HALF).unwrap();
        let mut buf = [9i32; 2];
        volume_scale(&mut buf, 0, Volume::SILENT).unwrap();
        assert_eq!(buf, [9, 9]);
    }

    #[test]
    fn test_volume_scale_half() {
        let mut buf = [1000, -1000, 1, 70000];
        volume_scale(&mut buf, 4, Volume::HALF).unwrap();
        assert_eq!(buf, [500, -500, 0, 35000]);
    }

    #[test]
    fn test_mix_wraps_without_saturating() {
        let mut dest = [i32::MAX];
        mix(&mut dest, &[1], 1, Volume::UNITY).unwrap();
        assert_eq!(dest, [i32::MIN]);
    }

    #[test]
    fn test_mix_order_differs_by_rounding_only() {
        let a = [3i32, -7, 101];
        let b = [-5i32, 9, 33];
        let v = Volume::new(40_000);

        let mut ab = [0i32; 3];
        mix(&mut ab, &a, 3, v).unwrap();
        mix(&mut ab, &b, 3, v).unwrap();
        let mut ba = [0i32; 3];
        mix(&mut ba, &b, 3, v).unwrap();
        mix(&mut ba, &a, 3, v).unwrap();
        assert_eq!(ab, ba);

        let mut summed = [0i32; 3];
        mix(&mut summed, &[a[0] + b[0], a[1] + b[1], a[2] + b[2]], 3, v).unwrap();
        for i in 0..3 {
            assert!((summed[i] - ab[i]).abs() <= 1);
        }
    }

    #[test]
    fn test_divide_by_zero_leaves_buffer() {
        let mut buf = [10, 20, 30];
        assert_eq!(divide_accumulator(&mut buf, 3, 0), Err(MixerError::DivideByZero));
        assert_eq!(buf, [10, 20, 30]);
    }

    #[test]
    fn test_divide_truncates() {
        let mut buf = [10, -10, 7, i32::MIN];
        divide_accumulator(&mut buf, 4, 3).unwrap();
        assert_eq!(buf, [3, -3, 2, i32::MIN / 3]);

        let mut buf = [i32::MIN];
        divide_accumulator(&mut buf, 1, -1).unwrap();
        assert_eq!(buf, [i32::MIN]);

        assert_eq!(divide_accumulator(&mut buf, 2, 2), Err(MixerError::InvalidArgument));
    }

    proptest! {
        #[test]
        fn prop_unity_is_identity(buf in prop::collection::vec(any::<i32>(), 0..128)) {
            let mut scaled = buf.clone();
            volume_scale(&mut scaled, buf.len(), Volume::UNITY).unwrap();
            prop_assert_eq!(scaled, buf);
        }

        #[test]
        fn prop_zero_volume_silences(buf in prop::collection::vec(any::<i32>(), 0..128)) {
            let mut scaled = buf.clone();
            volume_scale(&mut scaled, buf.len(), Volume::SILENT).unwrap();
            prop_assert!(scaled.iter().all(|&s| s == 0));
        }

        #[test]
        fn prop_mix_formula(
            pairs in prop::collection::vec((any::<i32>(), any::<i32>()), 0..128),
            raw in 0u32..=65536,
        ) {
            let v = Volume::new(raw);
            let a: Vec<i32> = pairs.iter().map(|p| p.0).collect();
            let b: Vec<i32> = pairs.iter().map(|p| p.1).collect();
            let mut dest = a.clone();
            mix(&mut dest, &b, b.len(), v).unwrap();
            for i in 0..a.len() {
                let expected = a[i].wrapping_add(((b[i] as i64 * raw as i64) >> 16) as i32);
                prop_assert_eq!(dest[i], expected);
            }
        }

        #[test]
        fn prop_divide_then_restore(
            buf in prop::collection::vec(-(1i32 << 24)..(1i32 << 24), 1..64),
            d in 1i32..64,
        ) {
            let mut divided = buf.clone();
            divide_accumulator(&mut divided, buf.len(), d).unwrap();
            let scaled: Vec<i32> = divided.iter().map(|&s| s * d).collect();
            let mut restored = vec![0i32; buf.len()];
            mix(&mut restored, &scaled, buf.len(), Volume::UNITY).unwrap();
            for i in 0..buf.len() {
                prop_assert!((restored[i] - buf[i]).abs() < d);
            }
        }
    }
}
