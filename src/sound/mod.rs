//! Sound module
//!
//! The mixing engine lives in `mixer`; the rest are PCM sources it can pull
//! from.
//!
//! # Architecture
//!
//! - `SoundDecoder` trait defines the pull interface
//! - Individual decoder implementations (Ogg, WAV, generated tones)
//! - `write_wav` persists rendered output
//! - `mixer` holds the engine, its devices and the C ABI

pub mod decoder;
pub mod mixer;
pub mod ogg;
pub mod tone;
pub mod wav;

pub use decoder::{decode_all, DecodeError, DecodeResult, MemoryDecoder, PcmBuffer, SoundDecoder};
pub use ogg::OggDecoder;
pub use tone::ToneDecoder;
pub use wav::{write_wav, WavDecoder};

use std::path::Path;

/// Open an audio file, picking the decoder from its extension.
///
/// Files without a known extension are tried as WAV, then Ogg Vorbis.
pub fn open_decoder(path: &Path) -> DecodeResult<Box<dyn SoundDecoder>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("ogg") | Some("oga") => Ok(Box::new(OggDecoder::open(path)?)),
        Some("wav") | Some("wave") => Ok(Box::new(WavDecoder::open(path)?)),
        _ => {
            let data = std::fs::read(path)
                .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;
            if let Ok(wav) = WavDecoder::open_from_bytes(data.clone()) {
                return Ok(Box::new(wav));
            }
            OggDecoder::open_from_bytes(data)
                .map(|ogg| Box::new(ogg) as Box<dyn SoundDecoder>)
                .map_err(|_| DecodeError::UnsupportedFormat(path.display().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let format = mixer::SampleFormat::from_code(mixer::SampleFormatCode::S8, 1).unwrap();
        let decoder = ToneDecoder::constant(0, format, 8000);
        assert_eq!(decoder.name(), "Tone");
    }

    #[test]
    fn test_open_decoder_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let format = mixer::SampleFormat::from_code(mixer::SampleFormatCode::S16Lsb, 1).unwrap();
        let path = dir.path().join("clip.pcm");
        write_wav(&path, format, 11025, &[0, 0, 1, 0]).unwrap();
        let decoder = open_decoder(&path).unwrap();
        assert_eq!(decoder.name(), "WAV");
        assert_eq!(decoder.frequency(), 11025);

        let junk = dir.path().join("junk.bin");
        std::fs::write(&junk, b"nothing to see").unwrap();
        assert!(matches!(open_decoder(&junk), Err(DecodeError::UnsupportedFormat(_))));
        assert!(matches!(
            open_decoder(&dir.path().join("missing.ogg")),
            Err(DecodeError::NotFound(_))
        ));
    }
}
