//! Mixer integration tests
//!
//! These run whole sessions on the null device and check what comes out of
//! the period cycle.

use std::sync::Arc;

use gamelib_mixer::sound::decoder::{decode_all, MemoryDecoder, PcmBuffer, SoundDecoder};
use gamelib_mixer::sound::mixer::convert::{convert_mix, decode_sample, encode_sample};
use gamelib_mixer::sound::mixer::{
    FormatRequest, MixSession, MixStack, NullDevice, NullDeviceHandle, SampleFormat,
    SampleFormatCode, SessionState, SourceStream, Volume,
};
use gamelib_mixer::sound::{write_wav, ToneDecoder, WavDecoder};

fn null_session() -> (MixSession, NullDeviceHandle) {
    let device = NullDevice::new();
    let handle = device.handle();
    (MixSession::new(Box::new(device)), handle)
}

fn clip(values: &[i32], channels: u8, frequency: u32) -> Arc<PcmBuffer> {
    let format = SampleFormat::from_code(SampleFormatCode::S16Native, channels).unwrap();
    let mut data = vec![0u8; values.len() * 2];
    for (i, &v) in values.iter().enumerate() {
        encode_sample(v, SampleFormatCode::S16Native, &mut data[i * 2..]).unwrap();
    }
    Arc::new(PcmBuffer {
        format,
        frequency,
        data,
    })
}

#[test]
fn test_cd_quality_period_round_trip() {
    let (mut session, handle) = null_session();
    let request = FormatRequest::new(44100, SampleFormatCode::S16Native, 2, 20);

    let mut constant = [0u8; 2];
    encode_sample(-12345, SampleFormatCode::S16Native, &mut constant).unwrap();
    let source = constant.repeat(882 * 2);
    let fill = move |acc: &mut [i32], frames: u32, _: &()| {
        let samples = frames as usize * 2;
        convert_mix(acc, &source, samples, SampleFormatCode::S16Native, Volume::UNITY).unwrap();
    };
    session.init(request, fill, ()).unwrap();

    let format = session.format().unwrap();
    assert_eq!(format.period_frames, 882);
    assert_eq!(format.buffer_bytes(), 3528);

    for _ in 0..3 {
        let out = handle.pump().unwrap();
        assert_eq!(out.len(), 3528);
        for i in 0..882 * 2 {
            assert_eq!(decode_sample(&out, i, SampleFormatCode::S16Native), Ok(-12345));
        }
    }

    session.quit();
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(handle.pump().is_none());
}

#[test]
fn test_two_half_volume_sources_average() {
    let a: Vec<i32> = (0..64).map(|i| i * 411 - 13000).collect();
    let b: Vec<i32> = (0..64).map(|i| 9000 - i * 277).collect();
    let device = NullDevice::new();
    let handle = device.handle();
    let mut session = MixSession::new(Box::new(device));

    let format = gamelib_mixer::sound::mixer::negotiate(
        &FormatRequest::new(8000, SampleFormatCode::S16Native, 1, 8),
        &gamelib_mixer::sound::mixer::DeviceCapabilities::unrestricted(),
    )
    .unwrap();
    assert_eq!(format.period_frames, 64);

    let mut stack = MixStack::new(false);
    for values in [&a, &b] {
        let decoder = MemoryDecoder::new(clip(values, 1, 8000));
        stack.push(SourceStream::new(Box::new(decoder), &format, Volume::HALF, false).unwrap());
    }
    session
        .init(
            FormatRequest::new(8000, SampleFormatCode::S16Native, 1, 8),
            stack,
            (),
        )
        .unwrap();

    let out = handle.pump().unwrap();
    for i in 0..64 {
        let mixed = decode_sample(&out, i, SampleFormatCode::S16Native).unwrap();
        let average = (a[i] + b[i]) / 2;
        assert!(
            (mixed - average).abs() <= 1,
            "frame {}: mixed {} vs average {}",
            i,
            mixed,
            average
        );
    }
}

#[test]
fn test_normalized_stack_matches_half_volume() {
    let format = gamelib_mixer::sound::mixer::negotiate(
        &FormatRequest::new(8000, SampleFormatCode::S16Native, 1, 1),
        &gamelib_mixer::sound::mixer::DeviceCapabilities::unrestricted(),
    )
    .unwrap();
    let tone_format = SampleFormat::from_code(SampleFormatCode::S16Native, 1).unwrap();

    let mut stack = MixStack::new(true);
    for value in [30000, 20000] {
        let tone = ToneDecoder::constant(value, tone_format, 8000);
        stack.push(SourceStream::new(Box::new(tone), &format, Volume::UNITY, false).unwrap());
    }
    let (mut session, handle) = null_session();
    session
        .init(FormatRequest::new(8000, SampleFormatCode::S16Native, 1, 1), stack, ())
        .unwrap();
    let out = handle.pump().unwrap();
    // Unnormalized this would saturate at 32767
    assert_eq!(decode_sample(&out, 0, SampleFormatCode::S16Native), Ok(25000));
}

#[test]
fn test_render_tone_to_wav() {
    let (mut session, handle) = null_session();
    let request = FormatRequest::new(22050, SampleFormatCode::S16Lsb, 2, 10);
    let format = gamelib_mixer::sound::mixer::negotiate(
        &request,
        &gamelib_mixer::sound::mixer::DeviceCapabilities::unrestricted(),
    )
    .unwrap();

    let mut stack = MixStack::new(false);
    let tone = ToneDecoder::sine(441.0, 0.5, format.sample, format.frequency);
    stack.push(SourceStream::new(Box::new(tone), &format, Volume::UNITY, false).unwrap());
    session.init(request, stack, ()).unwrap();

    let mut data = Vec::new();
    for _ in 0..5 {
        assert!(handle.pump_into(&mut data));
    }
    session.quit();
    assert_eq!(data.len(), 5 * format.buffer_bytes());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_wav(&path, format.sample, format.frequency, &data).unwrap();

    let mut decoder = WavDecoder::open(&path).unwrap();
    assert_eq!(decoder.frequency(), 22050);
    assert_eq!(decoder.length_frames(), Some(5 * format.period_frames));
    let pcm = decode_all(&mut decoder).unwrap();
    for i in 0..data.len() / 2 {
        assert_eq!(
            decode_sample(&pcm.data, i, SampleFormatCode::S16Native),
            decode_sample(&data, i, SampleFormatCode::S16Lsb)
        );
    }
    // Stereo channels carry the same signal
    assert_eq!(
        decode_sample(&data, 10, SampleFormatCode::S16Lsb),
        decode_sample(&data, 11, SampleFormatCode::S16Lsb)
    );
}
