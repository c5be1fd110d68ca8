// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! End-to-end engine tests: a synthetic WAV through the real producer and
//! consumer threads against the built-in null sink, plus a couple of
//! fixture decoders for scenarios the WAV decoder can't exercise on its
//! own (a remote stream that disconnects mid-read).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use abi_stable::std_types::{RResult, RSliceMut, RStr, RString, RVec};
use playcore::config::EngineConfig;
use playcore::engine::{PlayerEngine, SeekTarget};
use playcore::track::TrackInfo;
use playcore::PlayerStatus;
use playcore_plugin_api::{
    DecoderBox, DecoderDescriptor, DecoderError, DecoderOps, DecoderOps_TO, DecoderResult,
    OpenedStream, RawSampleFormat, API_VERSION_MAJOR,
};

fn wait_until(mut pred: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

fn write_silent_wav(path: &std::path::Path, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (44100.0 * seconds) as u32;
    for _ in 0..frames {
        writer.write_sample(0i16).unwrap();
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn play_short_wav_reaches_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silence.wav");
    write_silent_wav(&path, 1.0);

    let engine = PlayerEngine::new(EngineConfig::default());
    engine.start();
    engine.play_file(TrackInfo::new(path.to_string_lossy().to_string(), None, vec![]));

    let reached = wait_until(
        || engine.player_info().status() == PlayerStatus::Stopped,
        Duration::from_secs(5),
    );
    assert!(reached, "playback never reached Stopped");

    let info = engine.player_info();
    assert!(info.error_msg().is_none(), "unexpected error: {:?}", info.error_msg());
    assert!(info.track().is_some(), "track should remain set after natural EOF");

    engine.shutdown();
}

#[test]
fn seek_forward_moves_position_and_resets_buffer_fill() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.wav");
    write_silent_wav(&path, 5.0);

    let engine = PlayerEngine::new(EngineConfig::default());
    engine.start();
    engine.play_file(TrackInfo::new(path.to_string_lossy().to_string(), None, vec![]));

    wait_until(|| engine.player_info().buffer_fill() > 0, Duration::from_secs(2));

    engine.seek(SeekTarget::Absolute(3.0)).unwrap();
    let info = engine.player_info();
    assert!(info.position() >= 2, "position {} should be near the seek target", info.position());

    engine.shutdown();
}

#[test]
fn pause_and_resume_round_trips_status() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.wav");
    write_silent_wav(&path, 5.0);

    let engine = PlayerEngine::new(EngineConfig::default());
    engine.start();
    engine.play_file(TrackInfo::new(path.to_string_lossy().to_string(), None, vec![]));
    wait_until(|| engine.player_info().status() == PlayerStatus::Playing, Duration::from_secs(2));

    engine.pause();
    assert_eq!(engine.player_info().status(), PlayerStatus::Paused);

    engine.pause();
    assert_eq!(engine.player_info().status(), PlayerStatus::Playing);

    engine.shutdown();
}

#[test]
fn resizing_buffer_resumes_prior_playback_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.wav");
    write_silent_wav(&path, 5.0);

    let engine = PlayerEngine::new(EngineConfig::default());
    engine.start();
    engine.play_file(TrackInfo::new(path.to_string_lossy().to_string(), None, vec![]));
    wait_until(|| engine.player_info().status() == PlayerStatus::Playing, Duration::from_secs(2));

    let before = engine.get_buffer_chunks();
    engine.set_buffer_chunks(6);
    assert_ne!(engine.get_buffer_chunks(), before);
    assert_eq!(
        engine.player_info().status(),
        PlayerStatus::Playing,
        "resize should resume playback rather than leaving it stopped"
    );

    engine.shutdown();
}

// ---- fixture decoder for the remote-disconnect scenario (E6) ----

/// Claims to be a remote stream and reports EOF on the very first `read`,
/// simulating an unannounced connection drop.
#[derive(Default)]
struct FlakyRemoteDecoder;

impl DecoderOps for FlakyRemoteDecoder {
    fn open(&mut self, _filename: RStr) -> DecoderResult<OpenedStream> {
        RResult::ROk(OpenedStream {
            format: RawSampleFormat { rate: 44100, channels: 2, bits: 16, signed: true, big_endian: false },
            channel_map: RVec::new(),
            remote: true,
        })
    }

    fn read(&mut self, _buf: RSliceMut<u8>) -> DecoderResult<u32> {
        RResult::ROk(0)
    }

    fn seek(&mut self, _seconds: f64) -> DecoderResult<()> {
        RResult::RErr(DecoderError::FunctionNotSupported)
    }

    fn read_comments(&mut self) -> DecoderResult<RVec<(RString, RString)>> {
        RResult::ROk(RVec::new())
    }

    fn duration(&mut self) -> DecoderResult<f64> {
        RResult::RErr(DecoderError::FunctionNotSupported)
    }

    fn bitrate(&mut self) -> DecoderResult<i64> {
        RResult::RErr(DecoderError::FunctionNotSupported)
    }

    fn bitrate_current(&mut self) -> DecoderResult<i64> {
        RResult::RErr(DecoderError::FunctionNotSupported)
    }

    fn codec(&mut self) -> DecoderResult<RString> {
        RResult::RErr(DecoderError::FunctionNotSupported)
    }

    fn codec_profile(&mut self) -> DecoderResult<RString> {
        RResult::RErr(DecoderError::FunctionNotSupported)
    }
}

extern "C" fn create_flaky_remote() -> DecoderBox {
    DecoderOps_TO::from_value(FlakyRemoteDecoder, abi_stable::sabi_trait::TD_Opaque)
}

fn flaky_remote_descriptor() -> DecoderDescriptor {
    DecoderDescriptor {
        name: "flaky-remote".into(),
        extensions: RVec::new(),
        mime_types: RVec::new(),
        schemes: RVec::from(vec![RString::from("flaky")]),
        priority: 0,
        is_fallback: false,
        abi_version: API_VERSION_MAJOR,
    }
}

#[test]
fn remote_disconnect_stops_without_advancing() {
    static GET_NEXT_CALLED: AtomicBool = AtomicBool::new(false);

    let engine = PlayerEngine::new(EngineConfig::default());
    engine.register_decoder(flaky_remote_descriptor(), create_flaky_remote);
    engine.set_get_next(|| {
        GET_NEXT_CALLED.store(true, Ordering::SeqCst);
        None
    });
    engine.start();
    engine.play_file(TrackInfo::new("flaky://stream", None, vec![]));

    let reached = wait_until(
        || engine.player_info().status() == PlayerStatus::Stopped,
        Duration::from_secs(5),
    );
    assert!(reached, "engine never stopped after the simulated disconnect");

    let info = engine.player_info();
    assert!(info.error_msg().is_some(), "a disconnect should surface an error message");
    assert!(!GET_NEXT_CALLED.load(Ordering::SeqCst), "get_next must not be called after a remote disconnect");

    engine.shutdown();
}
