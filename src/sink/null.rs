// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Built-in sink plugins that need no hardware: a discard sink for
//! running the engine without audio output, and a memory-capturing sink
//! for asserting on exactly what PCM the pipeline produced in tests.
//!
//! No hardware-backed sink (ALSA/PulseAudio/CoreAudio/...) ships here —
//! those are the outer shell's concern, same as the original's `op/`
//! plugins are separate shared objects loaded at runtime.

use std::sync::Arc;

use abi_stable::std_types::{RResult, RSlice};
use parking_lot::Mutex;
use playcore_plugin_api::{
    ChannelPosition, RawSampleFormat, SinkBox, SinkDescriptor, SinkError, SinkOps, SinkOps_TO,
    SinkResult, API_VERSION_MAJOR,
};

/// Dispatch metadata for the discard sink. Lowest priority: never picked
/// automatically, only when named explicitly.
pub fn descriptor() -> SinkDescriptor {
    SinkDescriptor {
        name: "null".into(),
        priority: i32::MIN,
        abi_version: API_VERSION_MAJOR,
        has_mixer: false,
    }
}

/// Factory for the discard sink.
pub extern "C" fn create_sink() -> SinkBox {
    SinkOps_TO::from_value(NullSink::default(), abi_stable::sabi_trait::TD_Opaque)
}

#[derive(Default)]
struct NullSink {
    open: bool,
}

impl SinkOps for NullSink {
    fn open(&mut self, _format: RawSampleFormat, _channel_map: RSlice<ChannelPosition>) -> SinkResult<()> {
        self.open = true;
        RResult::ROk(())
    }

    fn close(&mut self) -> SinkResult<()> {
        self.open = false;
        RResult::ROk(())
    }

    fn write(&mut self, buf: RSlice<u8>) -> SinkResult<u32> {
        if !self.open {
            return RResult::RErr(SinkError::NotOpen);
        }
        RResult::ROk(buf.len() as u32)
    }

    fn buffer_space(&mut self) -> SinkResult<i32> {
        if !self.open {
            return RResult::RErr(SinkError::NotOpen);
        }
        RResult::ROk(i32::MAX / 2)
    }

    fn drop_buffered(&mut self) -> SinkResult<()> {
        RResult::ROk(())
    }
}

/// Shared storage a `CaptureSink` writes into, readable from the test
/// thread that owns the `Arc`.
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// A fresh, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every byte written so far, in order.
    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    fn push(&self, data: &[u8]) {
        self.0.lock().extend_from_slice(data);
    }
}

/// A sink that records every byte written to it instead of playing
/// anything, for asserting on pipeline output in tests. Not part of the
/// plugin registry (it needs an externally-held `CaptureBuffer` handle,
/// which the ABI's zero-argument factory functions can't carry) — tests
/// construct and drive it directly as a `SinkOps` impl.
#[derive(Default)]
pub struct CaptureSink {
    buffer: CaptureBuffer,
    open: bool,
}

impl CaptureSink {
    /// A capture sink writing into `buffer`.
    pub fn new(buffer: CaptureBuffer) -> Self {
        Self { buffer, open: false }
    }
}

impl SinkOps for CaptureSink {
    fn open(&mut self, _format: RawSampleFormat, _channel_map: RSlice<ChannelPosition>) -> SinkResult<()> {
        self.open = true;
        RResult::ROk(())
    }

    fn close(&mut self) -> SinkResult<()> {
        self.open = false;
        RResult::ROk(())
    }

    fn write(&mut self, buf: RSlice<u8>) -> SinkResult<u32> {
        if !self.open {
            return RResult::RErr(SinkError::NotOpen);
        }
        self.buffer.push(buf.as_slice());
        RResult::ROk(buf.len() as u32)
    }

    fn buffer_space(&mut self) -> SinkResult<i32> {
        if !self.open {
            return RResult::RErr(SinkError::NotOpen);
        }
        RResult::ROk(i32::MAX / 2)
    }

    fn drop_buffered(&mut self) -> SinkResult<()> {
        RResult::ROk(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo16() -> RawSampleFormat {
        RawSampleFormat { rate: 44100, channels: 2, bits: 16, signed: true, big_endian: false }
    }

    #[test]
    fn null_sink_accepts_writes_once_open() {
        let mut sink = NullSink::default();
        assert!(matches!(sink.write(RSlice::from_slice(&[1, 2, 3])), RResult::RErr(_)));
        sink.open(stereo16(), RSlice::from_slice(&[])).into_result().unwrap();
        let n = sink.write(RSlice::from_slice(&[1, 2, 3])).into_result().unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn capture_sink_records_bytes() {
        let buffer = CaptureBuffer::new();
        let mut sink = CaptureSink::new(buffer.clone());
        sink.open(stereo16(), RSlice::from_slice(&[])).into_result().unwrap();
        sink.write(RSlice::from_slice(&[9, 9, 9])).into_result().unwrap();
        sink.write(RSlice::from_slice(&[1])).into_result().unwrap();
        assert_eq!(buffer.snapshot(), vec![9, 9, 9, 1]);
    }
}
