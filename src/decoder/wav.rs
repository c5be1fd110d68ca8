// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Built-in WAV decoder plugin.
//!
//! Ground truth: cmus's `ip/wav.c` for the operation set and the
//! `codec`/`bitrate` formulas (`pcm_s16le`-style codec string,
//! `bits * rate * channels` bitrate); actual RIFF parsing is delegated to
//! `hound` (grounded on the pack's `MacinMeter` example, which reads WAV
//! files the same way) rather than hand-rolled, since this plugin exists
//! to exercise the decoder ABI end to end, not to reimplement a WAV parser.

use std::fs::File;
use std::io::BufReader;

use abi_stable::std_types::{RResult, RSliceMut, RStr, RString, RVec};
use hound::{SampleFormat as HoundSampleFormat, WavReader};
use playcore_plugin_api::{
    DecoderBox, DecoderDescriptor, DecoderError, DecoderOps, DecoderOps_TO, DecoderResult,
    OpenedStream, RawSampleFormat, API_VERSION_MAJOR,
};

/// Dispatch metadata for the built-in WAV plugin. Low priority so an
/// external, more capable WAV plugin (if ever loaded) would be preferred.
pub fn descriptor() -> DecoderDescriptor {
    DecoderDescriptor {
        name: "wav".into(),
        extensions: RVec::from(vec![RString::from("wav")]),
        mime_types: RVec::from(vec![RString::from("audio/wav"), RString::from("audio/x-wav")]),
        schemes: RVec::new(),
        priority: 0,
        is_fallback: false,
        abi_version: API_VERSION_MAJOR,
    }
}

/// Factory for a fresh, unopened instance.
pub extern "C" fn create() -> DecoderBox {
    DecoderOps_TO::from_value(WavDecoder::default(), abi_stable::sabi_trait::TD_Opaque)
}

#[derive(Default)]
pub(crate) struct WavDecoder {
    state: Option<State>,
}

struct State {
    reader: WavReader<BufReader<File>>,
    bytes_per_sample: u32,
    channels: u32,
    rate: u32,
    bits: u16,
    signed: bool,
    sample_format: HoundSampleFormat,
    total_frames: u32,
}

impl DecoderOps for WavDecoder {
    fn open(&mut self, filename: RStr) -> DecoderResult<OpenedStream> {
        let path = filename.as_str();
        let reader = match WavReader::open(path) {
            Ok(r) => r,
            Err(e) => return RResult::RErr(hound_to_decoder_error(e)),
        };
        let spec = reader.spec();
        let bytes_per_sample = spec.bits_per_sample as u32 / 8;
        let total_frames = reader.duration();

        self.state = Some(State {
            reader,
            bytes_per_sample,
            channels: spec.channels as u32,
            rate: spec.sample_rate,
            bits: spec.bits_per_sample,
            signed: spec.sample_format == HoundSampleFormat::Int && spec.bits_per_sample != 8,
            sample_format: spec.sample_format,
            total_frames,
        });

        let state = self.state.as_ref().unwrap();
        RResult::ROk(OpenedStream {
            format: RawSampleFormat {
                rate: state.rate,
                channels: state.channels as u8,
                bits: state.bits as u8,
                signed: state.signed,
                big_endian: false,
            },
            channel_map: RVec::new(),
            remote: false,
        })
    }

    fn read(&mut self, mut buf: RSliceMut<u8>) -> DecoderResult<u32> {
        let Some(state) = self.state.as_mut() else {
            return RResult::RErr(DecoderError::Internal("read before open".into()));
        };
        let bytes_per_sample = state.bytes_per_sample as usize;
        if bytes_per_sample == 0 {
            return RResult::RErr(DecoderError::FileFormat("unsupported bit depth".into()));
        }

        let mut written = 0usize;
        let max_samples = buf.len() / bytes_per_sample;
        for _ in 0..max_samples {
            let sample: i32 = match state.sample_format {
                HoundSampleFormat::Int => match state.reader.samples::<i32>().next() {
                    Some(Ok(s)) => s,
                    Some(Err(e)) => return RResult::RErr(hound_to_decoder_error(e)),
                    None => break,
                },
                HoundSampleFormat::Float => match state.reader.samples::<f32>().next() {
                    Some(Ok(s)) => (s * i32::MAX as f32) as i32,
                    Some(Err(e)) => return RResult::RErr(hound_to_decoder_error(e)),
                    None => break,
                },
            };
            let bytes = sample.to_le_bytes();
            buf[written..written + bytes_per_sample].copy_from_slice(&bytes[..bytes_per_sample]);
            written += bytes_per_sample;
        }
        RResult::ROk(written as u32)
    }

    fn seek(&mut self, seconds: f64) -> DecoderResult<()> {
        let Some(state) = self.state.as_mut() else {
            return RResult::RErr(DecoderError::Internal("seek before open".into()));
        };
        let frame = (seconds.max(0.0) * state.rate as f64) as u32;
        match state.reader.seek(frame) {
            Ok(()) => RResult::ROk(()),
            Err(e) => RResult::RErr(hound_to_decoder_error(e)),
        }
    }

    fn read_comments(&mut self) -> DecoderResult<RVec<(RString, RString)>> {
        // hound doesn't surface LIST/INFO chunks; the reference plugin reads
        // them directly off the fd. Not implemented here — empty tag set.
        RResult::ROk(RVec::new())
    }

    fn duration(&mut self) -> DecoderResult<f64> {
        match &self.state {
            Some(state) if state.rate > 0 => {
                RResult::ROk(state.total_frames as f64 / state.rate as f64)
            }
            _ => RResult::RErr(DecoderError::FunctionNotSupported),
        }
    }

    fn bitrate(&mut self) -> DecoderResult<i64> {
        match &self.state {
            Some(state) => {
                RResult::ROk(state.bits as i64 * state.rate as i64 * state.channels as i64)
            }
            None => RResult::RErr(DecoderError::FunctionNotSupported),
        }
    }

    fn bitrate_current(&mut self) -> DecoderResult<i64> {
        self.bitrate()
    }

    fn codec(&mut self) -> DecoderResult<RString> {
        match &self.state {
            Some(state) => RResult::ROk(
                format!("pcm_{}{}le", if state.signed { 's' } else { 'u' }, state.bits).into(),
            ),
            None => RResult::RErr(DecoderError::FunctionNotSupported),
        }
    }

    fn codec_profile(&mut self) -> DecoderResult<RString> {
        RResult::RErr(DecoderError::FunctionNotSupported)
    }
}

fn hound_to_decoder_error(e: hound::Error) -> DecoderError {
    match e {
        hound::Error::IoError(io_err) => DecoderError::Errno {
            code: io_err.raw_os_error().unwrap_or(libc_eio()),
            context: "wav i/o".into(),
        },
        hound::Error::FormatError(msg) => DecoderError::FileFormat(msg.into()),
        hound::Error::Unsupported => DecoderError::UnsupportedFileType("wav".into()),
        other => DecoderError::Internal(other.to_string().into()),
    }
}

fn libc_eio() -> i32 {
    5 // EIO, used when the OS error code isn't available
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_claims_wav_extension() {
        let d = descriptor();
        assert!(d.extensions.iter().any(|e| e.as_str() == "wav"));
        assert!(!d.is_fallback);
    }
}
