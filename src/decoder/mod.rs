// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Decoder ("input plugin") host-side wrapper and registry (component C).
//!
//! Ground truth: `ip.h`'s `input_plugin_ops`/`input_plugin_data` and
//! `player.c`'s `ip_new` plugin-selection policy.

pub mod wav;

use std::collections::HashMap;

use abi_stable::std_types::{RSliceMut, RStr};
use playcore_plugin_api::{
    ChannelPosition, DecoderBox, DecoderDescriptor, DecoderError, DecoderFactoryFn,
};

use crate::error::{decoder_ctx, EngineError};
use crate::format::{ChannelMap, SampleFormat};

/// `errno` value a plugin uses in `DecoderError::Errno` to signal a
/// retryable read rather than a fatal one.
const EAGAIN: i32 = 11;

/// Outcome of `Decoder::read`, distinguishing a retryable condition from
/// data/EOF so callers don't have to inspect error payloads themselves.
/// Ground: spec's `-EAGAIN → release, sleep 50 ms` vs. `fatal negative →
/// publish error` branch in `producer_loop`.
pub enum ReadOutcome {
    /// `n` bytes of PCM; `0` means EOF.
    Data(usize),
    /// The plugin isn't ready yet; not an error, try again shortly.
    Retry,
}

/// Host-side handle to an open decoder instance, plus the Shoutcast ICY
/// splicing state when the stream carries in-band metadata.
pub struct Decoder {
    inner: DecoderBox,
    name: String,
    location: String,
    format: SampleFormat,
    channel_map: ChannelMap,
    remote: bool,
    splicer: Option<MetadataSplicer>,
    closed: bool,
}

impl Decoder {
    /// Sample format this decoder is producing PCM in.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Channel map reported at `open`, if any.
    pub fn channel_map(&self) -> &ChannelMap {
        &self.channel_map
    }

    /// Whether this is a remote/network source.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// The most recent in-band metadata string spliced out of `read`, if
    /// one has arrived since the last call.
    pub fn take_metadata_changed(&mut self) -> Option<String> {
        self.splicer.as_mut().and_then(MetadataSplicer::take_pending)
    }

    /// Produce up to `buf.len()` bytes of PCM. `Data(0)` means EOF; `Retry`
    /// means the plugin reported `EAGAIN` and isn't a fatal error.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, EngineError> {
        let result = if let Some(splicer) = &mut self.splicer {
            splicer.read(&mut self.inner, buf)
        } else {
            raw_read(&mut self.inner, buf)
        };
        match result {
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(DecoderError::Errno { code, .. }) if code == EAGAIN => Ok(ReadOutcome::Retry),
            Err(e) => Err(decoder_ctx(format!("reading `{}'", self.location), e)),
        }
    }

    /// Seek to `seconds` from the start of the stream.
    pub fn seek(&mut self, seconds: f64) -> Result<(), EngineError> {
        self.inner
            .seek(seconds)
            .into_result()
            .map_err(|e| decoder_ctx(format!("seeking `{}'", self.location), e))
    }

    /// Key/value comments (tags).
    pub fn read_comments(&mut self) -> Result<Vec<(String, String)>, EngineError> {
        self.inner
            .read_comments()
            .into_result()
            .map(|v| v.into_iter().map(|(k, val)| (k.into(), val.into())).collect())
            .map_err(|e| decoder_ctx(format!("reading comments of `{}'", self.location), e))
    }

    /// Total duration in seconds, if known. `FunctionNotSupported` is
    /// folded into `None` rather than propagated, matching the reference's
    /// treatment of `ip_duration() < 0` as "unknown" rather than fatal.
    pub fn duration(&mut self) -> Option<f64> {
        match self.inner.duration().into_result() {
            Ok(d) => Some(d),
            Err(_) => None,
        }
    }

    /// Nominal bitrate, if the container declares one.
    pub fn bitrate(&mut self) -> Option<i64> {
        self.inner.bitrate().into_result().ok()
    }

    /// Bitrate of the most recently decoded frame.
    pub fn bitrate_current(&mut self) -> Option<i64> {
        self.inner.bitrate_current().into_result().ok()
    }

    /// Short codec name.
    pub fn codec(&mut self) -> Option<String> {
        self.inner.codec().into_result().ok().map(Into::into)
    }

    /// Codec profile/variant.
    pub fn codec_profile(&mut self) -> Option<String> {
        self.inner.codec_profile().into_result().ok().map(Into::into)
    }

    /// Plugin-reported name, for diagnostics.
    pub fn plugin_name(&self) -> &str {
        &self.name
    }

    /// Release this instance. Idempotent; also runs on `Drop`.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        // DecoderOps has no explicit close: the reference ABI's ip_close
        // just frees plugin-private state, which Rust's Drop on the boxed
        // trait object already does for us.
        let _ = self.closed;
    }
}

fn raw_read(inner: &mut DecoderBox, buf: &mut [u8]) -> Result<usize, DecoderError> {
    inner
        .read(RSliceMut::from_mut_slice(buf))
        .into_result()
        .map(|n| n as usize)
}

/// Splices Shoutcast/ICY in-band metadata out of a remote stream's byte
/// stream. Ground: spec's "Shoutcast metadata interposer" — every
/// `metaint` bytes of audio, a single length byte (×16 = byte count)
/// precedes a metadata block, neither of which the caller should see.
struct MetadataSplicer {
    metaint: u32,
    bytes_until_marker: u32,
    pending: Option<String>,
}

impl MetadataSplicer {
    fn new(metaint: u32) -> Self {
        Self {
            metaint,
            bytes_until_marker: metaint,
            pending: None,
        }
    }

    fn take_pending(&mut self) -> Option<String> {
        self.pending.take()
    }

    /// Fill `out` with audio bytes only, consuming and stripping any
    /// metadata block encountered along the way. May read fewer bytes than
    /// `out.len()` if a metadata block falls inside the requested range.
    fn read(&mut self, inner: &mut DecoderBox, out: &mut [u8]) -> Result<usize, DecoderError> {
        let mut written = 0;
        while written < out.len() {
            if self.bytes_until_marker == 0 {
                let mut len_byte = [0u8; 1];
                let n = raw_read(inner, &mut len_byte)?;
                if n == 0 {
                    break;
                }
                let meta_len = len_byte[0] as usize * 16;
                if meta_len > 0 {
                    let mut meta_buf = vec![0u8; meta_len];
                    let mut filled = 0;
                    while filled < meta_len {
                        let n = raw_read(inner, &mut meta_buf[filled..])?;
                        if n == 0 {
                            break;
                        }
                        filled += n;
                    }
                    meta_buf.truncate(filled);
                    let text = String::from_utf8_lossy(&meta_buf)
                        .trim_end_matches('\0')
                        .to_string();
                    if !text.is_empty() {
                        self.pending = Some(text);
                    }
                }
                self.bytes_until_marker = self.metaint;
            }

            let chunk_len = (out.len() - written).min(self.bytes_until_marker as usize);
            if chunk_len == 0 {
                continue;
            }
            let n = raw_read(inner, &mut out[written..written + chunk_len])?;
            if n == 0 {
                break;
            }
            written += n;
            self.bytes_until_marker -= n as u32;
        }
        Ok(written)
    }
}

/// One registered decoder plugin: its dispatch metadata plus a factory
/// that produces a fresh instance per `open`.
struct Registered {
    descriptor: DecoderDescriptor,
    create: DecoderFactoryFn,
}

/// Selects and opens decoder plugins by URL scheme, then extension
/// (tie-broken by priority), then a fallback plugin — the registry-side
/// half of spec's four-step policy (MIME/magic probing is omitted: no
/// built-in plugin needs it, and the fallback plugin covers the rest).
#[derive(Default)]
pub struct DecoderRegistry {
    plugins: Vec<Registered>,
    by_scheme: HashMap<String, usize>,
    by_extension: HashMap<String, Vec<usize>>,
    fallback: Option<usize>,
}

impl DecoderRegistry {
    /// An empty registry with no plugins registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with every built-in decoder plugin.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(wav::descriptor(), wav::create);
        reg
    }

    /// Register a plugin's dispatch metadata and instance factory.
    pub fn register(&mut self, descriptor: DecoderDescriptor, create: DecoderFactoryFn) {
        let idx = self.plugins.len();
        for scheme in &descriptor.schemes {
            self.by_scheme.insert(scheme.to_string().to_lowercase(), idx);
        }
        for ext in &descriptor.extensions {
            self.by_extension
                .entry(ext.to_string().to_lowercase())
                .or_default()
                .push(idx);
        }
        if descriptor.is_fallback {
            self.fallback = Some(idx);
        }
        self.plugins.push(Registered { descriptor, create });
    }

    fn select(&self, location: &str) -> Option<usize> {
        if let Some(scheme) = url_scheme(location) {
            if let Some(&idx) = self.by_scheme.get(&scheme) {
                return Some(idx);
            }
        }
        if let Some(ext) = extension_of(location) {
            if let Some(candidates) = self.by_extension.get(&ext) {
                return candidates
                    .iter()
                    .copied()
                    .max_by_key(|&i| self.plugins[i].descriptor.priority);
            }
        }
        self.fallback
    }

    /// Open `location` (a path or URL) through whichever registered plugin
    /// claims it, per the selection policy above.
    pub fn open(&self, location: &str) -> Result<Decoder, EngineError> {
        let idx = self
            .select(location)
            .ok_or_else(|| EngineError::NoPlugin(location.to_string()))?;
        let plugin = &self.plugins[idx];
        let mut inner = (plugin.create)();
        let opened = inner
            .open(RStr::from_str(location))
            .into_result()
            .map_err(|e| decoder_ctx(format!("opening `{location}'"), e))?;

        let format = SampleFormat::from_raw(opened.format);
        let channel_map = ChannelMap::new(opened.channel_map.into_iter().collect::<Vec<ChannelPosition>>());
        let metaint = inner.metaint();
        let splicer = (opened.remote && metaint > 0).then(|| MetadataSplicer::new(metaint));

        Ok(Decoder {
            inner,
            name: plugin.descriptor.name.to_string(),
            location: location.to_string(),
            format,
            channel_map,
            remote: opened.remote,
            splicer,
            closed: false,
        })
    }
}

fn url_scheme(location: &str) -> Option<String> {
    location.find("://").map(|i| location[..i].to_lowercase())
}

fn extension_of(location: &str) -> Option<String> {
    let name = location.rsplit(['/', '\\']).next().unwrap_or(location);
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_dispatch_is_case_insensitive() {
        assert_eq!(extension_of("/music/Song.FLAC"), Some("flac".to_string()));
        assert_eq!(extension_of("noext"), None);
    }

    #[test]
    fn scheme_is_detected_before_extension() {
        assert_eq!(url_scheme("http://example.com/stream.mp3"), Some("http".to_string()));
        assert_eq!(url_scheme("/local/file.mp3"), None);
    }

    #[test]
    fn unclaimed_file_without_fallback_errors() {
        let reg = DecoderRegistry::new();
        let err = reg.open("song.xyz").unwrap_err();
        assert!(matches!(err, EngineError::NoPlugin(_)));
    }
}
