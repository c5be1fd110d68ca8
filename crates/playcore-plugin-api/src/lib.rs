// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! playcore Plugin API
//!
//! This crate defines the stable ABI that decoder ("input") and sink
//! ("output") plugins bind to. A decoder turns bytes from a file or stream
//! into PCM; a sink turns PCM into sound (or a mixer paired with a sink
//! into a volume knob). Plugins may be linked in statically (built-in) or
//! loaded at runtime from a `cdylib` via `libloading` — both paths end up
//! vending the same `DecoderOps_TO`/`SinkOps_TO`/`MixerOps_TO` trait
//! objects, so the host never needs to know which.
//!
//! # Example decoder plugin
//!
//! ```ignore
//! use playcore_plugin_api::*;
//!
//! #[derive(Default)]
//! struct MyDecoder { /* ... */ }
//!
//! impl DecoderOps for MyDecoder {
//!     fn open(&mut self, filename: RStr) -> RResult<OpenedFormat, DecoderError> { todo!() }
//!     fn read(&mut self, buf: RSliceMut<u8>) -> RResult<u32, DecoderError> { todo!() }
//!     // ...
//! }
//!
//! declare_decoder_plugin!(MyDecoder, &["myext"], &["audio/x-my"]);
//! ```

#![warn(missing_docs)]
#![allow(non_local_definitions)]

use abi_stable::{
    sabi_trait,
    std_types::{RResult, RStr, RString, RVec},
    StableAbi,
};
use serde::{Deserialize, Serialize};

/// Major API version. Bump for breaking ABI changes.
pub const API_VERSION_MAJOR: u32 = 0;
/// Minor API version. Bump for additive, backwards-compatible changes.
pub const API_VERSION_MINOR: u32 = 1;

// ============================================================================
// Sample format / channel map (mirrors playcore::format, kept FFI-safe here)
// ============================================================================

/// Packed description of a PCM stream's layout.
///
/// Two formats compare equal iff all five fields match. See
/// `playcore::format::SampleFormat` for the host-side equivalent with
/// ergonomic accessors (`sample_size`, `frame_size`, `second_size`); this
/// type exists so it can cross the FFI boundary with a fixed layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi, Serialize, Deserialize)]
pub struct RawSampleFormat {
    /// Sample rate in Hz (0..=262_143 is representative of real devices).
    pub rate: u32,
    /// Channel count (1..=255).
    pub channels: u8,
    /// Bits per sample; one of 8, 16, 24, 32.
    pub bits: u8,
    /// Whether samples are signed.
    pub signed: bool,
    /// Whether samples are big-endian.
    pub big_endian: bool,
}

/// One channel slot position, drawn from the fixed WAVEEX-like set.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi, Serialize, Deserialize)]
pub enum ChannelPosition {
    /// Single downmixed channel.
    Mono,
    /// Front left.
    FrontLeft,
    /// Front right.
    FrontRight,
    /// Front center.
    FrontCenter,
    /// Rear left.
    RearLeft,
    /// Rear right.
    RearRight,
    /// Rear center.
    RearCenter,
    /// Side left.
    SideLeft,
    /// Side right.
    SideRight,
    /// Front left-of-center.
    FrontLeftOfCenter,
    /// Front right-of-center.
    FrontRightOfCenter,
    /// Low-frequency effects channel.
    Lfe,
    /// Top center.
    TopCenter,
    /// Not a valid channel slot (padding / unused).
    Invalid,
}

/// Maximum channels a `ChannelMap` can describe.
pub const CHANNELS_MAX: usize = 32;

// ============================================================================
// Errors
// ============================================================================

/// Error kinds a decoder plugin can report. Mirrors the distilled spec's
/// §7 taxonomy; `errno`-style system errors carry the raw OS error code
/// instead of relying on a global `errno`.
#[repr(C)]
#[derive(Debug, Clone, StableAbi, Serialize, Deserialize)]
pub enum DecoderError {
    /// A system call failed; `code` is the OS error code, `context` names
    /// the operation (`"opening file"`, `"reading file"`, ...).
    Errno {
        /// Raw OS error code (`errno` on Unix).
        code: i32,
        /// What we were doing when it failed.
        context: RString,
    },
    /// Bytes were read but don't form a valid instance of the claimed codec.
    FileFormat(RString),
    /// Extension/magic matched a plugin, but this specific variant isn't implemented.
    UnsupportedFileType(RString),
    /// Operation (seek, duration, ...) isn't implemented by this plugin.
    FunctionNotSupported,
    /// Malformed URI.
    InvalidUri(RString),
    /// Optical disc absent.
    NoDisc,
    /// Wrong disc inserted.
    WrongDisc,
    /// Malformed HTTP response line/headers.
    HttpResponse(RString),
    /// Non-2xx HTTP status.
    HttpStatus(u16),
    /// Too many HTTP redirects.
    HttpRedirectLimit,
    /// Plugin has no option by that name.
    NotOption(RString),
    /// Internal/impossible-state error.
    Internal(RString),
}

/// Error kinds a sink or mixer plugin can report.
#[repr(C)]
#[derive(Debug, Clone, StableAbi, Serialize, Deserialize)]
pub enum SinkError {
    /// A system call failed.
    Errno {
        /// Raw OS error code.
        code: i32,
        /// What we were doing when it failed.
        context: RString,
    },
    /// The device doesn't support the requested sample format.
    SampleFormat,
    /// No such plugin is registered.
    NoPlugin,
    /// Plugin hasn't been `init`ialized.
    NotInitialized,
    /// Sink/mixer hasn't been `open`ed.
    NotOpen,
    /// Operation not supported by this plugin.
    NotSupported,
    /// Plugin has no option by that name.
    NotOption(RString),
    /// Internal/impossible-state error.
    Internal(RString),
}

/// Result type a decoder operation returns across the ABI boundary.
pub type DecoderResult<T> = RResult<T, DecoderError>;
/// Result type a sink/mixer operation returns across the ABI boundary.
pub type SinkResult<T> = RResult<T, SinkError>;

// ============================================================================
// Decoder (input plugin) ABI
// ============================================================================

/// What `open` hands back: the format the plugin will deliver PCM in, plus
/// an optional channel map (omitted = WAVEEX default order for the count).
#[repr(C)]
#[derive(Debug, Clone, StableAbi)]
pub struct OpenedStream {
    /// Sample format the decoder will produce from here on.
    pub format: RawSampleFormat,
    /// Channel position for each of `format.channels` channels, or empty if
    /// the decoder has no opinion (host assumes default order).
    pub channel_map: RVec<ChannelPosition>,
    /// Whether this stream is a remote/network source (affects prebuffer
    /// sizing and EOF-vs-disconnect semantics in the host).
    pub remote: bool,
}

/// One read/write table-style option exposed by a plugin (akin to
/// `ip_options`/`op_pcm_options` in the reference ABI): by convention a
/// plugin exposes these as plain key/value strings rather than typed
/// setters, so the host can surface them generically.
#[repr(C)]
#[derive(Debug, Clone, StableAbi)]
pub struct PluginOption {
    /// Option name as exposed to the outer shell (`"device"`, `"buffer-time"`, ...).
    pub name: RString,
}

/// Capability set a decoder plugin implements. One instance per opened
/// file/stream; not `Sync` — only the producer thread touches it while
/// playing.
#[sabi_trait]
pub trait DecoderOps: Send {
    /// Open `filename` (which may be a URI). On success returns the format
    /// the plugin will deliver PCM in.
    fn open(&mut self, filename: RStr) -> DecoderResult<OpenedStream>;

    /// Produce up to `buf.len()` bytes of PCM. `0` means EOF. A plugin
    /// reports a retryable condition out-of-band by returning
    /// `RErr(DecoderError::Errno { code: EAGAIN, .. })`; the host treats
    /// exactly that shape as "try again soon", everything else as fatal.
    fn read(&mut self, buf: abi_stable::std_types::RSliceMut<u8>) -> DecoderResult<u32>;

    /// Seek to `seconds` from the start of the stream.
    fn seek(&mut self, seconds: f64) -> DecoderResult<()>;

    /// Key/value comments (tags). Empty if the container has none.
    fn read_comments(&mut self) -> DecoderResult<RVec<(RString, RString)>>;

    /// Total duration in seconds, if knowable without decoding the whole file.
    fn duration(&mut self) -> DecoderResult<f64>;

    /// Nominal bitrate in bits/second, if the container declares one.
    fn bitrate(&mut self) -> DecoderResult<i64>;

    /// Bitrate of the most recently decoded frame (for VBR streams).
    fn bitrate_current(&mut self) -> DecoderResult<i64>;

    /// Short codec name (`"flac"`, `"vorbis"`, ...).
    fn codec(&mut self) -> DecoderResult<RString>;

    /// Codec profile/variant, if the codec has such a notion.
    fn codec_profile(&mut self) -> DecoderResult<RString>;

    /// Shoutcast-style ICY in-band metaint, if this is a remote stream with
    /// interleaved metadata. `0` means "no in-band metadata".
    fn metaint(&self) -> u32 {
        0
    }
}

/// Boxed decoder instance.
pub type DecoderBox = DecoderOps_TO<'static, abi_stable::std_types::RBox<()>>;

/// Static metadata a decoder plugin exports alongside its vtable: the
/// extensions/MIME types used for dispatch, its tie-break priority, and
/// its declared ABI version.
#[repr(C)]
#[derive(Debug, Clone, StableAbi)]
pub struct DecoderDescriptor {
    /// Plugin-reported name, used in error messages.
    pub name: RString,
    /// File extensions this plugin claims (lowercase, no leading dot).
    pub extensions: RVec<RString>,
    /// MIME types this plugin claims.
    pub mime_types: RVec<RString>,
    /// URL schemes this plugin is the sole handler for (`"http"`, `"cdda"`, ...).
    pub schemes: RVec<RString>,
    /// Tie-break priority; higher wins when multiple plugins claim an extension.
    pub priority: i32,
    /// Whether this plugin is the `*` fallback used when nothing else matches.
    pub is_fallback: bool,
    /// ABI version this plugin was built against.
    pub abi_version: u32,
}

/// Factory function a decoder plugin exports: produces a fresh, unopened
/// instance every time the host needs to play another track of this type.
pub type DecoderFactoryFn = extern "C" fn() -> DecoderBox;

/// What a decoder plugin's entry point returns.
#[repr(C)]
pub struct DecoderPluginEntry {
    /// Static dispatch metadata.
    pub descriptor: DecoderDescriptor,
    /// Instance factory.
    pub create: DecoderFactoryFn,
}

/// Declares a native decoder plugin's `cdylib` entry point
/// (`playcore_decoder_entry`), analogous to the reference ABI's
/// `ip_ops`/`ip_extensions`/`ip_priority` exported statics.
#[macro_export]
macro_rules! declare_decoder_plugin {
    ($ty:ty, name = $name:expr, extensions = $exts:expr, mime_types = $mimes:expr, priority = $prio:expr $(,)?) => {
        #[no_mangle]
        pub extern "C" fn playcore_decoder_entry() -> $crate::DecoderPluginEntry {
            extern "C" fn create() -> $crate::DecoderBox {
                let decoder = <$ty as std::default::Default>::default();
                $crate::DecoderOps_TO::from_value(decoder, abi_stable::sabi_trait::TD_Opaque)
            }

            $crate::DecoderPluginEntry {
                descriptor: $crate::DecoderDescriptor {
                    name: $name.into(),
                    extensions: $exts
                        .iter()
                        .map(|s: &&str| (*s).into())
                        .collect::<abi_stable::std_types::RVec<_>>(),
                    mime_types: $mimes
                        .iter()
                        .map(|s: &&str| (*s).into())
                        .collect::<abi_stable::std_types::RVec<_>>(),
                    schemes: abi_stable::std_types::RVec::new(),
                    priority: $prio,
                    is_fallback: false,
                    abi_version: $crate::API_VERSION_MAJOR,
                },
                create,
            }
        }
    };
}

// ============================================================================
// Sink (output plugin) ABI
// ============================================================================

/// Capability set a sink (audio output) plugin implements.
#[sabi_trait]
pub trait SinkOps: Send {
    /// Open the device for `format`/`channel_map`. Implementations must
    /// reject formats they can't play with `SinkError::SampleFormat` so the
    /// host can try a narrower format instead.
    fn open(
        &mut self,
        format: RawSampleFormat,
        channel_map: abi_stable::std_types::RSlice<ChannelPosition>,
    ) -> SinkResult<()>;

    /// Close the device.
    fn close(&mut self) -> SinkResult<()>;

    /// Write up to `buf.len()` bytes (a multiple of the frame size already
    /// negotiated at `open`). Returns the number of bytes actually accepted.
    fn write(&mut self, buf: abi_stable::std_types::RSlice<u8>) -> SinkResult<u32>;

    /// Bytes the next `write` can accept without blocking for more than
    /// ~25ms. Always a multiple of the frame size; may be 0.
    fn buffer_space(&mut self) -> SinkResult<i32>;

    /// Discard any buffered-but-unplayed audio immediately.
    fn drop_buffered(&mut self) -> SinkResult<()>;

    /// Pause playback in place, if the device supports it natively.
    fn pause(&mut self) -> SinkResult<()> {
        RResult::ROk(())
    }

    /// Resume playback after `pause`.
    fn unpause(&mut self) -> SinkResult<()> {
        RResult::ROk(())
    }
}

/// Boxed sink instance.
pub type SinkBox = SinkOps_TO<'static, abi_stable::std_types::RBox<()>>;

/// Capability set an (optional) mixer companion to a sink implements.
#[sabi_trait]
pub trait MixerOps: Send {
    /// Open the mixer; returns the maximum representable volume value.
    fn open(&mut self) -> SinkResult<i32>;

    /// Close the mixer.
    fn close(&mut self) -> SinkResult<()>;

    /// Set left/right volume, `0..=volume_max`.
    fn set_volume(&mut self, left: i32, right: i32) -> SinkResult<()>;

    /// Read back left/right volume.
    fn get_volume(&mut self) -> SinkResult<(i32, i32)>;
}

/// Boxed mixer instance.
pub type MixerBox = MixerOps_TO<'static, abi_stable::std_types::RBox<()>>;

/// Static metadata a sink plugin exports.
#[repr(C)]
#[derive(Debug, Clone, StableAbi)]
pub struct SinkDescriptor {
    /// Plugin-reported name (`"alsa"`, `"pulse"`, ...), used for `set_op`/error messages.
    pub name: RString,
    /// Tie-break priority; higher is tried first when no sink is named explicitly.
    pub priority: i32,
    /// ABI version this plugin was built against.
    pub abi_version: u32,
    /// Whether this plugin also vends a `MixerOps` companion.
    pub has_mixer: bool,
}

/// Factory functions a sink plugin exports.
pub type SinkFactoryFn = extern "C" fn() -> SinkBox;
/// Factory function for the optional mixer companion.
pub type MixerFactoryFn = extern "C" fn() -> MixerBox;

/// What a sink plugin's entry point returns.
#[repr(C)]
pub struct SinkPluginEntry {
    /// Static dispatch metadata.
    pub descriptor: SinkDescriptor,
    /// Sink instance factory.
    pub create_sink: SinkFactoryFn,
    /// Mixer instance factory, present iff `descriptor.has_mixer`.
    pub create_mixer: Option<MixerFactoryFn>,
}

/// Declares a native sink plugin's `cdylib` entry point
/// (`playcore_sink_entry`), analogous to the reference ABI's
/// `op_pcm_ops`/`op_priority` exported statics.
#[macro_export]
macro_rules! declare_sink_plugin {
    ($ty:ty, name = $name:expr, priority = $prio:expr $(,)?) => {
        #[no_mangle]
        pub extern "C" fn playcore_sink_entry() -> $crate::SinkPluginEntry {
            extern "C" fn create_sink() -> $crate::SinkBox {
                let sink = <$ty as std::default::Default>::default();
                $crate::SinkOps_TO::from_value(sink, abi_stable::sabi_trait::TD_Opaque)
            }

            $crate::SinkPluginEntry {
                descriptor: $crate::SinkDescriptor {
                    name: $name.into(),
                    priority: $prio,
                    abi_version: $crate::API_VERSION_MAJOR,
                    has_mixer: false,
                },
                create_sink,
                create_mixer: None,
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_sample_format_equality() {
        let a = RawSampleFormat { rate: 44100, channels: 2, bits: 16, signed: true, big_endian: false };
        let b = a;
        assert_eq!(a, b);
        let c = RawSampleFormat { channels: 1, ..a };
        assert_ne!(a, c);
    }

    #[test]
    fn decoder_descriptor_roundtrips_through_macro_shape() {
        let d = DecoderDescriptor {
            name: "wav".into(),
            extensions: RVec::from(vec![RString::from("wav")]),
            mime_types: RVec::from(vec![RString::from("audio/wav")]),
            schemes: RVec::new(),
            priority: 0,
            is_fallback: false,
            abi_version: API_VERSION_MAJOR,
        };
        assert_eq!(d.extensions.len(), 1);
        assert!(!d.is_fallback);
    }
}
