// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sample format and channel map value types (component A).
//!
//! Ground truth: cmus's `sf.h` packs these five fields into one
//! `sample_format_t` bitfield. A plain struct is more idiomatic in Rust and
//! the spec only requires the derived sizes and equality, so the packed
//! representation isn't reproduced — only its semantics are.

use playcore_plugin_api::{ChannelPosition, RawSampleFormat};

/// Describes the layout of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Channel count, 1..=255.
    pub channels: u8,
    /// Bits per sample: one of 8, 16, 24, 32.
    pub bits: u8,
    /// Whether samples are signed.
    pub signed: bool,
    /// Whether samples are stored big-endian.
    pub big_endian: bool,
}

impl SampleFormat {
    /// CD-quality 16-bit signed little-endian stereo.
    pub const CD_STEREO: SampleFormat = SampleFormat {
        rate: 44_100,
        channels: 2,
        bits: 16,
        signed: true,
        big_endian: false,
    };

    /// Bytes per sample.
    pub fn sample_size(&self) -> u32 {
        self.bits as u32 / 8
    }

    /// Bytes per frame (one sample on every channel).
    pub fn frame_size(&self) -> u32 {
        self.sample_size() * self.channels as u32
    }

    /// Bytes of PCM representing one second of audio.
    pub fn second_size(&self) -> u32 {
        self.frame_size() * self.rate
    }

    /// Whether `open` should accept this format. Rejects degenerate
    /// combinations such as zero channels or a bit depth that isn't one of
    /// the four supported widths.
    pub fn is_valid(&self) -> bool {
        self.channels > 0
            && matches!(self.bits, 8 | 16 | 24 | 32)
            && self.rate > 0
            && self.rate <= 0x3_ffff
    }

    /// True for the narrow format the ring buffer and scaler operate on:
    /// 16-bit signed interleaved, mono or stereo, native (little) endian.
    pub fn is_scalable(&self) -> bool {
        self.bits == 16 && self.signed && !self.big_endian && (self.channels == 1 || self.channels == 2)
    }

    /// Narrow a decoder-reported format the way `set_buffer_sf` does in the
    /// reference: formats with `channels <= 2` and `bits <= 16` are
    /// narrowed to signed 16-bit at the same rate and channel count so the
    /// ring buffer and scaler have a single format to reason about. Wider
    /// formats (24/32-bit, >2 channels) pass through unchanged — the ring
    /// buffer then just carries opaque bytes and the scaler is a no-op for
    /// them per §4.4.
    pub fn narrowed(&self) -> SampleFormat {
        if self.channels <= 2 && self.bits <= 16 {
            SampleFormat {
                rate: self.rate,
                channels: self.channels,
                bits: 16,
                signed: true,
                big_endian: false,
            }
        } else {
            *self
        }
    }

    /// Convert to the FFI-safe representation used across the plugin ABI.
    pub fn to_raw(self) -> RawSampleFormat {
        RawSampleFormat {
            rate: self.rate,
            channels: self.channels,
            bits: self.bits,
            signed: self.signed,
            big_endian: self.big_endian,
        }
    }

    /// Convert from the FFI-safe representation.
    pub fn from_raw(raw: RawSampleFormat) -> Self {
        SampleFormat {
            rate: raw.rate,
            channels: raw.channels,
            bits: raw.bits,
            signed: raw.signed,
            big_endian: raw.big_endian,
        }
    }
}

/// Up to 32 channel position slots. Decoders may omit the map entirely
/// (`ChannelMap::default()`); sinks then assume WAVEEX default ordering
/// for the channel count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    positions: Vec<ChannelPosition>,
}

impl ChannelMap {
    /// Build a channel map from an explicit position list.
    pub fn new(positions: Vec<ChannelPosition>) -> Self {
        Self { positions }
    }

    /// The positions, in channel order.
    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }

    /// A map is valid when it has no duplicate non-mono entries and no
    /// `Invalid` slot before the end of the declared channels.
    pub fn is_valid(&self) -> bool {
        if self.positions.len() > CHANNELS_MAX {
            return false;
        }
        let mut seen = Vec::with_capacity(self.positions.len());
        for p in &self.positions {
            if matches!(p, ChannelPosition::Invalid) {
                return false;
            }
            if seen.contains(p) {
                return false;
            }
            seen.push(*p);
        }
        true
    }
}

/// Mirrors `playcore_plugin_api::CHANNELS_MAX`.
pub const CHANNELS_MAX: usize = playcore_plugin_api::CHANNELS_MAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_sizes() {
        let sf = SampleFormat::CD_STEREO;
        assert_eq!(sf.sample_size(), 2);
        assert_eq!(sf.frame_size(), 4);
        assert_eq!(sf.second_size(), 176_400);
    }

    #[test]
    fn equality_requires_all_fields() {
        let a = SampleFormat::CD_STEREO;
        let mut b = a;
        b.channels = 1;
        assert_ne!(a, b);
    }

    #[test]
    fn narrowing_rule() {
        let wide = SampleFormat { rate: 48_000, channels: 2, bits: 8, signed: false, big_endian: false };
        let narrow = wide.narrowed();
        assert_eq!(narrow.bits, 16);
        assert!(narrow.signed);
        assert!(!narrow.big_endian);
        assert_eq!(narrow.rate, 48_000);
        assert_eq!(narrow.channels, 2);

        let surround = SampleFormat { rate: 48_000, channels: 6, bits: 24, signed: true, big_endian: false };
        assert_eq!(surround.narrowed(), surround);
    }

    #[test]
    fn invalid_formats_rejected() {
        let bad = SampleFormat { rate: 44_100, channels: 0, bits: 16, signed: true, big_endian: false };
        assert!(!bad.is_valid());
        let bad_bits = SampleFormat { rate: 44_100, channels: 2, bits: 12, signed: true, big_endian: false };
        assert!(!bad_bits.is_valid());
    }

    #[test]
    fn channel_map_rejects_duplicates_and_invalid() {
        let dup = ChannelMap::new(vec![ChannelPosition::FrontLeft, ChannelPosition::FrontLeft]);
        assert!(!dup.is_valid());
        let invalid = ChannelMap::new(vec![ChannelPosition::FrontLeft, ChannelPosition::Invalid]);
        assert!(!invalid.is_valid());
        let ok = ChannelMap::new(vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight]);
        assert!(ok.is_valid());
    }
}
