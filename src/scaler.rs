// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Software volume + ReplayGain PCM scaler (component E).
//!
//! Ground truth: `player.c`'s `scale_sample`/`scale_samples`,
//! `update_rg_scale`, and the `soft_vol_db` table (itself copied there
//! from alsa-lib's `pcm_softvol.c`). Only applies to 16-bit stereo PCM,
//! same restriction as the original (`ch != 2 || bits != 16` bails out).

use serde::{Deserialize, Serialize};

use crate::format::SampleFormat;
use crate::track::comments_get_val;

const SOFT_VOL_SCALE: i64 = 65536;

/// Coefficients for volumes 0..99; 100 uses `SOFT_VOL_SCALE` directly.
/// Copied verbatim from `player.c`'s `soft_vol_db`.
const SOFT_VOL_DB: [u16; 100] = [
    0x0000, 0x0110, 0x011c, 0x012f, 0x013d, 0x0152, 0x0161, 0x0179, 0x018a, 0x01a5, 0x01c1, 0x01d5,
    0x01f5, 0x020b, 0x022e, 0x0247, 0x026e, 0x028a, 0x02b6, 0x02d5, 0x0306, 0x033a, 0x035f, 0x0399,
    0x03c2, 0x0403, 0x0431, 0x0479, 0x04ac, 0x04fd, 0x0553, 0x058f, 0x05ef, 0x0633, 0x069e, 0x06ea,
    0x0761, 0x07b5, 0x083a, 0x0898, 0x092c, 0x09cb, 0x0a3a, 0x0aeb, 0x0b67, 0x0c2c, 0x0cb6, 0x0d92,
    0x0e2d, 0x0f21, 0x1027, 0x10de, 0x1202, 0x12cf, 0x1414, 0x14f8, 0x1662, 0x1761, 0x18f5, 0x1a11,
    0x1bd3, 0x1db4, 0x1f06, 0x211d, 0x2297, 0x24ec, 0x2690, 0x292a, 0x2aff, 0x2de5, 0x30fe, 0x332b,
    0x369f, 0x390d, 0x3ce6, 0x3f9b, 0x43e6, 0x46eb, 0x4bb3, 0x4f11, 0x5466, 0x5a18, 0x5e19, 0x6472,
    0x68ea, 0x6ffd, 0x74f8, 0x7cdc, 0x826a, 0x8b35, 0x9499, 0x9b35, 0xa5ad, 0xad0b, 0xb8b7, 0xc0ee,
    0xcdf1, 0xd71a, 0xe59c, 0xefd3,
];

/// Which ReplayGain tag pair to apply, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplayGainMode {
    /// No ReplayGain scaling.
    #[default]
    Off,
    /// Use `replaygain_track_{gain,peak}`.
    Track,
    /// Use `replaygain_album_{gain,peak}`.
    Album,
}

fn soft_vol_coefficient(vol: u8) -> i64 {
    if vol >= 100 {
        SOFT_VOL_SCALE
    } else {
        SOFT_VOL_DB[vol as usize] as i64
    }
}

/// Applies software volume and ReplayGain scaling to 16-bit stereo PCM
/// chunks. Tracks, via `scale_pos`, how many bytes of the stream have
/// already been scaled, so a chunk handed in more than once (or in
/// overlapping pieces) is only scaled once — mirrors the original's
/// `scale_pos`/`consumer_pos` bookkeeping.
pub struct Scaler {
    soft_vol_left: u8,
    soft_vol_right: u8,
    rg_mode: ReplayGainMode,
    rg_preamp_db: f64,
    rg_limit: bool,
    rg_scale: f64,
    scale_pos: u64,
}

impl Default for Scaler {
    fn default() -> Self {
        Self {
            soft_vol_left: 100,
            soft_vol_right: 100,
            rg_mode: ReplayGainMode::Off,
            rg_preamp_db: 6.0,
            rg_limit: true,
            rg_scale: 1.0,
            scale_pos: 0,
        }
    }
}

impl Scaler {
    /// A scaler at full volume, no ReplayGain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set software volume, 0..=100 per channel.
    pub fn set_soft_volume(&mut self, left: u8, right: u8) {
        self.soft_vol_left = left.min(100);
        self.soft_vol_right = right.min(100);
    }

    /// Current software volume.
    pub fn soft_volume(&self) -> (u8, u8) {
        (self.soft_vol_left, self.soft_vol_right)
    }

    /// Preamp applied on top of the tag's gain, in dB.
    pub fn set_rg_preamp(&mut self, db: f64) {
        self.rg_preamp_db = db;
    }

    /// Whether to clamp the computed scale to `1/peak`.
    pub fn set_rg_limit(&mut self, limit: bool) {
        self.rg_limit = limit;
    }

    /// Which tag pair to read.
    pub fn set_rg_mode(&mut self, mode: ReplayGainMode) {
        self.rg_mode = mode;
    }

    /// Reseed the bookkeeping position to `pos`; call whenever the stream
    /// position jumps (seek, new track, buffer reset) so the next `scale`
    /// treats everything from `pos` on as unscaled. Ground: `reset_buffer`
    /// zeroing `scale_pos` alongside `consumer_pos`, and `player_seek`
    /// reseeding both to the post-seek byte offset rather than to zero.
    pub fn reset_position(&mut self, pos: u64) {
        self.scale_pos = pos;
    }

    /// Recompute `rg_scale` from `comments` for the configured mode.
    /// Ground: `update_rg_scale`'s early-outs — missing/unparsable tags or
    /// a peak below 0.05 leave the scale at `1.0`.
    pub fn update_rg_scale(&mut self, comments: &[(String, String)]) {
        self.rg_scale = 1.0;
        if self.rg_mode == ReplayGainMode::Off {
            return;
        }
        let (gain_key, peak_key) = match self.rg_mode {
            ReplayGainMode::Track => ("replaygain_track_gain", "replaygain_track_peak"),
            ReplayGainMode::Album => ("replaygain_album_gain", "replaygain_album_peak"),
            ReplayGainMode::Off => unreachable!(),
        };
        let Some(gain_str) = comments_get_val(comments, gain_key) else {
            return;
        };
        let Some(peak_str) = comments_get_val(comments, peak_key) else {
            return;
        };
        let gain_str = gain_str.trim().trim_end_matches("dB").trim_end_matches("DB").trim();
        let (Ok(gain), Ok(peak)) = (gain_str.parse::<f64>(), peak_str.trim().parse::<f64>()) else {
            return;
        };
        if peak < 0.05 {
            return;
        }
        let db = self.rg_preamp_db + gain;
        let scale = 10f64.powf(db / 20.0);
        self.rg_scale = scale;
        let limit = 1.0 / peak;
        if self.rg_limit && self.rg_scale > limit {
            self.rg_scale = limit;
        }
    }

    /// Scale `buffer` (interleaved 16-bit stereo PCM) in place, starting at
    /// stream byte offset `consumer_pos`. A no-op when the format isn't
    /// scalable (ground: `ch != 2 || bits != 16` bailing out in the
    /// original) or when both volume and ReplayGain are neutral.
    pub fn scale(&mut self, format: SampleFormat, buffer: &mut [u8], consumer_pos: u64) {
        debug_assert!(self.scale_pos >= consumer_pos);

        let count = buffer.len() as u64;
        let (offset, count) = if consumer_pos != self.scale_pos {
            let offs = self.scale_pos - consumer_pos;
            if offs >= count {
                return;
            }
            (offs as usize, count - offs)
        } else {
            (0, count)
        };
        self.scale_pos += count;

        if self.rg_scale == 1.0 && self.soft_vol_left == 100 && self.soft_vol_right == 100 {
            return;
        }
        if !format.is_scalable() || format.channels != 2 {
            return;
        }

        let l = if self.soft_vol_left != 100 {
            soft_vol_coefficient(self.soft_vol_left)
        } else {
            SOFT_VOL_SCALE
        };
        let r = if self.soft_vol_right != 100 {
            soft_vol_coefficient(self.soft_vol_right)
        } else {
            SOFT_VOL_SCALE
        };
        let l = (l as f64 * self.rg_scale) as i64;
        let r = (r as f64 * self.rg_scale) as i64;

        let region = &mut buffer[offset..offset + count as usize];
        for frame in region.chunks_exact_mut(4) {
            let left = i16::from_le_bytes([frame[0], frame[1]]);
            let right = i16::from_le_bytes([frame[2], frame[3]]);
            let scaled_left = scale_sample(left, l);
            let scaled_right = scale_sample(right, r);
            frame[0..2].copy_from_slice(&scaled_left.to_le_bytes());
            frame[2..4].copy_from_slice(&scaled_right.to_le_bytes());
        }
    }
}

/// Scale one 16-bit sample by `vol` (in `SOFT_VOL_SCALE` units), rounding
/// toward zero with a half-scale bias, clamped to `i16`'s range. Ground:
/// `scale_sample`.
fn scale_sample(sample: i16, vol: i64) -> i16 {
    let sample = sample as i64;
    let scaled = if sample < 0 {
        (sample * vol - SOFT_VOL_SCALE / 2) / SOFT_VOL_SCALE
    } else {
        (sample * vol + SOFT_VOL_SCALE / 2) / SOFT_VOL_SCALE
    };
    scaled.clamp(-32768, 32767) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_volume_no_rg_is_identity() {
        let mut scaler = Scaler::new();
        let mut buf = [0x00, 0x10, 0x00, 0xf0]; // left=0x1000, right as i16 negative
        let original = buf;
        scaler.scale(SampleFormat::CD_STEREO, &mut buf, 0);
        assert_eq!(buf, original);
    }

    #[test]
    fn halved_volume_roughly_halves_amplitude() {
        let mut scaler = Scaler::new();
        scaler.set_soft_volume(50, 50);
        let mut buf = (10_000i16).to_le_bytes().to_vec();
        buf.extend((10_000i16).to_le_bytes());
        scaler.scale(SampleFormat::CD_STEREO, &mut buf, 0);
        let left = i16::from_le_bytes([buf[0], buf[1]]);
        assert!((4000..6000).contains(&left), "left = {left}");
    }

    #[test]
    fn replaygain_scale_ignored_below_peak_threshold() {
        let mut scaler = Scaler::new();
        scaler.set_rg_mode(ReplayGainMode::Track);
        let comments = vec![
            ("replaygain_track_gain".to_string(), "-6.0 dB".to_string()),
            ("replaygain_track_peak".to_string(), "0.01".to_string()),
        ];
        scaler.update_rg_scale(&comments);
        assert_eq!(scaler.rg_scale, 1.0);
    }

    #[test]
    fn replaygain_scale_computed_and_limited() {
        let mut scaler = Scaler::new();
        scaler.set_rg_mode(ReplayGainMode::Track);
        scaler.set_rg_preamp(0.0);
        let comments = vec![
            ("replaygain_track_gain".to_string(), "6.0 dB".to_string()),
            ("replaygain_track_peak".to_string(), "0.9".to_string()),
        ];
        scaler.update_rg_scale(&comments);
        // unclamped scale = 10^(6/20) ~= 1.995, limit = 1/0.9 ~= 1.111
        assert!((scaler.rg_scale - (1.0 / 0.9)).abs() < 1e-6);
    }

    #[test]
    fn missing_tags_leave_scale_neutral() {
        let mut scaler = Scaler::new();
        scaler.set_rg_mode(ReplayGainMode::Album);
        scaler.update_rg_scale(&[]);
        assert_eq!(scaler.rg_scale, 1.0);
    }

    #[test]
    fn scale_sample_clamps_at_extremes() {
        assert_eq!(scale_sample(i16::MAX, SOFT_VOL_SCALE * 2), 32767);
        assert_eq!(scale_sample(i16::MIN, SOFT_VOL_SCALE * 2), -32768);
    }
}
