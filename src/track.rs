// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Track metadata handle and keyval comment helpers (component K).
//!
//! Ground truth: cmus's `track_info.h`/`comment.h`. `struct track_info` is a
//! manually ref-counted `{filename, duration, comments}`; `Arc` gives the
//! same sharing semantics for free, so `TrackInfo` is just a cheaply
//! cloneable handle around an immutable inner value.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::decoder::DecoderRegistry;
use crate::error::EngineError;

struct Inner {
    location: String,
    duration: Option<f64>,
    comments: Vec<(String, String)>,
}

/// Ref-counted, immutable track metadata. The player holds one ref for the
/// currently loaded track; the outer shell may hold any number of others
/// (e.g. for a playlist) without the engine needing to know about them.
#[derive(Clone)]
pub struct TrackInfo(Arc<Inner>);

impl TrackInfo {
    /// Build a handle directly from known metadata, bypassing `probe`. Used
    /// by the outer shell when it already has comments cached (e.g. from a
    /// playlist database) and doesn't want to re-open the file.
    pub fn new(location: impl Into<String>, duration: Option<f64>, comments: Vec<(String, String)>) -> Self {
        Self(Arc::new(Inner {
            location: location.into(),
            duration,
            comments,
        }))
    }

    /// File path or URL this track was opened from.
    pub fn location(&self) -> &str {
        &self.0.location
    }

    /// Duration in seconds, if known (remote streams typically don't have one).
    pub fn duration(&self) -> Option<f64> {
        self.0.duration
    }

    /// All comments, in decoder-reported order.
    pub fn comments(&self) -> &[(String, String)] {
        &self.0.comments
    }

    /// Case-insensitive keyval lookup (ground: `comments_get_val`).
    pub fn comment(&self, key: &str) -> Option<&str> {
        comments_get_val(&self.0.comments, key)
    }
}

/// Case-insensitive keyval lookup, first match wins.
pub fn comments_get_val<'a>(comments: &'a [(String, String)], key: &str) -> Option<&'a str> {
    comments
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Parse a comment value as an integer, cmus-style: leading digits (with an
/// optional sign) are taken, trailing garbage (e.g. `"5/12"` track-of-total
/// notation) is ignored.
pub fn comments_get_int(comments: &[(String, String)], key: &str) -> Option<i64> {
    let raw = comments_get_val(comments, key)?;
    let trimmed = raw.trim();
    let end = trimmed
        .char_indices()
        .skip(if trimmed.starts_with(['-', '+']) { 1 } else { 0 })
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

/// Open `path` through the decoder registry purely for its metadata,
/// without entering the playback pipeline, then close it immediately.
/// Ground: `player_get_fileinfo`, which opens an `ip` instance, reads
/// `ip_duration`/`ip_read_comments`, then deletes the instance.
pub fn probe(
    registry: &DecoderRegistry,
    path: &Path,
) -> Result<(Option<f64>, Vec<(String, String)>), EngineError> {
    let location = path_to_location(path);
    let mut decoder = registry.open(&location)?;
    let duration = decoder.duration();
    let comments = decoder.read_comments().unwrap_or_default();
    decoder.close();
    Ok((duration, comments))
}

fn path_to_location(path: &Path) -> String {
    let p: PathBuf = path.to_path_buf();
    p.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_lookup_is_case_insensitive() {
        let comments = vec![("REPLAYGAIN_TRACK_GAIN".to_string(), "-3.2 dB".to_string())];
        assert_eq!(
            comments_get_val(&comments, "replaygain_track_gain"),
            Some("-3.2 dB")
        );
    }

    #[test]
    fn int_parsing_stops_at_non_digit() {
        let comments = vec![("tracknumber".to_string(), "5/12".to_string())];
        assert_eq!(comments_get_int(&comments, "tracknumber"), Some(5));
        let negative = vec![("disc".to_string(), "-1".to_string())];
        assert_eq!(comments_get_int(&negative, "disc"), Some(-1));
    }

    #[test]
    fn missing_key_is_none() {
        let comments = vec![("title".to_string(), "x".to_string())];
        assert_eq!(comments_get_val(&comments, "artist"), None);
        assert_eq!(comments_get_int(&comments, "artist"), None);
    }

    #[test]
    fn track_info_is_cheaply_cloneable_and_shares_data() {
        let ti = TrackInfo::new("song.flac", Some(180.0), vec![("title".into(), "x".into())]);
        let ti2 = ti.clone();
        assert_eq!(ti2.location(), "song.flac");
        assert_eq!(ti2.duration(), Some(180.0));
        assert_eq!(ti2.comment("title"), Some("x"));
    }
}
