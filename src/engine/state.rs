// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Player state machine types (component H).
//!
//! Ground truth: `player.c`'s `enum producer_status`/`enum consumer_status`
//! and `struct player_info`.

use crate::track::TrackInfo;

/// Maximum bytes of ICY/stream metadata retained in `PlayerInfo::metadata`.
pub const MAX_METADATA_LEN: usize = 4096;

/// Internal status of the producer (decoder-owning) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStatus {
    /// No decoder loaded.
    Unloaded,
    /// Decoder loaded, closed (not reading).
    Stopped,
    /// Decoder open, producer thread actively filling the ring buffer.
    Playing,
    /// Decoder open, producer thread idle.
    Paused,
}

/// Internal status of the consumer (sink-owning) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStatus {
    /// Sink closed.
    Stopped,
    /// Sink open, consumer thread actively writing.
    Playing,
    /// Sink open, consumer thread idle (device paused or emulated).
    Paused,
}

/// Publicly visible status, a projection of `ConsumerStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Nothing playing.
    Stopped,
    /// Actively producing sound.
    Playing,
    /// Paused.
    Paused,
}

impl From<ConsumerStatus> for PlayerStatus {
    fn from(cs: ConsumerStatus) -> Self {
        match cs {
            ConsumerStatus::Stopped => PlayerStatus::Stopped,
            ConsumerStatus::Paused => PlayerStatus::Paused,
            ConsumerStatus::Playing => PlayerStatus::Playing,
        }
    }
}

/// Publicly visible snapshot of the engine's state, with one "changed"
/// flag per field group. The outer shell is expected to poll this and
/// clear flags it has acted on via the `take_*` methods.
#[derive(Debug, Clone, Default)]
pub struct PlayerInfo {
    status: Option<PlayerStatus>,
    ti: Option<TrackInfo>,
    position: u64,
    buffer_fill: usize,
    buffer_size: usize,
    vol_left: i32,
    vol_right: i32,
    metadata: String,
    error_msg: Option<String>,

    file_changed: bool,
    metadata_changed: bool,
    status_changed: bool,
    position_changed: bool,
    buffer_fill_changed: bool,
    vol_changed: bool,
}

impl PlayerInfo {
    /// Current externally visible status.
    pub fn status(&self) -> PlayerStatus {
        self.status.unwrap_or(PlayerStatus::Stopped)
    }

    /// Currently loaded track, if any.
    pub fn track(&self) -> Option<&TrackInfo> {
        self.ti.as_ref()
    }

    /// Whole seconds into the current track.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Filled ring-buffer chunks.
    pub fn buffer_fill(&self) -> usize {
        self.buffer_fill
    }

    /// Total ring-buffer chunks.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Current left/right volume.
    pub fn volume(&self) -> (i32, i32) {
        (self.vol_left, self.vol_right)
    }

    /// Last in-band metadata string, if any.
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Last surfaced error message, if any.
    pub fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }

    /// Read then clear the file-changed flag.
    pub fn take_file_changed(&mut self) -> bool {
        std::mem::take(&mut self.file_changed)
    }

    /// Read then clear the metadata-changed flag.
    pub fn take_metadata_changed(&mut self) -> bool {
        std::mem::take(&mut self.metadata_changed)
    }

    /// Read then clear the status-changed flag.
    pub fn take_status_changed(&mut self) -> bool {
        std::mem::take(&mut self.status_changed)
    }

    /// Read then clear the position-changed flag.
    pub fn take_position_changed(&mut self) -> bool {
        std::mem::take(&mut self.position_changed)
    }

    /// Read then clear the buffer-fill-changed flag.
    pub fn take_buffer_fill_changed(&mut self) -> bool {
        std::mem::take(&mut self.buffer_fill_changed)
    }

    /// Read then clear the volume-changed flag.
    pub fn take_vol_changed(&mut self) -> bool {
        std::mem::take(&mut self.vol_changed)
    }

    pub(crate) fn set_file(&mut self, ti: Option<TrackInfo>) {
        self.ti = ti;
        self.metadata.clear();
        self.file_changed = true;
    }

    pub(crate) fn set_metadata(&mut self, metadata: String) {
        let mut metadata = metadata;
        metadata.truncate(MAX_METADATA_LEN);
        self.metadata = metadata;
        self.metadata_changed = true;
    }

    pub(crate) fn set_status(&mut self, status: PlayerStatus, position: u64, buffer_fill: usize, buffer_size: usize) {
        self.status = Some(status);
        self.position = position;
        self.buffer_fill = buffer_fill;
        self.buffer_size = buffer_size;
        self.status_changed = true;
    }

    pub(crate) fn set_position(&mut self, position: u64) {
        if self.position != position {
            self.position = position;
            self.position_changed = true;
        }
    }

    pub(crate) fn set_buffer_fill(&mut self, buffer_fill: usize) {
        if self.buffer_fill != buffer_fill {
            self.buffer_fill = buffer_fill;
            self.buffer_fill_changed = true;
        }
    }

    pub(crate) fn set_volume(&mut self, left: i32, right: i32) {
        if self.vol_left != left || self.vol_right != right {
            self.vol_left = left;
            self.vol_right = right;
            self.vol_changed = true;
        }
    }

    pub(crate) fn set_error(&mut self, msg: String) {
        self.error_msg = Some(msg);
    }
}
