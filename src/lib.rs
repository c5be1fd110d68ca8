// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Core audio engine for a terminal music player.
//!
//! `playcore` owns everything between "a file or URL" and "bytes written
//! to an audio device": decoder and sink plugin ABIs (dynamically loaded
//! via [`plugins`] or linked in statically), a lock-free-by-convention
//! ring buffer shared between a producer and a consumer thread, the
//! player state machine that drives both, and the software
//! volume/ReplayGain scaler applied in between. It has no playlist, no
//! UI, and no command protocol of its own — see `demos/playcore-cli` for
//! a minimal embedding.
//!
//! ```no_run
//! use playcore::config::EngineConfig;
//! use playcore::engine::PlayerEngine;
//! use playcore::track::TrackInfo;
//!
//! let engine = PlayerEngine::new(EngineConfig::default());
//! engine.start();
//! engine.play_file(TrackInfo::new("song.wav", None, vec![]));
//! # engine.shutdown();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod format;
pub mod plugins;
pub mod ringbuf;
pub mod scaler;
pub mod sink;
pub mod track;

pub use config::EngineConfig;
pub use engine::{PlayerEngine, PlayerInfo, PlayerStatus, SeekTarget};
pub use error::EngineError;
pub use format::SampleFormat;
pub use track::TrackInfo;
