// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory engine configuration.
//!
//! No config-file format is defined here — reading/writing one is an
//! explicit non-goal. `EngineConfig` is the value an embedding binary
//! (see `demos/playcore-cli`) builds from its own CLI flags or config
//! file and hands to `PlayerEngine::new`, playing the role of the
//! reference's process-wide tunables (`buffer_nr_chunks`, `replaygain`,
//! `replaygain_limit`, `replaygain_preamp`, `player_cont`).

use serde::{Deserialize, Serialize};

use crate::scaler::ReplayGainMode;

/// Tunables `PlayerEngine::new` seeds its initial state from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ring buffer size in chunks, clamped to `[3, 30]` the same way
    /// `set_buffer_chunks` clamps a runtime resize.
    pub buffer_chunks: usize,
    /// Auto-advance to the next track at end of stream (`player_cont`).
    pub continue_playback: bool,
    /// Initial ReplayGain mode.
    pub rg_mode: ReplayGainMode,
    /// Initial ReplayGain preamp, in dB.
    pub rg_preamp_db: f64,
    /// Initial ReplayGain peak-limiting toggle.
    pub rg_limit: bool,
    /// Sink plugin to prefer, or `None` for the highest-priority one.
    pub sink_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_chunks: 28,
            continue_playback: true,
            rg_mode: ReplayGainMode::Off,
            rg_preamp_db: 6.0,
            rg_limit: true,
            sink_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.buffer_chunks, config.buffer_chunks);
        assert_eq!(back.rg_mode, config.rg_mode);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str("{\"buffer_chunks\": 10}").unwrap();
        assert_eq!(config.buffer_chunks, 10);
        assert!(config.continue_playback);
    }
}
