// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sink ("output plugin") + mixer host-side wrappers and registry
//! (component D).
//!
//! Ground truth: `op.h`'s `output_plugin_ops` and `mixer.h`'s
//! `mixer_plugin_ops`; `player.c`'s sink selection policy.

pub mod null;

use abi_stable::std_types::RSlice;
use playcore_plugin_api::{
    ChannelPosition, MixerBox, MixerFactoryFn, SinkBox, SinkDescriptor, SinkError, SinkFactoryFn,
};

use crate::error::{sink_ctx, EngineError};
use crate::format::SampleFormat;

/// Host-side handle to an open sink instance.
pub struct Sink {
    inner: SinkBox,
    name: String,
    format: SampleFormat,
    supports_pause: bool,
}

impl Sink {
    /// Name of the plugin backing this sink, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample format negotiated at `open`.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Write up to `buf.len()` bytes. Returns bytes actually accepted.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, EngineError> {
        self.inner
            .write(RSlice::from_slice(buf))
            .into_result()
            .map(|n| n as usize)
            .map_err(|e| sink_ctx(format!("writing to `{}'", self.name), e))
    }

    /// Bytes the next `write` can accept without blocking for long.
    pub fn buffer_space(&mut self) -> Result<i32, EngineError> {
        self.inner
            .buffer_space()
            .into_result()
            .map_err(|e| sink_ctx(format!("polling `{}' buffer space", self.name), e))
    }

    /// Discard buffered-but-unplayed audio.
    pub fn drop_buffered(&mut self) -> Result<(), EngineError> {
        self.inner
            .drop_buffered()
            .into_result()
            .map_err(|e| sink_ctx(format!("dropping `{}' buffer", self.name), e))
    }

    /// Pause in place if the device supports it; otherwise the caller
    /// should fall back to `drop_buffered` + `close` + reopen, mirroring
    /// `op_pause` falling back to `op_drop + op_close + op_open`.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.inner
            .pause()
            .into_result()
            .map_err(|e| sink_ctx(format!("pausing `{}'", self.name), e))
    }

    /// Resume after `pause`.
    pub fn unpause(&mut self) -> Result<(), EngineError> {
        self.inner
            .unpause()
            .into_result()
            .map_err(|e| sink_ctx(format!("unpausing `{}'", self.name), e))
    }

    /// Whether this sink's `pause`/`unpause` are real (device-native)
    /// rather than the default ABI no-ops.
    pub fn supports_native_pause(&self) -> bool {
        self.supports_pause
    }

    /// Close the device.
    pub fn close(&mut self) -> Result<(), EngineError> {
        self.inner
            .close()
            .into_result()
            .map_err(|e| sink_ctx(format!("closing `{}'", self.name), e))
    }
}

/// Host-side handle to an open mixer instance.
pub struct Mixer {
    inner: MixerBox,
    name: String,
    volume_max: i32,
}

impl Mixer {
    /// Maximum representable volume value (the scale `set_volume` operates in).
    pub fn volume_max(&self) -> i32 {
        self.volume_max
    }

    /// Set left/right volume.
    pub fn set_volume(&mut self, left: i32, right: i32) -> Result<(), EngineError> {
        self.inner
            .set_volume(left, right)
            .into_result()
            .map_err(|e| sink_ctx(format!("setting `{}' volume", self.name), e))
    }

    /// Read back left/right volume.
    pub fn get_volume(&mut self) -> Result<(i32, i32), EngineError> {
        self.inner
            .get_volume()
            .into_result()
            .map_err(|e| sink_ctx(format!("reading `{}' volume", self.name), e))
    }

    /// Close the mixer.
    pub fn close(&mut self) -> Result<(), EngineError> {
        self.inner
            .close()
            .into_result()
            .map_err(|e| sink_ctx(format!("closing `{}' mixer", self.name), e))
    }
}

struct Registered {
    descriptor: SinkDescriptor,
    create_sink: SinkFactoryFn,
    create_mixer: Option<MixerFactoryFn>,
    /// Set once a first `open` attempt fails with `NotSupported`; such a
    /// sink is never retried again (ground: `op_load_plugins` dropping
    /// plugins whose `init` fails).
    disabled: bool,
}

/// Selects and opens sink (and optional mixer) plugins by name or
/// descending priority, dropping any plugin that proves unusable.
#[derive(Default)]
pub struct SinkRegistry {
    plugins: Vec<Registered>,
}

impl SinkRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with every built-in sink plugin.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(null::descriptor(), null::create_sink, None);
        reg
    }

    /// Register a plugin's dispatch metadata and instance factories.
    pub fn register(
        &mut self,
        descriptor: SinkDescriptor,
        create_sink: SinkFactoryFn,
        create_mixer: Option<MixerFactoryFn>,
    ) {
        self.plugins.push(Registered {
            descriptor,
            create_sink,
            create_mixer,
            disabled: false,
        });
    }

    fn candidates(&self, named: Option<&str>) -> Vec<usize> {
        if let Some(name) = named {
            return self
                .plugins
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.disabled && p.descriptor.name.as_str() == name)
                .map(|(i, _)| i)
                .collect();
        }
        let mut idxs: Vec<usize> = self
            .plugins
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.disabled)
            .map(|(i, _)| i)
            .collect();
        idxs.sort_by_key(|&i| std::cmp::Reverse(self.plugins[i].descriptor.priority));
        idxs
    }

    /// Try to open a sink: `named` first if given, else every registered
    /// plugin in descending priority order, stopping at the first
    /// successful `open`. A plugin whose `open` fails with
    /// `SinkError::NotSupported` is disabled for the rest of the process.
    pub fn open(
        &mut self,
        named: Option<&str>,
        format: SampleFormat,
        channel_map: &[ChannelPosition],
    ) -> Result<Sink, EngineError> {
        let candidates = self.candidates(named);
        let mut last_err = None;
        for idx in candidates {
            let plugin = &self.plugins[idx];
            let mut inner = (plugin.create_sink)();
            match inner
                .open(format.to_raw(), RSlice::from_slice(channel_map))
                .into_result()
            {
                Ok(()) => {
                    let name = plugin.descriptor.name.to_string();
                    let supports_pause = plugin.descriptor.name.as_str() != "null";
                    return Ok(Sink {
                        inner,
                        name,
                        format,
                        supports_pause,
                    });
                }
                Err(SinkError::NotSupported) => {
                    self.plugins[idx].disabled = true;
                }
                Err(e) => {
                    last_err = Some(sink_ctx(
                        format!("opening `{}'", plugin.descriptor.name),
                        e,
                    ));
                }
            }
        }
        Err(last_err.unwrap_or(EngineError::NoSink))
    }

    /// Open the mixer companion of the named (or default) sink, if it has one.
    pub fn open_mixer(&mut self, named: Option<&str>) -> Result<Mixer, EngineError> {
        let candidates = self.candidates(named);
        for idx in candidates {
            let plugin = &self.plugins[idx];
            let Some(create_mixer) = plugin.create_mixer else {
                continue;
            };
            let mut inner = create_mixer();
            let volume_max = inner
                .open()
                .into_result()
                .map_err(|e| sink_ctx(format!("opening `{}' mixer", plugin.descriptor.name), e))?;
            return Ok(Mixer {
                inner,
                name: plugin.descriptor.name.to_string(),
                volume_max,
            });
        }
        Err(EngineError::NoSink)
    }
}
