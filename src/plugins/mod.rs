// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dynamic plugin discovery and registration (component I).
//!
//! Ground truth: `src/plugins/native.rs` + `src/plugins/manager.rs`'s split
//! between the low-level `libloading` mechanics (here: `loader`) and
//! directory scanning/bookkeeping (here). Built-in decoders/sinks go
//! through `DecoderRegistry`/`SinkRegistry` directly and never touch this
//! module; only `cdylib` plugins discovered on disk do.

pub mod loader;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::engine::PlayerEngine;

/// Symbol name a decoder plugin's `cdylib` must export.
pub(crate) const DECODER_ENTRY_POINT: &[u8] = b"playcore_decoder_entry\0";
/// Symbol name a sink plugin's `cdylib` must export.
pub(crate) const SINK_ENTRY_POINT: &[u8] = b"playcore_sink_entry\0";

/// Failure modes for loading a single plugin file.
#[derive(Debug, thiserror::Error)]
pub enum PluginLoadError {
    /// The path doesn't exist.
    #[error("plugin not found: {0}")]
    NotFound(PathBuf),
    /// The file or its parent directory is world-writable.
    #[error("refusing to load plugin with insecure permissions: {0}")]
    InsecurePermissions(PathBuf),
    /// `libloading::Library::new` failed.
    #[error("failed to load library: {0}")]
    LibraryLoad(String),
    /// Neither entry point symbol was found.
    #[error("no playcore entry point found: {0}")]
    EntryPointNotFound(String),
    /// The plugin's declared ABI major version doesn't match the host's.
    #[error("plugin ABI version {plugin} is incompatible with host ABI version {host}")]
    VersionMismatch {
        /// Version the plugin declared.
        plugin: u32,
        /// Version this host was built with.
        host: u32,
    },
}

/// Result alias for plugin loading.
pub type PluginResult<T> = Result<T, PluginLoadError>;

#[cfg(unix)]
fn check_plugin_permissions(path: &Path) -> PluginResult<()> {
    use std::os::unix::fs::MetadataExt;

    let metadata = std::fs::metadata(path).map_err(|_| PluginLoadError::NotFound(path.to_path_buf()))?;
    if metadata.mode() & 0o002 != 0 {
        warn!(?path, mode = format!("{:o}", metadata.mode()), "rejecting world-writable plugin");
        return Err(PluginLoadError::InsecurePermissions(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        if let Ok(dir_meta) = std::fs::metadata(parent) {
            if dir_meta.mode() & 0o002 != 0 {
                warn!(?path, "rejecting plugin in world-writable directory");
                return Err(PluginLoadError::InsecurePermissions(path.to_path_buf()));
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_plugin_permissions(_path: &Path) -> PluginResult<()> {
    Ok(())
}

/// Scans one or more directories for `cdylib` plugins and registers every
/// one that loads successfully into a `PlayerEngine`. Each file is tried
/// as a decoder plugin, then as a sink plugin; a file exporting neither
/// entry point is skipped.
#[derive(Default)]
pub struct PluginDirectory {
    native: loader::NativeLoader,
}

impl PluginDirectory {
    /// An empty scanner with no libraries loaded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` non-recursively for `.so`/`.dylib`/`.dll` files and
    /// register every loadable one with `engine`. Returns the count of
    /// plugins successfully registered; load failures are logged and
    /// skipped rather than aborting the scan.
    pub fn scan_and_register(&mut self, dir: &Path, engine: &PlayerEngine) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(?dir, error = %e, "plugin directory unreadable");
                return 0;
            }
        };

        let mut count = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_library = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("so" | "dylib" | "dll")
            );
            if !is_library {
                continue;
            }
            if self.load_one(&path, engine) {
                count += 1;
            }
        }
        info!(?dir, count, "plugin scan complete");
        count
    }

    fn load_one(&mut self, path: &Path, engine: &PlayerEngine) -> bool {
        match self.native.load_decoder_entry(path) {
            Ok(entry) => {
                info!(name = %entry.descriptor.name, ?path, "registered decoder plugin");
                engine.register_decoder(entry.descriptor, entry.create);
                return true;
            }
            Err(PluginLoadError::EntryPointNotFound(_)) => {}
            Err(e) => {
                warn!(?path, error = %e, "failed to load decoder plugin");
                return false;
            }
        }

        match self.native.load_sink_entry(path) {
            Ok(entry) => {
                info!(name = %entry.descriptor.name, ?path, "registered sink plugin");
                engine.register_sink(entry.descriptor, entry.create_sink, entry.create_mixer);
                true
            }
            Err(PluginLoadError::EntryPointNotFound(_)) => {
                debug!(?path, "file exports neither playcore entry point, skipping");
                false
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to load sink plugin");
                false
            }
        }
    }
}
