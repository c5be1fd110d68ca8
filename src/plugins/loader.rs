// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Low-level `libloading` mechanics: open a `cdylib`, look up its entry
//! point, check its declared ABI version. Ground: `plugins/native.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use playcore_plugin_api::{DecoderPluginEntry, SinkPluginEntry, API_VERSION_MAJOR};
use tracing::debug;

use super::{check_plugin_permissions, PluginLoadError, PluginResult, DECODER_ENTRY_POINT, SINK_ENTRY_POINT};

/// Owns every `Library` handle opened so far, keeping them mapped for the
/// process lifetime — `libloading` unloads a library when its last handle
/// drops, and an unloaded library would dangle the vtables its plugins
/// vended into the decoder/sink registries.
#[derive(Default)]
pub struct NativeLoader {
    libraries: HashMap<PathBuf, Library>,
}

impl NativeLoader {
    /// A loader with nothing loaded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` and call its decoder entry point.
    pub fn load_decoder_entry(&mut self, path: &Path) -> PluginResult<DecoderPluginEntry> {
        let entry: DecoderPluginEntry = unsafe {
            let library = self.library_for(path)?;
            let entry_fn: Symbol<extern "C" fn() -> DecoderPluginEntry> = library
                .get(DECODER_ENTRY_POINT)
                .map_err(|e| PluginLoadError::EntryPointNotFound(e.to_string()))?;
            entry_fn()
        };
        check_abi_version(entry.descriptor.abi_version)?;
        Ok(entry)
    }

    /// Load `path` and call its sink entry point.
    pub fn load_sink_entry(&mut self, path: &Path) -> PluginResult<SinkPluginEntry> {
        let entry: SinkPluginEntry = unsafe {
            let library = self.library_for(path)?;
            let entry_fn: Symbol<extern "C" fn() -> SinkPluginEntry> = library
                .get(SINK_ENTRY_POINT)
                .map_err(|e| PluginLoadError::EntryPointNotFound(e.to_string()))?;
            entry_fn()
        };
        check_abi_version(entry.descriptor.abi_version)?;
        Ok(entry)
    }

    /// Open `path` if not already loaded, returning the cached handle.
    ///
    /// # Safety
    /// Loading a `cdylib` runs its initializers as a side effect of
    /// linking it in. Callers must only point this at plugins from a
    /// trusted plugin directory.
    unsafe fn library_for(&mut self, path: &Path) -> PluginResult<&Library> {
        if !path.exists() {
            return Err(PluginLoadError::NotFound(path.to_path_buf()));
        }
        if !self.libraries.contains_key(path) {
            check_plugin_permissions(path)?;
            debug!(?path, "loading native plugin library");
            let library = Library::new(path).map_err(|e| PluginLoadError::LibraryLoad(e.to_string()))?;
            self.libraries.insert(path.to_path_buf(), library);
        }
        Ok(self.libraries.get(path).expect("just inserted"))
    }

    /// Number of distinct libraries currently loaded.
    pub fn loaded_count(&self) -> usize {
        self.libraries.len()
    }
}

fn check_abi_version(plugin_version: u32) -> PluginResult<()> {
    if plugin_version != API_VERSION_MAJOR {
        return Err(PluginLoadError::VersionMismatch {
            plugin: plugin_version,
            host: API_VERSION_MAJOR,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_nonexistent_path_errors() {
        let mut loader = NativeLoader::new();
        let err = loader.load_decoder_entry(Path::new("/nonexistent/plugin.so")).unwrap_err();
        assert!(matches!(err, PluginLoadError::NotFound(_)));
    }
}
