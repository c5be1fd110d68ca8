// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error taxonomy and message formatting for the player engine.
//!
//! Plugin-local errors (`DecoderError`/`SinkError` from
//! `playcore-plugin-api`) are narrow and carry no context about what the
//! engine was doing when they happened. `EngineError` wraps one of those
//! with an operation description (`"opening file `foo.flac'"`, `"reading
//! file `foo.flac'"`, `"opening audio device"`) the way the reference
//! implementation's `player_ip_error`/`player_op_error` build a message from
//! `ip_get_error_msg`/`op_get_error_msg` plus a `vsnprintf`'d context string.

use playcore_plugin_api::{DecoderError, SinkError};
use thiserror::Error;

/// Top-level error surfaced to the outer shell via `PlayerInfo::error_msg`.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// A decoder plugin failed while doing `context`.
    #[error("{context}: {source}")]
    Decoder {
        /// What the engine was doing (`"opening file `x'"`, ...).
        context: String,
        /// The underlying decoder error.
        source: DecoderError,
    },
    /// A sink or mixer plugin failed while doing `context`.
    #[error("{context}: {source}")]
    Sink {
        /// What the engine was doing.
        context: String,
        /// The underlying sink error.
        source: SinkError,
    },
    /// No decoder plugin claims this file.
    #[error("no plugin recognizes `{0}'")]
    NoPlugin(String),
    /// No sink plugin is available (none registered, or all failed `init`).
    #[error("no usable output plugin")]
    NoSink,
    /// The outer shell's `get_next` callback isn't set.
    #[error("player not initialized")]
    NotInitialized,
    /// A remote stream's connection was lost mid-stream.
    #[error("lost connection")]
    LostConnection,
}

impl std::fmt::Display for DecoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderError::Errno { code, context } => {
                write!(f, "{context}: {}", errno_message(*code))
            }
            DecoderError::FileFormat(msg) => write!(f, "file format error: {msg}"),
            DecoderError::UnsupportedFileType(msg) => write!(f, "unsupported file type: {msg}"),
            DecoderError::FunctionNotSupported => write!(f, "function not supported"),
            DecoderError::InvalidUri(uri) => write!(f, "invalid uri: {uri}"),
            DecoderError::NoDisc => write!(f, "no disc"),
            DecoderError::WrongDisc => write!(f, "wrong disc"),
            DecoderError::HttpResponse(msg) => write!(f, "http response error: {msg}"),
            DecoderError::HttpStatus(code) => write!(f, "http status {code}"),
            DecoderError::HttpRedirectLimit => write!(f, "too many http redirects"),
            DecoderError::NotOption(name) => write!(f, "no such option: {name}"),
            DecoderError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Errno { code, context } => write!(f, "{context}: {}", errno_message(*code)),
            SinkError::SampleFormat => write!(f, "sample format not supported"),
            SinkError::NoPlugin => write!(f, "no such plugin"),
            SinkError::NotInitialized => write!(f, "plugin not initialized"),
            SinkError::NotOpen => write!(f, "device not open"),
            SinkError::NotSupported => write!(f, "not supported"),
            SinkError::NotOption(name) => write!(f, "no such option: {name}"),
            SinkError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

fn errno_message(code: i32) -> String {
    std::io::Error::from_raw_os_error(code).to_string()
}

/// Wrap a decoder error with an operation description, logging it first
/// (mirrors `player_ip_error`'s log-then-publish order in the reference).
pub(crate) fn decoder_ctx(context: impl Into<String>, source: DecoderError) -> EngineError {
    let context = context.into();
    tracing::error!(%context, error = %source, "decoder error");
    EngineError::Decoder { context, source }
}

pub(crate) fn sink_ctx(context: impl Into<String>, source: SinkError) -> EngineError {
    let context = context.into();
    tracing::error!(%context, error = %source, "sink error");
    EngineError::Sink { context, source }
}
