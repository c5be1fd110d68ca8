// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The player state machine: producer/consumer status, command handling,
//! and the two worker threads (components F, G, H).
//!
//! Ground truth: `player.c` in full. The original keeps three free-standing
//! global locks (`producer_mutex`, `consumer_mutex`, plus `player_info`'s
//! own) taken in the fixed order `consumer -> producer` via its
//! `player_lock()`/`player_unlock()` macros; `Shared` reproduces that same
//! lock set and ordering so the deadlock-freedom argument carries over
//! unchanged.

mod consumer;
mod producer;
mod state;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::decoder::{Decoder, DecoderRegistry, ReadOutcome};
use crate::error::EngineError;
use crate::format::SampleFormat;
use crate::ringbuf::RingBuffer;
use crate::scaler::{ReplayGainMode, Scaler};
use crate::sink::{Mixer, Sink, SinkRegistry};
use crate::track::{self, TrackInfo};

pub use state::{PlayerInfo, PlayerStatus};
use state::{ConsumerStatus, ProducerStatus};

/// Idle poll interval for both worker threads when nothing needs doing.
const IDLE_SLEEP_MS: u64 = 50;
/// Sleep interval once the sink's free space drops below `LOW_SPACE_BYTES`.
const LOW_SPACE_SLEEP_MS: u64 = 25;
/// Sleep interval after a possible underrun (empty buffer, producer not EOF).
const UNDERRUN_SLEEP_MS: u64 = 10;
/// Below this many free bytes the consumer backs off rather than writing
/// a sliver (ground: `consumer_loop`'s `/* 25 ms is 4410 B */` comment).
const LOW_SPACE_BYTES: i32 = 4096;
/// Minimum wall-clock gap between mixer volume polls (ground: `mixer_check`).
const MIXER_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Seek request shape, mirroring `player_seek(double offset, int relative)`.
#[derive(Debug, Clone, Copy)]
pub enum SeekTarget {
    /// Seconds relative to the current position.
    Relative(f64),
    /// Absolute seconds from the start of the stream.
    Absolute(f64),
}

struct ProducerState {
    status: ProducerStatus,
    decoder: Option<Decoder>,
    /// The "currently set" track, remembered across Stopped so `play()`
    /// can reopen it. `None` only when `status == Unloaded`.
    ti: Option<TrackInfo>,
    /// Set once the decoder has reported end of stream; cleared on a new
    /// `set_file`/`play_file`/successful seek. Stands in for the original's
    /// `ip_eof(ip)` query, which this ABI has no equivalent method for.
    eof: bool,
}

impl Default for ProducerState {
    fn default() -> Self {
        Self {
            status: ProducerStatus::Unloaded,
            decoder: None,
            ti: None,
            eof: false,
        }
    }
}

struct ConsumerState {
    status: ConsumerStatus,
    sink: Option<Sink>,
    mixer: Option<Mixer>,
    /// Bytes of (narrowed) PCM written to the sink since the last reset —
    /// the original's `consumer_pos`.
    pos: u64,
}

impl Default for ConsumerState {
    fn default() -> Self {
        Self {
            status: ConsumerStatus::Stopped,
            sink: None,
            mixer: None,
            pos: 0,
        }
    }
}

type GetNext = Box<dyn FnMut() -> Option<TrackInfo> + Send>;

struct Shared {
    decoders: Mutex<DecoderRegistry>,
    sinks: Mutex<SinkRegistry>,
    ring: Mutex<Arc<RingBuffer>>,
    producer: Mutex<ProducerState>,
    consumer: Mutex<ConsumerState>,
    info: Mutex<PlayerInfo>,
    scaler: Mutex<Scaler>,
    buffer_sf: Mutex<Option<SampleFormat>>,
    op_name: Mutex<Option<String>>,
    get_next: Mutex<Option<GetNext>>,
    /// Auto-advance to the next track at EOF (the original's `player_cont`).
    cont: AtomicBool,
    producer_running: AtomicBool,
    consumer_running: AtomicBool,
}

/// The audio engine: owns the decoder/sink registries, the ring buffer, and
/// the producer/consumer worker threads. Cheap to clone (an `Arc` handle);
/// every public method locks only what it needs and releases before
/// returning, so commands never block on the worker threads for longer
/// than one chunk's worth of I/O.
#[derive(Clone)]
pub struct PlayerEngine {
    shared: Arc<Shared>,
    handles: Arc<Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>>,
}

impl PlayerEngine {
    /// Build an engine with the built-in decoder/sink plugins registered
    /// and `config`'s initial ring buffer size and ReplayGain settings. The
    /// worker threads are not started yet; call `start`.
    pub fn new(config: EngineConfig) -> Self {
        let mut scaler = Scaler::new();
        scaler.set_rg_mode(config.rg_mode);
        scaler.set_rg_preamp(config.rg_preamp_db);
        scaler.set_rg_limit(config.rg_limit);

        let shared = Arc::new(Shared {
            decoders: Mutex::new(DecoderRegistry::with_builtins()),
            sinks: Mutex::new(SinkRegistry::with_builtins()),
            ring: Mutex::new(Arc::new(RingBuffer::new(config.buffer_chunks.clamp(3, 30)))),
            producer: Mutex::new(ProducerState::default()),
            consumer: Mutex::new(ConsumerState::default()),
            info: Mutex::new(PlayerInfo::default()),
            scaler: Mutex::new(scaler),
            buffer_sf: Mutex::new(None),
            op_name: Mutex::new(config.sink_name),
            get_next: Mutex::new(None),
            cont: AtomicBool::new(config.continue_playback),
            producer_running: AtomicBool::new(true),
            consumer_running: AtomicBool::new(true),
        });

        Self {
            shared,
            handles: Arc::new(Mutex::new(None)),
        }
    }

    /// Register an additional decoder plugin (built-in or loaded via
    /// `plugins::loader`).
    pub fn register_decoder(
        &self,
        descriptor: playcore_plugin_api::DecoderDescriptor,
        create: playcore_plugin_api::DecoderFactoryFn,
    ) {
        self.shared.decoders.lock().register(descriptor, create);
    }

    /// Register an additional sink (and optional mixer) plugin.
    pub fn register_sink(
        &self,
        descriptor: playcore_plugin_api::SinkDescriptor,
        create_sink: playcore_plugin_api::SinkFactoryFn,
        create_mixer: Option<playcore_plugin_api::MixerFactoryFn>,
    ) {
        self.shared.sinks.lock().register(descriptor, create_sink, create_mixer);
    }

    /// Set the callback the producer thread calls to ask the outer shell
    /// (playlist, queue, ...) what to play next. Mirrors `player_init`'s
    /// `player_callbacks::get_next`.
    pub fn set_get_next(&self, f: impl FnMut() -> Option<TrackInfo> + Send + 'static) {
        *self.shared.get_next.lock() = Some(Box::new(f));
    }

    /// Spawn the producer and consumer worker threads. Mirrors `player_init`.
    pub fn start(&self) {
        let p_shared = self.shared.clone();
        let c_shared = self.shared.clone();
        let producer_handle = std::thread::spawn(move || producer::run(p_shared));
        let consumer_handle = std::thread::spawn(move || consumer::run(c_shared));
        *self.handles.lock() = Some((producer_handle, consumer_handle));
        let c = self.shared.consumer.lock();
        let p = self.shared.producer.lock();
        publish_status(&self.shared, &c, &p);
    }

    /// Signal both worker threads to drain and exit, then join them.
    /// Mirrors `player_exit`.
    pub fn shutdown(&self) {
        self.shared.producer_running.store(false, Ordering::Release);
        self.shared.consumer_running.store(false, Ordering::Release);
        if let Some((p, c)) = self.handles.lock().take() {
            let _ = c.join();
            let _ = p.join();
        }
    }

    /// Start (or restart from position 0, or resume) playback.
    pub fn play(&self) {
        let shared = &self.shared;
        let mut c = shared.consumer.lock();
        let mut p = shared.producer.lock();

        if p.status == ProducerStatus::Playing && p.decoder.as_ref().is_some_and(Decoder::is_remote) {
            return; // seeking a live stream isn't allowed
        }
        let needs_prebuffer = c.status == ConsumerStatus::Stopped;
        producer_play(shared, &mut p, &mut c);
        if p.status == ProducerStatus::Playing {
            consumer_play(shared, &mut p, &mut c);
            if c.status != ConsumerStatus::Playing {
                producer_stop(shared, &mut p, &mut c);
            }
        } else {
            consumer_stop(&mut c);
        }
        publish_status(shared, &c, &p);
        if c.status == ConsumerStatus::Playing && needs_prebuffer {
            prebuffer(shared, &mut p);
        }
    }

    /// Toggle pause, or start playback paused if nothing was playing.
    pub fn pause(&self) {
        let shared = &self.shared;
        let mut c = shared.consumer.lock();
        let mut p = shared.producer.lock();

        if c.status == ConsumerStatus::Stopped {
            producer_play(shared, &mut p, &mut c);
            if p.status == ProducerStatus::Playing {
                consumer_play(shared, &mut p, &mut c);
                if c.status != ConsumerStatus::Playing {
                    producer_stop(shared, &mut p, &mut c);
                }
            }
            publish_status(shared, &c, &p);
            if c.status == ConsumerStatus::Playing {
                prebuffer(shared, &mut p);
            }
            return;
        }

        if p.decoder.as_ref().is_some_and(Decoder::is_remote) {
            return; // pausing a live stream isn't allowed
        }
        producer_pause(&mut p);
        consumer_pause(shared, &mut p, &mut c);
        publish_status(shared, &c, &p);
    }

    /// Stop playback and close the sink, leaving the current file loaded.
    pub fn stop(&self) {
        let shared = &self.shared;
        let mut c = shared.consumer.lock();
        let mut p = shared.producer.lock();
        consumer_stop(&mut c);
        producer_stop(shared, &mut p, &mut c);
        publish_status(shared, &c, &p);
    }

    /// Load `ti` without starting playback, carrying over whatever was
    /// already playing if something was.
    pub fn set_file(&self, ti: TrackInfo) {
        let shared = &self.shared;
        let mut c = shared.consumer.lock();
        let mut p = shared.producer.lock();

        producer_set_file(shared, &mut p, &mut c, ti);
        if p.status != ProducerStatus::Unloaded && matches!(c.status, ConsumerStatus::Playing | ConsumerStatus::Paused) {
            producer_play(shared, &mut p, &mut c);
            if p.status != ProducerStatus::Unloaded {
                let sf = p.decoder.as_ref().unwrap().format();
                let _ = change_sf(shared, &mut p, &mut c, sf, true);
            }
        }
        if p.status == ProducerStatus::Unloaded {
            consumer_stop(&mut c);
        }
        publish_status(shared, &c, &p);
        if p.status == ProducerStatus::Playing {
            prebuffer(shared, &mut p);
        }
    }

    /// Load `ti` and start playing it immediately, in one atomic command.
    pub fn play_file(&self, ti: TrackInfo) {
        let shared = &self.shared;
        let mut c = shared.consumer.lock();
        let mut p = shared.producer.lock();

        producer_set_file(shared, &mut p, &mut c, ti);
        if p.status != ProducerStatus::Unloaded {
            producer_play(shared, &mut p, &mut c);
        }
        if p.status != ProducerStatus::Unloaded {
            if c.status == ConsumerStatus::Stopped {
                consumer_play(shared, &mut p, &mut c);
                if c.status == ConsumerStatus::Stopped {
                    producer_stop(shared, &mut p, &mut c);
                }
            } else {
                let sf = p.decoder.as_ref().unwrap().format();
                let _ = change_sf(shared, &mut p, &mut c, sf, true);
            }
        }
        if p.status == ProducerStatus::Unloaded {
            consumer_stop(&mut c);
        }
        publish_status(shared, &c, &p);
        if p.status == ProducerStatus::Playing {
            prebuffer(shared, &mut p);
        }
    }

    /// Seek within the current track. A no-op (not an error) whenever the
    /// original would silently refuse: nothing playing, unknown duration,
    /// a too-small forward nudge, or an out-of-range absolute target.
    pub fn seek(&self, target: SeekTarget) -> Result<(), EngineError> {
        let shared = &self.shared;
        let mut c = shared.consumer.lock();
        let mut p = shared.producer.lock();

        if !matches!(c.status, ConsumerStatus::Playing | ConsumerStatus::Paused) {
            return Ok(());
        }
        let sz = second_size(shared) as f64;
        let pos = c.pos as f64 / sz;
        let Some(decoder) = p.decoder.as_mut() else {
            return Ok(());
        };
        let Some(duration) = decoder.duration() else {
            return Ok(()); // unknown duration: can't seek
        };

        let new_pos = match target {
            SeekTarget::Relative(offset) => {
                let mut new_pos = (pos + offset).max(0.0);
                if offset > 0.0 {
                    new_pos = new_pos.min(duration - 5.0).max(0.0);
                    if new_pos < pos - 0.5 {
                        return Ok(()); // must seek at least 0.5s
                    }
                }
                new_pos
            }
            SeekTarget::Absolute(offset) => {
                if offset < 0.0 || offset > duration {
                    return Ok(());
                }
                offset
            }
        };

        decoder.seek(new_pos)?;
        if let Some(sink) = c.sink.as_mut() {
            let _ = sink.drop_buffered();
        }
        shared.ring.lock().clone().reset();
        c.pos = (new_pos * sz) as u64;
        shared.scaler.lock().reset_position(c.pos);
        p.eof = false;
        publish_position(shared, &c);
        Ok(())
    }

    /// Switch the active sink by name (or `None` for the highest-priority
    /// one) without stopping playback. Mirrors `player_set_op`.
    pub fn set_op(&self, name: Option<String>) -> Result<(), EngineError> {
        let shared = &self.shared;
        let mut c = shared.consumer.lock();
        let mut p = shared.producer.lock();

        if c.status == ConsumerStatus::Paused {
            if let Some(sink) = c.sink.as_mut() {
                let _ = sink.drop_buffered();
            }
        }
        if matches!(c.status, ConsumerStatus::Playing | ConsumerStatus::Paused) {
            if let Some(sink) = c.sink.as_mut() {
                let _ = sink.close();
            }
            c.sink = None;
        }
        *shared.op_name.lock() = name.clone();

        let was_paused = c.status == ConsumerStatus::Paused;
        if matches!(c.status, ConsumerStatus::Playing | ConsumerStatus::Paused) {
            let sf = p
                .decoder
                .as_ref()
                .map(|d| d.format().narrowed())
                .unwrap_or_else(|| shared.buffer_sf.lock().unwrap_or(SampleFormat::CD_STEREO));
            *shared.buffer_sf.lock() = Some(sf);
            match shared.sinks.lock().open(name.as_deref(), sf, &[]) {
                Ok(sink) => {
                    c.sink = Some(sink);
                    if was_paused {
                        if let Some(sink) = c.sink.as_mut() {
                            let _ = sink.pause();
                        }
                    }
                }
                Err(e) => {
                    c.status = ConsumerStatus::Stopped;
                    producer_stop(shared, &mut p, &mut c);
                    publish_error(shared, PlayerStatus::from(c.status), e.to_string());
                    return Err(e);
                }
            }
        }

        if let Some(mixer) = c.mixer.as_mut() {
            let _ = mixer.close();
        }
        c.mixer = None;
        if let Ok(mut mixer) = shared.sinks.lock().open_mixer(name.as_deref()) {
            if let Ok((l, r)) = mixer.get_volume() {
                shared.info.lock().set_volume(l, r);
            }
            c.mixer = Some(mixer);
        }
        Ok(())
    }

    /// Name of the currently selected sink plugin, if any.
    pub fn get_op(&self) -> Option<String> {
        self.shared.op_name.lock().clone()
    }

    /// Resize the ring buffer, clamped to `[3, 30]` chunks. Both worker
    /// threads are stopped hard for the reallocation, then resumed to
    /// whatever they were doing before (ground: spec's redesigned
    /// `set_buffer_chunks`, which resumes prior state rather than the
    /// original's leave-everything-stopped behavior).
    pub fn set_buffer_chunks(&self, n: usize) {
        let n = n.clamp(3, 30);
        let shared = &self.shared;
        let mut c = shared.consumer.lock();
        let mut p = shared.producer.lock();

        let prev_producer = p.status;
        let prev_consumer = c.status;

        producer_stop(shared, &mut p, &mut c);
        consumer_stop(&mut c);
        *shared.ring.lock() = Arc::new(RingBuffer::new(n));

        if matches!(prev_producer, ProducerStatus::Playing | ProducerStatus::Paused) {
            producer_play(shared, &mut p, &mut c);
            if prev_producer == ProducerStatus::Paused {
                producer_pause(&mut p);
            }
        }
        if p.status != ProducerStatus::Unloaded && matches!(prev_consumer, ConsumerStatus::Playing | ConsumerStatus::Paused) {
            consumer_play(shared, &mut p, &mut c);
            if prev_consumer == ConsumerStatus::Paused {
                consumer_pause(shared, &mut p, &mut c);
            }
        }

        publish_status(shared, &c, &p);
        if p.status == ProducerStatus::Playing {
            prebuffer(shared, &mut p);
        }
    }

    /// Current ring buffer size, in chunks.
    pub fn get_buffer_chunks(&self) -> usize {
        self.shared.ring.lock().capacity_chunks()
    }

    /// Read back the active sink's hardware volume.
    pub fn get_volume(&self) -> Result<(i32, i32), EngineError> {
        let mut c = self.shared.consumer.lock();
        let Some(mixer) = c.mixer.as_mut() else {
            return Err(EngineError::NoSink);
        };
        mixer.get_volume()
    }

    /// Set the active sink's hardware volume.
    pub fn set_volume(&self, left: i32, right: i32) -> Result<(), EngineError> {
        let mut c = self.shared.consumer.lock();
        let Some(mixer) = c.mixer.as_mut() else {
            return Err(EngineError::NoSink);
        };
        mixer.set_volume(left, right)?;
        self.shared.info.lock().set_volume(left, right);
        Ok(())
    }

    /// Set software (scaler-applied) volume, 0..=100 per channel.
    pub fn set_soft_vol(&self, left: u8, right: u8) {
        let c = self.shared.consumer.lock();
        let mut scaler = self.shared.scaler.lock();
        scaler.set_soft_volume(left, right);
        scaler.reset_position(c.pos);
        drop(scaler);
        self.shared.info.lock().set_volume(left as i32, right as i32);
    }

    /// Change which ReplayGain tag pair (if any) the scaler applies.
    pub fn set_rg(&self, mode: ReplayGainMode) {
        let c = self.shared.consumer.lock();
        let p = self.shared.producer.lock();
        let mut scaler = self.shared.scaler.lock();
        scaler.reset_position(c.pos);
        scaler.set_rg_mode(mode);
        if let Some(ti) = p.ti.as_ref() {
            scaler.update_rg_scale(ti.comments());
        }
    }

    /// Toggle whether ReplayGain scale is clamped to `1/peak`.
    pub fn set_rg_limit(&self, limit: bool) {
        let p = self.shared.producer.lock();
        let mut scaler = self.shared.scaler.lock();
        scaler.set_rg_limit(limit);
        if let Some(ti) = p.ti.as_ref() {
            scaler.update_rg_scale(ti.comments());
        }
    }

    /// Set the ReplayGain preamp, in dB.
    pub fn set_rg_preamp(&self, db: f64) {
        let p = self.shared.producer.lock();
        let mut scaler = self.shared.scaler.lock();
        scaler.set_rg_preamp(db);
        if let Some(ti) = p.ti.as_ref() {
            scaler.update_rg_scale(ti.comments());
        }
    }

    /// Snapshot the publicly visible state. The outer shell should call
    /// the `take_*_changed` methods on the result to drain whichever
    /// change flags it acted on.
    pub fn player_info(&self) -> PlayerInfo {
        self.shared.info.lock().clone()
    }

    /// Run `f` with exclusive access to the live `PlayerInfo`, e.g. to call
    /// its `take_*_changed` methods without losing concurrent updates
    /// between a separate snapshot and a separate clear.
    pub fn with_info<R>(&self, f: impl FnOnce(&mut PlayerInfo) -> R) -> R {
        f(&mut self.shared.info.lock())
    }

    /// Probe `path` for duration and comments without affecting playback.
    /// Mirrors `player_get_fileinfo`.
    pub fn get_fileinfo(&self, path: &Path) -> Result<(Option<f64>, Vec<(String, String)>), EngineError> {
        track::probe(&self.shared.decoders.lock(), path)
    }
}

fn second_size(shared: &Shared) -> u32 {
    shared.buffer_sf.lock().unwrap_or(SampleFormat::CD_STEREO).second_size().max(1)
}

fn position_seconds(shared: &Shared, c: &ConsumerState) -> u64 {
    if matches!(c.status, ConsumerStatus::Playing | ConsumerStatus::Paused) {
        c.pos / second_size(shared) as u64
    } else {
        0
    }
}

fn publish_position(shared: &Shared, c: &ConsumerState) {
    let secs = position_seconds(shared, c);
    shared.info.lock().set_position(secs);
}

fn publish_status(shared: &Shared, c: &ConsumerState, p: &ProducerState) {
    let _ = p;
    let ring = shared.ring.lock().clone();
    let secs = position_seconds(shared, c);
    shared
        .info
        .lock()
        .set_status(PlayerStatus::from(c.status), secs, ring.filled_chunks(), ring.capacity_chunks());
}

fn publish_error(shared: &Shared, status: PlayerStatus, msg: String) {
    tracing::error!(%msg, "player error");
    let ring = shared.ring.lock().clone();
    let mut info = shared.info.lock();
    info.set_status(status, 0, ring.filled_chunks(), ring.capacity_chunks());
    info.set_error(msg);
}

fn update_buffer_fill(shared: &Shared, ring: &RingBuffer) {
    shared.info.lock().set_buffer_fill(ring.filled_chunks());
}

fn file_changed(shared: &Shared, ti: Option<TrackInfo>) {
    match &ti {
        Some(t) => tracing::debug!(location = t.location(), "file changed"),
        None => tracing::debug!("unloaded"),
    }
    shared.scaler.lock().update_rg_scale(ti.as_ref().map(TrackInfo::comments).unwrap_or(&[]));
    shared.info.lock().set_file(ti);
}

fn reset_buffer(shared: &Shared, c: &mut ConsumerState) {
    shared.ring.lock().clone().reset();
    c.pos = 0;
    shared.scaler.lock().reset_position(0);
}

/// Caller must hold both the consumer and producer locks.
fn producer_play(shared: &Shared, p: &mut ProducerState, c: &mut ConsumerState) {
    match p.status {
        ProducerStatus::Unloaded => {
            let ti = shared.get_next.lock().as_mut().and_then(|f| f());
            let Some(ti) = ti else { return };
            match shared.decoders.lock().open(ti.location()) {
                Ok(decoder) => {
                    p.decoder = Some(decoder);
                    p.status = ProducerStatus::Playing;
                    p.eof = false;
                    p.ti = Some(ti.clone());
                    file_changed(shared, Some(ti));
                }
                Err(e) => {
                    publish_error(shared, PlayerStatus::from(c.status), e.to_string());
                    file_changed(shared, None);
                }
            }
        }
        ProducerStatus::Playing => {
            if let Some(decoder) = p.decoder.as_mut() {
                if decoder.seek(0.0).is_ok() {
                    reset_buffer(shared, c);
                    p.eof = false;
                }
            }
        }
        ProducerStatus::Stopped => {
            let Some(ti) = p.ti.clone() else { return };
            match shared.decoders.lock().open(ti.location()) {
                Ok(decoder) => {
                    p.decoder = Some(decoder);
                    p.status = ProducerStatus::Playing;
                    p.eof = false;
                }
                Err(e) => {
                    publish_error(shared, PlayerStatus::from(c.status), e.to_string());
                    p.status = ProducerStatus::Unloaded;
                    p.ti = None;
                }
            }
        }
        ProducerStatus::Paused => p.status = ProducerStatus::Playing,
    }
}

fn producer_stop(shared: &Shared, p: &mut ProducerState, c: &mut ConsumerState) {
    if matches!(p.status, ProducerStatus::Playing | ProducerStatus::Paused) {
        p.decoder = None;
        p.status = ProducerStatus::Stopped;
        reset_buffer(shared, c);
    }
}

fn producer_unload(shared: &Shared, p: &mut ProducerState, c: &mut ConsumerState) {
    producer_stop(shared, p, c);
    if p.status == ProducerStatus::Stopped {
        p.status = ProducerStatus::Unloaded;
        p.ti = None;
    }
}

fn producer_pause(p: &mut ProducerState) {
    p.status = match p.status {
        ProducerStatus::Playing => ProducerStatus::Paused,
        ProducerStatus::Paused => ProducerStatus::Playing,
        other => other,
    };
}

fn producer_set_file(shared: &Shared, p: &mut ProducerState, c: &mut ConsumerState, ti: TrackInfo) {
    producer_unload(shared, p, c);
    p.status = ProducerStatus::Stopped;
    p.ti = Some(ti.clone());
    file_changed(shared, Some(ti));
}

fn consumer_play(shared: &Shared, p: &mut ProducerState, c: &mut ConsumerState) {
    match c.status {
        ConsumerStatus::Playing => {
            if let Some(sink) = c.sink.as_mut() {
                let _ = sink.drop_buffered();
            }
        }
        ConsumerStatus::Stopped => {
            let Some(decoder) = p.decoder.as_ref() else { return };
            let sf = decoder.format().narrowed();
            *shared.buffer_sf.lock() = Some(sf);
            let named = shared.op_name.lock().clone();
            match shared.sinks.lock().open(named.as_deref(), sf, &[]) {
                Ok(sink) => {
                    c.sink = Some(sink);
                    c.status = ConsumerStatus::Playing;
                    if let Ok(mut mixer) = shared.sinks.lock().open_mixer(named.as_deref()) {
                        if let Ok((l, r)) = mixer.get_volume() {
                            shared.info.lock().set_volume(l, r);
                        }
                        c.mixer = Some(mixer);
                    }
                }
                Err(e) => {
                    publish_error(shared, PlayerStatus::from(c.status), e.to_string());
                }
            }
        }
        ConsumerStatus::Paused => consumer_resume(shared, p, c),
    }
}

fn consumer_drain_and_stop(c: &mut ConsumerState) {
    if matches!(c.status, ConsumerStatus::Playing | ConsumerStatus::Paused) {
        if let Some(sink) = c.sink.as_mut() {
            let _ = sink.close();
        }
        c.sink = None;
        c.status = ConsumerStatus::Stopped;
    }
}

fn consumer_stop(c: &mut ConsumerState) {
    if matches!(c.status, ConsumerStatus::Playing | ConsumerStatus::Paused) {
        if let Some(sink) = c.sink.as_mut() {
            let _ = sink.drop_buffered();
            let _ = sink.close();
        }
        c.sink = None;
        c.status = ConsumerStatus::Stopped;
    }
}

/// Toggle Playing <-> Paused. A sink that reports `supports_native_pause()`
/// is paused/unpaused in place; otherwise the engine emulates pause per
/// spec: drop the buffered audio and close the sink, then on resume reopen
/// it and reseek the decoder to where playback left off (ground: the
/// original's `op_pause` falling back to `op_drop` + `op_close`, reopened
/// via `op_open` on the next write).
fn consumer_pause(shared: &Shared, p: &mut ProducerState, c: &mut ConsumerState) {
    match c.status {
        ConsumerStatus::Playing => {
            let native = c.sink.as_ref().is_some_and(Sink::supports_native_pause);
            if native {
                if let Some(sink) = c.sink.as_mut() {
                    let _ = sink.pause();
                }
            } else {
                if let Some(sink) = c.sink.as_mut() {
                    let _ = sink.drop_buffered();
                    let _ = sink.close();
                }
                c.sink = None;
            }
            c.status = ConsumerStatus::Paused;
        }
        ConsumerStatus::Paused => consumer_resume(shared, p, c),
        ConsumerStatus::Stopped => {}
    }
}

/// Resume from `Paused`: unpause in place if the sink is still open,
/// otherwise reopen it (the emulated-pause fallback above closed it) and
/// reseek the decoder to the position playback was at when it paused.
fn consumer_resume(shared: &Shared, p: &mut ProducerState, c: &mut ConsumerState) {
    if let Some(sink) = c.sink.as_mut() {
        let _ = sink.unpause();
        c.status = ConsumerStatus::Playing;
        return;
    }

    let Some(decoder) = p.decoder.as_mut() else {
        c.status = ConsumerStatus::Stopped;
        return;
    };
    let sf = shared.buffer_sf.lock().unwrap_or(SampleFormat::CD_STEREO);
    let named = shared.op_name.lock().clone();
    match shared.sinks.lock().open(named.as_deref(), sf, &[]) {
        Ok(sink) => {
            c.sink = Some(sink);
            let seconds = c.pos as f64 / second_size(shared) as f64;
            let _ = decoder.seek(seconds);
            c.status = ConsumerStatus::Playing;
        }
        Err(e) => {
            c.status = ConsumerStatus::Stopped;
            producer_stop(shared, p, c);
            publish_error(shared, PlayerStatus::from(c.status), e.to_string());
        }
    }
}

/// Reopen the sink (and, if paused, re-pause it) when the format in the
/// buffer changes. Returns `Err` if reopening fails, having already
/// stopped both threads and published the error — mirrors `change_sf`.
fn change_sf(shared: &Shared, p: &mut ProducerState, c: &mut ConsumerState, sf: SampleFormat, drop_first: bool) -> Result<(), EngineError> {
    let narrowed = sf.narrowed();
    let old = *shared.buffer_sf.lock();
    *shared.buffer_sf.lock() = Some(narrowed);

    if old != Some(narrowed) {
        if drop_first {
            if let Some(sink) = c.sink.as_mut() {
                let _ = sink.drop_buffered();
            }
        }
        if let Some(sink) = c.sink.as_mut() {
            let _ = sink.close();
        }
        let named = shared.op_name.lock().clone();
        match shared.sinks.lock().open(named.as_deref(), narrowed, &[]) {
            Ok(sink) => c.sink = Some(sink),
            Err(e) => {
                c.status = ConsumerStatus::Stopped;
                producer_stop(shared, p, c);
                publish_error(shared, PlayerStatus::from(c.status), e.to_string());
                return Err(e);
            }
        }
    } else if c.status == ConsumerStatus::Paused {
        if let Some(sink) = c.sink.as_mut() {
            let _ = sink.drop_buffered();
            let _ = sink.unpause();
        } else {
            // Emulated pause had closed the sink; same format, so just reopen.
            let named = shared.op_name.lock().clone();
            match shared.sinks.lock().open(named.as_deref(), narrowed, &[]) {
                Ok(sink) => c.sink = Some(sink),
                Err(e) => {
                    c.status = ConsumerStatus::Stopped;
                    producer_stop(shared, p, c);
                    publish_error(shared, PlayerStatus::from(c.status), e.to_string());
                    return Err(e);
                }
            }
        }
    }
    c.status = ConsumerStatus::Playing;
    Ok(())
}

/// Read ahead until the buffer holds a start-up cushion (250 ms locally,
/// the whole buffer for a remote stream, since stalling to refill a live
/// connection isn't recoverable the way re-reading a local file is).
/// Ground: `__prebuffer`. Caller must hold the producer lock; `p.status`
/// must be `Playing`.
fn prebuffer(shared: &Shared, p: &mut ProducerState) {
    debug_assert_eq!(p.status, ProducerStatus::Playing);
    let Some(decoder) = p.decoder.as_mut() else { return };
    let ring = shared.ring.lock().clone();
    let limit_chunks = if decoder.is_remote() {
        ring.capacity_chunks()
    } else {
        let bytes = 250 * second_size(shared) as usize / 1000;
        (bytes / crate::ringbuf::CHUNK_SIZE).max(1)
    };

    loop {
        if ring.filled_chunks() >= limit_chunks {
            break;
        }
        let want = ring.write_len();
        if want == 0 {
            break;
        }
        let mut buf = vec![0u8; want];
        match decoder.read(&mut buf) {
            Ok(ReadOutcome::Data(n)) => {
                if let Some(meta) = decoder.take_metadata_changed() {
                    shared.info.lock().set_metadata(meta);
                }
                ring.fill(&buf[..n]);
                update_buffer_fill(shared, &ring);
                if n == 0 {
                    p.eof = true;
                    break;
                }
            }
            Ok(ReadOutcome::Retry) => {
                std::thread::sleep(Duration::from_millis(IDLE_SLEEP_MS));
            }
            Err(e) => {
                publish_error(shared, PlayerStatus::Playing, e.to_string());
                ring.fill(&[]);
                update_buffer_fill(shared, &ring);
                p.eof = true;
                break;
            }
        }
    }
}
