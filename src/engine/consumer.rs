// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The consumer worker thread: drains the ring buffer into the sink.
//!
//! Ground truth: `player.c`'s `consumer_loop` and `__consumer_handle_eof`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::state::{ConsumerStatus, ProducerStatus};
use super::{ConsumerState, PlayerStatus, Shared};

/// Runs until `shared.consumer_running` is cleared, then stops whatever is
/// playing and returns.
pub(super) fn run(shared: Arc<Shared>) {
    // Far enough in the past that the very first wake always polls the mixer.
    let mut last_mixer_check = Instant::now()
        .checked_sub(super::MIXER_POLL_INTERVAL)
        .unwrap_or_else(Instant::now);

    loop {
        let sleep_ms;
        {
            let mut c = shared.consumer.lock();

            if !shared.consumer_running.load(Ordering::Acquire) {
                super::consumer_stop(&mut c);
                return;
            }

            if matches!(c.status, ConsumerStatus::Paused | ConsumerStatus::Stopped) {
                mixer_check(&shared, &mut c, &mut last_mixer_check);
                sleep_ms = super::IDLE_SLEEP_MS;
            } else {
                match c.sink.as_mut().map(|s| s.buffer_space()) {
                    Some(Ok(space)) => {
                        sleep_ms = drain(&shared, &mut c, space, &mut last_mixer_check);
                    }
                    _ => {
                        super::publish_position(&shared, &c);
                        sleep_ms = super::IDLE_SLEEP_MS;
                    }
                }
            }
        }
        std::thread::sleep(Duration::from_millis(sleep_ms));
    }
}

/// Writes as much buffered audio as `space` allows, one sink write at a
/// time, returning how long the caller should sleep before its next wake.
/// Ground: `consumer_loop`'s inner `while (1)`.
fn drain(shared: &Arc<Shared>, c: &mut ConsumerState, mut space: i32, last_mixer_check: &mut Instant) -> u64 {
    loop {
        if space < super::LOW_SPACE_BYTES {
            super::publish_position(shared, c);
            mixer_check(shared, c, last_mixer_check);
            return super::LOW_SPACE_SLEEP_MS;
        }

        let ring = shared.ring.lock().clone();
        let mut size = ring.read_len();
        if size == 0 {
            let mut p = shared.producer.lock();
            if p.status != ProducerStatus::Playing {
                return super::IDLE_SLEEP_MS;
            }
            size = ring.read_len();
            if size == 0 {
                if p.eof {
                    drop(p);
                    handle_eof(shared, c);
                    return super::IDLE_SLEEP_MS;
                }
                drop(p);
                super::publish_position(shared, c);
                return super::UNDERRUN_SLEEP_MS;
            }
        }

        size = size.min(space as usize);
        let mut buf = vec![0u8; size];
        ring.peek_read(&mut buf);
        let sf = shared.buffer_sf.lock().unwrap_or(crate::format::SampleFormat::CD_STEREO);
        shared.scaler.lock().scale(sf, &mut buf, c.pos);

        let Some(sink) = c.sink.as_mut() else {
            return super::IDLE_SLEEP_MS;
        };
        match sink.write(&buf) {
            Ok(written) if written > 0 => {
                ring.consume(written);
                c.pos += written as u64;
                space -= written as i32;
            }
            Ok(_) => return super::LOW_SPACE_SLEEP_MS,
            Err(_) => {
                if let Some(sink) = c.sink.as_mut() {
                    let _ = sink.close();
                }
                c.sink = None;
                c.status = ConsumerStatus::Stopped;
                let mut p = shared.producer.lock();
                super::consumer_play(shared, &mut p, c);
                return super::IDLE_SLEEP_MS;
            }
        }
    }
}

/// Handle end-of-stream: remote streams can't be resumed, so they stop with
/// an error; local files either advance to `get_next`'s track (if playback
/// is set to continue) or stop in place. Ground: `__consumer_handle_eof`.
fn handle_eof(shared: &Arc<Shared>, c: &mut ConsumerState) {
    let mut p = shared.producer.lock();

    let is_remote = p.decoder.as_ref().is_some_and(crate::decoder::Decoder::is_remote);
    if is_remote {
        super::producer_stop(shared, &mut p, c);
        super::consumer_drain_and_stop(c);
        super::publish_error(shared, PlayerStatus::from(c.status), "lost connection".to_string());
        return;
    }

    let next = {
        let mut get_next = shared.get_next.lock();
        get_next.as_mut().and_then(|f| f())
    };

    let Some(ti) = next else {
        super::producer_unload(shared, &mut p, c);
        super::consumer_drain_and_stop(c);
        super::file_changed(shared, None);
        super::publish_status(shared, c, &p);
        return;
    };

    super::producer_unload(shared, &mut p, c);
    p.ti = Some(ti.clone());
    p.status = ProducerStatus::Stopped;

    if shared.cont.load(Ordering::Acquire) {
        super::producer_play(shared, &mut p, c);
        if p.status == ProducerStatus::Unloaded {
            super::consumer_stop(c);
            super::file_changed(shared, None);
        } else {
            super::file_changed(shared, Some(ti));
            let sf = p.decoder.as_ref().expect("just opened").format();
            if super::change_sf(shared, &mut p, c, sf, false).is_ok() {
                super::prebuffer(shared, &mut p);
            }
        }
    } else {
        super::consumer_drain_and_stop(c);
        super::file_changed(shared, Some(ti));
    }
    super::publish_status(shared, c, &p);
}

fn mixer_check(shared: &Arc<Shared>, c: &mut ConsumerState, last: &mut Instant) {
    if last.elapsed() < super::MIXER_POLL_INTERVAL {
        return;
    }
    *last = Instant::now();
    if let Some(mixer) = c.mixer.as_mut() {
        if let Ok((l, r)) = mixer.get_volume() {
            shared.info.lock().set_volume(l, r);
        }
    }
}
