// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The producer worker thread: reads decoded PCM into the ring buffer.
//!
//! Ground truth: `player.c`'s `producer_loop`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::state::ProducerStatus;
use super::Shared;
use crate::decoder::ReadOutcome;

/// Runs until `shared.producer_running` is cleared, then unloads whatever
/// is loaded and returns.
pub(super) fn run(shared: Arc<Shared>) {
    loop {
        let mut p = shared.producer.lock();

        if !shared.producer_running.load(Ordering::Acquire) {
            drop(p);
            let mut c = shared.consumer.lock();
            let mut p = shared.producer.lock();
            super::producer_unload(&shared, &mut p, &mut c);
            return;
        }

        if p.status != ProducerStatus::Playing || p.eof {
            drop(p);
            std::thread::sleep(Duration::from_millis(super::IDLE_SLEEP_MS));
            continue;
        }

        let ring = shared.ring.lock().clone();
        let want = ring.write_len();
        if want == 0 {
            drop(p);
            std::thread::sleep(Duration::from_millis(super::IDLE_SLEEP_MS));
            continue;
        }

        let mut buf = vec![0u8; want];
        let read = {
            let decoder = p.decoder.as_mut().expect("Playing implies a decoder is loaded");
            let result = decoder.read(&mut buf);
            if let Some(meta) = decoder.take_metadata_changed() {
                shared.info.lock().set_metadata(meta);
            }
            result
        };

        match read {
            Ok(ReadOutcome::Data(n)) => {
                ring.fill(&buf[..n]);
                if n == 0 {
                    p.eof = true;
                }
            }
            Ok(ReadOutcome::Retry) => {
                drop(p);
                std::thread::sleep(Duration::from_millis(super::IDLE_SLEEP_MS));
                continue;
            }
            Err(e) => {
                super::publish_error(&shared, super::PlayerStatus::Playing, e.to_string());
                ring.fill(&[]);
                p.eof = true;
            }
        }
        super::update_buffer_fill(&shared, &ring);
    }
}
