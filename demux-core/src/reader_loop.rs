// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! §4.F ReaderLoop: the single background thread that dispatches producer calls, seeks, and
//! track switches, and decides when enough has been buffered.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::engine::{warn_overflow_once, EngineShared};
use crate::producer::{Producer, ProducerApi};
use crate::seek::SeekFlags;
use crate::source::{CancelToken, Source};
use crate::stream::StreamKind;
use crate::units::Timestamp;

/// Upper bound on how long the idle wait blocks before re-checking `terminate`. Not part of the
/// design's timing model (§5 has no timers); purely a liveness guard against lost wakeups.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Drives `producer`/`source` until the engine is terminated. Runs entirely on the dedicated
/// reader thread spawned by [`crate::Engine::open`].
pub(crate) fn run<P, S>(shared: Arc<EngineShared>, mut producer: P, mut source: S, cancel: CancelToken)
where
    P: Producer,
    S: Source,
{
    let _ = &mut source; // the producer owns the actual `fill_buffer`/`seek` I/O against `source`.
    let api = ProducerApi::new(shared.clone());

    loop {
        let mut inner = shared.inner.lock().unwrap();

        if inner.terminate {
            drop(inner);
            producer.close(&api);
            return;
        }

        if let Some(pending) = inner.run_fn.take() {
            drop(inner);
            debug!("reader: running injected control call {}", pending.cmd);
            let result = producer.control(&api, &pending.cmd, &pending.arg);
            let _ = pending.respond.send(result);
            shared.wake();
            continue;
        }

        if inner.tracks_switched {
            inner.tracks_switched = false;
            drop(inner);
            debug!("reader: dispatching track switch");
            let _ = producer.control(&api, "SWITCHED_TRACKS", "");
            shared.wake();
            continue;
        }

        if inner.seeking {
            let pts = inner.seek_pts;
            let flags = inner.seek_flags;
            inner.seeking = false;
            inner.initial_state = false;
            drop(inner);
            debug!("reader: dispatching user seek to {pts}");
            producer.seek(&api, pts, flags);
            shared.wake();
            continue;
        }

        if !inner.eof {
            drop(inner);
            if read_packet(&shared, &api, &mut producer, &cancel) {
                continue;
            }

            let mut inner = shared.inner.lock().unwrap();
            if inner.force_cache_update {
                inner.force_cache_update = false;
                inner.refresh_cached_info();
                continue;
            }
            inner.idle = true;
            shared.condvar.notify_all();
            let (_guard, _timeout) = shared.condvar.wait_timeout(inner, IDLE_POLL).unwrap();
            continue;
        }

        if inner.force_cache_update {
            inner.force_cache_update = false;
            inner.refresh_cached_info();
            continue;
        }

        debug!("reader: idle");
        inner.idle = true;
        shared.condvar.notify_all();
        let (_guard, _timeout) = shared.condvar.wait_timeout(inner, IDLE_POLL).unwrap();
    }
}

/// §4.F `read_packet`. Returns `true` if the lock was dropped and producer I/O was attempted
/// (the caller should restart its dispatch loop), `false` if there was nothing to do.
fn read_packet<P: Producer>(
    shared: &Arc<EngineShared>,
    api: &ProducerApi,
    producer: &mut P,
    cancel: &CancelToken,
) -> bool {
    let mut inner = shared.inner.lock().unwrap();

    let readahead_target = inner.options.effective_readahead_secs();
    let mut any_active = false;
    let mut any_needs_more = false;
    let mut fw_bytes_total = 0usize;
    for q in &inner.queues {
        if !q.selected {
            continue;
        }
        any_active |= q.active;
        fw_bytes_total += q.fw_bytes();
        let short_of_readahead = q.forward_is_empty()
            || q.forward_duration_secs().map_or(true, |d| d < readahead_target);
        if (q.active && short_of_readahead) || q.refreshing {
            any_needs_more = true;
        }
    }

    let max_bytes = inner.options.max_bytes;
    if fw_bytes_total >= max_bytes {
        warn_overflow_once(&mut inner);
        for q in &mut inner.queues {
            if q.forward_is_empty() {
                q.eof = true;
            }
        }
        shared.condvar.notify_all();
        return false;
    }

    let refresh_pts = plan_refresh(&mut inner);
    if !(any_needs_more || refresh_pts.is_set()) {
        debug!("reader: nothing to do (any_active={any_active}, fw_bytes={fw_bytes_total})");
        return false;
    }

    drop(inner);

    if let Some(pts) = refresh_pts.get() {
        producer.seek(api, pts, SeekFlags::HR);
    }

    let made_progress = if cancel.is_cancelled() { 0 } else { producer.fill_buffer(api) };
    let eof = made_progress <= 0;

    let mut inner = shared.inner.lock().unwrap();
    if !inner.seeking {
        if eof {
            let was_eof = inner.last_eof;
            for q in &mut inner.queues {
                q.eof = true;
            }
            if !was_eof {
                shared.condvar.notify_all();
            }
        }
        inner.eof = eof;
        inner.last_eof = eof;
    }
    drop(inner);
    shared.wake();
    true
}

/// §4.F `planRefresh` / `get_refresh_seek_pts`. `start_ts` is the minimum `base_ts` across
/// selected video/audio streams only: subtitle and attached-picture streams never anchor a
/// refresh-seek.
fn plan_refresh(inner: &mut crate::engine::Inner) -> Timestamp {
    if !inner.queues.iter().any(|q| q.need_refresh) {
        return Timestamp::UNSET;
    }

    // This crate models the producer as always at-least-partially seekable; a producer that is
    // genuinely unseekable should simply fail `seek()`, which is handled by `ConsumerApi::seek`,
    // not here. `planRefresh` therefore only needs the "no streams need it" early-out above.

    let selected_av: Vec<usize> = inner
        .queues
        .iter()
        .enumerate()
        .filter(|(_, q)| {
            q.selected
                && matches!(q.kind(), StreamKind::Video | StreamKind::Audio)
                && q.base_ts.get().is_some()
        })
        .map(|(i, _)| i)
        .collect();

    let start_ts = selected_av
        .iter()
        .filter_map(|&i| inner.queues[i].base_ts.get())
        .fold(inner.ref_pts, f64::min);

    let all_selected_need_refresh = inner.queues.iter().filter(|q| q.selected).all(|q| q.need_refresh);

    if all_selected_need_refresh {
        for q in &mut inner.queues {
            q.need_refresh = false;
        }
        return Timestamp::new(start_ts);
    }

    let selected = inner.queues.iter().filter(|q| q.selected);
    let all_have_hint = selected.clone().all(|q| q.correct_dts || q.correct_pos);
    if !all_have_hint {
        for q in &mut inner.queues {
            q.need_refresh = false;
        }
        return Timestamp::UNSET;
    }

    for q in &mut inner.queues {
        if q.selected && (q.last_pos() >= 0 || q.last_dts().is_set()) {
            q.refreshing = true;
        }
        q.need_refresh = false;
    }

    Timestamp::new(start_ts - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Inner;
    use crate::EngineOptions;

    fn test_inner() -> crate::engine::Inner {
        Inner::new(EngineOptions::default())
    }

    #[test]
    fn plan_refresh_returns_unset_with_no_pending_streams() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut inner = test_inner();
        assert!(!plan_refresh(&mut inner).is_set());
    }

    #[test]
    fn plan_refresh_full_switch_clears_need_refresh_and_returns_start_ts() {
        let _ = env_logger::builder().is_test(true).try_init();
        use crate::queue::StreamQueue;
        let mut inner = test_inner();
        let mut q = StreamQueue::new(0, StreamKind::Video);
        q.selected = true;
        q.need_refresh = true;
        inner.queues.push(q);

        let pts = plan_refresh(&mut inner);
        assert!(pts.is_set());
        assert!(!inner.queues[0].need_refresh);
    }
}
