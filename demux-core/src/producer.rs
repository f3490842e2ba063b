// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! §4.H ProducerAPI and §6 producer contract. The `Producer` trait is the external, out-of-scope
//! "format driver" interface; [`ProducerApi`] is the thread-private handle (`view_producer`) the
//! engine hands to it for publishing streams, packets, and tags.

use std::sync::Arc;

use log::trace;

use crate::engine::{EngineShared, Events};
use crate::meta::TagMap;
use crate::packet::Packet;
use crate::queue::StreamQueue;
use crate::seek::SeekFlags;
use crate::stream::{StreamHeader, StreamKind};

/// Probing intensity passed to [`Producer::open`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckLevel {
    Force,
    Unsafe,
    Request,
    Normal,
}

/// Outcome of a [`Producer::control`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlResult {
    Ok,
    Unsupported,
    Unknown,
    Error(&'static str),
}

/// The external "format driver" contract (§6). Implementations parse a container format from a
/// [`crate::source::Source`] and publish streams/packets/tags through [`ProducerApi`]. Entirely
/// out of scope for this crate's own invariants; it ships no implementation beyond test fixtures.
pub trait Producer: Send {
    /// Probes/opens the source. `>= 0` is success; the engine is never created on failure.
    fn open(&mut self, api: &ProducerApi, check_level: CheckLevel) -> i32;

    /// Reads and submits as many packets as convenient in one call. `> 0` means progress was
    /// made; `<= 0` means EOF.
    fn fill_buffer(&mut self, api: &ProducerApi) -> i32;

    /// Seeks the underlying source/format to `pts` under `flags`.
    fn seek(&mut self, api: &ProducerApi, pts: f64, flags: SeekFlags);

    /// An opaque, application-defined control call.
    fn control(&mut self, api: &ProducerApi, cmd: &str, arg: &str) -> ControlResult;

    /// Releases resources. Called once, after the reader thread has stopped dispatching.
    fn close(&mut self, api: &ProducerApi);
}

/// The producer's thread-private handle into the engine (`view_producer`). Every method locks
/// the shared mutex for the duration of one mutation and signals the condvar on exit, matching
/// the "producer I/O always runs lock-dropped, bookkeeping calls always lock" model of §5.
#[derive(Clone)]
pub struct ProducerApi {
    shared: Arc<EngineShared>,
}

impl ProducerApi {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        ProducerApi { shared }
    }

    /// Registers a new stream, assigning its dense `index` and synthesizing `demuxer_id` from
    /// that index if the producer did not supply one explicitly.
    pub fn register_stream(&self, mut header: StreamHeader) -> u32 {
        let mut inner = self.shared.inner.lock().unwrap();
        let index = inner.queues.len() as u32;

        header.index = index;
        if !header.has_explicit_demuxer_id() {
            header.demuxer_id = index;
        }

        let mut queue = StreamQueue::new(index, header.kind);
        queue.selected = inner.autoselect;
        if let Some(picture) = header.attached_picture.clone() {
            queue.set_attached_picture(picture);
        }

        inner.queues.push(queue);
        inner.headers.push(header);
        inner.events.insert(Events::STREAMS);
        drop(inner);
        self.shared.wake();
        trace!("registered stream {index}");
        index
    }

    /// Submits a packet for `stream`, routing it through [`StreamQueue::append`].
    pub fn submit_packet(&self, stream: u32, packet: Packet) {
        let mut inner = self.shared.inner.lock().unwrap();
        let seeking = inner.seeking;
        let mut woke = false;
        if let Some(q) = inner.queues.get_mut(stream as usize) {
            let outcome = q.append(packet, seeking);
            if outcome.accepted {
                inner.eof = false;
                inner.last_eof = false;
                woke = outcome.woke_reader;
            }
        }
        drop(inner);
        if woke {
            self.shared.wake();
        }
    }

    /// Submits a closed-caption packet, lazily creating a synthetic subtitle stream linked via
    /// `cc` on first use (§4.H). `ts_offset` is subtracted from the packet's timestamps before
    /// submission, undoing the shift that will be re-applied on dequeue.
    pub fn submit_caption(&self, video_stream: u32, mut packet: Packet) {
        let mut inner = self.shared.inner.lock().unwrap();
        let ts_offset = inner.ts_offset;
        packet.pts = packet.pts.shifted(-ts_offset);
        packet.dts = packet.dts.shifted(-ts_offset);

        let cc_index = match inner.queues.get(video_stream as usize).and_then(|q| q.cc) {
            Some(idx) => idx,
            None => {
                let idx = inner.queues.len() as u32;
                let header = StreamHeader::new(idx, StreamKind::Subtitle, "cc");
                let mut queue = StreamQueue::new(idx, StreamKind::Subtitle);
                queue.ignore_eof = true;
                queue.selected = inner.autoselect;
                inner.queues.push(queue);
                inner.headers.push(header);
                if let Some(q) = inner.queues.get_mut(video_stream as usize) {
                    q.cc = Some(idx);
                }
                inner.events.insert(Events::STREAMS);
                idx
            }
        };

        let seeking = inner.seeking;
        let mut woke = false;
        if let Some(q) = inner.queues.get_mut(cc_index as usize) {
            let outcome = q.append(packet, seeking);
            woke = outcome.woke_reader;
        }
        drop(inner);
        if woke {
            self.shared.wake();
        }
    }

    /// Sets tags for `stream`. Before the first `changed(INIT)` call the tags are written
    /// directly; afterward they are buffered and raise `METADATA`, per §4.H.
    pub fn set_stream_tags(&self, stream: u32, tags: TagMap) {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.initial_state {
            if let Some(h) = inner.headers.get_mut(stream as usize) {
                h.tags = tags;
            }
        }
        else {
            inner.pending_stream_tags.push((stream, tags));
            inner.events.insert(Events::METADATA);
        }
        drop(inner);
        self.shared.wake();
    }

    /// Merges `events` into the shared state. On `INIT`, additionally copies the staged shadow
    /// fields (container tags, duration, seekability, base filename) into the consumer-visible
    /// snapshot — chapter/attachment/cue-sheet sorting is out of scope (§1).
    pub fn changed(&self, events: Events) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.events.insert(events);
        if events.contains(Events::INIT) {
            inner.consumer_info = inner.shadow.clone();
        }
        if events.contains(Events::METADATA) {
            let pending = std::mem::take(&mut inner.pending_stream_tags);
            for (stream, tags) in pending {
                if let Some(h) = inner.headers.get_mut(stream as usize) {
                    h.tags = tags;
                }
            }
        }
        drop(inner);
        self.shared.wake();
    }

    /// Stages container-level metadata to be carried through on the next `changed(INIT)`.
    pub fn set_container_info(&self, info: crate::engine::CachedInfo) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.shadow = info;
    }

    /// Whether the reader should abort the in-progress `fill_buffer`/`seek` call, per the
    /// cooperative cancellation model of §5.
    pub fn cancel_test(&self, cancel: &crate::source::CancelToken) -> bool {
        cancel.is_cancelled()
    }
}
