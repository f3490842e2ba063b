// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! §4.E Engine: the shared lock, condvar, event flags, and cached stream info that the producer
//! and consumer views are built around.
//!
//! Per the "three-view duality" design note, thread-private mutable state does not live here:
//! the producer's own bookkeeping belongs to [`crate::reader_loop`], the consumer's to
//! [`crate::consumer::ConsumerApi`]. `Inner` holds only what genuinely needs cross-thread
//! visibility under the single lock — queues, pending requests, and the shadow snapshot.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use bitflags::bitflags;
use log::{debug, warn};

use crate::errors::{DemuxError, Result};
use crate::meta::TagMap;
use crate::producer::{CheckLevel, ControlResult, Producer, ProducerApi};
use crate::queue::StreamQueue;
use crate::reader_loop;
use crate::seek::SeekFlags;
use crate::source::{CancelToken, Source};
use crate::stream::StreamHeader;
use crate::ConsumerApi;

bitflags! {
    /// Event flags staged by the producer and drained by the consumer on `pull_updates`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Events: u8 {
        const INIT = 0b001;
        const STREAMS = 0b010;
        const METADATA = 0b100;
        const ALL = Self::INIT.bits() | Self::STREAMS.bits() | Self::METADATA.bits();
    }
}

/// Tuning options, per §6. Constructed with `Default` and struct-update syntax, mirroring
/// `symphonia_core::formats::FormatOptions`.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub readahead_secs: f64,
    pub cache_secs: f64,
    pub max_bytes: usize,
    pub max_bytes_bw: usize,
    pub force_seekable: bool,
    pub seekable_cache: bool,
    pub access_references: bool,
    pub create_ccs: bool,
    /// Whether the byte-stream source is a network/cached source rather than fully local.
    /// Selects `cache_secs` over `readahead_secs` as the effective read-ahead target (§10).
    pub is_cached_source: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            readahead_secs: 1.0,
            cache_secs: 10.0,
            max_bytes: 400 * 1024 * 1024,
            max_bytes_bw: 0,
            force_seekable: false,
            seekable_cache: false,
            access_references: true,
            create_ccs: false,
            is_cached_source: false,
        }
    }
}

impl EngineOptions {
    /// The effective read-ahead target per §10: `cache_secs` for cached/network sources,
    /// `readahead_secs` otherwise.
    pub fn effective_readahead_secs(&self) -> f64 {
        if self.is_cached_source {
            self.cache_secs
        }
        else {
            self.readahead_secs
        }
    }
}

/// Container-level metadata ferried from the producer view to the consumer view through the
/// shadow snapshot. Deliberately minimal: chapter/attachment/cue-sheet modeling is out of scope
/// (§1); this only carries what the engine itself needs to answer `ConsumerApi` queries.
#[derive(Clone, Debug, Default)]
pub struct CachedInfo {
    pub duration: Option<f64>,
    pub is_seekable: bool,
    pub base_filename: Option<String>,
    pub container_tags: TagMap,
    pub bitrate: Option<f64>,
}

/// A blocking producer `control` call marshalled from the consumer to the reader thread,
/// run with the lock dropped (§4.F step 1, §4.G `control`).
pub(crate) struct PendingControl {
    pub cmd: String,
    pub arg: String,
    pub respond: std::sync::mpsc::Sender<ControlResult>,
}

pub(crate) struct Inner {
    pub headers: Vec<StreamHeader>,
    pub queues: Vec<StreamQueue>,

    pub options: EngineOptions,

    pub ts_offset: f64,
    pub ref_pts: f64,

    pub seeking: bool,
    pub seek_pts: f64,
    pub seek_flags: SeekFlags,

    pub tracks_switched: bool,
    pub run_fn: Option<PendingControl>,

    pub eof: bool,
    pub last_eof: bool,
    pub idle: bool,
    pub initial_state: bool,
    pub autoselect: bool,

    pub events: Events,
    pub shadow: CachedInfo,
    pub consumer_info: CachedInfo,
    pub pending_stream_tags: Vec<(u32, TagMap)>,

    pub overflow_warned: bool,
    pub terminate: bool,
    pub force_cache_update: bool,
}

impl Inner {
    pub(crate) fn new(options: EngineOptions) -> Self {
        Inner {
            headers: Vec::new(),
            queues: Vec::new(),
            options,
            ts_offset: 0.0,
            ref_pts: 0.0,
            seeking: false,
            seek_pts: 0.0,
            seek_flags: SeekFlags::empty(),
            tracks_switched: false,
            run_fn: None,
            eof: false,
            last_eof: false,
            idle: false,
            initial_state: true,
            autoselect: true,
            events: Events::empty(),
            shadow: CachedInfo::default(),
            consumer_info: CachedInfo::default(),
            pending_stream_tags: Vec::new(),
            overflow_warned: false,
            terminate: false,
            force_cache_update: false,
        }
    }

    /// Recomputes the engine-wide cached stats (currently: the max per-stream bitrate estimate)
    /// shown to the consumer without waking the reader (§4.E "Two cached-stream control
    /// queries").
    pub fn refresh_cached_info(&mut self) {
        self.consumer_info.bitrate =
            self.queues.iter().filter_map(|q| q.bitrate).fold(None, |acc, b| Some(acc.map_or(b, |a: f64| a.max(b))));
    }

    /// Total back-window bytes across all streams, per §4.C.
    pub fn total_bw_bytes(&self) -> usize {
        self.queues.iter().map(StreamQueue::bw_bytes).sum()
    }

    /// Runs eviction until back-buffer usage is within budget (§4.C), called after every
    /// successful dequeue.
    pub fn run_eviction(&mut self) {
        crate::eviction::evict(&mut self.queues, self.options.max_bytes_bw);
    }
}

/// The shared state behind every handle into a running engine: one mutex, one condvar.
pub(crate) struct EngineShared {
    pub inner: Mutex<Inner>,
    pub condvar: Condvar,
}

impl EngineShared {
    /// Signals the condvar; call after any mutation that might unblock the peer thread (§5).
    pub fn wake(&self) {
        self.condvar.notify_all();
    }
}

/// Owns the background reader thread and the shared engine state. Dropped (or explicitly
/// [`Engine::terminate`]d) to shut the engine down.
pub struct Engine {
    shared: Arc<EngineShared>,
    cancel: CancelToken,
    reader: Option<JoinHandle<()>>,
}

impl Engine {
    /// Opens the engine: calls the producer's `open` synchronously on the calling thread (§7.1 —
    /// on failure the engine is never created), then spawns the dedicated reader thread.
    pub fn open<P, S>(mut producer: P, source: S, options: EngineOptions) -> Result<(Engine, ConsumerApi)>
    where
        P: Producer + 'static,
        S: Source + 'static,
    {
        let shared = Arc::new(EngineShared { inner: Mutex::new(Inner::new(options)), condvar: Condvar::new() });
        let cancel = CancelToken::new();

        let open_view = ProducerApi::new(shared.clone());
        let check_level = CheckLevel::Normal;
        if producer.open(&open_view, check_level) < 0 {
            return Err(DemuxError::Producer("producer rejected the source on open"));
        }

        let reader_shared = shared.clone();
        let reader_cancel = cancel.clone();
        let reader = std::thread::Builder::new()
            .name("demux-reader".into())
            .spawn(move || reader_loop::run(reader_shared, producer, source, reader_cancel))
            .expect("failed to spawn reader thread");

        let consumer = ConsumerApi::new(shared.clone());
        Ok((Engine { shared, cancel, reader: Some(reader) }, consumer))
    }

    /// Signals termination, wakes the reader thread, and joins it. The reader thread runs the
    /// producer's `close` on itself just before exiting, then this call returns.
    ///
    /// (The design note in §5 describes `close` running on the calling thread after join; this
    /// implementation keeps the producer value on the reader thread instead of making `Engine`
    /// generic over it, and runs `close` there immediately before the thread exits. Observably
    /// equivalent: no further producer calls are possible in either case once `terminate`
    /// returns. See DESIGN.md.)
    pub fn terminate(mut self) {
        mark_terminated(&self.shared);
        self.cancel.cancel();
        self.shared.wake();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.reader.is_some() {
            debug!("Engine dropped without calling terminate(); joining reader thread");
            mark_terminated(&self.shared);
            self.cancel.cancel();
            self.shared.wake();
            if let Some(handle) = self.reader.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Sets the termination flag and forces every queue to report EOF, per §8 scenario 6: a consumer
/// blocked in `read` with no packets and no EOF must wake with EOF semantics rather than hang.
fn mark_terminated(shared: &Arc<EngineShared>) {
    let mut inner = shared.inner.lock().unwrap();
    inner.terminate = true;
    inner.eof = true;
    for q in &mut inner.queues {
        q.eof = true;
    }
}

pub(crate) fn warn_overflow_once(inner: &mut Inner) {
    if !inner.overflow_warned {
        warn!("forward window overflow: max_bytes exceeded, marking empty streams EOF");
        inner.overflow_warned = true;
    }
}
