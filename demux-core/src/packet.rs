// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `packet` module defines the packet value type carried through every stream queue.

use crate::units::{Timestamp, NO_POSITION};

/// A packet's timeline clipping bounds, used by timeline-clipped (edited/trimmed) streams.
///
/// When present, a packet's effective timestamp for ordering purposes is clamped to `[start,
/// end]`; a chosen timestamp falling outside this range is treated as unset by callers (see
/// [`crate::queue::StreamQueue::keyframe_range_min_pts`]).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Segmented {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// A `Packet` contains one discrete, opaque unit of encoded data for a single stream.
///
/// Packets are immutable once submitted to the engine: `submit_packet` takes ownership of one
/// copy, which is retained in the stream's back-buffer until evicted, while [`ConsumerApi::read`]
/// hands the consumer a clone. This is why [`Packet`] derives `Clone` rather than being handed out
/// by reference — the queued original and the delivered copy have independent lifetimes.
///
/// [`ConsumerApi::read`]: crate::ConsumerApi::read
#[derive(Clone, Debug)]
pub struct Packet {
    /// The index of the stream this packet belongs to. Assigned by the engine on submission;
    /// the producer does not need to set this field on packets it builds.
    pub stream_index: u32,
    /// Presentation timestamp. May be [`Timestamp::UNSET`].
    pub pts: Timestamp,
    /// Decode timestamp. May be [`Timestamp::UNSET`].
    pub dts: Timestamp,
    /// Byte offset of this packet in the source, or [`NO_POSITION`] if unknown.
    pub pos: i64,
    /// Length of the payload in bytes. Kept alongside `data.len()` because `est_size` also
    /// accounts for queueing overhead; see [`Packet::est_size`].
    pub len: usize,
    /// Whether this packet is a random-access point (keyframe) for its stream.
    pub keyframe: bool,
    /// Timeline clipping bounds, if this packet belongs to a trimmed segment.
    pub segmented: Option<Segmented>,
    /// The opaque payload.
    pub data: Box<[u8]>,
}

/// Fixed per-packet bookkeeping overhead (control block, linked-list link, etc.) added on top of
/// the payload length when accounting forward/back window sizes. Chosen to match the rough
/// overhead of `Box<[u8]>` plus queue link in a 64-bit build; the exact value is not
/// load-bearing, only the fact that append/dequeue/prune use the same estimator is.
const PACKET_OVERHEAD_BYTES: usize = 64;

impl Packet {
    /// The stable byte-size estimate used identically by append, dequeue, and prune so that the
    /// running `fw_bytes`/`bw_bytes` totals never drift from a full recomputation.
    pub fn est_size(&self) -> usize {
        self.len + PACKET_OVERHEAD_BYTES
    }
}

/// Builder for [`Packet`]. Mirrors the teacher's packet builder: track id, PTS, and data are
/// mandatory; everything else defaults.
#[derive(Debug)]
pub struct PacketBuilder {
    stream_index: u32,
    pts: Timestamp,
    dts: Option<Timestamp>,
    pos: i64,
    keyframe: bool,
    segmented: Option<Segmented>,
    data: Box<[u8]>,
}

impl PacketBuilder {
    /// Starts a new packet builder for `stream_index` carrying `data`.
    pub fn new(stream_index: u32, data: impl Into<Box<[u8]>>) -> Self {
        let data = data.into();
        PacketBuilder {
            stream_index,
            pts: Timestamp::UNSET,
            dts: None,
            pos: NO_POSITION,
            keyframe: false,
            segmented: None,
            data,
        }
    }

    pub fn pts(mut self, pts: Timestamp) -> Self {
        self.pts = pts;
        self
    }

    pub fn dts(mut self, dts: Timestamp) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn pos(mut self, pos: i64) -> Self {
        self.pos = pos;
        self
    }

    pub fn keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }

    pub fn segmented(mut self, segmented: Segmented) -> Self {
        self.segmented = Some(segmented);
        self
    }

    pub fn build(self) -> Packet {
        let len = self.data.len();
        Packet {
            stream_index: self.stream_index,
            pts: self.pts,
            dts: self.dts.unwrap_or(self.pts),
            pos: self.pos,
            len,
            keyframe: self.keyframe,
            segmented: self.segmented,
            data: self.data,
        }
    }
}
