// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-stream registration metadata.

use crate::meta::TagMap;
use crate::packet::Packet;

/// The kind of elementary stream a [`StreamHeader`] describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Unknown,
}

/// Per-stream metadata registered by the producer via
/// [`ProducerApi::register_stream`](crate::producer::ProducerApi::register_stream).
///
/// `index` is the stream's position in the engine's dense stream table. It is the *only* link
/// between a `StreamHeader` and its [`StreamQueue`](crate::queue::StreamQueue): the engine owns
/// both tables and keeps them parallel, so "the queue for this header" is simply `queues[index]`.
/// There is no pointer or `Arc` back-reference — see the "Intrusive queue link" design note.
#[derive(Clone, Debug)]
pub struct StreamHeader {
    /// Dense index assigned on registration, `0..N-1`.
    pub index: u32,
    pub kind: StreamKind,
    /// An opaque identifier assigned by the producer (e.g. a container-native track number).
    /// Synthesized from `index` if the producer does not supply one via [`Self::with_demuxer_id`].
    pub demuxer_id: u32,
    demuxer_id_set: bool,
    /// A short, opaque description of the codec (e.g. `"opus"`, `"h264"`). Codec parameter
    /// decoding is the producer's concern; the engine never inspects this string.
    pub codec: String,
    pub tags: TagMap,
    pub default_track: bool,
    /// A single packet delivered at most once per consumer session (e.g. cover art).
    pub attached_picture: Option<Packet>,
}

impl StreamHeader {
    /// Creates a new header for a stream at `index`.
    pub fn new(index: u32, kind: StreamKind, codec: impl Into<String>) -> Self {
        StreamHeader {
            index,
            kind,
            demuxer_id: index,
            demuxer_id_set: false,
            codec: codec.into(),
            tags: TagMap::new(),
            default_track: false,
            attached_picture: None,
        }
    }

    pub fn with_demuxer_id(mut self, demuxer_id: u32) -> Self {
        self.demuxer_id = demuxer_id;
        self.demuxer_id_set = true;
        self
    }

    /// Whether [`Self::with_demuxer_id`] was called, i.e. the producer supplied its own id
    /// rather than relying on [`ProducerApi::register_stream`](crate::producer::ProducerApi::register_stream)
    /// to synthesize one from the assigned index.
    pub fn has_explicit_demuxer_id(&self) -> bool {
        self.demuxer_id_set
    }

    pub fn with_default_track(mut self, default_track: bool) -> Self {
        self.default_track = default_track;
        self
    }

    pub fn with_attached_picture(mut self, picture: Packet) -> Self {
        self.attached_picture = Some(picture);
        self
    }
}
