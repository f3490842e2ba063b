// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `demux-core` is a threaded buffering layer that sits between a container format parser (the
//! "producer") and one or more decoders (the "consumers").
//!
//! It owns per-stream packet queues with configurable read-ahead and back-buffer sizes, runs a
//! single background thread that drives the producer (fill, seek, track-switch), and serves seeks
//! out of the already-buffered range when possible. It does not decode, render, or parse any
//! container format itself; those are the producer's job, described by the [`producer`] module's
//! traits.
//!
//! Logging uses the [`log`] facade at three levels: `warn!` for once-per-episode conditions (queue
//! overflow), `debug!` for reader-loop dispatch decisions, and `trace!` for individual packet
//! transitions. The crate never installs a logger; embedders and tests do that.

pub mod engine;
pub mod errors;
pub mod meta;
pub mod packet;
pub mod producer;
pub mod queue;
pub mod seek;
pub mod source;
pub mod stream;
pub mod units;

mod consumer;
mod eviction;
mod reader_loop;

pub use consumer::{ConsumerApi, TryRead};
pub use engine::{Engine, EngineOptions, Events};
pub use errors::{DemuxError, Result, SeekErrorKind};
pub use packet::{Packet, PacketBuilder, Segmented};
pub use producer::{CheckLevel, ControlResult, Producer, ProducerApi};
pub use seek::{SeekFlags, SeekTarget};
pub use source::{CancelToken, Source};
pub use stream::{StreamHeader, StreamKind};
pub use units::Timestamp;
