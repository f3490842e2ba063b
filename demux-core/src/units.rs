// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time and position units shared by packets, queues, and the seek cache.

use std::fmt;

/// A presentation or decode timestamp, in seconds relative to the start of the stream.
///
/// Unlike a raw `f64`, `Timestamp` carries its own "not available" state so that callers cannot
/// mistake a sentinel value (e.g. `-1.0`) for a real timestamp. This is the `UNSET` concept used
/// throughout the packet-queue design: a packet may simply not carry a PTS or DTS.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Timestamp(Option<f64>);

impl Timestamp {
    /// The sentinel for "no timestamp available".
    pub const UNSET: Timestamp = Timestamp(None);

    /// Creates a set timestamp at `secs` seconds.
    pub const fn new(secs: f64) -> Self {
        Timestamp(Some(secs))
    }

    /// Returns `true` if this timestamp carries a value.
    pub const fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Returns the timestamp in seconds, or `None` if unset.
    pub const fn get(&self) -> Option<f64> {
        self.0
    }

    /// Returns a new timestamp shifted by `offset` seconds. `UNSET` stays `UNSET`.
    pub fn shifted(&self, offset: f64) -> Timestamp {
        match self.0 {
            Some(v) => Timestamp(Some(v + offset)),
            None => Timestamp::UNSET,
        }
    }
}

impl From<f64> for Timestamp {
    fn from(secs: f64) -> Self {
        Timestamp::new(secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.6}"),
            None => write!(f, "unset"),
        }
    }
}

/// Sentinel for "no byte position known" on a [`crate::packet::Packet`].
pub const NO_POSITION: i64 = -1;

/// Total duration, in seconds, that a packet run spans or that a stream reports as its length.
pub type Duration = f64;
