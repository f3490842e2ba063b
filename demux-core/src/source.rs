// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The byte-stream source contract. Out of scope per §1: this module only defines the interface
//! the producer reads from and the cooperative cancellation token shared with it. Concrete
//! sources (files, sockets, byte slices) are the embedder's concern.

use std::io::{Read, Seek};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A seekable byte stream a [`crate::producer::Producer`] reads from.
///
/// Blanket-implemented for any `Read + Seek + Send`; the crate never downcasts or otherwise
/// requires a concrete type.
pub trait Source: Read + Seek + Send {}

impl<T: Read + Seek + Send> Source for T {}

/// A cooperative cancellation flag shared between the consumer (or embedder) and the reader
/// thread. There are no timeouts in the core (§5): cancellation works by tripping this flag so
/// that `fill_buffer` is skipped on the next dispatch, letting the reader loop converge to EOF.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a new, untripped token.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Trips the token. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
