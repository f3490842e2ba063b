// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the crate-wide error type.

use std::error::Error as StdError;
use std::fmt;

/// `SeekErrorKind` enumerates the reasons a seek may be rejected without altering engine state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeekErrorKind {
    /// The producer reported the source is not seekable at all.
    Unseekable,
    /// The requested timestamp was `UNSET`.
    NoTimestamp,
    /// The requested track id does not exist.
    InvalidTrack,
}

impl SeekErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            SeekErrorKind::Unseekable => "stream is not seekable",
            SeekErrorKind::NoTimestamp => "seek timestamp is unset",
            SeekErrorKind::InvalidTrack => "invalid track id",
        }
    }
}

/// `DemuxError` enumerates all errors the engine or consumer API may report.
#[derive(Debug)]
pub enum DemuxError {
    /// A seek was rejected; no state was altered.
    Seek(SeekErrorKind),
    /// The stream index does not refer to a registered stream.
    InvalidTrack,
    /// The engine has been terminated and can no longer be used.
    Terminated,
    /// The producer's `control` call returned an application-defined error.
    Producer(&'static str),
}

impl fmt::Display for DemuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemuxError::Seek(kind) => write!(f, "seek error: {}", kind.as_str()),
            DemuxError::InvalidTrack => write!(f, "invalid track id"),
            DemuxError::Terminated => write!(f, "engine has been terminated"),
            DemuxError::Producer(msg) => write!(f, "producer error: {msg}"),
        }
    }
}

impl StdError for DemuxError {}

/// Convenience alias for `Result<T, DemuxError>`.
pub type Result<T> = std::result::Result<T, DemuxError>;

/// Convenience function to create a seek error.
pub fn seek_error<T>(kind: SeekErrorKind) -> Result<T> {
    Err(DemuxError::Seek(kind))
}
