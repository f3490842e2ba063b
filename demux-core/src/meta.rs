// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tag metadata carried alongside packets. Tag *decoding* (ID3, Vorbis comments, etc.) is out of
//! scope for this crate; only the container the producer fills in is defined here.

/// A single key/value metadata tag.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    /// The tag's raw key as given by the container (e.g. `"TPE1"`, `"ARTIST"`).
    pub key: String,
    /// The tag's value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Tag { key: key.into(), value: value.into() }
    }
}

/// An ordered collection of tags, attached to either the container or an individual stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagMap {
    tags: Vec<Tag>,
}

impl TagMap {
    /// Creates an empty tag map.
    pub fn new() -> Self {
        TagMap::default()
    }

    /// Appends a tag.
    pub fn push(&mut self, tag: Tag) {
        self.tags.push(tag);
    }

    /// Replaces the entire tag set.
    pub fn replace(&mut self, tags: Vec<Tag>) {
        self.tags = tags;
    }

    /// Returns all tags.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Returns `true` if no tags are present.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
