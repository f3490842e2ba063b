// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! §4.D: in-buffer seek target resolution (the "SeekCache" path).

use bitflags::bitflags;
use log::debug;

use crate::queue::StreamQueue;
use crate::stream::StreamKind;
use crate::units::Timestamp;

bitflags! {
    /// Flags accompanying a seek request, passed through to the producer contract unchanged
    /// when the cached path cannot serve the request (§6 "Producer contract").
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SeekFlags: u8 {
        /// High-resolution: seek to the exact timestamp rather than the nearest keyframe.
        const HR = 0b001;
        /// Prefer the first valid target at or after the requested timestamp.
        const FORWARD = 0b010;
        /// Interpret the timestamp as a `[0,1]` fraction of the stream's duration.
        const FACTOR = 0b100;
    }
}

/// A normalized seek request: target timestamp (already adjusted for `ts_offset`) and flags.
#[derive(Copy, Clone, Debug)]
pub struct SeekTarget {
    pub pts: f64,
    pub flags: SeekFlags,
}

/// Attempts to resolve `target` entirely from buffered data in `queues`, per §4.D. `kinds[i]` is
/// the stream kind for `queues[i]`. Returns `true` on success, having already mutated every
/// queue's reader state; returns `false` (queues left untouched) if the cached path cannot serve
/// the request and the caller must fall through to a producer seek.
pub fn try_cached_seek(queues: &mut [StreamQueue], kinds: &[StreamKind], target: SeekTarget) -> bool {
    if target.flags.contains(SeekFlags::FACTOR) {
        return false;
    }

    // Step 1: compute the in-buffer range across selected, active streams. A selected stream the
    // consumer has never read from has no populated back_pts/last_ts and would otherwise fail the
    // whole cached seek unconditionally; such a stream simply doesn't constrain the range.
    let mut ts_min = f64::INFINITY;
    let mut ts_max = f64::NEG_INFINITY;
    let mut any_selected = false;
    for q in queues.iter() {
        if !q.selected || !q.active {
            continue;
        }
        any_selected = true;
        let (Some(back), Some(last)) = (q.back_pts.get(), q.last_ts().get()) else {
            return false;
        };
        ts_min = ts_min.min(back);
        ts_max = ts_max.max(last);
    }

    if !any_selected || target.pts < ts_min || target.pts > ts_max {
        return false;
    }

    debug!("seek cache hit: t={} range=[{ts_min},{ts_max}]", target.pts);

    // Step 2: clear reader state on every stream (cursors + bitrate anchors; packets remain).
    for q in queues.iter_mut() {
        q.clear_reader_state();
    }

    // Step 3: if not hr, snap the target to the nearest keyframe range on the first video stream.
    let mut t = target.pts;
    let forward = target.flags.contains(SeekFlags::FORWARD);
    if !target.flags.contains(SeekFlags::HR) {
        if let Some(i) = kinds.iter().position(|k| *k == StreamKind::Video) {
            if let Some((_, ts)) = queues[i].best_keyframe_target(t, forward) {
                if let Some(v) = ts.get() {
                    t = v;
                }
            }
        }
    }

    // Step 4: set reader_head on every stream to its own best keyframe target.
    for q in queues.iter_mut() {
        match q.best_keyframe_target(t, forward) {
            Some((idx, _)) => q.set_reader_head(Some(idx)),
            None => q.set_reader_head(None),
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBuilder;

    fn video_with_keyframes(pts: &[f64]) -> StreamQueue {
        let mut q = StreamQueue::new(0, StreamKind::Video);
        q.selected = true;
        q.active = true;
        for &p in pts {
            q.append(
                PacketBuilder::new(0, vec![0u8; 10]).pts(Timestamp::new(p)).keyframe(true).build(),
                false,
            );
        }
        q
    }

    #[test]
    fn fails_outside_buffered_range() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut queues = vec![video_with_keyframes(&[5.0, 10.0, 25.0])];
        let kinds = vec![StreamKind::Video];
        let ok = try_cached_seek(&mut queues, &kinds, SeekTarget { pts: 100.0, flags: SeekFlags::empty() });
        assert!(!ok);
    }

    #[test]
    fn succeeds_inside_buffered_range() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut queues = vec![video_with_keyframes(&[5.0, 10.0, 25.0])];
        let kinds = vec![StreamKind::Video];
        let ok = try_cached_seek(&mut queues, &kinds, SeekTarget { pts: 12.0, flags: SeekFlags::empty() });
        assert!(ok);
        assert_eq!(queues[0].dequeue(0.0).unwrap().pts.get(), Some(10.0));
    }

    #[test]
    fn selected_but_inactive_stream_does_not_block_cached_seek() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut idle_subtitle = StreamQueue::new(1, StreamKind::Subtitle);
        idle_subtitle.selected = true;
        let mut queues = vec![video_with_keyframes(&[5.0, 10.0, 25.0]), idle_subtitle];
        let kinds = vec![StreamKind::Video, StreamKind::Subtitle];
        let ok = try_cached_seek(&mut queues, &kinds, SeekTarget { pts: 12.0, flags: SeekFlags::empty() });
        assert!(ok);
    }
}
