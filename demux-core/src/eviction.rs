// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! §4.C: keyframe-bounded back-buffer pruning, run once after every dequeue.

use log::trace;

use crate::queue::StreamQueue;

/// Prunes back-buffered packets across all `queues` until their combined `bw_bytes` no longer
/// exceeds `max_bytes_bw`, or until no stream has a prunable keyframe boundary left.
///
/// Each round picks the stream whose oldest still-evictable packet has the smallest
/// PTS-or-DTS (an `UNSET` timestamp sorts earliest), then frees everything up to the next
/// keyframe-range boundary in that stream, per §4.C.
pub fn evict(queues: &mut [StreamQueue], max_bytes_bw: usize) {
    loop {
        let total: usize = queues.iter().map(StreamQueue::bw_bytes).sum();
        if total <= max_bytes_bw {
            return;
        }

        let candidate = queues
            .iter()
            .enumerate()
            .filter_map(|(i, q)| {
                let ts = q.oldest_evictable_ts()?;
                q.eviction_plan()?;
                Some((i, ts.get().unwrap_or(f64::NEG_INFINITY)))
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let Some((idx, _)) = candidate
        else {
            // Nothing left to prune; the overflow persists until the consumer reads more.
            trace!("eviction: back buffer over budget ({total} > {max_bytes_bw}) but no prunable stream");
            return;
        };

        let (count, new_back_pts) = queues[idx].eviction_plan().expect("checked above");
        let freed = queues[idx].evict_front(count);
        queues[idx].back_pts = new_back_pts;
        trace!("eviction: freed {freed} bytes from stream {idx}, {count} packets");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBuilder;
    use crate::stream::StreamKind;
    use crate::units::Timestamp;

    fn pkt(stream: u32, pts: f64, keyframe: bool, len: usize) -> crate::packet::Packet {
        PacketBuilder::new(stream, vec![0u8; len]).pts(Timestamp::new(pts)).keyframe(keyframe).build()
    }

    #[test]
    fn prunes_whole_keyframe_ranges_until_under_budget() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut q = StreamQueue::new(0, StreamKind::Video);
        q.selected = true;
        for i in 0..10 {
            let kf = i % 3 == 0;
            q.append(pkt(0, i as f64, kf, 100), false);
        }
        // Advance the reader past everything so it's all potentially evictable.
        for _ in 0..10 {
            q.dequeue(0.0);
        }

        let mut queues = vec![q];
        evict(&mut queues, 200);
        assert!(queues[0].bw_bytes() <= 200 || queues[0].eviction_plan().is_none());
    }

    #[test]
    fn no_op_when_under_budget() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut q = StreamQueue::new(0, StreamKind::Video);
        q.selected = true;
        q.append(pkt(0, 0.0, true, 100), false);
        let mut queues = vec![q];
        evict(&mut queues, 1_000_000);
        assert_eq!(queues[0].bw_bytes(), 0);
    }
}
