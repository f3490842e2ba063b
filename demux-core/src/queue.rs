// Symphonia
// Copyright (c) 2019-2024 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `queue` module implements the per-stream packet-queue state machine: forward/back windows,
//! monotonicity tracking, the bitrate estimator, and keyframe-range bookkeeping.
//!
//! A queue is a flat [`VecDeque`] rather than the teacher's intrusive linked list: the packet
//! ordinarily associated with a pointer-walked cursor is instead a plain index, `reader_head`,
//! into the deque. Index `0` is always the oldest packet still resident (the "queue head" the
//! design calls out); everything in `[0, reader_head)` is back-buffer, everything in
//! `[reader_head, len)` is forward. Eviction removes from the front and shifts `reader_head` down
//! by the same count, which keeps the two ends of the window O(1) to update without needing
//! pointer surgery.

use std::collections::VecDeque;

use log::trace;

use crate::packet::Packet;
use crate::stream::StreamKind;
use crate::units::Timestamp;

/// Minimum elapsed time between bitrate samples, per §4.B dequeue step 6.
const BITRATE_MIN_WINDOW_SECS: f64 = 0.5;

/// Stream-local reset threshold: a backward jump in `last_ts` larger than this is treated as a
/// new timeline epoch rather than disorder, per §4.B append step 9.
const TIMESTAMP_RESET_THRESHOLD_SECS: f64 = 10.0;

/// Outcome of [`StreamQueue::append`], used by the caller to decide whether to clear
/// engine-wide EOF state and whether to wake the reader/consumer condvar.
#[derive(Copy, Clone, Debug, Default)]
pub struct AppendOutcome {
    /// The packet was accepted into the queue.
    pub accepted: bool,
    /// The queue's forward window was empty before this packet arrived; callers should signal
    /// the condvar so a blocked consumer notices.
    pub woke_reader: bool,
}

/// The per-elementary-stream FIFO described in §3/§4.B of the design.
pub struct StreamQueue {
    index: u32,
    kind: StreamKind,

    packets: VecDeque<Packet>,
    /// Index of the next packet to hand to the consumer. `None` until the first packet is
    /// accepted (or after a flush); `Some(len)` means "established, but nothing forward yet".
    reader_head: Option<usize>,

    pub selected: bool,
    pub active: bool,
    pub eof: bool,
    pub ignore_eof: bool,

    pub correct_dts: bool,
    pub correct_pos: bool,
    last_pos: i64,
    last_dts: Timestamp,
    last_ts: Timestamp,
    pub base_ts: Timestamp,

    fw_packs: usize,
    fw_bytes: usize,
    bw_bytes: usize,

    pub back_pts: Timestamp,

    last_br_ts: Timestamp,
    last_br_bytes: u64,
    bytes_dequeued: u64,
    pub bitrate: Option<f64>,

    pub skip_to_keyframe: bool,
    pub need_refresh: bool,
    pub refreshing: bool,

    attached_picture: Option<Packet>,
    attached_picture_added: bool,

    pub cc: Option<u32>,
}

impl StreamQueue {
    /// Creates a new, empty queue for the stream at `index`.
    pub fn new(index: u32, kind: StreamKind) -> Self {
        StreamQueue {
            index,
            kind,
            packets: VecDeque::new(),
            reader_head: None,
            selected: false,
            active: false,
            eof: false,
            ignore_eof: false,
            correct_dts: true,
            correct_pos: true,
            last_pos: -1,
            last_dts: Timestamp::UNSET,
            last_ts: Timestamp::UNSET,
            base_ts: Timestamp::UNSET,
            fw_packs: 0,
            fw_bytes: 0,
            bw_bytes: 0,
            back_pts: Timestamp::UNSET,
            last_br_ts: Timestamp::UNSET,
            last_br_bytes: 0,
            bytes_dequeued: 0,
            bitrate: None,
            skip_to_keyframe: false,
            need_refresh: false,
            refreshing: false,
            attached_picture: None,
            attached_picture_added: false,
            cc: None,
        }
    }

    pub fn set_attached_picture(&mut self, picture: Packet) {
        self.attached_picture = Some(picture);
    }

    pub fn has_attached_picture(&self) -> bool {
        self.attached_picture.is_some()
    }

    pub fn fw_packs(&self) -> usize {
        self.fw_packs
    }

    pub fn fw_bytes(&self) -> usize {
        self.fw_bytes
    }

    pub fn bw_bytes(&self) -> usize {
        self.bw_bytes
    }

    pub fn last_dts(&self) -> Timestamp {
        self.last_dts
    }

    pub fn last_ts(&self) -> Timestamp {
        self.last_ts
    }

    pub fn last_pos(&self) -> i64 {
        self.last_pos
    }

    /// The elementary stream kind this queue was registered with.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// How far ahead of the last-consumed position (`base_ts`) the newest buffered packet
    /// (`last_ts`) currently reaches, in seconds. `None` before any packet has been appended.
    /// Used by the reader loop's "needs more" test against `readahead_secs`/`cache_secs`.
    pub fn forward_duration_secs(&self) -> Option<f64> {
        match (self.last_ts.get(), self.base_ts.get()) {
            (Some(last), Some(base)) => Some(last - base),
            _ => None,
        }
    }

    /// Whether the forward window is currently empty (no packet available to dequeue).
    pub fn forward_is_empty(&self) -> bool {
        match self.reader_head {
            None => true,
            Some(idx) => idx >= self.packets.len(),
        }
    }

    pub fn has_packet(&self) -> bool {
        self.attached_picture.is_some() && !self.attached_picture_added || !self.forward_is_empty()
    }

    /// §4.B `append`. `seeking` is the engine-wide "a seek is pending" flag; appends are
    /// discarded while it is set regardless of any other state.
    pub fn append(&mut self, mut p: Packet, seeking: bool) -> AppendOutcome {
        // Step 1: refresh-in-progress dedup filter.
        let mut drop_as_duplicate = false;
        if self.refreshing {
            let dts_ok = self.correct_dts
                && p.dts.get().zip(self.last_dts.get()).is_some_and(|(d, l)| d >= l);
            let pos_ok = !self.correct_dts
                && self.correct_pos
                && p.pos >= 0
                && p.pos >= self.last_pos;

            if dts_ok {
                let exact = p.dts.get() == self.last_dts.get();
                self.refreshing = false;
                drop_as_duplicate = exact;
            }
            else if pos_ok {
                let exact = p.pos == self.last_pos;
                self.refreshing = false;
                drop_as_duplicate = exact;
            }
            else if self.correct_dts || self.correct_pos {
                // Still before the resumption point.
                drop_as_duplicate = true;
            }
            else {
                // Neither hint survived: the refresh cannot be completed. Stop filtering and
                // keep this (and all future) packets, per §4.F "Refresh not possible".
                self.refreshing = false;
            }
        }

        // Step 2.
        if !self.selected || self.need_refresh || seeking || drop_as_duplicate {
            trace!(
                "stream {}: dropping packet (selected={}, need_refresh={}, seeking={}, dup={})",
                self.index, self.selected, self.need_refresh, seeking, drop_as_duplicate
            );
            return AppendOutcome::default();
        }

        // Step 3: monotonicity tracking.
        let pos_monotonic = p.pos >= 0 && p.pos > self.last_pos;
        self.correct_pos &= pos_monotonic;
        let dts_monotonic =
            p.dts.get().zip(self.last_dts.get()).map_or(p.dts.is_set(), |(d, l)| d > l);
        self.correct_dts &= dts_monotonic;
        self.last_pos = p.pos;
        if p.dts.is_set() {
            self.last_dts = p.dts;
        }

        // Step 4: assign stream index, link at tail.
        p.stream_index = self.index;

        // Step 8 (applied before insertion: it only affects the stored packet's pts).
        if self.kind != StreamKind::Video && !p.pts.is_set() {
            p.pts = p.dts;
        }

        let new_index = self.packets.len();
        let keyframe = p.keyframe;
        let size = p.est_size();
        self.packets.push_back(p);

        // Step 5: forward/back window classification.
        let mut woke_reader = false;
        match self.reader_head {
            None if !self.skip_to_keyframe || keyframe => {
                self.reader_head = Some(new_index);
                self.skip_to_keyframe = false;
                self.fw_packs += 1;
                self.fw_bytes += size;
                woke_reader = true;
            }
            None => {
                self.bw_bytes += size;
            }
            Some(head) if new_index >= head => {
                if self.fw_packs == 0 {
                    woke_reader = true;
                }
                self.fw_packs += 1;
                self.fw_bytes += size;
            }
            Some(_) => {
                self.bw_bytes += size;
            }
        }

        // Step 6: back_pts recompute.
        if !self.back_pts.is_set() && keyframe {
            self.back_pts = keyframe_range_min_pts(&self.packets, 0);
        }

        // Step 7: clear local EOF.
        if !self.ignore_eof {
            self.eof = false;
        }

        // Step 9: last_ts / base_ts update.
        let ts = ts_for_monotonic(self.packets.back().unwrap());
        if let Some(v) = ts.get() {
            let accept = match self.last_ts.get() {
                None => true,
                Some(prev) => v > prev || (prev - v) > TIMESTAMP_RESET_THRESHOLD_SECS,
            };
            if accept {
                let first = !self.last_ts.is_set();
                self.last_ts = ts;
                if first {
                    self.base_ts = ts;
                }
            }
        }

        AppendOutcome { accepted: true, woke_reader }
    }

    /// §4.B `dequeue`. Returns a consumer-facing copy with `ts_offset` already applied, or
    /// `None` if nothing is available. Does not run eviction; the caller invokes
    /// [`crate::eviction::evict`] across all streams afterward.
    pub fn dequeue(&mut self, ts_offset: f64) -> Option<Packet> {
        if let Some(picture) = self.attached_picture.clone() {
            self.eof = true;
            if self.attached_picture_added {
                return None;
            }
            self.attached_picture_added = true;
            let mut out = picture;
            apply_ts_offset(&mut out, ts_offset);
            return Some(out);
        }

        let idx = match self.reader_head {
            Some(idx) if idx < self.packets.len() => idx,
            _ => return None,
        };

        let pkt = self.packets[idx].clone();
        self.reader_head = Some(idx + 1);
        let size = pkt.est_size();
        self.fw_packs -= 1;
        self.fw_bytes -= size;
        self.bw_bytes += size;

        self.base_ts = ts_for_monotonic(&pkt);

        self.bytes_dequeued += size as u64;
        if pkt.keyframe {
            if let Some(ts) = ts_for_monotonic(&pkt).get() {
                self.update_bitrate(ts);
            }
        }

        let mut out = pkt;
        apply_ts_offset(&mut out, ts_offset);
        Some(out)
    }

    fn update_bitrate(&mut self, ts: f64) {
        match self.last_br_ts.get() {
            None => {
                self.last_br_ts = Timestamp::new(ts);
                self.last_br_bytes = self.bytes_dequeued;
            }
            Some(prev) => {
                let delta = ts - prev;
                if delta < 0.0 {
                    self.last_br_ts = Timestamp::new(ts);
                    self.last_br_bytes = self.bytes_dequeued;
                }
                else if delta >= BITRATE_MIN_WINDOW_SECS {
                    let bytes = self.bytes_dequeued.saturating_sub(self.last_br_bytes);
                    self.bitrate = Some(bytes as f64 / delta);
                    self.last_br_ts = Timestamp::new(ts);
                    self.last_br_bytes = self.bytes_dequeued;
                }
            }
        }
    }

    /// Oldest packet still resident (`queue_head`), if any.
    pub fn oldest_resident_ts(&self) -> Timestamp {
        self.packets.front().map(ts_for_keyframe_range).unwrap_or(Timestamp::UNSET)
    }

    /// Drops the `count` oldest resident packets (used by [`crate::eviction::evict`]), adjusting
    /// `reader_head` and `bw_bytes` to match.
    pub(crate) fn evict_front(&mut self, count: usize) -> usize {
        let mut freed = 0;
        for _ in 0..count {
            if let Some(p) = self.packets.pop_front() {
                freed += p.est_size();
                self.bw_bytes = self.bw_bytes.saturating_sub(p.est_size());
                if let Some(head) = self.reader_head {
                    self.reader_head = Some(head.saturating_sub(1));
                }
            }
        }
        freed
    }

    /// Finds the next evictable keyframe boundary strictly after the queue head, intersected
    /// with `[queue_head, reader_head)` per §4.C step 2-3. Returns `(count_to_prune, new_back_pts)`.
    pub(crate) fn eviction_plan(&self) -> Option<(usize, Timestamp)> {
        let reader_head = self.reader_head.unwrap_or(self.packets.len());
        if reader_head == 0 {
            return None;
        }
        for i in 1..self.packets.len() {
            if self.packets[i].keyframe {
                let ts = keyframe_range_min_pts(&self.packets, i);
                if ts.is_set() {
                    return Some((i.min(reader_head), ts));
                }
            }
        }
        None
    }

    /// The smallest timestamp (pts-or-dts, UNSET sorts earliest) among packets strictly before
    /// `reader_head`, used by [`crate::eviction::evict`] to pick which stream to prune from.
    pub(crate) fn oldest_evictable_ts(&self) -> Option<Timestamp> {
        let bound = self.reader_head.unwrap_or(self.packets.len());
        if bound == 0 {
            return None;
        }
        self.packets.front().map(ts_for_keyframe_range)
    }

    /// §4.D step 2: reset cursor/anchors while keeping queued packets.
    pub fn clear_reader_state(&mut self) {
        self.reader_head = None;
        self.fw_packs = 0;
        self.fw_bytes = 0;
        self.bw_bytes = self.packets.iter().map(Packet::est_size).sum();
        self.last_br_ts = Timestamp::UNSET;
        self.last_br_bytes = self.bytes_dequeued;
    }

    /// Sets `reader_head` to the packet at `index` (or clears it, setting `skip_to_keyframe` if
    /// `index` is `None`), then recomputes `fw_packs`/`fw_bytes`/`bw_bytes` by a single
    /// traversal, per §4.D step 4.
    pub fn set_reader_head(&mut self, index: Option<usize>) {
        match index {
            Some(idx) => {
                self.reader_head = Some(idx);
                self.skip_to_keyframe = false;
            }
            None => {
                self.reader_head = None;
                self.skip_to_keyframe = true;
            }
        }

        let head = self.reader_head.unwrap_or(self.packets.len());
        let mut fw_packs = 0;
        let mut fw_bytes = 0;
        let mut bw_bytes = 0;
        for (i, p) in self.packets.iter().enumerate() {
            if i < head {
                bw_bytes += p.est_size();
            }
            else {
                fw_packs += 1;
                fw_bytes += p.est_size();
            }
        }
        self.fw_packs = fw_packs;
        self.fw_bytes = fw_bytes;
        self.bw_bytes = bw_bytes;
    }

    /// Finds the best keyframe-range target for a cached or producer-relative seek to `t`,
    /// returning `(index, range_min_pts)`. `forward` selects the tie-break direction.
    pub fn best_keyframe_target(&self, t: f64, forward: bool) -> Option<(usize, Timestamp)> {
        let mut candidates = Vec::new();
        for i in 0..self.packets.len() {
            if self.packets[i].keyframe {
                let ts = keyframe_range_min_pts(&self.packets, i);
                if let Some(v) = ts.get() {
                    candidates.push((i, v, ts));
                }
            }
        }

        if forward {
            candidates
                .iter()
                .filter(|(_, v, _)| *v >= t)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .map(|(i, _, ts)| (*i, *ts))
        }
        else {
            // Prefer the nearest range at-or-before `t`; fall back to the nearest overall.
            candidates
                .iter()
                .filter(|(_, v, _)| *v <= t)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .or_else(|| {
                    candidates
                        .iter()
                        .min_by(|a, b| (a.1 - t).abs().partial_cmp(&(b.1 - t).abs()).unwrap())
                })
                .map(|(i, _, ts)| (*i, *ts))
        }
    }

    /// Fully clears the queue (packets and reader state), per `flush()`.
    pub fn flush(&mut self) {
        self.packets.clear();
        self.reader_head = None;
        self.fw_packs = 0;
        self.fw_bytes = 0;
        self.bw_bytes = 0;
        self.back_pts = Timestamp::UNSET;
        self.skip_to_keyframe = false;
        self.last_br_ts = Timestamp::UNSET;
        self.last_br_bytes = self.bytes_dequeued;
        self.attached_picture_added = false;
    }

    /// Recomputes `back_pts` from scratch; used after eviction updates the target directly, and
    /// available for test assertions.
    pub fn recompute_back_pts(&mut self) {
        self.back_pts = keyframe_range_min_pts(&self.packets, 0);
    }
}

/// The PTS-or-DTS used for keyframe-range and ordering comparisons (PTS preferred).
fn ts_for_keyframe_range(p: &Packet) -> Timestamp {
    let ts = if p.pts.is_set() { p.pts } else { p.dts };
    if let (Some(seg), Some(v)) = (p.segmented, ts.get()) {
        if let (Some(s), Some(e)) = (seg.start.get(), seg.end.get()) {
            if v < s || v > e {
                return Timestamp::UNSET;
            }
        }
    }
    ts
}

/// The DTS-or-PTS used for `last_ts`/`base_ts`/bitrate tracking (DTS preferred).
fn ts_for_monotonic(p: &Packet) -> Timestamp {
    let ts = if p.dts.is_set() { p.dts } else { p.pts };
    if let Some(seg) = p.segmented {
        if let (Some(v), Some(e)) = (ts.get(), seg.end.get()) {
            if v > e {
                return seg.end;
            }
        }
    }
    ts
}

/// §4.B `keyframe_range_min_pts`: walks forward from `start`, finds the first keyframe (opening
/// the range), then the minimum timestamp up to (but not including) the next keyframe.
fn keyframe_range_min_pts(packets: &VecDeque<Packet>, start: usize) -> Timestamp {
    let Some(open) = (start..packets.len()).find(|&i| packets[i].keyframe) else {
        return Timestamp::UNSET;
    };
    let close = (open + 1..packets.len()).find(|&i| packets[i].keyframe).unwrap_or(packets.len());

    packets
        .iter()
        .take(close)
        .skip(open)
        .filter_map(|p| ts_for_keyframe_range(p).get())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
        .map(Timestamp::new)
        .unwrap_or(Timestamp::UNSET)
}

fn apply_ts_offset(p: &mut Packet, offset: f64) {
    if offset == 0.0 {
        return;
    }
    p.pts = p.pts.shifted(offset);
    p.dts = p.dts.shifted(offset);
    if let Some(seg) = p.segmented.as_mut() {
        seg.start = seg.start.shifted(offset);
        seg.end = seg.end.shifted(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBuilder;

    fn pkt(stream: u32, pts: f64, keyframe: bool, len: usize) -> Packet {
        PacketBuilder::new(stream, vec![0u8; len]).pts(Timestamp::new(pts)).keyframe(keyframe).build()
    }

    #[test]
    fn append_establishes_forward_window_on_first_packet() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut q = StreamQueue::new(0, StreamKind::Video);
        q.selected = true;
        let out = q.append(pkt(0, 0.0, true, 100), false);
        assert!(out.accepted);
        assert!(out.woke_reader);
        assert_eq!(q.fw_packs(), 1);
        assert_eq!(q.bw_bytes(), 0);
    }

    #[test]
    fn dequeue_moves_packet_from_forward_to_back_window() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut q = StreamQueue::new(0, StreamKind::Video);
        q.selected = true;
        q.append(pkt(0, 0.0, true, 100), false);
        q.append(pkt(0, 1.0, false, 100), false);
        assert_eq!(q.fw_packs(), 2);

        let p = q.dequeue(0.0).expect("packet");
        assert_eq!(p.pts.get(), Some(0.0));
        assert_eq!(q.fw_packs(), 1);
        assert!(q.bw_bytes() > 0);
    }

    #[test]
    fn monotonicity_flag_clears_on_violation() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut q = StreamQueue::new(0, StreamKind::Audio);
        q.selected = true;
        q.append(PacketBuilder::new(0, vec![0u8; 10]).pts(Timestamp::new(5.0)).dts(Timestamp::new(5.0)).build(), false);
        assert!(q.correct_dts);
        q.append(PacketBuilder::new(0, vec![0u8; 10]).pts(Timestamp::new(4.0)).dts(Timestamp::new(4.0)).build(), false);
        assert!(!q.correct_dts);
    }

    #[test]
    fn unselected_stream_drops_packets() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut q = StreamQueue::new(0, StreamKind::Video);
        let out = q.append(pkt(0, 0.0, true, 100), false);
        assert!(!out.accepted);
        assert_eq!(q.fw_packs(), 0);
    }

    #[test]
    fn seeking_discards_appends() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut q = StreamQueue::new(0, StreamKind::Video);
        q.selected = true;
        let out = q.append(pkt(0, 0.0, true, 100), true);
        assert!(!out.accepted);
    }

    #[test]
    fn keyframe_range_min_pts_skips_unset_and_out_of_segment() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut packets = VecDeque::new();
        packets.push_back(pkt(0, 1.0, true, 10));
        packets.push_back(pkt(0, 0.5, false, 10));
        packets.push_back(pkt(0, 2.0, true, 10));
        assert_eq!(keyframe_range_min_pts(&packets, 0).get(), Some(0.5));
    }

    #[test]
    fn timestamp_regression_over_threshold_resets_last_ts() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut q = StreamQueue::new(0, StreamKind::Audio);
        q.selected = true;
        q.append(PacketBuilder::new(0, vec![0u8; 1]).dts(Timestamp::new(100.0)).pts(Timestamp::new(100.0)).build(), false);
        assert_eq!(q.last_ts().get(), Some(100.0));
        // Small regression: rejected.
        q.append(PacketBuilder::new(0, vec![0u8; 1]).dts(Timestamp::new(95.0)).pts(Timestamp::new(95.0)).build(), false);
        assert_eq!(q.last_ts().get(), Some(100.0));
        // Large regression (>10s): accepted as a stream-local reset.
        q.append(PacketBuilder::new(0, vec![0u8; 1]).dts(Timestamp::new(0.0)).pts(Timestamp::new(0.0)).build(), false);
        assert_eq!(q.last_ts().get(), Some(0.0));
    }
}
