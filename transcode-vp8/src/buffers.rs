//! Reference frame buffer pool.
//!
//! Four physical buffers are shared by four roles: the frame being decoded
//! and the last, golden and altref references. Several roles may point at
//! the same buffer; a buffer is free once no role holds it.

use std::cmp::Ordering;

use crate::error::{Result, Vp8Error};
use crate::frame::FrameBuffer;
use crate::header::{BufferCopy, FrameHeader};
use crate::RefFrame;

/// Number of physical buffers.
pub const NUM_BUFFERS: usize = 4;

/// Owner of the frame buffers and their reference roles.
#[derive(Debug, Clone)]
pub struct FrameBufferManager {
    slots: Vec<FrameBuffer>,
    ref_counts: [u32; NUM_BUFFERS],
    new: usize,
    last: usize,
    golden: usize,
    altref: usize,
    show: usize,
}

impl FrameBufferManager {
    /// Allocate buffers for a `mb_cols` x `mb_rows` picture.
    ///
    /// The reference roles start on three distinct blank buffers, leaving
    /// one free for the first frame.
    pub fn new(mb_cols: usize, mb_rows: usize) -> Result<Self> {
        let mut slots = Vec::with_capacity(NUM_BUFFERS);
        for _ in 0..NUM_BUFFERS {
            slots.push(FrameBuffer::new(mb_cols, mb_rows)?);
        }
        Ok(Self {
            slots,
            ref_counts: [0, 1, 1, 1],
            new: 0,
            last: 1,
            golden: 2,
            altref: 3,
            show: 1,
        })
    }

    /// Claim a free buffer as the target of the next frame.
    pub fn acquire(&mut self) -> Result<()> {
        let free = self
            .ref_counts
            .iter()
            .position(|&count| count == 0)
            .ok_or_else(|| Vp8Error::corrupt("no free frame buffer"))?;
        self.ref_counts[free] = 1;
        self.new = free;
        self.slots[free].corrupted = false;
        Ok(())
    }

    /// Return the target of a frame that failed to decode to the free pool.
    pub fn abandon(&mut self) {
        self.ref_counts[self.new] = self.ref_counts[self.new].saturating_sub(1);
    }

    /// The frame being decoded together with the references, indexed by
    /// [`RefFrame`]. The intra entry is always `None`.
    pub fn split_for_decode(&mut self) -> (&mut FrameBuffer, [Option<&FrameBuffer>; 4]) {
        let new = self.new;
        let roles = [self.last, self.golden, self.altref];
        let (before, rest) = self.slots.split_at_mut(new);
        let (target, after) = rest.split_at_mut(1);
        let (before, after): (&[FrameBuffer], &[FrameBuffer]) = (before, after);

        let mut refs = [None; 4];
        for (rf, &idx) in roles.iter().enumerate() {
            refs[rf + 1] = match idx.cmp(&new) {
                Ordering::Less => Some(&before[idx]),
                Ordering::Greater => Some(&after[idx - new - 1]),
                Ordering::Equal => None,
            };
        }
        (&mut target[0], refs)
    }

    /// Buffer currently holding `role`. [`RefFrame::Intra`] names the frame
    /// being decoded.
    pub fn get(&self, role: RefFrame) -> &FrameBuffer {
        &self.slots[self.index(role)]
    }

    /// Mutable access to the buffer holding `role`.
    pub fn get_mut(&mut self, role: RefFrame) -> &mut FrameBuffer {
        let idx = self.index(role);
        &mut self.slots[idx]
    }

    /// Physical slot behind `role`.
    pub fn index(&self, role: RefFrame) -> usize {
        match role {
            RefFrame::Intra => self.new,
            RefFrame::Last => self.last,
            RefFrame::Golden => self.golden,
            RefFrame::AltRef => self.altref,
        }
    }

    /// Number of roles holding `slot`.
    pub fn ref_count(&self, slot: usize) -> u32 {
        self.ref_counts[slot]
    }

    fn assign(&mut self, role: RefFrame, slot: usize) {
        let current = self.index(role);
        self.ref_counts[current] = self.ref_counts[current].saturating_sub(1);
        match role {
            RefFrame::Intra => self.new = slot,
            RefFrame::Last => self.last = slot,
            RefFrame::Golden => self.golden = slot,
            RefFrame::AltRef => self.altref = slot,
        }
        self.ref_counts[slot] += 1;
    }

    /// Apply the copy and refresh directives of a decoded frame and release
    /// the decode target.
    ///
    /// Altref copies are applied before golden copies, so a golden copy
    /// from altref sees the updated altref.
    pub fn swap(&mut self, hdr: &FrameHeader) {
        match hdr.copy_to_altref {
            BufferCopy::None => {}
            BufferCopy::Last => self.assign(RefFrame::AltRef, self.last),
            BufferCopy::Other => self.assign(RefFrame::AltRef, self.golden),
        }
        match hdr.copy_to_golden {
            BufferCopy::None => {}
            BufferCopy::Last => self.assign(RefFrame::Golden, self.last),
            BufferCopy::Other => self.assign(RefFrame::Golden, self.altref),
        }

        if hdr.refresh_golden {
            self.assign(RefFrame::Golden, self.new);
        }
        if hdr.refresh_altref {
            self.assign(RefFrame::AltRef, self.new);
        }
        if hdr.refresh_last {
            self.assign(RefFrame::Last, self.new);
            self.show = self.last;
        } else {
            self.show = self.new;
        }

        self.ref_counts[self.new] = self.ref_counts[self.new].saturating_sub(1);
        tracing::trace!(
            last = self.last,
            golden = self.golden,
            altref = self.altref,
            counts = ?self.ref_counts,
            "swapped frame buffers"
        );
    }

    /// The buffer produced by the most recent [`swap`](Self::swap).
    ///
    /// Stays valid until the next [`acquire`](Self::acquire).
    pub fn frame_to_show(&self) -> &FrameBuffer {
        &self.slots[self.show]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FrameHeader {
        FrameHeader::default()
    }

    fn decode_into(mgr: &mut FrameBufferManager, value: u8, hdr: &FrameHeader) {
        mgr.acquire().unwrap();
        let (target, _) = mgr.split_for_decode();
        target.y.data_mut().fill(value);
        mgr.swap(hdr);
    }

    fn keyframe_header() -> FrameHeader {
        FrameHeader {
            refresh_golden: true,
            refresh_altref: true,
            refresh_last: true,
            ..header()
        }
    }

    #[test]
    fn test_keyframe_refreshes_all_roles() {
        let mut mgr = FrameBufferManager::new(1, 1).unwrap();
        decode_into(&mut mgr, 7, &keyframe_header());
        let slot = mgr.index(RefFrame::Last);
        assert_eq!(mgr.index(RefFrame::Golden), slot);
        assert_eq!(mgr.index(RefFrame::AltRef), slot);
        assert_eq!(mgr.ref_count(slot), 3);
        let total: u32 = (0..NUM_BUFFERS).map(|i| mgr.ref_count(i)).sum();
        assert_eq!(total, 3);
        assert_eq!(mgr.frame_to_show().y.data()[0], 7);
    }

    #[test]
    fn test_inter_frame_refreshes_last_only() {
        let mut mgr = FrameBufferManager::new(1, 1).unwrap();
        decode_into(&mut mgr, 1, &keyframe_header());
        let key = mgr.index(RefFrame::Last);

        let hdr = FrameHeader {
            refresh_last: true,
            ..header()
        };
        decode_into(&mut mgr, 2, &hdr);
        assert_ne!(mgr.index(RefFrame::Last), key);
        assert_eq!(mgr.index(RefFrame::Golden), key);
        assert_eq!(mgr.ref_count(key), 2);
        assert_eq!(mgr.get(RefFrame::Last).y.data()[0], 2);
        assert_eq!(mgr.get(RefFrame::Golden).y.data()[0], 1);
    }

    #[test]
    fn test_unreferenced_frame_is_shown_and_released() {
        let mut mgr = FrameBufferManager::new(1, 1).unwrap();
        decode_into(&mut mgr, 1, &keyframe_header());
        decode_into(&mut mgr, 9, &header());
        assert_eq!(mgr.frame_to_show().y.data()[0], 9);
        assert_eq!(mgr.get(RefFrame::Last).y.data()[0], 1);
        let shown = mgr.show;
        assert_eq!(mgr.ref_count(shown), 0);
    }

    #[test]
    fn test_copy_order() {
        let mut mgr = FrameBufferManager::new(1, 1).unwrap();
        decode_into(&mut mgr, 1, &keyframe_header());
        let hdr = FrameHeader {
            refresh_last: true,
            ..header()
        };
        decode_into(&mut mgr, 2, &hdr);
        let last = mgr.index(RefFrame::Last);

        // Altref takes last first, then golden copies the new altref
        let hdr = FrameHeader {
            copy_to_altref: BufferCopy::Last,
            copy_to_golden: BufferCopy::Other,
            ..header()
        };
        decode_into(&mut mgr, 3, &hdr);
        assert_eq!(mgr.index(RefFrame::AltRef), last);
        assert_eq!(mgr.index(RefFrame::Golden), last);
        assert_eq!(mgr.ref_count(last), 3);
    }

    #[test]
    fn test_buffers_never_exhaust() {
        let mut mgr = FrameBufferManager::new(1, 1).unwrap();
        decode_into(&mut mgr, 0, &keyframe_header());
        for i in 0..20u8 {
            let hdr = FrameHeader {
                refresh_last: true,
                refresh_golden: i % 3 == 0,
                refresh_altref: i % 5 == 0,
                ..header()
            };
            decode_into(&mut mgr, i, &hdr);
            let held: u32 = (0..NUM_BUFFERS).map(|s| mgr.ref_count(s)).sum();
            assert_eq!(held, 3);
        }
    }

    #[test]
    fn test_split_for_decode_excludes_target() {
        let mut mgr = FrameBufferManager::new(1, 1).unwrap();
        decode_into(&mut mgr, 5, &keyframe_header());
        mgr.acquire().unwrap();
        let (target, refs) = mgr.split_for_decode();
        target.y.data_mut().fill(0);
        assert!(refs[RefFrame::Intra as usize].is_none());
        for rf in [RefFrame::Last, RefFrame::Golden, RefFrame::AltRef] {
            assert_eq!(refs[rf as usize].map(|fb| fb.y.data()[0]), Some(5));
        }
    }
}
