//! The segmented byte buffer.
//!
//! A [`Buffer`] is an ordered sequence of bytes stored in fixed-size blocks.
//! Data is appended at the tail and consumed from the head, but the buffer
//! also supports opening or closing a gap of bytes at any registered
//! [`Mark`] — the operations a wire encoder needs to back-patch length
//! prefixes it could not know up front. Live marks are adjusted on every
//! mutation so that each keeps addressing the same logical byte.
//!
//! The contents are exposed to the network layer as a scatter/gather vector
//! (see [`Buffer::iov`]); a successful vectored write is followed by
//! [`Buffer::drop_front`] for the written length.
//!
//! A buffer is a single-threaded structure: it is `Send` but not shared, and
//! no operation blocks or suspends. All operations are O(bytes moved);
//! preconditions are the caller's duty and are checked with debug
//! assertions only.

use std::cmp::Ordering;
use std::io::IoSlice;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::alloc::{BlockAlloc, HeapAlloc};
use crate::block::{BlockIndex, BlockList};
use crate::error::Result;
use crate::mark::{Mark, MarkRegistry};

/// A resolved position: a block plus an offset into its data.
///
/// Offset `N` is the one-past position of the block; the same logical byte
/// can therefore be represented as `(block, N)` or `(block.next, 0)`.
/// Positions compare by `(block sequence, offset)`, which keeps the two
/// representations distinct on purpose — marks parked at a block boundary
/// stay on the side they were created on, exactly like the cursors they
/// mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pos {
    block: Option<BlockIndex>,
    offset: usize,
}

/// Segmented byte buffer over `N`-byte data blocks.
///
/// `N` is the data capacity of one block; the allocator supplies chunks of
/// `BlockAlloc::REAL_SIZE` bytes (header included). Allocation is the only
/// fallible operation, and it is transactional: a failed multi-block
/// reservation leaves the buffer untouched.
pub struct Buffer<const N: usize, A: BlockAlloc<N> = HeapAlloc> {
    list: BlockList<N, A>,
    marks: MarkRegistry,
    /// Offset of the first live byte inside the first block.
    begin_off: usize,
    /// One-past offset of the last live byte inside the last block.
    end_off: usize,
}

impl<const N: usize> Buffer<N, HeapAlloc> {
    /// Creates an empty buffer backed by the global allocator.
    pub fn new() -> Self {
        Self::with_alloc(HeapAlloc)
    }
}

impl<const N: usize> Default for Buffer<N, HeapAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, A: BlockAlloc<N>> Buffer<N, A> {
    /// Creates an empty buffer with a caller-supplied block allocator.
    pub fn with_alloc(alloc: A) -> Self {
        Self {
            list: BlockList::new(alloc),
            marks: MarkRegistry::new(),
            begin_off: 0,
            end_off: 0,
        }
    }

    /// True if the buffer holds no live bytes.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of live bytes.
    pub fn size(&self) -> usize {
        match (self.list.first(), self.list.last()) {
            (Some(first), Some(last)) => {
                let span = self.list.seq_of(last) - self.list.seq_of(first);
                span as usize * N + self.end_off - self.begin_off
            }
            _ => 0,
        }
    }

    // ------------------------------------------------------------------
    // Marks
    // ------------------------------------------------------------------

    /// Registers a mark at the first live byte.
    pub fn begin(&mut self) -> Mark {
        let p = self.begin_pos();
        let mark = self.marks.alloc(p.block, p.offset);
        self.marks.link_front(mark.slot);
        mark
    }

    /// Registers a mark at the one-past-the-end position.
    pub fn end(&mut self) -> Mark {
        let p = self.end_pos();
        let mark = self.marks.alloc(p.block, p.offset);
        self.marks.link_back(mark.slot);
        mark
    }

    /// Registers a new mark at the same position as `mark`.
    pub fn clone_mark(&mut self, mark: &Mark) -> Mark {
        let s = self.marks.resolve(mark);
        let (block, offset) = (s.block, s.offset);
        let p = Pos { block, offset };
        let copy = self.marks.alloc(block, offset);
        // The clone is the latest registration at this position, so it goes
        // after every mark already tied there, not right after the source.
        let mut at = mark.slot;
        while let Some(next) = self.marks.next(at) {
            if self.cmp_pos(self.slot_pos(next), p) != Ordering::Equal {
                break;
            }
            at = next;
        }
        self.marks.link_after(copy.slot, at);
        copy
    }

    /// Deregisters a mark. Must be called exactly once per mark.
    pub fn release_mark(&mut self, mark: Mark) {
        self.marks.release(mark);
    }

    /// Compares the positions of two marks of this buffer.
    pub fn mark_cmp(&self, a: &Mark, b: &Mark) -> Ordering {
        let pa = self.mark_pos(a);
        let pb = self.mark_pos(b);
        self.cmp_pos(pa, pb)
    }

    /// Moves a mark `step` bytes toward the tail and re-sorts it.
    pub fn advance(&mut self, mark: &Mark, step: usize) {
        if step == 0 {
            return;
        }
        let p = self.advance_pos(self.mark_pos(mark), step);
        debug_assert!(
            self.cmp_pos(p, self.end_pos()) != Ordering::Greater,
            "mark advanced past the end of the buffer"
        );
        let slot = mark.slot;
        {
            let s = self.marks.slot_mut(slot);
            s.block = p.block;
            s.offset = p.offset;
        }
        // Hop right past every mark that now compares less-or-equal.
        while let Some(next) = self.marks.next(slot) {
            let np = self.slot_pos(next);
            if self.cmp_pos(np, p) == Ordering::Greater {
                break;
            }
            self.marks.unlink(slot);
            self.marks.link_after(slot, next);
        }
    }

    /// Moves a mark `step` bytes toward the head and re-sorts it.
    pub fn retreat(&mut self, mark: &Mark, step: usize) {
        if step == 0 {
            return;
        }
        let p = self.retreat_pos(self.mark_pos(mark), step);
        debug_assert!(
            self.cmp_pos(p, self.begin_pos()) != Ordering::Less,
            "mark retreated past the start of the buffer"
        );
        let slot = mark.slot;
        {
            let s = self.marks.slot_mut(slot);
            s.block = p.block;
            s.offset = p.offset;
        }
        while let Some(prev) = self.marks.prev(slot) {
            let pp = self.slot_pos(prev);
            if self.cmp_pos(pp, p) != Ordering::Greater {
                break;
            }
            self.marks.unlink(slot);
            self.marks.link_before(slot, prev);
        }
    }

    // ------------------------------------------------------------------
    // Append / drop
    // ------------------------------------------------------------------

    /// Reserves `n` bytes at the tail and returns a mark at the start of the
    /// reserved span. The bytes are unspecified until written with
    /// [`Buffer::set`].
    pub fn append_back(&mut self, n: usize) -> Result<Mark> {
        debug_assert!(n != 0, "append_back of zero bytes");
        let was_empty = self.list.is_empty();
        let anchor = self.end_pos();
        self.extend_back(n)?;
        let p = if was_empty {
            Pos {
                block: self.list.first(),
                offset: 0,
            }
        } else {
            anchor
        };
        let mark = self.marks.alloc(p.block, p.offset);
        self.marks.link_back(mark.slot);
        Ok(mark)
    }

    /// Appends a byte slice at the tail. Returns the number of bytes written.
    pub fn write_back(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let was_empty = self.list.is_empty();
        let anchor = self.end_pos();
        self.extend_back(data.len())?;
        let start = if was_empty {
            Pos {
                block: self.list.first(),
                offset: 0,
            }
        } else {
            anchor
        };
        self.copy_in(start, data);
        Ok(data.len())
    }

    /// Extends the tail by `n` bytes without registering a mark or writing
    /// anything.
    pub fn advance_back(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.extend_back(n)
    }

    /// Removes `n` bytes from the tail, freeing blocks that drop out of the
    /// live range. `n` must not exceed [`Buffer::size`]; no registered mark
    /// may lie strictly inside the removed region.
    pub fn drop_back(&mut self, mut n: usize) {
        debug_assert!(n <= self.size(), "drop_back past the live range");
        if n == 0 {
            return;
        }
        let mut last = self.list.last().expect("drop_back on empty buffer");
        let mut left = self.end_off;
        while n > left {
            #[cfg(debug_assertions)]
            if let Some(tail) = self.marks.tail() {
                debug_assert!(
                    self.marks.slot(tail).block != Some(last),
                    "registered mark inside dropped block"
                );
            }
            self.list.pop_back();
            last = self.list.last().expect("drop_back crossed the live range");
            self.end_off = N;
            n -= left;
            left = N;
        }
        self.end_off -= n;
        #[cfg(debug_assertions)]
        if let Some(tail) = self.marks.tail() {
            let tp = self.slot_pos(tail);
            debug_assert!(
                self.cmp_pos(tp, self.end_pos()) != Ordering::Greater,
                "registered mark past the new end"
            );
        }
    }

    /// Removes `n` bytes from the head, freeing blocks that drop out of the
    /// live range. Same preconditions as [`Buffer::drop_back`].
    pub fn drop_front(&mut self, mut n: usize) {
        debug_assert!(n <= self.size(), "drop_front past the live range");
        if n == 0 {
            return;
        }
        let mut first = self.list.first().expect("drop_front on empty buffer");
        let mut left = N - self.begin_off;
        while n > left {
            #[cfg(debug_assertions)]
            if let Some(head) = self.marks.head() {
                debug_assert!(
                    self.marks.slot(head).block != Some(first),
                    "registered mark inside dropped block"
                );
            }
            self.list.pop_front();
            first = self
                .list
                .first()
                .expect("drop_front crossed the live range");
            self.begin_off = 0;
            n -= left;
            left = N;
        }
        self.begin_off += n;
        #[cfg(debug_assertions)]
        if let Some(head) = self.marks.head() {
            let hp = self.slot_pos(head);
            debug_assert!(
                self.cmp_pos(hp, self.begin_pos()) != Ordering::Less,
                "registered mark before the new start"
            );
        }
    }

    // ------------------------------------------------------------------
    // Mid-buffer editing
    // ------------------------------------------------------------------

    /// Opens a gap of `n` bytes at the mark's position.
    ///
    /// Bytes before the mark are unchanged; bytes at and after it shift `n`
    /// bytes toward the tail, crossing block boundaries and newly allocated
    /// tail blocks as needed. Marks strictly after the position move with
    /// their bytes; the mark itself and any mark sharing its position stay,
    /// addressing the start of the gap. `n` must not exceed the block data
    /// size `N`.
    pub fn insert(&mut self, mark: &Mark, n: usize) -> Result<()> {
        debug_assert!(n <= N, "insert larger than one block");
        if n == 0 {
            return Ok(());
        }
        let p = self.mark_pos(mark);
        debug_assert!(p.block.is_some(), "insert into an empty buffer");
        let tail_len = self.remaining_from_pos(p);
        self.extend_back(n)?;
        trace!(gap = n, shifted = tail_len, "insert: opening mid-buffer gap");
        self.shift_right(p, tail_len, n);

        // Marks strictly after the gap follow their bytes.
        let mut cur = self.marks.next(mark.slot);
        while let Some(slot) = cur {
            let sp = self.slot_pos(slot);
            if self.cmp_pos(sp, p) != Ordering::Equal {
                debug_assert!(self.cmp_pos(sp, p) == Ordering::Greater);
                let np = self.advance_pos(sp, n);
                let s = self.marks.slot_mut(slot);
                s.block = np.block;
                s.offset = np.offset;
            }
            cur = self.marks.next(slot);
        }
        Ok(())
    }

    /// Closes a gap of `n` bytes at the mark's position.
    ///
    /// Bytes at and after `position + n` shift `n` bytes toward the head and
    /// the tail shrinks by `n`. Marks inside the removed range collapse onto
    /// the mark's position; marks at or past the surviving bytes move with
    /// them. `n` must not exceed the live bytes after the mark.
    pub fn release(&mut self, mark: &Mark, n: usize) {
        if n == 0 {
            return;
        }
        let p = self.mark_pos(mark);
        debug_assert!(p.block.is_some(), "release on an empty buffer");
        let after = self.remaining_from_pos(p);
        debug_assert!(n <= after, "release past the live range");
        trace!(gap = n, shifted = after - n, "release: closing mid-buffer gap");
        self.shift_left(p, n, after - n);

        let bound = self.advance_pos(p, n);
        let mut cur = self.marks.next(mark.slot);
        while let Some(slot) = cur {
            let sp = self.slot_pos(slot);
            if self.cmp_pos(sp, bound) == Ordering::Less {
                // Inside the removed range (or tied with the mark): collapse.
                let s = self.marks.slot_mut(slot);
                s.block = p.block;
                s.offset = p.offset;
            } else {
                let np = self.retreat_pos(sp, n);
                let s = self.marks.slot_mut(slot);
                s.block = np.block;
                s.offset = np.offset;
            }
            cur = self.marks.next(slot);
        }
        self.drop_back(n);
    }

    /// Grows or shrinks a span at the mark by inserting or releasing the
    /// size delta.
    pub fn resize(&mut self, mark: &Mark, old_n: usize, new_n: usize) -> Result<()> {
        match new_n.cmp(&old_n) {
            Ordering::Greater => self.insert(mark, new_n - old_n),
            Ordering::Less => {
                self.release(mark, old_n - new_n);
                Ok(())
            }
            Ordering::Equal => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Reads and writes at marks
    // ------------------------------------------------------------------

    /// Copies `data` into the buffer starting at the mark.
    pub fn set(&mut self, mark: &Mark, data: &[u8]) {
        debug_assert!(self.has(mark, data.len()), "set past the live range");
        self.copy_in(self.mark_pos(mark), data);
    }

    /// Copies `data` into the buffer starting `offset` bytes past the mark.
    pub fn set_at(&mut self, mark: &Mark, offset: usize, data: &[u8]) {
        debug_assert!(
            self.has(mark, offset + data.len()),
            "set_at past the live range"
        );
        let p = self.advance_pos(self.mark_pos(mark), offset);
        self.copy_in(p, data);
    }

    /// Copies bytes out of the buffer starting at the mark.
    pub fn get(&self, mark: &Mark, out: &mut [u8]) {
        debug_assert!(self.has(mark, out.len()), "get past the live range");
        self.copy_out(self.mark_pos(mark), out);
    }

    /// Copies bytes out of the buffer starting `offset` bytes past the mark.
    pub fn get_at(&self, mark: &Mark, offset: usize, out: &mut [u8]) {
        debug_assert!(
            self.has(mark, offset + out.len()),
            "get_at past the live range"
        );
        let p = self.advance_pos(self.mark_pos(mark), offset);
        self.copy_out(p, out);
    }

    /// Copies `n` bytes starting at the mark into a fresh [`Bytes`].
    pub fn copy_to_bytes(&self, mark: &Mark, n: usize) -> Bytes {
        let mut out = BytesMut::zeroed(n);
        self.get(mark, &mut out);
        out.freeze()
    }

    /// True if at least `n` live bytes follow the mark.
    pub fn has(&self, mark: &Mark, n: usize) -> bool {
        self.remaining_from(mark) >= n
    }

    /// Number of live bytes between the mark and the end of the buffer.
    pub fn remaining_from(&self, mark: &Mark) -> usize {
        self.remaining_from_pos(self.mark_pos(mark))
    }

    // ------------------------------------------------------------------
    // Scatter/gather view
    // ------------------------------------------------------------------

    /// Fills `out` with up to `max` scatter/gather entries covering the
    /// bytes from the mark to the end of the buffer. Returns the number of
    /// entries written; their concatenation equals a linear scan of the
    /// same range (clipped when `max` runs out).
    pub fn iov<'a>(&'a self, mark: &Mark, out: &mut Vec<IoSlice<'a>>, max: usize) -> usize {
        out.clear();
        if max == 0 || self.remaining_from(mark) == 0 {
            return 0;
        }
        let last = self.list.last().expect("non-empty range without blocks");
        let mut p = self.mark_pos(mark);
        while out.len() < max {
            let block = p.block.expect("iov ran off the block list");
            let run_end = if block == last { self.end_off } else { N };
            if run_end > p.offset {
                out.push(IoSlice::new(&self.list.data(block)[p.offset..run_end]));
            }
            if block == last {
                break;
            }
            p = Pos {
                block: self.list.next_of(block),
                offset: 0,
            };
        }
        out.len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn begin_pos(&self) -> Pos {
        Pos {
            block: self.list.first(),
            offset: self.begin_off,
        }
    }

    fn end_pos(&self) -> Pos {
        Pos {
            block: self.list.last(),
            offset: self.end_off,
        }
    }

    fn mark_pos(&self, mark: &Mark) -> Pos {
        let s = self.marks.resolve(mark);
        Pos {
            block: s.block,
            offset: s.offset,
        }
    }

    fn slot_pos(&self, slot: u32) -> Pos {
        let s = self.marks.slot(slot);
        Pos {
            block: s.block,
            offset: s.offset,
        }
    }

    fn cmp_pos(&self, a: Pos, b: Pos) -> Ordering {
        let ka = (a.block.map(|blk| self.list.seq_of(blk)), a.offset);
        let kb = (b.block.map(|blk| self.list.seq_of(blk)), b.offset);
        ka.cmp(&kb)
    }

    fn remaining_from_pos(&self, p: Pos) -> usize {
        let (Some(block), Some(last)) = (p.block, self.list.last()) else {
            return 0;
        };
        let span = self.list.seq_of(last) - self.list.seq_of(block);
        span as usize * N + self.end_off - p.offset
    }

    fn advance_pos(&self, p: Pos, mut step: usize) -> Pos {
        if step == 0 {
            return p;
        }
        let mut block = p.block.expect("advance on the null position");
        let mut offset = p.offset;
        while step > N - offset {
            step -= N - offset;
            block = self
                .list
                .next_of(block)
                .expect("advance past the last block");
            offset = 0;
        }
        Pos {
            block: Some(block),
            offset: offset + step,
        }
    }

    fn retreat_pos(&self, p: Pos, mut step: usize) -> Pos {
        if step == 0 {
            return p;
        }
        let mut block = p.block.expect("retreat on the null position");
        let mut offset = p.offset;
        while step > offset {
            step -= offset;
            block = self
                .list
                .prev_of(block)
                .expect("retreat past the first block");
            offset = N;
        }
        Pos {
            block: Some(block),
            offset: offset - step,
        }
    }

    /// Grows the tail by `n` bytes, allocating blocks as one transactional
    /// group. On the first allocation, marks parked on the null position of
    /// the formerly empty buffer are re-pointed at the first byte.
    fn extend_back(&mut self, n: usize) -> Result<()> {
        let was_empty = self.list.is_empty();
        let left = if was_empty { 0 } else { N - self.end_off };
        if n <= left {
            self.end_off += n;
            return Ok(());
        }
        let need = n - left;
        let blocks = need.div_ceil(N);
        self.list.push_back_group(blocks)?;
        self.end_off = need - (blocks - 1) * N;
        if was_empty {
            self.begin_off = 0;
            let first = self.list.first();
            let mut cur = self.marks.head();
            while let Some(slot) = cur {
                let s = self.marks.slot_mut(slot);
                debug_assert!(s.block.is_none(), "stale mark in formerly empty buffer");
                s.block = first;
                s.offset = 0;
                cur = self.marks.next(slot);
            }
        }
        Ok(())
    }

    fn copy_in(&mut self, p: Pos, data: &[u8]) {
        let mut block = p.block.expect("write at the null position");
        let mut offset = p.offset;
        let mut done = 0;
        while done < data.len() {
            if offset == N {
                block = self.list.next_of(block).expect("write past the last block");
                offset = 0;
            }
            let chunk = (N - offset).min(data.len() - done);
            self.list.data_mut(block)[offset..offset + chunk]
                .copy_from_slice(&data[done..done + chunk]);
            offset += chunk;
            done += chunk;
        }
    }

    fn copy_out(&self, p: Pos, out: &mut [u8]) {
        if out.is_empty() {
            return;
        }
        let mut block = p.block.expect("read at the null position");
        let mut offset = p.offset;
        let mut done = 0;
        while done < out.len() {
            if offset == N {
                block = self.list.next_of(block).expect("read past the last block");
                offset = 0;
            }
            let chunk = (N - offset).min(out.len() - done);
            out[done..done + chunk].copy_from_slice(&self.list.data(block)[offset..offset + chunk]);
            offset += chunk;
            done += chunk;
        }
    }

    /// Shifts the `len` bytes at `[p, p+len)` right by `gap`, copying from
    /// the highest address downward so unread source bytes are never
    /// clobbered. The destination range must already be backed by blocks.
    fn shift_right(&mut self, p: Pos, len: usize, gap: usize) {
        if len == 0 {
            return;
        }
        let p_block = p.block.expect("shift on the null position");
        let src_end = self.advance_pos(p, len);
        let dst_end = self.advance_pos(p, len + gap);
        let (mut src_block, mut src_off) = (src_end.block.expect("unbacked source"), src_end.offset);
        let (mut dst_block, mut dst_off) =
            (dst_end.block.expect("unbacked destination"), dst_end.offset);
        let mut remaining = len;
        while remaining > 0 {
            if src_off == 0 {
                src_block = self
                    .list
                    .prev_of(src_block)
                    .expect("right shift ran before the region");
                src_off = N;
            }
            if dst_off == 0 {
                dst_block = self
                    .list
                    .prev_of(dst_block)
                    .expect("right shift ran before the region");
                dst_off = N;
            }
            let src_floor = if src_block == p_block { p.offset } else { 0 };
            let chunk = (src_off - src_floor).min(dst_off).min(remaining);
            debug_assert!(chunk > 0, "stuck right shift");
            self.copy_chunk(src_block, src_off - chunk, dst_block, dst_off - chunk, chunk);
            src_off -= chunk;
            dst_off -= chunk;
            remaining -= chunk;
        }
    }

    /// Shifts the `len` bytes at `[p+gap, p+gap+len)` left by `gap`, copying
    /// from the lowest address upward.
    fn shift_left(&mut self, p: Pos, gap: usize, len: usize) {
        if len == 0 {
            return;
        }
        let src_start = self.advance_pos(p, gap);
        let (mut src_block, mut src_off) =
            (src_start.block.expect("unbacked source"), src_start.offset);
        let (mut dst_block, mut dst_off) =
            (p.block.expect("shift on the null position"), p.offset);
        let mut remaining = len;
        while remaining > 0 {
            if src_off == N {
                src_block = self
                    .list
                    .next_of(src_block)
                    .expect("left shift ran past the region");
                src_off = 0;
            }
            if dst_off == N {
                dst_block = self
                    .list
                    .next_of(dst_block)
                    .expect("left shift ran past the region");
                dst_off = 0;
            }
            let chunk = (N - src_off).min(N - dst_off).min(remaining);
            debug_assert!(chunk > 0, "stuck left shift");
            self.copy_chunk(src_block, src_off, dst_block, dst_off, chunk);
            src_off += chunk;
            dst_off += chunk;
            remaining -= chunk;
        }
    }

    fn copy_chunk(
        &mut self,
        src_block: BlockIndex,
        src_off: usize,
        dst_block: BlockIndex,
        dst_off: usize,
        len: usize,
    ) {
        if src_block == dst_block {
            self.list
                .data_mut(src_block)
                .copy_within(src_off..src_off + len, dst_off);
        } else {
            let (src, dst) = self.list.two_data_mut(src_block, dst_block);
            dst[dst_off..dst_off + len].copy_from_slice(&src[src_off..src_off + len]);
        }
    }
}
