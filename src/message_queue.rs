// src/message_queue.rs
//! Variable-length-record ring buffer.
//!
//! A [`MessageQueue`] owns no storage of its own: it operates over a
//! caller-provided `&mut [u8]` arena, writing fixed-size headers and
//! variable-length payloads back to back, wrapping to the front of the
//! arena when a reservation would not fit before the end, and never
//! splitting a record across that boundary.

use core::fmt;

use crate::error::QueueError;
use crate::identity::Identity;

/// A monotonic tick count, as returned by a [`Clock`].
pub type Tick = u64;

/// A source of monotonic ticks, stamped into every sent record.
///
/// The crate ships no implementation: the caller supplies a system timer,
/// a test fake, or anything else that hands back a non-decreasing `u64`.
pub trait Clock {
    /// The current tick. Must never decrease between calls.
    fn now(&self) -> Tick;
}

#[derive(Clone, Copy)]
struct Header {
    message_id: Identity,
    size: u32,
    system_time: Tick,
    /// `None` marks this record a tombstone (logically deleted).
    interface_tag: Option<Identity>,
}

const HEADER_SIZE: usize = core::mem::size_of::<Header>();

/// # Safety
/// `pos..pos + HEADER_SIZE` must be within `arena`, and the bytes there must
/// have previously been written by [`write_header`] (never read arbitrary
/// caller-supplied bytes as a `Header`).
unsafe fn read_header(arena: &[u8], pos: usize) -> Header {
    // SAFETY: caller upholds the bounds/provenance contract above.
    unsafe { arena[pos..].as_ptr().cast::<Header>().read_unaligned() }
}

/// # Safety
/// `pos..pos + HEADER_SIZE` must be within `arena`.
unsafe fn write_header(arena: &mut [u8], pos: usize, header: Header) {
    // SAFETY: caller upholds the bounds contract above; `Header` is `Copy`
    // and contains no padding invariants beyond what `write_unaligned`
    // already double-checks via its type parameter.
    unsafe {
        arena[pos..].as_mut_ptr().cast::<Header>().write_unaligned(header);
    }
}

/// A wrap-around byte arena holding variable-length message records.
///
/// See the module docs for the layout. `MessageQueue` never allocates and
/// never frees the arena it is given; it is the caller's job to keep that
/// storage alive for as long as the queue (and anything it stamps with
/// [`Identity`] handles) is in use.
pub struct MessageQueue<'a> {
    arena: &'a mut [u8],
    /// Next free position.
    write: usize,
    /// Oldest unconsumed position.
    read: usize,
    /// Logical end of valid data when wrapped; equals `end` otherwise.
    wrap: usize,
    /// One past the last byte of the logical region (may be less than
    /// `arena.len()` when constructed via [`Self::with_capacity_records`]).
    end: usize,
    /// Bytes currently occupied by unread records (headers included).
    pending_bytes: usize,
}

impl<'a> MessageQueue<'a> {
    /// Initialize a queue over the whole of `arena`.
    #[must_use]
    pub fn new(arena: &'a mut [u8]) -> Self {
        let end = arena.len();
        Self { arena, write: 0, read: 0, wrap: end, end, pending_bytes: 0 }
    }

    /// Initialize a queue sized for `capacity_records` payload-less
    /// ("empty") records, a convenience mirroring the original's
    /// "capacity expressed in number of data-less messages" framing. Only
    /// the first `capacity_records * Self::empty_record_size()` bytes of
    /// `arena` are used; a larger `arena` is fine (and expected, in
    /// practice, when the queue will hold a mixture of record sizes).
    #[must_use]
    pub fn with_capacity_records(arena: &'a mut [u8], capacity_records: usize) -> Self {
        let end = (capacity_records * HEADER_SIZE).min(arena.len());
        Self { arena, write: 0, read: 0, wrap: end, end, pending_bytes: 0 }
    }

    /// The footprint of a payload-less record, i.e. `HEADER_SIZE`. Useful
    /// for callers sizing their own arena.
    #[must_use]
    pub const fn empty_record_size() -> usize {
        HEADER_SIZE
    }

    /// The logical capacity of this queue, in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.end
    }

    /// Bytes currently occupied by unread records.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Whether there is no unread record left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Reserve space for one record of `payload_size` bytes, returning the
    /// writable payload region. Does not make the record visible; call
    /// [`Self::send`] to commit it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Overrun`] (with no mutation at all, including
    /// no wrap bookkeeping) if committing this reservation would leave more
    /// bytes occupied than the queue's capacity — i.e. the producer would
    /// lap the reader.
    pub fn prepare(
        &mut self,
        message_id: Identity,
        payload_size: usize,
    ) -> Result<&mut [u8], QueueError> {
        let need = HEADER_SIZE + payload_size;

        let before = (self.write, self.read, self.wrap);

        // Wrap-then-write: a record is never split across `end`. Note this
        // decision is not reverted if the caller never follows up with
        // `send` — the tail fragment is wasted "for nothing" in that case,
        // exactly as the original design documents and accepts.
        if need > self.end - self.write {
            self.wrap = self.write;
            self.write = 0;
            // If the reader had fully caught up to the writer (queue
            // empty), there is no pending data stranded in the abandoned
            // tail: snap it to the base alongside the writer instead of
            // leaving it to dangle past the new wrap marker.
            if self.read == before.0 {
                self.read = 0;
            }
        }

        // Aggregate capacity check: catches the common case where total
        // unread bytes would exceed the arena outright.
        let aggregate_overrun = self.pending_bytes + need > self.end;

        // Cursor check: the aggregate count above doesn't know about a
        // wasted tail fragment left behind by an earlier wrap (bytes that
        // are neither pending data nor reusable until the reader works
        // past them), so it alone can under-count how full the queue
        // really is. Once `write` sits at or behind `read` (we're writing
        // into the same low region the reader hasn't finished draining —
        // as opposed to the normal case of `write` pulling ahead of
        // `read`), the new record must not reach as far as `read` itself.
        let would_lap_reader = !self.is_empty() && self.write <= self.read && need > self.read - self.write;

        if aggregate_overrun || would_lap_reader {
            // Roll back the speculative wrap bookkeeping above: this
            // reservation never happened.
            (self.write, self.read, self.wrap) = before;
            log::debug!(
                "queue overrun: need {need}B, {pending}B pending of {cap}B capacity",
                pending = self.pending_bytes,
                cap = self.end,
            );
            return Err(QueueError::Overrun);
        }

        if self.wrap != before.2 {
            log::trace!("queue wrapped: write {} -> 0 (old tail at {})", before.0, self.wrap);
        }

        let pos = self.write;
        let header = Header { message_id, size: payload_size as u32, system_time: 0, interface_tag: None };
        // SAFETY: `pos..pos + need` fits before `self.end <= self.arena.len()`
        // by the check above, and `need >= HEADER_SIZE`.
        unsafe { write_header(&mut *self.arena, pos, header) };

        Ok(&mut self.arena[pos + HEADER_SIZE..pos + need])
    }

    /// Commit the record most recently returned by [`Self::prepare`],
    /// stamping `system_time` from `clock` and `interface_tag` from
    /// `interface`.
    pub fn send(&mut self, clock: &impl Clock, interface: Identity) {
        self.commit(clock.now(), interface);
    }

    fn commit(&mut self, system_time: Tick, interface_tag: Identity) {
        let pos = self.write;
        // SAFETY: the header at `pos` was fully written by the most recent
        // `prepare` call, which is the only thing that can move `write`
        // forward without first calling `commit`.
        let mut header = unsafe { read_header(&*self.arena, pos) };
        header.system_time = system_time;
        header.interface_tag = Some(interface_tag);
        // SAFETY: same region just read from.
        unsafe { write_header(&mut *self.arena, pos, header) };

        let consumed = HEADER_SIZE + header.size as usize;
        self.pending_bytes += consumed;
        self.write = self.advance(pos, consumed);
    }

    /// Step `read` past the current record. A no-op on an empty queue.
    pub fn advance_read(&mut self) {
        if self.is_empty() {
            return;
        }
        let pos = self.read;
        // SAFETY: a committed record header lies at every position between
        // `read` (exclusive of `write`) and `write`.
        let header = unsafe { read_header(&*self.arena, pos) };
        let consumed = HEADER_SIZE + header.size as usize;
        self.pending_bytes = self.pending_bytes.saturating_sub(consumed);
        self.read = self.advance(pos, consumed);
    }

    /// Shared wrap-reset rule for both cursors: advancing a cursor that
    /// crosses `wrap` retires the wrap marker, and landing exactly on `end`
    /// snaps back to the arena base.
    fn advance(&mut self, pos: usize, consumed: usize) -> usize {
        let mut next = pos + consumed;
        if next > self.wrap {
            self.wrap = self.end;
        }
        if next == self.end {
            next = 0;
        }
        next
    }

    /// Copy every non-tombstone record from `self` into `destination`,
    /// preserving the original `system_time` and `interface_tag` rather
    /// than re-stamping them. Tombstones are dropped. `self`'s read cursor
    /// advances past every visited record (tombstone or not), so `self` is
    /// empty when this returns `Ok`.
    ///
    /// # Errors
    ///
    /// If `destination` cannot hold the next surviving record,
    /// [`QueueError::Overrun`] is returned immediately: that record (and
    /// everything after it) remains unconsumed in `self`, and nothing
    /// further is copied.
    pub fn copy_all(&mut self, destination: &mut MessageQueue<'_>) -> Result<(), QueueError> {
        while !self.is_empty() {
            let pos = self.read;
            // SAFETY: a committed record header lies at `read` while the
            // queue is non-empty.
            let header = unsafe { read_header(&*self.arena, pos) };
            if let Some(tag) = header.interface_tag {
                let payload_size = header.size as usize;
                let dst = destination.prepare(header.message_id, payload_size)?;
                dst.copy_from_slice(&self.arena[pos + HEADER_SIZE..pos + HEADER_SIZE + payload_size]);
                destination.commit(header.system_time, tag);
            }
            self.advance_read();
        }
        Ok(())
    }

    /// Clear the `interface_tag` of the record at `pos`, turning it into a
    /// tombstone in place. Test-only: production code has no business
    /// reaching into an already-committed record.
    #[cfg(test)]
    fn tombstone_at(&mut self, pos: usize) {
        let mut header = unsafe { read_header(&*self.arena, pos) };
        header.interface_tag = None;
        unsafe { write_header(&mut *self.arena, pos, header) };
    }

    /// The payload size of the record currently at `read`. Test-only.
    #[cfg(test)]
    fn peek_payload_size(&self) -> u32 {
        let header = unsafe { read_header(&*self.arena, self.read) };
        header.size
    }
}

impl fmt::Debug for MessageQueue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue")
            .field("write", &self.write)
            .field("read", &self.read)
            .field("wrap", &self.wrap)
            .field("end", &self.end)
            .field("pending_bytes", &self.pending_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{format, vec};

    struct FakeClock {
        tick: core::cell::Cell<Tick>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self { tick: core::cell::Cell::new(0) }
        }
        fn advance(&self) -> Tick {
            let t = self.tick.get() + 1;
            self.tick.set(t);
            t
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Tick {
            self.advance()
        }
    }

    static MSG_A: Identity = Identity::new("MsgA");
    static MSG_B: Identity = Identity::new("MsgB");
    static IF_X: Identity = Identity::new("IfX");

    fn send_record(q: &mut MessageQueue<'_>, clock: &FakeClock, id: Identity, payload: &[u8]) {
        let dst = q.prepare(id, payload.len()).expect("prepare");
        dst.copy_from_slice(payload);
        q.send(clock, IF_X);
    }

    #[test]
    fn fresh_queue_is_empty() {
        let mut arena = [0u8; 256];
        let q = MessageQueue::new(&mut arena);
        assert!(q.is_empty());
        assert_eq!(q.pending_bytes(), 0);
    }

    #[test]
    fn prepare_send_advances_write_and_pending_bytes() {
        let mut arena = [0u8; 256];
        let mut q = MessageQueue::new(&mut arena);
        let clock = FakeClock::new();

        send_record(&mut q, &clock, MSG_A, b"hi");
        assert!(!q.is_empty());
        assert_eq!(q.pending_bytes(), MessageQueue::empty_record_size() + 2);

        q.advance_read();
        assert!(q.is_empty());
        assert_eq!(q.pending_bytes(), 0);
    }

    #[test]
    fn exact_fit_does_not_wrap() {
        let stride = MessageQueue::empty_record_size();
        let mut arena = vec![0u8; stride * 2];
        let mut q = MessageQueue::new(&mut arena);
        let clock = FakeClock::new();

        // Consume the whole queue with one empty-payload record: need ==
        // end - write exactly for the *second* record slot, which must not
        // trigger a wrap.
        send_record(&mut q, &clock, MSG_A, b"");
        let _ = q.prepare(MSG_B, 0).expect("fits exactly, no wrap");
        assert_eq!(q.wrap, q.end, "an exact fit must not move the wrap marker");
    }

    #[test]
    fn one_byte_over_triggers_wrap_and_snaps_read() {
        let stride = MessageQueue::empty_record_size();
        // Room for one empty record plus one byte of slack before `end`.
        let mut arena = vec![0u8; stride + 1];
        let mut q = MessageQueue::new(&mut arena);
        let clock = FakeClock::new();

        send_record(&mut q, &clock, MSG_A, b"");
        q.advance_read(); // read == write == stride, wrap == end == stride+1

        // Now reserving anything forces a wrap because `need` (stride) does
        // not fit in the one remaining byte before `end`.
        let _ = q.prepare(MSG_B, 0).expect("prepare after forced wrap");
        // The reader, which was sitting exactly at the old wrap position,
        // must have snapped to the arena base alongside the writer.
        assert_eq!(q.read, 0);
        assert_eq!(q.write, 0);
    }

    #[test]
    fn wrap_that_would_overwrite_unread_tail_record_is_rejected() {
        let stride = MessageQueue::empty_record_size();
        // Sized so a wrapping reservation can land inside a still-unread
        // record's span rather than only free space: record A (no payload)
        // then B (10 bytes, 0xBB-filled) leave B unread after A is
        // consumed. The aggregate occupancy count alone doesn't see the
        // wasted tail a wrap would wrap around first, so without the
        // cursor-position check this reservation would have clobbered B.
        let mut arena = vec![0u8; stride * 4 + 10];
        let mut q = MessageQueue::new(&mut arena);
        let clock = FakeClock::new();

        send_record(&mut q, &clock, MSG_A, b"");
        send_record(&mut q, &clock, MSG_A, &[0xBBu8; 10]);
        let b_pos = stride;
        q.advance_read(); // A consumed; B, still unread, now sits at the tail.

        let before = format!("{q:?}");
        // Large enough to force a wrap, and to reach past `read` into B's
        // span once wrapped — must be rejected rather than overwrite B.
        let payload = stride + 30;
        let err = q.prepare(MSG_B, payload).unwrap_err();
        assert_eq!(err, QueueError::Overrun);
        assert_eq!(format!("{q:?}"), before, "a rejected reservation must not mutate cursors");
        assert_eq!(
            &q.arena[b_pos + HEADER_SIZE..b_pos + HEADER_SIZE + 10],
            [0xBBu8; 10],
            "B's payload must survive a rejected reservation untouched"
        );
    }

    #[test]
    fn overrun_is_detected_and_rejects_without_mutation() {
        let stride = MessageQueue::empty_record_size();
        let mut arena = vec![0u8; stride * 2];
        let mut q = MessageQueue::new(&mut arena);
        let clock = FakeClock::new();

        send_record(&mut q, &clock, MSG_A, b"");
        send_record(&mut q, &clock, MSG_A, b"");
        // Both slots are now occupied and unread: a third reservation must
        // overrun rather than silently clobber unread data.
        let before = format!("{q:?}");
        let err = q.prepare(MSG_B, 0).unwrap_err();
        assert_eq!(err, QueueError::Overrun);
        assert_eq!(format!("{q:?}"), before, "a rejected reservation must not mutate cursors");
    }

    #[test]
    fn copy_all_skips_tombstones_and_preserves_stamps() {
        let stride = MessageQueue::empty_record_size();
        let mut src_arena = vec![0u8; (stride + 4) * 4];
        let mut dst_arena = vec![0u8; (stride + 4) * 4];
        let mut src = MessageQueue::new(&mut src_arena);
        let mut dst = MessageQueue::new(&mut dst_arena);
        let clock = FakeClock::new();

        send_record(&mut src, &clock, MSG_A, b"aa");
        let tombstoned_at = src.write;
        send_record(&mut src, &clock, MSG_B, b"");
        send_record(&mut src, &clock, MSG_A, b"bb");

        // Tombstone the middle record in place, as an external "delete"
        // would: clear its `interface_tag` without touching its header's
        // other fields or the surrounding cursors.
        src.tombstone_at(tombstoned_at);

        src.copy_all(&mut dst).expect("destination has room for both survivors");
        assert!(src.is_empty(), "copy_all must drain the source, tombstones included");

        // Both surviving records made it across in order; the second
        // record (deleted) produced no entry in `dst`.
        assert_eq!(dst.pending_bytes(), 2 * (stride + 2));
        let mut seen = vec![];
        while !dst.is_empty() {
            seen.push(dst.peek_payload_size());
            dst.advance_read();
        }
        assert_eq!(seen, vec![2, 2]);
    }

    #[test]
    fn copy_all_overrun_leaves_remainder_in_source() {
        let stride = MessageQueue::empty_record_size();
        let mut src_arena = vec![0u8; (stride) * 4];
        let mut dst_arena = vec![0u8; stride]; // room for exactly one record
        let mut src = MessageQueue::new(&mut src_arena);
        let mut dst = MessageQueue::new(&mut dst_arena);
        let clock = FakeClock::new();

        send_record(&mut src, &clock, MSG_A, b"");
        send_record(&mut src, &clock, MSG_B, b"");

        let err = src.copy_all(&mut dst).unwrap_err();
        assert_eq!(err, QueueError::Overrun);
        assert!(!src.is_empty(), "the record that didn't fit must remain in source");
        assert_eq!(dst.pending_bytes(), stride, "the first record still made it across");
    }
}
