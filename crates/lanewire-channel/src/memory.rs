use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::block::Block;
use crate::error::Result;
use crate::lane::{JobSource, LanePair};
use crate::traits::{Channel, Direction};

/// Vector length cap used by [`MemoryChannel::new`].
pub const MEMORY_IOV_MAX: usize = 64;

/// An in-memory channel.
///
/// Reads copy from an inbox filled with [`MemoryChannel::feed`]; writes
/// append to an outbox drained with [`MemoryChannel::take_written`]. An empty
/// inbox reports `WouldBlock` until [`MemoryChannel::close`] is called, after
/// which it reports end of stream. A transfer limit simulates short reads
/// and writes.
pub struct MemoryChannel {
    lanes: LanePair,
    inbox: RefCell<BytesMut>,
    outbox: RefCell<BytesMut>,
    max_transfer: Cell<Option<usize>>,
    closed: Cell<bool>,
    iov_max: usize,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::with_iov_max(MEMORY_IOV_MAX)
    }

    pub fn with_iov_max(iov_max: usize) -> Self {
        Self {
            lanes: LanePair::new(),
            inbox: RefCell::new(BytesMut::new()),
            outbox: RefCell::new(BytesMut::new()),
            max_transfer: Cell::new(None),
            closed: Cell::new(false),
            iov_max: iov_max.max(1),
        }
    }

    /// Append bytes for the read lane to pick up.
    pub fn feed(&self, bytes: &[u8]) {
        self.inbox.borrow_mut().extend_from_slice(bytes);
    }

    /// Drain everything the write lane has produced so far.
    pub fn take_written(&self) -> Bytes {
        self.outbox.borrow_mut().split().freeze()
    }

    /// Bytes fed but not yet read.
    pub fn unread(&self) -> usize {
        self.inbox.borrow().len()
    }

    /// Limit the bytes moved by a single transfer. `None` removes the limit.
    pub fn set_max_transfer(&self, limit: Option<usize>) {
        self.max_transfer.set(limit);
    }

    /// Mark the inbox as finished: once drained, reads return `Ok(0)`.
    pub fn close(&self) {
        self.closed.set(true);
    }

    /// Run one transfer on `direction` with a caller-supplied vectored I/O
    /// function in place of the in-memory copy.
    pub fn transfer_with<F>(&self, direction: Direction, op: F) -> io::Result<usize>
    where
        F: FnOnce(&[Block]) -> io::Result<usize>,
    {
        self.lanes.transfer_with(direction, self.iov_max, op)
    }

    fn limit(&self) -> usize {
        self.max_transfer.get().unwrap_or(usize::MAX)
    }

    fn read_into(&self, iov: &[Block]) -> io::Result<usize> {
        if iov.is_empty() {
            return Ok(0);
        }
        let mut inbox = self.inbox.borrow_mut();
        if inbox.is_empty() {
            if self.closed.get() {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let mut room = self.limit().min(inbox.len());
        let mut moved = 0;
        for block in iov {
            if room == 0 {
                break;
            }
            let n = block.len().min(room);
            // SAFETY: read jobs reference writable, unaliased memory that
            // stays valid until the job completes.
            let dst = unsafe { block.as_mut_slice() };
            dst[..n].copy_from_slice(&inbox[..n]);
            inbox.advance(n);
            room -= n;
            moved += n;
        }
        trace!(bytes = moved, "memory channel read");
        Ok(moved)
    }

    fn write_from(&self, iov: &[Block]) -> io::Result<usize> {
        let mut outbox = self.outbox.borrow_mut();
        let mut room = self.limit();
        let mut moved = 0;
        for block in iov {
            if room == 0 {
                break;
            }
            // SAFETY: write jobs reference readable memory that stays valid
            // until the job completes.
            let src = unsafe { block.as_slice() };
            let n = src.len().min(room);
            outbox.extend_from_slice(&src[..n]);
            room -= n;
            moved += n;
        }
        trace!(bytes = moved, "memory channel write");
        Ok(moved)
    }
}

impl Channel for MemoryChannel {
    fn set_source(&self, direction: Direction, source: Rc<dyn JobSource>) -> Result<()> {
        self.lanes.set_source(direction, source)
    }

    fn unset_source(&self, direction: Direction) {
        self.lanes.unset_source(direction);
    }

    unsafe fn add_job(&self, direction: Direction, blocks: &[Block]) -> Result<()> {
        // SAFETY: forwarded from the caller.
        unsafe { self.lanes.add_job(direction, blocks) }
    }

    fn transfer(&self, direction: Direction) -> io::Result<usize> {
        self.transfer_with(direction, |iov| match direction {
            Direction::Read => self.read_into(iov),
            Direction::Write => self.write_from(iov),
        })
    }

    fn deliver_completions(&self, direction: Direction) {
        self.lanes.deliver_completions(direction);
    }

    fn queue_len(&self, direction: Direction) -> usize {
        self.lanes.queue_len(direction)
    }
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("unread", &self.inbox.borrow().len())
            .field("unwritten", &self.outbox.borrow().len())
            .field("max_transfer", &self.max_transfer.get())
            .field("closed", &self.closed.get())
            .field("lanes", &self.lanes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<usize>>, Rc<dyn JobSource>) {
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        (count, Rc::new(move |n: usize| sink.set(sink.get() + n)))
    }

    #[test]
    fn write_appends_to_outbox() {
        let channel = MemoryChannel::new();
        let (count, source) = counter();
        channel.set_source(Direction::Write, source).unwrap();
        // SAFETY: static data outlives the channel.
        unsafe {
            channel
                .add_job(Direction::Write, &[Block::from_slice(b"ab"), Block::from_slice(b"cd")])
                .unwrap();
        }
        assert_eq!(channel.write().unwrap(), 4);
        channel.deliver_completions(Direction::Write);
        assert_eq!(count.get(), 1);
        assert_eq!(&channel.take_written()[..], b"abcd");
        assert!(channel.take_written().is_empty());
    }

    #[test]
    fn max_transfer_splits_writes() {
        let channel = MemoryChannel::new();
        let (count, source) = counter();
        channel.set_source(Direction::Write, source).unwrap();
        channel.set_max_transfer(Some(3));
        // SAFETY: static data outlives the channel.
        unsafe {
            channel
                .add_job(Direction::Write, &[Block::from_slice(b"hello")])
                .unwrap();
        }
        assert_eq!(channel.write().unwrap(), 3);
        channel.deliver_completions(Direction::Write);
        assert_eq!(count.get(), 0);
        assert_eq!(channel.write().unwrap(), 2);
        channel.deliver_completions(Direction::Write);
        assert_eq!(count.get(), 1);
        assert_eq!(&channel.take_written()[..], b"hello");
    }

    #[test]
    fn empty_inbox_would_block_until_closed() {
        let channel = MemoryChannel::new();
        let (count, source) = counter();
        channel.set_source(Direction::Read, source).unwrap();
        let mut buf = [0u8; 3];
        // SAFETY: `buf` outlives the channel.
        unsafe {
            channel
                .add_job(Direction::Read, &[Block::from_mut_slice(&mut buf)])
                .unwrap();
        }
        let err = channel.read().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        channel.feed(b"xy");
        assert_eq!(channel.read().unwrap(), 2);
        channel.deliver_completions(Direction::Read);
        assert_eq!(count.get(), 0);

        channel.close();
        assert_eq!(channel.read().unwrap(), 0);
        channel.feed(b"z");
        assert_eq!(channel.read().unwrap(), 1);
        channel.deliver_completions(Direction::Read);
        assert_eq!(count.get(), 1);
        assert_eq!(&buf, b"xyz");
    }

    #[test]
    fn read_scatters_across_blocks() {
        let channel = MemoryChannel::new();
        let (count, source) = counter();
        channel.set_source(Direction::Read, source).unwrap();
        let mut a = [0u8; 2];
        let mut b = [0u8; 3];
        // SAFETY: both buffers outlive the channel.
        unsafe {
            channel
                .add_job(Direction::Read, &[Block::from_mut_slice(&mut a)])
                .unwrap();
            channel
                .add_job(Direction::Read, &[Block::from_mut_slice(&mut b)])
                .unwrap();
        }
        channel.feed(b"12345extra");
        assert_eq!(channel.read().unwrap(), 5);
        channel.deliver_completions(Direction::Read);
        assert_eq!(count.get(), 2);
        assert_eq!(&a, b"12");
        assert_eq!(&b, b"345");
        assert_eq!(channel.unread(), 5);
    }

    #[test]
    fn injected_transfer_is_accounted() {
        let channel = MemoryChannel::new();
        let (count, source) = counter();
        channel.set_source(Direction::Write, source).unwrap();
        // SAFETY: static data outlives the channel.
        unsafe {
            channel
                .add_job(Direction::Write, &[Block::from_slice(b"abc")])
                .unwrap();
            channel
                .add_job(Direction::Write, &[Block::from_slice(b"de")])
                .unwrap();
        }
        let moved = channel
            .transfer_with(Direction::Write, |iov| {
                assert_eq!(iov.len(), 2);
                Ok(4)
            })
            .unwrap();
        assert_eq!(moved, 4);
        channel.deliver_completions(Direction::Write);
        assert_eq!(count.get(), 1);
        assert_eq!(channel.queue_len(Direction::Write), 1);
        assert!(channel.take_written().is_empty());
    }
}
