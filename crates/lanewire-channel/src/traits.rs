use std::fmt;
use std::io;
use std::rc::Rc;

use crate::block::Block;
use crate::error::Result;
use crate::lane::JobSource;

/// Which lane of a channel an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes flow from the transport into submitted blocks.
    Read,
    /// Bytes flow from submitted blocks into the transport.
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// A bidirectional byte transport driven through job lanes.
///
/// Each direction accepts jobs from exactly one bound [`JobSource`] and
/// reports their completion in submission order. Transfers never block
/// inside the channel; whoever drives the channel decides when to call
/// [`Channel::transfer`] and when to flush completions with
/// [`Channel::deliver_completions`].
///
/// Callers hold channels as `Rc<dyn Channel>`; the fd-backed and in-memory
/// implementations are interchangeable.
pub trait Channel {
    /// Bind the job source for `direction`. Fails if one is already bound.
    fn set_source(&self, direction: Direction, source: Rc<dyn JobSource>) -> Result<()>;

    /// Unbind the source for `direction`, discarding its queued jobs without
    /// notification. A no-op on a disabled lane.
    fn unset_source(&self, direction: Direction);

    /// Queue one job made of `blocks` on the `direction` lane.
    ///
    /// # Safety
    ///
    /// Every block must stay valid until the job is reported complete or the
    /// lane is disabled: readable for [`Direction::Write`], writable and
    /// otherwise unaliased for [`Direction::Read`].
    unsafe fn add_job(&self, direction: Direction, blocks: &[Block]) -> Result<()>;

    /// Attempt one vectored transfer on the `direction` lane.
    ///
    /// Returns the bytes moved, which may be zero. Transport errors,
    /// including `WouldBlock`, are returned unmodified and leave the lane
    /// untouched.
    ///
    /// # Panics
    ///
    /// Panics if the lane has no job source.
    fn transfer(&self, direction: Direction) -> io::Result<usize>;

    /// Notify the `direction` source of every job completed since the last
    /// delivery, in a single call.
    fn deliver_completions(&self, direction: Direction);

    /// Jobs on the `direction` lane that are not yet fully transferred.
    fn queue_len(&self, direction: Direction) -> usize;

    /// Transfer on the read lane.
    fn read(&self) -> io::Result<usize> {
        self.transfer(Direction::Read)
    }

    /// Transfer on the write lane.
    fn write(&self) -> io::Result<usize> {
        self.transfer(Direction::Write)
    }
}
