//! Job lanes: one direction of a channel with job-granular completion.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::block::{Block, BlockQueue};
use crate::error::{ChannelError, Result};
use crate::traits::Direction;

/// The producer or consumer bound to a lane.
///
/// A source learns about progress only through batched completion counts:
/// `notify(k)` means the `k` oldest outstanding jobs it submitted are done.
pub trait JobSource {
    /// Report that `n_jobs` more jobs completed, in submission order.
    fn notify(&self, n_jobs: usize);
}

impl<F: Fn(usize)> JobSource for F {
    fn notify(&self, n_jobs: usize) {
        self(n_jobs)
    }
}

/// One direction of a channel.
///
/// A lane pairs a [`BlockQueue`] with a queue of per-job block counts. The
/// sum of the job counts always equals the number of queued blocks, and a
/// lane without jobs holds no blocks.
pub struct Lane {
    direction: Direction,
    source: Option<Rc<dyn JobSource>>,
    blocks: BlockQueue,
    jobs: VecDeque<usize>,
    pending: usize,
}

impl Lane {
    /// Create a disabled lane.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            source: None,
            blocks: BlockQueue::new(),
            jobs: VecDeque::new(),
            pending: 0,
        }
    }

    /// The direction this lane moves bytes in.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether a job source is bound.
    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    /// Bind a job source. Fails if one is already bound.
    pub fn enable(&mut self, source: Rc<dyn JobSource>) -> Result<()> {
        if self.source.is_some() {
            return Err(ChannelError::SourceAlreadyBound {
                direction: self.direction,
            });
        }
        self.source = Some(source);
        self.pending = 0;
        debug!(direction = %self.direction, "lane enabled");
        Ok(())
    }

    /// Unbind the source and discard all queued jobs without notifying.
    ///
    /// This is a hard abort: partial progress on in-flight jobs is lost. The
    /// unbound source is returned so the caller controls when it is dropped.
    pub fn disable(&mut self) -> Option<Rc<dyn JobSource>> {
        let source = self.source.take()?;
        debug!(
            direction = %self.direction,
            discarded_jobs = self.jobs.len(),
            "lane disabled"
        );
        self.blocks.clear();
        self.jobs.clear();
        self.pending = 0;
        Some(source)
    }

    /// Queue a job made of `blocks`. Zero blocks is a valid, empty job.
    ///
    /// # Safety
    ///
    /// Every block must stay valid until the job is reported complete or the
    /// lane is disabled: readable for a write lane, writable and otherwise
    /// unaliased for a read lane.
    pub unsafe fn submit(&mut self, blocks: &[Block]) -> Result<()> {
        if self.source.is_none() {
            return Err(ChannelError::NoJobSource {
                direction: self.direction,
            });
        }
        self.blocks.extend_from_slice(blocks);
        self.jobs.push_back(blocks.len());
        Ok(())
    }

    /// Account for `n_bytes` moved by a transfer.
    ///
    /// Whole blocks are popped from the block queue; the job queue is then
    /// walked from the front, retiring every job whose blocks are all gone. A
    /// partially covered job keeps its reduced block count in place. Returns
    /// the number of jobs retired by this call; they are also added to the
    /// pending-completion counter.
    pub fn consume(&mut self, n_bytes: usize) -> usize {
        let blocks_done = self.blocks.pop_bytes(n_bytes);
        let mut remaining = blocks_done;
        let mut jobs_done = 0;
        while let Some(front) = self.jobs.front_mut() {
            if *front > remaining {
                *front -= remaining;
                remaining = 0;
                break;
            }
            remaining -= *front;
            self.jobs.pop_front();
            jobs_done += 1;
        }
        debug_assert_eq!(remaining, 0, "blocks consumed beyond queued jobs");
        self.pending += jobs_done;
        trace!(
            direction = %self.direction,
            bytes = n_bytes,
            blocks = blocks_done,
            jobs = jobs_done,
            "transfer accounted"
        );
        jobs_done
    }

    /// Run one vectored transfer over the queued blocks.
    ///
    /// `op` receives at most `iov_max` blocks from the front of the queue. A
    /// successful byte count is fed into [`Lane::consume`]; an error is
    /// returned untouched and leaves the lane as it was.
    ///
    /// # Panics
    ///
    /// Panics if no job source is bound. Driving a disabled lane is a
    /// contract violation.
    pub fn transfer<F>(&mut self, iov_max: usize, op: F) -> io::Result<usize>
    where
        F: FnOnce(&[Block]) -> io::Result<usize>,
    {
        assert!(self.is_enabled(), "no job source on {} lane", self.direction);
        let count = self.blocks.len().min(iov_max);
        let moved = op(&self.blocks.as_slice()[..count])?;
        self.consume(moved);
        Ok(moved)
    }

    /// Take the pending completion count together with the source to notify.
    ///
    /// Returns `None` when nothing completed. Channels that keep lanes behind
    /// a `RefCell` use this to call `notify` after releasing the borrow, so
    /// the source may submit its next job from inside `notify`.
    pub fn take_completions(&mut self) -> Option<(usize, Rc<dyn JobSource>)> {
        if self.pending == 0 {
            return None;
        }
        let source = Rc::clone(self.source.as_ref()?);
        let count = std::mem::take(&mut self.pending);
        Some((count, source))
    }

    /// Notify the bound source once with all completions accumulated since
    /// the last delivery.
    pub fn deliver_completions(&mut self) {
        if let Some((count, source)) = self.take_completions() {
            source.notify(count);
        }
    }

    /// Jobs not yet fully transferred.
    pub fn queue_len(&self) -> usize {
        self.jobs.len()
    }

    /// Completions accumulated but not yet delivered.
    pub fn pending_completions(&self) -> usize {
        self.pending
    }

    /// The queued blocks, front first.
    pub fn blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    /// Remaining block counts of the queued jobs, oldest first.
    pub fn job_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.jobs.iter().copied()
    }
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("direction", &self.direction)
            .field("enabled", &self.is_enabled())
            .field("blocks", &self.blocks.len())
            .field("jobs", &self.jobs.len())
            .field("pending", &self.pending)
            .finish()
    }
}

/// The read and write lanes of a channel, with the bookkeeping every
/// [`Channel`](crate::Channel) implementation shares.
#[derive(Debug)]
pub struct LanePair {
    read: RefCell<Lane>,
    write: RefCell<Lane>,
}

impl Default for LanePair {
    fn default() -> Self {
        Self::new()
    }
}

impl LanePair {
    /// Create two disabled lanes.
    pub fn new() -> Self {
        Self {
            read: RefCell::new(Lane::new(Direction::Read)),
            write: RefCell::new(Lane::new(Direction::Write)),
        }
    }

    /// The lane for `direction`.
    pub fn lane(&self, direction: Direction) -> &RefCell<Lane> {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }

    pub fn set_source(&self, direction: Direction, source: Rc<dyn JobSource>) -> Result<()> {
        self.lane(direction).borrow_mut().enable(source)
    }

    pub fn unset_source(&self, direction: Direction) {
        let source = self.lane(direction).borrow_mut().disable();
        drop(source);
    }

    /// # Safety
    ///
    /// See [`Lane::submit`].
    pub unsafe fn add_job(&self, direction: Direction, blocks: &[Block]) -> Result<()> {
        // SAFETY: forwarded from the caller.
        unsafe { self.lane(direction).borrow_mut().submit(blocks) }
    }

    pub fn transfer_with<F>(&self, direction: Direction, iov_max: usize, op: F) -> io::Result<usize>
    where
        F: FnOnce(&[Block]) -> io::Result<usize>,
    {
        self.lane(direction).borrow_mut().transfer(iov_max, op)
    }

    pub fn deliver_completions(&self, direction: Direction) {
        let taken = self.lane(direction).borrow_mut().take_completions();
        if let Some((count, source)) = taken {
            source.notify(count);
        }
    }

    pub fn queue_len(&self, direction: Direction) -> usize {
        self.lane(direction).borrow().queue_len()
    }
}
