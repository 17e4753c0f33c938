use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use lanewire_channel::{Block, Channel, Direction, JobSource};
use lanewire_msg::{get_blocks, Message};
use tracing::{debug, trace};

use crate::codec::{encode_preamble, FrameConfig};
use crate::error::Result;

/// A message in flight, kept alive until its write job completes.
#[derive(Debug)]
struct WriteJob {
    message: Message,
    preamble: Bytes,
}

#[derive(Debug, Default)]
struct WriterCore {
    jobs: RefCell<VecDeque<WriteJob>>,
}

impl JobSource for WriterCore {
    fn notify(&self, n_jobs: usize) {
        let mut jobs = self.jobs.borrow_mut();
        debug_assert!(n_jobs <= jobs.len(), "more completions than write jobs");
        let done = n_jobs.min(jobs.len());
        let bytes: usize = jobs
            .drain(..done)
            .map(|job| job.preamble.len() + job.message.payload_len())
            .sum();
        trace!(messages = done, bytes, "messages written");
    }
}

/// Serializes message trees onto a channel's write lane without copying.
///
/// Each message becomes exactly one job: its preamble block followed by the
/// data block of every non-empty node. The writer keeps the message and its
/// preamble alive until the lane reports the job complete.
///
/// The writer binds itself as the write lane's job source on creation and
/// unbinds on drop, discarding any messages still in flight.
pub struct MessageWriter {
    channel: Rc<dyn Channel>,
    core: Rc<WriterCore>,
    config: FrameConfig,
}

impl MessageWriter {
    /// Bind a writer with default configuration.
    pub fn new(channel: Rc<dyn Channel>) -> Result<Self> {
        Self::with_config(channel, FrameConfig::default())
    }

    /// Bind a writer with explicit configuration.
    pub fn with_config(channel: Rc<dyn Channel>, config: FrameConfig) -> Result<Self> {
        let core = Rc::new(WriterCore::default());
        channel.set_source(Direction::Write, Rc::clone(&core) as Rc<dyn JobSource>)?;
        debug!(?config, "message writer bound");
        Ok(Self {
            channel,
            core,
            config,
        })
    }

    /// Queue `msg` for sending as one write job.
    ///
    /// Nothing is written until the channel's write lane is driven.
    pub fn add_message(&self, msg: Message) -> Result<()> {
        let (preamble, nodes) = encode_preamble(&msg, &self.config)?;
        let mut blocks = Vec::with_capacity(nodes + 1);
        blocks.push(Block::from_slice(&preamble));
        blocks.extend(get_blocks(&msg, nodes));
        // SAFETY: the blocks reference `preamble` and the buffers of `msg`.
        // Both are moved into the job record below, which does not move
        // their heap storage and is released only when the lane reports
        // this job complete or the writer unbinds on drop.
        unsafe { self.channel.add_job(Direction::Write, &blocks)? };
        trace!(nodes, blocks = blocks.len(), "message queued");
        self.core.jobs.borrow_mut().push_back(WriteJob {
            message: msg,
            preamble,
        });
        Ok(())
    }

    /// Messages submitted but not yet reported written.
    pub fn queue_len(&self) -> usize {
        self.core.jobs.borrow().len()
    }

    /// The limits this writer enforces.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// The channel this writer is bound to.
    pub fn channel(&self) -> &Rc<dyn Channel> {
        &self.channel
    }
}

impl Drop for MessageWriter {
    fn drop(&mut self) {
        self.channel.unset_source(Direction::Write);
        debug!(discarded = self.queue_len(), "message writer unbound");
    }
}

impl std::fmt::Debug for MessageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWriter")
            .field("queued", &self.queue_len())
            .field("config", &self.config)
            .finish()
    }
}
