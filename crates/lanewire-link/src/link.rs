use std::io::{self, ErrorKind};
use std::rc::Rc;

use lanewire_channel::{Channel, Direction};
use lanewire_frame::{DecodeError, FrameConfig, MessageReader, MessageWriter, ReaderState};
use lanewire_msg::Message;
use tracing::{debug, trace};

use crate::error::{LinkError, Result};

/// Snapshot of a link's queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    /// Messages submitted but not yet fully written.
    pub pending_writes: usize,
    /// Decoded messages waiting to be received, or why decoding stopped.
    pub received: std::result::Result<usize, DecodeError>,
    /// Current stage of the incoming decoder.
    pub reader_state: ReaderState,
}

/// A message writer and reader sharing one channel.
///
/// `send` and `receive` never touch the transport; the channel is driven
/// by [`Link::poll_write`] and [`Link::poll_read`] from an event loop, or by
/// the blocking helpers [`Link::flush`] and [`Link::recv_blocking`] when
/// the underlying descriptor is in blocking mode.
pub struct Link {
    writer: MessageWriter,
    reader: MessageReader,
    channel: Rc<dyn Channel>,
}

impl Link {
    /// Bind a writer and a reader to `channel` with default configuration.
    pub fn new(channel: Rc<dyn Channel>) -> Result<Self> {
        Self::with_config(channel, FrameConfig::default())
    }

    /// Bind a writer and a reader to `channel` with explicit limits.
    ///
    /// Fails if either lane already has a job source.
    pub fn with_config(channel: Rc<dyn Channel>, config: FrameConfig) -> Result<Self> {
        let writer = MessageWriter::with_config(Rc::clone(&channel), config)?;
        let reader = MessageReader::with_config(Rc::clone(&channel), config)?;
        debug!("link established");
        Ok(Self {
            writer,
            reader,
            channel,
        })
    }

    /// Wrap a connected Unix stream in an fd-backed channel.
    #[cfg(unix)]
    pub fn from_stream(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        Self::from_stream_with_config(stream, FrameConfig::default())
    }

    /// Wrap a connected Unix stream with explicit limits.
    #[cfg(unix)]
    pub fn from_stream_with_config(
        stream: std::os::unix::net::UnixStream,
        config: FrameConfig,
    ) -> Result<Self> {
        Self::with_config(lanewire_channel::FdChannel::shared(stream), config)
    }

    /// Queue a message for sending.
    pub fn send(&self, msg: Message) -> Result<()> {
        self.writer.add_message(msg)?;
        Ok(())
    }

    /// Take the oldest received message, if any.
    pub fn receive(&self) -> Option<Message> {
        self.reader.pop_message()
    }

    /// Current queue lengths and decoder stage.
    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            pending_writes: self.writer.queue_len(),
            received: self.reader.queue_len(),
            reader_state: self.reader.state(),
        }
    }

    /// Messages submitted but not yet fully written.
    pub fn pending_writes(&self) -> usize {
        self.writer.queue_len()
    }

    /// The shared channel.
    pub fn channel(&self) -> &Rc<dyn Channel> {
        &self.channel
    }

    /// Run one write transfer and deliver any completions.
    ///
    /// Transport errors, including `WouldBlock`, are returned unmodified.
    pub fn poll_write(&self) -> io::Result<usize> {
        let moved = self.channel.write()?;
        self.channel.deliver_completions(Direction::Write);
        Ok(moved)
    }

    /// Run one read transfer and deliver any completions.
    ///
    /// Returns `Ok(0)` without touching the transport once the reader has
    /// stopped. Transport errors are returned unmodified.
    pub fn poll_read(&self) -> io::Result<usize> {
        if self.reader.state() == ReaderState::Error {
            return Ok(0);
        }
        let moved = self.channel.read()?;
        self.channel.deliver_completions(Direction::Read);
        Ok(moved)
    }

    /// Write until every queued message has been sent.
    ///
    /// Intended for blocking descriptors; on a non-blocking one this spins.
    pub fn flush(&self) -> Result<()> {
        while self.pending_writes() > 0 {
            match self.poll_write() {
                Ok(0) => return Err(LinkError::Disconnected),
                Ok(n) => trace!(bytes = n, "flushed"),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
        Ok(())
    }

    /// Read until a whole message has been decoded and return it.
    ///
    /// Returns [`LinkError::Disconnected`] at end of stream and
    /// [`LinkError::Desynchronized`] once the reader has stopped.
    pub fn recv_blocking(&self) -> Result<Message> {
        loop {
            if let Some(msg) = self.receive() {
                return Ok(msg);
            }
            if let Some(err) = self.reader.error() {
                return Err(LinkError::Desynchronized(err));
            }
            match self.poll_read() {
                Ok(0) => return Err(LinkError::Disconnected),
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
    }

    /// Send one message and block until it is written.
    pub fn send_blocking(&self, msg: Message) -> Result<()> {
        self.send(msg)?;
        self.flush()
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("writer", &self.writer)
            .field("reader", &self.reader)
            .finish()
    }
}
