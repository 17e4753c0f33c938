use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use lanewire_channel::{Block, Channel, Direction, JobSource};
use lanewire_msg::{alloc_by_layout, get_blocks_mut, Message, PartialMessage};
use tracing::{debug, trace, warn};

use crate::codec::{check_node_count, decode_layout, decode_word, FrameConfig, WORD_SIZE};
use crate::error::{DecodeError, Result};

/// Stage of the incremental decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Waiting for the 4-byte node count of the next message.
    ReadSize,
    /// Waiting for the layout words.
    ReadLayout,
    /// Waiting for the payload of a pre-allocated message.
    ReadPayload,
    /// Decoding stopped; the stream is desynchronized.
    Error,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReaderState::ReadSize => "read-size",
            ReaderState::ReadLayout => "read-layout",
            ReaderState::ReadPayload => "read-payload",
            ReaderState::Error => "error",
        };
        f.write_str(name)
    }
}

struct ReaderInner {
    state: ReaderState,
    size: Box<[u8; WORD_SIZE]>,
    node_count: usize,
    layout: Vec<u8>,
    pending: Option<PartialMessage>,
    decoded: VecDeque<Message>,
    error: Option<DecodeError>,
}

struct ReaderCore {
    channel: Rc<dyn Channel>,
    config: FrameConfig,
    inner: RefCell<ReaderInner>,
}

impl ReaderCore {
    /// Queue one read job. The blocks must point into buffers owned by
    /// `inner` that are left untouched until the job completes.
    fn submit(&self, blocks: &[Block]) -> std::result::Result<(), DecodeError> {
        // SAFETY: every caller passes blocks referencing heap buffers held
        // by the reader (the boxed size word, the layout vector, or the
        // pending message), none of which is accessed or reallocated until
        // this job is reported complete or the read lane is unbound.
        unsafe { self.channel.add_job(Direction::Read, blocks)? };
        Ok(())
    }

    fn read_size(&self, inner: &mut ReaderInner) -> std::result::Result<(), DecodeError> {
        inner.state = ReaderState::ReadSize;
        *inner.size = [0; WORD_SIZE];
        self.submit(&[Block::from_mut_slice(&mut inner.size[..])])
    }

    fn advance(&self, inner: &mut ReaderInner) -> std::result::Result<(), DecodeError> {
        match inner.state {
            ReaderState::ReadSize => {
                let nodes = decode_word(*inner.size) as usize;
                check_node_count(nodes, &self.config)?;
                let words = nodes;
                inner.layout.clear();
                inner
                    .layout
                    .try_reserve_exact(words * WORD_SIZE)
                    .map_err(|_| DecodeError::AllocationFailed { words })?;
                inner.layout.resize(words * WORD_SIZE, 0);
                inner.node_count = nodes;
                inner.state = ReaderState::ReadLayout;
                trace!(nodes, "node count received");
                self.submit(&[Block::from_mut_slice(&mut inner.layout)])
            }
            ReaderState::ReadLayout => {
                let layout = decode_layout(&inner.layout);
                let mut message = alloc_by_layout(&layout, self.config.max_message_size)?;
                let blocks = get_blocks_mut(&mut message, inner.node_count);
                if blocks.is_empty() {
                    trace!(nodes = inner.node_count, "empty message decoded");
                    inner.decoded.push_back(message.freeze());
                    return self.read_size(inner);
                }
                inner.pending = Some(message);
                inner.state = ReaderState::ReadPayload;
                trace!(blocks = blocks.len(), "layout received");
                self.submit(&blocks)
            }
            ReaderState::ReadPayload => {
                if let Some(message) = inner.pending.take() {
                    inner.decoded.push_back(message.freeze());
                }
                trace!(queued = inner.decoded.len(), "message decoded");
                self.read_size(inner)
            }
            ReaderState::Error => Ok(()),
        }
    }

    fn fail(&self, inner: &mut ReaderInner, err: DecodeError) {
        warn!(state = %inner.state, error = %err, "message reader entered error state");
        inner.state = ReaderState::Error;
        inner.pending = None;
        inner.layout = Vec::new();
        inner.error = Some(err);
    }
}

impl JobSource for ReaderCore {
    fn notify(&self, n_jobs: usize) {
        let mut inner = self.inner.borrow_mut();
        for _ in 0..n_jobs {
            if inner.state == ReaderState::Error {
                break;
            }
            if let Err(err) = self.advance(&mut inner) {
                self.fail(&mut inner, err);
            }
        }
    }
}

/// Reconstructs message trees from a channel's read lane.
///
/// The reader keeps exactly one read job outstanding. It first asks for a
/// node count, then for that many layout words, then for the payload straight
/// into a tree allocated from the layout. A message with no payload bytes
/// skips the last step.
///
/// Decoded messages queue up until taken with [`MessageReader::pop_message`].
/// A malformed stream moves the reader to [`ReaderState::Error`], after which
/// it submits no further jobs and [`MessageReader::queue_len`] reports the
/// cause.
///
/// The reader binds itself as the read lane's job source on creation and
/// unbinds on drop.
pub struct MessageReader {
    core: Rc<ReaderCore>,
}

impl MessageReader {
    /// Bind a reader with default configuration.
    pub fn new(channel: Rc<dyn Channel>) -> Result<Self> {
        Self::with_config(channel, FrameConfig::default())
    }

    /// Bind a reader with explicit configuration and queue the first job.
    pub fn with_config(channel: Rc<dyn Channel>, config: FrameConfig) -> Result<Self> {
        let core = Rc::new(ReaderCore {
            channel: Rc::clone(&channel),
            config,
            inner: RefCell::new(ReaderInner {
                state: ReaderState::ReadSize,
                size: Box::new([0; WORD_SIZE]),
                node_count: 0,
                layout: Vec::new(),
                pending: None,
                decoded: VecDeque::new(),
                error: None,
            }),
        });
        channel.set_source(Direction::Read, Rc::clone(&core) as Rc<dyn JobSource>)?;
        let reader = Self { core };
        {
            let core = &reader.core;
            let mut inner = core.inner.borrow_mut();
            if let Err(err) = core.read_size(&mut inner) {
                core.fail(&mut inner, err);
            }
        }
        debug!(?config, "message reader bound");
        Ok(reader)
    }

    /// Take the oldest decoded message, if any.
    pub fn pop_message(&self) -> Option<Message> {
        self.core.inner.borrow_mut().decoded.pop_front()
    }

    /// Number of decoded messages waiting, or the reason decoding stopped.
    pub fn queue_len(&self) -> std::result::Result<usize, DecodeError> {
        let inner = self.core.inner.borrow();
        match &inner.error {
            Some(err) => Err(err.clone()),
            None => Ok(inner.decoded.len()),
        }
    }

    /// Current decoder stage.
    pub fn state(&self) -> ReaderState {
        self.core.inner.borrow().state
    }

    /// The reason decoding stopped, if it has.
    pub fn error(&self) -> Option<DecodeError> {
        self.core.inner.borrow().error.clone()
    }

    /// The limits this reader enforces.
    pub fn config(&self) -> &FrameConfig {
        &self.core.config
    }

    /// The channel this reader is bound to.
    pub fn channel(&self) -> &Rc<dyn Channel> {
        &self.core.channel
    }
}

impl Drop for MessageReader {
    fn drop(&mut self) {
        self.core.channel.unset_source(Direction::Read);
        debug!("message reader unbound");
    }
}

impl fmt::Debug for MessageReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.core.inner.borrow();
        f.debug_struct("MessageReader")
            .field("state", &inner.state)
            .field("decoded", &inner.decoded.len())
            .field("error", &inner.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};
    use lanewire_channel::MemoryChannel;
    use lanewire_msg::{LayoutError, FIRST_CHILD, NEXT_SIBLING};
    use proptest::prelude::*;

    use super::*;
    use crate::codec::encode_message;
    use crate::writer::MessageWriter;

    fn setup() -> (Rc<MemoryChannel>, MessageReader) {
        let channel = Rc::new(MemoryChannel::new());
        let reader = MessageReader::new(Rc::clone(&channel) as Rc<dyn Channel>).unwrap();
        (channel, reader)
    }

    /// Read until the inbox is drained, delivering completions after every
    /// transfer.
    fn pump(channel: &MemoryChannel) {
        loop {
            match channel.read() {
                Ok(_) => channel.deliver_completions(Direction::Read),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(err) => panic!("unexpected read error: {err}"),
            }
            if channel.queue_len(Direction::Read) == 0 {
                return;
            }
        }
    }

    fn wire(messages: &[Message]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for msg in messages {
            encode_message(msg, &FrameConfig::default(), &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn nested() -> Message {
        Message::with_children(
            "top",
            vec![
                Message::new(""),
                Message::with_children(
                    "",
                    vec![
                        Message::new("a"),
                        Message::with_children("", vec![Message::new(""), Message::new("bc")]),
                    ],
                ),
                Message::new("end"),
            ],
        )
    }

    #[test]
    fn reads_ab_byte_by_byte() {
        let (channel, reader) = setup();
        channel.set_max_transfer(Some(1));
        channel.feed(&[0x01, 0, 0, 0, 0x02, 0, 0, 0, 0x41, 0x42]);

        pump(&channel);
        assert_eq!(reader.queue_len(), Ok(1));
        assert_eq!(reader.pop_message(), Some(Message::new("AB")));
        assert_eq!(reader.pop_message(), None);
        assert_eq!(reader.state(), ReaderState::ReadSize);
    }

    #[test]
    fn states_follow_the_protocol() {
        let (channel, reader) = setup();
        assert_eq!(reader.state(), ReaderState::ReadSize);
        assert_eq!(channel.queue_len(Direction::Read), 1);

        channel.feed(&[1, 0, 0, 0]);
        pump(&channel);
        assert_eq!(reader.state(), ReaderState::ReadLayout);
        assert_eq!(channel.queue_len(Direction::Read), 1);

        channel.feed(&[3, 0, 0, 0]);
        pump(&channel);
        assert_eq!(reader.state(), ReaderState::ReadPayload);
        assert_eq!(channel.queue_len(Direction::Read), 1);

        channel.feed(b"xyz");
        pump(&channel);
        assert_eq!(reader.state(), ReaderState::ReadSize);
        assert_eq!(channel.queue_len(Direction::Read), 1);
        assert_eq!(reader.pop_message(), Some(Message::new("xyz")));
    }

    #[test]
    fn empty_leaf_skips_payload_stage() {
        let (channel, reader) = setup();
        channel.feed(&wire(&[Message::new(""), Message::new("")]));
        pump(&channel);
        assert_eq!(reader.queue_len(), Ok(2));
        assert_eq!(reader.pop_message(), Some(Message::new("")));
        assert_eq!(reader.state(), ReaderState::ReadSize);
    }

    #[test]
    fn nested_tree_with_empty_children() {
        let (channel, reader) = setup();
        channel.feed(&wire(&[nested(), Message::new("after")]));
        pump(&channel);
        assert_eq!(reader.pop_message(), Some(nested()));
        assert_eq!(reader.pop_message(), Some(Message::new("after")));
    }

    #[test]
    fn zero_node_count_enters_error() {
        let (channel, reader) = setup();
        channel.feed(&[0, 0, 0, 0, 1, 0, 0, 0]);
        pump(&channel);
        assert_eq!(reader.state(), ReaderState::Error);
        assert_eq!(reader.queue_len(), Err(DecodeError::ZeroNodeCount));
        assert_eq!(channel.queue_len(Direction::Read), 0);
        assert_eq!(channel.unread(), 4);
    }

    #[test]
    fn messages_before_the_error_stay_poppable() {
        let (channel, reader) = setup();
        let mut bytes = wire(&[Message::new("ok")]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        channel.feed(&bytes);
        pump(&channel);
        assert_eq!(reader.error(), Some(DecodeError::ZeroNodeCount));
        assert_eq!(reader.pop_message(), Some(Message::new("ok")));
    }

    #[test]
    fn node_limit_enters_error() {
        let channel = Rc::new(MemoryChannel::new());
        let config = FrameConfig::default().with_max_nodes(4);
        let reader =
            MessageReader::with_config(Rc::clone(&channel) as Rc<dyn Channel>, config).unwrap();
        channel.feed(&[5, 0, 0, 0]);
        pump(&channel);
        assert_eq!(
            reader.queue_len(),
            Err(DecodeError::TooManyNodes { count: 5, max: 4 })
        );
    }

    #[test]
    fn bad_layout_enters_error() {
        let (channel, reader) = setup();
        let mut bytes = BytesMut::new();
        bytes.put_u32_le(2);
        bytes.put_u32_le(FIRST_CHILD);
        bytes.put_u32_le(NEXT_SIBLING);
        channel.feed(&bytes);
        pump(&channel);
        assert_eq!(
            reader.queue_len(),
            Err(DecodeError::Layout(LayoutError::Truncated { nodes: 2 }))
        );
    }

    #[test]
    fn drop_unbinds_read_lane() {
        let (channel, reader) = setup();
        assert_eq!(channel.queue_len(Direction::Read), 1);
        drop(reader);
        assert_eq!(channel.queue_len(Direction::Read), 0);
        let again = MessageReader::new(Rc::clone(&channel) as Rc<dyn Channel>).unwrap();
        assert_eq!(again.state(), ReaderState::ReadSize);
    }

    #[test]
    fn writer_to_reader_over_memory() {
        let outbound = Rc::new(MemoryChannel::new());
        let inbound = Rc::new(MemoryChannel::new());
        let writer = MessageWriter::new(Rc::clone(&outbound) as Rc<dyn Channel>).unwrap();
        let reader = MessageReader::new(Rc::clone(&inbound) as Rc<dyn Channel>).unwrap();

        writer.add_message(nested()).unwrap();
        writer.add_message(Message::new("")).unwrap();
        while outbound.queue_len(Direction::Write) > 0 {
            outbound.write().unwrap();
        }
        outbound.deliver_completions(Direction::Write);
        assert_eq!(writer.queue_len(), 0);

        inbound.feed(&outbound.take_written());
        pump(&inbound);
        assert_eq!(reader.pop_message(), Some(nested()));
        assert_eq!(reader.pop_message(), Some(Message::new("")));
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        let leaf = prop::collection::vec(any::<u8>(), 0..6).prop_map(Message::new);
        leaf.prop_recursive(4, 24, 4, |inner| {
            (
                prop::collection::vec(any::<u8>(), 0..6),
                prop::collection::vec(inner, 0..4),
            )
                .prop_map(|(data, children)| Message::with_children(data, children))
        })
    }

    proptest! {
        #[test]
        fn roundtrip_under_any_chunking(
            messages in prop::collection::vec(arb_message(), 1..4),
            chunk in 1usize..32,
        ) {
            let (channel, reader) = setup();
            channel.set_max_transfer(Some(chunk));
            channel.feed(&wire(&messages));
            pump(&channel);

            prop_assert_eq!(reader.queue_len(), Ok(messages.len()));
            for expected in messages {
                prop_assert_eq!(reader.pop_message(), Some(expected));
            }
        }
    }
}
