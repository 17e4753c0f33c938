use bytes::{Buf, BufMut, Bytes, BytesMut};
use lanewire_msg::{count, create_layout, Message};

use crate::error::{DecodeError, FrameError, Result};

/// Size of every wire integer: the node count and each layout word.
pub const WORD_SIZE: usize = 4;

/// Default maximum number of nodes in one message.
pub const DEFAULT_MAX_NODES: usize = 65_536;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Limits applied when writing and reading messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum number of nodes per message. Default: 65 536.
    ///
    /// A reader allocates and zero-fills `4 * max_nodes` bytes of layout as
    /// soon as a node count arrives, before any layout byte is read.
    pub max_nodes: usize,
    /// Maximum total payload bytes per message. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl FrameConfig {
    /// Override the payload size limit.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Override the node count limit.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    fn node_limit(&self) -> usize {
        self.max_nodes.min(u32::MAX as usize)
    }
}

/// Check `msg` against `config` and build its preamble.
///
/// Returns the preamble bytes and the node count.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────────────┬──────────────────────────┐
/// │ Node count N │ Layout                  │ Payload                  │
/// │ (4B LE)      │ (N × 4B LE, pre-order)  │ (node data, pre-order)   │
/// └──────────────┴─────────────────────────┴──────────────────────────┘
/// ```
pub fn encode_preamble(msg: &Message, config: &FrameConfig) -> Result<(Bytes, usize)> {
    let nodes = count(msg);
    if nodes > config.node_limit() {
        return Err(FrameError::TooManyNodes {
            count: nodes,
            max: config.node_limit(),
        });
    }
    let size = msg.payload_len();
    if size > config.max_message_size {
        return Err(FrameError::MessageTooLarge {
            size,
            max: config.max_message_size,
        });
    }
    let layout = create_layout(msg, nodes)?;
    let mut preamble = BytesMut::with_capacity(WORD_SIZE * (nodes + 1));
    preamble.put_u32_le(nodes as u32);
    for word in layout {
        preamble.put_u32_le(word);
    }
    Ok((preamble.freeze(), nodes))
}

/// Decode a little-endian wire integer.
pub fn decode_word(bytes: [u8; WORD_SIZE]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// Decode a received layout buffer into layout words.
pub fn decode_layout(mut src: &[u8]) -> Vec<u32> {
    let mut layout = Vec::with_capacity(src.len() / WORD_SIZE);
    while src.remaining() >= WORD_SIZE {
        layout.push(src.get_u32_le());
    }
    layout
}

/// Validate an announced node count against `config`.
pub fn check_node_count(nodes: usize, config: &FrameConfig) -> std::result::Result<(), DecodeError> {
    if nodes == 0 {
        return Err(DecodeError::ZeroNodeCount);
    }
    if nodes > config.node_limit() {
        return Err(DecodeError::TooManyNodes {
            count: nodes,
            max: config.node_limit(),
        });
    }
    Ok(())
}

/// Serialize a whole message into `dst`, copying its payload.
///
/// The channel writer never copies; this renders the exact wire form for
/// inspection and for feeding readers in tests.
pub fn encode_message(msg: &Message, config: &FrameConfig, dst: &mut BytesMut) -> Result<()> {
    let (preamble, _) = encode_preamble(msg, config)?;
    dst.reserve(preamble.len() + msg.payload_len());
    dst.put_slice(&preamble);
    for (node, _) in msg.preorder() {
        dst.put_slice(node.data());
    }
    Ok(())
}
