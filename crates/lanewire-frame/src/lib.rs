//! Message framing over lanewire channels.
//!
//! Every message travels as one self-describing unit:
//! - A 4-byte little-endian node count
//! - One 4-byte little-endian layout word per node, in pre-order
//! - The data of every node, in the same order
//!
//! [`MessageWriter`] turns a message into a single write job that references
//! the message's own buffers. [`MessageReader`] drives a small state machine
//! over the read lane, learning the size of each read from the bytes it has
//! just received, and reads payload straight into pre-allocated nodes.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    check_node_count, decode_layout, decode_word, encode_message, encode_preamble, FrameConfig,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_NODES, WORD_SIZE,
};
pub use error::{DecodeError, FrameError, Result};
pub use reader::{MessageReader, ReaderState};
pub use writer::MessageWriter;
