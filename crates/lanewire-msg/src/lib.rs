//! Tree-structured messages for lanewire.
//!
//! A [`Message`] is a tree of byte spans. Its shape travels on the wire as a
//! run of layout words (see [`layout`]) ahead of the payload, so a receiver
//! can allocate every node buffer before the first payload byte arrives and
//! read straight into place.

pub mod error;
pub mod layout;
pub mod message;

pub use error::{LayoutError, Result};
pub use layout::{
    alloc_by_layout, count, create_layout, get_blocks, get_blocks_mut, node_len, payload_len,
    FIRST_CHILD, MAX_NODE_LEN, NEXT_SIBLING,
};
pub use message::{Message, PartialMessage, Preorder};
