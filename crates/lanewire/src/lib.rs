//! Zero-copy exchange of tree-structured messages over byte streams.
//!
//! lanewire moves message trees between two endpoints over an ordered,
//! reliable byte transport using vectored I/O, without copying payload into
//! intermediate buffers.
//!
//! # Crate Structure
//!
//! - [`channel`]: Blocks, job lanes and the `Channel` trait (fd-backed and in-memory)
//! - [`msg`]: The message tree and its wire layout
//! - [`frame`]: Message writer and incremental message reader
//! - [`link`]: Writer and reader paired on one channel, Unix socket helpers (behind `link` feature)

/// Re-export channel types.
pub mod channel {
    pub use lanewire_channel::*;
}

/// Re-export message types.
pub mod msg {
    pub use lanewire_msg::*;
}

/// Re-export framing types.
pub mod frame {
    pub use lanewire_frame::*;
}

/// Re-export link types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use lanewire_link::*;
}
