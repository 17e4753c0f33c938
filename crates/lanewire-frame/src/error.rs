use lanewire_channel::ChannelError;
use lanewire_msg::LayoutError;

/// Errors raised when encoding or submitting a message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The channel rejected a binding or a job.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The message shape cannot be expressed as a layout.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The message has more nodes than the configured maximum.
    #[error("message has {count} nodes, max {max}")]
    TooManyNodes { count: usize, max: usize },

    /// The message payload exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// An I/O error occurred while moving message bytes.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a [`MessageReader`](crate::MessageReader) stopped decoding.
///
/// Once a reader reports one of these the byte stream is desynchronized;
/// closing the connection is the only safe recovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A message announced zero nodes.
    #[error("message announced zero nodes")]
    ZeroNodeCount,

    /// A message announced more nodes than the configured maximum.
    #[error("message announced {count} nodes, max {max}")]
    TooManyNodes { count: usize, max: usize },

    /// The layout buffer for the announced node count could not be allocated.
    #[error("failed to allocate layout of {words} words")]
    AllocationFailed { words: usize },

    /// The received layout does not describe a valid message tree.
    #[error("invalid layout: {0}")]
    Layout(#[from] LayoutError),

    /// The read lane refused the next job.
    #[error("read lane rejected job: {0}")]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
