use std::path::PathBuf;

use lanewire_frame::{DecodeError, FrameError};

/// Errors that can occur on a link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Failed to bind a listening socket.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to a listening socket.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept a connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Writer or reader setup, or message submission, failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The peer closed the connection.
    #[error("peer disconnected")]
    Disconnected,

    /// The incoming byte stream can no longer be decoded.
    #[error("stream desynchronized: {0}")]
    Desynchronized(#[source] DecodeError),

    /// A transfer failed.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
