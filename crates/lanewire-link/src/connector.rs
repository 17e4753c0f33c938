use std::os::unix::net::UnixStream;
use std::path::Path;

use lanewire_frame::FrameConfig;
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::link::Link;
use crate::listener::check_path_len;

/// Connect to a listening socket and wrap the stream in a link.
pub fn connect(path: impl AsRef<Path>) -> Result<Link> {
    connect_with_config(path, FrameConfig::default())
}

/// Connect with explicit message limits.
pub fn connect_with_config(path: impl AsRef<Path>, config: FrameConfig) -> Result<Link> {
    let path = path.as_ref();
    check_path_len(path)?;
    let stream = UnixStream::connect(path).map_err(|source| LinkError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(?path, "connected to unix domain socket");
    Link::from_stream_with_config(stream, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_to_missing_socket_fails() {
        let path = format!("/tmp/lanewire-missing-{}.sock", std::process::id());
        let err = connect(&path).unwrap_err();
        assert!(matches!(err, LinkError::Connect { .. }));
    }

    #[test]
    fn connect_rejects_long_path() {
        let path = "/tmp/".to_string() + &"b".repeat(200);
        assert!(matches!(connect(&path), Err(LinkError::PathTooLong { .. })));
    }
}
