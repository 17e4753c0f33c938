//! Message links for lanewire.
//!
//! A [`Link`] pairs a message writer and a message reader on one channel,
//! giving send/receive of whole message trees. On Unix, [`LinkListener`]
//! and [`connect`] set links up over Unix domain sockets.

pub mod error;
pub mod link;

#[cfg(unix)]
pub mod connector;
#[cfg(unix)]
pub mod listener;

pub use error::{LinkError, Result};
pub use link::{Link, LinkStatus};

#[cfg(unix)]
pub use connector::{connect, connect_with_config};
#[cfg(unix)]
pub use listener::LinkListener;
