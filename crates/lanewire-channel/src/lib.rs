//! Job-accounted byte transport.
//!
//! A [`Channel`] moves bytes between a transport and caller-owned memory in
//! two independent lanes. Callers submit jobs (runs of [`Block`]s) and learn
//! about progress only through batched, in-order completion counts delivered
//! to a bound [`JobSource`].
//!
//! This is the lowest layer of lanewire. Message framing and the link build
//! on top of the [`Channel`] trait provided here.

pub mod block;
pub mod error;
pub mod lane;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod fd;

pub use block::{Block, BlockQueue};
pub use error::{ChannelError, Result};
pub use lane::{JobSource, Lane, LanePair};
pub use memory::MemoryChannel;
pub use traits::{Channel, Direction};

#[cfg(unix)]
pub use fd::FdChannel;
