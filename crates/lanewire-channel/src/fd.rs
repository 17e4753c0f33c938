use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::rc::Rc;

use tracing::debug;

use crate::block::Block;
use crate::error::Result;
use crate::lane::{JobSource, LanePair};
use crate::traits::{Channel, Direction};

/// Vector length used when the platform does not report `IOV_MAX`.
pub const DEFAULT_IOV_MAX: usize = 1024;

/// A channel over a connected file descriptor using `readv`/`writev`.
///
/// The descriptor is owned and closed on drop. No handshake is performed; the
/// descriptor is expected to be connected already. Whether transfers block
/// depends on the descriptor's own mode.
pub struct FdChannel {
    fd: OwnedFd,
    lanes: LanePair,
    iov_max: usize,
}

impl FdChannel {
    /// Wrap a connected descriptor, querying the platform vector cap once.
    pub fn new(fd: impl Into<OwnedFd>) -> Self {
        Self::with_iov_max(fd, platform_iov_max())
    }

    /// Wrap a connected descriptor with an explicit vector cap.
    pub fn with_iov_max(fd: impl Into<OwnedFd>, iov_max: usize) -> Self {
        let fd = fd.into();
        let iov_max = iov_max.max(1);
        debug!(fd = fd.as_raw_fd(), iov_max, "fd channel created");
        Self {
            fd,
            lanes: LanePair::new(),
            iov_max,
        }
    }

    /// Convenience for building a shared handle.
    pub fn shared(fd: impl Into<OwnedFd>) -> Rc<dyn Channel> {
        Rc::new(Self::new(fd))
    }

    /// The vector length cap applied to each transfer.
    pub fn iov_max(&self) -> usize {
        self.iov_max
    }

    /// Run one transfer on `direction` with a caller-supplied vectored I/O
    /// function in place of `readv`/`writev`.
    ///
    /// Accounting is identical to [`Channel::transfer`]; this exists so tests
    /// can script partial transfers.
    ///
    /// # Panics
    ///
    /// Panics if the lane has no job source.
    pub fn transfer_with<F>(&self, direction: Direction, op: F) -> io::Result<usize>
    where
        F: FnOnce(RawFd, &[Block]) -> io::Result<usize>,
    {
        let fd = self.fd.as_raw_fd();
        self.lanes
            .transfer_with(direction, self.iov_max, |iov| op(fd, iov))
    }
}

impl AsRawFd for FdChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Channel for FdChannel {
    fn set_source(&self, direction: Direction, source: Rc<dyn JobSource>) -> Result<()> {
        self.lanes.set_source(direction, source)
    }

    fn unset_source(&self, direction: Direction) {
        self.lanes.unset_source(direction);
    }

    unsafe fn add_job(&self, direction: Direction, blocks: &[Block]) -> Result<()> {
        // SAFETY: forwarded from the caller.
        unsafe { self.lanes.add_job(direction, blocks) }
    }

    fn transfer(&self, direction: Direction) -> io::Result<usize> {
        self.transfer_with(direction, |fd, iov| vectored_io(direction, fd, iov))
    }

    fn deliver_completions(&self, direction: Direction) {
        self.lanes.deliver_completions(direction);
    }

    fn queue_len(&self, direction: Direction) -> usize {
        self.lanes.queue_len(direction)
    }
}

impl std::fmt::Debug for FdChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdChannel")
            .field("fd", &self.fd.as_raw_fd())
            .field("iov_max", &self.iov_max)
            .field("lanes", &self.lanes)
            .finish()
    }
}

fn vectored_io(direction: Direction, fd: RawFd, iov: &[Block]) -> io::Result<usize> {
    // Nothing queued: skip the syscall so a zero result cannot be mistaken
    // for end of stream.
    if iov.is_empty() {
        return Ok(0);
    }
    let count = libc::c_int::try_from(iov.len()).unwrap_or(libc::c_int::MAX);
    let vec = iov.as_ptr().cast::<libc::iovec>();
    // SAFETY: `Block` is layout-compatible with `iovec` (checked at compile
    // time), `count` does not exceed `iov.len()`, and the submitters of the
    // queued jobs guarantee the referenced memory is valid for this direction.
    let rc = unsafe {
        match direction {
            Direction::Read => libc::readv(fd, vec, count),
            Direction::Write => libc::writev(fd, vec, count),
        }
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

fn platform_iov_max() -> usize {
    // SAFETY: `sysconf` has no preconditions.
    let value = unsafe { libc::sysconf(libc::_SC_IOV_MAX) };
    if value > 0 {
        value as usize
    } else {
        DEFAULT_IOV_MAX
    }
}
