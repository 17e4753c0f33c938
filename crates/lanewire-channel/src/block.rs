//! Byte blocks and the queue that serves as the vector of a scatter/gather
//! transfer.

/// A contiguous byte span referenced, never owned, by a lane.
///
/// The layout matches `struct iovec`, so a run of queued blocks can be passed
/// straight to `readv`/`writev` without conversion.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    base: *mut u8,
    len: usize,
}

#[cfg(unix)]
const _: () = {
    assert!(std::mem::size_of::<Block>() == std::mem::size_of::<libc::iovec>());
    assert!(std::mem::align_of::<Block>() == std::mem::align_of::<libc::iovec>());
};

impl Block {
    /// A zero-length block with a null base.
    pub const EMPTY: Block = Block {
        base: std::ptr::null_mut(),
        len: 0,
    };

    /// Create a block from a raw base pointer and length.
    pub fn new(base: *mut u8, len: usize) -> Self {
        Self { base, len }
    }

    /// Reference a read-only span. Only valid as part of a write job.
    pub fn from_slice(buf: &[u8]) -> Self {
        Self {
            base: buf.as_ptr().cast_mut(),
            len: buf.len(),
        }
    }

    /// Reference a writable span, suitable for read jobs.
    pub fn from_mut_slice(buf: &mut [u8]) -> Self {
        Self {
            base: buf.as_mut_ptr(),
            len: buf.len(),
        }
    }

    /// Start of the span.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Remaining length of the span in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the span has no bytes left.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the span as a byte slice.
    ///
    /// # Safety
    ///
    /// The referenced memory must be valid for reads of `len` bytes and must
    /// not be mutated for the lifetime `'a`.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: upheld by the caller.
        unsafe { std::slice::from_raw_parts(self.base, self.len) }
    }

    /// View the span as a mutable byte slice.
    ///
    /// # Safety
    ///
    /// The referenced memory must be valid for writes of `len` bytes and must
    /// not be aliased for the lifetime `'a`.
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: upheld by the caller.
        unsafe { std::slice::from_raw_parts_mut(self.base, self.len) }
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.base = self.base.wrapping_add(n);
        self.len -= n;
    }
}

/// Ordered queue of [`Block`] descriptors.
///
/// Blocks are stored contiguously so the live range can be handed to a
/// vectored syscall as one slice. Popped slots are reclaimed lazily when new
/// blocks are appended.
#[derive(Debug, Default)]
pub struct BlockQueue {
    blocks: Vec<Block>,
    head: usize,
}

impl BlockQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued blocks.
    pub fn len(&self) -> usize {
        self.blocks.len() - self.head
    }

    /// Whether no blocks are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The queued blocks, front first.
    pub fn as_slice(&self) -> &[Block] {
        &self.blocks[self.head..]
    }

    /// Sum of the remaining lengths of all queued blocks.
    pub fn total_bytes(&self) -> usize {
        self.as_slice().iter().map(Block::len).sum()
    }

    /// Append `n` empty slots at the back and return them for the caller to
    /// fill in.
    pub fn append(&mut self, n: usize) -> &mut [Block] {
        self.compact();
        let start = self.blocks.len();
        self.blocks.resize(start + n, Block::EMPTY);
        &mut self.blocks[start..]
    }

    /// Append a run of blocks at the back.
    pub fn extend_from_slice(&mut self, blocks: &[Block]) {
        self.append(blocks.len()).copy_from_slice(blocks);
    }

    /// Remove `n` whole blocks from the front.
    pub fn pop_blocks(&mut self, n: usize) {
        debug_assert!(n <= self.len(), "popping more blocks than queued");
        self.head += n.min(self.len());
        if self.head == self.blocks.len() {
            self.blocks.clear();
            self.head = 0;
        }
    }

    /// Consume `n_bytes` from the front.
    ///
    /// Fully covered blocks are removed; a partially covered block has its
    /// base advanced and its length shrunk. A count landing exactly on a block
    /// boundary leaves no zero-length residue. Returns the number of whole
    /// blocks removed. Bytes beyond the queued total are ignored.
    pub fn pop_bytes(&mut self, mut n_bytes: usize) -> usize {
        let mut whole = 0;
        for block in &mut self.blocks[self.head..] {
            if n_bytes < block.len {
                block.advance(n_bytes);
                break;
            }
            n_bytes -= block.len;
            whole += 1;
        }
        self.pop_blocks(whole);
        whole
    }

    /// Drop every queued block.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.head = 0;
    }

    fn compact(&mut self) {
        if self.head > 0 && self.head * 2 >= self.blocks.len() {
            self.blocks.drain(..self.head);
            self.head = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(buf: &mut [u8], sizes: &[usize]) -> BlockQueue {
        let mut queue = BlockQueue::new();
        let mut rest = buf;
        for &size in sizes {
            let (head, tail) = rest.split_at_mut(size);
            queue.extend_from_slice(&[Block::from_mut_slice(head)]);
            rest = tail;
        }
        queue
    }

    #[test]
    fn pop_bytes_inside_first_block() {
        let mut buf = [0u8; 15];
        let base = buf.as_mut_ptr();
        let mut queue = queue_of(&mut buf, &[5, 5, 5]);

        assert_eq!(queue.pop_bytes(3), 0);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.as_slice()[0].base(), base.wrapping_add(3));
        assert_eq!(queue.as_slice()[0].len(), 2);
        assert_eq!(queue.total_bytes(), 12);
    }

    #[test]
    fn pop_bytes_on_boundary_leaves_no_residue() {
        let mut buf = [0u8; 15];
        let base = buf.as_mut_ptr();
        let mut queue = queue_of(&mut buf, &[5, 5, 5]);

        assert_eq!(queue.pop_bytes(10), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.as_slice()[0].base(), base.wrapping_add(10));
        assert_eq!(queue.as_slice()[0].len(), 5);
    }

    #[test]
    fn pop_bytes_across_blocks() {
        let mut buf = [0u8; 15];
        let base = buf.as_mut_ptr();
        let mut queue = queue_of(&mut buf, &[5, 5, 5]);

        assert_eq!(queue.pop_bytes(7), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.as_slice()[0].base(), base.wrapping_add(7));
        assert_eq!(queue.as_slice()[0].len(), 3);
        assert_eq!(queue.as_slice()[1].base(), base.wrapping_add(10));
        assert_eq!(queue.as_slice()[1].len(), 5);
    }

    #[test]
    fn pop_bytes_beyond_total_empties_queue() {
        let mut buf = [0u8; 6];
        let mut queue = queue_of(&mut buf, &[2, 4]);

        assert_eq!(queue.pop_bytes(100), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.pop_bytes(1), 0);
    }

    #[test]
    fn pop_zero_bytes_keeps_blocks() {
        let mut buf = [0u8; 4];
        let mut queue = queue_of(&mut buf, &[4]);

        assert_eq!(queue.pop_bytes(0), 0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.total_bytes(), 4);
    }

    #[test]
    fn append_returns_fillable_slots_after_pops() {
        let mut buf = [0u8; 8];
        let mut queue = queue_of(&mut buf, &[2, 2, 2, 2]);
        queue.pop_blocks(3);

        let slots = queue.append(2);
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(Block::is_empty));
        slots[0] = Block::new(std::ptr::null_mut(), 0);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.as_slice()[0].len(), 2);
    }

    #[test]
    fn block_slices_view_memory() {
        let mut buf = *b"abcdef";
        let block = Block::from_mut_slice(&mut buf[1..4]);
        // SAFETY: `buf` outlives the view and is not otherwise accessed.
        let view = unsafe { block.as_slice() };
        assert_eq!(view, b"bcd");
        assert!(!block.is_empty());
        // SAFETY: a zero-length block never touches memory.
        assert!(unsafe { Block::EMPTY.as_slice() }.is_empty());
    }
}
