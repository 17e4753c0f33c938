use bytes::{Bytes, BytesMut};

use crate::error::{LayoutError, Result};

#[cfg(test)]
thread_local! {
    /// Largest node buffer tests let `try_zeroed` allocate.
    pub(crate) static ALLOC_CEILING: std::cell::Cell<usize> = const { std::cell::Cell::new(usize::MAX) };
}

/// A message tree node: a byte span, possibly empty, and ordered children.
///
/// Data is held in [`Bytes`], so cloning a message shares its buffers. The
/// application and a writer can hold the same message until the write
/// completes without copying payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    data: Bytes,
    children: Vec<Message>,
}

impl Message {
    /// Create a leaf node.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            children: Vec::new(),
        }
    }

    /// Create a node with the given children.
    pub fn with_children(data: impl Into<Bytes>, children: Vec<Message>) -> Self {
        Self {
            data: data.into(),
            children,
        }
    }

    /// Append a child node.
    pub fn push(&mut self, child: Message) {
        self.children.push(child);
    }

    /// This node's bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// This node's children, in order.
    pub fn children(&self) -> &[Message] {
        &self.children
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in the tree rooted here.
    pub fn node_count(&self) -> usize {
        self.preorder().count()
    }

    /// Sum of the data lengths of every node in the tree.
    pub fn payload_len(&self) -> usize {
        self.preorder().map(|(node, _)| node.data.len()).sum()
    }

    /// Walk the tree in pre-order.
    ///
    /// Each item is a node together with whether another sibling follows it
    /// under the same parent. The walk is iterative, so arbitrarily deep
    /// trees do not grow the call stack.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            stack: vec![(self, false)],
        }
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

/// Pre-order traversal produced by [`Message::preorder`].
#[derive(Debug)]
pub struct Preorder<'a> {
    stack: Vec<(&'a Message, bool)>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = (&'a Message, bool);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, has_next_sibling) = self.stack.pop()?;
        let last = node.children.len().saturating_sub(1);
        for (i, child) in node.children.iter().enumerate().rev() {
            self.stack.push((child, i < last));
        }
        Some((node, has_next_sibling))
    }
}

/// A message tree whose node buffers are allocated but not yet filled.
///
/// Produced by [`alloc_by_layout`](crate::alloc_by_layout) on the receive
/// side. Buffers are zero-initialised; once the payload has been read into
/// them, [`PartialMessage::freeze`] turns the tree into a [`Message`]
/// without copying.
#[derive(Debug, Default)]
pub struct PartialMessage {
    pub(crate) data: BytesMut,
    pub(crate) children: Vec<PartialMessage>,
}

impl PartialMessage {
    /// A childless node with a zero-filled buffer of `len` bytes.
    ///
    /// Lengths come from a peer's layout, so allocation failure is reported
    /// instead of aborting.
    pub(crate) fn try_zeroed(len: usize) -> Result<Self> {
        #[cfg(test)]
        if len > ALLOC_CEILING.with(std::cell::Cell::get) {
            return Err(LayoutError::AllocationFailed { len });
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| LayoutError::AllocationFailed { len })?;
        buf.resize(len, 0);
        let data = Bytes::from(buf)
            .try_into_mut()
            .unwrap_or_else(|shared| BytesMut::from(&shared[..]));
        Ok(Self {
            data,
            children: Vec::new(),
        })
    }

    /// This node's buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// This node's children, in order.
    pub fn children(&self) -> &[PartialMessage] {
        &self.children
    }

    /// Convert into an immutable [`Message`], keeping every buffer in place.
    pub fn freeze(self) -> Message {
        enum Step {
            Enter(PartialMessage),
            Exit(Bytes, usize),
        }

        let mut work = vec![Step::Enter(self)];
        let mut built: Vec<Message> = Vec::new();
        while let Some(step) = work.pop() {
            match step {
                Step::Enter(mut node) => {
                    let children = std::mem::take(&mut node.children);
                    let data = std::mem::take(&mut node.data).freeze();
                    work.push(Step::Exit(data, children.len()));
                    work.extend(children.into_iter().rev().map(Step::Enter));
                }
                Step::Exit(data, n_children) => {
                    let children = built.split_off(built.len() - n_children);
                    built.push(Message::with_children(data, children));
                }
            }
        }
        built.pop().unwrap_or_default()
    }
}

impl Drop for PartialMessage {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}
