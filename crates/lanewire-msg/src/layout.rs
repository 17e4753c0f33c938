//! Layout words: the shape of a message tree, one `u32` per node in
//! pre-order.
//!
//! ```text
//!  31            30             29 ..................... 0
//! ┌─────────────┬──────────────┬─────────────────────────┐
//! │ FIRST_CHILD │ NEXT_SIBLING │ node data length        │
//! └─────────────┴──────────────┴─────────────────────────┘
//! ```
//!
//! `FIRST_CHILD` means the next word describes this node's first child.
//! `NEXT_SIBLING` means that once this node's subtree is complete, the next
//! word describes its following sibling. A node count on the wire is
//! therefore exactly the number of layout words.

use lanewire_channel::Block;
use tracing::trace;

use crate::error::{LayoutError, Result};
use crate::message::{Message, PartialMessage};

/// The node has children; its first child follows.
pub const FIRST_CHILD: u32 = 1 << 31;

/// Another sibling follows this node's subtree.
pub const NEXT_SIBLING: u32 = 1 << 30;

/// Largest data length a single node can carry.
pub const MAX_NODE_LEN: usize = (NEXT_SIBLING - 1) as usize;

const LEN_MASK: u32 = NEXT_SIBLING - 1;

/// Number of nodes in `msg`.
pub fn count(msg: &Message) -> usize {
    msg.node_count()
}

/// Encode the shape of `msg` as `node_count` layout words.
///
/// Fails if a node is too large to describe or if `node_count` does not
/// match the tree.
pub fn create_layout(msg: &Message, node_count: usize) -> Result<Vec<u32>> {
    let mut layout = Vec::with_capacity(node_count);
    for (node, has_next_sibling) in msg.preorder() {
        let len = node.data().len();
        if len > MAX_NODE_LEN {
            return Err(LayoutError::NodeTooLarge {
                len,
                max: MAX_NODE_LEN,
            });
        }
        let mut word = len as u32;
        if !node.is_leaf() {
            word |= FIRST_CHILD;
        }
        if has_next_sibling {
            word |= NEXT_SIBLING;
        }
        layout.push(word);
    }
    if layout.len() != node_count {
        return Err(LayoutError::CountMismatch {
            expected: node_count,
            actual: layout.len(),
        });
    }
    Ok(layout)
}

/// Data length encoded in a layout word.
pub fn node_len(word: u32) -> usize {
    (word & LEN_MASK) as usize
}

/// Total payload bytes described by `layout`.
pub fn payload_len(layout: &[u32]) -> usize {
    layout.iter().map(|&word| node_len(word)).sum()
}

struct Open {
    node: PartialMessage,
    has_next_sibling: bool,
}

/// Allocate an unfilled message tree with the shape described by `layout`.
///
/// Every node buffer is allocated up front, so the payload can be read
/// straight into place. The layout must describe exactly one complete tree
/// and its payload must not exceed `max_message_size` bytes.
pub fn alloc_by_layout(layout: &[u32], max_message_size: usize) -> Result<PartialMessage> {
    if layout.is_empty() {
        return Err(LayoutError::EmptyLayout);
    }
    if layout[0] & NEXT_SIBLING != 0 {
        return Err(LayoutError::RootHasSibling);
    }
    let total = payload_len(layout);
    if total > max_message_size {
        return Err(LayoutError::MessageTooLarge {
            size: total,
            max: max_message_size,
        });
    }

    let mut open: Vec<Open> = Vec::new();
    let mut root = None;
    for (index, &word) in layout.iter().enumerate() {
        if root.is_some() {
            return Err(LayoutError::TrailingEntries { index });
        }
        let mut node = PartialMessage::try_zeroed(node_len(word))?;
        let mut has_next_sibling = word & NEXT_SIBLING != 0;
        if word & FIRST_CHILD != 0 {
            open.push(Open {
                node,
                has_next_sibling,
            });
            continue;
        }
        // A leaf closes every ancestor whose last child it completes.
        loop {
            match open.pop() {
                None => {
                    root = Some(node);
                    break;
                }
                Some(mut parent) => {
                    parent.node.children.push(node);
                    if has_next_sibling {
                        open.push(parent);
                        break;
                    }
                    node = parent.node;
                    has_next_sibling = parent.has_next_sibling;
                }
            }
        }
    }

    let root = root.ok_or(LayoutError::Truncated {
        nodes: layout.len(),
    })?;
    trace!(nodes = layout.len(), bytes = total, "message allocated");
    Ok(root)
}

/// Blocks covering the data of every non-empty node of `msg`, in pre-order.
///
/// The blocks reference the message's buffers and are meant for a write
/// job; they stay valid for as long as `msg` (or a clone) is alive.
pub fn get_blocks(msg: &Message, node_count: usize) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(node_count);
    blocks.extend(
        msg.preorder()
            .filter(|(node, _)| !node.data().is_empty())
            .map(|(node, _)| Block::from_slice(node.data())),
    );
    blocks
}

/// Writable blocks covering the buffer of every non-empty node of `msg`, in
/// pre-order, for a read job.
///
/// The blocks stay valid until `msg` is frozen or dropped; moving the tree
/// does not move its buffers.
pub fn get_blocks_mut(msg: &mut PartialMessage, node_count: usize) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(node_count);
    let mut stack = vec![msg];
    while let Some(node) = stack.pop() {
        let PartialMessage { data, children } = node;
        if !data.is_empty() {
            blocks.push(Block::from_mut_slice(data));
        }
        stack.extend(children.iter_mut().rev());
    }
    blocks
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use proptest::prelude::*;

    use super::*;

    fn sample() -> Message {
        Message::with_children(
            "root",
            vec![
                Message::new(""),
                Message::with_children("mid", vec![Message::new("x"), Message::new("")]),
                Message::new("tail"),
            ],
        )
    }

    fn fill(partial: &mut PartialMessage, payload: &[u8]) {
        let mut offset = 0;
        for block in get_blocks_mut(partial, 0) {
            // SAFETY: the block references a live, unaliased buffer of
            // `partial`.
            let dst = unsafe { block.as_mut_slice() };
            dst.copy_from_slice(&payload[offset..offset + dst.len()]);
            offset += dst.len();
        }
        assert_eq!(offset, payload.len());
    }

    fn payload_of(msg: &Message) -> Vec<u8> {
        get_blocks(msg, count(msg))
            .iter()
            // SAFETY: `msg` keeps the referenced buffers alive.
            .flat_map(|block| unsafe { block.as_slice() }.to_vec())
            .collect()
    }

    #[test]
    fn single_leaf_layout() {
        let msg = Message::new("AB");
        assert_eq!(count(&msg), 1);
        assert_eq!(create_layout(&msg, 1).unwrap(), vec![2]);
    }

    #[test]
    fn nested_layout_words() {
        let msg = sample();
        let layout = create_layout(&msg, 6).unwrap();
        assert_eq!(
            layout,
            vec![
                FIRST_CHILD | 4,
                NEXT_SIBLING,
                FIRST_CHILD | NEXT_SIBLING | 3,
                NEXT_SIBLING | 1,
                0,
                4,
            ]
        );
        assert_eq!(payload_len(&layout), 12);
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let err = create_layout(&sample(), 5).unwrap_err();
        assert_eq!(
            err,
            LayoutError::CountMismatch {
                expected: 5,
                actual: 6
            }
        );
    }

    #[test]
    fn alloc_reproduces_shape() {
        let msg = sample();
        let layout = create_layout(&msg, 6).unwrap();
        let mut partial = alloc_by_layout(&layout, usize::MAX).unwrap();
        assert_eq!(get_blocks_mut(&mut partial, 6).len(), 4);
        fill(&mut partial, &payload_of(&msg));
        assert_eq!(partial.freeze(), msg);
    }

    #[test]
    fn empty_nodes_need_no_blocks() {
        let msg = Message::with_children("", vec![Message::new(""), Message::new("")]);
        let layout = create_layout(&msg, 3).unwrap();
        assert!(get_blocks(&msg, 3).is_empty());
        let mut partial = alloc_by_layout(&layout, 0).unwrap();
        assert!(get_blocks_mut(&mut partial, 3).is_empty());
        assert_eq!(partial.freeze(), msg);
    }

    #[test]
    fn structural_errors() {
        let err = |layout: &[u32]| alloc_by_layout(layout, 1 << 20).unwrap_err();
        assert_eq!(err(&[]), LayoutError::EmptyLayout);
        assert_eq!(err(&[NEXT_SIBLING | 1, 1]), LayoutError::RootHasSibling);
        assert_eq!(err(&[FIRST_CHILD]), LayoutError::Truncated { nodes: 1 });
        assert_eq!(
            err(&[FIRST_CHILD, NEXT_SIBLING]),
            LayoutError::Truncated { nodes: 2 }
        );
        assert_eq!(err(&[1, 2]), LayoutError::TrailingEntries { index: 1 });
        assert_eq!(
            err(&[FIRST_CHILD, 0, 0]),
            LayoutError::TrailingEntries { index: 2 }
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let err = alloc_by_layout(&[FIRST_CHILD | 8, 9], 16).unwrap_err();
        assert_eq!(err, LayoutError::MessageTooLarge { size: 17, max: 16 });
    }

    #[test]
    fn allocation_failure_is_reported() {
        use crate::message::ALLOC_CEILING;

        ALLOC_CEILING.with(|ceiling| ceiling.set(1024));
        let layout = [FIRST_CHILD | 8, NEXT_SIBLING | MAX_NODE_LEN as u32, 3];
        let result = alloc_by_layout(&layout, usize::MAX);
        ALLOC_CEILING.with(|ceiling| ceiling.set(usize::MAX));

        assert_eq!(
            result.unwrap_err(),
            LayoutError::AllocationFailed { len: MAX_NODE_LEN }
        );
    }

    #[test]
    fn deep_chain_allocates_iteratively() {
        let depth = 100_000;
        let mut layout = vec![FIRST_CHILD; depth];
        layout.push(1);
        let partial = alloc_by_layout(&layout, 1).unwrap();
        let msg = partial.freeze();
        assert_eq!(msg.node_count(), depth + 1);
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        let leaf = prop::collection::vec(any::<u8>(), 0..8).prop_map(Message::new);
        leaf.prop_recursive(4, 32, 4, |inner| {
            (
                prop::collection::vec(any::<u8>(), 0..8),
                prop::collection::vec(inner, 0..4),
            )
                .prop_map(|(data, children)| Message::with_children(Bytes::from(data), children))
        })
    }

    proptest! {
        #[test]
        fn layout_alloc_fill_freeze_is_identity(msg in arb_message()) {
            let nodes = count(&msg);
            let layout = create_layout(&msg, nodes).unwrap();
            prop_assert_eq!(layout.len(), nodes);
            prop_assert_eq!(payload_len(&layout), msg.payload_len());

            let mut partial = alloc_by_layout(&layout, msg.payload_len()).unwrap();
            fill(&mut partial, &payload_of(&msg));
            prop_assert_eq!(partial.freeze(), msg);
        }
    }
}
