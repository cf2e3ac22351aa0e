//! B+tree nodes.
//!
//! Separator `keys[i]` of an internal node bounds its children: every key in
//! `children[i]` is `<= keys[i]` and every key in `children[i + 1]` is
//! `>= keys[i]`. Both bounds are inclusive because duplicate keys may
//! straddle a separator.

use crate::record::RecordLayout;
use std::cmp::Ordering;

/// Index of a node in the tree's arena.
pub(crate) type NodeId = usize;

/// A leaf: sorted keys with their values, chained to the next leaf.
#[derive(Debug, Default)]
pub(crate) struct Leaf {
    pub(crate) keys: Vec<Vec<u8>>,
    pub(crate) values: Vec<Vec<u8>>,
    pub(crate) next: Option<NodeId>,
}

/// An internal node: `children.len() == keys.len() + 1`.
#[derive(Debug, Default)]
pub(crate) struct Internal {
    pub(crate) keys: Vec<Vec<u8>>,
    pub(crate) children: Vec<NodeId>,
}

#[derive(Debug)]
pub(crate) enum Node {
    Leaf(Leaf),
    Internal(Internal),
}

impl Node {
    pub(crate) fn len(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.keys.len(),
            Node::Internal(internal) => internal.keys.len(),
        }
    }
}

/// Number of keys below `key` (or, with `inclusive`, at most `key`).
pub(crate) fn rank(layout: &RecordLayout, keys: &[Vec<u8>], key: &[u8], inclusive: bool) -> usize {
    keys.partition_point(|k| match layout.compare(k, key) {
        Ordering::Less => true,
        Ordering::Equal => inclusive,
        Ordering::Greater => false,
    })
}

impl Leaf {
    /// Splits off the upper half. Returns the new right leaf, whose first key
    /// becomes the separator. The caller links `next`.
    pub(crate) fn split(&mut self) -> Leaf {
        let mid = self.keys.len() / 2;
        Leaf {
            keys: self.keys.split_off(mid),
            values: self.values.split_off(mid),
            next: self.next,
        }
    }
}

impl Internal {
    /// Splits around the middle separator, which is removed and returned for
    /// the parent along with the new right node.
    pub(crate) fn split(&mut self) -> (Vec<u8>, Internal) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let promoted = self.keys.pop().unwrap_or_default();
        (promoted, Internal { keys: right_keys, children: right_children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyType;

    fn keys(values: &[u8]) -> Vec<Vec<u8>> {
        values.iter().map(|v| vec![*v]).collect()
    }

    #[test]
    fn test_rank_with_duplicates() {
        let layout = RecordLayout::new(KeyType::NumericUnsigned, 1, 0);
        let ks = keys(&[1, 3, 3, 3, 7]);
        assert_eq!(rank(&layout, &ks, &[3], false), 1);
        assert_eq!(rank(&layout, &ks, &[3], true), 4);
        assert_eq!(rank(&layout, &ks, &[9], false), 5);
        assert_eq!(rank(&layout, &ks, &[0], true), 0);
    }

    #[test]
    fn test_leaf_split() {
        let mut leaf =
            Leaf { keys: keys(&[1, 2, 3, 4, 5]), values: keys(&[1, 2, 3, 4, 5]), next: Some(9) };
        let right = leaf.split();
        assert_eq!(leaf.keys, keys(&[1, 2]));
        assert_eq!(right.keys, keys(&[3, 4, 5]));
        assert_eq!(right.next, Some(9));
    }

    #[test]
    fn test_internal_split() {
        let mut node =
            Internal { keys: keys(&[10, 20, 30, 40, 50]), children: vec![0, 1, 2, 3, 4, 5] };
        let (promoted, right) = node.split();
        assert_eq!(promoted, vec![30]);
        assert_eq!(node.keys, keys(&[10, 20]));
        assert_eq!(node.children, vec![0, 1, 2]);
        assert_eq!(right.keys, keys(&[40, 50]));
        assert_eq!(right.children, vec![3, 4, 5]);
    }
}
