//! In-memory B+tree.
//!
//! Nodes live in an arena and reference each other by index. Leaves hold the
//! records and are chained left to right for range scans. With order `m`,
//! every node other than the root holds at most `m` keys; leaves keep at
//! least `ceil(m / 2)` and internal nodes at least `floor(m / 2)`. Inserts
//! split full nodes up to the root, deletes borrow from or merge with a
//! sibling.
//!
//! Duplicate keys are allowed. A new duplicate is placed after the existing
//! ones, so equal keys come back in insertion order.

mod node;

use crate::config::{DictionaryConfig, DictionaryType, Options, WriteConcern};
use crate::cursor::RecordSource;
use crate::dictionary::DictionaryEngine;
use crate::error::{Error, Result};
use crate::predicate::Predicate;
use crate::record::{Record, RecordLayout};
use node::{rank, Internal, Leaf, Node, NodeId};
use std::cmp::Ordering;

/// A B+tree dictionary.
#[derive(Debug)]
pub struct BPlusTree {
    layout: RecordLayout,
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
    order: usize,
    len: usize,
    write_concern: WriteConcern,
}

impl BPlusTree {
    /// Creates an empty tree of order `options.bplus_tree_order`.
    pub fn create(config: &DictionaryConfig, options: &Options) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            layout: config.layout(),
            nodes: vec![Some(Node::Leaf(Leaf::default()))],
            free: Vec::new(),
            root: 0,
            order: options.bplus_tree_order,
            len: 0,
            write_concern: options
                .write_concern
                .unwrap_or(DictionaryType::BPlusTree.default_write_concern()),
        })
    }

    /// Number of levels, 1 for a tree that is a single leaf.
    pub fn height(&self) -> Result<usize> {
        let mut height = 1;
        let mut id = self.root;
        while let Node::Internal(internal) = self.node(id)? {
            id = internal.children[0];
            height += 1;
        }
        Ok(height)
    }

    fn min_leaf(&self) -> usize {
        (self.order + 1) / 2
    }

    fn min_internal(&self) -> usize {
        self.order / 2
    }

    // ========== Arena ==========

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).and_then(Option::as_ref).ok_or(Error::OutOfBounds)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).and_then(Option::as_mut).ok_or(Error::OutOfBounds)
    }

    fn leaf(&self, id: NodeId) -> Result<&Leaf> {
        match self.node(id)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(Error::corruption(format!("node {} is not a leaf", id))),
        }
    }

    fn leaf_mut(&mut self, id: NodeId) -> Result<&mut Leaf> {
        match self.node_mut(id)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(Error::corruption(format!("node {} is not a leaf", id))),
        }
    }

    fn internal(&self, id: NodeId) -> Result<&Internal> {
        match self.node(id)? {
            Node::Internal(internal) => Ok(internal),
            Node::Leaf(_) => Err(Error::corruption(format!("node {} is not internal", id))),
        }
    }

    fn internal_mut(&mut self, id: NodeId) -> Result<&mut Internal> {
        match self.node_mut(id)? {
            Node::Internal(internal) => Ok(internal),
            Node::Leaf(_) => Err(Error::corruption(format!("node {} is not internal", id))),
        }
    }

    fn alloc(&mut self, node: Node) -> Result<NodeId> {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                Ok(id)
            }
            None => {
                self.nodes.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
                self.nodes.push(Some(node));
                Ok(self.nodes.len() - 1)
            }
        }
    }

    fn take(&mut self, id: NodeId) -> Result<Node> {
        let node = self.nodes.get_mut(id).and_then(Option::take).ok_or(Error::OutOfBounds)?;
        self.free.push(id);
        Ok(node)
    }

    // ========== Search ==========

    /// Position of the first record with a key `>= key`.
    fn seek(&self, key: &[u8]) -> Result<Option<(NodeId, usize)>> {
        let mut id = self.root;
        while let Node::Internal(internal) = self.node(id)? {
            id = internal.children[rank(&self.layout, &internal.keys, key, false)];
        }

        let mut leaf = self.leaf(id)?;
        let mut pos = rank(&self.layout, &leaf.keys, key, false);
        while pos == leaf.keys.len() {
            match leaf.next {
                Some(next) => {
                    id = next;
                    leaf = self.leaf(id)?;
                    pos = rank(&self.layout, &leaf.keys, key, false);
                }
                None => return Ok(None),
            }
        }
        Ok(Some((id, pos)))
    }

    fn first_leaf(&self) -> Result<NodeId> {
        let mut id = self.root;
        while let Node::Internal(internal) = self.node(id)? {
            id = internal.children[0];
        }
        Ok(id)
    }

    /// Positions of every record with `key`, in order.
    fn positions_of(&self, key: &[u8]) -> Result<Vec<(NodeId, usize)>> {
        let mut positions = Vec::new();
        let Some((mut id, mut pos)) = self.seek(key)? else {
            return Ok(positions);
        };
        loop {
            let leaf = self.leaf(id)?;
            if pos < leaf.keys.len() {
                if self.layout.compare(&leaf.keys[pos], key) != Ordering::Equal {
                    break;
                }
                positions.push((id, pos));
                pos += 1;
            } else {
                match leaf.next {
                    Some(next) => {
                        id = next;
                        pos = 0;
                    }
                    None => break,
                }
            }
        }
        Ok(positions)
    }

    // ========== Insert ==========

    fn insert_record(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut path = Vec::new();
        let mut id = self.root;
        while let Node::Internal(internal) = self.node(id)? {
            let idx = rank(&self.layout, &internal.keys, key, true);
            path.push((id, idx));
            id = internal.children[idx];
        }

        let layout = self.layout;
        let order = self.order;
        let leaf = self.leaf_mut(id)?;
        let pos = rank(&layout, &leaf.keys, key, true);
        leaf.keys.insert(pos, key.to_vec());
        leaf.values.insert(pos, value.to_vec());
        let full = leaf.keys.len() > order;
        self.len += 1;
        if !full {
            return Ok(());
        }

        let right = self.leaf_mut(id)?.split();
        let separator = right.keys[0].clone();
        let right_id = self.alloc(Node::Leaf(right))?;
        self.leaf_mut(id)?.next = Some(right_id);
        log::debug!("Split leaf {} into {}", id, right_id);

        let mut carry = Some((separator, right_id));
        while let Some((separator, right_id)) = carry.take() {
            match path.pop() {
                Some((parent, idx)) => {
                    let internal = self.internal_mut(parent)?;
                    internal.keys.insert(idx, separator);
                    internal.children.insert(idx + 1, right_id);
                    if internal.keys.len() > order {
                        let (promoted, new_right) = internal.split();
                        let new_id = self.alloc(Node::Internal(new_right))?;
                        log::debug!("Split internal node {} into {}", parent, new_id);
                        carry = Some((promoted, new_id));
                    }
                }
                None => {
                    let old_root = self.root;
                    self.root = self.alloc(Node::Internal(Internal {
                        keys: vec![separator],
                        children: vec![old_root, right_id],
                    }))?;
                    log::debug!("Grew new root {}", self.root);
                }
            }
        }
        Ok(())
    }

    // ========== Delete ==========

    /// Removes the first record with `key` below node `id`, rebalancing on
    /// the way back up. Returns false if no record matched.
    fn remove_one(&mut self, id: NodeId, key: &[u8]) -> Result<bool> {
        let layout = self.layout;
        let (lo, hi) = match self.node_mut(id)? {
            Node::Leaf(leaf) => {
                let pos = rank(&layout, &leaf.keys, key, false);
                if pos < leaf.keys.len() && layout.compare(&leaf.keys[pos], key) == Ordering::Equal
                {
                    leaf.keys.remove(pos);
                    leaf.values.remove(pos);
                    return Ok(true);
                }
                return Ok(false);
            }
            Node::Internal(internal) => (
                rank(&layout, &internal.keys, key, false),
                rank(&layout, &internal.keys, key, true),
            ),
        };

        // Equal keys may sit in any child between the two ranks.
        for idx in lo..=hi {
            let child = self.internal(id)?.children[idx];
            if self.remove_one(child, key)? {
                self.rebalance(id, idx)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Restores minimum occupancy of `children[idx]` of `parent`.
    fn rebalance(&mut self, parent: NodeId, idx: usize) -> Result<()> {
        let children = self.internal(parent)?.children.clone();
        let child = children[idx];
        let is_leaf = matches!(self.node(child)?, Node::Leaf(_));
        let min = if is_leaf { self.min_leaf() } else { self.min_internal() };
        if self.node(child)?.len() >= min {
            return Ok(());
        }

        let left = idx.checked_sub(1).map(|i| children[i]);
        let right = children.get(idx + 1).copied();

        if let Some(left) = left {
            if self.node(left)?.len() > min {
                return self.borrow_from_left(parent, idx, left, child);
            }
        }
        if let Some(right) = right {
            if self.node(right)?.len() > min {
                return self.borrow_from_right(parent, idx, child, right);
            }
        }
        match (left, right) {
            (Some(left), _) => self.merge(parent, idx - 1, left, child),
            (None, Some(right)) => self.merge(parent, idx, child, right),
            (None, None) => Ok(()),
        }
    }

    fn borrow_from_left(
        &mut self,
        parent: NodeId,
        idx: usize,
        left: NodeId,
        child: NodeId,
    ) -> Result<()> {
        match self.node_mut(left)? {
            Node::Leaf(l) => {
                let (key, value) = match (l.keys.pop(), l.values.pop()) {
                    (Some(k), Some(v)) => (k, v),
                    _ => return Err(Error::corruption("borrow from empty leaf")),
                };
                self.internal_mut(parent)?.keys[idx - 1] = key.clone();
                let leaf = self.leaf_mut(child)?;
                leaf.keys.insert(0, key);
                leaf.values.insert(0, value);
            }
            Node::Internal(l) => {
                let (key, grandchild) = match (l.keys.pop(), l.children.pop()) {
                    (Some(k), Some(c)) => (k, c),
                    _ => return Err(Error::corruption("borrow from empty internal node")),
                };
                let separator =
                    std::mem::replace(&mut self.internal_mut(parent)?.keys[idx - 1], key);
                let internal = self.internal_mut(child)?;
                internal.keys.insert(0, separator);
                internal.children.insert(0, grandchild);
            }
        }
        Ok(())
    }

    fn borrow_from_right(
        &mut self,
        parent: NodeId,
        idx: usize,
        child: NodeId,
        right: NodeId,
    ) -> Result<()> {
        match self.node_mut(right)? {
            Node::Leaf(r) => {
                let key = r.keys.remove(0);
                let value = r.values.remove(0);
                let new_first = r.keys[0].clone();
                self.internal_mut(parent)?.keys[idx] = new_first;
                let leaf = self.leaf_mut(child)?;
                leaf.keys.push(key);
                leaf.values.push(value);
            }
            Node::Internal(r) => {
                let key = r.keys.remove(0);
                let grandchild = r.children.remove(0);
                let separator = std::mem::replace(&mut self.internal_mut(parent)?.keys[idx], key);
                let internal = self.internal_mut(child)?;
                internal.keys.push(separator);
                internal.children.push(grandchild);
            }
        }
        Ok(())
    }

    /// Folds `right` into `left`; they are `children[sep]` and
    /// `children[sep + 1]` of `parent`.
    fn merge(&mut self, parent: NodeId, sep: usize, left: NodeId, right: NodeId) -> Result<()> {
        let separator = {
            let internal = self.internal_mut(parent)?;
            internal.children.remove(sep + 1);
            internal.keys.remove(sep)
        };

        match (self.take(right)?, self.node_mut(left)?) {
            (Node::Leaf(r), Node::Leaf(l)) => {
                l.keys.extend(r.keys);
                l.values.extend(r.values);
                l.next = r.next;
            }
            (Node::Internal(r), Node::Internal(l)) => {
                l.keys.push(separator);
                l.keys.extend(r.keys);
                l.children.extend(r.children);
            }
            _ => return Err(Error::corruption("merging nodes of different kinds")),
        }
        log::debug!("Merged node {} into {}", right, left);
        Ok(())
    }

    /// Replaces an internal root left with a single child by that child.
    fn collapse_root(&mut self) -> Result<()> {
        if let Node::Internal(internal) = self.node(self.root)? {
            if internal.keys.is_empty() {
                let only_child = internal.children[0];
                self.take(self.root)?;
                self.root = only_child;
                log::debug!("Collapsed root into {}", only_child);
            }
        }
        Ok(())
    }
}

impl DictionaryEngine for BPlusTree {
    fn dictionary_type(&self) -> DictionaryType {
        DictionaryType::BPlusTree
    }

    fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    fn set_write_concern(&mut self, concern: WriteConcern) -> Result<()> {
        self.write_concern = concern;
        Ok(())
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        match self.write_concern {
            WriteConcern::Duplicate => {}
            WriteConcern::InsertUnique => {
                if !self.positions_of(key)?.is_empty() {
                    return Err(Error::DuplicateKey);
                }
            }
            WriteConcern::Update => return self.update(key, value),
        }
        self.insert_record(key, value)?;
        Ok(1)
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let (id, pos) = self.seek(key)?.ok_or(Error::ItemNotFound)?;
        let leaf = self.leaf(id)?;
        if self.layout.compare(&leaf.keys[pos], key) != Ordering::Equal {
            return Err(Error::ItemNotFound);
        }
        Ok(leaf.values[pos].clone())
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        let positions = self.positions_of(key)?;
        if positions.is_empty() {
            self.insert_record(key, value)?;
            return Ok(1);
        }
        for &(id, pos) in &positions {
            self.leaf_mut(id)?.values[pos].copy_from_slice(value);
        }
        Ok(positions.len() as u32)
    }

    fn delete(&mut self, key: &[u8]) -> Result<u32> {
        let mut count = 0;
        while self.remove_one(self.root, key)? {
            self.collapse_root()?;
            self.len -= 1;
            count += 1;
        }
        if count == 0 {
            return Err(Error::ItemNotFound);
        }
        Ok(count)
    }

    fn find<'a>(&'a self, predicate: &Predicate) -> Result<Box<dyn RecordSource + 'a>> {
        let position = match predicate.lower_bound() {
            Some(lower) => self.seek(lower)?,
            None => Some((self.first_leaf()?, 0)),
        };
        Ok(Box::new(BPlusTreeSource { tree: self, predicate: predicate.clone(), position }))
    }

    fn record_count(&self) -> Result<usize> {
        Ok(self.len)
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Walks the leaf chain from the first candidate until a key passes the
/// predicate's upper bound.
struct BPlusTreeSource<'a> {
    tree: &'a BPlusTree,
    predicate: Predicate,
    position: Option<(NodeId, usize)>,
}

impl RecordSource for BPlusTreeSource<'_> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let layout = &self.tree.layout;
        while let Some((id, pos)) = self.position {
            let leaf = self.tree.leaf(id)?;
            if pos >= leaf.keys.len() {
                self.position = leaf.next.map(|next| (next, 0));
                continue;
            }

            let key = &leaf.keys[pos];
            if let Some(upper) = self.predicate.upper_bound() {
                if layout.compare(key, upper) == Ordering::Greater {
                    self.position = None;
                    break;
                }
            }
            self.position = Some((id, pos + 1));
            if self.predicate.matches(layout, key) {
                return Ok(Some(Record::new(key, &leaf.values[pos])));
            }
        }
        Ok(None)
    }
}
