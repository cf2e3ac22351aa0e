//! In-memory skip list.
//!
//! Nodes live in an arena and link to each other by index. Each node gets a
//! random tower height: it is promoted one level with probability
//! `skip_list_promotion`, up to `skip_list_max_height`. Duplicate keys are
//! kept next to each other in insertion order.

use crate::config::{DictionaryConfig, DictionaryType, Options, WriteConcern};
use crate::cursor::RecordSource;
use crate::dictionary::DictionaryEngine;
use crate::error::{Error, Result};
use crate::predicate::Predicate;
use crate::record::{Record, RecordLayout};
use rand::Rng;
use std::cmp::Ordering;

type NodeId = usize;

#[derive(Debug)]
struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    /// Forward links, one per level of the tower.
    next: Vec<Option<NodeId>>,
}

/// A skip list dictionary.
#[derive(Debug)]
pub struct SkipList {
    layout: RecordLayout,
    /// Forward links of the head tower.
    head: Vec<Option<NodeId>>,
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    max_height: usize,
    promotion: f64,
    len: usize,
    write_concern: WriteConcern,
}

impl SkipList {
    /// Creates an empty skip list.
    pub fn create(config: &DictionaryConfig, options: &Options) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            layout: config.layout(),
            head: vec![None; options.skip_list_max_height],
            nodes: Vec::new(),
            free: Vec::new(),
            max_height: options.skip_list_max_height,
            promotion: options.skip_list_promotion,
            len: 0,
            write_concern: options
                .write_concern
                .unwrap_or(DictionaryType::SkipList.default_write_concern()),
        })
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).and_then(Option::as_ref).ok_or(Error::OutOfBounds)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).and_then(Option::as_mut).ok_or(Error::OutOfBounds)
    }

    /// Successor of `from` at `level`, where `None` is the head tower.
    fn next_of(&self, from: Option<NodeId>, level: usize) -> Result<Option<NodeId>> {
        match from {
            None => Ok(self.head[level]),
            Some(id) => Ok(self.node(id)?.next[level]),
        }
    }

    fn set_next(&mut self, from: Option<NodeId>, level: usize, to: Option<NodeId>) -> Result<()> {
        match from {
            None => self.head[level] = to,
            Some(id) => self.node_mut(id)?.next[level] = to,
        }
        Ok(())
    }

    /// For each level, the last node whose key is below `key` (or, with
    /// `inclusive`, at most `key`).
    fn predecessors(&self, key: &[u8], inclusive: bool) -> Result<Vec<Option<NodeId>>> {
        let mut preds = vec![None; self.max_height];
        let mut cursor: Option<NodeId> = None;

        for level in (0..self.max_height).rev() {
            while let Some(next) = self.next_of(cursor, level)? {
                let ord = self.layout.compare(&self.node(next)?.key, key);
                if ord == Ordering::Less || (inclusive && ord == Ordering::Equal) {
                    cursor = Some(next);
                } else {
                    break;
                }
            }
            preds[level] = cursor;
        }
        Ok(preds)
    }

    /// First node whose key is at least `key`.
    fn seek(&self, key: &[u8]) -> Result<Option<NodeId>> {
        let preds = self.predecessors(key, false)?;
        self.next_of(preds[0], 0)
    }

    fn random_height(&self) -> usize {
        let mut rng = rand::rng();
        let mut height = 1;
        while height < self.max_height && rng.random_bool(self.promotion) {
            height += 1;
        }
        height
    }

    fn is_key(&self, id: Option<NodeId>, key: &[u8]) -> Result<Option<NodeId>> {
        match id {
            Some(id) if self.layout.compare(&self.node(id)?.key, key) == Ordering::Equal => {
                Ok(Some(id))
            }
            _ => Ok(None),
        }
    }

    /// Splices a record in after every existing record with an equal key.
    fn insert_node(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let preds = self.predecessors(key, true)?;
        let height = self.random_height();

        let mut next = Vec::with_capacity(height);
        for (level, pred) in preds.iter().enumerate().take(height) {
            next.push(self.next_of(*pred, level)?);
        }
        let node = Node { key: key.to_vec(), value: value.to_vec(), next };

        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        for (level, pred) in preds.into_iter().enumerate().take(height) {
            self.set_next(pred, level, Some(id))?;
        }
        self.len += 1;
        Ok(())
    }
}

impl DictionaryEngine for SkipList {
    fn dictionary_type(&self) -> DictionaryType {
        DictionaryType::SkipList
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
                if self.is_key(self.seek(key)?, key)?.is_some() {
                    return Err(Error::DuplicateKey);
                }
            }
            WriteConcern::Update => return self.update(key, value),
        }
        self.insert_node(key, value)?;
        Ok(1)
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let id = self.is_key(self.seek(key)?, key)?.ok_or(Error::ItemNotFound)?;
        Ok(self.node(id)?.value.clone())
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<u32> {
        let mut cursor = self.is_key(self.seek(key)?, key)?;
        if cursor.is_none() {
            self.insert_node(key, value)?;
            return Ok(1);
        }

        let mut count = 0;
        while let Some(id) = cursor {
            let node = self.node_mut(id)?;
            node.value.copy_from_slice(value);
            let next = node.next[0];
            count += 1;
            cursor = self.is_key(next, key)?;
        }
        Ok(count)
    }

    fn delete(&mut self, key: &[u8]) -> Result<u32> {
        let preds = self.predecessors(key, false)?;
        let mut count = 0;

        while let Some(id) = self.is_key(self.next_of(preds[0], 0)?, key)? {
            let next = std::mem::take(&mut self.node_mut(id)?.next);
            for (level, successor) in next.into_iter().enumerate() {
                if self.next_of(preds[level], level)? == Some(id) {
                    self.set_next(preds[level], level, successor)?;
                }
            }
            self.nodes[id] = None;
            self.free.push(id);
            self.len -= 1;
            count += 1;
        }

        if count == 0 {
            return Err(Error::ItemNotFound);
        }
        Ok(count)
    }

    fn find<'a>(&'a self, predicate: &Predicate) -> Result<Box<dyn RecordSource + 'a>> {
        let current = match predicate.lower_bound() {
            Some(lower) => self.seek(lower)?,
            None => self.head[0],
        };
        Ok(Box::new(SkipListSource { list: self, predicate: predicate.clone(), current }))
    }

    fn record_count(&self) -> Result<usize> {
        Ok(self.len)
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct SkipListSource<'a> {
    list: &'a SkipList,
    predicate: Predicate,
    current: Option<NodeId>,
}

impl RecordSource for SkipListSource<'_> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let layout = &self.list.layout;
        while let Some(id) = self.current {
            let node = self.list.node(id)?;
            if let Some(upper) = self.predicate.upper_bound() {
                if layout.compare(&node.key, upper) == Ordering::Greater {
                    self.current = None;
                    break;
                }
            }
            self.current = node.next[0];
            if self.predicate.matches(layout, &node.key) {
                return Ok(Some(Record::new(&node.key, &node.value)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::key::{decode_i64, encode_i64, KeyType};

    fn list(options: &Options) -> SkipList {
        let config = DictionaryConfig::new(DictionaryType::SkipList, KeyType::NumericSigned, 4, 4);
        SkipList::create(&config, options).unwrap()
    }

    fn k(v: i64) -> Vec<u8> {
        encode_i64(v, 4)
    }

    fn keys(list: &SkipList, predicate: &Predicate) -> Vec<i64> {
        Cursor::new(list.find(predicate).unwrap())
            .unwrap()
            .map(|r| decode_i64(&r.unwrap().key))
            .collect()
    }

    fn check_levels_sorted(list: &SkipList) {
        for level in 0..list.max_height {
            let mut cursor = list.head[level];
            let mut prev: Option<Vec<u8>> = None;
            while let Some(id) = cursor {
                let node = list.node(id).unwrap();
                if let Some(p) = &prev {
                    assert_ne!(list.layout.compare(p, &node.key), Ordering::Greater);
                }
                prev = Some(node.key.clone());
                cursor = node.next[level];
            }
        }
    }

    #[test]
    fn test_ordered_iteration() {
        let mut sl = list(&Options::default());
        for v in [50, -3, 70, 5, 25, 10, -40] {
            sl.insert(&k(v), &k(v)).unwrap();
        }
        assert_eq!(keys(&sl, &Predicate::All), vec![-40, -3, 5, 10, 25, 50, 70]);
        assert_eq!(keys(&sl, &Predicate::range(k(15), k(55))), vec![25, 50]);
        check_levels_sorted(&sl);
    }

    #[test]
    fn test_duplicates_keep_insertion_order() {
        let mut sl = list(&Options::default());
        sl.insert(&k(1), &k(10)).unwrap();
        sl.insert(&k(2), &k(20)).unwrap();
        sl.insert(&k(2), &k(21)).unwrap();
        sl.insert(&k(2), &k(22)).unwrap();

        let values: Vec<i64> = Cursor::new(sl.find(&Predicate::equality(k(2))).unwrap())
            .unwrap()
            .map(|r| decode_i64(&r.unwrap().value))
            .collect();
        assert_eq!(values, vec![20, 21, 22]);
        assert_eq!(sl.get(&k(2)).unwrap(), k(20));

        assert_eq!(sl.update(&k(2), &k(0)).unwrap(), 3);
        assert_eq!(sl.delete(&k(2)).unwrap(), 3);
        assert_eq!(sl.record_count().unwrap(), 1);
        check_levels_sorted(&sl);
    }

    #[test]
    fn test_delete_relinks_all_levels() {
        let mut sl = list(&Options::default().skip_list_max_height(6));
        for v in 0..200 {
            sl.insert(&k(v), &k(v)).unwrap();
        }
        for v in (0..200).step_by(3) {
            assert_eq!(sl.delete(&k(v)).unwrap(), 1);
        }
        check_levels_sorted(&sl);
        for v in 0..200 {
            assert_eq!(sl.get(&k(v)).is_ok(), v % 3 != 0);
        }
        assert!(matches!(sl.delete(&k(0)), Err(Error::ItemNotFound)));

        // Freed slots are reused.
        let arena = sl.nodes.len();
        sl.insert(&k(0), &k(0)).unwrap();
        assert_eq!(sl.nodes.len(), arena);
    }

    #[test]
    fn test_unique_concern() {
        let opts = Options::default().write_concern(WriteConcern::InsertUnique);
        let mut sl = list(&opts);
        sl.insert(&k(4), &k(1)).unwrap();
        assert!(matches!(sl.insert(&k(4), &k(2)), Err(Error::DuplicateKey)));
        assert_eq!(sl.get(&k(4)).unwrap(), k(1));
    }
}
