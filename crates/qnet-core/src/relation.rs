//! Keyed multi-relations
//!
//! Every address-keyed and slot-keyed lookup in the engine is a [`MultiMap`]:
//! keys iterate in order, values under one key iterate in insertion order.

use std::collections::btree_map;
use std::collections::{BTreeMap, VecDeque};

/// Ordered map from key to a FIFO of values
#[derive(Clone, Debug)]
pub struct MultiMap<K, V> {
    entries: BTreeMap<K, VecDeque<V>>,
    len: usize,
}

impl<K: Ord, V> Default for MultiMap<K, V> {
    fn default() -> Self {
        MultiMap {
            entries: BTreeMap::new(),
            len: 0,
        }
    }
}

impl<K: Ord + Clone, V> MultiMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.entry(key).or_default().push_back(value);
        self.len += 1;
    }

    /// Values under `key`, oldest first
    pub fn get(&self, key: &K) -> impl Iterator<Item = &V> + '_ {
        self.entries.get(key).into_iter().flat_map(|values| values.iter())
    }

    /// The `n`th value under `key`
    pub fn nth(&self, key: &K, n: usize) -> Option<&V> {
        self.entries.get(key).and_then(|values| values.get(n))
    }

    pub fn count(&self, key: &K) -> usize {
        self.entries.get(key).map_or(0, VecDeque::len)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove and return the oldest value under `key`
    pub fn pop_front(&mut self, key: &K) -> Option<V> {
        let values = self.entries.get_mut(key)?;
        let value = values.pop_front();
        if values.is_empty() {
            self.entries.remove(key);
        }
        if value.is_some() {
            self.len -= 1;
        }
        value
    }

    /// Remove the first value under `key` matching `pred`
    pub fn remove_first<F>(&mut self, key: &K, mut pred: F) -> Option<V>
    where
        F: FnMut(&V) -> bool,
    {
        let values = self.entries.get_mut(key)?;
        let pos = values.iter().position(|v| pred(v))?;
        let value = values.remove(pos);
        if values.is_empty() {
            self.entries.remove(key);
        }
        if value.is_some() {
            self.len -= 1;
        }
        value
    }

    /// Remove the first value anywhere matching `pred`, returning it with its key
    pub fn remove_any<F>(&mut self, mut pred: F) -> Option<(K, V)>
    where
        F: FnMut(&V) -> bool,
    {
        let key = self
            .entries
            .iter()
            .find(|(_, values)| values.iter().any(&mut pred))
            .map(|(k, _)| k.clone())?;
        let value = self.remove_first(&key, pred)?;
        Some((key, value))
    }

    /// Find the key holding the first value matching `pred`
    pub fn find_key<F>(&self, mut pred: F) -> Option<&K>
    where
        F: FnMut(&V) -> bool,
    {
        self.entries
            .iter()
            .find(|(_, values)| values.iter().any(&mut pred))
            .map(|(k, _)| k)
    }

    /// Remove every value, in key order then insertion order
    pub fn drain_all(&mut self) -> Vec<(K, V)> {
        let entries = std::mem::take(&mut self.entries);
        self.len = 0;
        entries
            .into_iter()
            .flat_map(|(k, values)| values.into_iter().map(move |v| (k.clone(), v)))
            .collect()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, K, VecDeque<V>> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k, v)))
    }

    /// Number of keys with at least one value
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of values
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
