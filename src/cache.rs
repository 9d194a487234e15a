use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use itertools::Itertools;
use log::*;

use crate::model::{Book, BookPage, LibrarySummary};

/// Logical label attached to cache entries. There is a single collection-wide
/// tag: any book mutation drops every cached read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Book,
}

/// What a cached read was asked for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BookQuery {
    Page { page: u32, limit: u32 },
    Search(String),
    Summary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cached {
    Page(BookPage),
    Search(Vec<Book>),
    Summary(LibrarySummary),
}

#[derive(Debug, Clone)]
struct Entry<V> {
    tags: BTreeSet<Tag>,
    value: V,
}

/// Map from query key to value plus the tags it was stored under.
/// Inserting the same key again overwrites, so the last response to land wins.
#[derive(Debug, Clone)]
pub struct TagCache<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> Default for TagCache<K, V> {
    fn default() -> Self {
        TagCache {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + std::fmt::Debug, V> TagCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let hit = self.entries.get(key).map(|e| &e.value);
        debug!("Cache {} for {:?}", if hit.is_some() { "hit" } else { "miss" }, key);
        hit
    }

    pub fn insert(&mut self, key: K, value: V, tags: &[Tag]) {
        let tags = tags.iter().copied().collect();
        self.entries.insert(key, Entry { tags, value });
    }

    /// Drops every entry carrying at least one of `tags`. Returns how many went.
    pub fn invalidate(&mut self, tags: &[Tag]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !tags.iter().any(|t| entry.tags.contains(t)));
        let dropped = before - self.entries.len();
        debug!(
            "Invalidated [{}]: dropped {} entries",
            tags.iter().map(|t| format!("{:?}", t)).join(", "),
            dropped
        );
        dropped
    }

    pub fn tags_of(&self, key: &K) -> Option<&BTreeSet<Tag>> {
        self.entries.get(key).map(|e| &e.tags)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
