//! Sibling identity: `(match_name, ordinal)` where the ordinal counts earlier
//! siblings with the same name, in sibling order. The same rule runs on export
//! (to label children) and on import (to find the live counterpart), so an
//! unmodified tree always maps onto itself.
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use indexmap::{Equivalent, IndexMap};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiblingKey {
    pub match_name: String,
    pub ordinal: usize,
}

impl SiblingKey {
    pub fn new(match_name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            match_name: match_name.into(),
            ordinal,
        }
    }

    /// Child-map key: `match_name#ordinal`.
    pub fn label(&self) -> String {
        format!("{}#{}", self.match_name, self.ordinal)
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        let (name, ord) = label.rsplit_once('#')?;
        Some(Self::new(name, ord.parse().ok()?))
    }
}

impl fmt::Display for SiblingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.match_name, self.ordinal)
    }
}

/// Hands out first-seen ordinals per key.
#[derive(Debug)]
pub struct OrdinalCounter<K> {
    seen: HashMap<K, usize>,
}

impl<K> Default for OrdinalCounter<K> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq> OrdinalCounter<K> {
    pub fn next(&mut self, key: K) -> usize {
        let slot = self.seen.entry(key).or_insert(0);
        let ord = *slot;
        *slot += 1;
        ord
    }
}

impl OrdinalCounter<String> {
    /// Ordinal of a mapping child: the one its `match_name#n` label carries,
    /// else the next positional one. Labels survive siblings the exporter
    /// left out; positions do not.
    pub fn for_child(&mut self, label: Option<&str>, match_name: &str) -> usize {
        match label.and_then(SiblingKey::parse_label) {
            Some(key) if key.match_name == match_name => key.ordinal,
            _ => self.next(match_name.to_string()),
        }
    }
}

pub fn assign_ordinals<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<SiblingKey> {
    let mut counter = OrdinalCounter::default();
    names
        .into_iter()
        .map(|n| SiblingKey::new(n, counter.next(n)))
        .collect()
}

/// Ordered multimap over one sibling group: key -> handles in sibling order.
/// Built once per group and queried by `(key, ordinal)`.
#[derive(Debug)]
pub struct SiblingIndex<K, V> {
    map: IndexMap<K, Vec<V>>,
}

impl<K: Hash + Eq, V: Copy> SiblingIndex<K, V> {
    pub fn build(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut map: IndexMap<K, Vec<V>> = IndexMap::new();
        for (k, v) in entries {
            map.entry(k).or_default().push(v);
        }
        Self { map }
    }

    pub fn get<Q>(&self, key: &Q, ordinal: usize) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.get(key).and_then(|vs| vs.get(ordinal)).copied()
    }

    pub fn count<Q>(&self, key: &Q) -> usize
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.map.get(key).map_or(0, Vec::len)
    }

    /// Record a handle created after the index was built.
    pub fn push(&mut self, key: K, value: V) {
        self.map.entry(key).or_default().push(value);
    }
}

/// Location of a node in the project tree, used to tag recorded errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segs = self.0.clone();
        segs.push(segment.into());
        Self(segs)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.0 {
            write!(f, "/{}", seg)?;
        }
        Ok(())
    }
}
