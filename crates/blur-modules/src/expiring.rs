//! Tick-counted entries grouped by subject.
//!
//! The shared core of cooldowns and potion effects: every entry carries a
//! remaining tick count (or none, for entries that never expire on their
//! own). [`ExpiringEntries::tick`] decrements each counted entry once and
//! hands every entry reaching zero to a completion hook exactly once.

use std::collections::BTreeMap;

/// One stored value and its remaining lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<V> {
    /// Stored value.
    pub value: V,
    /// Ticks left; `None` never expires.
    pub remaining: Option<u64>,
}

impl<V> Entry<V> {
    /// Whether this entry outlasts `other` (an endless entry outlasts
    /// everything).
    pub fn outlasts(&self, other: Option<u64>) -> bool {
        match (self.remaining, other) {
            (None, Some(_)) => true,
            (Some(mine), Some(theirs)) => mine > theirs,
            (_, None) => false,
        }
    }
}

/// Entries keyed by subject, then by key.
#[derive(Debug, Clone)]
pub struct ExpiringEntries<S, K, V> {
    entries: BTreeMap<S, BTreeMap<K, Entry<V>>>,
}

impl<S, K, V> Default for ExpiringEntries<S, K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<S: Ord + Copy, K: Ord + Clone, V> ExpiringEntries<S, K, V> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry, returning the one it replaced.
    pub fn insert(&mut self, subject: S, key: K, value: V, remaining: Option<u64>) -> Option<Entry<V>> {
        self.entries
            .entry(subject)
            .or_default()
            .insert(key, Entry { value, remaining })
    }

    /// Look up an entry.
    pub fn get(&self, subject: S, key: &K) -> Option<&Entry<V>> {
        self.entries.get(&subject)?.get(key)
    }

    /// Remove an entry.
    pub fn remove(&mut self, subject: S, key: &K) -> Option<Entry<V>> {
        let bucket = self.entries.get_mut(&subject)?;
        let removed = bucket.remove(key);
        if bucket.is_empty() {
            self.entries.remove(&subject);
        }
        removed
    }

    /// Remove every entry of a subject.
    pub fn remove_subject(&mut self, subject: S) -> Vec<(K, Entry<V>)> {
        self.entries
            .remove(&subject)
            .map(|bucket| bucket.into_iter().collect())
            .unwrap_or_default()
    }

    /// Remove a subject's entries for which `keep` returns `false`.
    pub fn retain(&mut self, subject: S, mut keep: impl FnMut(&K, &Entry<V>) -> bool) -> Vec<(K, Entry<V>)> {
        let Some(bucket) = self.entries.get_mut(&subject) else {
            return Vec::new();
        };
        let doomed: Vec<K> = bucket
            .iter()
            .filter(|(k, e)| !keep(*k, *e))
            .map(|(k, _)| k.clone())
            .collect();
        let removed = doomed
            .into_iter()
            .filter_map(|k| bucket.remove(&k).map(|e| (k, e)))
            .collect();
        if bucket.is_empty() {
            self.entries.remove(&subject);
        }
        removed
    }

    /// Entries of one subject.
    pub fn entries_of(&self, subject: S) -> impl Iterator<Item = (&K, &Entry<V>)> {
        self.entries.get(&subject).into_iter().flatten()
    }

    /// Subjects with at least one entry.
    pub fn subjects(&self) -> Vec<S> {
        self.entries.keys().copied().collect()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advance one tick. Counted entries lose a tick; those reaching zero
    /// are removed and passed to `on_expire`.
    pub fn tick(&mut self, mut on_expire: impl FnMut(S, K, V)) {
        let mut expired = Vec::new();
        for (subject, bucket) in &mut self.entries {
            for (key, entry) in bucket.iter_mut() {
                if let Some(left) = entry.remaining.as_mut() {
                    *left = left.saturating_sub(1);
                    if *left == 0 {
                        expired.push((*subject, key.clone()));
                    }
                }
            }
        }
        for (subject, key) in expired {
            if let Some(entry) = self.remove(subject, &key) {
                on_expire(subject, key, entry.value);
            }
        }
    }
}
