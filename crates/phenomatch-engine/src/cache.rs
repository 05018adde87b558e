//! Memoized similarity views.
//!
//! Entries are keyed by (match patient, reference patient, access tier). A
//! reverse index from patient id to keys lets one patient's entries be
//! dropped when its record changes. Both maps live behind one lock so the
//! index can never disagree with the entries.
//!
//! Views are built outside the lock. Every invalidation bumps a generation
//! counter, and a view built across an invalidation is returned to its caller
//! but not stored.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use phenomatch_types::AccessTier;

use crate::view::RedactedView;

/// Cache key for one rendered view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    /// Matched patient id.
    pub match_id: String,
    /// Reference patient id.
    pub reference_id: String,
    /// Access tier name.
    pub tier: String,
}

impl ViewKey {
    /// Creates a key.
    pub fn new(match_id: &str, reference_id: &str, tier: AccessTier) -> Self {
        Self {
            match_id: match_id.to_string(),
            reference_id: reference_id.to_string(),
            tier: tier.name().to_string(),
        }
    }
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<ViewKey, V>,
    by_patient: HashMap<String, HashSet<ViewKey>>,
    generation: u64,
}

impl<V> Default for CacheInner<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            by_patient: HashMap::new(),
            generation: 0,
        }
    }
}

impl<V> CacheInner<V> {
    fn insert(&mut self, key: ViewKey, view: V) {
        self.index(&key.match_id, &key);
        self.index(&key.reference_id, &key);
        self.entries.insert(key, view);
    }

    fn index(&mut self, patient_id: &str, key: &ViewKey) {
        self.by_patient
            .entry(patient_id.to_string())
            .or_default()
            .insert(key.clone());
    }

    fn unindex(&mut self, patient_id: &str, key: &ViewKey) {
        if let Some(keys) = self.by_patient.get_mut(patient_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_patient.remove(patient_id);
            }
        }
    }
}

/// Concurrent view cache with per-patient invalidation.
pub struct SimilarityViewCache<V = Arc<RedactedView>> {
    inner: RwLock<CacheInner<V>>,
}

impl<V> std::fmt::Debug for SimilarityViewCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SimilarityViewCache")
            .field("entries", &inner.entries.len())
            .field("patients", &inner.by_patient.len())
            .finish()
    }
}

impl<V> Default for SimilarityViewCache<V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
        }
    }
}

impl<V: Clone> SimilarityViewCache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached view.
    pub fn get(&self, key: &ViewKey) -> Option<V> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(key).cloned()
    }

    /// Stores a view and indexes it under both patient ids of the key.
    pub fn set(&self, key: ViewKey, view: V) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(key, view);
    }

    /// Returns the cached view or builds, stores and returns a new one.
    ///
    /// If any invalidation happens while `build` runs, the fresh view is
    /// returned but not cached, since it may reflect the old data.
    pub fn get_or_insert_with<F>(&self, key: ViewKey, build: F) -> V
    where
        F: FnOnce() -> V,
    {
        let started = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(view) = inner.entries.get(&key) {
                return view.clone();
            }
            inner.generation
        };

        let view = build();

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.generation == started {
            inner.insert(key, view.clone());
        } else {
            tracing::debug!("Not caching view for {:?}, invalidated while building", key);
        }
        view
    }

    /// Drops every entry involving a patient. Returns how many were removed.
    pub fn invalidate(&self, patient_id: &str) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.generation += 1;
        let Some(keys) = inner.by_patient.remove(patient_id) else {
            return 0;
        };
        for key in &keys {
            inner.entries.remove(key);
            let other = if key.match_id == patient_id {
                &key.reference_id
            } else {
                &key.match_id
            };
            inner.unindex(other, key);
        }
        keys.len()
    }

    /// Drops everything.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.generation += 1;
        inner.entries.clear();
        inner.by_patient.clear();
    }

    /// Number of cached views.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of patients with at least one indexed entry.
    pub fn indexed_patients(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_patient
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_set() {
        let cache: SimilarityViewCache<String> = SimilarityViewCache::new();
        let key = ViewKey::new("P0000002", "P0000001", AccessTier::Limited);
        assert!(cache.get(&key).is_none());

        cache.set(key.clone(), "view".to_string());
        assert_eq!(cache.get(&key).as_deref(), Some("view"));
        assert_eq!(key.tier, "limited");
    }

    #[test]
    fn test_invalidate_either_patient() {
        let cache: SimilarityViewCache<u32> = SimilarityViewCache::new();
        let k1 = ViewKey::new("P0000002", "P0000001", AccessTier::Open);
        let k2 = ViewKey::new("P0000003", "P0000001", AccessTier::Open);
        let k3 = ViewKey::new("P0000003", "P0000004", AccessTier::Private);
        cache.set(k1.clone(), 1);
        cache.set(k2.clone(), 2);
        cache.set(k3.clone(), 3);

        assert_eq!(cache.invalidate("P0000001"), 2);
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_none());
        assert_eq!(cache.get(&k3), Some(3));

        // P0000002 had only k1, so its index entry is gone too
        assert_eq!(cache.invalidate("P0000002"), 0);
        assert_eq!(cache.indexed_patients(), 2);

        assert_eq!(cache.invalidate("P0000004"), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.indexed_patients(), 0);
    }

    #[test]
    fn test_invalidate_all() {
        let cache: SimilarityViewCache<u32> = SimilarityViewCache::new();
        cache.set(ViewKey::new("a", "b", AccessTier::Open), 1);
        cache.set(ViewKey::new("c", "d", AccessTier::Open), 2);
        cache.invalidate_all();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.indexed_patients(), 0);
    }

    #[test]
    fn test_get_or_insert_with() {
        let cache: SimilarityViewCache<u32> = SimilarityViewCache::new();
        let key = ViewKey::new("a", "b", AccessTier::Open);
        assert_eq!(cache.get_or_insert_with(key.clone(), || 7), 7);
        assert_eq!(cache.get_or_insert_with(key, || 9), 7);
    }

    #[test]
    fn test_build_across_invalidation_not_cached() {
        let cache: SimilarityViewCache<u32> = SimilarityViewCache::new();
        let key = ViewKey::new("a", "b", AccessTier::Open);

        let view = cache.get_or_insert_with(key.clone(), || {
            cache.invalidate("a");
            1
        });
        assert_eq!(view, 1);
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.indexed_patients(), 0);

        // an unrelated patient's invalidation also discards the in-flight view
        cache.get_or_insert_with(key.clone(), || {
            cache.invalidate("zzz");
            2
        });
        assert!(cache.get(&key).is_none());

        assert_eq!(cache.get_or_insert_with(key.clone(), || 3), 3);
        assert_eq!(cache.get(&key), Some(3));
    }

    #[test]
    fn test_concurrent_set_and_invalidate() {
        let cache: Arc<SimilarityViewCache<usize>> = Arc::new(SimilarityViewCache::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = ViewKey::new(&format!("M{}", i), "R", AccessTier::Open);
                        cache.set(key, t * 1000 + i);
                        if i % 10 == 0 {
                            cache.invalidate(&format!("M{}", i));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        cache.invalidate("R");
        assert!(cache.is_empty());
        assert_eq!(cache.indexed_patients(), 0);
    }
}
