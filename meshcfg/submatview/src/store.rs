use crate::{Error, Materializer, View};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, hash::Hash, sync::Arc, time::Duration};

/// Creates the materializer for a key that has none.
pub type NewMaterializer<K, T> = Box<dyn Fn(&K) -> Materializer<T> + Send + Sync>;

/// Shares one materializer per key among all callers.
///
/// Materializers outlive the fetches that create them so that later callers
/// reuse them. They are only dropped through [`Store::remove`].
pub struct Store<K, T> {
    materializers: RwLock<HashMap<K, Arc<Materializer<T>>>>,
    new_materializer: NewMaterializer<K, T>,
}

// === impl Store ===

impl<K, T> Store<K, T>
where
    K: Clone + Eq + Hash + std::fmt::Debug,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(new_materializer: impl Fn(&K) -> Materializer<T> + Send + Sync + 'static) -> Self {
        Self {
            materializers: RwLock::new(HashMap::new()),
            new_materializer: Box::new(new_materializer),
        }
    }

    /// Returns a view of `key` newer than `min_index`, creating its
    /// materializer if necessary.
    ///
    /// If no newer view arrives within `timeout`, the latest known view is
    /// returned instead; the caller can tell from its index that nothing
    /// changed.
    pub async fn fetch(&self, key: &K, min_index: u64, timeout: Duration) -> Result<View<T>, Error> {
        let materializer = self.get_or_create(key);
        match tokio::time::timeout(timeout, materializer.fetch(min_index)).await {
            Ok(res) => res,
            Err(_) => {
                tracing::trace!(?key, min_index, "timed out waiting for view");
                materializer.latest().ok_or(Error::Timeout)
            }
        }
    }

    /// Drops the materializer for `key`. Its task stops once in-flight
    /// fetches release it.
    pub fn remove(&self, key: &K) -> bool {
        self.materializers.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.materializers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_create(&self, key: &K) -> Arc<Materializer<T>> {
        if let Some(m) = self.materializers.read().get(key) {
            return m.clone();
        }

        // Another caller may have created it since the read lock was released.
        match self.materializers.write().entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                tracing::debug!(?key, "creating materializer");
                let m = Arc::new((self.new_materializer)(key));
                entry.insert(m.clone());
                m
            }
        }
    }
}
