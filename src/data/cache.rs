//! Generation-tracked holder for intermediate datasets kept across rounds.
//!
//! A coordinate rebuilds its per-round training data (residual offsets,
//! projected features) every update. The previous generation is released
//! before the next one is built, so at most one generation is resident.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::Result;

/// Read access to one generation of cached data.
#[derive(Debug)]
pub struct CacheHandle<T> {
    generation: u64,
    data: Arc<T>,
}

impl<T> CacheHandle<T> {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<T> Clone for CacheHandle<T> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> Deref for CacheHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// A single-slot cache. Dropping the cache releases its slot.
#[derive(Debug)]
pub struct DatasetCache<T> {
    name: String,
    generation: u64,
    resident: Option<Arc<T>>,
}

impl<T> DatasetCache<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generation: 0,
            resident: None,
        }
    }

    /// Release the current generation, then build and retain the next one.
    ///
    /// If `build` fails the cache is left empty.
    pub fn refresh(&mut self, build: impl FnOnce() -> Result<T>) -> Result<CacheHandle<T>> {
        self.release();
        let data = Arc::new(build()?);
        self.generation += 1;
        self.resident = Some(Arc::clone(&data));
        log::trace!("cache '{}': generation {} resident", self.name, self.generation);
        Ok(CacheHandle {
            generation: self.generation,
            data,
        })
    }

    /// Drop the resident generation. Returns whether anything was released.
    pub fn release(&mut self) -> bool {
        match self.resident.take() {
            Some(data) => {
                let outstanding = Arc::strong_count(&data) - 1;
                if outstanding > 0 {
                    log::debug!(
                        "cache '{}': releasing generation {} with {outstanding} outstanding handle(s)",
                        self.name,
                        self.generation
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Handle to the resident generation, if any.
    pub fn current(&self) -> Option<CacheHandle<T>> {
        self.resident.as_ref().map(|data| CacheHandle {
            generation: self.generation,
            data: Arc::clone(data),
        })
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn is_resident(&self) -> bool {
        self.resident.is_some()
    }

    /// Whether `handle` refers to the resident generation.
    pub fn is_current(&self, handle: &CacheHandle<T>) -> bool {
        self.resident.is_some() && handle.generation == self.generation
    }
}

impl<T> Drop for DatasetCache<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GameError;

    #[test]
    fn refresh_replaces_generation() {
        let mut cache = DatasetCache::new("entities");
        let first = cache.refresh(|| Ok(vec![1, 2, 3])).unwrap();
        assert_eq!(first.generation(), 1);
        assert!(cache.is_current(&first));

        let second = cache.refresh(|| Ok(vec![4])).unwrap();
        assert_eq!(*second, vec![4]);
        assert!(!cache.is_current(&first));
        assert!(cache.is_current(&second));
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn failed_build_leaves_cache_empty() {
        let mut cache: DatasetCache<Vec<u8>> = DatasetCache::new("broken");
        cache.refresh(|| Ok(vec![0])).unwrap();
        let result = cache.refresh(|| Err(GameError::EmptyDataset("nothing".into())));
        assert!(result.is_err());
        assert!(!cache.is_resident());
        assert!(cache.current().is_none());
    }

    #[test]
    fn release_drops_data_once_handles_are_gone() {
        let mut cache = DatasetCache::new("weak");
        let handle = cache.refresh(|| Ok(String::from("payload"))).unwrap();
        let weak = Arc::downgrade(&handle.data);
        assert!(cache.release());
        assert!(weak.upgrade().is_some());
        drop(handle);
        assert!(weak.upgrade().is_none());
        assert!(!cache.release());
    }
}
