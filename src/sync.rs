//! Thread-safe map handle
//!
//! A `BinaryMap` is single-owner: even `get` mutates the handle cache and
//! advances the incremental rehash. `SharedBinaryMap` serializes every
//! operation behind one mutex.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::binary::Binary;
use crate::buffer::BufferManager;
use crate::error::Result;
use crate::map::{BinaryMap, MapStats};

/// Cloneable, lock-protected handle to one map
pub struct SharedBinaryMap<M: BufferManager> {
    inner: Arc<Mutex<BinaryMap<M>>>,
}

impl<M: BufferManager> Clone for SharedBinaryMap<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: BufferManager> SharedBinaryMap<M> {
    pub fn new(map: BinaryMap<M>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Hold the lock across several operations (e.g. a `KeyCursor` walk)
    pub fn lock(&self) -> MutexGuard<'_, BinaryMap<M>> {
        self.inner.lock()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Binary>> {
        self.inner.lock().get(key)
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        self.inner.lock().contains_key(key)
    }

    pub fn put(&self, key: impl Into<Binary>, value: impl Into<Binary>) -> Result<Option<Binary>> {
        self.inner.lock().put(key, value)
    }

    pub fn remove(&self, key: impl AsRef<[u8]>) -> Result<Option<Binary>> {
        self.inner.lock().remove(key)
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.lock().clear()
    }

    /// Every key, collected under one lock
    pub fn keys(&self) -> Result<Vec<Binary>> {
        let mut map = self.inner.lock();
        let keys: Result<Vec<Binary>> = map.keys()?.collect();
        keys
    }

    pub fn entries_snapshot(&self) -> Result<Vec<(Binary, Binary)>> {
        self.inner.lock().entries_snapshot()
    }

    pub fn stats(&self) -> MapStats {
        self.inner.lock().stats()
    }

    pub fn check(&self, desc: &str) -> Result<()> {
        self.inner.lock().check(desc)
    }
}
