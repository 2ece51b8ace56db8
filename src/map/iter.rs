//! Key, value and entry iteration
//!
//! Iteration walks the hash buckets in order, copying the keys of one
//! bucket at a time. A `KeyCursor` holds no borrow of the map, so the map
//! may be changed between steps; a change of bucket count is reported as
//! `ConcurrentModification`.

use crate::binary::Binary;
use crate::block::NIL;
use crate::buffer::BufferManager;
use crate::error::{BufMapError, Result};

use super::BinaryMap;

/// Initial number of keys a cursor buffers
const KEY_BATCH: usize = 16;

/// Detached position in a walk over the keys of a map
#[derive(Debug, Clone)]
pub struct KeyCursor {
    bucket_count: usize,
    next_bucket: usize,
    keys: Vec<Binary>,
    index: usize,
    /// Key returned by the last `next`, cleared by `remove`
    current: Option<Binary>,
    finished: bool,
}

impl KeyCursor {
    fn new(bucket_count: usize) -> Self {
        Self {
            bucket_count,
            next_bucket: 0,
            keys: Vec::with_capacity(KEY_BATCH),
            index: 0,
            current: None,
            finished: false,
        }
    }

    /// The next key, or `None` once every bucket has been visited
    pub fn next<M: BufferManager>(&mut self, map: &mut BinaryMap<M>) -> Result<Option<Binary>> {
        self.current = None;
        while !self.finished {
            if self.index < self.keys.len() {
                let key = self.keys[self.index].clone();
                self.index += 1;
                self.current = Some(key.clone());
                return Ok(Some(key));
            }

            if self.next_bucket >= self.bucket_count {
                self.finished = true;
                break;
            }

            let actual = map.bucket_count();
            if actual != self.bucket_count {
                self.finished = true;
                if map.is_empty() {
                    break;
                }
                return Err(BufMapError::ConcurrentModification {
                    expected: self.bucket_count,
                    actual,
                });
            }

            self.keys.clear();
            self.index = 0;
            map.collect_bucket_keys(self.next_bucket, &mut self.keys)?;
            self.next_bucket += 1;
        }
        Ok(None)
    }

    /// Remove the key last returned by `next`
    pub fn remove<M: BufferManager>(&mut self, map: &mut BinaryMap<M>) -> Result<()> {
        match self.current.take() {
            Some(key) => {
                map.remove(&key)?;
                Ok(())
            }
            None => Err(BufMapError::IllegalState(
                "remove() without a preceding next()".to_string(),
            )),
        }
    }
}

// =============================================================================
// Borrowing Iterators
// =============================================================================

/// Iterator over the keys of a map
pub struct Keys<'a, M: BufferManager> {
    map: &'a mut BinaryMap<M>,
    cursor: KeyCursor,
}

impl<'a, M: BufferManager> Keys<'a, M> {
    /// Remove the key last yielded
    pub fn remove_current(&mut self) -> Result<()> {
        self.cursor.remove(self.map)
    }
}

impl<'a, M: BufferManager> Iterator for Keys<'a, M> {
    type Item = Result<Binary>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next(self.map).transpose()
    }
}

/// Iterator over the values of a map
pub struct Values<'a, M: BufferManager> {
    entries: Entries<'a, M>,
}

impl<'a, M: BufferManager> Values<'a, M> {
    /// Remove the entry whose value was last yielded
    pub fn remove_current(&mut self) -> Result<()> {
        self.entries.remove_current()
    }
}

impl<'a, M: BufferManager> Iterator for Values<'a, M> {
    type Item = Result<Binary>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|entry| entry.map(|(_, value)| value))
    }
}

/// Iterator over the (key, value) pairs of a map
pub struct Entries<'a, M: BufferManager> {
    map: &'a mut BinaryMap<M>,
    cursor: KeyCursor,
}

impl<'a, M: BufferManager> Entries<'a, M> {
    /// Remove the entry last yielded
    pub fn remove_current(&mut self) -> Result<()> {
        self.cursor.remove(self.map)
    }
}

impl<'a, M: BufferManager> Iterator for Entries<'a, M> {
    type Item = Result<(Binary, Binary)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = match self.cursor.next(self.map) {
                Ok(Some(key)) => key,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            match self.map.get(&key) {
                Ok(Some(value)) => return Some(Ok((key, value))),
                // removed since its bucket was read
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// =============================================================================
// Map Entry Points
// =============================================================================

impl<M: BufferManager> BinaryMap<M> {
    /// Start a detached walk over the keys
    ///
    /// Any rehash in progress is finished first so the bucket count stays
    /// put while the map is only read or shrunk through the cursor.
    pub fn key_cursor(&mut self) -> Result<KeyCursor> {
        self.guarded("key_cursor()", |map| map.rehash_all())?;
        Ok(KeyCursor::new(self.bucket_count()))
    }

    pub fn keys(&mut self) -> Result<Keys<'_, M>> {
        let cursor = self.key_cursor()?;
        Ok(Keys { map: self, cursor })
    }

    pub fn values(&mut self) -> Result<Values<'_, M>> {
        Ok(Values {
            entries: self.entries()?,
        })
    }

    pub fn entries(&mut self) -> Result<Entries<'_, M>> {
        let cursor = self.key_cursor()?;
        Ok(Entries { map: self, cursor })
    }

    /// Append the keys linked into `bucket`
    fn collect_bucket_keys(&mut self, bucket: usize, keys: &mut Vec<Binary>) -> Result<()> {
        self.guarded("iterator next()", |map| {
            let mut of = map.buckets.get(bucket).copied().unwrap_or(NIL);
            while of != NIL {
                let r = map.open_block(of)?;
                keys.push(map.block_key(r)?);
                of = map.blk(r).next_node();
                map.close_block(r)?;
            }
            Ok(())
        })
    }
}
