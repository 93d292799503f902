//! In-memory model caches keyed by primary key.
//!
//! Three [`ModelCache`] implementations:
//!
//! - [`LruModelCache`]: bounded, evicts the least recently accessed entry.
//!   Keys must be integers.
//! - [`SimpleMapCache`]: unbounded map, accepts any key; `resize` does
//!   nothing.
//! - [`SparseArrayCache`]: sorted array indexed by integer keys; `resize`
//!   reallocates its storage.
//!
//! Tables with a composite primary key reduce the key columns to one
//! [`CacheKey`] with [`composite_cache_key`] or a function of their own.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use sqlweave_core::{CacheConfig, CacheKind, SqlValue};

use crate::error::{Result, SqliteError};

/// A single cache key derived from primary key values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Integer(i64),
    Text(String),
}

impl CacheKey {
    /// Key for a single-column primary key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::CacheKey`] for null, real or blob values.
    pub fn from_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Integer(i) => Ok(CacheKey::Integer(*i)),
            SqlValue::Text(s) => Ok(CacheKey::Text(s.clone())),
            other => Err(SqliteError::CacheKey(format!(
                "cannot use {other:?} as a cache key"
            ))),
        }
    }

    fn integer(&self) -> Result<i64> {
        match self {
            CacheKey::Integer(i) => Ok(*i),
            CacheKey::Text(s) => Err(SqliteError::CacheKey(format!(
                "integer key required, got text '{s}'"
            ))),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Integer(i) => write!(f, "{i}"),
            CacheKey::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CacheKey {
    fn from(value: i64) -> Self {
        CacheKey::Integer(value)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey::Text(value.to_string())
    }
}

/// Reduces composite primary key values to one key.
pub type CompositeKeyFn = fn(&[SqlValue]) -> Result<CacheKey>;

/// Joins each value's literal, prefixed with its length, so that no two
/// distinct value lists share a key.
///
/// ```
/// use sqlweave_core::SqlValue;
/// use sqlweave_sqlite::composite_cache_key;
///
/// let a = composite_cache_key(&[SqlValue::Integer(1), SqlValue::Integer(2)]).unwrap();
/// let b = composite_cache_key(&[SqlValue::Integer(2), SqlValue::Integer(1)]).unwrap();
/// assert_ne!(a, b);
/// ```
pub fn composite_cache_key(values: &[SqlValue]) -> Result<CacheKey> {
    let mut key = String::new();
    for value in values {
        let literal = value.literal();
        key.push_str(&literal.len().to_string());
        key.push(':');
        key.push_str(&literal);
    }
    Ok(CacheKey::Text(key))
}

/// Key to model storage with a replaceable eviction policy.
pub trait ModelCache<M>: Send {
    fn add(&mut self, key: CacheKey, model: M) -> Result<()>;

    fn remove(&mut self, key: &CacheKey) -> Result<Option<M>>;

    fn get(&mut self, key: &CacheKey) -> Result<Option<M>>;

    fn clear(&mut self);

    fn resize(&mut self, size: usize);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the cache a table's configuration asks for.
pub fn cache_for<M: Clone + Send + 'static>(config: &CacheConfig) -> Box<dyn ModelCache<M>> {
    match config.kind {
        CacheKind::Lru => Box::new(LruModelCache::new(config.size)),
        CacheKind::Map => Box::new(SimpleMapCache::new()),
        CacheKind::Sparse => Box::new(SparseArrayCache::new(config.size)),
    }
}

fn capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

/// Bounded least-recently-used cache.
pub struct LruModelCache<M> {
    entries: LruCache<i64, M>,
}

impl<M> LruModelCache<M> {
    /// A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        Self {
            entries: LruCache::new(capacity(size)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

impl<M: Clone + Send> ModelCache<M> for LruModelCache<M> {
    fn add(&mut self, key: CacheKey, model: M) -> Result<()> {
        self.entries.put(key.integer()?, model);
        Ok(())
    }

    fn remove(&mut self, key: &CacheKey) -> Result<Option<M>> {
        Ok(self.entries.pop(&key.integer()?))
    }

    fn get(&mut self, key: &CacheKey) -> Result<Option<M>> {
        Ok(self.entries.get(&key.integer()?).cloned())
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    /// Shrinking below the current occupancy evicts right away.
    fn resize(&mut self, size: usize) {
        self.entries.resize(capacity(size));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Unbounded map cache.
pub struct SimpleMapCache<M> {
    entries: HashMap<CacheKey, M>,
}

impl<M> SimpleMapCache<M> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<M> Default for SimpleMapCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone + Send> ModelCache<M> for SimpleMapCache<M> {
    fn add(&mut self, key: CacheKey, model: M) -> Result<()> {
        self.entries.insert(key, model);
        Ok(())
    }

    fn remove(&mut self, key: &CacheKey) -> Result<Option<M>> {
        Ok(self.entries.remove(key))
    }

    fn get(&mut self, key: &CacheKey) -> Result<Option<M>> {
        Ok(self.entries.get(key).cloned())
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn resize(&mut self, size: usize) {
        tracing::info!(size, "map cache is unbounded, ignoring resize");
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Sorted array of integer-keyed entries.
///
/// Lookups are binary searches. The array starts with room for `size`
/// entries and grows past it like any vector; `resize` reallocates to the
/// new size without dropping entries.
pub struct SparseArrayCache<M> {
    entries: Vec<(i64, M)>,
}

impl<M> SparseArrayCache<M> {
    pub fn new(size: usize) -> Self {
        Self {
            entries: Vec::with_capacity(size),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    fn position(&self, key: i64) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&key, |(k, _)| *k)
    }
}

impl<M: Clone + Send> ModelCache<M> for SparseArrayCache<M> {
    fn add(&mut self, key: CacheKey, model: M) -> Result<()> {
        let key = key.integer()?;
        match self.position(key) {
            Ok(i) => self.entries[i].1 = model,
            Err(i) => self.entries.insert(i, (key, model)),
        }
        Ok(())
    }

    fn remove(&mut self, key: &CacheKey) -> Result<Option<M>> {
        let key = key.integer()?;
        Ok(self.position(key).ok().map(|i| self.entries.remove(i).1))
    }

    fn get(&mut self, key: &CacheKey) -> Result<Option<M>> {
        let key = key.integer()?;
        Ok(self.position(key).ok().map(|i| self.entries[i].1.clone()))
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn resize(&mut self, size: usize) {
        if size > self.entries.capacity() {
            self.entries.reserve_exact(size - self.entries.len());
        } else {
            self.entries.shrink_to(size);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
