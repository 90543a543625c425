//! SIEVE - Concurrent Filter Wrapper
//! Thread-safe handle around a [`Sieve`] using Arc + RwLock.
//!
//! ## Concurrency Model
//! - **Lookups** (`contains`, `contains_all`) acquire a **read lock** (shared)
//! - **Mutations** (`add`, `add_all`, `persist`, `restore`) acquire a **write lock**
//! - Multiple concurrent readers allowed, writers block all
//!
//! A local filter has no internal locking, so this is how one local
//! filter is shared between worker threads. Shared filters need no
//! wrapper across processes, but the same handle works for them too.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::FilterConfig;
use crate::error::Result;

use super::metrics::FilterMetrics;
use super::{MembershipFilter, Sieve};

/// Cloneable, thread-safe filter handle.
///
/// ## Example
/// ```no_run
/// use sieve::config::FilterConfig;
/// use sieve::filter::concurrent::SyncSieve;
/// use sieve::types::FilterIdentity;
/// use std::thread;
///
/// let config = FilterConfig::new(FilterIdentity::new("news").unwrap());
/// let filter = SyncSieve::open(&config).unwrap();
///
/// let worker = filter.clone();
/// thread::spawn(move || {
///     worker.add(b"https://example.com/").unwrap();
/// });
///
/// let seen = filter.contains(b"https://example.com/");
/// ```
#[derive(Clone)]
pub struct SyncSieve {
    inner: Arc<RwLock<Sieve>>,
}

impl SyncSieve {
    pub fn open(config: &FilterConfig) -> Result<Self> {
        Ok(Self::new(Sieve::open(config)?))
    }

    pub fn new(filter: Sieve) -> Self {
        Self {
            inner: Arc::new(RwLock::new(filter)),
        }
    }

    // A panic mid-add can at worst leave extra bits set, which the
    // filter tolerates, so poisoned locks are recovered.
    fn read(&self) -> RwLockReadGuard<'_, Sieve> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sieve> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add one item (write lock). `true` = already present.
    pub fn add(&self, item: &[u8]) -> Result<bool> {
        self.write().add(item)
    }

    /// Add a batch (write lock), applied without interleaving.
    pub fn add_all<I>(&self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.write().add_all(items)
    }

    /// Test one item (read lock).
    pub fn contains(&self, item: &[u8]) -> Result<bool> {
        self.read().contains(item)
    }

    /// Test a batch (read lock).
    pub fn contains_all<I>(&self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.read().contains_all(items)
    }

    /// Persist (write lock, so no add races the snapshot).
    pub fn persist(&self) -> Result<()> {
        self.write().persist()
    }

    pub fn restore(&self) -> Result<()> {
        self.write().restore()
    }

    /// Run `f` against the metrics inside the read lock.
    pub fn with_metrics<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&FilterMetrics) -> R,
    {
        let filter = self.read();
        f(filter.metrics())
    }
}
