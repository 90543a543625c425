//! SIEVE - Shared Filter Backend
//! A bloom filter whose bits live in a shared bitmap store.
//!
//! Filters in different processes opened with the same identity and
//! parameters on the same store observe each other's adds.

use crate::config::{FilterParams, RemoteConfig};
use crate::error::{Result, SieveError};
use crate::types::FilterIdentity;

use super::bitmap::BitmapStore;
use super::bloom::Geometry;
use super::MembershipFilter;

/// Largest bitmap a Redis string can hold (512 MB).
pub const MAX_BITMAP_BITS: u64 = 1 << 32;

/// Bloom filter backed by a [`BitmapStore`] keyed by the filter identity.
///
/// Every operation is one request to the store. There is no client-side
/// state besides the geometry, so dropping the filter loses nothing.
pub struct SharedFilter {
    identity: FilterIdentity,
    params: FilterParams,
    geometry: Geometry,
    store: Box<dyn BitmapStore>,
}

impl SharedFilter {
    /// Connect to the Redis server described by `remote`.
    #[cfg(feature = "redis")]
    pub fn connect(
        identity: FilterIdentity,
        params: FilterParams,
        remote: &RemoteConfig,
    ) -> Result<Self> {
        params.validate()?;
        let store = super::bitmap::RedisBitmap::connect(remote)?;
        Self::with_store(identity, params, store)
    }

    /// Without the `redis` feature the shared backend is not registered.
    #[cfg(not(feature = "redis"))]
    pub fn connect(
        _identity: FilterIdentity,
        params: FilterParams,
        remote: &RemoteConfig,
    ) -> Result<Self> {
        params.validate()?;
        remote.validate()?;
        Err(SieveError::Config(
            "shared backend unavailable: built without the `redis` feature".into(),
        ))
    }

    /// Use an already opened store.
    pub fn with_store(
        identity: FilterIdentity,
        params: FilterParams,
        store: impl BitmapStore + 'static,
    ) -> Result<Self> {
        params.validate()?;
        let geometry = Geometry::for_params(&params);
        if geometry.num_bits > MAX_BITMAP_BITS {
            return Err(SieveError::Config(format!(
                "filter needs {} bits, shared bitmaps hold at most {}",
                geometry.num_bits, MAX_BITMAP_BITS
            )));
        }

        log::debug!(
            "shared filter '{}' on {} store: {} bits, {} hashes",
            identity,
            store.name(),
            geometry.num_bits,
            geometry.num_hashes
        );

        Ok(Self {
            identity,
            params,
            geometry,
            store: Box::new(store),
        })
    }

    pub fn identity(&self) -> &FilterIdentity {
        &self.identity
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Bit offsets of every item, concatenated in input order.
    fn offsets_of<I>(&self, items: I) -> (Vec<u64>, usize)
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut offsets = Vec::new();
        let mut count = 0;
        for item in items {
            offsets.extend(self.geometry.positions(item.as_ref()));
            count += 1;
        }
        (offsets, count)
    }

    /// Fold per-bit replies into one flag per item: all bits set.
    fn per_item(&self, bits: Vec<bool>, count: usize) -> Vec<bool> {
        let k = self.geometry.num_hashes as usize;
        debug_assert_eq!(bits.len(), k * count);
        bits.chunks(k).map(|chunk| chunk.iter().all(|&b| b)).collect()
    }
}

impl MembershipFilter for SharedFilter {
    fn add(&mut self, item: &[u8]) -> Result<bool> {
        let offsets: Vec<u64> = self.geometry.positions(item).collect();
        let previous = self.store.set_bits(self.identity.as_str(), &offsets)?;
        // Already present when every bit was set before this call.
        Ok(previous.iter().all(|&b| b))
    }

    fn add_all<I>(&mut self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let (offsets, count) = self.offsets_of(items);
        let previous = self.store.set_bits(self.identity.as_str(), &offsets)?;
        Ok(self.per_item(previous, count))
    }

    fn contains(&self, item: &[u8]) -> Result<bool> {
        let offsets: Vec<u64> = self.geometry.positions(item).collect();
        let bits = self.store.get_bits(self.identity.as_str(), &offsets)?;
        Ok(bits.iter().all(|&b| b))
    }

    fn contains_all<I>(&self, items: I) -> Result<Vec<bool>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let (offsets, count) = self.offsets_of(items);
        let bits = self.store.get_bits(self.identity.as_str(), &offsets)?;
        Ok(self.per_item(bits, count))
    }

    /// The store is already durable.
    fn persist(&mut self) -> Result<()> {
        log::debug!("persist is a no-op for shared filter '{}'", self.identity);
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        log::debug!("restore is a no-op for shared filter '{}'", self.identity);
        Ok(())
    }
}
